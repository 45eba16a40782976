//! Rate-Limit Engine (component B): burst/daily/monthly windows evaluated
//! in the owning client's local time zone.

use crate::gateway::store::MessageStore;
use crate::model::{Client, ClientNumber, Direction, MsgType, RateLimits};
use chrono::{DateTime, Datelike, Duration, TimeZone, Utc};
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Period {
    Burst,
    Daily,
    Monthly,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scope {
    Client,
    Number,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RateLimitDecision {
    Allowed,
    Blocked {
        period: Period,
        limit: i64,
        used: i64,
        scope: Scope,
    },
}

pub struct RateLimitEngine {
    store: Arc<dyn MessageStore>,
}

impl RateLimitEngine {
    pub fn new(store: Arc<dyn MessageStore>) -> Self {
        Self { store }
    }

    /// Evaluate burst, then daily, then monthly; the first violated window
    /// wins. `number` is the owning client's number on this leg, used both
    /// to pick number-level overrides and to scope the usage count.
    pub async fn check(
        &self,
        client: &Client,
        number: &ClientNumber,
        msg_type: MsgType,
        direction: Direction,
    ) -> RateLimitDecision {
        let client_limits = client.effective_settings();
        let number_limits = number.settings;
        let limit_both = number_limits
            .map(|s| s.limit_both)
            .unwrap_or(client_limits.limit_both);

        if direction == Direction::Inbound && !limit_both {
            return RateLimitDecision::Allowed;
        }

        for period in [Period::Burst, Period::Daily, Period::Monthly] {
            let (limit, scope) =
                effective_limit(period, msg_type, &client_limits.limits, number_limits);
            if limit <= 0 {
                continue;
            }

            let since = period_start(period, Utc::now(), client.timezone);
            let number_filter = (scope == Scope::Number).then_some(number.number.as_str());
            let used = self
                .store
                .usage_count_direction(client.id, number_filter, msg_type, direction, since)
                .await;

            if used >= limit {
                return RateLimitDecision::Blocked {
                    period,
                    limit,
                    used,
                    scope,
                };
            }
        }

        RateLimitDecision::Allowed
    }
}

fn effective_limit(
    period: Period,
    msg_type: MsgType,
    client_limits: &RateLimits,
    number_settings: Option<crate::model::NumberSettings>,
) -> (i64, Scope) {
    let client_limit = pick(client_limits, msg_type, period);
    if let Some(settings) = number_settings {
        let number_limit = pick(&settings.limits, msg_type, period);
        if number_limit > 0 {
            return (number_limit, Scope::Number);
        }
    }
    (client_limit, Scope::Client)
}

fn pick(limits: &RateLimits, msg_type: MsgType, period: Period) -> i64 {
    match (msg_type, period) {
        (MsgType::Sms, Period::Burst) => limits.sms_burst,
        (MsgType::Sms, Period::Daily) => limits.sms_daily,
        (MsgType::Sms, Period::Monthly) => limits.sms_monthly,
        (MsgType::Mms, Period::Burst) => limits.mms_burst,
        (MsgType::Mms, Period::Daily) => limits.mms_daily,
        (MsgType::Mms, Period::Monthly) => limits.mms_monthly,
    }
}

fn period_start(period: Period, now: DateTime<Utc>, tz: chrono_tz::Tz) -> DateTime<Utc> {
    match period {
        Period::Burst => now - Duration::seconds(60),
        Period::Daily => {
            let local = now.with_timezone(&tz);
            let midnight = local.date_naive().and_hms_opt(0, 0, 0).expect("valid time");
            tz.from_local_datetime(&midnight)
                .single()
                .unwrap_or(local)
                .with_timezone(&Utc)
        }
        Period::Monthly => {
            let local = now.with_timezone(&tz);
            let first_of_month = local
                .date_naive()
                .with_day(1)
                .expect("day 1 always valid")
                .and_hms_opt(0, 0, 0)
                .expect("valid time");
            tz.from_local_datetime(&first_of_month)
                .single()
                .unwrap_or(local)
                .with_timezone(&Utc)
        }
    }
}
