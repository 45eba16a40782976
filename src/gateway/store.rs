//! Message Store (component C): append-only record log and usage queries.
//!
//! The real store is a SQL database (§6, out of scope); this module defines
//! the trait the rest of the gateway depends on plus an in-memory
//! implementation used by tests and by `gatewayd` until a database-backed
//! implementation is wired in.

use crate::model::{Direction, MsgRecord, MsgType};
use async_trait::async_trait;
use std::sync::Mutex;

#[async_trait]
pub trait MessageStore: Send + Sync {
    async fn insert(&self, record: MsgRecord);

    /// Count of the client's messages of `msg_type` received at or after
    /// `since`. When `number` is `None`, counts across all of the client's
    /// numbers.
    async fn usage_count(
        &self,
        client_id: i64,
        number: Option<&str>,
        msg_type: MsgType,
        since: chrono::DateTime<chrono::Utc>,
    ) -> i64;

    /// Same as `usage_count` but additionally filters by leg direction,
    /// matching `number` against `from` for outbound or `to` for inbound.
    async fn usage_count_direction(
        &self,
        client_id: i64,
        number: Option<&str>,
        msg_type: MsgType,
        direction: Direction,
        since: chrono::DateTime<chrono::Utc>,
    ) -> i64;
}

/// In-memory append-only store. Adequate for tests and single-process
/// deployments; a production deployment backs `MessageStore` with the SQL
/// database named in §6.
#[derive(Default)]
pub struct InMemoryMessageStore {
    records: Mutex<Vec<(MsgRecord, Option<String>)>>,
}

impl InMemoryMessageStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> Vec<MsgRecord> {
        self.records
            .lock()
            .expect("store mutex poisoned")
            .iter()
            .map(|(r, _)| r.clone())
            .collect()
    }
}

#[async_trait]
impl MessageStore for InMemoryMessageStore {
    async fn insert(&self, record: MsgRecord) {
        self.records
            .lock()
            .expect("store mutex poisoned")
            .push((record, None));
    }

    async fn usage_count(
        &self,
        client_id: i64,
        number: Option<&str>,
        msg_type: MsgType,
        since: chrono::DateTime<chrono::Utc>,
    ) -> i64 {
        let records = self.records.lock().expect("store mutex poisoned");
        records
            .iter()
            .filter(|(r, _)| {
                r.client_id == client_id
                    && matches_type(r, msg_type)
                    && matches_number(r, number, None)
                    && r.received_timestamp >= since
            })
            .count() as i64
    }

    async fn usage_count_direction(
        &self,
        client_id: i64,
        number: Option<&str>,
        msg_type: MsgType,
        direction: Direction,
        since: chrono::DateTime<chrono::Utc>,
    ) -> i64 {
        let records = self.records.lock().expect("store mutex poisoned");
        records
            .iter()
            .filter(|(r, _)| {
                r.client_id == client_id
                    && matches_type(r, msg_type)
                    && r.direction == direction
                    && matches_number(r, number, Some(direction))
                    && r.received_timestamp >= since
            })
            .count() as i64
    }
}

fn matches_type(record: &MsgRecord, msg_type: MsgType) -> bool {
    // encoding is only set for SMS legs; MMS legs carry media instead.
    match msg_type {
        MsgType::Sms => record.encoding.is_some(),
        MsgType::Mms => record.media_count > 0 || record.encoding.is_none(),
    }
}

/// Matches `number` against the leg that owns it: `from` for an outbound
/// record, `to` for an inbound one. Without a direction filter (the
/// type-only `usage_count` query) either side matching counts, since the
/// number could be scoped by either leg.
fn matches_number(record: &MsgRecord, number: Option<&str>, direction: Option<Direction>) -> bool {
    let Some(number) = number else {
        return true;
    };
    match direction {
        Some(Direction::Outbound) => record.from == number,
        Some(Direction::Inbound) => record.to == number,
        None => record.from == number || record.to == number,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ClientType, DeliveryMethod, Encoding, RecordStatus};
    use chrono::Utc;

    fn sample_record(client_id: i64, direction: Direction, ts: chrono::DateTime<Utc>) -> MsgRecord {
        MsgRecord {
            log_id: "log-1".into(),
            client_id,
            from: "15551234567".into(),
            to: "15557654321".into(),
            direction,
            from_client_type: Some(ClientType::Web),
            to_client_type: Some(ClientType::Web),
            internal: true,
            delivery_method: DeliveryMethod::Smpp,
            encoding: Some(Encoding::Gsm7),
            segment_count: 1,
            media_count: 0,
            media_bytes: 0,
            status: RecordStatus::Delivered,
            received_timestamp: ts,
        }
    }

    #[tokio::test]
    async fn usage_count_filters_by_client_and_time() {
        let store = InMemoryMessageStore::new();
        let now = Utc::now();
        store
            .insert(sample_record(1, Direction::Outbound, now))
            .await;
        store
            .insert(sample_record(1, Direction::Outbound, now - chrono::Duration::days(2)))
            .await;
        store
            .insert(sample_record(2, Direction::Outbound, now))
            .await;

        let count = store
            .usage_count(1, None, MsgType::Sms, now - chrono::Duration::hours(1))
            .await;
        assert_eq!(count, 1);
    }

    #[tokio::test]
    async fn usage_count_direction_filters_by_direction() {
        let store = InMemoryMessageStore::new();
        let now = Utc::now();
        store
            .insert(sample_record(1, Direction::Outbound, now))
            .await;
        store
            .insert(sample_record(1, Direction::Inbound, now))
            .await;

        let outbound = store
            .usage_count_direction(
                1,
                None,
                MsgType::Sms,
                Direction::Outbound,
                now - chrono::Duration::hours(1),
            )
            .await;
        assert_eq!(outbound, 1);
    }

    #[tokio::test]
    async fn usage_count_direction_filters_by_number_scope() {
        let store = InMemoryMessageStore::new();
        let now = Utc::now();
        store
            .insert(sample_record(1, Direction::Outbound, now))
            .await;
        let mut other = sample_record(1, Direction::Outbound, now);
        other.from = "15559990000".into();
        store.insert(other).await;

        let scoped = store
            .usage_count_direction(
                1,
                Some("15551234567"),
                MsgType::Sms,
                Direction::Outbound,
                now - chrono::Duration::hours(1),
            )
            .await;
        assert_eq!(scoped, 1);
    }
}
