//! Router (component G): the single point where a `MsgQueueItem` is
//! classified and dispatched to a session, the MM4 queue, or a carrier.

use crate::config::GatewayConfig;
use crate::gateway::carrier::{CarrierDispatcher, OutboundJob};
use crate::gateway::mm4_queue::Mm4Queue;
use crate::gateway::normalize;
use crate::gateway::ratelimit::{RateLimitDecision, RateLimitEngine};
use crate::gateway::record::{record_pair, DispatchContext};
use crate::gateway::session::{deliver_sms, SessionRegistry};
use crate::gateway::Directory;
use crate::model::{
    Client, ClientNumber, DeliveryMethod, Direction, Mm4QueueItem, MsgQueueItem, MsgRecord,
    MsgType, RecordStatus,
};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::time::Duration;

const STOP_REPLY_TEXT: &str = "Reply STOP to end messages.";
const MAX_ROUTER_RETRIES: u32 = 5;
const RETRY_DELAY: Duration = Duration::from_secs(10);

pub struct Router {
    directory: Arc<Directory>,
    sessions: Arc<SessionRegistry>,
    rate_limiter: Arc<RateLimitEngine>,
    mm4_queue: Arc<dyn Mm4Queue>,
    carrier_dispatcher: Arc<CarrierDispatcher>,
    record_tx: mpsc::Sender<MsgRecord>,
    self_tx: mpsc::Sender<MsgQueueItem>,
    config: GatewayConfig,
}

impl Router {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        directory: Arc<Directory>,
        sessions: Arc<SessionRegistry>,
        rate_limiter: Arc<RateLimitEngine>,
        mm4_queue: Arc<dyn Mm4Queue>,
        carrier_dispatcher: Arc<CarrierDispatcher>,
        record_tx: mpsc::Sender<MsgRecord>,
        self_tx: mpsc::Sender<MsgQueueItem>,
        config: GatewayConfig,
    ) -> Self {
        Self {
            directory,
            sessions,
            rate_limiter,
            mm4_queue,
            carrier_dispatcher,
            record_tx,
            self_tx,
            config,
        }
    }

    pub async fn run(self: Arc<Self>, mut rx: mpsc::Receiver<MsgQueueItem>) {
        while let Some(item) = rx.recv().await {
            let router = self.clone();
            tokio::spawn(async move { router.route(item).await });
        }
    }

    async fn route(&self, mut item: MsgQueueItem) {
        let Some(from) = normalize_e164(&item.from) else {
            tracing::warn!(log_id = item.log_id, from = item.from, "cannot normalize from address, dropping");
            return;
        };
        let Some(to) = normalize_e164(&item.to) else {
            tracing::warn!(log_id = item.log_id, to = item.to, "cannot normalize to address, dropping");
            return;
        };
        item.from = from.clone();
        item.to = to.clone();

        let from_owner = self.directory.client_for_number(&from).await;
        let to_owner = self.directory.client_for_number(&to).await;

        if from_owner.is_none() && to_owner.is_none() {
            tracing::warn!(log_id = item.log_id, from, to, "neither leg is known, dropping");
            return;
        }

        if let Some((_, number)) = &to_owner {
            if number.ignore_stop_cmd_sending && item.message.as_deref() == Some(STOP_REPLY_TEXT) {
                tracing::debug!(log_id = item.log_id, "stop-reply suppressed by number setting");
                return;
            }
        }

        if let Some((client, number)) = &from_owner {
            if let RateLimitDecision::Blocked { period, limit, used, scope } = self
                .rate_limiter
                .check(client, number, item.msg_type, Direction::Outbound)
                .await
            {
                tracing::info!(
                    log_id = item.log_id,
                    ?period,
                    limit,
                    used,
                    ?scope,
                    "outbound rate limited"
                );
                self.emit(&item, &from_owner, &to_owner, DeliveryMethod::Smpp, 0, RecordStatus::RateLimited)
                    .await;
                return;
            }
        }

        if let Some((client, number)) = &to_owner {
            if let RateLimitDecision::Blocked { period, limit, used, scope } = self
                .rate_limiter
                .check(client, number, item.msg_type, Direction::Inbound)
                .await
            {
                tracing::info!(
                    log_id = item.log_id,
                    ?period,
                    limit,
                    used,
                    ?scope,
                    "inbound rate limited"
                );
                self.emit(&item, &from_owner, &to_owner, DeliveryMethod::Smpp, 0, RecordStatus::RateLimited)
                    .await;
                return;
            }
        }

        match (&to_owner, item.msg_type) {
            (Some((to_client, _)), MsgType::Sms) => {
                self.dispatch_sms_on_net(item, from_owner, to_owner.clone(), to_client.clone())
                    .await;
            }
            (Some(_), MsgType::Mms) => {
                self.dispatch_mms_on_net(item, from_owner, to_owner).await;
            }
            (None, _) => {
                self.dispatch_to_carrier(item, from_owner).await;
            }
        }
    }

    async fn dispatch_sms_on_net(
        &self,
        mut item: MsgQueueItem,
        from_owner: Option<(Client, ClientNumber)>,
        to_owner: Option<(Client, ClientNumber)>,
        to_client: Client,
    ) {
        let Some(session) = self.sessions.lookup(&to_client.username).await else {
            tracing::info!(log_id = item.log_id, "recipient session offline, retrying");
            self.retry(item, &from_owner, &to_owner).await;
            return;
        };

        let encoding = item
            .encoding
            .unwrap_or_else(|| normalize::choose_encoding(item.message.as_deref().unwrap_or("")));
        item.encoding = Some(encoding);

        let result = deliver_sms(
            &session,
            &item.from,
            &item.to,
            item.message.as_deref().unwrap_or(""),
            encoding,
            self.config.sms_char_limit,
            self.config.sms_char_limit_utf16,
        )
        .await;

        match result {
            Ok(segment_count) => {
                self.emit(
                    &item,
                    &from_owner,
                    &to_owner,
                    DeliveryMethod::Smpp,
                    segment_count,
                    RecordStatus::Delivered,
                )
                .await;
            }
            Err(err) => {
                tracing::warn!(log_id = item.log_id, %err, "smpp delivery failed, retrying");
                self.retry(item, &from_owner, &to_owner).await;
            }
        }
    }

    async fn dispatch_mms_on_net(
        &self,
        item: MsgQueueItem,
        from_owner: Option<(Client, ClientNumber)>,
        to_owner: Option<(Client, ClientNumber)>,
    ) {
        let owning_client_id = from_owner.as_ref().map(|(c, _)| c.id).unwrap_or(0);
        let mm4_item = Mm4QueueItem {
            id: 0,
            from: item.from.clone(),
            to: item.to.clone(),
            log_id: item.log_id.clone(),
            content: item.files.first().map(|f| f.data.clone()).unwrap_or_default(),
            headers: HashMap::new(),
            owning_client_id,
            route: to_owner
                .as_ref()
                .map(|(_, n)| n.carrier.clone())
                .unwrap_or_default(),
            created_at: item.received_timestamp,
            retry_count: 0,
            last_attempt: None,
        };

        match self.mm4_queue.enqueue(mm4_item).await {
            Ok(_) => {
                self.emit(&item, &from_owner, &to_owner, DeliveryMethod::Mm4, 0, RecordStatus::Delivered)
                    .await;
            }
            Err(err) => {
                tracing::warn!(log_id = item.log_id, err, "mm4 enqueue failed, retrying");
                self.retry(item, &from_owner, &to_owner).await;
            }
        }
    }

    /// Hand `item` to the carrier dispatcher. The dispatcher itself owns the
    /// record for this leg, since whether it lands as `Delivered` or
    /// `CarrierFailedTerminal` isn't known until the HTTP attempts finish.
    async fn dispatch_to_carrier(&self, item: MsgQueueItem, from_owner: Option<(Client, ClientNumber)>) {
        let Some((client, number)) = &from_owner else {
            tracing::warn!(log_id = item.log_id, "no owning number for carrier dispatch, dropping");
            return;
        };

        self.carrier_dispatcher
            .dispatch(OutboundJob {
                carrier: number.carrier.clone(),
                from: item.from.clone(),
                to: item.to.clone(),
                message: item.message.clone(),
                files: item.files.clone(),
                log_id: item.log_id.clone(),
                owning_client_id: client.id,
                received_timestamp: item.received_timestamp,
            })
            .await;
    }

    async fn emit(
        &self,
        item: &MsgQueueItem,
        from_owner: &Option<(Client, ClientNumber)>,
        to_owner: &Option<(Client, ClientNumber)>,
        delivery_method: DeliveryMethod,
        segment_count: u32,
        status: RecordStatus,
    ) {
        let ctx = DispatchContext {
            from_client: from_owner.as_ref().map(|(c, _)| c),
            to_client: to_owner.as_ref().map(|(c, _)| c),
            delivery_method,
            segment_count,
            status,
        };
        for record in record_pair(item, &ctx) {
            if self.record_tx.send(record).await.is_err() {
                tracing::warn!(log_id = item.log_id, "record channel closed, dropping record");
            }
        }
    }

    /// Re-post `item` onto the router's own input channel after a short
    /// delay, up to a small retry cap, per the router's retry path. Past
    /// the cap, the item is dropped and a terminal record is emitted
    /// instead of silently disappearing.
    async fn retry(
        &self,
        mut item: MsgQueueItem,
        from_owner: &Option<(Client, ClientNumber)>,
        to_owner: &Option<(Client, ClientNumber)>,
    ) {
        item.retry_count += 1;
        if item.retry_count > MAX_ROUTER_RETRIES {
            tracing::error!(log_id = item.log_id, "router retry cap exceeded, dropping");
            let delivery_method = match item.msg_type {
                MsgType::Sms => DeliveryMethod::Smpp,
                MsgType::Mms => DeliveryMethod::Mm4,
            };
            self.emit(
                &item,
                from_owner,
                to_owner,
                delivery_method,
                0,
                RecordStatus::RouterFindSmppFailed,
            )
            .await;
            return;
        }
        let self_tx = self.self_tx.clone();
        tokio::spawn(async move {
            tokio::time::sleep(RETRY_DELAY).await;
            let _ = self_tx.send(item).await;
        });
    }
}

fn normalize_e164(raw: &str) -> Option<String> {
    let digits: String = raw.chars().filter(|c| c.is_ascii_digit()).collect();
    if digits.is_empty() {
        None
    } else {
        Some(digits)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_e164_strips_plus_and_punctuation() {
        assert_eq!(normalize_e164("+1 (555) 123-4567"), Some("15551234567".into()));
    }

    #[test]
    fn normalize_e164_rejects_empty_input() {
        assert_eq!(normalize_e164("not a number"), None);
    }
}
