//! The gateway's core subsystems (components A-I), wired together through
//! a `Gateway` context object instead of process-wide singletons.

pub mod carrier;
pub mod dedupe;
pub mod mm4_queue;
pub mod mm4_send;
pub mod normalize;
pub mod ratelimit;
pub mod record;
pub mod router;
pub mod session;
pub mod store;

use crate::config::GatewayConfig;
use crate::gateway::carrier::{CarrierDispatcher, WebhookSender};
use crate::gateway::mm4_queue::Mm4Queue;
use crate::gateway::ratelimit::RateLimitEngine;
use crate::gateway::session::SessionRegistry;
use crate::gateway::store::MessageStore;
use crate::model::{Client, ClientNumber, MsgRecord};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{mpsc, RwLock};

/// Shared lookup tables for clients and numbers. Per §5, writers only touch
/// these on reload or admin mutation; the core never mutates them.
#[derive(Default)]
pub struct Directory {
    pub clients_by_id: RwLock<HashMap<i64, Client>>,
    pub numbers: RwLock<HashMap<String, ClientNumber>>,
}

impl Directory {
    pub async fn client_for_number(&self, number: &str) -> Option<(Client, ClientNumber)> {
        let numbers = self.numbers.read().await;
        let client_number = numbers.get(number)?.clone();
        let clients = self.clients_by_id.read().await;
        let client = clients.get(&client_number.client_id)?.clone();
        Some((client, client_number))
    }
}

/// Threaded into every component instead of process-wide statics, per the
/// "Global mutable state" design note.
pub struct Gateway {
    pub config: GatewayConfig,
    pub directory: Arc<Directory>,
    pub sessions: Arc<SessionRegistry>,
    pub store: Arc<dyn MessageStore>,
    pub mm4_queue: Arc<dyn Mm4Queue>,
    pub rate_limiter: Arc<RateLimitEngine>,
    pub carrier_dispatcher: Arc<CarrierDispatcher>,
    pub webhook_sender: Arc<WebhookSender>,
}

impl Gateway {
    pub fn new(
        config: GatewayConfig,
        directory: Arc<Directory>,
        store: Arc<dyn MessageStore>,
        mm4_queue: Arc<dyn Mm4Queue>,
        record_tx: mpsc::Sender<MsgRecord>,
    ) -> Self {
        let rate_limiter = Arc::new(RateLimitEngine::new(store.clone()));
        let webhook_sender = Arc::new(WebhookSender::new(
            config.webhook_retry_count,
            config.webhook_timeout_secs,
        ));
        Self {
            sessions: Arc::new(SessionRegistry::new()),
            carrier_dispatcher: Arc::new(CarrierDispatcher::new(record_tx)),
            webhook_sender,
            config,
            directory,
            store,
            mm4_queue,
            rate_limiter,
        }
    }
}
