//! Carrier HTTP surface: outbound dispatch to upstream carriers and client
//! webhooks, plus the inbound `/inbound/<carrier>` listener carriers call
//! back into. Outbound delivery uses `reqwest`; the inbound listener uses
//! `axum`, the framework the sibling SMS gateways in this domain reach for.
//!
//! Outbound dispatch resolves the open question of where the carrier
//! boundary sits: one bounded channel per carrier tag, drained by a single
//! worker per tag, retrying a fixed number of times before giving up. That
//! keeps ordering per carrier and bounds memory without a message bus.

use crate::model::{
    DeliveryMethod, Direction, MediaFile, MsgQueueItem, MsgRecord, MsgType, RecordStatus,
};
use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::routing::post;
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex};

const CARRIER_CHANNEL_DEPTH: usize = 256;
const CARRIER_SEND_ATTEMPTS: u32 = 3;

/// Everything needed to push one message out to a carrier's API, plus the
/// context needed to persist the outcome once the attempt finishes.
/// `OutboundJob` carries the owning client's id rather than a `Client`,
/// mirroring `Mm4QueueItem`: the worker runs without a `Directory` handle.
#[derive(Debug, Clone)]
pub struct OutboundJob {
    pub carrier: String,
    pub from: String,
    pub to: String,
    pub message: Option<String>,
    pub files: Vec<MediaFile>,
    pub log_id: String,
    pub owning_client_id: i64,
    pub received_timestamp: chrono::DateTime<chrono::Utc>,
}

#[derive(Serialize)]
struct CarrierOutboundBody<'a> {
    from: &'a str,
    to: &'a str,
    message: Option<&'a str>,
    media_count: usize,
}

/// Fans outbound jobs out to one worker task per carrier tag. A carrier
/// without a configured API base URL is dropped with a warning rather than
/// failing the caller; onboarding a carrier is a config change, not code.
pub struct CarrierDispatcher {
    http: reqwest::Client,
    endpoints: HashMap<String, String>,
    workers: Mutex<HashMap<String, mpsc::Sender<OutboundJob>>>,
    record_tx: mpsc::Sender<MsgRecord>,
}

impl CarrierDispatcher {
    pub fn new(record_tx: mpsc::Sender<MsgRecord>) -> Self {
        Self::with_endpoints(HashMap::new(), record_tx)
    }

    pub fn with_endpoints(
        endpoints: HashMap<String, String>,
        record_tx: mpsc::Sender<MsgRecord>,
    ) -> Self {
        Self {
            http: reqwest::Client::new(),
            endpoints,
            workers: Mutex::new(HashMap::new()),
            record_tx,
        }
    }

    /// Enqueue a job for delivery, spawning the carrier's worker on first use.
    pub async fn dispatch(&self, job: OutboundJob) {
        let Some(endpoint) = self.endpoints.get(&job.carrier).cloned() else {
            tracing::warn!(carrier = job.carrier, "no endpoint configured, dropping");
            emit_carrier_record(&self.record_tx, &job, RecordStatus::CarrierFailedTerminal).await;
            return;
        };

        let sender = {
            let mut workers = self.workers.lock().await;
            if let Some(existing) = workers.get(&job.carrier) {
                if !existing.is_closed() {
                    existing.clone()
                } else {
                    workers.remove(&job.carrier);
                    self.spawn_worker(&mut workers, job.carrier.clone(), endpoint)
                }
            } else {
                self.spawn_worker(&mut workers, job.carrier.clone(), endpoint)
            }
        };

        if sender.send(job).await.is_err() {
            tracing::warn!("carrier worker dropped the send side");
        }
    }

    fn spawn_worker(
        &self,
        workers: &mut HashMap<String, mpsc::Sender<OutboundJob>>,
        carrier: String,
        endpoint: String,
    ) -> mpsc::Sender<OutboundJob> {
        let (tx, rx) = mpsc::channel(CARRIER_CHANNEL_DEPTH);
        workers.insert(carrier.clone(), tx.clone());
        tokio::spawn(run_carrier_worker(
            self.http.clone(),
            carrier,
            endpoint,
            rx,
            self.record_tx.clone(),
        ));
        tx
    }
}

/// Build and send the one record for an outbound carrier job. Unlike
/// `record_pair`, this only ever has the sending client's side to record:
/// the recipient is off-net by definition of reaching the carrier path.
async fn emit_carrier_record(record_tx: &mpsc::Sender<MsgRecord>, job: &OutboundJob, status: RecordStatus) {
    let media_count = job.files.len() as u32;
    let media_bytes: u64 = job.files.iter().map(|f| f.data.len() as u64).sum();
    let record = MsgRecord {
        log_id: job.log_id.clone(),
        client_id: job.owning_client_id,
        from: job.from.clone(),
        to: job.to.clone(),
        direction: Direction::Outbound,
        from_client_type: None,
        to_client_type: None,
        internal: false,
        delivery_method: DeliveryMethod::CarrierApi,
        encoding: None,
        segment_count: if job.message.is_some() { 1 } else { 0 },
        media_count,
        media_bytes,
        status,
        received_timestamp: job.received_timestamp,
    };
    if record_tx.send(record).await.is_err() {
        tracing::warn!(log_id = job.log_id, "record channel closed, dropping carrier record");
    }
}

async fn run_carrier_worker(
    http: reqwest::Client,
    carrier: String,
    endpoint: String,
    mut rx: mpsc::Receiver<OutboundJob>,
    record_tx: mpsc::Sender<MsgRecord>,
) {
    while let Some(job) = rx.recv().await {
        let body = CarrierOutboundBody {
            from: &job.from,
            to: &job.to,
            message: job.message.as_deref(),
            media_count: job.files.len(),
        };

        let mut delivered = false;
        for attempt in 1..=CARRIER_SEND_ATTEMPTS {
            match http.post(&endpoint).json(&body).send().await {
                Ok(resp) if resp.status().is_success() => {
                    delivered = true;
                    break;
                }
                Ok(resp) => {
                    tracing::warn!(
                        carrier,
                        log_id = job.log_id,
                        status = resp.status().as_u16(),
                        attempt,
                        "carrier rejected outbound send"
                    );
                }
                Err(err) => {
                    tracing::warn!(carrier, log_id = job.log_id, attempt, %err, "carrier send failed");
                }
            }
        }

        if delivered {
            emit_carrier_record(&record_tx, &job, RecordStatus::Delivered).await;
        } else {
            tracing::error!(carrier, log_id = job.log_id, "carrier send exhausted retries");
            emit_carrier_record(&record_tx, &job, RecordStatus::CarrierFailedTerminal).await;
        }
    }
}

/// Outbound webhook delivery to a client-owned number's `webhook_url`.
pub struct WebhookSender {
    http: reqwest::Client,
    retry_count: u32,
}

#[derive(Serialize)]
struct WebhookBody<'a> {
    from: &'a str,
    to: &'a str,
    message: Option<&'a str>,
    log_id: &'a str,
}

impl WebhookSender {
    pub fn new(retry_count: u32, timeout_secs: u64) -> Self {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .expect("reqwest client config is always valid");
        Self { http, retry_count }
    }

    pub async fn send(&self, url: &str, item: &MsgQueueItem) -> bool {
        let body = WebhookBody {
            from: &item.from,
            to: &item.to,
            message: item.message.as_deref(),
            log_id: &item.log_id,
        };

        for attempt in 1..=self.retry_count.max(1) {
            match self.http.post(url).json(&body).send().await {
                Ok(resp) if resp.status().is_success() => return true,
                Ok(resp) => tracing::warn!(
                    url,
                    log_id = item.log_id,
                    status = resp.status().as_u16(),
                    attempt,
                    "webhook rejected delivery"
                ),
                Err(err) => {
                    tracing::warn!(url, log_id = item.log_id, attempt, %err, "webhook send failed")
                }
            }
        }
        false
    }
}

/// Body accepted on the inbound carrier surface. Carriers vary in what they
/// send; this is the lowest common shape every known integration can map
/// onto, with carrier-specific quirks absorbed before this point.
#[derive(Debug, Deserialize)]
pub struct InboundCarrierMessage {
    pub from: String,
    pub to: String,
    pub message: Option<String>,
}

#[derive(Clone)]
struct InboundState {
    api_key: Arc<str>,
    router_tx: mpsc::Sender<MsgQueueItem>,
}

fn check_basic_auth(headers: &HeaderMap, expected_key: &str) -> bool {
    let Some(value) = headers.get(axum::http::header::AUTHORIZATION) else {
        return false;
    };
    let Ok(value) = value.to_str() else {
        return false;
    };
    let Some(encoded) = value.strip_prefix("Basic ") else {
        return false;
    };
    let Ok(decoded) = base64_decode(encoded) else {
        return false;
    };
    // Static API key is carried as the Basic password with an empty
    // username, per the environment-based auth scheme in use here.
    decoded
        .split_once(':')
        .map(|(_, password)| password == expected_key)
        .unwrap_or(false)
}

fn base64_decode(input: &str) -> Result<String, ()> {
    use base64::Engine;
    base64::engine::general_purpose::STANDARD
        .decode(input.trim())
        .map_err(|_| ())
        .and_then(|bytes| String::from_utf8(bytes).map_err(|_| ()))
}

async fn handle_inbound(
    State(state): State<InboundState>,
    Path(carrier): Path<String>,
    headers: HeaderMap,
    Json(payload): Json<InboundCarrierMessage>,
) -> StatusCode {
    if !check_basic_auth(&headers, &state.api_key) {
        return StatusCode::UNAUTHORIZED;
    }

    let item = MsgQueueItem {
        to: payload.to,
        from: payload.from,
        msg_type: MsgType::Sms,
        message: payload.message,
        files: Vec::new(),
        received_timestamp: chrono::Utc::now(),
        log_id: format!("{:016x}", rand::random::<u64>()),
        retry_count: 0,
        encoding: None,
        source_handle: None,
    };

    tracing::debug!(carrier, log_id = item.log_id, "inbound carrier message accepted");

    if state.router_tx.send(item).await.is_err() {
        return StatusCode::SERVICE_UNAVAILABLE;
    }
    StatusCode::ACCEPTED
}

pub fn inbound_router(api_key: String, router_tx: mpsc::Sender<MsgQueueItem>) -> Router {
    let state = InboundState {
        api_key: api_key.into(),
        router_tx,
    };
    Router::new()
        .route("/inbound/{carrier}", post(handle_inbound))
        .with_state(state)
}
