//! Gateway data model: clients, numbers, in-flight items, and persisted records.
//!
//! These types are plain values; persistence (§6's SQL database and document
//! store) is an external collaborator. `serde` derives let the document-store
//! and webhook-JSON boundaries (de)serialize them without a bespoke mapper.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Closed encoding choice, decided once by the text normalizer and carried
/// on the item for the rest of its life instead of a raw `DataCoding` byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Encoding {
    Gsm7,
    Ascii,
    Ucs2,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MsgType {
    Sms,
    Mms,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Direction {
    Outbound,
    Inbound,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ClientType {
    Legacy,
    Web,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeliveryMethod {
    Smpp,
    Mm4,
    CarrierApi,
    Webhook,
}

/// Per-period, per-type rate limits. `0` means unlimited.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimits {
    pub sms_burst: i64,
    pub sms_daily: i64,
    pub sms_monthly: i64,
    pub mms_burst: i64,
    pub mms_daily: i64,
    pub mms_monthly: i64,
}

/// Client-level or number-level rate-limit configuration. `limit_both`
/// extends enforcement to inbound traffic; outbound is always enforced.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientSettings {
    pub limits: RateLimits,
    pub limit_both: bool,
}

pub type NumberSettings = ClientSettings;

/// A telephone number owned by a client, in E.164 without a leading `+`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientNumber {
    pub number: String,
    pub client_id: i64,
    pub carrier: String,
    pub ignore_stop_cmd_sending: bool,
    pub settings: Option<NumberSettings>,
    pub webhook_url: Option<String>,
}

/// Identity of a bound peer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Client {
    pub id: i64,
    pub username: String,
    /// Decrypted password, held in memory only. At-rest encryption is an
    /// external collaborator (§6); nothing in this crate encrypts it.
    pub password: String,
    pub client_type: ClientType,
    pub timezone: chrono_tz::Tz,
    pub log_privacy: bool,
    pub settings: Option<ClientSettings>,
}

impl Client {
    pub fn effective_settings(&self) -> ClientSettings {
        self.settings.unwrap_or_default()
    }
}

/// A media attachment on an MMS item.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MediaFile {
    pub content_type: String,
    pub data: Vec<u8>,
}

/// The in-flight message as it travels from ingestion through routing.
#[derive(Debug, Clone)]
pub struct MsgQueueItem {
    pub to: String,
    pub from: String,
    pub msg_type: MsgType,
    pub message: Option<String>,
    pub files: Vec<MediaFile>,
    pub received_timestamp: chrono::DateTime<chrono::Utc>,
    pub log_id: String,
    pub retry_count: u32,
    pub encoding: Option<Encoding>,
    /// Handle back to the originating SMPP session so it can be ack'd or
    /// nothing if the message originated outside a tracked session (e.g. MM4).
    pub source_handle: Option<SourceHandle>,
}

/// Identifies the originating SMPP session and sequence number, so the
/// router can ack the source delivery once a terminal disposition is
/// reached, without holding a reference to the session itself.
#[derive(Debug, Clone)]
pub struct SourceHandle {
    pub username: String,
    pub sequence_number: u32,
}

/// A persisted MM4 retry-queue item.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Mm4QueueItem {
    pub id: i64,
    pub from: String,
    pub to: String,
    pub log_id: String,
    pub content: Vec<u8>,
    pub headers: HashMap<String, String>,
    pub owning_client_id: i64,
    pub route: String,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub retry_count: u32,
    pub last_attempt: Option<chrono::DateTime<chrono::Utc>>,
}

/// Outcome status recorded on a `MsgRecord` when dispatch did not succeed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RecordStatus {
    Delivered,
    RateLimited,
    RouterFindSmppFailed,
    Mm4FailedTerminal,
    CarrierFailedTerminal,
}

/// One persisted leg of a message, per §3: up to two are written per item.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MsgRecord {
    pub log_id: String,
    pub client_id: i64,
    pub from: String,
    pub to: String,
    pub direction: Direction,
    pub from_client_type: Option<ClientType>,
    pub to_client_type: Option<ClientType>,
    pub internal: bool,
    pub delivery_method: DeliveryMethod,
    pub encoding: Option<Encoding>,
    pub segment_count: u32,
    pub media_count: u32,
    pub media_bytes: u64,
    pub status: RecordStatus,
    pub received_timestamp: chrono::DateTime<chrono::Utc>,
}
