//! Record Writer (component I): durable, asynchronous logging of accepted
//! message legs, and the `record_pair` helper design note §9 calls for so
//! the outbound/inbound pair can never disagree on `internal`.

use crate::gateway::store::MessageStore;
use crate::model::{
    Client, ClientType, DeliveryMethod, Direction, Encoding, MediaFile, MsgQueueItem, MsgRecord,
    RecordStatus,
};
use std::sync::Arc;
use tokio::sync::mpsc;

/// Everything the router decided about how a message was (or wasn't)
/// delivered, independent of which side's record is being written.
pub struct DispatchContext<'a> {
    pub from_client: Option<&'a Client>,
    pub to_client: Option<&'a Client>,
    pub delivery_method: DeliveryMethod,
    pub segment_count: u32,
    pub status: RecordStatus,
}

fn client_type(client: Option<&Client>) -> Option<ClientType> {
    client.map(|c| c.client_type)
}

/// Sum of raw media byte lengths plus three-quarters of any base64-encoded
/// payload length, per §4.I. `MediaFile::data` here always holds raw bytes;
/// the base64 term is zero until a transport that carries base64 directly
/// is wired in, and is kept so the formula matches the spec exactly.
fn media_metrics(files: &[MediaFile]) -> (u32, u64) {
    let media_count = files.len() as u32;
    let media_bytes: u64 = files.iter().map(|f| f.data.len() as u64).sum();
    (media_count, media_bytes)
}

/// Build the one or two `MsgRecord`s for `item`, per §3: one per side when
/// both ends are on-net, `internal=true` in that case; one record, keyed to
/// whichever side is known, otherwise.
pub fn record_pair(item: &MsgQueueItem, ctx: &DispatchContext<'_>) -> Vec<MsgRecord> {
    let (media_count, media_bytes) = media_metrics(&item.files);
    let internal = ctx.from_client.is_some() && ctx.to_client.is_some();

    let mut records = Vec::with_capacity(2);

    if let Some(from_client) = ctx.from_client {
        records.push(MsgRecord {
            log_id: item.log_id.clone(),
            client_id: from_client.id,
            from: item.from.clone(),
            to: item.to.clone(),
            direction: Direction::Outbound,
            from_client_type: client_type(ctx.from_client),
            to_client_type: client_type(ctx.to_client),
            internal,
            delivery_method: ctx.delivery_method,
            encoding: item.encoding,
            segment_count: ctx.segment_count,
            media_count,
            media_bytes,
            status: ctx.status,
            received_timestamp: item.received_timestamp,
        });
    }

    if let Some(to_client) = ctx.to_client {
        records.push(MsgRecord {
            log_id: item.log_id.clone(),
            client_id: to_client.id,
            from: item.from.clone(),
            to: item.to.clone(),
            direction: Direction::Inbound,
            from_client_type: client_type(ctx.from_client),
            to_client_type: client_type(ctx.to_client),
            internal,
            delivery_method: ctx.delivery_method,
            encoding: item.encoding,
            segment_count: ctx.segment_count,
            media_count,
            media_bytes,
            status: ctx.status,
            received_timestamp: item.received_timestamp,
        });
    }

    records
}

fn encoding_name(encoding: Option<Encoding>) -> &'static str {
    match encoding {
        Some(Encoding::Gsm7) => "gsm7",
        Some(Encoding::Ascii) => "ascii",
        Some(Encoding::Ucs2) => "ucs2",
        None => "none",
    }
}

/// Consumes `MsgRecord`s from a channel and inserts them into the store.
/// Insert failures are logged and discarded; the writer never blocks or
/// propagates errors back to the router.
pub struct RecordWriter {
    store: Arc<dyn MessageStore>,
}

impl RecordWriter {
    pub fn new(store: Arc<dyn MessageStore>) -> Self {
        Self { store }
    }

    pub async fn run(self: Arc<Self>, mut rx: mpsc::Receiver<MsgRecord>) {
        while let Some(record) = rx.recv().await {
            let log_id = record.log_id.clone();
            let encoding = encoding_name(record.encoding);
            self.store.insert(record).await;
            tracing::debug!(subsystem = "record_writer", log_id, encoding, "record inserted");
        }
    }
}
