//! MM4 Send Loop (component F): drains the retry queue (component D) in
//! batches and delivers each item over SMTP, per the MM4-over-SMTP
//! transport named in §6.

use crate::gateway::mm4_queue::{Mm4Queue, MAX_RETRIES};
use crate::model::{Direction, DeliveryMethod, Mm4QueueItem, MsgRecord, RecordStatus};
use lettre::message::header::ContentType;
use lettre::transport::smtp::client::{Tls, TlsParameters};
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

const BATCH_SIZE: usize = 16;
const POLL_INTERVAL: Duration = Duration::from_secs(5);

/// Outcome of a single delivery attempt, used to decide what the queue does
/// with the item next.
enum AttemptOutcome {
    Delivered,
    Retry,
    Terminal,
}

/// Drains the MM4 retry queue on a timer, sending each eligible item over
/// SMTP to its destination route. Any send failure leaves the item queued
/// for the next pass with its retry count bumped; reaching `MAX_RETRIES`
/// removes it and records a terminal failure.
pub struct Mm4SendLoop {
    queue: Arc<dyn Mm4Queue>,
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from_address: String,
    record_tx: mpsc::Sender<MsgRecord>,
}

impl Mm4SendLoop {
    pub fn new(
        queue: Arc<dyn Mm4Queue>,
        smtp_host: &str,
        smtp_port: u16,
        from_address: String,
        record_tx: mpsc::Sender<MsgRecord>,
    ) -> Self {
        let transport = AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(smtp_host)
            .port(smtp_port)
            .tls(Tls::Opportunistic(
                TlsParameters::builder(smtp_host.to_string())
                    .build()
                    .expect("smtp host always produces valid tls params"),
            ))
            .build();
        Self {
            queue,
            transport,
            from_address,
            record_tx,
        }
    }

    /// Run forever, polling the queue at a fixed interval. Intended to be
    /// spawned once per process; `batch_size` is exposed for tests.
    pub async fn run(self: Arc<Self>) {
        loop {
            self.drain_once(BATCH_SIZE).await;
            tokio::time::sleep(POLL_INTERVAL).await;
        }
    }

    pub async fn drain_once(&self, batch_size: usize) {
        let batch = self.queue.dequeue(batch_size).await;
        for item in batch {
            match self.attempt(&item).await {
                AttemptOutcome::Delivered => {
                    self.queue.remove(item.id).await;
                    tracing::info!(subsystem = "mm4_send", log_id = item.log_id, "mm4 delivered");
                }
                AttemptOutcome::Retry => {
                    if item.retry_count + 1 >= MAX_RETRIES {
                        self.queue.remove(item.id).await;
                        self.emit_terminal_failure(&item).await;
                    } else {
                        self.queue.increment_retry(item.id).await;
                    }
                }
                AttemptOutcome::Terminal => {
                    self.queue.remove(item.id).await;
                    self.emit_terminal_failure(&item).await;
                }
            }
        }
    }

    async fn attempt(&self, item: &Mm4QueueItem) -> AttemptOutcome {
        let message = match build_message(&self.from_address, item) {
            Ok(m) => m,
            Err(err) => {
                tracing::error!(log_id = item.log_id, %err, "mm4 message could not be built, dropping");
                return AttemptOutcome::Terminal;
            }
        };

        match self.transport.send(message).await {
            Ok(_) => AttemptOutcome::Delivered,
            // lettre surfaces both connection failures and SMTP-level
            // rejections as the same error type; either way the item goes
            // back on the queue and retry exhaustion is what ultimately
            // turns it terminal, per §7's permanent-transport handling.
            Err(err) => {
                tracing::warn!(log_id = item.log_id, %err, "mm4 smtp send failed");
                AttemptOutcome::Retry
            }
        }
    }

    /// Persist the terminal disposition of an item that exhausted its
    /// retries or could never be turned into a message. `Mm4QueueItem`
    /// only carries the owning client's id, not a full `Client`, so this
    /// builds the record directly rather than through `record_pair`.
    async fn emit_terminal_failure(&self, item: &Mm4QueueItem) {
        tracing::error!(
            subsystem = "mm4_send",
            log_id = item.log_id,
            status = ?RecordStatus::Mm4FailedTerminal,
            "mm4 item exhausted retries"
        );

        let record = MsgRecord {
            log_id: item.log_id.clone(),
            client_id: item.owning_client_id,
            from: item.from.clone(),
            to: item.to.clone(),
            direction: Direction::Outbound,
            from_client_type: None,
            to_client_type: None,
            internal: false,
            delivery_method: DeliveryMethod::Mm4,
            encoding: None,
            segment_count: 0,
            media_count: 1,
            media_bytes: item.content.len() as u64,
            status: RecordStatus::Mm4FailedTerminal,
            received_timestamp: item.created_at,
        };
        if self.record_tx.send(record).await.is_err() {
            tracing::warn!(log_id = item.log_id, "record channel closed, dropping mm4 terminal record");
        }
    }
}

fn build_message(from_address: &str, item: &Mm4QueueItem) -> Result<Message, String> {
    let to = format!("{}@{}", item.to, item.route);
    Message::builder()
        .from(from_address.parse().map_err(|e| format!("{e}"))?)
        .to(to.parse().map_err(|e| format!("{e}"))?)
        .header(ContentType::parse("multipart/mixed").map_err(|e| format!("{e}"))?)
        .body(item.content.clone())
        .map_err(|e| e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::mm4_queue::InMemoryMm4Queue;
    use chrono::Utc;
    use std::collections::HashMap;

    fn sample() -> Mm4QueueItem {
        Mm4QueueItem {
            id: 0,
            from: "15551234567".into(),
            to: "15557654321".into(),
            log_id: "log-1".into(),
            content: b"not a real mime body".to_vec(),
            headers: HashMap::new(),
            owning_client_id: 1,
            route: "mms.example.invalid".into(),
            created_at: Utc::now(),
            retry_count: 0,
            last_attempt: None,
        }
    }

    #[tokio::test]
    async fn drain_with_unreachable_host_increments_retry_not_remove() {
        let queue = Arc::new(InMemoryMm4Queue::new());
        let id = queue.enqueue(sample()).await.unwrap();
        let (record_tx, _record_rx) = mpsc::channel(8);

        let loop_ = Mm4SendLoop::new(
            queue.clone(),
            "mm4-send-loop-test.invalid",
            25,
            "gateway@example.invalid".into(),
            record_tx,
        );
        loop_.drain_once(10).await;

        // host is unresolvable, so the attempt fails transiently and the
        // item is re-queued with a bumped retry count rather than removed.
        let requeued = queue.dequeue(10).await;
        assert_eq!(requeued.len(), 1);
        assert_eq!(requeued[0].id, id);
        assert_eq!(requeued[0].retry_count, 1);
    }

    #[tokio::test]
    async fn exhausting_retries_emits_terminal_record() {
        let queue = Arc::new(InMemoryMm4Queue::new());
        queue.enqueue(sample()).await.unwrap();
        let (record_tx, mut record_rx) = mpsc::channel(8);

        let loop_ = Mm4SendLoop::new(
            queue.clone(),
            "mm4-send-loop-test.invalid",
            25,
            "gateway@example.invalid".into(),
            record_tx,
        );
        for _ in 0..MAX_RETRIES {
            loop_.drain_once(10).await;
        }

        assert!(queue.dequeue(10).await.is_empty());
        let record = record_rx.try_recv().expect("terminal record emitted");
        assert_eq!(record.status, RecordStatus::Mm4FailedTerminal);
        assert_eq!(record.delivery_method, DeliveryMethod::Mm4);
    }
}
