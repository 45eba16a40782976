//! Conversation Deduper (component H): coalesce rapidly-arriving duplicate
//! segments of the same conversation before routing.

use crate::model::MsgQueueItem;
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;
use tokio::sync::mpsc;

pub const DEFAULT_GRACE: Duration = Duration::from_secs(2);

fn correlation_key(from: &str, to: &str) -> String {
    if from <= to {
        format!("{from}|{to}")
    } else {
        format!("{to}|{from}")
    }
}

struct KeyWorker {
    inbox: mpsc::Sender<MsgQueueItem>,
}

/// Coalesces same-key, same-text, same-type items arriving within `grace`
/// of one another into a single emitted item; everything else flows
/// through unchanged, in arrival order per key.
pub struct Deduper {
    grace: Duration,
    out: mpsc::Sender<MsgQueueItem>,
    workers: Mutex<HashMap<String, KeyWorker>>,
}

impl Deduper {
    pub fn new(out: mpsc::Sender<MsgQueueItem>, grace: Duration) -> Self {
        Self {
            grace,
            out,
            workers: Mutex::new(HashMap::new()),
        }
    }

    /// Submit an item for deduplication. Spawns a per-key worker task on
    /// first use of a key; subsequent items for the same key are handed to
    /// the existing worker so ordering is preserved.
    pub async fn push(&self, item: MsgQueueItem) {
        let key = correlation_key(&item.from, &item.to);
        let sender = {
            let mut workers = self.workers.lock().expect("deduper mutex poisoned");
            if let Some(worker) = workers.get(&key) {
                if !worker.inbox.is_closed() {
                    Some(worker.inbox.clone())
                } else {
                    workers.remove(&key);
                    None
                }
            } else {
                None
            }
        };

        let sender = match sender {
            Some(s) => s,
            None => self.spawn_worker(key),
        };

        // The worker task owns ordering and coalescing; a full inbox means
        // the worker is behind, which should not happen at the tiny queue
        // depths this component sees, but back off rather than block the
        // router indefinitely.
        let _ = sender.send(item).await;
    }

    fn spawn_worker(&self, key: String) -> mpsc::Sender<MsgQueueItem> {
        let (tx, rx) = mpsc::channel(32);
        {
            let mut workers = self.workers.lock().expect("deduper mutex poisoned");
            workers.insert(
                key.clone(),
                KeyWorker {
                    inbox: tx.clone(),
                },
            );
        }
        let out = self.out.clone();
        let grace = self.grace;
        tokio::spawn(run_worker(rx, out, grace));
        tx
    }
}

async fn run_worker(
    mut rx: mpsc::Receiver<MsgQueueItem>,
    out: mpsc::Sender<MsgQueueItem>,
    grace: Duration,
) {
    let mut pending: Option<MsgQueueItem> = None;
    loop {
        let recv = tokio::time::timeout(grace, rx.recv()).await;
        match recv {
            Ok(Some(item)) => {
                if let Some(current) = &pending {
                    let same = current.message == item.message
                        && std::mem::discriminant(&current.msg_type)
                            == std::mem::discriminant(&item.msg_type);
                    if same {
                        // coalesce: drop the duplicate, keep waiting
                        continue;
                    }
                    // different content for the same key: flush the
                    // pending item before starting the next group so
                    // ordering is preserved.
                    let flushed = pending.replace(item);
                    if let Some(flushed) = flushed {
                        if out.send(flushed).await.is_err() {
                            return;
                        }
                    }
                } else {
                    pending = Some(item);
                }
            }
            Ok(None) => {
                if let Some(item) = pending.take() {
                    let _ = out.send(item).await;
                }
                return;
            }
            Err(_elapsed) => {
                if let Some(item) = pending.take() {
                    if out.send(item).await.is_err() {
                        return;
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::MsgType;
    use chrono::Utc;

    fn item(from: &str, to: &str, text: &str) -> MsgQueueItem {
        MsgQueueItem {
            to: to.into(),
            from: from.into(),
            msg_type: MsgType::Sms,
            message: Some(text.into()),
            files: Vec::new(),
            received_timestamp: Utc::now(),
            log_id: "log-1".into(),
            retry_count: 0,
            encoding: None,
            source_handle: None,
        }
    }

    #[tokio::test]
    async fn coalesces_duplicate_text_within_grace_window() {
        let (tx, mut rx) = mpsc::channel(8);
        let deduper = Deduper::new(tx, Duration::from_millis(50));

        deduper.push(item("15551234567", "15557654321", "hi")).await;
        deduper.push(item("15551234567", "15557654321", "hi")).await;

        let emitted = tokio::time::timeout(Duration::from_millis(500), rx.recv())
            .await
            .expect("should emit")
            .expect("channel open");
        assert_eq!(emitted.message.as_deref(), Some("hi"));

        let nothing_more = tokio::time::timeout(Duration::from_millis(100), rx.recv()).await;
        assert!(nothing_more.is_err(), "second duplicate should be coalesced");
    }

    #[tokio::test]
    async fn distinct_text_flows_through_in_order() {
        let (tx, mut rx) = mpsc::channel(8);
        let deduper = Deduper::new(tx, Duration::from_millis(50));

        deduper
            .push(item("15551234567", "15557654321", "first"))
            .await;
        deduper
            .push(item("15551234567", "15557654321", "second"))
            .await;

        let first = rx.recv().await.expect("first item");
        assert_eq!(first.message.as_deref(), Some("first"));
        let second = rx.recv().await.expect("second item");
        assert_eq!(second.message.as_deref(), Some("second"));
    }

    #[test]
    fn correlation_key_is_direction_independent() {
        assert_eq!(
            correlation_key("15551234567", "15557654321"),
            correlation_key("15557654321", "15551234567")
        );
    }
}
