//! MM4 Retry Queue (component D): durable queue of pending MMS items with
//! bounded retry count.
//!
//! The durable backing store is a document store (§6, out of scope); this
//! module defines the trait plus an in-memory implementation with a claim
//! set so concurrent `dequeue` calls never hand the same id to two workers.

use crate::model::Mm4QueueItem;
use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashSet;
use std::sync::Mutex;

pub const MAX_RETRIES: u32 = 5;

#[async_trait]
pub trait Mm4Queue: Send + Sync {
    async fn enqueue(&self, item: Mm4QueueItem) -> Result<i64, String>;
    async fn dequeue(&self, batch_size: usize) -> Vec<Mm4QueueItem>;
    async fn increment_retry(&self, id: i64);
    async fn remove(&self, id: i64);
}

#[derive(Default)]
struct State {
    items: Vec<Mm4QueueItem>,
    claimed: HashSet<i64>,
    next_id: i64,
}

#[derive(Default)]
pub struct InMemoryMm4Queue {
    state: Mutex<State>,
}

impl InMemoryMm4Queue {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Mm4Queue for InMemoryMm4Queue {
    async fn enqueue(&self, mut item: Mm4QueueItem) -> Result<i64, String> {
        if item.log_id.is_empty() {
            return Err("log_id must not be empty".to_string());
        }
        let mut state = self.state.lock().expect("mm4 queue mutex poisoned");
        state.next_id += 1;
        item.id = state.next_id;
        item.retry_count = 0;
        item.last_attempt = None;
        let id = item.id;
        state.items.push(item);
        Ok(id)
    }

    async fn dequeue(&self, batch_size: usize) -> Vec<Mm4QueueItem> {
        let mut state = self.state.lock().expect("mm4 queue mutex poisoned");
        let mut eligible: Vec<usize> = state
            .items
            .iter()
            .enumerate()
            .filter(|(_, it)| it.retry_count < MAX_RETRIES && !state.claimed.contains(&it.id))
            .map(|(idx, _)| idx)
            .collect();
        eligible.sort_by_key(|&idx| state.items[idx].created_at);
        eligible.truncate(batch_size);

        let mut out = Vec::with_capacity(eligible.len());
        for idx in eligible {
            let item = state.items[idx].clone();
            state.claimed.insert(item.id);
            out.push(item);
        }
        out
    }

    async fn increment_retry(&self, id: i64) {
        let mut state = self.state.lock().expect("mm4 queue mutex poisoned");
        if let Some(item) = state.items.iter_mut().find(|it| it.id == id) {
            item.retry_count += 1;
            item.last_attempt = Some(Utc::now());
        }
        state.claimed.remove(&id);
    }

    async fn remove(&self, id: i64) {
        let mut state = self.state.lock().expect("mm4 queue mutex poisoned");
        state.items.retain(|it| it.id != id);
        state.claimed.remove(&id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn sample(log_id: &str) -> Mm4QueueItem {
        Mm4QueueItem {
            id: 0,
            from: "15551234567".into(),
            to: "15557654321".into(),
            log_id: log_id.into(),
            content: b"mime bytes".to_vec(),
            headers: HashMap::new(),
            owning_client_id: 1,
            route: "default".into(),
            created_at: Utc::now(),
            retry_count: 0,
            last_attempt: None,
        }
    }

    #[tokio::test]
    async fn enqueue_rejects_empty_log_id() {
        let queue = InMemoryMm4Queue::new();
        let result = queue.enqueue(sample("")).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn dequeue_does_not_hand_claimed_item_to_two_callers() {
        let queue = InMemoryMm4Queue::new();
        queue.enqueue(sample("a")).await.unwrap();

        let first = queue.dequeue(10).await;
        let second = queue.dequeue(10).await;
        assert_eq!(first.len(), 1);
        assert_eq!(second.len(), 0);
    }

    #[tokio::test]
    async fn items_at_max_retries_are_not_redelivered() {
        let queue = InMemoryMm4Queue::new();
        let id = queue.enqueue(sample("a")).await.unwrap();
        for _ in 0..MAX_RETRIES {
            queue.increment_retry(id).await;
        }
        let batch = queue.dequeue(10).await;
        assert!(batch.is_empty());
    }

    #[tokio::test]
    async fn remove_makes_item_unavailable_even_after_claim_release() {
        let queue = InMemoryMm4Queue::new();
        let id = queue.enqueue(sample("a")).await.unwrap();
        queue.dequeue(10).await;
        queue.remove(id).await;
        queue.increment_retry(id).await; // no-op, item gone
        let batch = queue.dequeue(10).await;
        assert!(batch.is_empty());
    }
}
