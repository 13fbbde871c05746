//! # In-Memory Broker
//!
//! Process-local [`MessageBroker`] with visibility timeouts and read counts,
//! used by tests and local runs. Queues are created on first use. Individual
//! queues can be marked unavailable to exercise publish failures.
//!
//! ```rust
//! use filing_processor::messaging::{InMemoryBroker, MessageBroker};
//! use serde_json::json;
//! use std::time::Duration;
//!
//! # tokio_test::block_on(async {
//! let broker = InMemoryBroker::new();
//! broker.send("filer", &json!({"filing": {"id": 42}})).await.unwrap();
//!
//! let message = broker.read("filer", Duration::from_secs(30)).await.unwrap().unwrap();
//! assert_eq!(message.read_ct, 1);
//! // hidden from other consumers until acked, nacked or timed out
//! assert!(broker.read("filer", Duration::from_secs(30)).await.unwrap().is_none());
//!
//! broker.ack("filer", message.msg_id).await.unwrap();
//! assert!(broker.is_empty("filer"));
//! # });
//! ```

use super::broker::MessageBroker;
use super::errors::{MessagingError, MessagingResult};
use super::message::QueueMessage;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

#[derive(Debug, Clone)]
struct StoredMessage {
    msg_id: i64,
    read_ct: i32,
    enqueued_at: DateTime<Utc>,
    visible_at: Instant,
    body: Value,
}

#[derive(Debug, Default)]
struct BrokerState {
    queues: HashMap<String, VecDeque<StoredMessage>>,
    unavailable: HashSet<String>,
}

#[derive(Debug, Clone)]
pub struct InMemoryBroker {
    state: Arc<Mutex<BrokerState>>,
    next_msg_id: Arc<AtomicI64>,
}

impl Default for InMemoryBroker {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryBroker {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(BrokerState::default())),
            next_msg_id: Arc::new(AtomicI64::new(1)),
        }
    }

    /// Fail every operation on `queue` until re-enabled
    pub fn set_unavailable(&self, queue: &str, unavailable: bool) {
        let mut state = self.state.lock();
        if unavailable {
            state.unavailable.insert(queue.to_string());
        } else {
            state.unavailable.remove(queue);
        }
    }

    /// Bodies of all messages currently in `queue`, visible or not
    pub fn messages(&self, queue: &str) -> Vec<Value> {
        self.state
            .lock()
            .queues
            .get(queue)
            .map(|messages| messages.iter().map(|m| m.body.clone()).collect())
            .unwrap_or_default()
    }

    pub fn len(&self, queue: &str) -> usize {
        self.state.lock().queues.get(queue).map_or(0, VecDeque::len)
    }

    pub fn is_empty(&self, queue: &str) -> bool {
        self.len(queue) == 0
    }

    fn check_available(state: &BrokerState, queue: &str) -> MessagingResult<()> {
        if state.unavailable.contains(queue) {
            return Err(MessagingError::queue_unavailable(queue));
        }
        Ok(())
    }
}

#[async_trait]
impl MessageBroker for InMemoryBroker {
    async fn ensure_queue(&self, queue: &str) -> MessagingResult<()> {
        self.state.lock().queues.entry(queue.to_string()).or_default();
        Ok(())
    }

    async fn send(&self, queue: &str, body: &Value) -> MessagingResult<i64> {
        let mut state = self.state.lock();
        Self::check_available(&state, queue)?;

        let msg_id = self.next_msg_id.fetch_add(1, Ordering::SeqCst);
        state
            .queues
            .entry(queue.to_string())
            .or_default()
            .push_back(StoredMessage {
                msg_id,
                read_ct: 0,
                enqueued_at: Utc::now(),
                visible_at: Instant::now(),
                body: body.clone(),
            });
        debug!(queue = queue, msg_id = msg_id, "📤 Message sent");
        Ok(msg_id)
    }

    async fn read(
        &self,
        queue: &str,
        visibility_timeout: Duration,
    ) -> MessagingResult<Option<QueueMessage>> {
        let mut state = self.state.lock();
        Self::check_available(&state, queue)?;

        let now = Instant::now();
        let Some(messages) = state.queues.get_mut(queue) else {
            return Ok(None);
        };
        let Some(stored) = messages.iter_mut().find(|m| m.visible_at <= now) else {
            return Ok(None);
        };

        stored.read_ct += 1;
        stored.visible_at = now + visibility_timeout;
        Ok(Some(QueueMessage {
            msg_id: stored.msg_id,
            read_ct: stored.read_ct,
            enqueued_at: stored.enqueued_at,
            body: stored.body.clone(),
        }))
    }

    async fn ack(&self, queue: &str, msg_id: i64) -> MessagingResult<()> {
        let mut state = self.state.lock();
        Self::check_available(&state, queue)?;

        let messages = state
            .queues
            .get_mut(queue)
            .ok_or_else(|| MessagingError::queue_not_found(queue))?;
        let before = messages.len();
        messages.retain(|m| m.msg_id != msg_id);
        if messages.len() == before {
            return Err(MessagingError::MessageNotFound {
                queue_name: queue.to_string(),
                msg_id,
            });
        }
        Ok(())
    }

    async fn nack(&self, queue: &str, msg_id: i64, delay: Duration) -> MessagingResult<()> {
        let mut state = self.state.lock();
        Self::check_available(&state, queue)?;

        let stored = state
            .queues
            .get_mut(queue)
            .and_then(|messages| messages.iter_mut().find(|m| m.msg_id == msg_id))
            .ok_or_else(|| MessagingError::MessageNotFound {
                queue_name: queue.to_string(),
                msg_id,
            })?;
        stored.visible_at = Instant::now() + delay;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const VT: Duration = Duration::from_secs(30);

    #[tokio::test]
    async fn test_read_hides_message_until_acked() {
        let broker = InMemoryBroker::new();
        let msg_id = broker.send("filer", &json!({"filing": {"id": 1}})).await.unwrap();

        let first = broker.read("filer", VT).await.unwrap().unwrap();
        assert_eq!(first.msg_id, msg_id);
        assert_eq!(first.read_ct, 1);
        assert!(broker.read("filer", VT).await.unwrap().is_none());

        broker.ack("filer", msg_id).await.unwrap();
        assert!(broker.is_empty("filer"));
    }

    #[tokio::test]
    async fn test_nack_redelivers_after_delay_with_incremented_read_count() {
        let broker = InMemoryBroker::new();
        let msg_id = broker.send("filer", &json!({"filing": {"id": 1}})).await.unwrap();

        broker.read("filer", VT).await.unwrap().unwrap();
        broker.nack("filer", msg_id, Duration::from_millis(50)).await.unwrap();
        assert!(broker.read("filer", VT).await.unwrap().is_none());

        tokio::time::sleep(Duration::from_millis(80)).await;
        let again = broker.read("filer", VT).await.unwrap().unwrap();
        assert_eq!(again.read_ct, 2);
    }

    #[tokio::test]
    async fn test_dead_letter_moves_message() {
        let broker = InMemoryBroker::new();
        broker.send("filer", &json!({"filing": {"id": 3}})).await.unwrap();
        let message = broker.read("filer", VT).await.unwrap().unwrap();

        broker
            .dead_letter("filer", &message, "filer_dlq", "FilingNotFoundError")
            .await
            .unwrap();

        assert!(broker.is_empty("filer"));
        let dead = broker.messages("filer_dlq");
        assert_eq!(dead.len(), 1);
        assert_eq!(dead[0]["reason"], "FilingNotFoundError");
        assert_eq!(dead[0]["message"]["filing"]["id"], 3);
    }

    #[tokio::test]
    async fn test_unavailable_queue_rejects_sends() {
        let broker = InMemoryBroker::new();
        broker.set_unavailable("emailer", true);
        let err = broker.send("emailer", &json!({})).await.unwrap_err();
        assert!(matches!(err, MessagingError::QueueUnavailable { .. }));

        broker.set_unavailable("emailer", false);
        assert!(broker.send("emailer", &json!({})).await.is_ok());
    }
}
