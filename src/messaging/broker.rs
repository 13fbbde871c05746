//! # Message Broker
//!
//! At-least-once queue contract shared by the pgmq and in-memory adapters.
//! A message read with a visibility timeout stays invisible to other
//! consumers until it is acknowledged, negatively acknowledged with a delay,
//! or the timeout lapses.

use super::errors::MessagingResult;
use super::message::QueueMessage;
use async_trait::async_trait;
use serde_json::{json, Value};
use std::fmt::Debug;
use std::time::Duration;

#[async_trait]
pub trait MessageBroker: Send + Sync + Debug {
    /// Create the queue if it does not exist
    async fn ensure_queue(&self, queue: &str) -> MessagingResult<()>;

    async fn send(&self, queue: &str, body: &Value) -> MessagingResult<i64>;

    /// Read the next visible message, hiding it for `visibility_timeout`
    async fn read(
        &self,
        queue: &str,
        visibility_timeout: Duration,
    ) -> MessagingResult<Option<QueueMessage>>;

    /// Remove a processed message
    async fn ack(&self, queue: &str, msg_id: i64) -> MessagingResult<()>;

    /// Make the message visible again after `delay`
    async fn nack(&self, queue: &str, msg_id: i64, delay: Duration) -> MessagingResult<()>;

    /// Move a message to `dead_letter_queue` with the failure reason attached
    async fn dead_letter(
        &self,
        queue: &str,
        message: &QueueMessage,
        dead_letter_queue: &str,
        reason: &str,
    ) -> MessagingResult<()> {
        self.send(dead_letter_queue, &dead_letter_body(queue, message, reason))
            .await?;
        self.ack(queue, message.msg_id).await
    }
}

/// Body written to the dead-letter queue
pub fn dead_letter_body(queue: &str, message: &QueueMessage, reason: &str) -> Value {
    json!({
        "sourceQueue": queue,
        "msgId": message.msg_id,
        "readCt": message.read_ct,
        "enqueuedAt": message.enqueued_at,
        "reason": reason,
        "message": message.body,
    })
}
