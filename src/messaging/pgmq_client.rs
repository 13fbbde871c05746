//! # PostgreSQL Message Queue Broker
//!
//! [`MessageBroker`] over the pgmq extension, driven with plain SQL through a
//! shared `sqlx` pool. pgmq's `read_ct` is the delivery attempt and
//! `set_vt` implements delayed redelivery. Dead-lettered messages are copied
//! to the dead-letter queue and archived on the source queue so the original
//! row stays inspectable.

use super::broker::{dead_letter_body, MessageBroker};
use super::errors::{MessagingError, MessagingResult};
use super::message::QueueMessage;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::{PgPool, Row};
use std::time::Duration;
use tracing::{debug, info};

#[derive(Debug, Clone)]
pub struct PgmqBroker {
    pool: PgPool,
}

impl PgmqBroker {
    /// Broker sharing an existing connection pool
    pub fn new_with_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    fn seconds(duration: Duration) -> i32 {
        i32::try_from(duration.as_secs()).unwrap_or(i32::MAX)
    }
}

#[async_trait]
impl MessageBroker for PgmqBroker {
    async fn ensure_queue(&self, queue: &str) -> MessagingResult<()> {
        sqlx::query("SELECT pgmq.create($1)")
            .bind(queue)
            .execute(&self.pool)
            .await
            .map_err(|e| MessagingError::queue_operation(queue, "create", e.to_string()))?;

        info!(queue = queue, "✅ Queue ready");
        Ok(())
    }

    async fn send(&self, queue: &str, body: &Value) -> MessagingResult<i64> {
        let msg_id: i64 = sqlx::query_scalar("SELECT * FROM pgmq.send($1, $2)")
            .bind(queue)
            .bind(body)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| MessagingError::queue_operation(queue, "send", e.to_string()))?;

        debug!(queue = queue, msg_id = msg_id, "📤 Message sent");
        Ok(msg_id)
    }

    async fn read(
        &self,
        queue: &str,
        visibility_timeout: Duration,
    ) -> MessagingResult<Option<QueueMessage>> {
        let row = sqlx::query(
            "SELECT msg_id, read_ct, enqueued_at, message FROM pgmq.read($1, $2, 1)",
        )
        .bind(queue)
        .bind(Self::seconds(visibility_timeout))
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| MessagingError::queue_operation(queue, "read", e.to_string()))?;

        let Some(row) = row else {
            return Ok(None);
        };

        let msg_id: i64 = row.try_get("msg_id")?;
        let read_ct: i32 = row.try_get("read_ct")?;
        let enqueued_at: DateTime<Utc> = row.try_get("enqueued_at")?;
        let body: Option<Value> = row.try_get("message")?;

        debug!(queue = queue, msg_id = msg_id, read_ct = read_ct, "📨 Message read");
        Ok(Some(QueueMessage {
            msg_id,
            read_ct,
            enqueued_at,
            body: body.unwrap_or(Value::Null),
        }))
    }

    async fn ack(&self, queue: &str, msg_id: i64) -> MessagingResult<()> {
        let deleted: bool = sqlx::query_scalar("SELECT pgmq.delete($1, $2::bigint)")
            .bind(queue)
            .bind(msg_id)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| MessagingError::queue_operation(queue, "delete", e.to_string()))?;

        if !deleted {
            return Err(MessagingError::MessageNotFound {
                queue_name: queue.to_string(),
                msg_id,
            });
        }
        Ok(())
    }

    async fn nack(&self, queue: &str, msg_id: i64, delay: Duration) -> MessagingResult<()> {
        sqlx::query("SELECT msg_id FROM pgmq.set_vt($1, $2, $3)")
            .bind(queue)
            .bind(msg_id)
            .bind(Self::seconds(delay))
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| MessagingError::queue_operation(queue, "set_vt", e.to_string()))?
            .ok_or_else(|| MessagingError::MessageNotFound {
                queue_name: queue.to_string(),
                msg_id,
            })?;
        Ok(())
    }

    async fn dead_letter(
        &self,
        queue: &str,
        message: &QueueMessage,
        dead_letter_queue: &str,
        reason: &str,
    ) -> MessagingResult<()> {
        self.send(dead_letter_queue, &dead_letter_body(queue, message, reason))
            .await?;

        sqlx::query("SELECT pgmq.archive($1, $2::bigint)")
            .bind(queue)
            .bind(message.msg_id)
            .execute(&self.pool)
            .await
            .map_err(|e| MessagingError::queue_operation(queue, "archive", e.to_string()))?;

        info!(
            queue = queue,
            msg_id = message.msg_id,
            dead_letter_queue = dead_letter_queue,
            "📦 Message dead-lettered"
        );
        Ok(())
    }
}
