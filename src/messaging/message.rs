//! # Filing Event Envelope
//!
//! Queue messages carry a JSON envelope referencing a filing by id. Two
//! envelope shapes are accepted:
//!
//! ```json
//! {"filing": {"id": 123, "businessIdentifier": "BC1234567"}, "requestId": "..."}
//! {"id": "...", "data": {"filing": {"header": {"filingId": 123}}, "identifier": "BC1234567"}}
//! ```
//!
//! Decoding is pure: it never touches the store.

use crate::error::{FilerError, FilerResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use uuid::Uuid;

/// A message as read from a queue
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueMessage {
    pub msg_id: i64,
    /// Number of times the message has been read, including this delivery
    pub read_ct: i32,
    pub enqueued_at: DateTime<Utc>,
    pub body: Value,
}

impl QueueMessage {
    pub fn new(msg_id: i64, read_ct: i32, body: Value) -> Self {
        Self {
            msg_id,
            read_ct,
            enqueued_at: Utc::now(),
            body,
        }
    }
}

/// Decoded inbound filing event
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilingEvent {
    pub filing_id: i64,
    pub business_identifier: Option<String>,
    pub correlation_id: String,
    /// 1 on first delivery
    pub delivery_attempt: u32,
    pub message_id: i64,
    pub enqueued_at: DateTime<Utc>,
}

impl FilingEvent {
    /// Event for a filing id outside any queue (tests, manual replays)
    pub fn new(filing_id: i64) -> Self {
        Self {
            filing_id,
            business_identifier: None,
            correlation_id: Uuid::new_v4().to_string(),
            delivery_attempt: 1,
            message_id: 0,
            enqueued_at: Utc::now(),
        }
    }

    pub fn with_business_identifier(mut self, identifier: impl Into<String>) -> Self {
        self.business_identifier = Some(identifier.into());
        self
    }

    pub fn with_attempt(mut self, delivery_attempt: u32) -> Self {
        self.delivery_attempt = delivery_attempt.max(1);
        self
    }

    /// Envelope body in the plain form
    pub fn to_message_body(filing_id: i64, business_identifier: Option<&str>) -> Value {
        let mut filing = json!({ "id": filing_id });
        if let Some(identifier) = business_identifier {
            filing["businessIdentifier"] = Value::String(identifier.to_string());
        }
        json!({ "filing": filing })
    }

    /// Decode a queue message into a filing event
    pub fn decode(message: &QueueMessage) -> FilerResult<Self> {
        let body = message.body.as_object().ok_or_else(|| malformed("body is not a JSON object"))?;

        let (filing_id, business_identifier, correlation) = match body.get("data") {
            Some(data) => {
                let filing_id = data
                    .pointer("/filing/header/filingId")
                    .ok_or_else(|| malformed("missing data.filing.header.filingId"))?;
                let identifier = data.get("identifier").and_then(Value::as_str);
                (filing_id, identifier, body.get("id"))
            }
            None => {
                let filing_id = body
                    .get("filing")
                    .and_then(|filing| filing.get("id"))
                    .ok_or_else(|| malformed("missing filing.id"))?;
                let identifier = body
                    .get("filing")
                    .and_then(|filing| filing.get("businessIdentifier"))
                    .and_then(Value::as_str);
                (filing_id, identifier, body.get("requestId"))
            }
        };

        let filing_id = filing_id
            .as_i64()
            .ok_or_else(|| malformed(format!("filing id {filing_id} is not an integer")))?;
        if filing_id <= 0 {
            return Err(malformed(format!("filing id {filing_id} is not positive")));
        }

        let correlation_id = correlation
            .and_then(Value::as_str)
            .filter(|id| !id.is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| Uuid::new_v4().to_string());

        Ok(Self {
            filing_id,
            business_identifier: business_identifier
                .filter(|id| !id.is_empty())
                .map(str::to_string),
            correlation_id,
            delivery_attempt: u32::try_from(message.read_ct.max(1)).unwrap_or(1),
            message_id: message.msg_id,
            enqueued_at: message.enqueued_at,
        })
    }
}

fn malformed(reason: impl Into<String>) -> FilerError {
    FilerError::MalformedEvent {
        reason: reason.into(),
    }
}
