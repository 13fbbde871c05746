//! # Filing
//!
//! Persistent record of a submitted filing. The payload (`filing_json`) is
//! opaque here; processors read the sub-document named after the filing type.

use super::filing_type::FilingType;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Filing lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FilingStatus {
    Draft,
    Pending,
    Paid,
    Completed,
    Error,
    Withdrawn,
}

impl FilingStatus {
    /// Completed filings are immutable to processors
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Withdrawn)
    }

    /// Whether the pipeline may apply the filing in this status
    pub fn is_processable(&self) -> bool {
        matches!(self, Self::Pending | Self::Paid | Self::Error)
    }

    /// Monotonic transitions plus the explicit reversals (withdrawal, error retry)
    pub fn can_transition_to(&self, target: FilingStatus) -> bool {
        use FilingStatus::*;
        matches!(
            (self, target),
            (Draft, Pending)
                | (Draft, Withdrawn)
                | (Pending, Paid)
                | (Pending, Completed)
                | (Pending, Error)
                | (Pending, Withdrawn)
                | (Paid, Completed)
                | (Paid, Error)
                | (Paid, Withdrawn)
                | (Error, Paid)
                | (Error, Completed)
                | (Error, Withdrawn)
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Draft => "DRAFT",
            Self::Pending => "PENDING",
            Self::Paid => "PAID",
            Self::Completed => "COMPLETED",
            Self::Error => "ERROR",
            Self::Withdrawn => "WITHDRAWN",
        }
    }
}

impl fmt::Display for FilingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for FilingStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "DRAFT" => Ok(Self::Draft),
            "PENDING" => Ok(Self::Pending),
            "PAID" => Ok(Self::Paid),
            "COMPLETED" => Ok(Self::Completed),
            "ERROR" => Ok(Self::Error),
            "WITHDRAWN" => Ok(Self::Withdrawn),
            _ => Err(format!("Invalid filing status: {s}")),
        }
    }
}

impl Default for FilingStatus {
    fn default() -> Self {
        Self::Draft
    }
}

/// Staff or system comment attached to a filing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Comment {
    pub comment: String,
    pub staff_id: Option<String>,
    pub timestamp: DateTime<Utc>,
}

/// Last processing failure recorded against a filing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessingError {
    pub error_class: String,
    pub message: String,
    pub retryable: bool,
    pub attempt: u32,
    pub failed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Filing {
    pub id: i64,
    pub business_id: Option<i64>,
    /// Raw type name as stored; resolved against the processor registry at dispatch
    pub filing_type: String,
    pub status: FilingStatus,
    pub filing_json: Value,
    pub effective_date: DateTime<Utc>,
    pub submitter_id: Option<String>,
    pub completion_date: Option<DateTime<Utc>>,
    pub court_order_file_number: Option<String>,
    pub court_order_date: Option<DateTime<Utc>>,
    pub court_order_effect_of_order: Option<String>,
    pub order_details: Option<String>,
    pub meta_data: Option<Value>,
    pub comments: Vec<Comment>,
    pub withdrawn_filing_id: Option<i64>,
    pub corrected_filing_id: Option<i64>,
    pub processing_error: Option<ProcessingError>,
    pub version: i64,
}

impl Filing {
    /// New unprocessed filing with an empty payload
    pub fn new(
        id: i64,
        business_id: Option<i64>,
        filing_type: impl Into<String>,
        effective_date: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            business_id,
            filing_type: filing_type.into(),
            status: FilingStatus::Paid,
            filing_json: Value::Object(Default::default()),
            effective_date,
            submitter_id: None,
            completion_date: None,
            court_order_file_number: None,
            court_order_date: None,
            court_order_effect_of_order: None,
            order_details: None,
            meta_data: None,
            comments: Vec::new(),
            withdrawn_filing_id: None,
            corrected_filing_id: None,
            processing_error: None,
            version: 0,
        }
    }

    pub fn with_payload(mut self, filing_json: Value) -> Self {
        self.filing_json = filing_json;
        self
    }

    pub fn with_status(mut self, status: FilingStatus) -> Self {
        self.status = status;
        self
    }

    /// Parsed filing type, if the stored name is a known type
    pub fn kind(&self) -> Option<FilingType> {
        self.filing_type.parse().ok()
    }

    /// Payload sub-document, looked up under `filing.<key>` then `<key>`
    pub fn sub_document(&self, key: &str) -> Option<&Value> {
        self.filing_json
            .get("filing")
            .and_then(|filing| filing.get(key))
            .or_else(|| self.filing_json.get(key))
    }

    pub fn is_completed(&self) -> bool {
        self.status == FilingStatus::Completed
    }

    /// Apply a status transition, rejecting anything outside the allowed graph
    pub fn transition_status(&mut self, target: FilingStatus) -> Result<(), String> {
        if !self.status.can_transition_to(target) {
            return Err(format!(
                "Filing {} cannot move from {} to {}",
                self.id, self.status, target
            ));
        }
        self.status = target;
        Ok(())
    }

    pub fn add_comment(&mut self, comment: impl Into<String>, timestamp: DateTime<Utc>) {
        self.comments.push(Comment {
            comment: comment.into(),
            staff_id: self.submitter_id.clone(),
            timestamp,
        });
    }
}
