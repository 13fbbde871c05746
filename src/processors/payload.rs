//! Typed access to filing payload fields.
//!
//! Payloads arrive schema-validated, so these helpers only enforce the
//! semantic requirements processors depend on and report them as
//! [`FilerError::PayloadValidation`].

use crate::error::{FilerError, FilerResult};
use crate::models::Address;
use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use serde_json::Value;
use thiserror::Error;

/// A payload date that is neither `YYYY-MM-DD` nor RFC 3339
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid date {value:?}")]
pub struct DateParseError {
    pub value: String,
}

/// Parse `YYYY-MM-DD` (midnight UTC) or an RFC 3339 timestamp
pub fn parse_date(value: &str) -> Result<DateTime<Utc>, DateParseError> {
    let trimmed = value.trim();
    if let Ok(timestamp) = DateTime::parse_from_rfc3339(trimmed) {
        return Ok(timestamp.with_timezone(&Utc));
    }
    NaiveDate::parse_from_str(trimmed, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| Utc.from_utc_datetime(&naive))
        .ok_or_else(|| DateParseError {
            value: value.to_string(),
        })
}

/// Parse a calendar date, accepting a timestamp and keeping its date part
pub fn parse_naive_date(value: &str) -> Result<NaiveDate, DateParseError> {
    parse_date(value).map(|timestamp| timestamp.date_naive())
}

pub fn optional_str(doc: &Value, field: &str) -> Option<String> {
    doc.get(field)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

pub fn required_str(doc: &Value, field: &str, filing_type: &str) -> FilerResult<String> {
    optional_str(doc, field)
        .ok_or_else(|| FilerError::payload(filing_type, field, "required value is missing"))
}

pub fn optional_bool(doc: &Value, field: &str) -> Option<bool> {
    doc.get(field).and_then(Value::as_bool)
}

pub fn optional_i64(doc: &Value, field: &str) -> Option<i64> {
    doc.get(field).and_then(Value::as_i64)
}

/// A date field that must be present and valid
pub fn required_date(doc: &Value, field: &str, filing_type: &str) -> FilerResult<DateTime<Utc>> {
    let raw = required_str(doc, field, filing_type)?;
    parse_date(&raw).map_err(|e| FilerError::payload(filing_type, field, e.to_string()))
}

/// A date field that may be absent; present but invalid is an error
pub fn optional_date(
    doc: &Value,
    field: &str,
    filing_type: &str,
) -> FilerResult<Option<DateTime<Utc>>> {
    optional_str(doc, field)
        .map(|raw| {
            parse_date(&raw).map_err(|e| FilerError::payload(filing_type, field, e.to_string()))
        })
        .transpose()
}

pub fn optional_naive_date(
    doc: &Value,
    field: &str,
    filing_type: &str,
) -> FilerResult<Option<NaiveDate>> {
    Ok(optional_date(doc, field, filing_type)?.map(|d| d.date_naive()))
}

/// Array field; missing is treated as empty
pub fn array<'a>(doc: &'a Value, field: &str) -> &'a [Value] {
    doc.get(field)
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or_default()
}

pub fn address(doc: &Value, field: &str, filing_type: &str) -> FilerResult<Option<Address>> {
    match doc.get(field) {
        None | Some(Value::Null) => Ok(None),
        Some(value) => serde_json::from_value(value.clone())
            .map(Some)
            .map_err(|e| FilerError::payload(filing_type, field, e.to_string())),
    }
}

/// Legal name from `nameRequest.legalName`, falling back to `legalName`
pub fn legal_name(doc: &Value) -> Option<String> {
    doc.get("nameRequest")
        .and_then(|nr| optional_str(nr, "legalName"))
        .or_else(|| optional_str(doc, "legalName"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_date_formats() {
        let date = parse_date("2024-02-29").unwrap();
        assert_eq!(date.to_rfc3339(), "2024-02-29T00:00:00+00:00");

        let timestamp = parse_date("2024-02-29T10:15:00-08:00").unwrap();
        assert_eq!(timestamp.to_rfc3339(), "2024-02-29T18:15:00+00:00");

        assert!(parse_date("2023-02-29").is_err());
        assert!(parse_date("29/02/2024").is_err());
        assert!(parse_date("").is_err());
    }

    #[test]
    fn test_required_and_optional_fields() {
        let doc = json!({"legalName": "  ACME LTD. ", "empty": "", "flag": true});
        assert_eq!(required_str(&doc, "legalName", "changeOfName").unwrap(), "ACME LTD.");
        assert!(required_str(&doc, "empty", "changeOfName").is_err());
        assert_eq!(optional_bool(&doc, "flag"), Some(true));
        assert!(array(&doc, "parties").is_empty());
    }

    #[test]
    fn test_optional_date_rejects_garbage() {
        let doc = json!({"good": "2024-01-01", "bad": "soon"});
        assert!(optional_date(&doc, "good", "x").unwrap().is_some());
        assert!(optional_date(&doc, "missing", "x").unwrap().is_none());
        assert!(optional_date(&doc, "bad", "x").is_err());
    }

    #[test]
    fn test_legal_name_prefers_name_request() {
        let doc = json!({"nameRequest": {"legalName": "NR NAME LTD."}, "legalName": "OTHER"});
        assert_eq!(legal_name(&doc).as_deref(), Some("NR NAME LTD."));
        assert_eq!(legal_name(&json!({"legalName": "OTHER"})).as_deref(), Some("OTHER"));
    }
}
