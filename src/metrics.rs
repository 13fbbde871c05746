//! # Filing Processor Metrics
//!
//! OpenTelemetry instruments for the pipeline. The meter is taken from the
//! global meter provider, so instruments are no-ops until the embedding
//! application installs a provider.
//!
//! ## Usage
//!
//! ```rust
//! use filing_processor::metrics;
//! use opentelemetry::KeyValue;
//!
//! metrics::filings_completed().add(1, &[KeyValue::new("filing_type", "changeOfName")]);
//! metrics::pipeline_duration().record(12.5, &[KeyValue::new("result", "published")]);
//! ```

use opentelemetry::metrics::{Counter, Histogram, Meter};
use opentelemetry::KeyValue;
use std::sync::OnceLock;

static FILER_METER: OnceLock<Meter> = OnceLock::new();

fn meter() -> &'static Meter {
    FILER_METER.get_or_init(|| opentelemetry::global::meter_provider().meter("filing-processor"))
}

/// Filing events read from the inbound queue
///
/// Labels:
/// - queue: Inbound queue name
pub fn events_received() -> Counter<u64> {
    meter()
        .u64_counter("filer.events.received")
        .with_description("Filing events read from the inbound queue")
        .build()
}

/// Filings committed as COMPLETED
///
/// Labels:
/// - filing_type: Filing type name
pub fn filings_completed() -> Counter<u64> {
    meter()
        .u64_counter("filer.filings.completed")
        .with_description("Filings committed as COMPLETED")
        .build()
}

/// Pipeline runs that ended in Failed
///
/// Labels:
/// - filing_type: Filing type name, `unknown` before load
/// - error_class: Stable error class name
/// - retryable: true, false
pub fn filings_failed() -> Counter<u64> {
    meter()
        .u64_counter("filer.filings.failed")
        .with_description("Pipeline runs that ended in Failed")
        .build()
}

/// Events moved to the dead-letter queue
///
/// Labels:
/// - error_class: Stable error class name
pub fn events_dead_lettered() -> Counter<u64> {
    meter()
        .u64_counter("filer.events.dead_lettered")
        .with_description("Events moved to the dead-letter queue")
        .build()
}

/// Follow-on events that could not be published
///
/// Labels:
/// - topic: email, bn-sync, credential-revocation
pub fn publish_failures() -> Counter<u64> {
    meter()
        .u64_counter("filer.publish.failures")
        .with_description("Follow-on events that could not be published")
        .build()
}

/// Wall-clock time of one pipeline run in milliseconds
///
/// Labels:
/// - filing_type: Filing type name
/// - result: published, short_circuited, failed
pub fn pipeline_duration() -> Histogram<f64> {
    meter()
        .f64_histogram("filer.pipeline.duration_ms")
        .with_description("Wall-clock time of one pipeline run in milliseconds")
        .with_unit("ms")
        .build()
}

/// Labels shared by failure instruments
pub fn failure_labels(filing_type: &str, error_class: &str, retryable: bool) -> [KeyValue; 3] {
    [
        KeyValue::new("filing_type", filing_type.to_string()),
        KeyValue::new("error_class", error_class.to_string()),
        KeyValue::new("retryable", retryable),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_instruments_record_without_a_provider() {
        events_received().add(1, &[KeyValue::new("queue", "filer")]);
        filings_failed().add(1, &failure_labels("changeOfName", "ProcessingError", true));
        pipeline_duration().record(1.0, &[KeyValue::new("result", "failed")]);
    }
}
