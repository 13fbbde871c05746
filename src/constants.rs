//! # System Constants
//!
//! Queue names, outbound event types, lifecycle event names and default limits
//! that define the operational boundaries of the filing processor.

/// Lifecycle events emitted to the log stream as the pipeline advances
pub mod events {
    pub const FILING_RECEIVED: &str = "filing.received";
    pub const FILING_COMPLETED: &str = "filing.completed";
    pub const FILING_REPLAYED: &str = "filing.replayed";
    pub const FILING_FAILED: &str = "filing.failed";
    pub const FILING_RETRY_SCHEDULED: &str = "filing.retry_scheduled";
    pub const FILING_DEAD_LETTERED: &str = "filing.dead_lettered";
    pub const FOLLOW_ON_PUBLISHED: &str = "filing.follow_on_published";
    pub const FOLLOW_ON_FAILED: &str = "filing.follow_on_failed";
}

/// Default queue (topic) names
pub mod queues {
    pub const FILER_QUEUE: &str = "filer";
    pub const EMAIL_QUEUE: &str = "emailer";
    pub const BN_QUEUE: &str = "business_bn";
    pub const CREDENTIAL_QUEUE: &str = "digital_credentials";
    pub const DEAD_LETTER_QUEUE: &str = "filer_dlq";
}

/// Outbound event `type` discriminators
pub mod outbound {
    pub const EMAIL: &str = "email";
    pub const BN_SYNC: &str = "bn-sync";
    pub const CREDENTIAL_REVOCATION: &str = "credential-revocation";
    pub const COMPLETED_OPTION: &str = "COMPLETED";
}

/// System-wide defaults
pub mod system {
    pub const DEFAULT_WORKER_CONCURRENCY: usize = 4;
    pub const DEFAULT_PIPELINE_TIMEOUT_SECONDS: u64 = 30;
    pub const DEFAULT_VISIBILITY_TIMEOUT_SECONDS: u64 = 60;
    pub const DEFAULT_POLL_INTERVAL_MS: u64 = 250;
    pub const DEFAULT_MAX_ATTEMPTS: u32 = 5;
    pub const DEFAULT_BASE_DELAY_MS: u64 = 1_000;
    pub const DEFAULT_MAX_DELAY_MS: u64 = 300_000;
    pub const DEFAULT_BACKOFF_MULTIPLIER: f64 = 2.0;
    pub const DEFAULT_CORRECTION_CHAIN_MAX_DEPTH: usize = 16;
}
