//! # Filing Processor Configuration
//!
//! Typed configuration for every component of the processor, loaded by
//! [`ConfigManager`] from layered sources:
//!
//! 1. built-in defaults (the `Default` impls below)
//! 2. `config/filer.toml`
//! 3. `config/filer.<environment>.toml`
//! 4. environment variables `FILER__<SECTION>__<KEY>`
//!
//! ## Usage
//!
//! ```rust,no_run
//! use filing_processor::config::ConfigManager;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let manager = ConfigManager::load()?;
//! let concurrency = manager.config().worker.concurrency;
//! let max_attempts = manager.config().retry.max_attempts;
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod loader;

use crate::constants::{queues, system};
use crate::models::FilingType;
use serde::{Deserialize, Serialize};
use std::time::Duration;

pub use error::{ConfigResult, ConfigurationError};
pub use loader::ConfigManager;

/// Root configuration structure mirroring `config/filer.toml`
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct FilerConfig {
    /// PostgreSQL connection and pooling
    pub database: DatabaseConfig,

    /// Queue names and polling behaviour
    pub broker: BrokerConfig,

    /// Worker pool sizing and pipeline budget
    pub worker: WorkerConfig,

    /// Redelivery policy for retryable failures
    pub retry: RetryConfig,

    /// Processor feature flags
    pub processors: ProcessorsConfig,

    /// Processing limits
    pub processing: ProcessingConfig,

    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub acquire_timeout_seconds: u64,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "postgresql://localhost/filer_development".to_string(),
            max_connections: 10,
            acquire_timeout_seconds: 10,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct BrokerConfig {
    /// Inbound filing events
    pub filing_queue: String,
    pub email_queue: String,
    pub bn_queue: String,
    pub credential_queue: String,
    pub dead_letter_queue: String,
    pub visibility_timeout_seconds: u64,
    /// Sleep between reads when the queue is empty
    pub poll_interval_ms: u64,
}

impl BrokerConfig {
    pub fn visibility_timeout(&self) -> Duration {
        Duration::from_secs(self.visibility_timeout_seconds)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            filing_queue: queues::FILER_QUEUE.to_string(),
            email_queue: queues::EMAIL_QUEUE.to_string(),
            bn_queue: queues::BN_QUEUE.to_string(),
            credential_queue: queues::CREDENTIAL_QUEUE.to_string(),
            dead_letter_queue: queues::DEAD_LETTER_QUEUE.to_string(),
            visibility_timeout_seconds: system::DEFAULT_VISIBILITY_TIMEOUT_SECONDS,
            poll_interval_ms: system::DEFAULT_POLL_INTERVAL_MS,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct WorkerConfig {
    /// Number of concurrent consumers
    pub concurrency: usize,
    /// Wall-clock budget for load, dispatch and mutate
    pub pipeline_timeout_seconds: u64,
}

impl WorkerConfig {
    pub fn pipeline_timeout(&self) -> Duration {
        Duration::from_secs(self.pipeline_timeout_seconds)
    }
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            concurrency: system::DEFAULT_WORKER_CONCURRENCY,
            pipeline_timeout_seconds: system::DEFAULT_PIPELINE_TIMEOUT_SECONDS,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Deliveries allowed before a retryable failure is dead-lettered
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    pub backoff_multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: system::DEFAULT_MAX_ATTEMPTS,
            base_delay_ms: system::DEFAULT_BASE_DELAY_MS,
            max_delay_ms: system::DEFAULT_MAX_DELAY_MS,
            backoff_multiplier: system::DEFAULT_BACKOFF_MULTIPLIER,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct ProcessorsConfig {
    /// Filing type names whose processors are switched off
    pub disabled: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct ProcessingConfig {
    /// Longest correction-of-a-correction chain the loader will follow
    pub correction_chain_max_depth: usize,
}

impl Default for ProcessingConfig {
    fn default() -> Self {
        Self {
            correction_chain_max_depth: system::DEFAULT_CORRECTION_CHAIN_MAX_DEPTH,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Pretty,
    Json,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default filter directive; `RUST_LOG` takes precedence
    pub level: String,
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Pretty,
        }
    }
}

impl FilerConfig {
    /// Reject configurations the processor cannot run with
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        if self.worker.concurrency == 0 {
            return Err(ConfigurationError::invalid_value(
                "worker.concurrency",
                "0",
                "concurrency must be greater than 0",
            ));
        }

        if self.worker.pipeline_timeout_seconds == 0 {
            return Err(ConfigurationError::invalid_value(
                "worker.pipeline_timeout_seconds",
                "0",
                "pipeline timeout must be greater than 0",
            ));
        }

        if self.retry.max_attempts == 0 {
            return Err(ConfigurationError::invalid_value(
                "retry.max_attempts",
                "0",
                "at least one delivery attempt is required",
            ));
        }

        if self.retry.base_delay_ms > self.retry.max_delay_ms {
            return Err(ConfigurationError::invalid_value(
                "retry.base_delay_ms",
                self.retry.base_delay_ms.to_string(),
                format!("must not exceed retry.max_delay_ms ({})", self.retry.max_delay_ms),
            ));
        }

        if self.retry.backoff_multiplier.is_nan() || self.retry.backoff_multiplier < 1.0 {
            return Err(ConfigurationError::invalid_value(
                "retry.backoff_multiplier",
                self.retry.backoff_multiplier.to_string(),
                "multiplier must be at least 1.0",
            ));
        }

        if self.processing.correction_chain_max_depth == 0 {
            return Err(ConfigurationError::invalid_value(
                "processing.correction_chain_max_depth",
                "0",
                "depth must be greater than 0",
            ));
        }

        for name in &self.processors.disabled {
            if name.parse::<FilingType>().is_err() {
                return Err(ConfigurationError::invalid_value(
                    "processors.disabled",
                    name.clone(),
                    "not a known filing type",
                ));
            }
        }

        for (field, queue) in [
            ("broker.filing_queue", &self.broker.filing_queue),
            ("broker.email_queue", &self.broker.email_queue),
            ("broker.bn_queue", &self.broker.bn_queue),
            ("broker.credential_queue", &self.broker.credential_queue),
            ("broker.dead_letter_queue", &self.broker.dead_letter_queue),
        ] {
            if queue.trim().is_empty() {
                return Err(ConfigurationError::missing_required_field(
                    field,
                    "broker configuration",
                ));
            }
        }

        Ok(())
    }
}
