//! # Filing Store
//!
//! Transactional persistence for filings and business aggregates.
//!
//! ## Overview
//!
//! The pipeline never talks to a database handle directly. It opens a
//! [`UnitOfWork`] through [`FilingStore::begin`], which
//!
//! - acquires the per-filing lock for the event's filing id and holds it until
//!   `commit` or `rollback`
//! - stages every write and applies all of them atomically on `commit`
//! - rejects writes whose `version` no longer matches the stored row
//!   ([`FilerError::OptimisticLock`](crate::error::FilerError::OptimisticLock))
//!
//! ## Adapters
//!
//! - [`memory::InMemoryStore`] - process-local store used by tests and local runs
//! - [`postgres::PgFilingStore`] - PostgreSQL via `sqlx`, advisory transaction locks
//! - [`migrations::DatabaseMigrations`] - schema migrations for the PostgreSQL store

pub mod memory;
pub mod migrations;
pub mod postgres;

pub use memory::InMemoryStore;
pub use migrations::DatabaseMigrations;
pub use postgres::PgFilingStore;

use crate::error::FilerResult;
use crate::models::{Business, Filing};
use async_trait::async_trait;
use std::fmt::Debug;

/// Source of units of work
#[async_trait]
pub trait FilingStore: Send + Sync + Debug {
    /// Open a unit of work holding the lock for `filing_id`
    async fn begin(&self, filing_id: i64) -> FilerResult<Box<dyn UnitOfWork>>;
}

/// A single transaction against the store
///
/// Dropping a unit of work without committing discards its staged writes and
/// releases the filing lock.
#[async_trait]
pub trait UnitOfWork: Send {
    async fn find_filing(&mut self, filing_id: i64) -> FilerResult<Option<Filing>>;

    async fn find_business(&mut self, business_id: i64) -> FilerResult<Option<Business>>;

    /// Stage an update of an existing filing; returns the new version
    async fn save_filing(&mut self, filing: &Filing) -> FilerResult<i64>;

    /// Stage an insert (`id == 0`) or update of a business; returns its id
    async fn save_business(&mut self, business: &Business) -> FilerResult<i64>;

    async fn commit(self: Box<Self>) -> FilerResult<()>;

    async fn rollback(self: Box<Self>) -> FilerResult<()>;
}
