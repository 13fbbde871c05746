//! # In-Memory Store
//!
//! Process-local [`FilingStore`] with the same transactional contract as the
//! PostgreSQL adapter: a per-filing lock held for the lifetime of the unit of
//! work, staged writes applied atomically on commit, and version checks both
//! when a write is staged and again at commit.
//!
//! Tests reach the committed state through the seeding and inspection helpers
//! and can inject commit failures or read latency.

use super::{FilingStore, UnitOfWork};
use crate::error::{FilerError, FilerResult};
use crate::models::{Business, Filing};
use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::RwLock;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::debug;

#[derive(Debug, Default)]
struct StoreState {
    filings: HashMap<i64, Filing>,
    businesses: HashMap<i64, Business>,
}

#[derive(Debug, Default)]
struct FaultInjection {
    commit_failures: VecDeque<FilerError>,
    read_latency: Option<Duration>,
}

#[derive(Debug, Clone)]
pub struct InMemoryStore {
    state: Arc<RwLock<StoreState>>,
    locks: Arc<DashMap<i64, Arc<Mutex<()>>>>,
    faults: Arc<RwLock<FaultInjection>>,
    next_business_id: Arc<AtomicI64>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            state: Arc::new(RwLock::new(StoreState::default())),
            locks: Arc::new(DashMap::new()),
            faults: Arc::new(RwLock::new(FaultInjection::default())),
            next_business_id: Arc::new(AtomicI64::new(1)),
        }
    }

    /// Insert or replace a committed filing
    pub fn insert_filing(&self, filing: Filing) {
        self.state.write().filings.insert(filing.id, filing);
    }

    /// Insert or replace a committed business; `id == 0` assigns a fresh id
    pub fn insert_business(&self, mut business: Business) -> i64 {
        if business.id == 0 {
            business.id = self.allocate_business_id();
        } else {
            self.next_business_id
                .fetch_max(business.id + 1, Ordering::SeqCst);
        }
        let id = business.id;
        self.state.write().businesses.insert(id, business);
        id
    }

    pub fn filing(&self, filing_id: i64) -> Option<Filing> {
        self.state.read().filings.get(&filing_id).cloned()
    }

    pub fn business(&self, business_id: i64) -> Option<Business> {
        self.state.read().businesses.get(&business_id).cloned()
    }

    pub fn business_by_identifier(&self, identifier: &str) -> Option<Business> {
        self.state
            .read()
            .businesses
            .values()
            .find(|b| b.identifier == identifier)
            .cloned()
    }

    /// Fail the next commit with `error` (queued; one error per commit)
    pub fn inject_commit_failure(&self, error: FilerError) {
        self.faults.write().commit_failures.push_back(error);
    }

    /// Delay every read by `latency`
    pub fn set_read_latency(&self, latency: Option<Duration>) {
        self.faults.write().read_latency = latency;
    }

    /// Number of filings with a live lock entry
    pub fn lock_table_len(&self) -> usize {
        self.locks.len()
    }

    fn allocate_business_id(&self) -> i64 {
        self.next_business_id.fetch_add(1, Ordering::SeqCst)
    }

    fn lock_for(&self, filing_id: i64) -> Arc<Mutex<()>> {
        self.locks
            .entry(filing_id)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl FilingStore for InMemoryStore {
    async fn begin(&self, filing_id: i64) -> FilerResult<Box<dyn UnitOfWork>> {
        let guard = self.lock_for(filing_id).lock_owned().await;
        debug!(filing_id = filing_id, "Acquired in-memory filing lock");

        Ok(Box::new(InMemoryUnitOfWork {
            store: self.clone(),
            filing_id,
            guard: Some(guard),
            staged_filings: HashMap::new(),
            staged_businesses: HashMap::new(),
        }))
    }
}

struct InMemoryUnitOfWork {
    store: InMemoryStore,
    filing_id: i64,
    guard: Option<OwnedMutexGuard<()>>,
    staged_filings: HashMap<i64, Filing>,
    staged_businesses: HashMap<i64, Business>,
}

impl Drop for InMemoryUnitOfWork {
    fn drop(&mut self) {
        self.guard.take();
        // a waiter in `lock_for` holds its own clone, so the entry survives
        // until the last contender for this filing is done
        self.store
            .locks
            .remove_if(&self.filing_id, |_, lock| Arc::strong_count(lock) == 1);
    }
}

impl InMemoryUnitOfWork {
    async fn read_delay(&self) {
        let latency = self.store.faults.read().read_latency;
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }
    }

    fn check_version(entity: &str, id: i64, expected: i64, stored: Option<i64>) -> FilerResult<()> {
        match stored {
            Some(version) if version == expected => Ok(()),
            Some(_) => Err(FilerError::OptimisticLock {
                entity: entity.to_string(),
                id,
            }),
            None => Err(FilerError::store(
                format!("save_{entity}"),
                format!("{entity} {id} does not exist"),
            )),
        }
    }
}

#[async_trait]
impl UnitOfWork for InMemoryUnitOfWork {
    async fn find_filing(&mut self, filing_id: i64) -> FilerResult<Option<Filing>> {
        self.read_delay().await;
        if let Some(staged) = self.staged_filings.get(&filing_id) {
            return Ok(Some(staged.clone()));
        }
        Ok(self.store.filing(filing_id))
    }

    async fn find_business(&mut self, business_id: i64) -> FilerResult<Option<Business>> {
        self.read_delay().await;
        if let Some(staged) = self.staged_businesses.get(&business_id) {
            return Ok(Some(staged.clone()));
        }
        Ok(self.store.business(business_id))
    }

    async fn save_filing(&mut self, filing: &Filing) -> FilerResult<i64> {
        let stored = self.store.state.read().filings.get(&filing.id).map(|f| f.version);
        Self::check_version("filing", filing.id, filing.version, stored)?;

        let mut staged = filing.clone();
        staged.version = filing.version + 1;
        let version = staged.version;
        self.staged_filings.insert(filing.id, staged);
        Ok(version)
    }

    async fn save_business(&mut self, business: &Business) -> FilerResult<i64> {
        let mut staged = business.clone();
        if business.id == 0 {
            let duplicate = self
                .store
                .business_by_identifier(&business.identifier)
                .is_some();
            if duplicate {
                return Err(FilerError::store(
                    "save_business",
                    format!("identifier {} already exists", business.identifier),
                ));
            }
            staged.id = self.store.allocate_business_id();
            staged.version = 1;
        } else {
            let stored = self
                .store
                .state
                .read()
                .businesses
                .get(&business.id)
                .map(|b| b.version);
            Self::check_version("business", business.id, business.version, stored)?;
            staged.version = business.version + 1;
        }

        let id = staged.id;
        self.staged_businesses.insert(id, staged);
        Ok(id)
    }

    async fn commit(mut self: Box<Self>) -> FilerResult<()> {
        let injected = self.store.faults.write().commit_failures.pop_front();
        if let Some(error) = injected {
            return Err(error);
        }

        let staged_filings = std::mem::take(&mut self.staged_filings);
        let staged_businesses = std::mem::take(&mut self.staged_businesses);
        let mut state = self.store.state.write();

        // Re-check under the write lock; a concurrent unit of work may have
        // committed one of our rows since it was staged.
        for (id, filing) in &staged_filings {
            let stored = state.filings.get(id).map(|f| f.version);
            Self::check_version("filing", *id, filing.version - 1, stored)?;
        }
        for (id, business) in &staged_businesses {
            if let Some(stored) = state.businesses.get(id) {
                if stored.version != business.version - 1 {
                    return Err(FilerError::OptimisticLock {
                        entity: "business".to_string(),
                        id: *id,
                    });
                }
            }
        }

        let filings = staged_filings.len();
        let businesses = staged_businesses.len();
        state.filings.extend(staged_filings);
        state.businesses.extend(staged_businesses);
        debug!(filings = filings, businesses = businesses, "In-memory unit of work committed");
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> FilerResult<()> {
        debug!(
            staged = self.staged_filings.len() + self.staged_businesses.len(),
            "In-memory unit of work rolled back"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{FilingStatus, LegalType};
    use chrono::Utc;

    fn seeded() -> (InMemoryStore, i64) {
        let store = InMemoryStore::new();
        let business_id =
            store.insert_business(Business::new("BC1234567", LegalType::BC, "ACME LTD.", Utc::now()));
        store.insert_filing(Filing::new(1, Some(business_id), "changeOfName", Utc::now()));
        (store, business_id)
    }

    #[tokio::test]
    async fn test_staged_writes_invisible_until_commit() {
        let (store, _) = seeded();
        let mut uow = store.begin(1).await.unwrap();

        let mut filing = uow.find_filing(1).await.unwrap().unwrap();
        filing.status = FilingStatus::Completed;
        uow.save_filing(&filing).await.unwrap();

        assert_eq!(store.filing(1).unwrap().status, FilingStatus::Paid);
        uow.commit().await.unwrap();
        assert_eq!(store.filing(1).unwrap().status, FilingStatus::Completed);
        assert_eq!(store.filing(1).unwrap().version, 1);
    }

    #[tokio::test]
    async fn test_rollback_discards_writes() {
        let (store, business_id) = seeded();
        let mut uow = store.begin(1).await.unwrap();

        let mut business = uow.find_business(business_id).await.unwrap().unwrap();
        business.legal_name = "CHANGED LTD.".to_string();
        uow.save_business(&business).await.unwrap();
        uow.rollback().await.unwrap();

        assert_eq!(store.business(business_id).unwrap().legal_name, "ACME LTD.");
    }

    #[tokio::test]
    async fn test_stale_version_is_rejected_at_commit() {
        let (store, business_id) = seeded();
        let mut uow = store.begin(1).await.unwrap();

        let mut business = uow.find_business(business_id).await.unwrap().unwrap();
        business.legal_name = "MINE LTD.".to_string();
        uow.save_business(&business).await.unwrap();

        // concurrent writer outside the unit of work
        let mut concurrent = store.business(business_id).unwrap();
        concurrent.version += 1;
        store.insert_business(concurrent);

        let err = uow.commit().await.unwrap_err();
        assert!(matches!(err, FilerError::OptimisticLock { .. }));
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn test_filing_lock_serializes_units_of_work() {
        let (store, _) = seeded();
        let first = store.begin(1).await.unwrap();

        let contender = store.clone();
        let waiter = tokio::spawn(async move { contender.begin(1).await.map(|_| ()) });

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!waiter.is_finished());

        first.rollback().await.unwrap();
        waiter.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_lock_entries_released_after_commit_and_rollback() {
        let (store, _) = seeded();

        let uow = store.begin(1).await.unwrap();
        assert_eq!(store.lock_table_len(), 1);
        uow.commit().await.unwrap();
        assert_eq!(store.lock_table_len(), 0);

        let uow = store.begin(2).await.unwrap();
        uow.rollback().await.unwrap();
        assert_eq!(store.lock_table_len(), 0);

        store.inject_commit_failure(FilerError::store("commit", "connection reset"));
        let uow = store.begin(3).await.unwrap();
        assert!(uow.commit().await.is_err());
        assert_eq!(store.lock_table_len(), 0);
    }

    #[tokio::test]
    async fn test_lock_entry_kept_while_contended() {
        let (store, _) = seeded();
        let first = store.begin(1).await.unwrap();

        let contender = store.clone();
        let waiter = tokio::spawn(async move {
            let uow = contender.begin(1).await?;
            uow.rollback().await
        });
        tokio::time::sleep(Duration::from_millis(20)).await;

        first.rollback().await.unwrap();
        // the waiter still owns a handle to the same mutex
        waiter.await.unwrap().unwrap();
        assert_eq!(store.lock_table_len(), 0);
    }

    #[tokio::test]
    async fn test_injected_commit_failure_applies_once() {
        let (store, _) = seeded();
        store.inject_commit_failure(FilerError::store("commit", "connection reset"));

        let uow = store.begin(1).await.unwrap();
        assert!(uow.commit().await.is_err());

        let uow = store.begin(1).await.unwrap();
        assert!(uow.commit().await.is_ok());
    }

    #[tokio::test]
    async fn test_business_insert_assigns_id() {
        let store = InMemoryStore::new();
        let mut uow = store.begin(5).await.unwrap();
        let id = uow
            .save_business(&Business::new("BC0000005", LegalType::BEN, "NEW CO.", Utc::now()))
            .await
            .unwrap();
        uow.commit().await.unwrap();

        let stored = store.business(id).unwrap();
        assert_eq!(stored.identifier, "BC0000005");
        assert_eq!(stored.version, 1);
    }
}
