//! In-memory store for development and testing.
//!
//! Supports fault injection: failing fetches, rejecting writes for chosen
//! ids, slowing fetches down, and panicking mid-fetch.

use super::{AdapterError, AdapterResult, StoreAdapter};
use async_trait::async_trait;
use dashmap::{DashMap, DashSet};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;
use tabsync_engine::{Record, RecordId, Side};

/// In-memory store keyed by record id
#[derive(Debug)]
pub struct MemoryAdapter {
    side: Side,
    name: String,
    records: DashMap<RecordId, Record>,
    fail_fetch: AtomicBool,
    panic_on_fetch: AtomicBool,
    fetch_delay_ms: AtomicU64,
    rejected: DashSet<RecordId>,
    writes: AtomicUsize,
}

impl MemoryAdapter {
    pub fn new(side: Side, name: impl Into<String>) -> Self {
        Self {
            side,
            name: name.into(),
            records: DashMap::new(),
            fail_fetch: AtomicBool::new(false),
            panic_on_fetch: AtomicBool::new(false),
            fetch_delay_ms: AtomicU64::new(0),
            rejected: DashSet::new(),
            writes: AtomicUsize::new(0),
        }
    }

    /// Seed the store.
    pub fn with_records(self, records: impl IntoIterator<Item = Record>) -> Self {
        for record in records {
            self.records.insert(record.id, record);
        }
        self
    }

    /// Current contents, ordered by id.
    pub fn records(&self) -> Vec<Record> {
        let mut records: Vec<_> = self.records.iter().map(|r| r.value().clone()).collect();
        records.sort_by_key(|r| r.id);
        records
    }

    pub fn ids(&self) -> Vec<RecordId> {
        self.records().into_iter().map(|r| r.id).collect()
    }

    pub fn get(&self, id: RecordId) -> Option<Record> {
        self.records.get(&id).map(|r| r.value().clone())
    }

    /// Edit the store directly, bypassing the sync (a user's edit).
    pub fn put(&self, record: Record) {
        self.records.insert(record.id, record);
    }

    /// Delete directly, bypassing the sync.
    pub fn remove(&self, id: RecordId) {
        self.records.remove(&id);
    }

    pub fn clear(&self) {
        self.records.clear();
    }

    /// Make every fetch fail until reset.
    pub fn set_fetch_failure(&self, fail: bool) {
        self.fail_fetch.store(fail, Ordering::SeqCst);
    }

    /// Make every fetch panic until reset.
    pub fn set_fetch_panic(&self, panic: bool) {
        self.panic_on_fetch.store(panic, Ordering::SeqCst);
    }

    /// Hold every fetch for `delay`.
    pub fn set_fetch_delay(&self, delay: Duration) {
        self.fetch_delay_ms
            .store(delay.as_millis() as u64, Ordering::SeqCst);
    }

    /// Reject writes touching `id` until [`MemoryAdapter::clear_faults`].
    pub fn reject_writes_for(&self, id: RecordId) {
        self.rejected.insert(id);
    }

    pub fn clear_faults(&self) {
        self.set_fetch_failure(false);
        self.set_fetch_panic(false);
        self.set_fetch_delay(Duration::ZERO);
        self.rejected.clear();
    }

    /// Number of accepted writes (upserts and deletes).
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    fn check_write(&self, id: RecordId) -> AdapterResult<()> {
        if self.rejected.contains(&id) {
            return Err(AdapterError::Unavailable(format!(
                "{} rejected write for record {id}",
                self.name
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl StoreAdapter for MemoryAdapter {
    fn side(&self) -> Side {
        self.side
    }

    fn name(&self) -> &str {
        &self.name
    }

    async fn fetch_all(&self) -> AdapterResult<Vec<Record>> {
        let delay = self.fetch_delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }

        if self.panic_on_fetch.load(Ordering::SeqCst) {
            panic!("{} panicked during fetch", self.name);
        }
        if self.fail_fetch.load(Ordering::SeqCst) {
            return Err(AdapterError::Unavailable(format!("{} is unreachable", self.name)));
        }

        Ok(self.records())
    }

    async fn upsert(&self, record: &Record) -> AdapterResult<()> {
        self.check_write(record.id)?;
        self.records.insert(record.id, record.clone());
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn delete(&self, id: RecordId) -> AdapterResult<()> {
        self.check_write(id)?;
        self.records.remove(&id);
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
