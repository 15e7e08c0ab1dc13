//! Store adapters.
//!
//! An adapter turns one concrete store into the uniform record interface the
//! sync cycle works against. Adapters own their connection resources and are
//! shared across tasks, so every method takes `&self`.

mod memory;
mod postgres;
mod sheets;

pub use memory::MemoryAdapter;
pub use postgres::PostgresAdapter;
pub use sheets::SheetsAdapter;

use async_trait::async_trait;
use chrono::Utc;
use tabsync_engine::{Record, RecordId, Side, Snapshot};

/// Result type for adapter operations.
pub type AdapterResult<T> = Result<T, AdapterError>;

/// Errors raised while talking to a store.
#[derive(Debug, thiserror::Error)]
pub enum AdapterError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("API returned {status}: {body}")]
    Api { status: u16, body: String },

    #[error("Malformed store data: {0}")]
    Malformed(String),

    #[error("Invalid record: {0}")]
    Record(#[from] tabsync_engine::Error),

    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

/// Uniform access to one of the two stores.
#[async_trait]
pub trait StoreAdapter: Send + Sync {
    /// Which side of the sync this store is
    fn side(&self) -> Side;

    /// Human-readable store name, for logs
    fn name(&self) -> &str;

    /// Read every record. An empty store is `Ok(vec![])`, never an error.
    async fn fetch_all(&self) -> AdapterResult<Vec<Record>>;

    /// Insert or overwrite the record with this id.
    async fn upsert(&self, record: &Record) -> AdapterResult<()>;

    /// Remove the record with this id. Removing a missing id succeeds.
    async fn delete(&self, id: RecordId) -> AdapterResult<()>;

    /// Capture the store as a snapshot.
    ///
    /// Never fails: a fetch error, a duplicate id or an invalid record
    /// yields a snapshot marked failed, which blocks the cycle.
    async fn snapshot(&self) -> Snapshot {
        let side = self.side();
        let fetched_at = Utc::now();

        let records = match self.fetch_all().await {
            Ok(records) => records,
            Err(e) => {
                tracing::warn!(side = %side, store = self.name(), error = %e, "Fetch failed");
                return Snapshot::failed(side, e.to_string(), fetched_at);
            }
        };

        if let Some(err) = records.iter().find_map(|r| r.validate().err()) {
            tracing::warn!(side = %side, store = self.name(), error = %err, "Store returned an invalid record");
            return Snapshot::failed(side, err.to_string(), fetched_at);
        }

        match Snapshot::from_records(side, records, fetched_at) {
            Ok(snapshot) => {
                tracing::debug!(side = %side, store = self.name(), records = snapshot.len(), "Fetched snapshot");
                snapshot
            }
            Err(e) => {
                tracing::warn!(side = %side, store = self.name(), error = %e, "Rejected snapshot");
                Snapshot::failed(side, e.to_string(), fetched_at)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(id: RecordId) -> Record {
        Record::new(id, "Ada", "Lovelace", "open", "EMEA", "Grace")
    }

    #[tokio::test]
    async fn snapshot_of_healthy_store() {
        let store = MemoryAdapter::new(Side::A, "sheet").with_records([record(2), record(1)]);
        let snapshot = store.snapshot().await;

        assert!(snapshot.is_ok());
        assert_eq!(snapshot.len(), 2);
        assert_eq!(snapshot.source(), Side::A);
    }

    #[tokio::test]
    async fn empty_store_is_an_ok_snapshot() {
        let store = MemoryAdapter::new(Side::B, "db");
        let snapshot = store.snapshot().await;

        assert!(snapshot.is_ok());
        assert!(snapshot.is_empty());
    }

    #[tokio::test]
    async fn fetch_error_is_a_failed_snapshot() {
        let store = MemoryAdapter::new(Side::B, "db").with_records([record(1)]);
        store.set_fetch_failure(true);

        let snapshot = store.snapshot().await;

        assert!(!snapshot.is_ok());
        assert!(snapshot.failure().is_some());
    }

    #[tokio::test]
    async fn invalid_record_is_a_failed_snapshot() {
        let store = MemoryAdapter::new(Side::A, "sheet").with_records([record(1), record(-4)]);
        let snapshot = store.snapshot().await;

        assert!(!snapshot.is_ok());
    }
}
