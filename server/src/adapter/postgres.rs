//! Store B: the Postgres `records` table.

use super::{AdapterResult, StoreAdapter};
use crate::db::{self, Pool};
use async_trait::async_trait;
use tabsync_engine::{Record, RecordId, Side};

/// Postgres-backed store
pub struct PostgresAdapter {
    pool: Pool,
}

impl PostgresAdapter {
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl StoreAdapter for PostgresAdapter {
    fn side(&self) -> Side {
        Side::B
    }

    fn name(&self) -> &str {
        "postgres"
    }

    async fn fetch_all(&self) -> AdapterResult<Vec<Record>> {
        Ok(db::list_records(&self.pool).await?)
    }

    async fn upsert(&self, record: &Record) -> AdapterResult<()> {
        db::upsert_record(&self.pool, record).await?;
        Ok(())
    }

    async fn delete(&self, id: RecordId) -> AdapterResult<()> {
        if !db::delete_record(&self.pool, id).await? {
            tracing::debug!(record_id = id, "Record already absent from postgres");
        }
        Ok(())
    }
}
