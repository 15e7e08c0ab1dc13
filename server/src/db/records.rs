//! Database operations for the records table.

use chrono::{DateTime, SubsecRound, Utc};
use sqlx::{PgPool, Row};
use tabsync_engine::{Record, RecordId};

const COLUMNS: &str =
    "id, first_name, last_name, status, region, sales_rep, follow_up, notes, last_updated";

/// A stored record row from the database.
#[derive(Debug)]
pub struct StoredRecord {
    pub id: i64,
    pub first_name: String,
    pub last_name: String,
    pub status: String,
    pub region: String,
    pub sales_rep: String,
    pub follow_up: Option<String>,
    pub notes: Option<String>,
    pub last_updated: Option<DateTime<Utc>>,
}

impl<'r> sqlx::FromRow<'r, sqlx::postgres::PgRow> for StoredRecord {
    fn from_row(row: &'r sqlx::postgres::PgRow) -> Result<Self, sqlx::Error> {
        Ok(StoredRecord {
            id: row.try_get("id")?,
            first_name: row.try_get("first_name")?,
            last_name: row.try_get("last_name")?,
            status: row.try_get("status")?,
            region: row.try_get("region")?,
            sales_rep: row.try_get("sales_rep")?,
            follow_up: row.try_get("follow_up")?,
            notes: row.try_get("notes")?,
            last_updated: row.try_get("last_updated")?,
        })
    }
}

impl StoredRecord {
    /// Convert database row to an engine Record.
    ///
    /// `last_updated` is cut to whole seconds, the precision the sheet keeps.
    pub fn into_record(self) -> Record {
        Record {
            id: self.id,
            first_name: self.first_name,
            last_name: self.last_name,
            status: self.status,
            region: self.region,
            sales_rep: self.sales_rep,
            follow_up: self.follow_up,
            notes: self.notes,
            last_updated: self.last_updated.map(|ts| ts.trunc_subsecs(0)),
        }
        .normalized()
    }
}

/// All records, ordered by id.
pub async fn list_records(pool: &PgPool) -> Result<Vec<Record>, sqlx::Error> {
    let rows = sqlx::query_as::<_, StoredRecord>(&format!(
        "SELECT {COLUMNS} FROM records ORDER BY id"
    ))
    .fetch_all(pool)
    .await?;

    Ok(rows.into_iter().map(StoredRecord::into_record).collect())
}

/// Get a record by ID.
pub async fn get_record(pool: &PgPool, id: RecordId) -> Result<Option<Record>, sqlx::Error> {
    let row = sqlx::query_as::<_, StoredRecord>(&format!(
        "SELECT {COLUMNS} FROM records WHERE id = $1"
    ))
    .bind(id)
    .fetch_optional(pool)
    .await?;

    Ok(row.map(StoredRecord::into_record))
}

/// Insert a new record. Returns false if the id is already taken.
pub async fn insert_record(pool: &PgPool, record: &Record) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        r#"
        INSERT INTO records (
            id, first_name, last_name, status, region, sales_rep,
            follow_up, notes, last_updated
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
        ON CONFLICT (id) DO NOTHING
        "#,
    )
    .bind(record.id)
    .bind(&record.first_name)
    .bind(&record.last_name)
    .bind(&record.status)
    .bind(&record.region)
    .bind(&record.sales_rep)
    .bind(&record.follow_up)
    .bind(&record.notes)
    .bind(record.last_updated)
    .execute(pool)
    .await?;

    Ok(result.rows_affected() == 1)
}

/// Upsert a record (insert or update).
pub async fn upsert_record(pool: &PgPool, record: &Record) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO records (
            id, first_name, last_name, status, region, sales_rep,
            follow_up, notes, last_updated
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
        ON CONFLICT (id) DO UPDATE SET
            first_name = EXCLUDED.first_name,
            last_name = EXCLUDED.last_name,
            status = EXCLUDED.status,
            region = EXCLUDED.region,
            sales_rep = EXCLUDED.sales_rep,
            follow_up = EXCLUDED.follow_up,
            notes = EXCLUDED.notes,
            last_updated = EXCLUDED.last_updated
        "#,
    )
    .bind(record.id)
    .bind(&record.first_name)
    .bind(&record.last_name)
    .bind(&record.status)
    .bind(&record.region)
    .bind(&record.sales_rep)
    .bind(&record.follow_up)
    .bind(&record.notes)
    .bind(record.last_updated)
    .execute(pool)
    .await?;

    Ok(())
}

/// Overwrite an existing record. Returns false if it does not exist.
pub async fn update_record(pool: &PgPool, record: &Record) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        r#"
        UPDATE records SET
            first_name = $2,
            last_name = $3,
            status = $4,
            region = $5,
            sales_rep = $6,
            follow_up = $7,
            notes = $8,
            last_updated = $9
        WHERE id = $1
        "#,
    )
    .bind(record.id)
    .bind(&record.first_name)
    .bind(&record.last_name)
    .bind(&record.status)
    .bind(&record.region)
    .bind(&record.sales_rep)
    .bind(&record.follow_up)
    .bind(&record.notes)
    .bind(record.last_updated)
    .execute(pool)
    .await?;

    Ok(result.rows_affected() == 1)
}

/// Delete a record. Returns false if it was already gone.
pub async fn delete_record(pool: &PgPool, id: RecordId) -> Result<bool, sqlx::Error> {
    let result = sqlx::query("DELETE FROM records WHERE id = $1")
        .bind(id)
        .execute(pool)
        .await?;

    Ok(result.rows_affected() == 1)
}
