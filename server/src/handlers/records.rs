//! Record handlers - direct CRUD on Store B.
//!
//! These writes bypass the sync cycle; the next cycle carries them over to
//! the sheet. Every write stamps `last_updated` so the edit wins against
//! older sheet data.

use crate::db;
use crate::error::{AppError, Result};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use tabsync_engine::{Record, RecordId};

/// Body of `POST /records`.
#[derive(Debug, Deserialize)]
pub struct NewRecord {
    pub id: RecordId,
    pub first_name: String,
    pub last_name: String,
    pub status: String,
    pub region: String,
    pub sales_rep: String,
    #[serde(default)]
    pub follow_up: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
}

impl From<NewRecord> for Record {
    fn from(new: NewRecord) -> Self {
        Record {
            id: new.id,
            first_name: new.first_name,
            last_name: new.last_name,
            status: new.status,
            region: new.region,
            sales_rep: new.sales_rep,
            follow_up: new.follow_up,
            notes: new.notes,
            last_updated: None,
        }
        .normalized()
    }
}

/// Body of `PUT /records/{id}`. Absent fields are left alone; an empty
/// string clears `follow_up` or `notes`.
#[derive(Debug, Default, Deserialize)]
pub struct RecordPatch {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub status: Option<String>,
    pub region: Option<String>,
    pub sales_rep: Option<String>,
    pub follow_up: Option<String>,
    pub notes: Option<String>,
}

impl RecordPatch {
    /// Apply the present fields to `record`.
    pub fn apply(self, record: &mut Record) {
        let fields = [
            (self.first_name, &mut record.first_name),
            (self.last_name, &mut record.last_name),
            (self.status, &mut record.status),
            (self.region, &mut record.region),
            (self.sales_rep, &mut record.sales_rep),
        ];
        for (value, slot) in fields {
            if let Some(value) = value {
                *slot = value;
            }
        }
        if let Some(follow_up) = self.follow_up {
            record.follow_up = Some(follow_up);
        }
        if let Some(notes) = self.notes {
            record.notes = Some(notes);
        }
    }
}

/// Response for deletes.
#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub message: String,
}

fn not_found(id: RecordId) -> AppError {
    AppError::NotFound(format!("record {id} not found"))
}

pub async fn list_records(pool: &PgPool) -> Result<Vec<Record>> {
    Ok(db::list_records(pool).await?)
}

pub async fn get_record(pool: &PgPool, id: RecordId) -> Result<Record> {
    db::get_record(pool, id).await?.ok_or_else(|| not_found(id))
}

/// Create a record, stamped now. Fails with a conflict if the id exists.
pub async fn create_record(pool: &PgPool, new: NewRecord) -> Result<Record> {
    let mut record = Record::from(new);
    record.validate()?;
    record.touch(Utc::now());

    if !db::insert_record(pool, &record).await? {
        return Err(AppError::Conflict(format!(
            "record {} already exists",
            record.id
        )));
    }

    tracing::info!(record_id = record.id, "Created record");
    Ok(record)
}

/// Patch a record and advance its timestamp.
pub async fn update_record(pool: &PgPool, id: RecordId, patch: RecordPatch) -> Result<Record> {
    let mut record = get_record(pool, id).await?;
    patch.apply(&mut record);
    let mut record = record.normalized();
    record.touch(Utc::now());

    if !db::update_record(pool, &record).await? {
        // Deleted between the read and the write
        return Err(not_found(id));
    }

    tracing::info!(record_id = id, "Updated record");
    Ok(record)
}

pub async fn delete_record(pool: &PgPool, id: RecordId) -> Result<MessageResponse> {
    if !db::delete_record(pool, id).await? {
        return Err(not_found(id));
    }

    tracing::info!(record_id = id, "Deleted record");
    Ok(MessageResponse {
        message: format!("record {id} deleted"),
    })
}
