//! Error types for the tabsync engine.

use crate::{reconcile::AbortReason, RecordId, Side};
use thiserror::Error;

/// All possible errors from the tabsync engine.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum Error {
    // Snapshot errors
    #[error("duplicate record id {id} in snapshot of store {side}")]
    DuplicateRecordId { side: Side, id: RecordId },

    // Change set errors
    #[error("change set already holds an operation for record {0}")]
    ConflictingChange(RecordId),

    // Validation errors
    #[error("invalid record {id}: {reason}")]
    InvalidRecord { id: RecordId, reason: String },

    // Tabular codec errors
    #[error("missing column: {0}")]
    MissingColumn(String),

    #[error("invalid row {row}: {reason}")]
    InvalidRow { row: usize, reason: String },

    // Reconciliation errors
    #[error("cycle aborted: {0}")]
    Aborted(AbortReason),
}

/// Result type for engine operations.
pub type Result<T> = std::result::Result<T, Error>;
