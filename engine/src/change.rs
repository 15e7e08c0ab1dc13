//! Change types for expressing the work of one cycle.
//!
//! Changes are computed, never applied, by the engine. A [`ChangeSet`] holds
//! two phases: every insert and update comes before every delete, and no
//! record id appears more than once across both phases.

use crate::{error::Result, Error, Record, RecordId, Side};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// A single write against one store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ChangeOp {
    /// The record is missing from the target
    Insert(Record),
    /// The target holds an older or tie-losing version
    Update(Record),
    /// The record was deleted from the peer
    Delete { id: RecordId },
}

impl ChangeOp {
    /// Get the record ID this operation targets.
    pub fn record_id(&self) -> RecordId {
        match self {
            ChangeOp::Insert(record) | ChangeOp::Update(record) => record.id,
            ChangeOp::Delete { id } => *id,
        }
    }

    /// Record carried by an insert or update.
    pub fn record(&self) -> Option<&Record> {
        match self {
            ChangeOp::Insert(record) | ChangeOp::Update(record) => Some(record),
            ChangeOp::Delete { .. } => None,
        }
    }

    pub fn is_delete(&self) -> bool {
        matches!(self, ChangeOp::Delete { .. })
    }

    /// Short lowercase name, for logs.
    pub fn kind(&self) -> &'static str {
        match self {
            ChangeOp::Insert(_) => "insert",
            ChangeOp::Update(_) => "update",
            ChangeOp::Delete { .. } => "delete",
        }
    }
}

/// An operation tagged with the store it must be applied to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Change {
    pub target: Side,
    pub op: ChangeOp,
}

impl Change {
    pub fn insert(target: Side, record: Record) -> Self {
        Self {
            target,
            op: ChangeOp::Insert(record),
        }
    }

    pub fn update(target: Side, record: Record) -> Self {
        Self {
            target,
            op: ChangeOp::Update(record),
        }
    }

    pub fn delete(target: Side, id: RecordId) -> Self {
        Self {
            target,
            op: ChangeOp::Delete { id },
        }
    }

    pub fn record_id(&self) -> RecordId {
        self.op.record_id()
    }
}

/// Per-store operation counts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SideCounts {
    pub inserted: usize,
    pub updated: usize,
    pub deleted: usize,
}

impl SideCounts {
    /// Count one operation.
    pub fn add(&mut self, op: &ChangeOp) {
        match op {
            ChangeOp::Insert(_) => self.inserted += 1,
            ChangeOp::Update(_) => self.updated += 1,
            ChangeOp::Delete { .. } => self.deleted += 1,
        }
    }

    pub fn total(&self) -> usize {
        self.inserted + self.updated + self.deleted
    }
}

/// Operation counts for both stores.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeCounts {
    pub a: SideCounts,
    pub b: SideCounts,
}

impl ChangeCounts {
    pub fn side(&self, side: Side) -> &SideCounts {
        match side {
            Side::A => &self.a,
            Side::B => &self.b,
        }
    }

    pub fn side_mut(&mut self, side: Side) -> &mut SideCounts {
        match side {
            Side::A => &mut self.a,
            Side::B => &mut self.b,
        }
    }
}

/// The ordered work of one reconciliation cycle.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ChangeSet {
    upserts: Vec<Change>,
    deletes: Vec<Change>,
    #[serde(skip)]
    touched: BTreeSet<RecordId>,
}

impl ChangeSet {
    /// Create an empty change set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a change, keeping each phase ordered by id.
    ///
    /// Fails if the record id already carries an operation, in either phase.
    pub fn push(&mut self, change: Change) -> Result<()> {
        let id = change.record_id();
        if !self.touched.insert(id) {
            return Err(Error::ConflictingChange(id));
        }

        let phase = if change.op.is_delete() {
            &mut self.deletes
        } else {
            &mut self.upserts
        };
        let at = phase.partition_point(|c| c.record_id() < id);
        phase.insert(at, change);
        Ok(())
    }

    /// Inserts and updates, applied first.
    pub fn upserts(&self) -> &[Change] {
        &self.upserts
    }

    /// Deletes, applied only after every upsert.
    pub fn deletes(&self) -> &[Change] {
        &self.deletes
    }

    /// All changes in application order.
    pub fn iter(&self) -> impl Iterator<Item = &Change> {
        self.upserts.iter().chain(self.deletes.iter())
    }

    /// Changes aimed at one store, in application order.
    pub fn for_target(&self, side: Side) -> impl Iterator<Item = &Change> {
        self.iter().filter(move |c| c.target == side)
    }

    /// Whether any operation touches this record id.
    pub fn contains(&self, id: RecordId) -> bool {
        self.touched.contains(&id)
    }

    pub fn len(&self) -> usize {
        self.upserts.len() + self.deletes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.upserts.is_empty() && self.deletes.is_empty()
    }

    pub fn counts(&self) -> ChangeCounts {
        let mut counts = ChangeCounts::default();
        for change in self.iter() {
            counts.side_mut(change.target).add(&change.op);
        }
        counts
    }
}
