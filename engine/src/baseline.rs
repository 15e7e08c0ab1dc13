//! Memory carried from one reconciliation cycle to the next.
//!
//! Snapshot diffing alone cannot tell "deleted from X" apart from "never
//! reached X". The baseline records which ids each store held once the
//! previous cycle finished, so that absence can be read as a deletion only
//! when the id was known to be there.

use crate::{Change, ChangeOp, RecordId, Side, Snapshot};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// What one store looked like after the last reconciliation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SideBaseline {
    ids: BTreeSet<RecordId>,
    nonempty_fetches: u32,
}

impl SideBaseline {
    pub fn new(ids: impl IntoIterator<Item = RecordId>, nonempty_fetches: u32) -> Self {
        Self {
            ids: ids.into_iter().collect(),
            nonempty_fetches,
        }
    }

    /// Whether the store held `id` after the last cycle.
    pub fn contains(&self, id: RecordId) -> bool {
        self.ids.contains(&id)
    }

    pub fn ids(&self) -> &BTreeSet<RecordId> {
        &self.ids
    }

    /// How many ok, non-empty snapshots this store has returned.
    pub fn nonempty_fetches(&self) -> u32 {
        self.nonempty_fetches
    }
}

/// Prior sync state for both stores.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Baseline {
    a: SideBaseline,
    b: SideBaseline,
}

impl Baseline {
    /// A baseline with no history; no deletion can be inferred from it.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_sides(a: SideBaseline, b: SideBaseline) -> Self {
        Self { a, b }
    }

    pub fn side(&self, side: Side) -> &SideBaseline {
        match side {
            Side::A => &self.a,
            Side::B => &self.b,
        }
    }

    fn side_mut(&mut self, side: Side) -> &mut SideBaseline {
        match side {
            Side::A => &mut self.a,
            Side::B => &mut self.b,
        }
    }

    /// Advance past a cycle that applied its change set.
    ///
    /// `outcomes` pairs every attempted change with whether the target store
    /// accepted it. The resulting id-set of a store is what it was fetched
    /// with, plus the upserts it accepted, minus the deletes it accepted. A
    /// delete the target rejected keeps its id in the *peer's* id-set, so the
    /// next cycle still reads the peer's absence as a deletion instead of
    /// re-inserting the record there.
    ///
    /// Does nothing unless both snapshots are ok: an aborted cycle leaves the
    /// baseline exactly as it was.
    pub fn advance<'c>(
        &mut self,
        a: &Snapshot,
        b: &Snapshot,
        outcomes: impl IntoIterator<Item = (&'c Change, bool)>,
    ) {
        if !a.is_ok() || !b.is_ok() {
            return;
        }

        let mut next = Baseline {
            a: SideBaseline::new(a.ids(), self.a.nonempty_fetches),
            b: SideBaseline::new(b.ids(), self.b.nonempty_fetches),
        };

        for (change, succeeded) in outcomes {
            let id = change.record_id();
            match (&change.op, succeeded) {
                (ChangeOp::Insert(_) | ChangeOp::Update(_), true) => {
                    next.side_mut(change.target).ids.insert(id);
                }
                (ChangeOp::Insert(_) | ChangeOp::Update(_), false) => {}
                (ChangeOp::Delete { .. }, true) => {
                    next.side_mut(change.target).ids.remove(&id);
                }
                (ChangeOp::Delete { .. }, false) => {
                    next.side_mut(change.target.peer()).ids.insert(id);
                }
            }
        }

        for snapshot in [a, b] {
            if !snapshot.is_empty() {
                let side = next.side_mut(snapshot.source());
                side.nonempty_fetches = side.nonempty_fetches.saturating_add(1);
            }
        }

        *self = next;
    }
}
