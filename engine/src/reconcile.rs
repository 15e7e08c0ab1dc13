//! Reconciliation logic for converging two stores.
//!
//! This is the core of determinism. Given a snapshot of each store and the
//! baseline left by the previous cycle, this module produces the change set
//! that makes both stores hold the same records.
//!
//! # Algorithm
//!
//! 1. Abort if either snapshot failed (no ground truth, no writes)
//! 2. For ids held by both stores, resolve by last-write-wins and emit at
//!    most one update, to the losing store
//! 3. For ids held by one store and unknown to the other's baseline, emit
//!    an insert into the other store
//! 4. Against the post-insert expected state, emit deletes for ids the
//!    other store's baseline held but its snapshot no longer does
//! 5. Suppress deletions that an empty, uncorroborated snapshot would
//!    cascade into a wipe of the peer

use crate::{
    error::Result, Baseline, Change, ChangeSet, Error, Record, RecordId, Side, Snapshot,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// Rules controlling which inferred deletions may be propagated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeletionPolicy {
    /// Operator override: propagate deletions implied by an empty snapshot
    /// even when the store never returned data before
    pub allow_unverified_cascade: bool,
    /// Ok, non-empty snapshots a store must have returned before its empty
    /// snapshot may wipe the peer
    pub cascade_min_nonempty_fetches: u32,
}

impl Default for DeletionPolicy {
    fn default() -> Self {
        Self {
            allow_unverified_cascade: false,
            cascade_min_nonempty_fetches: 1,
        }
    }
}

/// Outcome of comparing the two versions of one record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    /// All fields other than `last_updated` match
    Equivalent,
    /// One side is strictly newer
    Newer(Side),
    /// Fields differ but timestamps are equal; store A wins
    TieBreak(Side),
}

/// Decide which version of a record both stores should end up with.
pub fn resolve(a: &Record, b: &Record) -> Resolution {
    if a.is_equivalent(b) {
        return Resolution::Equivalent;
    }

    // None (missing or unparseable) orders before any timestamp
    match a.last_updated.cmp(&b.last_updated) {
        std::cmp::Ordering::Greater => Resolution::Newer(Side::A),
        std::cmp::Ordering::Less => Resolution::Newer(Side::B),
        std::cmp::Ordering::Equal => Resolution::TieBreak(Side::A),
    }
}

/// Why a cycle produced no change set at all.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum AbortReason {
    /// Neither store could be fetched
    DualFetchFailure,
    /// One store could not be fetched; one-directional sync is unsafe
    PartialFetchFailure { failed: Side },
}

impl fmt::Display for AbortReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AbortReason::DualFetchFailure => f.write_str("dual fetch failure"),
            AbortReason::PartialFetchFailure { failed } => {
                write!(f, "partial fetch failure: store {failed} unavailable")
            }
        }
    }
}

/// A deletion held back because it could not be corroborated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SuppressedDelete {
    /// Store the delete would have been applied to
    pub target: Side,
    pub id: RecordId,
    pub reason: String,
}

/// A conflict settled by the fixed tie-break rather than by timestamps.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TieBreak {
    pub id: RecordId,
    pub winner: Side,
}

/// Result of reconciliation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReconcileResult {
    /// Work to apply, upserts before deletes
    pub changes: ChangeSet,
    /// Deletions withheld as ambiguous
    pub suppressed: Vec<SuppressedDelete>,
    /// Conflicts resolved by the tie-break
    pub tie_breaks: Vec<TieBreak>,
}

/// The reconciler computes change sets. It holds no state of its own.
pub struct Reconciler<'a> {
    baseline: &'a Baseline,
    policy: DeletionPolicy,
}

impl<'a> Reconciler<'a> {
    /// Create a new reconciler.
    pub fn new(baseline: &'a Baseline, policy: DeletionPolicy) -> Self {
        Self { baseline, policy }
    }

    /// Compute the change set converging `a` and `b`.
    ///
    /// Returns [`Error::Aborted`], and no work at all, if either fetch failed.
    pub fn reconcile(&self, a: &Snapshot, b: &Snapshot) -> Result<ReconcileResult> {
        debug_assert_eq!(a.source(), Side::A);
        debug_assert_eq!(b.source(), Side::B);

        let abort = match (a.is_ok(), b.is_ok()) {
            (true, true) => None,
            (false, false) => Some(AbortReason::DualFetchFailure),
            (false, true) => Some(AbortReason::PartialFetchFailure { failed: Side::A }),
            (true, false) => Some(AbortReason::PartialFetchFailure { failed: Side::B }),
        };
        if let Some(reason) = abort {
            return Err(Error::Aborted(reason));
        }

        let mut result = ReconcileResult::default();

        // Phase one: updates and inserts
        self.plan_upserts(a, b, &mut result)?;
        self.plan_upserts(b, a, &mut result)?;

        // Phase two: deletes, against the state expected once phase one lands
        let expected_a = expected_ids(a, &result.changes);
        let expected_b = expected_ids(b, &result.changes);
        self.plan_deletes(a, b, &expected_a, &expected_b, &mut result)?;
        self.plan_deletes(b, a, &expected_b, &expected_a, &mut result)?;

        Ok(result)
    }

    /// Upserts flowing from `source` into its peer.
    fn plan_upserts(
        &self,
        source: &Snapshot,
        peer: &Snapshot,
        result: &mut ReconcileResult,
    ) -> Result<()> {
        let target = peer.source();
        let peer_baseline = self.baseline.side(target);

        for record in source.records() {
            match peer.get(record.id) {
                Some(peer_record) => {
                    // Common ids are visited from both directions; decide once
                    if source.source() != Side::A {
                        continue;
                    }
                    match resolve(record, peer_record) {
                        Resolution::Equivalent => {}
                        Resolution::Newer(winner) => {
                            result.changes.push(update_towards(winner, record, peer_record))?;
                        }
                        Resolution::TieBreak(winner) => {
                            result.tie_breaks.push(TieBreak {
                                id: record.id,
                                winner,
                            });
                            result.changes.push(update_towards(winner, record, peer_record))?;
                        }
                    }
                }
                // Known to the peer before: the peer deleted it. Phase two decides.
                None if peer_baseline.contains(record.id) => {}
                None => result.changes.push(Change::insert(target, record.clone()))?,
            }
        }
        Ok(())
    }

    /// Deletes against `holder` for ids that `observed` lost since the last
    /// cycle.
    fn plan_deletes(
        &self,
        holder: &Snapshot,
        observed: &Snapshot,
        expected_holder: &BTreeSet<RecordId>,
        expected_observed: &BTreeSet<RecordId>,
        result: &mut ReconcileResult,
    ) -> Result<()> {
        let target = holder.source();
        let observed_baseline = self.baseline.side(observed.source());

        let candidates: Vec<RecordId> = expected_holder
            .difference(expected_observed)
            .copied()
            .filter(|id| observed_baseline.contains(*id) && !result.changes.contains(*id))
            .collect();

        if candidates.is_empty() {
            return Ok(());
        }

        if let Some(reason) = self.cascade_risk(holder, observed) {
            result
                .suppressed
                .extend(candidates.into_iter().map(|id| SuppressedDelete {
                    target,
                    id,
                    reason: reason.clone(),
                }));
            return Ok(());
        }

        for id in candidates {
            result.changes.push(Change::delete(target, id))?;
        }
        Ok(())
    }

    /// Whether an empty `observed` snapshot is too weakly corroborated to
    /// delete from a non-empty `holder`.
    fn cascade_risk(&self, holder: &Snapshot, observed: &Snapshot) -> Option<String> {
        if !observed.is_empty() || holder.is_empty() || self.policy.allow_unverified_cascade {
            return None;
        }

        let seen = self.baseline.side(observed.source()).nonempty_fetches();
        if seen >= self.policy.cascade_min_nonempty_fetches {
            return None;
        }

        Some(format!(
            "store {} returned an empty snapshot after {} of {} required non-empty fetches",
            observed.source(),
            seen,
            self.policy.cascade_min_nonempty_fetches
        ))
    }
}

/// Build the update mirroring the winning version onto the losing store.
fn update_towards(winner: Side, a_record: &Record, b_record: &Record) -> Change {
    match winner {
        Side::A => Change::update(Side::B, a_record.clone()),
        Side::B => Change::update(Side::A, b_record.clone()),
    }
}

/// Ids a store will hold once every upsert aimed at it has been applied.
fn expected_ids(snapshot: &Snapshot, changes: &ChangeSet) -> BTreeSet<RecordId> {
    let mut ids = snapshot.ids();
    ids.extend(
        changes
            .upserts()
            .iter()
            .filter(|c| c.target == snapshot.source())
            .map(Change::record_id),
    );
    ids
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{baseline::SideBaseline, ChangeOp, Timestamp};
    use chrono::{Duration, TimeZone, Utc};

    fn t(seconds: i64) -> Timestamp {
        Utc.with_ymd_and_hms(2024, 6, 1, 9, 0, 0).unwrap() + Duration::seconds(seconds)
    }

    fn record(id: RecordId, status: &str, at: i64) -> Record {
        Record::new(id, "Ada", "Lovelace", status, "EMEA", "Grace").updated_at(t(at))
    }

    fn snap(side: Side, records: Vec<Record>) -> Snapshot {
        Snapshot::from_records(side, records, t(0)).unwrap()
    }

    fn ops(result: &ReconcileResult) -> Vec<(Side, &'static str, RecordId)> {
        result
            .changes
            .iter()
            .map(|c| (c.target, c.op.kind(), c.record_id()))
            .collect()
    }

    #[test]
    fn resolve_by_timestamp() {
        let older = record(1, "open", 10);
        let newer = record(1, "won", 20);

        assert_eq!(resolve(&older, &newer), Resolution::Newer(Side::B));
        assert_eq!(resolve(&newer, &older), Resolution::Newer(Side::A));
        assert_eq!(
            resolve(&older, &record(1, "open", 99)),
            Resolution::Equivalent
        );
    }

    #[test]
    fn resolve_tie_goes_to_store_a() {
        assert_eq!(
            resolve(&record(1, "open", 10), &record(1, "won", 10)),
            Resolution::TieBreak(Side::A)
        );
    }

    #[test]
    fn resolve_missing_timestamp_always_loses() {
        let mut stale = record(1, "open", 0);
        stale.last_updated = None;
        let dated = Record::new(1, "Ada", "Lovelace", "won", "EMEA", "Grace")
            .updated_at(Utc.with_ymd_and_hms(1970, 1, 1, 0, 0, 0).unwrap());

        assert_eq!(resolve(&stale, &dated), Resolution::Newer(Side::B));
        assert_eq!(resolve(&dated, &stale), Resolution::Newer(Side::A));
    }

    #[test]
    fn newer_b_updates_a_and_inserts_missing() {
        let baseline = Baseline::new();
        let reconciler = Reconciler::new(&baseline, DeletionPolicy::default());

        let a = snap(Side::A, vec![record(1, "open", 10)]);
        let b = snap(Side::B, vec![record(1, "won", 20), record(2, "open", 5)]);

        let result = reconciler.reconcile(&a, &b).unwrap();

        assert_eq!(
            ops(&result),
            vec![(Side::A, "update", 1), (Side::A, "insert", 2)]
        );
        assert_eq!(
            result.changes.upserts()[0].op,
            ChangeOp::Update(record(1, "won", 20))
        );
        assert!(result.changes.deletes().is_empty());
        assert!(result.tie_breaks.is_empty());
    }

    #[test]
    fn tie_break_is_reported() {
        let baseline = Baseline::new();
        let reconciler = Reconciler::new(&baseline, DeletionPolicy::default());

        let a = snap(Side::A, vec![record(1, "open", 10)]);
        let b = snap(Side::B, vec![record(1, "lost", 10)]);

        let result = reconciler.reconcile(&a, &b).unwrap();

        assert_eq!(ops(&result), vec![(Side::B, "update", 1)]);
        assert_eq!(
            result.tie_breaks,
            vec![TieBreak {
                id: 1,
                winner: Side::A
            }]
        );
    }

    #[test]
    fn deletion_propagates_when_peer_had_the_record() {
        // B previously held {1, 2}; now only {1}
        let baseline = Baseline::from_sides(
            SideBaseline::new([1, 2], 1),
            SideBaseline::new([1, 2], 1),
        );
        let reconciler = Reconciler::new(&baseline, DeletionPolicy::default());

        let a = snap(Side::A, vec![record(1, "open", 1), record(2, "open", 1)]);
        let b = snap(Side::B, vec![record(1, "open", 1)]);

        let result = reconciler.reconcile(&a, &b).unwrap();

        assert_eq!(ops(&result), vec![(Side::A, "delete", 2)]);
        assert!(result.suppressed.is_empty());
    }

    #[test]
    fn unknown_record_is_inserted_not_deleted() {
        // Baseline knows nothing about record 3 on either side
        let baseline = Baseline::from_sides(SideBaseline::new([1], 1), SideBaseline::new([1], 1));
        let reconciler = Reconciler::new(&baseline, DeletionPolicy::default());

        let a = snap(Side::A, vec![record(1, "open", 1), record(3, "new", 2)]);
        let b = snap(Side::B, vec![record(1, "open", 1)]);

        let result = reconciler.reconcile(&a, &b).unwrap();

        assert_eq!(ops(&result), vec![(Side::B, "insert", 3)]);
    }

    #[test]
    fn abort_on_dual_failure() {
        let baseline = Baseline::new();
        let reconciler = Reconciler::new(&baseline, DeletionPolicy::default());

        let a = Snapshot::failed(Side::A, "auth", t(0));
        let b = Snapshot::failed(Side::B, "timeout", t(0));

        assert_eq!(
            reconciler.reconcile(&a, &b),
            Err(Error::Aborted(AbortReason::DualFetchFailure))
        );
    }

    #[test]
    fn abort_on_partial_failure() {
        // B's last good state had {1}; A holds {1, 2}
        let baseline = Baseline::from_sides(SideBaseline::new([1], 1), SideBaseline::new([1], 1));
        let reconciler = Reconciler::new(&baseline, DeletionPolicy::default());

        let a = snap(Side::A, vec![record(1, "open", 1), record(2, "open", 1)]);
        let b = Snapshot::failed(Side::B, "connection reset", t(0));

        let err = reconciler.reconcile(&a, &b).unwrap_err();
        assert_eq!(
            err,
            Error::Aborted(AbortReason::PartialFetchFailure { failed: Side::B })
        );
        assert_eq!(
            err.to_string(),
            "cycle aborted: partial fetch failure: store B unavailable"
        );
    }

    #[test]
    fn first_empty_snapshot_does_not_wipe_peer() {
        // A was populated by inserts but has never returned data itself
        let baseline = Baseline::from_sides(SideBaseline::new([1, 2], 0), SideBaseline::new([1, 2], 1));
        let reconciler = Reconciler::new(&baseline, DeletionPolicy::default());

        let a = Snapshot::empty(Side::A, t(0));
        let b = snap(Side::B, vec![record(1, "open", 1), record(2, "open", 1)]);

        let result = reconciler.reconcile(&a, &b).unwrap();

        assert!(result.changes.is_empty());
        assert_eq!(result.suppressed.len(), 2);
        assert!(result.suppressed.iter().all(|s| s.target == Side::B));
    }

    #[test]
    fn corroborated_empty_snapshot_may_cascade() {
        let baseline = Baseline::from_sides(SideBaseline::new([1, 2], 4), SideBaseline::new([1, 2], 4));
        let reconciler = Reconciler::new(&baseline, DeletionPolicy::default());

        let a = Snapshot::empty(Side::A, t(0));
        let b = snap(Side::B, vec![record(1, "open", 1), record(2, "open", 1)]);

        let result = reconciler.reconcile(&a, &b).unwrap();

        assert_eq!(
            ops(&result),
            vec![(Side::B, "delete", 1), (Side::B, "delete", 2)]
        );
    }

    #[test]
    fn operator_override_allows_cascade() {
        let baseline = Baseline::from_sides(SideBaseline::new([1], 0), SideBaseline::new([1], 1));
        let policy = DeletionPolicy {
            allow_unverified_cascade: true,
            ..DeletionPolicy::default()
        };
        let reconciler = Reconciler::new(&baseline, policy);

        let a = Snapshot::empty(Side::A, t(0));
        let b = snap(Side::B, vec![record(1, "open", 1)]);

        let result = reconciler.reconcile(&a, &b).unwrap();
        assert_eq!(ops(&result), vec![(Side::B, "delete", 1)]);
    }

    #[test]
    fn both_empty_is_a_no_op() {
        let baseline = Baseline::new();
        let reconciler = Reconciler::new(&baseline, DeletionPolicy::default());

        let result = reconciler
            .reconcile(&Snapshot::empty(Side::A, t(0)), &Snapshot::empty(Side::B, t(0)))
            .unwrap();

        assert!(result.changes.is_empty());
        assert!(result.suppressed.is_empty());
    }

    #[test]
    fn reconcile_deterministic() {
        let baseline = Baseline::from_sides(SideBaseline::new([4], 2), SideBaseline::new([4, 5], 2));
        let a = snap(
            Side::A,
            vec![record(1, "x", 3), record(3, "y", 3), record(4, "z", 1)],
        );
        let b = snap(
            Side::B,
            vec![record(1, "w", 3), record(2, "v", 3), record(4, "z", 9)],
        );

        let first = Reconciler::new(&baseline, DeletionPolicy::default())
            .reconcile(&a, &b)
            .unwrap();
        for _ in 0..10 {
            let again = Reconciler::new(&baseline, DeletionPolicy::default())
                .reconcile(&a, &b)
                .unwrap();
            assert_eq!(first, again);
        }
    }

    // Property-based tests using proptest
    mod property_tests {
        use super::*;
        use proptest::prelude::*;
        use std::collections::BTreeMap;

        fn arb_store(side: Side) -> impl Strategy<Value = Snapshot> {
            prop::collection::btree_map(1i64..40, (0u8..3, 0i64..5), 0..20).prop_map(
                move |rows: BTreeMap<RecordId, (u8, i64)>| {
                    let records = rows
                        .into_iter()
                        .map(|(id, (status, at))| record(id, ["open", "won", "lost"][status as usize], at));
                    Snapshot::from_records(side, records, t(0)).unwrap()
                },
            )
        }

        fn arb_baseline() -> impl Strategy<Value = Baseline> {
            (
                prop::collection::btree_set(1i64..40, 0..20),
                prop::collection::btree_set(1i64..40, 0..20),
                0u32..3,
            )
                .prop_map(|(a, b, fetches)| {
                    Baseline::from_sides(SideBaseline::new(a, fetches), SideBaseline::new(b, fetches))
                })
        }

        /// Both stores hold the same ids with equivalent records.
        fn converged(a: &BTreeMap<RecordId, Record>, b: &BTreeMap<RecordId, Record>) -> bool {
            a.len() == b.len()
                && a.iter().all(|(id, ra)| b.get(id).is_some_and(|rb| ra.is_equivalent(rb)))
        }

        /// Apply a change set to in-memory copies of both stores.
        type Store = BTreeMap<RecordId, Record>;

        fn apply(a: &Snapshot, b: &Snapshot, changes: &ChangeSet) -> (Store, Store) {
            let mut a: BTreeMap<_, _> = a.records().map(|r| (r.id, r.clone())).collect();
            let mut b: BTreeMap<_, _> = b.records().map(|r| (r.id, r.clone())).collect();
            for change in changes.iter() {
                let store = match change.target {
                    Side::A => &mut a,
                    Side::B => &mut b,
                };
                match &change.op {
                    ChangeOp::Insert(r) | ChangeOp::Update(r) => {
                        store.insert(r.id, r.clone());
                    }
                    ChangeOp::Delete { id } => {
                        store.remove(id);
                    }
                }
            }
            (a, b)
        }

        proptest! {
            #[test]
            fn prop_converges_in_one_cycle(
                a in arb_store(Side::A),
                b in arb_store(Side::B),
                baseline in arb_baseline(),
            ) {
                let result = Reconciler::new(&baseline, DeletionPolicy::default())
                    .reconcile(&a, &b)
                    .unwrap();
                let (store_a, store_b) = apply(&a, &b, &result.changes);

                // Suppressed deletes leave the two stores intentionally apart
                prop_assume!(result.suppressed.is_empty());
                prop_assert!(converged(&store_a, &store_b));
            }

            #[test]
            fn prop_converged_stores_produce_no_work(
                a in arb_store(Side::A),
                b in arb_store(Side::B),
                baseline in arb_baseline(),
            ) {
                let policy = DeletionPolicy::default();
                let first = Reconciler::new(&baseline, policy).reconcile(&a, &b).unwrap();
                prop_assume!(first.suppressed.is_empty());

                let (store_a, store_b) = apply(&a, &b, &first.changes);
                let a2 = Snapshot::from_records(Side::A, store_a.into_values(), t(1)).unwrap();
                let b2 = Snapshot::from_records(Side::B, store_b.into_values(), t(1)).unwrap();

                let mut next = baseline.clone();
                next.advance(&a, &b, first.changes.iter().map(|c| (c, true)));

                let second = Reconciler::new(&next, policy).reconcile(&a2, &b2).unwrap();
                prop_assert!(second.changes.is_empty());
            }

            #[test]
            fn prop_no_id_gets_two_operations(
                a in arb_store(Side::A),
                b in arb_store(Side::B),
                baseline in arb_baseline(),
            ) {
                let result = Reconciler::new(&baseline, DeletionPolicy::default())
                    .reconcile(&a, &b)
                    .unwrap();

                let mut seen = BTreeSet::new();
                for change in result.changes.iter() {
                    prop_assert!(seen.insert(change.record_id()));
                }
            }

            #[test]
            fn prop_disjoint_stores_union(
                a in arb_store(Side::A),
                b in arb_store(Side::B),
            ) {
                // Keep the id ranges apart so no id is shared
                let b = Snapshot::from_records(
                    Side::B,
                    b.records().map(|r| Record { id: r.id + 100, ..r.clone() }),
                    t(0),
                ).unwrap();

                let result = Reconciler::new(&Baseline::new(), DeletionPolicy::default())
                    .reconcile(&a, &b)
                    .unwrap();
                let (store_a, store_b) = apply(&a, &b, &result.changes);

                prop_assert_eq!(store_a.len(), a.len() + b.len());
                prop_assert_eq!(&store_a, &store_b);
                prop_assert!(result.changes.deletes().is_empty());
            }

            #[test]
            fn prop_failed_fetch_never_deletes(
                a in arb_store(Side::A),
                b in arb_store(Side::B),
                baseline in arb_baseline(),
            ) {
                let failed = Snapshot::failed(Side::A, "unreachable", t(0));
                let result = Reconciler::new(&baseline, DeletionPolicy::default()).reconcile(&failed, &b);
                prop_assert_eq!(
                    result,
                    Err(Error::Aborted(AbortReason::PartialFetchFailure { failed: Side::A }))
                );

                let failed = Snapshot::failed(Side::B, "unreachable", t(0));
                let result = Reconciler::new(&baseline, DeletionPolicy::default()).reconcile(&a, &failed);
                prop_assert!(result.is_err());
            }
        }
    }
}
