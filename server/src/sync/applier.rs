//! Applies a change set to the two stores.

use super::summary::FailedOperation;
use crate::adapter::StoreAdapter;
use futures::{stream, StreamExt};
use std::sync::Arc;
use tabsync_engine::{Change, ChangeCounts, ChangeOp, ChangeSet, Side};

/// Result of applying one change set.
#[derive(Debug, Default)]
pub struct ApplyReport {
    /// Per change, in [`ChangeSet::iter`] order: whether the store accepted it
    pub accepted: Vec<bool>,
    pub applied: ChangeCounts,
    pub failed: Vec<FailedOperation>,
}

/// Executes change sets against both adapters.
///
/// Upserts all finish before the first delete starts. Within a phase every
/// id is distinct, so up to `concurrency` operations run at once. A failing
/// operation is recorded and never stops its siblings.
pub struct Applier {
    a: Arc<dyn StoreAdapter>,
    b: Arc<dyn StoreAdapter>,
    concurrency: usize,
}

impl Applier {
    pub fn new(a: Arc<dyn StoreAdapter>, b: Arc<dyn StoreAdapter>, concurrency: usize) -> Self {
        Self {
            a,
            b,
            concurrency: concurrency.max(1),
        }
    }

    fn adapter(&self, side: Side) -> &dyn StoreAdapter {
        match side {
            Side::A => self.a.as_ref(),
            Side::B => self.b.as_ref(),
        }
    }

    pub async fn apply(&self, changes: &ChangeSet) -> ApplyReport {
        let mut report = ApplyReport::default();
        self.apply_phase(changes.upserts(), &mut report).await;
        self.apply_phase(changes.deletes(), &mut report).await;
        report
    }

    async fn apply_phase(&self, phase: &[Change], report: &mut ApplyReport) {
        // Owned changes keep the futures free of borrowed lifetimes, so the
        // cycle can run inside a spawned task
        let mut results: Vec<(usize, Result<(), String>)> =
            stream::iter(phase.iter().cloned().enumerate())
                .map(|(i, change)| async move { (i, self.apply_one(&change).await) })
                .buffer_unordered(self.concurrency)
                .collect()
                .await;
        results.sort_by_key(|(i, _)| *i);

        for ((_, result), change) in results.into_iter().zip(phase) {
            match result {
                Ok(()) => {
                    report.applied.side_mut(change.target).add(&change.op);
                    report.accepted.push(true);
                }
                Err(error) => {
                    report.failed.push(FailedOperation {
                        target: change.target,
                        record_id: change.record_id(),
                        kind: change.op.kind(),
                        error,
                    });
                    report.accepted.push(false);
                }
            }
        }
    }

    async fn apply_one(&self, change: &Change) -> Result<(), String> {
        let adapter = self.adapter(change.target);
        let result = match &change.op {
            ChangeOp::Insert(record) | ChangeOp::Update(record) => adapter.upsert(record).await,
            ChangeOp::Delete { id } => adapter.delete(*id).await,
        };

        match result {
            Ok(()) => {
                tracing::debug!(
                    side = %change.target,
                    record_id = change.record_id(),
                    op = change.op.kind(),
                    "Applied"
                );
                Ok(())
            }
            Err(e) => {
                tracing::warn!(
                    side = %change.target,
                    record_id = change.record_id(),
                    op = change.op.kind(),
                    error = %e,
                    "Operation failed"
                );
                Err(e.to_string())
            }
        }
    }
}
