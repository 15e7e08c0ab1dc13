//! One reconciliation cycle: fetch, reconcile, apply, remember.

use super::applier::Applier;
use super::summary::{CycleOutcome, CycleSummary, FetchedCounts};
use crate::adapter::StoreAdapter;
use crate::config::SyncConfig;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tabsync_engine::{Baseline, DeletionPolicy, Error, Reconciler};
use tokio::sync::{watch, Mutex, RwLock};
use tracing::Instrument;

/// Runs cycles against a fixed pair of stores and keeps the state carried
/// between them.
pub struct CycleRunner {
    a: Arc<dyn StoreAdapter>,
    b: Arc<dyn StoreAdapter>,
    policy: DeletionPolicy,
    applier: Applier,
    /// Held for the whole cycle, so two cycles never interleave
    baseline: Mutex<Baseline>,
    last_summary: RwLock<Option<CycleSummary>>,
    cycles: AtomicU64,
}

impl CycleRunner {
    pub fn new(a: Arc<dyn StoreAdapter>, b: Arc<dyn StoreAdapter>, config: &SyncConfig) -> Self {
        Self {
            applier: Applier::new(a.clone(), b.clone(), config.apply_concurrency),
            a,
            b,
            policy: config.deletion_policy,
            baseline: Mutex::new(Baseline::new()),
            last_summary: RwLock::new(None),
            cycles: AtomicU64::new(0),
        }
    }

    /// Summary of the most recent cycle, if one has run.
    pub async fn last_summary(&self) -> Option<CycleSummary> {
        self.last_summary.read().await.clone()
    }

    /// Current baseline (a copy).
    pub async fn baseline(&self) -> Baseline {
        self.baseline.lock().await.clone()
    }

    /// Run one cycle.
    ///
    /// If `shutdown` is raised by the time both fetches return, the cycle is
    /// abandoned without writing. Once applying has begun it runs to the end.
    pub async fn run_cycle(&self, shutdown: &watch::Receiver<bool>) -> CycleSummary {
        let cycle = self.cycles.fetch_add(1, Ordering::SeqCst) + 1;
        let span = tracing::info_span!("cycle", cycle);

        let summary = self.execute(cycle, shutdown).instrument(span).await;
        *self.last_summary.write().await = Some(summary.clone());
        summary
    }

    async fn execute(&self, cycle: u64, shutdown: &watch::Receiver<bool>) -> CycleSummary {
        let mut summary = CycleSummary::start(cycle);
        let mut baseline = self.baseline.lock().await;

        let (a, b) = tokio::join!(self.a.snapshot(), self.b.snapshot());

        if *shutdown.borrow() {
            tracing::info!("Shutdown requested; abandoning cycle before any write");
            return summary.finish(CycleOutcome::Abandoned);
        }

        let result = match Reconciler::new(&baseline, self.policy).reconcile(&a, &b) {
            Ok(result) => result,
            Err(Error::Aborted(reason)) => {
                tracing::warn!(
                    a_error = a.failure().unwrap_or("-"),
                    b_error = b.failure().unwrap_or("-"),
                    "Degraded mode, skipping cycle: {}",
                    reason
                );
                return summary.finish(CycleOutcome::Aborted { reason });
            }
            Err(e) => {
                tracing::error!(error = %e, "Reconciliation failed");
                return summary.finish(CycleOutcome::Failed {
                    error: e.to_string(),
                });
            }
        };

        summary.fetched = Some(FetchedCounts {
            a: a.len(),
            b: b.len(),
        });
        if a.is_empty() && b.is_empty() {
            tracing::info!("No data to sync");
        }

        for tie in &result.tie_breaks {
            tracing::info!(record_id = tie.id, winner = %tie.winner, "Equal timestamps, tie broken");
        }
        for suppressed in &result.suppressed {
            tracing::warn!(
                side = %suppressed.target,
                record_id = suppressed.id,
                reason = %suppressed.reason,
                "Deletion suppressed"
            );
        }

        let report = self.applier.apply(&result.changes).await;
        baseline.advance(
            &a,
            &b,
            result.changes.iter().zip(report.accepted.iter().copied()),
        );

        let applied = report.applied;
        if result.changes.is_empty() {
            tracing::debug!(records = a.len(), "Stores already converged");
        } else {
            tracing::info!(
                a_inserted = applied.a.inserted,
                a_updated = applied.a.updated,
                a_deleted = applied.a.deleted,
                b_inserted = applied.b.inserted,
                b_updated = applied.b.updated,
                b_deleted = applied.b.deleted,
                failed = report.failed.len(),
                "Cycle applied"
            );
        }

        summary.applied = applied;
        summary.failed = report.failed;
        summary.suppressed = result.suppressed;
        summary.tie_breaks = result.tie_breaks;
        summary.finish(CycleOutcome::Completed)
    }
}
