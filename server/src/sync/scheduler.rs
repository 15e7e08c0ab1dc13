//! Periodic cycle scheduler.

use super::cycle::CycleRunner;
use super::summary::CycleSummary;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::{JoinError, JoinHandle};
use tokio::time::{interval, MissedTickBehavior};

/// Runs a cycle every `period`, one at a time.
///
/// Each cycle runs in its own task so a panic is contained to that cycle.
/// A tick that finds the previous cycle still running is dropped, not
/// queued.
pub struct Scheduler {
    runner: Arc<CycleRunner>,
    period: Duration,
}

impl Scheduler {
    pub fn new(runner: Arc<CycleRunner>, period: Duration) -> Self {
        Self { runner, period }
    }

    /// Run until `shutdown` turns true (or its sender is dropped), then wait
    /// for the in-flight cycle.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        tracing::info!(period_secs = self.period.as_secs_f64(), "Scheduler started");

        let mut ticker = interval(self.period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut in_flight: Option<JoinHandle<CycleSummary>> = None;

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Some(handle) = in_flight.take() {
                        if !handle.is_finished() {
                            tracing::info!("Previous cycle still running, skipping tick");
                            in_flight = Some(handle);
                            continue;
                        }
                        report(handle.await);
                    }

                    let runner = self.runner.clone();
                    let cycle_shutdown = shutdown.clone();
                    in_flight = Some(tokio::spawn(async move {
                        runner.run_cycle(&cycle_shutdown).await
                    }));
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        if let Some(handle) = in_flight {
            tracing::info!("Waiting for in-flight cycle to finish");
            report(handle.await);
        }
        tracing::info!("Scheduler stopped");
    }
}

/// Log what happened to a cycle task that did not return normally.
fn report(joined: Result<CycleSummary, JoinError>) {
    match joined {
        Ok(summary) => {
            tracing::debug!(cycle = summary.cycle, outcome = ?summary.outcome, "Cycle finished");
        }
        Err(e) if e.is_panic() => {
            tracing::error!("Cycle panicked; continuing with the next tick");
        }
        Err(e) => {
            tracing::error!(error = %e, "Cycle task failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::MemoryAdapter;
    use crate::config::SyncConfig;
    use crate::sync::CycleOutcome;
    use tabsync_engine::{Record, Side};

    fn record(id: i64) -> Record {
        Record::new(id, "Ada", "Lovelace", "open", "EMEA", "Grace")
    }

    fn setup() -> (Arc<MemoryAdapter>, Arc<MemoryAdapter>, Arc<CycleRunner>) {
        let a = Arc::new(MemoryAdapter::new(Side::A, "sheet").with_records([record(1)]));
        let b = Arc::new(MemoryAdapter::new(Side::B, "db"));
        let runner = Arc::new(CycleRunner::new(a.clone(), b.clone(), &SyncConfig::default()));
        (a, b, runner)
    }

    #[tokio::test]
    async fn runs_cycles_until_shutdown() {
        let (_a, b, runner) = setup();
        let (tx, rx) = watch::channel(false);
        let handle = tokio::spawn(Scheduler::new(runner.clone(), Duration::from_millis(20)).run(rx));

        tokio::time::sleep(Duration::from_millis(90)).await;
        tx.send(true).unwrap();
        handle.await.unwrap();

        let last = runner.last_summary().await.unwrap();
        assert!(last.cycle >= 2);
        assert_eq!(b.ids(), vec![1]);
    }

    #[tokio::test]
    async fn slow_cycle_skips_ticks() {
        let (a, _b, runner) = setup();
        a.set_fetch_delay(Duration::from_millis(120));
        let (tx, rx) = watch::channel(false);
        let handle = tokio::spawn(Scheduler::new(runner.clone(), Duration::from_millis(10)).run(rx));

        tokio::time::sleep(Duration::from_millis(200)).await;
        a.set_fetch_delay(Duration::ZERO);
        tx.send(true).unwrap();
        handle.await.unwrap();

        // Roughly 20 ticks elapsed but cycles never overlapped
        let last = runner.last_summary().await.unwrap();
        assert!(last.cycle <= 3, "ran {} cycles", last.cycle);
    }

    #[tokio::test]
    async fn panic_is_contained() {
        let (a, b, runner) = setup();
        a.set_fetch_panic(true);
        let (tx, rx) = watch::channel(false);
        let handle = tokio::spawn(Scheduler::new(runner.clone(), Duration::from_millis(20)).run(rx));

        tokio::time::sleep(Duration::from_millis(50)).await;
        a.set_fetch_panic(false);
        tokio::time::sleep(Duration::from_millis(60)).await;
        tx.send(true).unwrap();
        handle.await.unwrap();

        // The scheduler survived and later cycles synced the store
        assert_eq!(b.ids(), vec![1]);
    }

    #[tokio::test]
    async fn shutdown_during_fetch_abandons_cycle() {
        let (a, b, runner) = setup();
        a.set_fetch_delay(Duration::from_millis(80));
        let (tx, rx) = watch::channel(false);
        let handle = tokio::spawn(Scheduler::new(runner.clone(), Duration::from_secs(60)).run(rx));

        // First tick fires immediately; stop while it is still fetching
        tokio::time::sleep(Duration::from_millis(20)).await;
        tx.send(true).unwrap();
        handle.await.unwrap();

        let last = runner.last_summary().await.unwrap();
        assert_eq!(last.outcome, CycleOutcome::Abandoned);
        assert_eq!(b.write_count(), 0);
    }
}
