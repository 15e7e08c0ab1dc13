//! The reconciliation loop around the engine.
//!
//! [`CycleRunner`] performs one fetch → reconcile → apply pass and keeps the
//! baseline between passes; [`Scheduler`] drives it on a timer.

mod applier;
mod cycle;
mod scheduler;
mod summary;

pub use applier::{ApplyReport, Applier};
pub use cycle::CycleRunner;
pub use scheduler::Scheduler;
pub use summary::{CycleOutcome, CycleSummary, FailedOperation, FetchedCounts};
