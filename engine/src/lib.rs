//! # Tabsync Engine
//!
//! A deterministic reconciliation engine keeping two record stores
//! convergent.
//!
//! This crate holds the decision logic of tabsync: given one snapshot of
//! each store and what both stores held after the previous cycle, it
//! computes the inserts, updates and deletes that make them agree. It never
//! talks to a store itself.
//!
//! ## Design Principles
//!
//! - **No IO**: The engine knows nothing about spreadsheets, databases or
//!   the network
//! - **Deterministic**: Same snapshots and baseline always give the same
//!   change set, in the same order
//! - **Fail closed**: A failed or ambiguous fetch never turns into deletions
//!
//! ## Core Concepts
//!
//! ### Records and Snapshots
//!
//! A [`Record`] is keyed by a positive integer id and carries an optional
//! `last_updated` timestamp. A [`Snapshot`] captures one store in full and
//! says whether the fetch succeeded; an empty ok snapshot and a failed one
//! are different things.
//!
//! ### Baseline
//!
//! The [`Baseline`] remembers the id-set of each store after the last cycle.
//! It is what lets "absent now" be read as "deleted" instead of "never
//! synced".
//!
//! ### Reconciliation
//!
//! The [`Reconciler`] resolves conflicts by last-write-wins with store A
//! winning ties, and emits a [`ChangeSet`] whose upserts all precede its
//! deletes. Deletions an empty, uncorroborated snapshot would cascade into
//! a wipe are held back by the [`DeletionPolicy`] and reported instead.
//!
//! ## Quick Start
//!
//! ```rust
//! use chrono::{TimeZone, Utc};
//! use tabsync_engine::{
//!     Baseline, DeletionPolicy, Reconciler, Record, Side, Snapshot,
//! };
//!
//! let early = Utc.with_ymd_and_hms(2024, 1, 1, 9, 0, 0).unwrap();
//! let late = Utc.with_ymd_and_hms(2024, 1, 1, 10, 0, 0).unwrap();
//!
//! // 1. Capture both stores
//! let a = Snapshot::from_records(
//!     Side::A,
//!     vec![Record::new(1, "Ada", "Lovelace", "open", "EMEA", "Grace").updated_at(early)],
//!     late,
//! )
//! .unwrap();
//! let b = Snapshot::from_records(
//!     Side::B,
//!     vec![
//!         Record::new(1, "Ada", "Lovelace", "won", "EMEA", "Grace").updated_at(late),
//!         Record::new(2, "Alan", "Turing", "open", "EMEA", "Grace"),
//!     ],
//!     late,
//! )
//! .unwrap();
//!
//! // 2. Reconcile against the previous cycle
//! let mut baseline = Baseline::new();
//! let result = Reconciler::new(&baseline, DeletionPolicy::default())
//!     .reconcile(&a, &b)
//!     .unwrap();
//!
//! // B's newer record 1 overwrites A, and record 2 is copied into A
//! let counts = result.changes.counts();
//! assert_eq!(counts.side(Side::A).updated, 1);
//! assert_eq!(counts.side(Side::A).inserted, 1);
//! assert!(result.changes.deletes().is_empty());
//!
//! // 3. Once applied, remember what the stores now hold
//! baseline.advance(&a, &b, result.changes.iter().map(|c| (c, true)));
//! assert!(baseline.side(Side::A).contains(2));
//! ```
//!
//! ## Tabular Codec
//!
//! The [`tabular`] module maps spreadsheet rows to records through their
//! header row.

pub mod baseline;
pub mod change;
pub mod error;
pub mod reconcile;
pub mod record;
pub mod snapshot;
pub mod tabular;

// Re-export main types at crate root
pub use baseline::{Baseline, SideBaseline};
pub use change::{Change, ChangeCounts, ChangeOp, ChangeSet, SideCounts};
pub use error::Error;
pub use reconcile::{
    resolve, AbortReason, DeletionPolicy, ReconcileResult, Reconciler, Resolution,
    SuppressedDelete, TieBreak,
};
pub use record::Record;
pub use snapshot::{Side, Snapshot};

/// Type aliases for clarity
pub type RecordId = i64;
pub type Timestamp = chrono::DateTime<chrono::Utc>;
