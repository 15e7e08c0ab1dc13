//! Point-in-time captures of one store.
//!
//! A snapshot is either *ok* (the fetch established ground truth, possibly
//! with zero records) or *failed*. The two are never interchangeable: an
//! empty failed snapshot says nothing about what the store holds.

use crate::{error::Result, Error, Record, RecordId, Timestamp};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// One of the two stores being kept convergent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    /// The tabular store; wins timestamp ties
    A,
    /// The relational store
    B,
}

impl Side {
    /// The other store.
    pub fn peer(self) -> Side {
        match self {
            Side::A => Side::B,
            Side::B => Side::A,
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::A => f.write_str("A"),
            Side::B => f.write_str("B"),
        }
    }
}

/// An immutable capture of one store's full id → record state.
///
/// Uses BTreeMap so iteration (and therefore every derived change set) is
/// ordered by id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    source: Side,
    records: BTreeMap<RecordId, Record>,
    fetched_at: Timestamp,
    ok: bool,
    failure: Option<String>,
}

impl Snapshot {
    /// Build an ok snapshot, rejecting duplicate ids.
    pub fn from_records(
        source: Side,
        records: impl IntoIterator<Item = Record>,
        fetched_at: Timestamp,
    ) -> Result<Self> {
        let mut map = BTreeMap::new();
        for record in records {
            let id = record.id;
            if map.insert(id, record).is_some() {
                return Err(Error::DuplicateRecordId { side: source, id });
            }
        }

        Ok(Self {
            source,
            records: map,
            fetched_at,
            ok: true,
            failure: None,
        })
    }

    /// An ok snapshot of a store holding no records.
    pub fn empty(source: Side, fetched_at: Timestamp) -> Self {
        Self {
            source,
            records: BTreeMap::new(),
            fetched_at,
            ok: true,
            failure: None,
        }
    }

    /// A snapshot whose fetch could not establish ground truth.
    pub fn failed(source: Side, reason: impl Into<String>, fetched_at: Timestamp) -> Self {
        Self {
            source,
            records: BTreeMap::new(),
            fetched_at,
            ok: false,
            failure: Some(reason.into()),
        }
    }

    pub fn source(&self) -> Side {
        self.source
    }

    pub fn fetched_at(&self) -> Timestamp {
        self.fetched_at
    }

    /// Whether the fetch succeeded.
    pub fn is_ok(&self) -> bool {
        self.ok
    }

    /// Why the fetch failed, if it did.
    pub fn failure(&self) -> Option<&str> {
        self.failure.as_deref()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn get(&self, id: RecordId) -> Option<&Record> {
        self.records.get(&id)
    }

    pub fn contains(&self, id: RecordId) -> bool {
        self.records.contains_key(&id)
    }

    /// Records in id order.
    pub fn records(&self) -> impl Iterator<Item = &Record> {
        self.records.values()
    }

    /// The id-set of this snapshot.
    pub fn ids(&self) -> BTreeSet<RecordId> {
        self.records.keys().copied().collect()
    }
}
