//! Record types shared by both stores.

use crate::{error::Result, Error, RecordId, Timestamp};
use chrono::{Duration, SubsecRound};
use serde::{Deserialize, Serialize};

/// A customer record as held by either store.
///
/// `last_updated` is the only signal used to resolve conflicting edits. A
/// record without one is treated as infinitely old, which falls out of the
/// `Option` ordering (`None < Some(_)`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    /// Externally assigned, stable identifier
    pub id: RecordId,
    pub first_name: String,
    pub last_name: String,
    pub status: String,
    pub region: String,
    pub sales_rep: String,
    /// Follow-up note; blank and absent are the same value
    #[serde(default)]
    pub follow_up: Option<String>,
    /// Free-form notes; blank and absent are the same value
    #[serde(default)]
    pub notes: Option<String>,
    /// Time of the last mutation (UTC, whole seconds)
    #[serde(default)]
    pub last_updated: Option<Timestamp>,
}

impl Record {
    /// Create a record with no optional fields and no timestamp.
    pub fn new(
        id: RecordId,
        first_name: impl Into<String>,
        last_name: impl Into<String>,
        status: impl Into<String>,
        region: impl Into<String>,
        sales_rep: impl Into<String>,
    ) -> Self {
        Self {
            id,
            first_name: first_name.into(),
            last_name: last_name.into(),
            status: status.into(),
            region: region.into(),
            sales_rep: sales_rep.into(),
            follow_up: None,
            notes: None,
            last_updated: None,
        }
    }

    /// Set the follow-up field.
    pub fn with_follow_up(mut self, follow_up: impl Into<String>) -> Self {
        self.follow_up = Some(follow_up.into());
        self
    }

    /// Set the notes field.
    pub fn with_notes(mut self, notes: impl Into<String>) -> Self {
        self.notes = Some(notes.into());
        self
    }

    /// Set `last_updated` verbatim (truncated to whole seconds).
    pub fn updated_at(mut self, timestamp: Timestamp) -> Self {
        self.last_updated = Some(timestamp.trunc_subsecs(0));
        self
    }

    /// Advance `last_updated` for a mutation happening at `now`.
    ///
    /// The timestamp never moves backwards: if the stored value is already
    /// at or past `now` (clock skew, two edits within one second), it is
    /// bumped by one second instead.
    pub fn touch(&mut self, now: Timestamp) {
        let now = now.trunc_subsecs(0);
        self.last_updated = Some(match self.last_updated {
            Some(previous) if previous >= now => previous + Duration::seconds(1),
            _ => now,
        });
    }

    /// Compare every field except `last_updated`.
    pub fn is_equivalent(&self, other: &Record) -> bool {
        self.id == other.id
            && self.first_name == other.first_name
            && self.last_name == other.last_name
            && self.status == other.status
            && self.region == other.region
            && self.sales_rep == other.sales_rep
            && non_blank(&self.follow_up) == non_blank(&other.follow_up)
            && non_blank(&self.notes) == non_blank(&other.notes)
    }

    /// Collapse blank optional fields to `None`.
    pub fn normalized(mut self) -> Self {
        if non_blank(&self.follow_up).is_none() {
            self.follow_up = None;
        }
        if non_blank(&self.notes).is_none() {
            self.notes = None;
        }
        self
    }

    /// Check the invariants a store adapter must enforce before handing the
    /// record to the engine.
    pub fn validate(&self) -> Result<()> {
        if self.id <= 0 {
            return Err(Error::InvalidRecord {
                id: self.id,
                reason: "id must be a positive integer".into(),
            });
        }
        Ok(())
    }
}

fn non_blank(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|v| !v.is_empty())
}
