//! Row codec for the tabular store.
//!
//! Store A exposes records as rows of string cells under a header row. The
//! header decides which cell holds which field, so columns may be reordered
//! or interleaved with unrelated ones without breaking the mapping.

use crate::{error::Result, Error, Record, RecordId, Timestamp};
use chrono::{DateTime, NaiveDateTime, SubsecRound, Utc};

/// Field columns, in the order used when a fresh header is written.
pub const COLUMNS: [&str; 9] = [
    "id",
    "first_name",
    "last_name",
    "status",
    "region",
    "sales_rep",
    "follow_up",
    "notes",
    "last_updated",
];

/// Cell format for `last_updated` (UTC).
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Positions of each field column within a row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnMap {
    // Indexed like COLUMNS
    positions: [usize; COLUMNS.len()],
    width: usize,
}

impl ColumnMap {
    /// Map a header row to field positions.
    ///
    /// Header cells are matched case-insensitively after trimming; spaces
    /// count as underscores, so `Sales Rep` maps to `sales_rep`. Extra
    /// columns are ignored. Every field column must be present.
    pub fn from_header(header: &[String]) -> Result<Self> {
        let normalized: Vec<String> = header
            .iter()
            .map(|cell| cell.trim().to_lowercase().replace(' ', "_"))
            .collect();

        let mut positions = [0; COLUMNS.len()];
        for (slot, column) in positions.iter_mut().zip(COLUMNS) {
            *slot = normalized
                .iter()
                .position(|cell| cell == column)
                .ok_or_else(|| Error::MissingColumn(column.to_string()))?;
        }

        Ok(Self {
            positions,
            width: header.len(),
        })
    }

    /// The default layout, one column per field in [`COLUMNS`] order.
    pub fn canonical() -> Self {
        let mut positions = [0; COLUMNS.len()];
        for (i, slot) in positions.iter_mut().enumerate() {
            *slot = i;
        }
        Self {
            positions,
            width: COLUMNS.len(),
        }
    }

    /// Header row for [`ColumnMap::canonical`].
    pub fn canonical_header() -> Vec<String> {
        COLUMNS.iter().map(|c| c.to_string()).collect()
    }

    /// Number of cells in a full row.
    pub fn width(&self) -> usize {
        self.width
    }

    /// Position of the `id` column.
    pub fn id_position(&self) -> usize {
        self.positions[0]
    }

    fn cell<'r>(&self, row: &'r [String], field: usize) -> &'r str {
        row.get(self.positions[field])
            .map(|c| c.trim())
            .unwrap_or("")
    }
}

/// Parse the id cell of a row, if it holds one.
pub fn parse_id(map: &ColumnMap, row: &[String]) -> Option<RecordId> {
    map.cell(row, 0).parse().ok()
}

/// Decode one data row. `row_number` is only used in error messages.
///
/// Short rows are padded with blanks. An id that is missing or not an
/// integer fails the row; an unreadable `last_updated` decodes as `None`.
pub fn parse_row(map: &ColumnMap, row: &[String], row_number: usize) -> Result<Record> {
    let raw_id = map.cell(row, 0);
    let id: RecordId = raw_id.parse().map_err(|_| Error::InvalidRow {
        row: row_number,
        reason: if raw_id.is_empty() {
            "missing id".to_string()
        } else {
            format!("id {raw_id:?} is not an integer")
        },
    })?;

    let text = |field| map.cell(row, field).to_string();
    let optional = |field| Some(map.cell(row, field).to_string()).filter(|v| !v.is_empty());

    Ok(Record {
        id,
        first_name: text(1),
        last_name: text(2),
        status: text(3),
        region: text(4),
        sales_rep: text(5),
        follow_up: optional(6),
        notes: optional(7),
        last_updated: parse_timestamp(map.cell(row, 8)),
    })
}

fn field_values(record: &Record) -> [String; COLUMNS.len()] {
    [
        record.id.to_string(),
        record.first_name.clone(),
        record.last_name.clone(),
        record.status.clone(),
        record.region.clone(),
        record.sales_rep.clone(),
        record.follow_up.clone().unwrap_or_default(),
        record.notes.clone().unwrap_or_default(),
        record.last_updated.map(format_timestamp).unwrap_or_default(),
    ]
}

/// Encode a record as a new row laid out by `map`.
///
/// Cells outside the mapped columns are left blank.
pub fn format_row(map: &ColumnMap, record: &Record) -> Vec<String> {
    let mut row = vec![String::new(); map.width];
    for (value, &position) in field_values(record).into_iter().zip(&map.positions) {
        row[position] = value;
    }
    row
}

/// Encode a record for rewriting an existing row in place.
///
/// Returns runs of adjacent field cells as `(first position, cells)`, in
/// column order. Unmapped columns fall between runs and are never covered,
/// so whatever the sheet holds there is left alone.
pub fn format_spans(map: &ColumnMap, record: &Record) -> Vec<(usize, Vec<String>)> {
    let mut cells: Vec<(usize, String)> = map
        .positions
        .iter()
        .copied()
        .zip(field_values(record))
        .collect();
    cells.sort_by_key(|(position, _)| *position);

    let mut spans: Vec<(usize, Vec<String>)> = Vec::new();
    for (position, value) in cells {
        match spans.last_mut() {
            Some((start, run)) if *start + run.len() == position => run.push(value),
            _ => spans.push((position, vec![value])),
        }
    }
    spans
}

/// Parse a timestamp cell. Accepts [`TIMESTAMP_FORMAT`] (taken as UTC) and
/// RFC 3339.
pub fn parse_timestamp(cell: &str) -> Option<Timestamp> {
    let cell = cell.trim();
    if cell.is_empty() {
        return None;
    }

    NaiveDateTime::parse_from_str(cell, TIMESTAMP_FORMAT)
        .map(|naive| naive.and_utc())
        .or_else(|_| DateTime::parse_from_rfc3339(cell).map(|dt| dt.with_timezone(&Utc)))
        .ok()
        .map(|ts| ts.trunc_subsecs(0))
}

pub fn format_timestamp(timestamp: Timestamp) -> String {
    timestamp.format(TIMESTAMP_FORMAT).to_string()
}
