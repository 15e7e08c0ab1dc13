//! Store A: a Google Sheets range, over the Sheets REST API (v4).
//!
//! The first row of the range is the header; every following non-blank row
//! is a record. Row positions shift when a row is deleted, so writes are
//! serialized behind one lock and each write re-reads the range to locate
//! its row. Updates only touch the cells of mapped columns; anything else
//! the sheet keeps next to the records is left as it is.

use super::{AdapterError, AdapterResult, StoreAdapter};
use crate::config::SheetsConfig;
use async_trait::async_trait;
use reqwest::{Client, Response, Url};
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;
use tabsync_engine::{
    tabular::{self, ColumnMap},
    Record, RecordId, Side,
};
use tokio::sync::{Mutex, OnceCell};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Google Sheets-backed store
pub struct SheetsAdapter {
    client: Client,
    config: SheetsConfig,
    origin: RangeOrigin,
    /// Numeric id of the tab, needed by `deleteDimension`
    sheet_id: OnceCell<i64>,
    write_lock: Mutex<()>,
}

#[derive(Debug, Deserialize)]
struct ValueRange {
    #[serde(default)]
    values: Vec<Vec<String>>,
}

#[derive(Debug, Deserialize)]
struct Spreadsheet {
    #[serde(default)]
    sheets: Vec<SheetEntry>,
}

#[derive(Debug, Deserialize)]
struct SheetEntry {
    properties: SheetProperties,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SheetProperties {
    sheet_id: i64,
    title: String,
}

/// The header row and data rows of the range.
struct Table {
    columns: Option<ColumnMap>,
    rows: Vec<Vec<String>>,
}

impl Table {
    /// Offset (within the data rows) of the row holding `id`.
    fn find(&self, id: RecordId) -> Option<usize> {
        let columns = self.columns.as_ref()?;
        self.rows
            .iter()
            .position(|row| tabular::parse_id(columns, row) == Some(id))
    }
}

impl SheetsAdapter {
    pub fn new(config: SheetsConfig) -> AdapterResult<Self> {
        let origin = RangeOrigin::parse(&config.range)?;
        let client = Client::builder().timeout(REQUEST_TIMEOUT).build()?;

        Ok(Self {
            client,
            config,
            origin,
            sheet_id: OnceCell::new(),
            write_lock: Mutex::new(()),
        })
    }

    fn url(&self, tail: &[&str]) -> AdapterResult<Url> {
        let mut url = Url::parse(&self.config.api_base)
            .map_err(|e| AdapterError::Malformed(format!("bad API base: {e}")))?;
        url.path_segments_mut()
            .map_err(|_| AdapterError::Malformed("API base cannot hold a path".into()))?
            .pop_if_empty()
            .push("spreadsheets")
            .extend(tail);
        Ok(url)
    }

    async fn read_table(&self) -> AdapterResult<Table> {
        let url = self.url(&[&self.config.spreadsheet_id, "values", &self.config.range])?;
        let response = self
            .client
            .get(url)
            .bearer_auth(&self.config.access_token)
            .query(&[("majorDimension", "ROWS")])
            .send()
            .await?;
        let range: ValueRange = check(response).await?.json().await?;

        let mut values = range.values.into_iter();
        let Some(header) = values.next() else {
            return Ok(Table {
                columns: None,
                rows: Vec::new(),
            });
        };

        Ok(Table {
            columns: Some(ColumnMap::from_header(&header)?),
            rows: values.collect(),
        })
    }

    /// Overwrite runs of cells in one data row, as produced by
    /// [`tabular::format_spans`].
    async fn write_cells(
        &self,
        offset: usize,
        spans: Vec<(usize, Vec<String>)>,
    ) -> AdapterResult<()> {
        let row = self.origin.row_of(offset);
        let data: Vec<_> = spans
            .into_iter()
            .map(|(start, cells)| {
                json!({
                    "range": self.origin.cells_range(row, start, cells.len()),
                    "majorDimension": "ROWS",
                    "values": [cells],
                })
            })
            .collect();

        let url = self.url(&[&self.config.spreadsheet_id, "values:batchUpdate"])?;
        let response = self
            .client
            .post(url)
            .bearer_auth(&self.config.access_token)
            .json(&json!({ "valueInputOption": "RAW", "data": data }))
            .send()
            .await?;
        check(response).await?;
        Ok(())
    }

    async fn append_rows(&self, rows: Vec<Vec<String>>) -> AdapterResult<()> {
        let target = format!("{}:append", self.config.range);
        let url = self.url(&[&self.config.spreadsheet_id, "values", &target])?;

        let response = self
            .client
            .post(url)
            .bearer_auth(&self.config.access_token)
            .query(&[("valueInputOption", "RAW"), ("insertDataOption", "INSERT_ROWS")])
            .json(&json!({ "majorDimension": "ROWS", "values": rows }))
            .send()
            .await?;
        check(response).await?;
        Ok(())
    }

    async fn sheet_id(&self) -> AdapterResult<i64> {
        self.sheet_id
            .get_or_try_init(|| async {
                let url = self.url(&[&self.config.spreadsheet_id])?;
                let response = self
                    .client
                    .get(url)
                    .bearer_auth(&self.config.access_token)
                    .query(&[("fields", "sheets.properties(sheetId,title)")])
                    .send()
                    .await?;
                let spreadsheet: Spreadsheet = check(response).await?.json().await?;

                let title = self.origin.title();
                let sheet = spreadsheet
                    .sheets
                    .iter()
                    .find(|s| title.as_deref().is_some_and(|t| s.properties.title == t))
                    .or_else(|| spreadsheet.sheets.first())
                    .ok_or_else(|| AdapterError::Malformed("spreadsheet has no sheets".into()))?;

                tracing::debug!(
                    sheet_id = sheet.properties.sheet_id,
                    title = %sheet.properties.title,
                    "Resolved sheet id"
                );
                Ok::<_, AdapterError>(sheet.properties.sheet_id)
            })
            .await
            .copied()
    }

    async fn delete_row(&self, offset: usize) -> AdapterResult<()> {
        let sheet_id = self.sheet_id().await?;
        // Zero-based, end-exclusive
        let start = self.origin.row_of(offset) - 1;
        let target = format!("{}:batchUpdate", self.config.spreadsheet_id);
        let url = self.url(&[&target])?;

        let response = self
            .client
            .post(url)
            .bearer_auth(&self.config.access_token)
            .json(&json!({
                "requests": [{
                    "deleteDimension": {
                        "range": {
                            "sheetId": sheet_id,
                            "dimension": "ROWS",
                            "startIndex": start,
                            "endIndex": start + 1,
                        }
                    }
                }]
            }))
            .send()
            .await?;
        check(response).await?;
        Ok(())
    }
}

#[async_trait]
impl StoreAdapter for SheetsAdapter {
    fn side(&self) -> Side {
        Side::A
    }

    fn name(&self) -> &str {
        "sheets"
    }

    async fn fetch_all(&self) -> AdapterResult<Vec<Record>> {
        let table = self.read_table().await?;
        let Some(columns) = table.columns else {
            return Ok(Vec::new());
        };

        // A row with content but no readable id fails the whole read
        let mut records = Vec::with_capacity(table.rows.len());
        for (offset, row) in table.rows.iter().enumerate() {
            if row.iter().all(|cell| cell.trim().is_empty()) {
                continue;
            }
            let row_number = self.origin.row_of(offset);
            let record = tabular::parse_row(&columns, row, row_number).inspect_err(|e| {
                tracing::warn!(row = row_number, error = %e, "Unreadable sheet row")
            })?;
            records.push(record);
        }
        Ok(records)
    }

    async fn upsert(&self, record: &Record) -> AdapterResult<()> {
        let _guard = self.write_lock.lock().await;
        let table = self.read_table().await?;

        match (&table.columns, table.find(record.id)) {
            (Some(columns), Some(offset)) => {
                self.write_cells(offset, tabular::format_spans(columns, record))
                    .await
            }
            (Some(columns), None) => {
                self.append_rows(vec![tabular::format_row(columns, record)])
                    .await
            }
            (None, _) => {
                // Blank sheet: lay down a header first
                let columns = ColumnMap::canonical();
                self.append_rows(vec![
                    ColumnMap::canonical_header(),
                    tabular::format_row(&columns, record),
                ])
                .await
            }
        }
    }

    async fn delete(&self, id: RecordId) -> AdapterResult<()> {
        let _guard = self.write_lock.lock().await;
        let table = self.read_table().await?;

        match table.find(id) {
            Some(offset) => self.delete_row(offset).await,
            None => {
                tracing::debug!(record_id = id, "Record already absent from sheet");
                Ok(())
            }
        }
    }
}

/// Turn a non-success response into an [`AdapterError::Api`].
async fn check(response: Response) -> AdapterResult<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(AdapterError::Api {
        status: status.as_u16(),
        body,
    })
}

/// Top-left corner of the configured A1 range.
#[derive(Debug, Clone, PartialEq, Eq)]
struct RangeOrigin {
    /// Tab name as written in the range (quotes kept), if any
    sheet: Option<String>,
    /// Zero-based column index
    column: usize,
    /// One-based row number of the header
    row: usize,
}

impl RangeOrigin {
    fn parse(range: &str) -> AdapterResult<Self> {
        let (sheet, cells) = match range.rsplit_once('!') {
            Some((sheet, cells)) => (Some(sheet.to_string()), cells),
            None => (None, range),
        };
        let start = cells.split(':').next().unwrap_or("");

        let letters: String = start.chars().take_while(|c| c.is_ascii_alphabetic()).collect();
        let digits = &start[letters.len()..];

        let column = if letters.is_empty() {
            0
        } else {
            column_index(&letters)
                .ok_or_else(|| AdapterError::Malformed(format!("bad range {range:?}")))?
        };
        let row = if digits.is_empty() {
            1
        } else {
            digits
                .parse()
                .map_err(|_| AdapterError::Malformed(format!("bad range {range:?}")))?
        };

        Ok(Self { sheet, column, row })
    }

    /// Tab title with A1 quoting removed.
    fn title(&self) -> Option<String> {
        self.sheet
            .as_deref()
            .map(|s| s.trim_matches('\'').replace("''", "'"))
    }

    /// Sheet row number of a data row.
    fn row_of(&self, offset: usize) -> usize {
        self.row + 1 + offset
    }

    /// A1 range covering `width` cells of one row, starting `start` columns
    /// into the range.
    fn cells_range(&self, row: usize, start: usize, width: usize) -> String {
        let first = column_letters(self.column + start);
        let last = column_letters(self.column + start + width.max(1) - 1);
        match &self.sheet {
            Some(sheet) => format!("{sheet}!{first}{row}:{last}{row}"),
            None => format!("{first}{row}:{last}{row}"),
        }
    }
}

/// Zero-based column index from A1 letters (`A` → 0, `AA` → 26).
fn column_index(letters: &str) -> Option<usize> {
    letters.chars().try_fold(0usize, |acc, c| {
        let digit = c.to_ascii_uppercase() as usize;
        if !(b'A' as usize..=b'Z' as usize).contains(&digit) {
            return None;
        }
        Some(acc * 26 + (digit - b'A' as usize + 1))
    })
    .and_then(|n| n.checked_sub(1))
}

/// A1 letters for a zero-based column index.
fn column_letters(mut index: usize) -> String {
    let mut letters = Vec::new();
    loop {
        letters.push(b'A' + (index % 26) as u8);
        if index < 26 {
            break;
        }
        index = index / 26 - 1;
    }
    letters.reverse();
    String::from_utf8_lossy(&letters).into_owned()
}
