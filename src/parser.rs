//! Output parsing for Quarry.
//!
//! Converts raw tabular output, either structured pages from the
//! execution service or CSV bytes from object storage, into typed
//! [`Row`]s, coercing each cell against the declared column schema.

use chrono::NaiveDateTime;
use std::sync::Arc;
use std::vec;

use crate::error::{QuarryError, Result};
use crate::results::{Row, Value, TIMESTAMP_FORMAT};
use crate::service::{ColumnDef, ColumnType};

/// Timestamp format without fractional seconds; tried second.
const TIMESTAMP_FORMAT_NO_FRACTION: &str = "%Y-%m-%d %H:%M:%S";

/// A lazy, consume-once sequence of parsed rows.
///
/// Yielding an `Err` does not end the sequence, but callers building a
/// page stop at the first error anyway: a malformed row is surfaced,
/// never skipped.
pub struct RowIter<I> {
    source: I,
    columns: Arc<Vec<ColumnDef>>,
    null_sentinel: Option<String>,
}

impl<I> Iterator for RowIter<I>
where
    I: Iterator<Item = Vec<Option<String>>>,
{
    type Item = Result<Row>;

    fn next(&mut self) -> Option<Self::Item> {
        let cells = self.source.next()?;
        Some(coerce_row(&cells, &self.columns, self.null_sentinel.as_deref()))
    }
}

/// Parses one structured page of raw rows against the declared schema.
///
/// `skip_header` drops the first row; the service puts the header row at
/// the top of the first page of a text-backed result set.
pub fn parse_raw_page(
    rows: Vec<Vec<Option<String>>>,
    columns: Vec<ColumnDef>,
    skip_header: bool,
    null_sentinel: Option<String>,
) -> RowIter<vec::IntoIter<Vec<Option<String>>>> {
    let mut source = rows.into_iter();
    if skip_header {
        let _ = source.next();
    }
    RowIter {
        source,
        columns: Arc::new(columns),
        null_sentinel,
    }
}

/// Parses a raw CSV output object.
///
/// The first record is the header row and fixes column names and order;
/// declared types are looked up in `schema` by name, defaulting to
/// string. An unquoted empty field is an absent (null) cell.
pub fn parse_csv(
    bytes: Vec<u8>,
    schema: &[ColumnDef],
    null_sentinel: Option<String>,
) -> Result<RowIter<CsvRecords>> {
    let text = String::from_utf8(bytes)
        .map_err(|e| QuarryError::malformed_row(format!("output is not valid UTF-8: {e}")))?;

    let mut records = CsvRecords::new(text);
    let columns = match records.next() {
        None => Vec::new(),
        Some(header) => header
            .into_iter()
            .map(|cell| {
                let name = cell.unwrap_or_default();
                let column_type = schema
                    .iter()
                    .find(|c| c.name == name)
                    .map(|c| c.column_type)
                    .unwrap_or(ColumnType::String);
                ColumnDef::new(name, column_type)
            })
            .collect(),
    };

    Ok(RowIter {
        source: records,
        columns: Arc::new(columns),
        null_sentinel,
    })
}

/// Coerces one raw row against the schema.
fn coerce_row(
    cells: &[Option<String>],
    columns: &[ColumnDef],
    null_sentinel: Option<&str>,
) -> Result<Row> {
    if cells.len() != columns.len() {
        return Err(QuarryError::malformed_row(format!(
            "row has {} fields, header declares {}",
            cells.len(),
            columns.len()
        )));
    }

    let mut row = Row::new();
    for (cell, column) in cells.iter().zip(columns) {
        row.push(
            column.name.clone(),
            coerce_cell(cell.as_deref(), column, null_sentinel)?,
        );
    }
    Ok(row)
}

/// Coerces one cell to the column's declared type.
///
/// An absent cell, or one equal to the null sentinel, is NULL regardless
/// of the declared type.
fn coerce_cell(
    cell: Option<&str>,
    column: &ColumnDef,
    null_sentinel: Option<&str>,
) -> Result<Value> {
    let text = match cell {
        None => return Ok(Value::Null),
        Some(text) => text,
    };
    if let Some(sentinel) = null_sentinel {
        if text == sentinel {
            return Ok(Value::Null);
        }
    }

    match column.column_type {
        ColumnType::String => Ok(Value::String(text.to_string())),
        ColumnType::Integer => text.parse::<i64>().map(Value::Int).map_err(|_| {
            QuarryError::malformed_row(format!(
                "column '{}' declared integer but contained '{text}'",
                column.name
            ))
        }),
        ColumnType::Float => text.parse::<f64>().map(Value::Float).map_err(|_| {
            QuarryError::malformed_row(format!(
                "column '{}' declared float but contained '{text}'",
                column.name
            ))
        }),
        ColumnType::Boolean => match text {
            "true" => Ok(Value::Bool(true)),
            "false" => Ok(Value::Bool(false)),
            _ => Err(QuarryError::malformed_row(format!(
                "column '{}' declared boolean but contained '{text}'",
                column.name
            ))),
        },
        ColumnType::Timestamp => NaiveDateTime::parse_from_str(text, TIMESTAMP_FORMAT)
            .or_else(|_| NaiveDateTime::parse_from_str(text, TIMESTAMP_FORMAT_NO_FRACTION))
            .map(Value::Timestamp)
            .map_err(|_| {
                QuarryError::malformed_row(format!(
                    "column '{}' declared timestamp but contained '{text}'",
                    column.name
                ))
            }),
    }
}

/// Record-at-a-time CSV reader over an owned buffer.
///
/// Handles double-quote quoting with `""` escapes, newlines inside
/// quoted fields, and CRLF line endings. An unquoted empty field yields
/// `None`; a quoted empty field yields `Some("")`.
pub struct CsvRecords {
    text: String,
    pos: usize,
}

impl CsvRecords {
    fn new(text: String) -> Self {
        Self { text, pos: 0 }
    }
}

impl Iterator for CsvRecords {
    type Item = Vec<Option<String>>;

    fn next(&mut self) -> Option<Self::Item> {
        let bytes = self.text.as_bytes();
        if self.pos >= bytes.len() {
            return None;
        }

        let mut record = Vec::new();
        let mut field = String::new();
        let mut quoted = false;
        let mut in_quotes = false;

        loop {
            let c = self.text[self.pos..].chars().next();

            match c {
                None => {
                    record.push(finish_field(field, quoted));
                    return Some(record);
                }
                Some('"') if in_quotes => {
                    // Either an escaped quote or the closing quote.
                    if self.text[self.pos + 1..].starts_with('"') {
                        field.push('"');
                        self.pos += 2;
                    } else {
                        in_quotes = false;
                        self.pos += 1;
                    }
                }
                Some('"') if field.is_empty() && !quoted => {
                    quoted = true;
                    in_quotes = true;
                    self.pos += 1;
                }
                Some(',') if !in_quotes => {
                    record.push(finish_field(std::mem::take(&mut field), quoted));
                    quoted = false;
                    self.pos += 1;
                }
                Some('\n') if !in_quotes => {
                    self.pos += 1;
                    if field.ends_with('\r') {
                        field.pop();
                    }
                    record.push(finish_field(field, quoted));
                    return Some(record);
                }
                Some(c) => {
                    field.push(c);
                    self.pos += c.len_utf8();
                }
            }
        }
    }
}

/// An unquoted empty field is an absent cell.
fn finish_field(field: String, quoted: bool) -> Option<String> {
    if field.is_empty() && !quoted {
        None
    } else {
        Some(field)
    }
}
