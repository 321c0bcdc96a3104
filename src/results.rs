//! Result types for Quarry.
//!
//! Defines the structures used to represent parsed query output: typed
//! values, ordered rows, pages, and the caller-facing envelope.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map};
use std::fmt;
use url::Url;

use crate::stats::QueryStats;

/// Lexical format for timestamp columns. Fractional seconds optional.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.3f";

/// Represents a single typed value from a query result.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub enum Value {
    /// NULL value.
    #[default]
    Null,

    /// Boolean value.
    Bool(bool),

    /// Signed integer (up to i64).
    Int(i64),

    /// Floating point number.
    Float(f64),

    /// Text/string value.
    String(String),

    /// Timestamp without timezone.
    Timestamp(NaiveDateTime),
}

impl Value {
    /// Returns true if this value is NULL.
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Converts the value to its JSON representation.
    ///
    /// Timestamps serialize as their lexical form; a non-finite float
    /// (which JSON cannot carry) becomes null.
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Value::Null => serde_json::Value::Null,
            Value::Bool(b) => json!(b),
            Value::Int(i) => json!(i),
            Value::Float(f) => json!(f),
            Value::String(s) => json!(s),
            Value::Timestamp(ts) => json!(ts.format(TIMESTAMP_FORMAT).to_string()),
        }
    }

    /// Attempts to convert the value to a string representation.
    pub fn to_display_string(&self) -> String {
        match self {
            Value::Null => "NULL".to_string(),
            Value::Bool(b) => b.to_string(),
            Value::Int(i) => i.to_string(),
            Value::Float(f) => f.to_string(),
            Value::String(s) => s.clone(),
            Value::Timestamp(ts) => ts.format(TIMESTAMP_FORMAT).to_string(),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_display_string())
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::String(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::String(v)
    }
}

impl<T> From<Option<T>> for Value
where
    T: Into<Value>,
{
    fn from(v: Option<T>) -> Self {
        match v {
            Some(val) => val.into(),
            None => Value::Null,
        }
    }
}

/// One result row: an ordered mapping from column name to typed value.
///
/// Order is the column order declared by the header row and is preserved
/// through serialization.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Row {
    fields: Vec<(String, Value)>,
}

impl Row {
    /// Creates an empty row.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a row from ordered (name, value) pairs.
    pub fn from_pairs(fields: Vec<(String, Value)>) -> Self {
        Self { fields }
    }

    /// Appends a field to the row.
    pub fn push(&mut self, name: impl Into<String>, value: Value) {
        self.fields.push((name.into(), value));
    }

    /// Looks up a field by column name.
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.fields
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v)
    }

    /// Returns the ordered fields of this row.
    pub fn fields(&self) -> &[(String, Value)] {
        &self.fields
    }

    /// Returns the number of fields.
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Returns true if the row has no fields.
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Converts the row to a JSON object, expanding dotted column names
    /// into nested objects.
    pub fn to_json(&self) -> serde_json::Value {
        self.to_json_with(false)
    }

    /// Converts the row to a JSON object.
    ///
    /// With `flat_keys` set, column names are kept verbatim; otherwise a
    /// name like `address.city` becomes a nested `{"address":{"city":..}}`
    /// object.
    pub fn to_json_with(&self, flat_keys: bool) -> serde_json::Value {
        let mut map = Map::new();
        for (name, value) in &self.fields {
            if flat_keys || !name.contains('.') {
                map.insert(name.clone(), value.to_json());
            } else {
                insert_nested(&mut map, name, value.to_json());
            }
        }
        serde_json::Value::Object(map)
    }
}

/// Inserts `value` at the dotted path `name` inside `map`, creating
/// intermediate objects as needed. A path segment that collides with an
/// existing non-object value overwrites it.
fn insert_nested(map: &mut Map<String, serde_json::Value>, name: &str, value: serde_json::Value) {
    match name.split_once('.') {
        None => {
            map.insert(name.to_string(), value);
        }
        Some((head, rest)) => {
            let entry = map
                .entry(head.to_string())
                .or_insert_with(|| serde_json::Value::Object(Map::new()));
            if !entry.is_object() {
                *entry = serde_json::Value::Object(Map::new());
            }
            if let serde_json::Value::Object(inner) = entry {
                insert_nested(inner, rest, value);
            }
        }
    }
}

/// One page of parsed results.
///
/// Immutable once returned; `next_token` is `None` exactly when this is
/// the final page.
#[derive(Debug, Clone, Default)]
pub struct ResultPage {
    /// Parsed rows, in output order.
    pub rows: Vec<Row>,

    /// Continuation token for the next page.
    pub next_token: Option<String>,

    /// Number of rows in this page.
    pub row_count: usize,
}

impl ResultPage {
    /// Creates a page from rows and an optional continuation token.
    pub fn new(rows: Vec<Row>, next_token: Option<String>) -> Self {
        let row_count = rows.len();
        Self {
            rows,
            next_token,
            row_count,
        }
    }

    /// Returns true if the page has no rows.
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Returns true if this is the final page.
    pub fn is_final(&self) -> bool {
        self.next_token.is_none()
    }
}

/// The caller-facing aggregate returned by a completed query.
#[derive(Debug, Clone, Default)]
pub struct ResultEnvelope {
    /// Service-assigned execution id.
    pub execution_id: String,

    /// Parsed rows; `None` when the caller opted out of retrieval (or
    /// the ignore-empty option suppressed an empty result).
    pub items: Option<Vec<Row>>,

    /// Execution statistics, attached when requested.
    pub stats: Option<QueryStats>,

    /// Object-storage location of the raw output.
    pub output_location: Option<Url>,

    /// Continuation token for the next page, if any.
    pub next_token: Option<String>,

    /// Number of rows in `items`.
    pub count: usize,
}
