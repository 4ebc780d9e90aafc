//! Core data types shared by the import and export pipelines.
//!
//! Import works on raw string fields ([`Row`]) located through a [`HeaderIndex`]; export works on
//! typed [`Value`]s returned by the database in a [`QueryResult`].

use std::collections::HashMap;
use std::fmt;

use chrono::NaiveDateTime;

/// One tokenized input record.
pub type Row = Vec<String>;

/// A single typed value returned by a database query.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// SQL `NULL`.
    Null,
    /// 64-bit signed integer.
    Int64(i64),
    /// 64-bit float.
    Float64(f64),
    /// UTF-8 string.
    Utf8(String),
    /// Date/time value (from a date-typed column).
    DateTime(NaiveDateTime),
}

impl Value {
    /// Returns `true` for [`Value::Null`].
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => Ok(()),
            Value::Int64(v) => write!(f, "{v}"),
            Value::Float64(v) => write!(f, "{v}"),
            Value::Utf8(s) => f.write_str(s),
            Value::DateTime(dt) => write!(f, "{}", dt.format("%Y-%m-%d %H:%M:%S")),
        }
    }
}

/// Tabular query output: column names plus row-major values.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct QueryResult {
    /// Column names, in select order. This is the header row of an export.
    pub columns: Vec<String>,
    /// Row-major value storage, each row as long as `columns`.
    pub rows: Vec<Vec<Value>>,
}

impl QueryResult {
    /// Create a result from column names and rows.
    pub fn new(columns: Vec<String>, rows: Vec<Vec<Value>>) -> Self {
        Self { columns, rows }
    }

    /// Number of data rows.
    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    /// Returns the index of a column by name, if present.
    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }
}

/// Column name → column index lookup built from a file's header line.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct HeaderIndex {
    names: Vec<String>,
    positions: HashMap<String, usize>,
}

impl HeaderIndex {
    /// Build an index from header cells. Names are trimmed; the first occurrence of a duplicated
    /// name wins.
    pub fn new<I, S>(cells: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let names: Vec<String> = cells.into_iter().map(|c| c.as_ref().trim().to_string()).collect();
        let mut positions = HashMap::with_capacity(names.len());
        for (idx, name) in names.iter().enumerate() {
            positions.entry(name.clone()).or_insert(idx);
        }
        Self { names, positions }
    }

    /// Position of `name` in the header.
    pub fn position(&self, name: &str) -> Option<usize> {
        self.positions.get(name.trim()).copied()
    }

    /// Number of header columns; data rows are padded to this width.
    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// Header names in file order.
    pub fn names(&self) -> &[String] {
        &self.names
    }
}

#[cfg(test)]
mod tests {
    use super::{HeaderIndex, QueryResult, Value};

    #[test]
    fn header_index_trims_and_keeps_first_duplicate() {
        let idx = HeaderIndex::new([" id", "name ", "id"]);
        assert_eq!(idx.len(), 3);
        assert_eq!(idx.position("id"), Some(0));
        assert_eq!(idx.position("name"), Some(1));
        assert_eq!(idx.position("missing"), None);
    }

    #[test]
    fn null_displays_as_empty_text() {
        let qr = QueryResult::new(
            vec!["A".to_string(), "B".to_string()],
            vec![vec![Value::Null, Value::Int64(7)]],
        );
        assert_eq!(qr.index_of("B"), Some(1));
        assert_eq!(qr.rows[0][0].to_string(), "");
        assert_eq!(qr.rows[0][1].to_string(), "7");
    }
}
