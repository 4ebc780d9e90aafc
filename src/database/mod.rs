//! Database boundary.
//!
//! The pipelines only ever talk to a [`Database`]: textual statements, one bound-parameter
//! query shape, and explicit commit/rollback. The SQL text itself (bulk-insert layout and the
//! date literal) is owned by [`Dialect`].
//!
//! Connection establishment is delegated to a [`Connector`]; the crate ships
//! [`sqlite::SqliteConnector`].

pub mod sqlite;

use std::fmt;
use std::str::FromStr;

use chrono::NaiveDateTime;

use crate::descriptor::ConnectionInfo;
use crate::error::TransferResult;
use crate::mapping::quote_literal;
use crate::types::QueryResult;

pub use sqlite::{SqliteConnector, SqliteDatabase};

/// SQL flavor of the target database.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Dialect {
    /// `INSERT ALL … SELECT * FROM dual`, `TO_DATE(…)`.
    #[default]
    Oracle,
    /// Multi-row `INSERT … VALUES (…),(…)`, `datetime(…)`.
    Sqlite,
}

impl FromStr for Dialect {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "oracle" => Ok(Self::Oracle),
            "sqlite" | "sqlite3" => Ok(Self::Sqlite),
            other => Err(format!("unsupported dialect '{other}' (expected oracle or sqlite)")),
        }
    }
}

impl fmt::Display for Dialect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Dialect::Oracle => f.write_str("oracle"),
            Dialect::Sqlite => f.write_str("sqlite"),
        }
    }
}

impl Dialect {
    /// Text form of a timestamp as understood by [`Self::date_literal`].
    pub fn timestamp_text(&self, ts: NaiveDateTime) -> String {
        match self {
            Dialect::Oracle => ts.format("%m/%d/%y %H:%M:%S").to_string(),
            Dialect::Sqlite => ts.format("%Y-%m-%d %H:%M:%S").to_string(),
        }
    }

    /// Wrap timestamp text in the dialect's date constructor.
    pub fn date_literal(&self, text: &str) -> String {
        match self {
            Dialect::Oracle => format!("TO_DATE({},'MM/DD/YY HH24:MI:SS')", quote_literal(text)),
            Dialect::Sqlite => format!("datetime({})", quote_literal(text)),
        }
    }

    /// One statement inserting every value-list into `table`.
    ///
    /// `value_lists` must not be empty.
    pub fn bulk_insert<S: AsRef<str>>(&self, table: &str, columns: &[S], value_lists: &[String]) -> String {
        let cols = columns.iter().map(|c| c.as_ref()).collect::<Vec<_>>().join(",");
        match self {
            Dialect::Oracle => {
                let mut sql = String::from("INSERT ALL\n");
                for values in value_lists {
                    sql.push_str(&format!("INTO {table}({cols}) VALUES({values})\n"));
                }
                sql.push_str("SELECT * FROM dual");
                sql
            }
            Dialect::Sqlite => {
                let rows = value_lists
                    .iter()
                    .map(|values| format!("({values})"))
                    .collect::<Vec<_>>()
                    .join(",\n");
                format!("INSERT INTO {table}({cols}) VALUES\n{rows}")
            }
        }
    }

    pub fn drop_table(&self, table: &str) -> String {
        format!("DROP TABLE {table}")
    }

    pub fn select_all(&self, table: &str) -> String {
        format!("SELECT * FROM {table}")
    }
}

/// Named text parameters bound to a query (e.g. `:partition`).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryParams {
    named: Vec<(String, String)>,
}

impl QueryParams {
    pub fn none() -> Self {
        Self::default()
    }

    /// Add a named parameter. `name` includes its sigil, e.g. `":partition"`.
    pub fn with(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.named.push((name.into(), value.into()));
        self
    }

    /// `(name, value)` pairs in insertion order.
    pub fn pairs(&self) -> &[(String, String)] {
        &self.named
    }

    pub fn is_empty(&self) -> bool {
        self.named.is_empty()
    }
}

/// A live connection used for one descriptor's run.
///
/// Writes are transactional: [`Database::execute`] joins (or opens) the current transaction,
/// which ends with [`Database::commit`] or [`Database::rollback`]. Dropping the connection
/// without committing discards pending work.
pub trait Database {
    /// SQL flavor to render statements in.
    fn dialect(&self) -> Dialect;

    /// Execute one statement; returns the affected row count.
    fn execute(&mut self, sql: &str) -> TransferResult<usize>;

    /// Execute one user-supplied script statement, discarding any rows it returns
    /// (`PRAGMA`, `SELECT`).
    fn execute_statement(&mut self, sql: &str) -> TransferResult<()> {
        self.execute(sql).map(|_| ())
    }

    /// Run a query and collect all rows.
    fn query(&mut self, sql: &str, params: &QueryParams) -> TransferResult<QueryResult>;

    fn commit(&mut self) -> TransferResult<()>;

    fn rollback(&mut self) -> TransferResult<()>;
}

/// Opens connections from descriptor connection info.
pub trait Connector {
    fn connect(&self, info: &ConnectionInfo) -> TransferResult<Box<dyn Database>>;
}
