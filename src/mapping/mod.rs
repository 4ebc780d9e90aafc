//! Column mapping type system.
//!
//! Every output column is produced by one [`MappingSpec`]. Its `Type` string from the descriptor
//! is parsed once, at load time, into a closed [`ColumnRule`]; per-row resolution is then a
//! single exhaustive match in [`resolve`].
//!
//! | `Type`                | rule                                | rendered as             |
//! |-----------------------|-------------------------------------|-------------------------|
//! | `DBF-<expr>`          | [`ColumnRule::DbFunction`]          | `<expr>` verbatim       |
//! | `C-<value>`           | [`ColumnRule::Constant`]            | quoted literal          |
//! | `S-datetime.now()`    | [`ColumnRule::NowTimestamp`]        | dialect date literal    |
//! | `S-FILENAME.<i>.<j>`  | [`ColumnRule::FilenameSlice`]       | quoted literal          |
//! | `S-ROWNUM`            | [`ColumnRule::RowNumber`]           | quoted literal          |
//! | `S` (or empty)        | [`ColumnRule::SourceColumn`]        | quoted literal          |
//!
//! A `DB_CONVERSION` template overrides the rendering: its `?` placeholder receives the raw,
//! unescaped value and the result is emitted verbatim.

pub mod literal;

use std::fmt;
use std::str::FromStr;

use chrono::{Local, NaiveDateTime};

use crate::database::Dialect;
use crate::error::{TransferError, TransferResult};
use crate::types::HeaderIndex;

pub use literal::{escape_literal, quote_literal, ValueList};

/// Placeholder token inside a `DB_CONVERSION` template.
pub const CONVERSION_PLACEHOLDER: char = '?';

/// How one output column gets its value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ColumnRule {
    /// Author-trusted SQL fragment, emitted as-is.
    DbFunction(String),
    /// Constant text.
    Constant(String),
    /// The run's start timestamp.
    NowTimestamp,
    /// Characters `[start - 1, end)` of the input file's base name.
    FilenameSlice { start: usize, end: usize },
    /// 1-based ordinal of the row within its input file.
    RowNumber,
    /// A field of the input row.
    SourceColumn,
}

impl FromStr for ColumnRule {
    type Err = TransferError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if let Some(expr) = s.strip_prefix("DBF-") {
            return Ok(Self::DbFunction(expr.to_string()));
        }
        if let Some(value) = s.strip_prefix("C-") {
            return Ok(Self::Constant(value.to_string()));
        }
        if s == "S-datetime.now()" {
            return Ok(Self::NowTimestamp);
        }
        if let Some(bounds) = s.strip_prefix("S-FILENAME.") {
            return parse_filename_slice(bounds)
                .ok_or_else(|| TransferError::config(format!("invalid filename slice in mapping type '{s}'")));
        }
        match s {
            "S-ROWNUM" => Ok(Self::RowNumber),
            "S" | "" => Ok(Self::SourceColumn),
            other => Err(TransferError::config(format!(
                "unknown type '{other}' in column mappings"
            ))),
        }
    }
}

fn parse_filename_slice(bounds: &str) -> Option<ColumnRule> {
    let (start, end) = bounds.split_once('.')?;
    let start: usize = start.trim().parse().ok()?;
    let end: usize = end.trim().parse().ok()?;
    if start < 1 || end < start - 1 {
        return None;
    }
    Some(ColumnRule::FilenameSlice { start, end })
}

impl ColumnRule {
    /// Returns `true` if the rule reads a field of the input row.
    pub fn reads_row(&self) -> bool {
        matches!(self, Self::SourceColumn)
    }
}

/// One output column's production rule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MappingSpec {
    /// Output column name.
    pub target: String,
    pub rule: ColumnRule,
    /// Input column name, used when the file has a header.
    pub source: Option<String>,
    /// Sort key; `None` sorts last.
    pub order: Option<i64>,
    /// Optional wrapping template containing [`CONVERSION_PLACEHOLDER`].
    pub db_conversion: Option<String>,
    /// Export only: query producing the dropdown choices for this column.
    pub dropdown_sql: Option<String>,
    /// Ordinal after sorting; the input field read when the file has no header.
    pub position: usize,
}

impl MappingSpec {
    /// A spec with the given target and rule and no optional attributes.
    pub fn new(target: impl Into<String>, rule: ColumnRule) -> Self {
        Self {
            target: target.into(),
            rule,
            source: None,
            order: None,
            db_conversion: None,
            dropdown_sql: None,
            position: 0,
        }
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }

    pub fn with_order(mut self, order: i64) -> Self {
        self.order = Some(order);
        self
    }

    pub fn with_db_conversion(mut self, template: impl Into<String>) -> Self {
        self.db_conversion = Some(template.into());
        self
    }
}

/// Stable sort on `order` (missing last), then record each spec's ordinal position.
pub fn sort_specs(specs: &mut [MappingSpec]) {
    specs.sort_by_key(|s| s.order.unwrap_or(i64::MAX));
    for (position, spec) in specs.iter_mut().enumerate() {
        spec.position = position;
    }
}

/// Fixed "now" for a whole run. Every `S-datetime.now()` column of every row sees this value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct RunTimestamp(NaiveDateTime);

impl RunTimestamp {
    /// Capture the local wall clock.
    pub fn now() -> Self {
        Self(Local::now().naive_local())
    }

    pub fn at(value: NaiveDateTime) -> Self {
        Self(value)
    }

    pub fn value(&self) -> NaiveDateTime {
        self.0
    }

    /// Compact form used in file names, e.g. `20261019-140300`.
    pub fn file_stamp(&self) -> String {
        self.0.format("%Y%m%d-%H%M%S").to_string()
    }
}

impl fmt::Display for RunTimestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.format("%Y-%m-%d %H:%M:%S"))
    }
}

/// Per-row inputs to [`resolve`] beyond the row itself.
#[derive(Debug, Clone, Copy)]
pub struct MappingContext<'a> {
    /// 1-based ordinal of the row within its input file.
    pub row_number: usize,
    /// Base name of the input file (the original spreadsheet name for converted sources).
    pub source_file_name: &'a str,
    /// Present when the file has a header line.
    pub header: Option<&'a HeaderIndex>,
    pub run_started: RunTimestamp,
    pub dialect: Dialect,
}

enum Rendering {
    Verbatim,
    Quoted,
    DateLiteral,
}

/// Resolve one spec against one row into a rendered SQL value.
///
/// Fails only when a header is present and does not contain the mapping's source column.
pub fn resolve(spec: &MappingSpec, row: &[String], ctx: &MappingContext<'_>) -> TransferResult<String> {
    let (raw, rendering) = match &spec.rule {
        ColumnRule::DbFunction(expr) => (expr.clone(), Rendering::Verbatim),
        ColumnRule::Constant(value) => (value.clone(), Rendering::Quoted),
        ColumnRule::NowTimestamp => (
            ctx.dialect.timestamp_text(ctx.run_started.value()),
            Rendering::DateLiteral,
        ),
        ColumnRule::FilenameSlice { start, end } => (
            ctx.source_file_name
                .chars()
                .skip(start - 1)
                .take(end.saturating_sub(start - 1))
                .collect(),
            Rendering::Quoted,
        ),
        ColumnRule::RowNumber => (ctx.row_number.to_string(), Rendering::Quoted),
        ColumnRule::SourceColumn => {
            let idx = source_index(spec, ctx.header)?;
            (row.get(idx).cloned().unwrap_or_default(), Rendering::Quoted)
        }
    };

    if let Some(template) = &spec.db_conversion {
        return Ok(template.replace(CONVERSION_PLACEHOLDER, &raw));
    }
    Ok(match rendering {
        Rendering::Verbatim => raw,
        Rendering::Quoted => quote_literal(&raw),
        Rendering::DateLiteral => ctx.dialect.date_literal(&raw),
    })
}

/// Input field index read by a [`ColumnRule::SourceColumn`] spec.
pub fn source_index(spec: &MappingSpec, header: Option<&HeaderIndex>) -> TransferResult<usize> {
    match header {
        None => Ok(spec.position),
        Some(header) => {
            let name = spec.source.as_deref().unwrap_or(spec.target.as_str());
            header.position(name).ok_or_else(|| {
                TransferError::config(format!(
                    "source column '{name}' for target '{target}' not found in header {names:?}",
                    target = spec.target,
                    names = header.names()
                ))
            })
        }
    }
}

/// Check that every row-reading spec can be located in `header`.
pub fn check_sources(specs: &[MappingSpec], header: Option<&HeaderIndex>) -> TransferResult<()> {
    for spec in specs.iter().filter(|s| s.rule.reads_row()) {
        source_index(spec, header)?;
    }
    Ok(())
}

/// Resolve every spec for one row and join them into the row's value-list.
pub fn resolve_row(specs: &[MappingSpec], row: &[String], ctx: &MappingContext<'_>) -> TransferResult<String> {
    let mut values = ValueList::new();
    for spec in specs {
        values.push_fragment(&resolve(spec, row, ctx)?);
    }
    Ok(values.finish())
}
