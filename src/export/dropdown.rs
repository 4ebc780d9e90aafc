//! Dropdown source queries.
//!
//! A `DDListSQL` may depend on the partition being written. The dependency is expressed by the
//! named slot `:partition`; the legacy tokens `?` and `^` are accepted too and rewritten to that
//! slot. The partition value is always bound as a parameter, never spliced into the SQL text.

use crate::database::{Database, QueryParams};
use crate::error::{TransferError, TransferResult};

/// Bound parameter name carrying the partition value.
pub const PARTITION_SLOT: &str = ":partition";

const LEGACY_TOKENS: [char; 2] = ['?', '^'];

/// A dropdown query with its partition slot normalized.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryTemplate {
    sql: String,
    has_slot: bool,
}

impl QueryTemplate {
    /// Rewrite legacy placeholder tokens found outside quoted literals.
    pub fn parse(sql: &str) -> Self {
        let mut out = String::with_capacity(sql.len() + 16);
        let mut has_slot = false;
        let mut quote: Option<char> = None;
        let mut rest = sql;

        while let Some(c) = rest.chars().next() {
            match quote {
                Some(q) => {
                    if c == q {
                        quote = None;
                    }
                    out.push(c);
                }
                None if c == '\'' || c == '"' => {
                    quote = Some(c);
                    out.push(c);
                }
                None if LEGACY_TOKENS.contains(&c) => {
                    out.push_str(PARTITION_SLOT);
                    has_slot = true;
                }
                None if rest.starts_with(PARTITION_SLOT) && !continues_identifier(&rest[PARTITION_SLOT.len()..]) => {
                    out.push_str(PARTITION_SLOT);
                    has_slot = true;
                    rest = &rest[PARTITION_SLOT.len()..];
                    continue;
                }
                None => out.push(c),
            }
            rest = &rest[c.len_utf8()..];
        }

        Self { sql: out, has_slot }
    }

    pub fn sql(&self) -> &str {
        &self.sql
    }

    /// Returns `true` if the query depends on the partition value.
    pub fn has_partition_slot(&self) -> bool {
        self.has_slot
    }

    /// Parameters for running the query for `partition`.
    pub fn params(&self, partition: Option<&str>) -> TransferResult<QueryParams> {
        match (self.has_slot, partition) {
            (false, _) => Ok(QueryParams::none()),
            (true, Some(value)) => Ok(QueryParams::none().with(PARTITION_SLOT, value)),
            (true, None) => Err(TransferError::config(format!(
                "dropdown query needs a partition value but the export is not partitioned: {}",
                self.sql
            ))),
        }
    }
}

fn continues_identifier(rest: &str) -> bool {
    rest.chars().next().is_some_and(|c| c.is_alphanumeric() || c == '_')
}

/// Run a dropdown query and collect its first column: nulls dropped, duplicates removed,
/// first-seen order kept.
pub fn dropdown_values(
    db: &mut dyn Database,
    template: &QueryTemplate,
    partition: Option<&str>,
) -> TransferResult<Vec<String>> {
    let params = template.params(partition)?;
    log::debug!("dropdown query (partition={partition:?}): {}", template.sql());
    let result = db.query(template.sql(), &params)?;

    let mut values: Vec<String> = Vec::new();
    for value in result.rows.iter().filter_map(|r| r.first()) {
        if value.is_null() {
            continue;
        }
        let text = value.to_string();
        if !values.contains(&text) {
            values.push(text);
        }
    }
    Ok(values)
}
