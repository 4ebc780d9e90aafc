//! Run driver.
//!
//! One invocation expands a descriptor glob, loads and validates every matched descriptor, then
//! processes them one at a time in the selected [`RunMode`], each with its own connection.
//!
//! Failure scope follows [`TransferError::is_file_scoped`]: a failed chunk only marks its file as
//! failed, everything else (configuration, connection, I/O, SQL script errors) stops the run.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::database::{Connector, Database, QueryParams};
use crate::descriptor::{Descriptor, Transfer};
use crate::error::{TransferError, TransferResult};
use crate::export::{export_workbooks, ExportSummary};
use crate::ingestion::{
    import_file, BatchErrorPolicy, CompositeObserver, ErrorLogObserver, ImportOptions, LoadObserver, LoadStats,
    LogObserver,
};
use crate::mapping::RunTimestamp;

/// What to do with each matched descriptor.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum RunMode {
    /// Import or export as the descriptor's shape says.
    #[default]
    Transfer,
    /// Run the descriptor's `SQLStatements` instead of mapping rows.
    ExecuteSql,
    /// Print every row of the target table.
    SelectAll,
    /// Drop the target table, run the given SQL script, then transfer.
    Bootstrap(PathBuf),
}

impl RunMode {
    /// Pick one mode from the CLI flags, in precedence order execute-sql, select-all, bootstrap.
    ///
    /// Lower-precedence flags given together with a higher one are ignored with a warning.
    pub fn from_flags(execute_sql: bool, select_all: bool, bootstrap: Option<PathBuf>) -> Self {
        let mode = if execute_sql {
            RunMode::ExecuteSql
        } else if select_all {
            RunMode::SelectAll
        } else if let Some(script) = bootstrap.clone() {
            RunMode::Bootstrap(script)
        } else {
            RunMode::Transfer
        };
        if execute_sql && select_all {
            log::warn!("--select-all ignored: --execute-sql takes precedence");
        }
        if bootstrap.is_some() && (execute_sql || select_all) {
            log::warn!("--bootstrap ignored: {mode:?} takes precedence");
        }
        mode
    }
}

/// Per-invocation options.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunConfig {
    /// Descriptor path or glob pattern.
    pub pattern: String,
    pub mode: RunMode,
    /// Overrides every descriptor's `OnBatchError` when set.
    pub on_batch_error: Option<BatchErrorPolicy>,
    /// Directory receiving per-input error logs.
    pub error_log_dir: PathBuf,
}

impl RunConfig {
    pub fn new(pattern: impl Into<String>) -> Self {
        Self {
            pattern: pattern.into(),
            mode: RunMode::default(),
            on_batch_error: None,
            error_log_dir: PathBuf::from("."),
        }
    }

    pub fn with_mode(mut self, mode: RunMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_batch_policy(mut self, policy: BatchErrorPolicy) -> Self {
        self.on_batch_error = Some(policy);
        self
    }

    pub fn with_error_log_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.error_log_dir = dir.into();
        self
    }
}

/// What happened to one descriptor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Imported(LoadStats),
    Exported(ExportSummary),
    /// Statements executed in execute-sql mode or for a SQL-only descriptor.
    SqlExecuted(usize),
    /// Rows printed in select-all mode.
    Dumped(usize),
    /// The file stopped on a failed chunk.
    Failed(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DescriptorOutcome {
    pub descriptor: PathBuf,
    pub outcome: Outcome,
}

/// Results of one invocation, in processing order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub outcomes: Vec<DescriptorOutcome>,
}

impl RunSummary {
    /// Returns `true` if any file stopped on or skipped a failed chunk.
    pub fn has_failures(&self) -> bool {
        self.outcomes.iter().any(|o| match &o.outcome {
            Outcome::Failed(_) => true,
            Outcome::Imported(stats) => stats.chunks_failed > 0,
            _ => false,
        })
    }
}

/// Drives one invocation.
pub struct Runner<'c> {
    config: RunConfig,
    connector: &'c dyn Connector,
    run_started: RunTimestamp,
}

impl<'c> Runner<'c> {
    pub fn new(config: RunConfig, connector: &'c dyn Connector) -> Self {
        Self {
            config,
            connector,
            run_started: RunTimestamp::now(),
        }
    }

    /// Pin the run timestamp (tests, reruns).
    pub fn with_run_timestamp(mut self, run_started: RunTimestamp) -> Self {
        self.run_started = run_started;
        self
    }

    pub fn run_timestamp(&self) -> RunTimestamp {
        self.run_started
    }

    /// Process every matched descriptor. Select-all output goes to `out`.
    pub fn run<W: Write>(&self, out: &mut W) -> TransferResult<RunSummary> {
        let paths = expand_pattern(&self.config.pattern)?;
        // Validate everything before the first connection is opened.
        let descriptors = paths
            .iter()
            .map(Descriptor::load)
            .collect::<TransferResult<Vec<_>>>()?;
        let bootstrap_sql = match &self.config.mode {
            RunMode::Bootstrap(script) => Some(fs::read_to_string(script)?),
            _ => None,
        };

        let mut summary = RunSummary::default();
        for descriptor in &descriptors {
            log::info!("Processing {}", descriptor.path.display());
            let mut db = self.connector.connect(descriptor.connection())?;
            let outcome = match &self.config.mode {
                RunMode::ExecuteSql => Outcome::SqlExecuted(execute_statements(db.as_mut(), descriptor)?),
                RunMode::SelectAll => Outcome::Dumped(select_all(db.as_mut(), descriptor, out)?),
                RunMode::Bootstrap(_) => {
                    bootstrap(db.as_mut(), descriptor, bootstrap_sql.as_deref().unwrap_or_default())?;
                    self.transfer(db.as_mut(), descriptor)?
                }
                RunMode::Transfer => self.transfer(db.as_mut(), descriptor)?,
            };
            summary.outcomes.push(DescriptorOutcome {
                descriptor: descriptor.path.clone(),
                outcome,
            });
        }
        Ok(summary)
    }

    fn transfer(&self, db: &mut dyn Database, descriptor: &Descriptor) -> TransferResult<Outcome> {
        match &descriptor.transfer {
            Transfer::Export { .. } => Ok(Outcome::Exported(export_workbooks(db, descriptor)?)),
            Transfer::Import { .. } if descriptor.is_sql_only() => {
                Ok(Outcome::SqlExecuted(execute_statements(db, descriptor)?))
            }
            Transfer::Import { source, .. } => {
                let observer = source.as_ref().map(|s| self.observer_for(&s.location));
                let options = ImportOptions {
                    on_batch_error: self
                        .config
                        .on_batch_error
                        .or(descriptor.on_batch_error)
                        .unwrap_or_default(),
                    max_bytes_per_chunk: descriptor.max_bytes_per_chunk,
                    observer,
                };
                match import_file(db, descriptor, self.run_started, &options) {
                    Ok(stats) => Ok(Outcome::Imported(stats)),
                    Err(e) if e.is_file_scoped() => Ok(Outcome::Failed(e.to_string())),
                    Err(e) => Err(e),
                }
            }
        }
    }

    fn observer_for(&self, input: &Path) -> Arc<dyn LoadObserver> {
        let error_log = ErrorLogObserver::for_input(&self.config.error_log_dir, input, self.run_started);
        Arc::new(CompositeObserver::new(vec![
            Arc::new(LogObserver),
            Arc::new(error_log),
        ]))
    }
}

/// Descriptor paths matching `pattern`, sorted.
pub fn expand_pattern(pattern: &str) -> TransferResult<Vec<PathBuf>> {
    let mut paths = Vec::new();
    for entry in glob::glob(pattern)? {
        paths.push(entry?);
    }
    if paths.is_empty() {
        return Err(TransferError::config(format!("no descriptor matches '{pattern}'")));
    }
    paths.sort();
    Ok(paths)
}

/// Run the descriptor's `SQLStatements` in order, each committed on its own.
pub fn execute_statements(db: &mut dyn Database, descriptor: &Descriptor) -> TransferResult<usize> {
    log::info!("Running SQL statements of {}", descriptor.path.display());
    let mut executed = 0;
    for statement in &descriptor.sql_statements {
        let sql = statement.sql.trim().trim_end_matches(';').trim_end();
        if sql.is_empty() {
            continue;
        }
        execute_committed(db, sql)?;
        executed += 1;
    }
    Ok(executed)
}

/// Drop the target table (failure ignored), then run each `;`-separated statement of `script`.
pub fn bootstrap(db: &mut dyn Database, descriptor: &Descriptor, script: &str) -> TransferResult<usize> {
    match descriptor.connection().table_ref() {
        Some(table) => {
            let drop = db.dialect().drop_table(&table);
            if let Err(e) = execute_committed(db, &drop) {
                log::info!("ignoring failed drop of {table}: {e}");
                db.rollback()?;
            }
        }
        None => log::warn!("{} names no TableName; nothing to drop", descriptor.path.display()),
    }

    let mut executed = 0;
    for sql in script.split(';').map(str::trim).filter(|s| !s.is_empty()) {
        execute_committed(db, sql)?;
        executed += 1;
    }
    Ok(executed)
}

/// Print every row of the descriptor's table, values space-separated.
pub fn select_all<W: Write>(db: &mut dyn Database, descriptor: &Descriptor, out: &mut W) -> TransferResult<usize> {
    let table = descriptor
        .connection()
        .table_ref()
        .ok_or_else(|| TransferError::config(format!("{} names no TableName", descriptor.path.display())))?;
    let sql = db.dialect().select_all(&table);
    let result = db.query(&sql, &QueryParams::none())?;
    for row in &result.rows {
        for value in row {
            write!(out, "{:<2} ", value.to_string())?;
        }
        writeln!(out)?;
    }
    Ok(result.row_count())
}

fn execute_committed(db: &mut dyn Database, sql: &str) -> TransferResult<()> {
    log::info!("Executing SQL query=\"{sql}\"");
    db.execute_statement(sql)?;
    db.commit()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mode_flags_follow_precedence() {
        assert_eq!(RunMode::from_flags(false, false, None), RunMode::Transfer);
        assert_eq!(RunMode::from_flags(true, true, Some("b.sql".into())), RunMode::ExecuteSql);
        assert_eq!(RunMode::from_flags(false, true, Some("b.sql".into())), RunMode::SelectAll);
        assert_eq!(
            RunMode::from_flags(false, false, Some("b.sql".into())),
            RunMode::Bootstrap(PathBuf::from("b.sql"))
        );
    }

    #[test]
    fn pattern_matches_come_back_sorted() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["b.json", "a.json", "c.txt"] {
            fs::write(dir.path().join(name), "{}").unwrap();
        }
        let pattern = dir.path().join("*.json");
        let paths = expand_pattern(&pattern.to_string_lossy()).unwrap();
        assert_eq!(paths, vec![dir.path().join("a.json"), dir.path().join("b.json")]);

        assert!(matches!(expand_pattern("[").unwrap_err(), TransferError::Pattern(_)));
    }

    #[test]
    fn summary_counts_skipped_chunks_as_failures() {
        let mut summary = RunSummary::default();
        summary.outcomes.push(DescriptorOutcome {
            descriptor: "a.json".into(),
            outcome: Outcome::Imported(LoadStats {
                rows_read: 3,
                rows_loaded: 2,
                chunks_committed: 1,
                chunks_failed: 1,
            }),
        });
        assert!(summary.has_failures());
    }
}
