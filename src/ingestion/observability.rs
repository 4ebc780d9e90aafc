//! Load observers.
//!
//! The import pipeline reports chunk outcomes and file-level results to an [`LoadObserver`].
//! [`LogObserver`] forwards them to the `log` facade, [`ErrorLogObserver`] appends error-level
//! entries to the per-input error log file, and [`CompositeObserver`] fans out to several.

use std::fmt;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use chrono::Local;

use crate::error::TransferError;
use crate::mapping::RunTimestamp;

/// Severity classification used for observer callbacks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LoadSeverity {
    /// Informational event.
    Info,
    /// Warning-level event (non-fatal).
    Warning,
    /// Error-level event (a chunk or file failed).
    Error,
    /// Critical error (configuration, connection or I/O failure).
    Critical,
}

impl LoadSeverity {
    /// Classify an error the way the run driver treats it.
    pub fn for_error(e: &TransferError) -> Self {
        if e.is_file_scoped() {
            LoadSeverity::Error
        } else {
            LoadSeverity::Critical
        }
    }
}

/// Which file is being loaded into which table.
#[derive(Debug, Clone)]
pub struct LoadContext {
    /// Descriptor driving the load.
    pub descriptor: PathBuf,
    /// Input file as named in the descriptor.
    pub source: PathBuf,
    /// Target table reference.
    pub table: String,
}

/// Outcome of one flushed chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkStats {
    /// 1-based index of the chunk within the file.
    pub chunk: usize,
    pub first_row: usize,
    pub last_row: usize,
    /// Input bytes consumed by the chunk.
    pub bytes: usize,
}

impl ChunkStats {
    pub fn rows(&self) -> usize {
        self.last_row + 1 - self.first_row
    }
}

/// Totals for one input file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LoadStats {
    /// Data rows read and mapped.
    pub rows_read: usize,
    /// Rows in committed chunks.
    pub rows_loaded: usize,
    pub chunks_committed: usize,
    pub chunks_failed: usize,
}

/// Observer interface for load outcomes.
pub trait LoadObserver: Send + Sync {
    /// Called after a chunk's bulk statement committed.
    fn on_chunk_committed(&self, _ctx: &LoadContext, _stats: ChunkStats) {}

    /// Called after a chunk's bulk statement failed and was rolled back.
    fn on_chunk_failed(&self, _ctx: &LoadContext, _stats: ChunkStats, _error: &TransferError) {}

    /// Called when the file has been read to the end (or abandoned by policy).
    fn on_file_finished(&self, _ctx: &LoadContext, _stats: LoadStats) {}

    /// Called when the load stops on an error.
    fn on_failure(&self, _ctx: &LoadContext, _severity: LoadSeverity, _error: &TransferError) {}
}

/// An observer that fans out callbacks to a list of observers.
#[derive(Default)]
pub struct CompositeObserver {
    observers: Vec<Arc<dyn LoadObserver>>,
}

impl CompositeObserver {
    pub fn new(observers: Vec<Arc<dyn LoadObserver>>) -> Self {
        Self { observers }
    }
}

impl fmt::Debug for CompositeObserver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompositeObserver")
            .field("observers_len", &self.observers.len())
            .finish()
    }
}

impl LoadObserver for CompositeObserver {
    fn on_chunk_committed(&self, ctx: &LoadContext, stats: ChunkStats) {
        for o in &self.observers {
            o.on_chunk_committed(ctx, stats);
        }
    }

    fn on_chunk_failed(&self, ctx: &LoadContext, stats: ChunkStats, error: &TransferError) {
        for o in &self.observers {
            o.on_chunk_failed(ctx, stats, error);
        }
    }

    fn on_file_finished(&self, ctx: &LoadContext, stats: LoadStats) {
        for o in &self.observers {
            o.on_file_finished(ctx, stats);
        }
    }

    fn on_failure(&self, ctx: &LoadContext, severity: LoadSeverity, error: &TransferError) {
        for o in &self.observers {
            o.on_failure(ctx, severity, error);
        }
    }
}

/// Forwards events to the `log` facade.
#[derive(Debug, Default)]
pub struct LogObserver;

impl LoadObserver for LogObserver {
    fn on_chunk_committed(&self, ctx: &LoadContext, stats: ChunkStats) {
        log::info!(
            "[load][ok] table={} chunk={} rows={}..={} ({} rows, {} bytes)",
            ctx.table,
            stats.chunk,
            stats.first_row,
            stats.last_row,
            stats.rows(),
            stats.bytes
        );
    }

    fn on_chunk_failed(&self, ctx: &LoadContext, stats: ChunkStats, error: &TransferError) {
        log::error!(
            "[load][failed] table={} chunk={} rows={}..={} err={}",
            ctx.table,
            stats.chunk,
            stats.first_row,
            stats.last_row,
            error
        );
    }

    fn on_file_finished(&self, ctx: &LoadContext, stats: LoadStats) {
        log::info!(
            "[load][done] source={} table={} read={} loaded={} chunks_ok={} chunks_failed={}",
            ctx.source.display(),
            ctx.table,
            stats.rows_read,
            stats.rows_loaded,
            stats.chunks_committed,
            stats.chunks_failed
        );
    }

    fn on_failure(&self, ctx: &LoadContext, severity: LoadSeverity, error: &TransferError) {
        log::error!(
            "[load][{:?}] source={} table={} err={}",
            severity,
            ctx.source.display(),
            ctx.table,
            error
        );
    }
}

/// Appends error-level events to a per-input error log file.
///
/// The file is only created once the first error is written.
#[derive(Debug)]
pub struct ErrorLogObserver {
    path: PathBuf,
    lock: Mutex<()>,
}

impl ErrorLogObserver {
    /// Create an observer that appends to `path`.
    ///
    /// Writes are best-effort; failures to open/write the log file are ignored.
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            lock: Mutex::new(()),
        }
    }

    /// Observer writing to `<dir>/<input-stem>_<run-stamp>_error_log.txt`.
    pub fn for_input(dir: impl AsRef<Path>, input: &Path, run: RunTimestamp) -> Self {
        Self::new(dir.as_ref().join(error_log_file_name(input, run)))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn append_line(&self, line: &str) {
        let _guard = self.lock.lock().ok();
        if let Ok(mut f) = OpenOptions::new().create(true).append(true).open(&self.path) {
            let _ = writeln!(f, "{} [ERROR] - {line}", Local::now().format("%Y-%m-%d %H:%M:%S"));
        }
    }
}

impl LoadObserver for ErrorLogObserver {
    fn on_chunk_failed(&self, ctx: &LoadContext, stats: ChunkStats, error: &TransferError) {
        self.append_line(&format!(
            "table={} chunk={} rows={}..={} err={}",
            ctx.table, stats.chunk, stats.first_row, stats.last_row, error
        ));
    }

    fn on_failure(&self, ctx: &LoadContext, severity: LoadSeverity, error: &TransferError) {
        if severity >= LoadSeverity::Error {
            self.append_line(&format!(
                "severity={:?} source={} err={}",
                severity,
                ctx.source.display(),
                error
            ));
        }
    }
}

/// Deterministic error log name for an input file and run.
pub fn error_log_file_name(input: &Path, run: RunTimestamp) -> String {
    let stem = input
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "input".to_string());
    format!("{stem}_{}_error_log.txt", run.file_stamp())
}
