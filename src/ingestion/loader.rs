//! Chunked bulk loader.
//!
//! Reads a delimited source window by window ([`ChunkReader`]), maps every line through the
//! descriptor's column mappings and flushes each window as one bulk insert, committed on its own.
//! A window is therefore both the unit of commit and the unit of failure.

use std::fmt;
use std::io::BufRead;
use std::str::FromStr;
use std::sync::Arc;

use crate::database::{Database, Dialect};
use crate::error::{TransferError, TransferResult};
use crate::mapping::{check_sources, resolve_row, MappingContext, MappingSpec, RunTimestamp};
use crate::tokenizer::RecordTokenizer;
use crate::types::HeaderIndex;

use super::chunk::{Chunk, ChunkReader};
use super::observability::{ChunkStats, LoadContext, LoadObserver, LoadStats};

/// What happens to the rest of a file after one of its chunks fails to insert.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BatchErrorPolicy {
    /// Roll back the chunk and stop reading the file.
    #[default]
    Abort,
    /// Roll back the chunk and carry on with the next one.
    Continue,
}

impl FromStr for BatchErrorPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "abort" => Ok(Self::Abort),
            "continue" | "skip" => Ok(Self::Continue),
            other => Err(format!("unknown batch error policy '{other}' (expected abort or continue)")),
        }
    }
}

impl fmt::Display for BatchErrorPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Abort => f.write_str("abort"),
            Self::Continue => f.write_str("continue"),
        }
    }
}

/// Options controlling one file load.
#[derive(Clone)]
pub struct ImportOptions {
    pub on_batch_error: BatchErrorPolicy,
    /// Read window in input bytes.
    pub max_bytes_per_chunk: usize,
    /// Optional observer for chunk and file outcomes.
    pub observer: Option<Arc<dyn LoadObserver>>,
}

impl fmt::Debug for ImportOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ImportOptions")
            .field("on_batch_error", &self.on_batch_error)
            .field("max_bytes_per_chunk", &self.max_bytes_per_chunk)
            .field("observer_set", &self.observer.is_some())
            .finish()
    }
}

impl Default for ImportOptions {
    fn default() -> Self {
        Self {
            on_batch_error: BatchErrorPolicy::default(),
            max_bytes_per_chunk: crate::descriptor::DEFAULT_MAX_BYTES_PER_CHUNK,
            observer: None,
        }
    }
}

/// Everything about the target and the mapping that stays fixed for one file.
#[derive(Debug, Clone)]
pub struct LoadPlan<'a> {
    /// Target table reference (`schema.table` or `table`).
    pub table: &'a str,
    /// Sorted column mappings.
    pub mappings: &'a [MappingSpec],
    pub tokenizer: RecordTokenizer,
    /// Whether the first line is a header.
    pub has_header: bool,
    /// Base name fed to `S-FILENAME` slices.
    pub source_file_name: &'a str,
    pub run_started: RunTimestamp,
}

/// Stream `reader` into the plan's table.
///
/// Returns the file's totals. With [`BatchErrorPolicy::Continue`] a failed chunk only shows up in
/// [`LoadStats::chunks_failed`]; with [`BatchErrorPolicy::Abort`] the first failure is returned as
/// [`TransferError::BatchWrite`] after earlier chunks stayed committed.
pub fn load_delimited<R: BufRead>(
    db: &mut dyn Database,
    reader: R,
    plan: &LoadPlan<'_>,
    ctx: &LoadContext,
    options: &ImportOptions,
) -> TransferResult<LoadStats> {
    let mut chunks = ChunkReader::new(reader, options.max_bytes_per_chunk);
    let mut stats = LoadStats::default();

    let header = if plan.has_header {
        match chunks.read_line()? {
            Some(line) => Some(HeaderIndex::new(plan.tokenizer.split(&line))),
            None => {
                log::warn!("{} is empty; nothing to load", ctx.source.display());
                notify_finished(options, ctx, stats);
                return Ok(stats);
            }
        }
    } else {
        None
    };
    check_sources(plan.mappings, header.as_ref())?;

    let columns: Vec<&str> = plan.mappings.iter().map(|m| m.target.as_str()).collect();
    let dialect = db.dialect();
    let pad_to = header.as_ref().map_or(0, HeaderIndex::len);

    let mut chunk_no = 0usize;
    loop {
        let chunk = chunks.next_chunk()?;
        let Some((first_row, last_row)) = chunk.row_span() else {
            break;
        };
        chunk_no += 1;
        let chunk_stats = ChunkStats {
            chunk: chunk_no,
            first_row,
            last_row,
            bytes: chunk.bytes,
        };

        let values = map_chunk(&chunk, plan, header.as_ref(), pad_to, dialect)?;
        stats.rows_read += values.len();

        let sql = dialect.bulk_insert(plan.table, &columns, &values);
        log::debug!("chunk {chunk_no} statement:\n{sql}");

        match db.execute(&sql).and_then(|_| db.commit()) {
            Ok(()) => {
                stats.chunks_committed += 1;
                stats.rows_loaded += values.len();
                if let Some(obs) = &options.observer {
                    obs.on_chunk_committed(ctx, chunk_stats);
                }
            }
            Err(e) => {
                if let Err(rb) = db.rollback() {
                    log::warn!("rollback after failed chunk {chunk_no} failed: {rb}");
                }
                stats.chunks_failed += 1;
                let err = TransferError::BatchWrite {
                    table: plan.table.to_string(),
                    first_row,
                    last_row,
                    detail: e.to_string(),
                };
                if let Some(obs) = &options.observer {
                    obs.on_chunk_failed(ctx, chunk_stats, &err);
                }
                if options.on_batch_error == BatchErrorPolicy::Abort {
                    notify_finished(options, ctx, stats);
                    return Err(err);
                }
            }
        }
    }

    notify_finished(options, ctx, stats);
    Ok(stats)
}

fn map_chunk(
    chunk: &Chunk,
    plan: &LoadPlan<'_>,
    header: Option<&HeaderIndex>,
    pad_to: usize,
    dialect: Dialect,
) -> TransferResult<Vec<String>> {
    chunk
        .lines
        .iter()
        .map(|line| {
            let mut row = plan.tokenizer.split(&line.text);
            if row.len() < pad_to {
                row.resize(pad_to, String::new());
            }
            let mctx = MappingContext {
                row_number: line.row_number,
                source_file_name: plan.source_file_name,
                header,
                run_started: plan.run_started,
                dialect,
            };
            resolve_row(plan.mappings, &row, &mctx)
        })
        .collect()
}

fn notify_finished(options: &ImportOptions, ctx: &LoadContext, stats: LoadStats) {
    if let Some(obs) = &options.observer {
        obs.on_file_finished(ctx, stats);
    }
}
