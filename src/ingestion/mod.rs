//! Import pipeline: input file → target table.
//!
//! Most callers should use [`import_file`] (from [`unified`]) which:
//!
//! - picks delimited or spreadsheet handling from `FileType` or the file extension
//! - streams the input in byte-bounded chunks ([`chunk`]) and flushes each as one bulk insert
//! - optionally reports chunk outcomes and failures to a [`LoadObserver`]
//!
//! The building blocks are public as well:
//! - [`chunk`]: the byte-budget line cursor
//! - [`loader`]: mapping and flushing a delimited stream
//! - [`excel`]: spreadsheet → delimited text

pub mod chunk;
pub mod excel;
pub mod loader;
pub mod observability;
pub mod unified;

pub use loader::{load_delimited, BatchErrorPolicy, ImportOptions, LoadPlan};
pub use observability::{
    error_log_file_name, ChunkStats, CompositeObserver, ErrorLogObserver, LoadContext, LoadObserver, LoadSeverity,
    LoadStats, LogObserver,
};
pub use unified::{import_file, SourceFormat};
