//! Import entry point.
//!
//! [`import_file`] loads the input file of an import-shaped [`Descriptor`] into its target table:
//!
//! - the input format comes from `SourceInfo.FileType`, or the file extension when absent
//! - spreadsheets are first rewritten as delimited text ([`super::excel`])
//! - if an observer is configured, chunk outcomes and fatal failures are reported to it

use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use crate::database::Database;
use crate::descriptor::{Descriptor, FileSource, Transfer};
use crate::error::{TransferError, TransferResult};
use crate::mapping::RunTimestamp;
use crate::tokenizer::RecordTokenizer;

use super::excel::spreadsheet_to_delimited;
use super::loader::{load_delimited, ImportOptions, LoadPlan};
use super::observability::{LoadContext, LoadSeverity, LoadStats};

/// Physical shape of an import source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceFormat {
    /// Line-oriented delimited text.
    Delimited,
    /// Workbook read through `calamine`.
    Spreadsheet,
}

impl SourceFormat {
    /// Parse a format from a `FileType` value or a file extension (case-insensitive).
    pub fn from_extension(ext: &str) -> Self {
        match ext.trim().trim_start_matches('.').to_ascii_lowercase().as_str() {
            "xlsx" | "xlsm" | "xls" | "xlsb" | "ods" | "excel" => Self::Spreadsheet,
            _ => Self::Delimited,
        }
    }

    /// Format of a descriptor source: explicit `FileType` first, then the extension.
    pub fn detect(source: &FileSource) -> Self {
        match (&source.file_type, source.location.extension().and_then(|e| e.to_str())) {
            (Some(file_type), _) => Self::from_extension(file_type),
            (None, Some(ext)) => Self::from_extension(ext),
            (None, None) => Self::Delimited,
        }
    }
}

/// Load the descriptor's input file into its target table.
///
/// Fatal failures (configuration, I/O) are reported to the observer via `on_failure`; batch
/// failures were already reported per chunk.
pub fn import_file(
    db: &mut dyn Database,
    descriptor: &Descriptor,
    run_started: RunTimestamp,
    options: &ImportOptions,
) -> TransferResult<LoadStats> {
    let Transfer::Import { source, table, .. } = &descriptor.transfer else {
        return Err(TransferError::config(format!(
            "{} is not an import descriptor",
            descriptor.path.display()
        )));
    };
    let source = source.as_ref().ok_or_else(|| {
        TransferError::config(format!("{} has no SourceInfo.Location", descriptor.path.display()))
    })?;

    let ctx = LoadContext {
        descriptor: descriptor.path.clone(),
        source: source.location.clone(),
        table: table.clone(),
    };

    let result = import_source(db, descriptor, source, table, run_started, &ctx, options);
    if let (Err(e), Some(obs)) = (&result, &options.observer) {
        if !e.is_file_scoped() {
            obs.on_failure(&ctx, LoadSeverity::for_error(e), e);
        }
    }
    result
}

fn import_source(
    db: &mut dyn Database,
    descriptor: &Descriptor,
    source: &FileSource,
    table: &str,
    run_started: RunTimestamp,
    ctx: &LoadContext,
    options: &ImportOptions,
) -> TransferResult<LoadStats> {
    let source_file_name = file_name(&source.location);
    let plan = LoadPlan {
        table,
        mappings: &descriptor.mappings,
        tokenizer: RecordTokenizer::new(source.delimiter).with_single_quotes(source.single_quotes),
        has_header: source.header,
        source_file_name: &source_file_name,
        run_started,
    };

    match SourceFormat::detect(source) {
        SourceFormat::Delimited => {
            log::info!("loading {} into {table}", source.location.display());
            let file = File::open(&source.location)?;
            load_delimited(db, BufReader::new(file), &plan, ctx, options)
        }
        SourceFormat::Spreadsheet => {
            log::info!("loading spreadsheet {} into {table}", source.location.display());
            let text = spreadsheet_to_delimited(&source.location, source.sheet_name.as_deref(), source.delimiter)?;
            load_delimited(db, BufReader::new(text.reopen()?), &plan, ctx, options)
        }
    }
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}
