use thiserror::Error;

/// Convenience result type for transfer operations.
pub type TransferResult<T> = Result<T, TransferError>;

/// Error type returned by descriptor loading, the import/export pipelines and the run driver.
///
/// A single enum is shared across every stage so that the run driver can decide, per variant,
/// whether a failure aborts the whole invocation or only the current file.
#[derive(Debug, Error)]
pub enum TransferError {
    /// Underlying I/O error (e.g. file not found, permission denied).
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// The descriptor is not valid JSON.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// Malformed or inconsistent configuration: missing keys, unknown mapping types, a
    /// mapping source column that is absent from the file header, etc.
    #[error("config error: {message}")]
    Config { message: String },

    /// The database could not be reached or no driver is available for the target.
    #[error("connection error: {message}")]
    Connection { message: String },

    /// Error reported by the SQLite driver.
    #[error("database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// The target rejected the bulk statement for one chunk.
    #[error("bulk insert into {table} failed for rows {first_row}..={last_row}: {detail}")]
    BatchWrite {
        table: String,
        first_row: usize,
        last_row: usize,
        detail: String,
    },

    /// Spreadsheet read error.
    #[error("excel error: {0}")]
    Excel(#[from] calamine::Error),

    /// Spreadsheet write error.
    #[error("xlsx writer error: {0}")]
    XlsxWriter(#[from] rust_xlsxwriter::XlsxError),

    /// Delimited text write error.
    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),

    /// The spreadsheet container could not be opened as a zip archive.
    #[error("zip error: {0}")]
    Zip(#[from] zip::result::ZipError),

    /// The descriptor glob pattern is invalid.
    #[error("invalid pattern: {0}")]
    Pattern(#[from] glob::PatternError),

    /// A path matched by the descriptor glob could not be read.
    #[error("glob error: {0}")]
    Glob(#[from] glob::GlobError),
}

impl TransferError {
    pub(crate) fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    pub(crate) fn connection(message: impl Into<String>) -> Self {
        Self::Connection {
            message: message.into(),
        }
    }

    /// Returns `true` when the error only invalidates the current input file.
    ///
    /// Everything else terminates the invocation.
    pub fn is_file_scoped(&self) -> bool {
        matches!(self, Self::BatchWrite { .. })
    }
}
