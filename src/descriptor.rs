//! Descriptor model.
//!
//! A descriptor is a JSON document describing one job. Its shape is inferred from
//! `TargetInfo`: a `DBServer` key makes it *import-shaped* (file → table), a `FileName` key makes
//! it *export-shaped* (query → workbook).
//!
//! ```json
//! {
//!   "SourceInfo": { "Location": "loads/SCL_2024.txt", "Delimiter": "~", "FileHeader": "yes" },
//!   "TargetInfo": { "DBServer": "db.example", "DBPort": 1521, "DBService": "ORCL",
//!                   "UserName": "loader", "PassWord": "secret", "TableName": "LOADS" },
//!   "ColMappings": [
//!     { "Target": "CS_ID", "Type": "S", "Source": "cs_id", "Order": 1 },
//!     { "Target": "COUNTRY", "Type": "S-FILENAME.1.3", "Order": 2 },
//!     { "Target": "LOAD_DATE", "Type": "S-datetime.now()", "Order": 3 }
//!   ],
//!   "MaxBytesPerChunk": 16000
//! }
//! ```
//!
//! Everything is validated by [`Descriptor::load`], before any file or database I/O happens.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{NaiveDateTime, NaiveTime};
use serde::Deserialize;

use crate::database::Dialect;
use crate::error::{TransferError, TransferResult};
use crate::export::QueryTemplate;
use crate::ingestion::loader::BatchErrorPolicy;
use crate::mapping::{sort_specs, ColumnRule, MappingSpec, CONVERSION_PLACEHOLDER};

/// Read window used when `MaxBytesPerChunk` is absent.
pub const DEFAULT_MAX_BYTES_PER_CHUNK: usize = 16_000;
/// Format applied to date/time cells on export when `DateFormat` is absent.
pub const DEFAULT_DATE_FORMAT: &str = "%Y-%m-%d %H:%M:%S";
/// Format for midnight values on export when `DateFormat` is absent.
pub const DEFAULT_DATE_ONLY_FORMAT: &str = "%Y-%m-%d";
pub const DEFAULT_SHEET_NAME: &str = "Sheet1";

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Lenient {
    Int(i64),
    Text(String),
}

impl Lenient {
    fn as_i64(&self, key: &str) -> TransferResult<i64> {
        match self {
            Lenient::Int(v) => Ok(*v),
            Lenient::Text(s) => s
                .trim()
                .parse()
                .map_err(|_| TransferError::config(format!("{key} must be an integer, got '{s}'"))),
        }
    }

    /// Like [`Self::as_i64`], with a blank string read as absent.
    fn as_opt_i64(&self, key: &str) -> TransferResult<Option<i64>> {
        match self {
            Lenient::Text(s) if s.trim().is_empty() => Ok(None),
            other => other.as_i64(key).map(Some),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Flag {
    Bool(bool),
    Text(String),
}

impl Flag {
    fn as_bool(&self, key: &str) -> TransferResult<bool> {
        match self {
            Flag::Bool(b) => Ok(*b),
            Flag::Text(s) => match s.trim().to_ascii_lowercase().as_str() {
                "yes" | "y" | "true" => Ok(true),
                "no" | "n" | "false" => Ok(false),
                _ => Err(TransferError::config(format!("{key} must be \"yes\" or \"no\", got '{s}'"))),
            },
        }
    }
}

fn flag_or(flag: &Option<Flag>, key: &str, default: bool) -> TransferResult<bool> {
    flag.as_ref().map_or(Ok(default), |f| f.as_bool(key))
}

#[derive(Debug, Default, Deserialize)]
struct RawConnection {
    #[serde(rename = "DBServer")]
    server: Option<String>,
    #[serde(rename = "DBPort")]
    port: Option<Lenient>,
    #[serde(rename = "Schema")]
    schema: Option<String>,
    #[serde(rename = "DBService")]
    service: Option<String>,
    #[serde(rename = "UserName")]
    user: Option<String>,
    #[serde(rename = "PassWord")]
    password: Option<String>,
    #[serde(rename = "TableName")]
    table: Option<String>,
    #[serde(rename = "DBEncoding")]
    encoding: Option<String>,
    #[serde(rename = "Dialect")]
    dialect: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct RawSourceInfo {
    #[serde(flatten)]
    connection: RawConnection,
    location: Option<String>,
    delimiter: Option<String>,
    file_type: Option<String>,
    file_header: Option<Flag>,
    sheet_name: Option<String>,
    quote_single: Option<Flag>,
    #[serde(rename = "SQL")]
    sql: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct RawTargetInfo {
    #[serde(flatten)]
    connection: RawConnection,
    location: Option<String>,
    file_name: Option<String>,
    sheet_name: Option<String>,
    partition_column: Option<String>,
    date_format: Option<String>,
    #[serde(default)]
    unlocked_columns: Vec<String>,
    protect_sheet: Option<Flag>,
}

#[derive(Debug, Deserialize)]
struct RawMapping {
    #[serde(rename = "Target")]
    target: Option<String>,
    #[serde(rename = "Type")]
    kind: Option<String>,
    #[serde(rename = "Source")]
    source: Option<String>,
    #[serde(rename = "Order")]
    order: Option<Lenient>,
    #[serde(rename = "DB_CONVERSION")]
    db_conversion: Option<String>,
    #[serde(rename = "DDList")]
    dd_list: Option<Flag>,
    #[serde(rename = "DDListSQL")]
    dd_list_sql: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawSqlStatement {
    #[serde(rename = "SQL")]
    sql: String,
    #[serde(rename = "Order")]
    order: Option<Lenient>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct RawDescriptor {
    source_info: Option<RawSourceInfo>,
    target_info: Option<RawTargetInfo>,
    #[serde(default)]
    col_mappings: Vec<RawMapping>,
    #[serde(rename = "SQLStatements", default)]
    sql_statements: Vec<RawSqlStatement>,
    max_bytes_per_chunk: Option<Lenient>,
    on_batch_error: Option<String>,
}

/// Database connection keys (`DBServer`, `DBPort`, …) of a source or target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionInfo {
    /// Host name, or the database file path for SQLite.
    pub server: String,
    pub port: Option<u16>,
    pub schema: Option<String>,
    pub service: Option<String>,
    pub user: Option<String>,
    pub password: Option<String>,
    pub table: Option<String>,
    pub encoding: String,
    pub dialect: Dialect,
}

impl ConnectionInfo {
    /// `schema.table` when a schema is configured, otherwise the bare table name.
    pub fn table_ref(&self) -> Option<String> {
        let table = self.table.as_deref()?;
        Some(match self.schema.as_deref() {
            Some(schema) if !schema.is_empty() => format!("{schema}.{table}"),
            _ => table.to_string(),
        })
    }

    /// Human-readable connection summary without credentials.
    pub fn describe(&self) -> String {
        let user = self.user.as_deref().unwrap_or("");
        let mut out = format!("{user}@{}", self.server);
        if let Some(port) = self.port {
            out.push_str(&format!(":{port}"));
        }
        if let Some(service) = &self.service {
            out.push_str(&format!("/{service}"));
        }
        out
    }
}

/// Delimited or spreadsheet input file of an import.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileSource {
    /// Input path, resolved against the descriptor's directory.
    pub location: PathBuf,
    pub delimiter: char,
    /// `FileType` as written in the descriptor (e.g. `csv`, `txt`, `xlsx`).
    pub file_type: Option<String>,
    pub header: bool,
    /// Sheet to read when the input is a spreadsheet; first sheet when `None`.
    pub sheet_name: Option<String>,
    pub single_quotes: bool,
}

/// Query side of an export.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuerySource {
    pub connection: ConnectionInfo,
    pub sql: String,
}

/// Workbook side of an export.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkbookTarget {
    /// Output directory, resolved against the descriptor's directory.
    pub location: PathBuf,
    pub file_name: String,
    pub sheet_name: String,
    pub partition_column: Option<String>,
    /// `chrono` format string for date/time cells, when configured.
    pub date_format: Option<String>,
    pub unlocked_columns: Vec<String>,
    pub protect: bool,
}

impl WorkbookTarget {
    /// Cell text for a date/time value.
    ///
    /// Without a `DateFormat`, midnight values are written as plain dates so that a `DATE` column
    /// holding `2024-02-29` exports as `2024-02-29`.
    pub fn format_datetime(&self, dt: NaiveDateTime) -> String {
        let format = match &self.date_format {
            Some(format) => format.as_str(),
            None if dt.time() == NaiveTime::MIN => DEFAULT_DATE_ONLY_FORMAT,
            None => DEFAULT_DATE_FORMAT,
        };
        dt.format(format).to_string()
    }
}

/// What a descriptor moves, and where.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transfer {
    /// File → table. `source` is `None` for SQL-only descriptors.
    Import {
        source: Option<FileSource>,
        target: ConnectionInfo,
        table: String,
    },
    /// Query → workbook(s).
    Export {
        source: QuerySource,
        target: WorkbookTarget,
    },
}

/// One raw SQL statement of `SQLStatements`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SqlStatement {
    pub sql: String,
    pub order: Option<i64>,
}

/// A validated job description.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Descriptor {
    /// Path the descriptor was loaded from.
    pub path: PathBuf,
    pub transfer: Transfer,
    /// Column mappings, sorted by `Order`.
    pub mappings: Vec<MappingSpec>,
    /// Raw SQL statements, sorted by `Order`.
    pub sql_statements: Vec<SqlStatement>,
    pub max_bytes_per_chunk: usize,
    /// Batch failure policy requested by the descriptor, if any.
    pub on_batch_error: Option<BatchErrorPolicy>,
}

impl Descriptor {
    /// Read and validate the descriptor at `path`.
    pub fn load(path: impl AsRef<Path>) -> TransferResult<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path)?;
        Self::from_json_str(&text, path)
    }

    /// Validate descriptor JSON. Relative paths resolve against `path`'s directory.
    pub fn from_json_str(json: &str, path: impl AsRef<Path>) -> TransferResult<Self> {
        let path = path.as_ref();
        let raw: RawDescriptor = serde_json::from_str(json)?;
        let base_dir = path.parent().map(Path::to_path_buf).unwrap_or_default();
        build(raw, path, &base_dir).map_err(|e| match e {
            TransferError::Config { message } => TransferError::config(format!(
                "malformed descriptor {}: {message}",
                path.display()
            )),
            other => other,
        })
    }

    pub fn is_import(&self) -> bool {
        matches!(self.transfer, Transfer::Import { .. })
    }

    /// A descriptor that only carries `SQLStatements` and no column mappings.
    pub fn is_sql_only(&self) -> bool {
        self.mappings.is_empty() && !self.sql_statements.is_empty()
    }

    /// The database side of the job (target of an import, source of an export).
    pub fn connection(&self) -> &ConnectionInfo {
        match &self.transfer {
            Transfer::Import { target, .. } => target,
            Transfer::Export { source, .. } => &source.connection,
        }
    }

    /// Target table reference of an import (`schema.table` when a schema is set).
    pub fn target_table(&self) -> Option<String> {
        match &self.transfer {
            Transfer::Import { target, .. } => target.table_ref(),
            Transfer::Export { .. } => None,
        }
    }

    /// Target column names in mapping order.
    pub fn target_columns(&self) -> Vec<&str> {
        self.mappings.iter().map(|m| m.target.as_str()).collect()
    }
}

fn build(raw: RawDescriptor, path: &Path, base_dir: &Path) -> TransferResult<Descriptor> {
    let target_info = raw
        .target_info
        .ok_or_else(|| TransferError::config("missing TargetInfo"))?;

    let max_bytes_per_chunk = match &raw.max_bytes_per_chunk {
        None => DEFAULT_MAX_BYTES_PER_CHUNK,
        Some(v) => {
            let n = v.as_i64("MaxBytesPerChunk")?;
            if n <= 0 {
                return Err(TransferError::config(format!(
                    "MaxBytesPerChunk must be positive, got {n}"
                )));
            }
            n as usize
        }
    };

    let on_batch_error = raw
        .on_batch_error
        .as_deref()
        .map(|s| s.parse::<BatchErrorPolicy>().map_err(TransferError::config))
        .transpose()?;

    let mut sql_statements = raw
        .sql_statements
        .iter()
        .map(|s| {
            Ok(SqlStatement {
                sql: s.sql.clone(),
                order: order_of(&s.order, "SQLStatements.Order")?,
            })
        })
        .collect::<TransferResult<Vec<_>>>()?;
    sql_statements.sort_by_key(|s| s.order.unwrap_or(i64::MAX));

    let transfer = if target_info.connection.server.is_some() {
        build_import(raw.source_info, target_info, base_dir)?
    } else if target_info.file_name.is_some() {
        build_export(raw.source_info, target_info, base_dir)?
    } else {
        return Err(TransferError::config(
            "TargetInfo must contain DBServer (import) or FileName (export)",
        ));
    };

    let is_export = matches!(transfer, Transfer::Export { .. });
    let mut mappings = raw
        .col_mappings
        .iter()
        .enumerate()
        .map(|(idx, m)| build_mapping(idx, m, is_export))
        .collect::<TransferResult<Vec<_>>>()?;
    sort_specs(&mut mappings);

    if let Transfer::Export { target, .. } = &transfer {
        if target.partition_column.is_none() {
            for m in &mappings {
                let needs_partition = m
                    .dropdown_sql
                    .as_deref()
                    .is_some_and(|sql| QueryTemplate::parse(sql).has_partition_slot());
                if needs_partition {
                    return Err(TransferError::config(format!(
                        "DDListSQL for '{}' uses the partition placeholder but TargetInfo has no PartitionColumn",
                        m.target
                    )));
                }
            }
        }
    }

    if let Transfer::Import { source, .. } = &transfer {
        if mappings.is_empty() && sql_statements.is_empty() {
            return Err(TransferError::config("import needs ColMappings or SQLStatements"));
        }
        if !mappings.is_empty() && source.is_none() {
            return Err(TransferError::config("ColMappings require SourceInfo.Location"));
        }
    }

    Ok(Descriptor {
        path: path.to_path_buf(),
        transfer,
        mappings,
        sql_statements,
        max_bytes_per_chunk,
        on_batch_error,
    })
}

fn build_connection(raw: &RawConnection, base_dir: &Path) -> TransferResult<ConnectionInfo> {
    let server = raw
        .server
        .clone()
        .ok_or_else(|| TransferError::config("missing DBServer"))?;
    let dialect = match raw.dialect.as_deref() {
        Some(d) => d.parse::<Dialect>().map_err(TransferError::config)?,
        None => Dialect::default(),
    };
    let port = match &raw.port {
        None => None,
        Some(p) => {
            let n = p.as_i64("DBPort")?;
            Some(u16::try_from(n).map_err(|_| TransferError::config(format!("DBPort out of range: {n}")))?)
        }
    };
    // SQLite "servers" are files; keep them next to the descriptor like every other path.
    let server = if dialect == Dialect::Sqlite && server != ":memory:" {
        resolve_path(base_dir, &server).to_string_lossy().into_owned()
    } else {
        server
    };

    Ok(ConnectionInfo {
        server,
        port,
        schema: raw.schema.clone(),
        service: raw.service.clone(),
        user: raw.user.clone(),
        password: raw.password.clone(),
        table: raw.table.clone(),
        encoding: raw.encoding.clone().unwrap_or_else(|| "UTF-8".to_string()),
        dialect,
    })
}

fn build_import(
    source_info: Option<RawSourceInfo>,
    target_info: RawTargetInfo,
    base_dir: &Path,
) -> TransferResult<Transfer> {
    let target = build_connection(&target_info.connection, base_dir)?;
    let table = target
        .table_ref()
        .ok_or_else(|| TransferError::config("import TargetInfo requires TableName"))?;

    let source = match source_info {
        Some(si) if si.location.is_some() => Some(FileSource {
            location: resolve_path(base_dir, si.location.as_deref().unwrap_or_default()),
            delimiter: parse_delimiter(si.delimiter.as_deref())?,
            file_type: si.file_type.clone(),
            header: flag_or(&si.file_header, "FileHeader", false)?,
            sheet_name: si.sheet_name.clone(),
            single_quotes: flag_or(&si.quote_single, "QuoteSingle", false)?,
        }),
        _ => None,
    };

    Ok(Transfer::Import { source, target, table })
}

fn build_export(
    source_info: Option<RawSourceInfo>,
    target_info: RawTargetInfo,
    base_dir: &Path,
) -> TransferResult<Transfer> {
    let source_info = source_info.ok_or_else(|| TransferError::config("export requires SourceInfo"))?;
    let connection = build_connection(&source_info.connection, base_dir)?;
    let sql = source_info
        .sql
        .clone()
        .filter(|s| !s.trim().is_empty())
        .ok_or_else(|| TransferError::config("export SourceInfo requires SQL"))?;

    let target = WorkbookTarget {
        location: resolve_path(base_dir, target_info.location.as_deref().unwrap_or(".")),
        file_name: target_info.file_name.clone().unwrap_or_default(),
        sheet_name: target_info
            .sheet_name
            .clone()
            .unwrap_or_else(|| DEFAULT_SHEET_NAME.to_string()),
        partition_column: target_info.partition_column.clone(),
        date_format: target_info.date_format.clone().filter(|f| !f.trim().is_empty()),
        unlocked_columns: target_info.unlocked_columns.clone(),
        protect: flag_or(&target_info.protect_sheet, "ProtectSheet", true)?,
    };

    Ok(Transfer::Export {
        source: QuerySource { connection, sql },
        target,
    })
}

fn build_mapping(idx: usize, raw: &RawMapping, is_export: bool) -> TransferResult<MappingSpec> {
    let target = raw
        .target
        .clone()
        .filter(|t| !t.trim().is_empty())
        .ok_or_else(|| TransferError::config(format!("ColMappings[{idx}] is missing Target")))?;
    let rule: ColumnRule = raw.kind.as_deref().unwrap_or("S").parse()?;

    if let Some(template) = &raw.db_conversion {
        if !template.contains(CONVERSION_PLACEHOLDER) {
            return Err(TransferError::config(format!(
                "DB_CONVERSION for '{target}' has no '{CONVERSION_PLACEHOLDER}' placeholder"
            )));
        }
    }

    let dropdown_sql = if flag_or(&raw.dd_list, "DDList", false)? {
        if !is_export {
            return Err(TransferError::config(format!(
                "DDList on '{target}' is only valid for export descriptors"
            )));
        }
        let sql = raw
            .dd_list_sql
            .clone()
            .filter(|s| !s.trim().is_empty())
            .ok_or_else(|| TransferError::config(format!("DDList on '{target}' requires DDListSQL")))?;
        Some(sql)
    } else {
        None
    };

    Ok(MappingSpec {
        target,
        rule,
        source: raw.source.clone(),
        order: order_of(&raw.order, "ColMappings.Order")?,
        db_conversion: raw.db_conversion.clone(),
        dropdown_sql,
        position: 0,
    })
}

fn order_of(raw: &Option<Lenient>, key: &str) -> TransferResult<Option<i64>> {
    raw.as_ref().map_or(Ok(None), |o| o.as_opt_i64(key))
}

fn parse_delimiter(raw: Option<&str>) -> TransferResult<char> {
    let Some(raw) = raw else {
        return Ok(',');
    };
    if raw.eq_ignore_ascii_case("tab") || raw == "\\t" {
        return Ok('\t');
    }
    let mut chars = raw.chars();
    match (chars.next(), chars.next()) {
        (Some(c), None) if c.is_ascii() && c != '"' && c != '\n' && c != '\r' => Ok(c),
        _ => Err(TransferError::config(format!(
            "Delimiter must be a single ASCII character or \"tab\", got '{raw}'"
        ))),
    }
}

fn resolve_path(base_dir: &Path, location: &str) -> PathBuf {
    let p = Path::new(location);
    if p.is_absolute() { p.to_path_buf() } else { base_dir.join(p) }
}
