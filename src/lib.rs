//! `tabload` moves tabular data between delimited files/spreadsheets and a relational database,
//! driven by a JSON descriptor per job.
//!
//! The primary entrypoint is [`runner::Runner`], which expands a descriptor glob, validates every
//! descriptor up front and then imports or exports them one at a time.
//!
//! ## Import (file → table)
//!
//! - **Delimited text**: any single-byte delimiter (`tab` keyword for `\t`), optional header line,
//!   quoted spans may embed the delimiter
//! - **Spreadsheets**: `.xlsx`, `.xlsm`, `.xls`, `.xlsb`, `.ods`; hidden rows are skipped
//!
//! The input is read in byte-bounded chunks; each chunk becomes one multi-row insert committed on
//! its own. Every output column comes from a [`mapping::ColumnRule`]:
//!
//! - `DBF-<expr>`: SQL fragment, verbatim
//! - `C-<value>`: constant
//! - `S-datetime.now()`: the run's start timestamp
//! - `S-FILENAME.<i>.<j>`: slice of the input file name
//! - `S-ROWNUM`: row ordinal within the file
//! - `S`: a field of the row, by header name or by position
//!
//! ## Export (query → workbook)
//!
//! One workbook per partition value, bold frozen header, locked/unlocked columns, sheet
//! protection and dropdown lists fed by auxiliary queries.
//!
//! ## Quick example: load lines into SQLite
//!
//! ```rust
//! use std::io::Cursor;
//! use std::path::PathBuf;
//!
//! use tabload::database::{Database, QueryParams, SqliteDatabase};
//! use tabload::ingestion::{load_delimited, ImportOptions, LoadContext, LoadPlan};
//! use tabload::mapping::{sort_specs, ColumnRule, MappingSpec, RunTimestamp};
//! use tabload::tokenizer::RecordTokenizer;
//!
//! # fn main() -> Result<(), tabload::TransferError> {
//! let mut db = SqliteDatabase::open_in_memory()?;
//! db.execute("CREATE TABLE people (id TEXT, name TEXT, src TEXT)")?;
//! db.commit()?;
//!
//! let mut mappings = vec![
//!     MappingSpec::new("id", ColumnRule::SourceColumn).with_order(1),
//!     MappingSpec::new("name", ColumnRule::SourceColumn).with_order(2),
//!     MappingSpec::new("src", ColumnRule::FilenameSlice { start: 1, end: 3 }).with_order(3),
//! ];
//! sort_specs(&mut mappings);
//!
//! let plan = LoadPlan {
//!     table: "people",
//!     mappings: &mappings,
//!     tokenizer: RecordTokenizer::new('~'),
//!     has_header: true,
//!     source_file_name: "SCL_people.txt",
//!     run_started: RunTimestamp::now(),
//! };
//! let ctx = LoadContext {
//!     descriptor: PathBuf::from("people.json"),
//!     source: PathBuf::from("SCL_people.txt"),
//!     table: "people".to_string(),
//! };
//! let input = "id~name\n1~\"Ana~Maria\"\n2~Bo\n";
//! let stats = load_delimited(&mut db, Cursor::new(input), &plan, &ctx, &ImportOptions::default())?;
//! assert_eq!(stats.rows_loaded, 2);
//!
//! let rows = db.query("SELECT name, src FROM people ORDER BY id", &QueryParams::none())?;
//! assert_eq!(rows.rows[0][0].to_string(), "Ana~Maria");
//! assert_eq!(rows.rows[1][1].to_string(), "SCL");
//! # Ok(())
//! # }
//! ```
//!
//! ## Modules
//!
//! - [`descriptor`]: descriptor JSON → validated [`descriptor::Descriptor`]
//! - [`mapping`]: column rules and SQL literal building
//! - [`tokenizer`]: delimiter-aware line splitting
//! - [`ingestion`]: chunked import pipeline and spreadsheet preprocessing
//! - [`export`]: workbook export with dropdown lists
//! - [`database`]: database boundary, SQL dialects, SQLite driver
//! - [`runner`]: run modes and per-file failure handling
//! - [`error`]: error type shared by every stage

pub mod cli;
pub mod database;
pub mod descriptor;
pub mod error;
pub mod export;
pub mod ingestion;
pub mod mapping;
pub mod runner;
pub mod tokenizer;
pub mod types;

pub use error::{TransferError, TransferResult};
