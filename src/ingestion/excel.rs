//! Spreadsheet → delimited text.
//!
//! The import pipeline only understands delimited lines, so a spreadsheet source is first
//! rewritten into a temporary text file that the regular tokenizer can read:
//!
//! - one physical line per visible sheet row (rows hidden in `.xlsx`/`.xlsm` workbooks are left
//!   out, fully empty rows too)
//! - every cell stringified, integral numbers without a fractional part
//! - empty cells written as a single blank, which the tokenizer reads back as an empty field
//! - fields containing the delimiter or a quote are quoted by the `csv` writer
//! - embedded line breaks flattened to spaces
//! - date cells as `YYYY-MM-DD HH:MM:SS` in the workbook's date system (1900 or 1904),
//!   duration cells as `[h]:mm:ss`
//!
//! Cell values are not otherwise transformed.

use std::collections::{HashMap, HashSet};
use std::fs::File;
use std::io::Read;
use std::path::Path;
use std::sync::LazyLock;

use calamine::{open_workbook_auto, Data, ExcelDateTime, Reader};
use chrono::NaiveDate;
use csv::{QuoteStyle, Terminator, WriterBuilder};
use regex::Regex;
use tempfile::NamedTempFile;

use crate::error::{TransferError, TransferResult};

static SHEET_TAG: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"<sheet\b[^>]*>").expect("valid regex"));
static REL_TAG: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"<Relationship\b[^>]*>").expect("valid regex"));
static ROW_TAG: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"<row\b[^>]*>").expect("valid regex"));
static ATTR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"\s([A-Za-z_][\w:.-]*)\s*=\s*"([^"]*)""#).expect("valid regex"));

/// Spreadsheet rewritten as delimited text. The file is removed on drop.
#[derive(Debug)]
pub struct DelimitedCopy {
    file: NamedTempFile,
    /// Sheet that was converted.
    pub sheet: String,
    /// Lines written (header included).
    pub rows_written: usize,
    /// Rows left out because the workbook marks them hidden.
    pub rows_hidden: usize,
}

impl DelimitedCopy {
    pub fn path(&self) -> &Path {
        self.file.path()
    }

    /// Reopen the text for reading.
    pub fn reopen(&self) -> TransferResult<File> {
        Ok(self.file.reopen()?)
    }
}

/// Convert `sheet_name` (or the first sheet) of the workbook at `path` into delimited text.
pub fn spreadsheet_to_delimited(
    path: impl AsRef<Path>,
    sheet_name: Option<&str>,
    delimiter: char,
) -> TransferResult<DelimitedCopy> {
    let path = path.as_ref();
    let delimiter = u8::try_from(delimiter)
        .ok()
        .filter(u8::is_ascii)
        .ok_or_else(|| TransferError::config(format!("delimiter '{delimiter}' is not a single byte")))?;

    let mut workbook = open_workbook_auto(path)?;
    let sheet = match sheet_name {
        Some(name) => name.to_string(),
        None => workbook
            .sheet_names()
            .first()
            .cloned()
            .ok_or_else(|| TransferError::config(format!("workbook {} has no sheets", path.display())))?,
    };
    let range = workbook.worksheet_range(&sheet)?;
    let hidden = hidden_rows(path, &sheet)?;
    // Absolute (0-based) sheet row of the range's first row.
    let first_row = range.start().map_or(0, |(row, _)| row);

    let mut file = tempfile::Builder::new()
        .prefix("tabload-")
        .suffix(".txt")
        .tempfile()?;
    let mut rows_written = 0;
    let mut rows_hidden = 0;
    {
        let mut writer = WriterBuilder::new()
            .delimiter(delimiter)
            .quote_style(QuoteStyle::Necessary)
            .terminator(Terminator::Any(b'\n'))
            .has_headers(false)
            .flexible(true)
            .from_writer(file.as_file_mut());

        for (idx, row) in range.rows().enumerate() {
            let sheet_row = first_row + idx as u32 + 1;
            if hidden.contains(&sheet_row) {
                rows_hidden += 1;
                continue;
            }
            if row.iter().all(|c| matches!(c, Data::Empty)) {
                continue;
            }
            writer.write_record(row.iter().map(cell_text))?;
            rows_written += 1;
        }
        writer.flush()?;
    }
    let out = DelimitedCopy {
        file,
        sheet,
        rows_written,
        rows_hidden,
    };

    log::info!(
        "converted sheet '{}' of {} to {} ({} rows, {} hidden rows skipped)",
        out.sheet,
        path.display(),
        out.path().display(),
        out.rows_written,
        out.rows_hidden
    );
    Ok(out)
}

/// Text written for one cell.
fn cell_text(c: &Data) -> String {
    let text = match c {
        Data::Empty => return " ".to_string(),
        Data::String(s) => s.clone(),
        Data::Float(f) if f.fract() == 0.0 && f.abs() < i64::MAX as f64 => (*f as i64).to_string(),
        Data::DateTime(dt) => excel_datetime_text(dt),
        Data::DateTimeIso(s) | Data::DurationIso(s) => s.clone(),
        other => other.to_string(),
    };
    if text.contains(['\n', '\r']) {
        text.replace("\r\n", " ").replace(['\n', '\r'], " ")
    } else {
        text
    }
}

/// Render an Excel date/time cell: timestamps in the workbook's date system, durations as
/// `[h]:mm:ss`.
fn excel_datetime_text(dt: &ExcelDateTime) -> String {
    if dt.is_duration() {
        return duration_text(dt.as_f64());
    }
    let (year, month, day, hour, minute, second, _millis) = dt.to_ymd_hms_milli();
    NaiveDate::from_ymd_opt(year.into(), month.into(), day.into())
        .and_then(|d| d.and_hms_opt(hour.into(), minute.into(), second.into()))
        .map_or_else(|| dt.as_f64().to_string(), |ts| ts.format("%Y-%m-%d %H:%M:%S").to_string())
}

/// Duration in days as total hours, minutes and seconds.
fn duration_text(days: f64) -> String {
    let total = (days * 86_400.0).round() as i64;
    let sign = if total < 0 { "-" } else { "" };
    let secs = total.unsigned_abs();
    format!("{sign}{}:{:02}:{:02}", secs / 3600, secs / 60 % 60, secs % 60)
}

/// 1-based row numbers the workbook marks hidden on `sheet`.
///
/// Only Office Open XML workbooks carry this in a form we read; other formats report none.
pub fn hidden_rows(path: &Path, sheet: &str) -> TransferResult<HashSet<u32>> {
    let is_ooxml = path
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("xlsx") || e.eq_ignore_ascii_case("xlsm"));
    if !is_ooxml {
        return Ok(HashSet::new());
    }

    let mut archive = zip::ZipArchive::new(File::open(path)?)?;
    let workbook_xml = read_entry(&mut archive, "xl/workbook.xml")?;
    let rels_xml = read_entry(&mut archive, "xl/_rels/workbook.xml.rels")?;

    let Some(rel_id) = SHEET_TAG
        .find_iter(&workbook_xml)
        .map(|m| attributes(m.as_str()))
        .find(|attrs| attrs.get("name").map(|n| unescape_xml(n)) == Some(sheet.to_string()))
        .and_then(|attrs| attrs.get("r:id").cloned())
    else {
        return Ok(HashSet::new());
    };

    let Some(target) = REL_TAG
        .find_iter(&rels_xml)
        .map(|m| attributes(m.as_str()))
        .find(|attrs| attrs.get("Id") == Some(&rel_id))
        .and_then(|attrs| attrs.get("Target").cloned())
    else {
        return Ok(HashSet::new());
    };
    let entry = match target.strip_prefix('/') {
        Some(absolute) => absolute.to_string(),
        None => format!("xl/{target}"),
    };

    let sheet_xml = read_entry(&mut archive, &entry)?;
    Ok(ROW_TAG
        .find_iter(&sheet_xml)
        .map(|m| attributes(m.as_str()))
        .filter(|attrs| matches!(attrs.get("hidden").map(String::as_str), Some("1" | "true")))
        .filter_map(|attrs| attrs.get("r").and_then(|r| r.parse().ok()))
        .collect())
}

fn read_entry(archive: &mut zip::ZipArchive<File>, name: &str) -> TransferResult<String> {
    let mut entry = archive.by_name(name)?;
    let mut text = String::new();
    entry.read_to_string(&mut text)?;
    Ok(text)
}

fn attributes(tag: &str) -> HashMap<String, String> {
    ATTR.captures_iter(tag)
        .map(|c| (c[1].to_string(), c[2].to_string()))
        .collect()
}

fn unescape_xml(s: &str) -> String {
    s.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&apos;", "'")
        .replace("&amp;", "&")
}
