//! Export pipeline: query → workbook(s).
//!
//! The configured query runs once. Its column names become the bold, frozen header row and its
//! rows the data, optionally split into one workbook per value of a partition column (first-seen
//! order, partition column hidden). Columns marked with `DDList` get an in-cell dropdown whose
//! choices live in hidden rows below the data.

pub mod dropdown;

use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};

use rust_xlsxwriter::utility::column_number_to_name;
use rust_xlsxwriter::{ColNum, DataValidation, Format, Formula, RowNum, Workbook, Worksheet};

use crate::database::{Database, QueryParams};
use crate::descriptor::{Descriptor, Transfer, WorkbookTarget};
use crate::error::{TransferError, TransferResult};
use crate::types::{QueryResult, Value};

pub use dropdown::{dropdown_values, QueryTemplate, PARTITION_SLOT};

/// Last worksheet row (0-based) covered by dropdown validations.
pub const MAX_ROW: RowNum = 1_048_575;

/// Token in `FileName` replaced by the partition value.
pub const PARTITION_TOKEN: &str = "{partition}";

/// Workbooks written by one export.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExportSummary {
    pub files: Vec<PathBuf>,
    /// Data rows written across all workbooks.
    pub rows: usize,
}

/// One dropdown column: its position in the result and its choices query.
#[derive(Debug, Clone)]
struct DropdownColumn {
    col: ColNum,
    target: String,
    template: QueryTemplate,
}

/// Rows sharing one partition value (`None` when the export is not partitioned).
#[derive(Debug)]
struct Partition<'a> {
    value: Option<String>,
    rows: Vec<&'a [Value]>,
}

/// Run the export described by `descriptor`.
pub fn export_workbooks(db: &mut dyn Database, descriptor: &Descriptor) -> TransferResult<ExportSummary> {
    let Transfer::Export { source, target } = &descriptor.transfer else {
        return Err(TransferError::config(format!(
            "{} is not an export descriptor",
            descriptor.path.display()
        )));
    };

    log::info!("running export query of {}", descriptor.path.display());
    log::debug!("{}", source.sql);
    let result = db.query(&source.sql, &QueryParams::none())?;

    let partition_col = match &target.partition_column {
        None => None,
        Some(name) => Some(result.index_of(name).ok_or_else(|| {
            TransferError::config(format!("PartitionColumn '{name}' is not a column of the export query"))
        })?),
    };

    let dropdowns = descriptor
        .mappings
        .iter()
        .filter_map(|m| m.dropdown_sql.as_deref().map(|sql| (m, sql)))
        .map(|(m, sql)| {
            let col = result.index_of(&m.target).ok_or_else(|| {
                TransferError::config(format!("DDList column '{}' is not a column of the export query", m.target))
            })?;
            Ok(DropdownColumn {
                col: col_num(col)?,
                target: m.target.clone(),
                template: QueryTemplate::parse(sql),
            })
        })
        .collect::<TransferResult<Vec<_>>>()?;

    let partitions = partition_rows(&result, partition_col);
    if partitions.is_empty() {
        log::warn!("export query returned no rows to partition; no workbook written");
    }

    fs::create_dir_all(&target.location)?;
    let mut summary = ExportSummary::default();
    let mut taken: HashSet<String> = HashSet::new();
    for partition in &partitions {
        let mut lists = Vec::with_capacity(dropdowns.len());
        for dd in &dropdowns {
            let values = dropdown_values(db, &dd.template, partition.value.as_deref())?;
            if values.is_empty() {
                log::warn!("dropdown for '{}' has no values; no validation attached", dd.target);
            }
            lists.push((dd.col, values));
        }

        let name = partitioned_file_name(&target.file_name, partition.value.as_deref());
        let unique = disambiguate(&name, &taken);
        if unique != name {
            log::warn!(
                "partition {:?} maps to {name}, already written in this export; using {unique}",
                partition.value.as_deref().unwrap_or_default()
            );
        }
        let path = target.location.join(&unique);
        taken.insert(unique);
        write_workbook(&path, target, &result.columns, &partition.rows, partition_col, &lists)?;
        log::info!("wrote {} ({} rows)", path.display(), partition.rows.len());

        summary.rows += partition.rows.len();
        summary.files.push(path);
    }
    Ok(summary)
}

fn partition_rows(result: &QueryResult, partition_col: Option<usize>) -> Vec<Partition<'_>> {
    let Some(idx) = partition_col else {
        return vec![Partition {
            value: None,
            rows: result.rows.iter().map(Vec::as_slice).collect(),
        }];
    };

    let mut partitions: Vec<Partition<'_>> = Vec::new();
    let mut seen: HashMap<String, usize> = HashMap::new();
    for row in &result.rows {
        let key = row.get(idx).map(Value::to_string).unwrap_or_default();
        let slot = *seen.entry(key.clone()).or_insert_with(|| {
            partitions.push(Partition {
                value: Some(key),
                rows: Vec::new(),
            });
            partitions.len() - 1
        });
        partitions[slot].rows.push(row.as_slice());
    }
    partitions
}

/// Output file name for one partition.
///
/// `{partition}` in `file_name` is replaced by the sanitized value; otherwise `_<value>` is
/// inserted before the extension. A missing extension becomes `.xlsx`.
pub fn partitioned_file_name(file_name: &str, partition: Option<&str>) -> String {
    let file_name = if Path::new(file_name).extension().is_some() {
        file_name.to_string()
    } else {
        format!("{file_name}.xlsx")
    };
    let Some(value) = partition else {
        return file_name.replace(PARTITION_TOKEN, "");
    };
    let value = sanitize(value);
    if file_name.contains(PARTITION_TOKEN) {
        return file_name.replace(PARTITION_TOKEN, &value);
    }
    match file_name.rsplit_once('.') {
        Some((stem, ext)) => format!("{stem}_{value}.{ext}"),
        None => format!("{file_name}_{value}"),
    }
}

/// `file_name`, or `<stem>_<n>.<ext>` with the smallest `n >= 2` not in `taken`.
fn disambiguate(file_name: &str, taken: &HashSet<String>) -> String {
    if !taken.contains(file_name) {
        return file_name.to_string();
    }
    let (stem, ext) = match file_name.rsplit_once('.') {
        Some((stem, ext)) => (stem, format!(".{ext}")),
        None => (file_name, String::new()),
    };
    (2usize..)
        .map(|n| format!("{stem}_{n}{ext}"))
        .find(|candidate| !taken.contains(candidate))
        .unwrap_or_else(|| file_name.to_string())
}

fn sanitize(value: &str) -> String {
    let cleaned: String = value
        .chars()
        .map(|c| if c.is_alphanumeric() || matches!(c, '-' | '_' | '.' | ' ') { c } else { '_' })
        .collect();
    if cleaned.trim().is_empty() { "blank".to_string() } else { cleaned }
}

fn col_num(idx: usize) -> TransferResult<ColNum> {
    ColNum::try_from(idx).map_err(|_| TransferError::config(format!("column index {idx} exceeds the worksheet width")))
}

fn write_workbook(
    path: &Path,
    target: &WorkbookTarget,
    columns: &[String],
    rows: &[&[Value]],
    partition_col: Option<usize>,
    dropdowns: &[(ColNum, Vec<String>)],
) -> TransferResult<()> {
    let header_format = Format::new().set_bold();
    let locked = Format::new();
    let unlocked = Format::new().set_unlocked();
    let is_unlocked: Vec<bool> = columns
        .iter()
        .map(|c| target.unlocked_columns.iter().any(|u| u == c))
        .collect();

    let mut workbook = Workbook::new();
    let sheet = workbook.add_worksheet();
    sheet.set_name(&target.sheet_name)?;

    for (idx, name) in columns.iter().enumerate() {
        let col = col_num(idx)?;
        sheet.write_string_with_format(0, col, name, &header_format)?;
        if is_unlocked[idx] {
            sheet.set_column_format(col, &unlocked)?;
        }
    }
    sheet.set_freeze_panes(1, 0)?;

    for (r, row) in rows.iter().enumerate() {
        let row_num = row_num(r + 1)?;
        for (idx, value) in row.iter().enumerate() {
            let format = if is_unlocked.get(idx).copied().unwrap_or(false) { &unlocked } else { &locked };
            write_value(sheet, row_num, col_num(idx)?, value, format, target)?;
        }
    }

    if let Some(idx) = partition_col {
        sheet.set_column_hidden(col_num(idx)?)?;
    }

    // Dropdown choices go right below the data; those rows are hidden.
    let pool_start = row_num(rows.len() + 1)?;
    let mut pool_len = 0usize;
    for (col, values) in dropdowns.iter().filter(|(_, v)| !v.is_empty()) {
        for (k, value) in values.iter().enumerate() {
            sheet.write_string(pool_start + row_num(k)?, *col, value)?;
        }
        pool_len = pool_len.max(values.len());

        let letter = column_number_to_name(*col);
        let source = format!(
            "=${letter}${}:${letter}${}",
            pool_start + 1,
            pool_start + row_num(values.len())?
        );
        let validation = DataValidation::new().allow_list_formula(Formula::new(source));
        sheet.add_data_validation(1, *col, MAX_ROW, *col, &validation)?;
    }
    for k in 0..pool_len {
        sheet.set_row_hidden(pool_start + row_num(k)?)?;
    }

    if target.protect {
        sheet.protect();
    }

    workbook.save(path)?;
    Ok(())
}

fn row_num(idx: usize) -> TransferResult<RowNum> {
    RowNum::try_from(idx)
        .ok()
        .filter(|r| *r <= MAX_ROW)
        .ok_or_else(|| TransferError::config(format!("row index {idx} exceeds the worksheet height")))
}

fn write_value(
    sheet: &mut Worksheet,
    row: RowNum,
    col: ColNum,
    value: &Value,
    format: &Format,
    target: &WorkbookTarget,
) -> TransferResult<()> {
    match value {
        Value::Null => sheet.write_blank(row, col, format)?,
        Value::Int64(v) => sheet.write_number_with_format(row, col, *v as f64, format)?,
        Value::Float64(v) => sheet.write_number_with_format(row, col, *v, format)?,
        Value::Utf8(s) => sheet.write_string_with_format(row, col, s, format)?,
        Value::DateTime(dt) => sheet.write_string_with_format(row, col, target.format_datetime(*dt), format)?,
    };
    Ok(())
}
