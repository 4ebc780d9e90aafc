use std::collections::HashSet;
use std::fs;
use std::path::Path;

use rust_xlsxwriter::Workbook;
use serde_json::json;

use tabload::database::{Database, QueryParams, SqliteConnector, SqliteDatabase};
use tabload::ingestion::excel::{hidden_rows, spreadsheet_to_delimited};
use tabload::runner::{Outcome, RunConfig, Runner};
use tabload::tokenizer::RecordTokenizer;
use tabload::types::Value;

/// Header, a visible row, a hidden row, a blank row and a row with a multi-line cell and a gap.
fn write_scores(path: &Path) {
    let mut workbook = Workbook::new();
    let summary = workbook.add_worksheet();
    summary.set_name("Summary").unwrap();
    summary.write_string(0, 0, "ignored").unwrap();

    let sheet = workbook.add_worksheet();
    sheet.set_name("Scores").unwrap();
    sheet.write_string(0, 0, "id").unwrap();
    sheet.write_string(0, 1, "name").unwrap();
    sheet.write_string(0, 2, "score").unwrap();

    sheet.write_number(1, 0, 1.0).unwrap();
    sheet.write_string(1, 1, "Smith, J").unwrap();
    sheet.write_number(1, 2, 2.5).unwrap();

    sheet.write_number(2, 0, 2.0).unwrap();
    sheet.write_string(2, 1, "Hidden").unwrap();
    sheet.write_number(2, 2, 0.0).unwrap();
    sheet.set_row_hidden(2).unwrap();

    sheet.write_number(4, 0, 3.0).unwrap();
    sheet.write_string(4, 1, "two\nlines").unwrap();

    workbook.save(path).unwrap();
}

fn tokenized(path: &Path, delimiter: char) -> Vec<Vec<String>> {
    let tokenizer = RecordTokenizer::new(delimiter);
    fs::read_to_string(path)
        .unwrap()
        .lines()
        .map(|line| tokenizer.split(line))
        .collect()
}

#[test]
fn hidden_and_empty_rows_are_left_out() {
    let dir = tempfile::tempdir().unwrap();
    let book = dir.path().join("scores.xlsx");
    write_scores(&book);

    assert_eq!(hidden_rows(&book, "Scores").unwrap(), HashSet::from([3]));
    assert!(hidden_rows(&book, "Summary").unwrap().is_empty());

    let copy = spreadsheet_to_delimited(&book, Some("Scores"), ',').unwrap();
    assert_eq!(copy.sheet, "Scores");
    assert_eq!(copy.rows_written, 3);
    assert_eq!(copy.rows_hidden, 1);

    assert_eq!(
        tokenized(copy.path(), ','),
        vec![
            vec!["id", "name", "score"],
            vec!["1", "Smith, J", "2.5"],
            vec!["3", "two lines", ""],
        ]
    );

    let temp = copy.path().to_path_buf();
    drop(copy);
    assert!(!temp.exists());
}

#[test]
fn first_sheet_is_the_default() {
    let dir = tempfile::tempdir().unwrap();
    let book = dir.path().join("scores.xlsx");
    write_scores(&book);

    let copy = spreadsheet_to_delimited(&book, None, '|').unwrap();
    assert_eq!(copy.sheet, "Summary");
    assert_eq!(fs::read_to_string(copy.path()).unwrap(), "ignored\n");
}

#[test]
fn missing_sheet_is_an_error() {
    let dir = tempfile::tempdir().unwrap();
    let book = dir.path().join("scores.xlsx");
    write_scores(&book);
    assert!(spreadsheet_to_delimited(&book, Some("Nope"), ',').is_err());
}

#[test]
fn spreadsheet_source_imports_through_the_runner() {
    let dir = tempfile::tempdir().unwrap();
    let book = dir.path().join("scores.xlsx");
    write_scores(&book);
    let db_path = dir.path().join("scores.db");
    let mut db = SqliteDatabase::open(&db_path).unwrap();
    db.execute("CREATE TABLE scores (id INTEGER, name TEXT, score REAL, src TEXT)").unwrap();
    db.commit().unwrap();

    let descriptor = dir.path().join("scores.json");
    let json = json!({
        "SourceInfo": {
            "Location": book.to_string_lossy(),
            "FileType": "excel",
            "SheetName": "Scores",
            "Delimiter": "~",
            "FileHeader": "yes"
        },
        "TargetInfo": { "DBServer": db_path.to_string_lossy(), "Dialect": "sqlite", "TableName": "scores" },
        "ColMappings": [
            { "Target": "id", "Order": 1 },
            { "Target": "name", "Order": 2 },
            { "Target": "score", "Order": 3 },
            { "Target": "src", "Type": "S-FILENAME.1.6", "Order": 4 }
        ]
    });
    fs::write(&descriptor, json.to_string()).unwrap();

    let summary = Runner::new(
        RunConfig::new(descriptor.to_string_lossy()).with_error_log_dir(dir.path()),
        &SqliteConnector,
    )
    .run(&mut Vec::new())
    .unwrap();
    assert!(matches!(summary.outcomes[0].outcome, Outcome::Imported(s) if s.rows_loaded == 2));

    let rows = db
        .query("SELECT id, name, score, src FROM scores ORDER BY id", &QueryParams::none())
        .unwrap()
        .rows;
    assert_eq!(
        rows,
        vec![
            vec![Value::Int64(1), Value::Utf8("Smith, J".into()), Value::Float64(2.5), Value::Utf8("scores".into())],
            vec![Value::Int64(3), Value::Utf8("two lines".into()), Value::Utf8(String::new()), Value::Utf8("scores".into())],
        ]
    );
}
