use std::fs;
use std::path::{Path, PathBuf};

use serde_json::json;

use tabload::database::{Database, QueryParams, SqliteConnector, SqliteDatabase};
use tabload::runner::{Outcome, RunConfig, RunMode, Runner};
use tabload::types::Value;
use tabload::TransferError;

fn fixture(name: &str) -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures").join(name)
}

fn write_descriptor(dir: &Path, name: &str, value: serde_json::Value) -> PathBuf {
    let path = dir.join(name);
    fs::write(&path, serde_json::to_string_pretty(&value).unwrap()).unwrap();
    path
}

fn people_import(dir: &Path) -> PathBuf {
    write_descriptor(
        dir,
        "people.json",
        json!({
            "SourceInfo": {
                "Location": fixture("SCL_people.txt").to_string_lossy(),
                "Delimiter": "~",
                "FileHeader": "yes"
            },
            "TargetInfo": {
                "DBServer": dir.join("people.db").to_string_lossy(),
                "Dialect": "sqlite",
                "TableName": "people"
            },
            "ColMappings": [
                { "Target": "id", "Order": 1 },
                { "Target": "name", "Order": 2 },
                { "Target": "country", "Type": "C-CL", "Order": 3 }
            ]
        }),
    )
}

fn count(db_path: &Path, sql: &str) -> Vec<Vec<Value>> {
    SqliteDatabase::open(db_path)
        .unwrap()
        .query(sql, &QueryParams::none())
        .unwrap()
        .rows
}

#[test]
fn bootstrap_recreates_the_table_before_each_load() {
    let dir = tempfile::tempdir().unwrap();
    let descriptor = people_import(dir.path());
    let db_path = dir.path().join("people.db");
    let config = || {
        RunConfig::new(descriptor.to_string_lossy())
            .with_mode(RunMode::Bootstrap(fixture("bootstrap.sql")))
            .with_error_log_dir(dir.path())
    };

    // The drop fails on an empty database and is ignored.
    let summary = Runner::new(config(), &SqliteConnector).run(&mut Vec::new()).unwrap();
    assert!(matches!(summary.outcomes[0].outcome, Outcome::Imported(s) if s.rows_loaded == 5));

    // A second bootstrap starts from an empty table, so the primary keys do not collide.
    let summary = Runner::new(config(), &SqliteConnector).run(&mut Vec::new()).unwrap();
    assert!(!summary.has_failures());

    let rows = count(&db_path, "SELECT COUNT(*), MIN(country) FROM people");
    assert_eq!(rows, vec![vec![Value::Int64(5), Value::Utf8("CL".into())]]);
    let index = count(&db_path, "SELECT name FROM sqlite_master WHERE type = 'index' AND name = 'people_country'");
    assert_eq!(index.len(), 1);
}

#[test]
fn missing_bootstrap_script_fails_before_connecting() {
    let dir = tempfile::tempdir().unwrap();
    let descriptor = people_import(dir.path());
    let config = RunConfig::new(descriptor.to_string_lossy())
        .with_mode(RunMode::Bootstrap(dir.path().join("nope.sql")));

    let err = Runner::new(config, &SqliteConnector).run(&mut Vec::new()).unwrap_err();
    assert!(matches!(err, TransferError::Io(_)), "{err}");
    assert!(!dir.path().join("people.db").exists());
}

#[test]
fn execute_sql_runs_statements_in_order() {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("audit.db");
    let descriptor = write_descriptor(
        dir.path(),
        "audit.json",
        json!({
            "SourceInfo": { "Location": "unused.txt" },
            "TargetInfo": { "DBServer": db_path.to_string_lossy(), "Dialect": "sqlite", "TableName": "audit" },
            "ColMappings": [ { "Target": "step" } ],
            "SQLStatements": [
                { "SQL": "INSERT INTO audit VALUES ('second');", "Order": 2 },
                { "SQL": "INSERT INTO audit VALUES ('last')" },
                { "SQL": "CREATE TABLE audit (step TEXT)", "Order": 1 }
            ]
        }),
    );

    let config = RunConfig::new(descriptor.to_string_lossy()).with_mode(RunMode::ExecuteSql);
    let summary = Runner::new(config, &SqliteConnector).run(&mut Vec::new()).unwrap();
    assert_eq!(summary.outcomes[0].outcome, Outcome::SqlExecuted(3));

    let steps = count(&db_path, "SELECT step FROM audit ORDER BY rowid");
    assert_eq!(
        steps,
        vec![vec![Value::Utf8("second".into())], vec![Value::Utf8("last".into())]]
    );
}

#[test]
fn statements_returning_rows_are_accepted() {
    let dir = tempfile::tempdir().unwrap();
    let descriptor = write_descriptor(
        dir.path(),
        "inspect.json",
        json!({
            "TargetInfo": { "DBServer": dir.path().join("i.db").to_string_lossy(), "Dialect": "sqlite", "TableName": "t" },
            "SQLStatements": [
                { "SQL": "CREATE TABLE t (a INTEGER)", "Order": 1 },
                { "SQL": "PRAGMA table_info(t)", "Order": 2 },
                { "SQL": "SELECT COUNT(*) FROM t;", "Order": 3 }
            ]
        }),
    );
    let config = RunConfig::new(descriptor.to_string_lossy()).with_mode(RunMode::ExecuteSql);
    let summary = Runner::new(config, &SqliteConnector).run(&mut Vec::new()).unwrap();
    assert_eq!(summary.outcomes[0].outcome, Outcome::SqlExecuted(3));
}

#[test]
fn failing_statement_stops_the_run() {
    let dir = tempfile::tempdir().unwrap();
    let descriptor = write_descriptor(
        dir.path(),
        "broken.json",
        json!({
            "TargetInfo": { "DBServer": dir.path().join("b.db").to_string_lossy(), "Dialect": "sqlite", "TableName": "t" },
            "SQLStatements": [ { "SQL": "INSERT INTO missing VALUES (1)" } ]
        }),
    );
    let err = Runner::new(RunConfig::new(descriptor.to_string_lossy()), &SqliteConnector)
        .run(&mut Vec::new())
        .unwrap_err();
    assert!(!err.is_file_scoped(), "{err}");
}

#[test]
fn sql_only_descriptor_runs_in_transfer_mode() {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("s.db");
    let descriptor = write_descriptor(
        dir.path(),
        "setup.json",
        json!({
            "TargetInfo": { "DBServer": db_path.to_string_lossy(), "Dialect": "sqlite", "TableName": "flags" },
            "SQLStatements": [
                { "SQL": "CREATE TABLE flags (name TEXT)", "Order": 0 },
                { "SQL": "INSERT INTO flags VALUES ('ready')", "Order": 1 }
            ]
        }),
    );
    let summary = Runner::new(RunConfig::new(descriptor.to_string_lossy()), &SqliteConnector)
        .run(&mut Vec::new())
        .unwrap();
    assert_eq!(summary.outcomes[0].outcome, Outcome::SqlExecuted(2));
    assert_eq!(count(&db_path, "SELECT name FROM flags"), vec![vec![Value::Utf8("ready".into())]]);
}

#[test]
fn select_all_prints_each_row() {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("people.db");
    let mut db = SqliteDatabase::open(&db_path).unwrap();
    db.execute("CREATE TABLE people (id INTEGER, name TEXT, country TEXT)").unwrap();
    db.execute("INSERT INTO people VALUES (1, 'Ana', 'CL'), (22, 'Bo', NULL)").unwrap();
    db.commit().unwrap();
    drop(db);

    let descriptor = people_import(dir.path());
    let config = RunConfig::new(descriptor.to_string_lossy()).with_mode(RunMode::SelectAll);
    let mut out = Vec::new();
    let summary = Runner::new(config, &SqliteConnector).run(&mut out).unwrap();

    assert_eq!(summary.outcomes[0].outcome, Outcome::Dumped(2));
    let text = String::from_utf8(out).unwrap();
    let lines: Vec<_> = text.lines().collect();
    assert_eq!(lines.len(), 2);
    assert_eq!(lines[0].split_whitespace().collect::<Vec<_>>(), vec!["1", "Ana", "CL"]);
    assert_eq!(lines[1].split_whitespace().collect::<Vec<_>>(), vec!["22", "Bo"]);
    assert!(lines[0].starts_with("1  Ana"));
}

#[test]
fn non_sqlite_targets_cannot_be_opened() {
    let err = Runner::new(
        RunConfig::new(fixture("sql_only.json").to_string_lossy()),
        &SqliteConnector,
    )
    .run(&mut Vec::new())
    .unwrap_err();
    assert!(matches!(err, TransferError::Connection { .. }), "{err}");
    assert!(err.to_string().contains("db.example.internal"));
}

#[test]
fn unmatched_pattern_is_a_config_error() {
    let dir = tempfile::tempdir().unwrap();
    let pattern = dir.path().join("*.json");
    let err = Runner::new(RunConfig::new(pattern.to_string_lossy()), &SqliteConnector)
        .run(&mut Vec::new())
        .unwrap_err();
    assert!(matches!(err, TransferError::Config { .. }), "{err}");
}

#[test]
fn invalid_descriptor_stops_the_run_before_any_transfer() {
    let dir = tempfile::tempdir().unwrap();
    let good = people_import(dir.path());
    fs::copy(fixture("bad_type.json"), dir.path().join("z-bad.json")).unwrap();
    let pattern = good.with_file_name("*.json");

    let err = Runner::new(RunConfig::new(pattern.to_string_lossy()), &SqliteConnector)
        .run(&mut Vec::new())
        .unwrap_err();
    assert!(matches!(err, TransferError::Config { .. }), "{err}");
    assert!(!dir.path().join("people.db").exists());
}
