use std::path::Path;

use tabload::database::Dialect;
use chrono::NaiveDate;

use tabload::descriptor::{Descriptor, Transfer};
use tabload::ingestion::BatchErrorPolicy;
use tabload::mapping::ColumnRule;
use tabload::TransferError;

fn config_message(err: TransferError) -> String {
    match err {
        TransferError::Config { message } => message,
        other => panic!("expected config error, got {other}"),
    }
}

#[test]
fn import_descriptor_is_sorted_and_resolved() {
    let d = Descriptor::load("tests/fixtures/import_people.json").unwrap();
    assert!(d.is_import());
    assert_eq!(d.target_columns(), vec!["id", "name", "country", "row_no", "loaded_at"]);
    assert_eq!(d.mappings[2].rule, ColumnRule::FilenameSlice { start: 1, end: 3 });
    assert_eq!(d.mappings[4].rule, ColumnRule::NowTimestamp);
    assert_eq!(d.max_bytes_per_chunk, 40);
    assert_eq!(d.on_batch_error, Some(BatchErrorPolicy::Continue));
    assert_eq!(d.target_table().as_deref(), Some("people"));

    let Transfer::Import { source, target, .. } = &d.transfer else {
        panic!("expected import");
    };
    let source = source.as_ref().unwrap();
    assert_eq!(source.location, Path::new("tests/fixtures").join("SCL_people.txt"));
    assert_eq!(source.delimiter, '~');
    assert!(source.header);
    assert_eq!(target.dialect, Dialect::Sqlite);
    assert_eq!(Path::new(&target.server), Path::new("tests/fixtures").join("people.db"));
}

#[test]
fn export_descriptor_carries_workbook_options() {
    let d = Descriptor::load("tests/fixtures/export_staff.json").unwrap();
    assert!(!d.is_import());
    let Transfer::Export { source, target } = &d.transfer else {
        panic!("expected export");
    };
    assert!(source.sql.starts_with("SELECT region"));
    assert_eq!(target.file_name, "staff.xlsx");
    assert_eq!(target.sheet_name, "Sheet1");
    assert_eq!(target.partition_column.as_deref(), Some("region"));
    assert_eq!(target.unlocked_columns, vec!["name"]);
    assert_eq!(target.date_format, None);
    assert!(!target.protect);
    assert!(d.mappings[0].dropdown_sql.is_some());
}

#[test]
fn default_date_format_keeps_plain_dates_plain() {
    let d = Descriptor::load("tests/fixtures/export_staff.json").unwrap();
    let Transfer::Export { target, .. } = &d.transfer else {
        panic!("expected export");
    };
    let day = NaiveDate::from_ymd_opt(2024, 2, 29).unwrap();
    assert_eq!(target.format_datetime(day.and_hms_opt(0, 0, 0).unwrap()), "2024-02-29");
    assert_eq!(target.format_datetime(day.and_hms_opt(7, 5, 0).unwrap()), "2024-02-29 07:05:00");

    let mut explicit = target.clone();
    explicit.date_format = Some("%d/%m/%Y %H:%M".to_string());
    assert_eq!(explicit.format_datetime(day.and_hms_opt(0, 0, 0).unwrap()), "29/02/2024 00:00");
}

#[test]
fn sql_only_descriptor_orders_statements_with_missing_last() {
    let d = Descriptor::load("tests/fixtures/sql_only.json").unwrap();
    assert!(d.is_sql_only());
    let orders: Vec<_> = d.sql_statements.iter().map(|s| s.order).collect();
    assert_eq!(orders, vec![Some(1), Some(2), None]);
    let conn = d.connection();
    assert_eq!(conn.dialect, Dialect::Oracle);
    assert_eq!(conn.port, Some(1521));
    assert_eq!(conn.describe(), "loader@db.example.internal:1521/ORCL");
    assert_eq!(d.target_table().as_deref(), Some("STAGE.LOADS"));
}

#[test]
fn unknown_mapping_type_is_fatal_at_load() {
    let msg = config_message(Descriptor::load("tests/fixtures/bad_type.json").unwrap_err());
    assert!(msg.contains("malformed descriptor"), "{msg}");
    assert!(msg.contains("unknown type 'X-upper'"), "{msg}");
}

#[test]
fn shape_is_inferred_from_target_keys() {
    let err = Descriptor::from_json_str(r#"{ "TargetInfo": { "Location": "out" } }"#, "job.json").unwrap_err();
    assert!(config_message(err).contains("DBServer"));

    let err = Descriptor::from_json_str(r#"{ "SourceInfo": { "Location": "a.txt" } }"#, "job.json").unwrap_err();
    assert!(config_message(err).contains("missing TargetInfo"));
}

#[test]
fn invalid_mapping_attributes_are_rejected() {
    let dd_on_import = r#"{
        "SourceInfo": { "Location": "a.txt" },
        "TargetInfo": { "DBServer": "h", "TableName": "t" },
        "ColMappings": [ { "Target": "a", "DDList": "yes", "DDListSQL": "SELECT 1" } ]
    }"#;
    assert!(config_message(Descriptor::from_json_str(dd_on_import, "j.json").unwrap_err()).contains("DDList"));

    let no_placeholder = r#"{
        "SourceInfo": { "Location": "a.txt" },
        "TargetInfo": { "DBServer": "h", "TableName": "t" },
        "ColMappings": [ { "Target": "a", "DB_CONVERSION": "UPPER(a)" } ]
    }"#;
    assert!(config_message(Descriptor::from_json_str(no_placeholder, "j.json").unwrap_err()).contains("DB_CONVERSION"));

    let slot_without_partition = r#"{
        "SourceInfo": { "DBServer": "h", "SQL": "SELECT a FROM t" },
        "TargetInfo": { "FileName": "out.xlsx" },
        "ColMappings": [ { "Target": "a", "DDList": "yes", "DDListSQL": "SELECT a FROM c WHERE r = ^" } ]
    }"#;
    assert!(
        config_message(Descriptor::from_json_str(slot_without_partition, "j.json").unwrap_err())
            .contains("PartitionColumn")
    );
}

#[test]
fn defaults_apply_when_keys_are_absent() {
    let json = r#"{
        "SourceInfo": { "Location": "in/loads.tsv", "Delimiter": "tab" },
        "TargetInfo": { "DBServer": "h", "TableName": "t" },
        "ColMappings": [ { "Target": "a" } ]
    }"#;
    let d = Descriptor::from_json_str(json, "/jobs/j.json").unwrap();
    assert_eq!(d.max_bytes_per_chunk, 16_000);
    assert_eq!(d.on_batch_error, None);
    assert_eq!(d.mappings[0].rule, ColumnRule::SourceColumn);
    let Transfer::Import { source: Some(source), target, .. } = &d.transfer else {
        panic!("expected import with source");
    };
    assert_eq!(source.delimiter, '\t');
    assert!(!source.header);
    assert_eq!(source.location, Path::new("/jobs/in/loads.tsv"));
    assert_eq!(target.encoding, "UTF-8");
    assert_eq!(target.dialect, Dialect::Oracle);
}

#[test]
fn non_positive_chunk_budget_is_rejected() {
    let json = r#"{
        "SourceInfo": { "Location": "a.txt" },
        "TargetInfo": { "DBServer": "h", "TableName": "t" },
        "ColMappings": [ { "Target": "a" } ],
        "MaxBytesPerChunk": 0
    }"#;
    assert!(config_message(Descriptor::from_json_str(json, "j.json").unwrap_err()).contains("MaxBytesPerChunk"));
}

#[test]
fn blank_order_counts_as_missing() {
    let json = r#"{
        "SourceInfo": { "Location": "a.txt" },
        "TargetInfo": { "DBServer": "h", "TableName": "t" },
        "ColMappings": [
            { "Target": "late", "Order": "" },
            { "Target": "first", "Order": "1" },
            { "Target": "zero", "Order": 0 }
        ],
        "SQLStatements": [ { "SQL": "b", "Order": " " }, { "SQL": "a", "Order": 3 } ]
    }"#;
    let d = Descriptor::from_json_str(json, "j.json").unwrap();
    assert_eq!(d.target_columns(), vec!["zero", "first", "late"]);
    assert_eq!(d.mappings[2].order, None);
    let sql: Vec<_> = d.sql_statements.iter().map(|s| s.sql.as_str()).collect();
    assert_eq!(sql, vec!["a", "b"]);

    let bad = json.replace(r#""Order": """#, r#""Order": "late""#);
    assert!(config_message(Descriptor::from_json_str(&bad, "j.json").unwrap_err()).contains("ColMappings.Order"));
}
