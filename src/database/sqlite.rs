//! SQLite driver (bundled `rusqlite`).

use std::path::Path;

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use rusqlite::types::{ToSql, ValueRef};
use rusqlite::Connection;

use crate::descriptor::ConnectionInfo;
use crate::error::{TransferError, TransferResult};
use crate::types::{QueryResult, Value};

use super::{Connector, Database, Dialect, QueryParams};

const DATETIME_FORMATS: &[&str] = &["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M:%S%.f"];

/// [`Database`] over a single SQLite connection.
#[derive(Debug)]
pub struct SqliteDatabase {
    conn: Connection,
}

impl SqliteDatabase {
    /// Open (or create) the database file at `path`.
    pub fn open(path: impl AsRef<Path>) -> TransferResult<Self> {
        let path = path.as_ref();
        let conn = Connection::open(path).map_err(|e| {
            TransferError::connection(format!("cannot open sqlite database {}: {e}", path.display()))
        })?;
        Ok(Self { conn })
    }

    pub fn open_in_memory() -> TransferResult<Self> {
        let conn = Connection::open_in_memory().map_err(|e| TransferError::connection(e.to_string()))?;
        Ok(Self { conn })
    }

    /// Direct access to the underlying connection.
    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    fn begin_if_needed(&mut self) -> TransferResult<()> {
        if self.conn.is_autocommit() {
            self.conn.execute_batch("BEGIN")?;
        }
        Ok(())
    }
}

impl Database for SqliteDatabase {
    fn dialect(&self) -> Dialect {
        Dialect::Sqlite
    }

    fn execute(&mut self, sql: &str) -> TransferResult<usize> {
        self.begin_if_needed()?;
        Ok(self.conn.execute(sql, [])?)
    }

    fn execute_statement(&mut self, sql: &str) -> TransferResult<()> {
        self.begin_if_needed()?;
        let mut stmt = self.conn.prepare(sql)?;
        let mut rows = stmt.query([])?;
        while rows.next()?.is_some() {}
        Ok(())
    }

    fn query(&mut self, sql: &str, params: &QueryParams) -> TransferResult<QueryResult> {
        let mut stmt = self.conn.prepare(sql)?;
        let columns: Vec<(String, Option<String>)> = stmt
            .columns()
            .iter()
            .map(|c| (c.name().to_string(), c.decl_type().map(|t| t.to_ascii_uppercase())))
            .collect();

        let named: Vec<(&str, &dyn ToSql)> = params
            .pairs()
            .iter()
            .map(|(name, value)| (name.as_str(), value as &dyn ToSql))
            .collect();

        let mut rows = stmt.query(named.as_slice())?;
        let mut out = Vec::new();
        while let Some(row) = rows.next()? {
            let mut values = Vec::with_capacity(columns.len());
            for (idx, (_, decl_type)) in columns.iter().enumerate() {
                values.push(convert_value(row.get_ref(idx)?, decl_type.as_deref()));
            }
            out.push(values);
        }

        Ok(QueryResult::new(
            columns.into_iter().map(|(name, _)| name).collect(),
            out,
        ))
    }

    fn commit(&mut self) -> TransferResult<()> {
        if !self.conn.is_autocommit() {
            self.conn.execute_batch("COMMIT")?;
        }
        Ok(())
    }

    fn rollback(&mut self) -> TransferResult<()> {
        if !self.conn.is_autocommit() {
            self.conn.execute_batch("ROLLBACK")?;
        }
        Ok(())
    }
}

fn convert_value(v: ValueRef<'_>, decl_type: Option<&str>) -> Value {
    match v {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(i) => Value::Int64(i),
        ValueRef::Real(f) => Value::Float64(f),
        ValueRef::Text(bytes) => {
            let text = String::from_utf8_lossy(bytes).into_owned();
            let date_typed = decl_type.is_some_and(|t| t.contains("DATE") || t.contains("TIME"));
            match date_typed.then(|| parse_datetime(&text)).flatten() {
                Some(dt) => Value::DateTime(dt),
                None => Value::Utf8(text),
            }
        }
        ValueRef::Blob(bytes) => Value::Utf8(String::from_utf8_lossy(bytes).into_owned()),
    }
}

fn parse_datetime(text: &str) -> Option<NaiveDateTime> {
    let text = text.trim();
    DATETIME_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(text, fmt).ok())
        .or_else(|| {
            NaiveDate::parse_from_str(text, "%Y-%m-%d")
                .ok()
                .map(|d| d.and_time(NaiveTime::MIN))
        })
}

/// Connects descriptors whose `Dialect` is `sqlite`; `DBServer` is the database file path.
#[derive(Debug, Default, Clone, Copy)]
pub struct SqliteConnector;

impl Connector for SqliteConnector {
    fn connect(&self, info: &ConnectionInfo) -> TransferResult<Box<dyn Database>> {
        if info.dialect != Dialect::Sqlite {
            return Err(TransferError::connection(format!(
                "no {} driver available for {}; only sqlite targets can be opened",
                info.dialect,
                info.describe()
            )));
        }
        log::info!("Connecting to database {}", info.describe());
        Ok(Box::new(SqliteDatabase::open(&info.server)?))
    }
}

#[cfg(test)]
mod tests {
    use super::SqliteDatabase;
    use crate::database::{Database, QueryParams};
    use crate::types::Value;
    use chrono::NaiveDate;

    #[test]
    fn rollback_discards_uncommitted_rows() {
        let mut db = SqliteDatabase::open_in_memory().unwrap();
        db.execute("CREATE TABLE t (a INTEGER)").unwrap();
        db.commit().unwrap();

        db.execute("INSERT INTO t(a) VALUES (1)").unwrap();
        db.rollback().unwrap();
        db.execute("INSERT INTO t(a) VALUES (2)").unwrap();
        db.commit().unwrap();

        let qr = db.query("SELECT a FROM t", &QueryParams::none()).unwrap();
        assert_eq!(qr.rows, vec![vec![Value::Int64(2)]]);
    }

    #[test]
    fn script_statements_may_return_rows() {
        let mut db = SqliteDatabase::open_in_memory().unwrap();
        assert!(db.execute("SELECT 1").is_err());
        db.execute_statement("CREATE TABLE t (a INTEGER)").unwrap();
        db.execute_statement("SELECT COUNT(*) FROM t").unwrap();
        db.execute_statement("INSERT INTO t(a) VALUES (5)").unwrap();
        db.commit().unwrap();

        let qr = db.query("SELECT a FROM t", &QueryParams::none()).unwrap();
        assert_eq!(qr.rows, vec![vec![Value::Int64(5)]]);
    }

    #[test]
    fn date_columns_surface_as_datetime_and_params_bind() {
        let mut db = SqliteDatabase::open_in_memory().unwrap();
        db.execute("CREATE TABLE e (region TEXT, due DATE)").unwrap();
        db.execute("INSERT INTO e VALUES ('N''W', '2024-02-29'), ('S', 'soon')").unwrap();
        db.commit().unwrap();

        let params = QueryParams::none().with(":r", "N'W");
        let qr = db
            .query("SELECT region, due FROM e WHERE region = :r", &params)
            .unwrap();
        assert_eq!(qr.columns, vec!["region", "due"]);
        let expected = NaiveDate::from_ymd_opt(2024, 2, 29).unwrap().and_hms_opt(0, 0, 0).unwrap();
        assert_eq!(qr.rows, vec![vec![Value::Utf8("N'W".to_string()), Value::DateTime(expected)]]);

        let qr = db.query("SELECT due FROM e WHERE region = 'S'", &QueryParams::none()).unwrap();
        assert_eq!(qr.rows[0][0], Value::Utf8("soon".to_string()));
    }
}
