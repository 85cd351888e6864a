use crate::lock_unpoisoned;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use flatfile_model::ColumnInfo;
use rusqlite::types::{ToSqlOutput, ValueRef};
use rusqlite::{Connection, OptionalExtension, ToSql};
use serde_json::Value as JsonValue;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("no table or view named `{0}`")]
    UnknownObject(String),
    #[error("a table or view named `{0}` already exists")]
    DuplicateObject(String),
}

type Result<T> = std::result::Result<T, StoreError>;

/// Result of running one SQL statement.
///
/// Statements that return no rows (DDL, DML) produce an empty column list.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct QueryOutput {
    pub columns: Vec<ColumnInfo>,
    pub rows: Vec<Vec<JsonValue>>,
}

/// SQL column affinity used when importers create tables.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ColumnAffinity {
    Integer,
    Real,
    Text,
}

impl ColumnAffinity {
    fn sql(self) -> &'static str {
        match self {
            ColumnAffinity::Integer => "INTEGER",
            ColumnAffinity::Real => "REAL",
            ColumnAffinity::Text => "TEXT",
        }
    }
}

/// A single cell value on its way into the store.
#[derive(Clone, Debug, PartialEq)]
pub enum CellValue {
    Null,
    Integer(i64),
    Real(f64),
    Text(String),
}

impl ToSql for CellValue {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        match self {
            CellValue::Null => Ok(ToSqlOutput::from(rusqlite::types::Null)),
            CellValue::Integer(v) => Ok(ToSqlOutput::from(*v)),
            CellValue::Real(v) => Ok(ToSqlOutput::from(*v)),
            CellValue::Text(v) => Ok(ToSqlOutput::from(v.as_str())),
        }
    }
}

/// Quote `name` for use as an SQL identifier.
pub fn quote_identifier(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Quote `text` as an SQL string literal.
pub fn quote_string_literal(text: &str) -> String {
    format!("'{}'", text.replace('\'', "''"))
}

/// The embedded relational store of one workbook.
#[derive(Clone)]
pub struct Store {
    conn: Arc<Mutex<Connection>>,
    next_result_view: Arc<AtomicU64>,
}

impl std::fmt::Debug for Store {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Store").finish_non_exhaustive()
    }
}

impl Store {
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            next_result_view: Arc::new(AtomicU64::new(1)),
        })
    }

    /// Run a statement that returns no rows.
    pub fn execute(&self, sql: &str) -> Result<usize> {
        let conn = lock_unpoisoned(&self.conn);
        Ok(conn.execute(sql, [])?)
    }

    pub fn execute_batch(&self, sql: &str) -> Result<()> {
        let conn = lock_unpoisoned(&self.conn);
        conn.execute_batch(sql)?;
        Ok(())
    }

    /// Run `sql` and collect its full result set.
    ///
    /// The SQL is forwarded verbatim; statements without a result set come
    /// back as an empty [`QueryOutput`].
    pub fn query(&self, sql: &str) -> Result<QueryOutput> {
        let conn = lock_unpoisoned(&self.conn);
        let mut stmt = conn.prepare(sql)?;
        if stmt.column_count() == 0 {
            stmt.execute([])?;
            return Ok(QueryOutput::default());
        }

        let names: Vec<String> = stmt.column_names().iter().map(|n| n.to_string()).collect();
        let decl_types: Vec<Option<String>> = stmt
            .columns()
            .iter()
            .map(|c| c.decl_type().map(|t| t.to_string()))
            .collect();

        let column_count = names.len();
        let mut rows: Vec<Vec<JsonValue>> = Vec::new();
        let mut observed: Vec<Option<&'static str>> = vec![None; column_count];
        let mut raw_rows = stmt.query([])?;
        while let Some(row) = raw_rows.next()? {
            let mut out = Vec::with_capacity(column_count);
            for idx in 0..column_count {
                let value = row.get_ref(idx)?;
                if observed[idx].is_none() {
                    observed[idx] = value_type_name(&value);
                }
                out.push(value_to_json(value));
            }
            rows.push(out);
        }

        let columns = names
            .into_iter()
            .enumerate()
            .map(|(idx, name)| {
                let ty = decl_types[idx]
                    .as_deref()
                    .map(normalize_decl_type)
                    .or(observed[idx].map(str::to_string))
                    .unwrap_or_else(|| "any".to_string());
                ColumnInfo::new(name, ty)
            })
            .collect();

        Ok(QueryOutput { columns, rows })
    }

    /// Best-effort: materialize `sql` as a named temporary view for result
    /// chaining. Statements that cannot back a view yield `None`.
    pub fn materialize_result_view(&self, sql: &str) -> Option<String> {
        let id = self.next_result_view.fetch_add(1, Ordering::Relaxed);
        let name = format!("ff_result_{id}");
        let ddl = format!(
            "CREATE TEMP VIEW {} AS {}",
            quote_identifier(&name),
            sql
        );
        let conn = lock_unpoisoned(&self.conn);
        match conn.execute_batch(&ddl) {
            Ok(()) => Some(name),
            Err(_) => None,
        }
    }

    /// Create an empty table with the given column names and affinities.
    pub fn create_table(&self, name: &str, columns: &[(String, ColumnAffinity)]) -> Result<()> {
        if self.object_kind(name)?.is_some() {
            return Err(StoreError::DuplicateObject(name.to_string()));
        }
        let defs: Vec<String> = columns
            .iter()
            .map(|(col, affinity)| format!("{} {}", quote_identifier(col), affinity.sql()))
            .collect();
        let ddl = format!(
            "CREATE TABLE {} ({})",
            quote_identifier(name),
            defs.join(", ")
        );
        self.execute_batch(&ddl)
    }

    /// Bulk-insert rows into `table` inside one transaction.
    pub fn insert_rows<I>(&self, table: &str, column_count: usize, rows: I) -> Result<u64>
    where
        I: IntoIterator<Item = Vec<CellValue>>,
    {
        let placeholders = vec!["?"; column_count].join(", ");
        let sql = format!(
            "INSERT INTO {} VALUES ({placeholders})",
            quote_identifier(table)
        );
        let mut conn = lock_unpoisoned(&self.conn);
        let tx = conn.transaction()?;
        let mut inserted = 0u64;
        {
            let mut stmt = tx.prepare(&sql)?;
            for row in rows {
                stmt.execute(rusqlite::params_from_iter(row.iter()))?;
                inserted += 1;
            }
        }
        tx.commit()?;
        Ok(inserted)
    }

    /// `Some("table")` / `Some("view")` when an object with that name exists.
    pub fn object_kind(&self, name: &str) -> Result<Option<String>> {
        let conn = lock_unpoisoned(&self.conn);
        let kind = conn
            .query_row(
                "SELECT type FROM sqlite_master WHERE name = ?1 AND type IN ('table', 'view')",
                [name],
                |row| row.get::<_, String>(0),
            )
            .optional()?;
        Ok(kind)
    }

    pub fn object_exists(&self, name: &str) -> Result<bool> {
        Ok(self.object_kind(name)?.is_some())
    }

    /// Rename a table or view. The store-side rename is atomic for tables;
    /// views are recreated under the new name from their recorded definition.
    pub fn rename_object(&self, old: &str, new: &str) -> Result<()> {
        if self.object_exists(new)? {
            return Err(StoreError::DuplicateObject(new.to_string()));
        }
        match self.object_kind(old)?.as_deref() {
            Some("table") => self.execute_batch(&format!(
                "ALTER TABLE {} RENAME TO {}",
                quote_identifier(old),
                quote_identifier(new)
            )),
            Some("view") => self.rename_view(old, new),
            _ => Err(StoreError::UnknownObject(old.to_string())),
        }
    }

    fn rename_view(&self, old: &str, new: &str) -> Result<()> {
        let definition: Option<String> = {
            let conn = lock_unpoisoned(&self.conn);
            conn.query_row(
                "SELECT sql FROM sqlite_master WHERE name = ?1 AND type = 'view'",
                [old],
                |row| row.get(0),
            )
            .optional()?
        };
        let definition = definition.ok_or_else(|| StoreError::UnknownObject(old.to_string()))?;
        // `sqlite_master.sql` stores `CREATE VIEW <name> AS <select>`; reuse
        // the select body under the new name.
        let select = definition
            .split_once(" AS ")
            .map(|(_, body)| body.to_string())
            .ok_or_else(|| StoreError::UnknownObject(old.to_string()))?;
        self.execute_batch(&format!(
            "CREATE VIEW {} AS {select}",
            quote_identifier(new)
        ))?;
        self.execute_batch(&format!("DROP VIEW {}", quote_identifier(old)))
    }

    /// Drop a table or view; unknown names are an error.
    pub fn drop_object(&self, name: &str) -> Result<()> {
        match self.object_kind(name)?.as_deref() {
            Some("table") => self.execute_batch(&format!("DROP TABLE {}", quote_identifier(name))),
            Some("view") => self.execute_batch(&format!("DROP VIEW {}", quote_identifier(name))),
            _ => Err(StoreError::UnknownObject(name.to_string())),
        }
    }

    /// Columns of a table or view, via `pragma_table_info`.
    pub fn table_columns(&self, name: &str) -> Result<Vec<ColumnInfo>> {
        if !self.object_exists(name)? {
            return Err(StoreError::UnknownObject(name.to_string()));
        }
        let conn = lock_unpoisoned(&self.conn);
        let mut stmt = conn.prepare("SELECT name, type FROM pragma_table_info(?1)")?;
        let mut rows = stmt.query([name])?;
        let mut columns = Vec::new();
        while let Some(row) = rows.next()? {
            let col: String = row.get(0)?;
            let decl: String = row.get(1)?;
            let ty = if decl.is_empty() {
                "any".to_string()
            } else {
                normalize_decl_type(&decl)
            };
            columns.push(ColumnInfo::new(col, ty));
        }
        Ok(columns)
    }

    pub fn row_count(&self, name: &str) -> Result<u64> {
        if !self.object_exists(name)? {
            return Err(StoreError::UnknownObject(name.to_string()));
        }
        let conn = lock_unpoisoned(&self.conn);
        let count: i64 = conn.query_row(
            &format!("SELECT COUNT(*) FROM {}", quote_identifier(name)),
            [],
            |row| row.get(0),
        )?;
        Ok(count.max(0) as u64)
    }

    /// Approximate database size: `page_count * page_size`.
    pub fn approx_db_bytes(&self) -> Result<u64> {
        let conn = lock_unpoisoned(&self.conn);
        let page_count: i64 = conn.pragma_query_value(None, "page_count", |row| row.get(0))?;
        let page_size: i64 = conn.pragma_query_value(None, "page_size", |row| row.get(0))?;
        Ok((page_count.max(0) as u64).saturating_mul(page_size.max(0) as u64))
    }
}

fn value_to_json(value: ValueRef<'_>) -> JsonValue {
    match value {
        ValueRef::Null => JsonValue::Null,
        ValueRef::Integer(v) => JsonValue::from(v),
        ValueRef::Real(v) => serde_json::Number::from_f64(v)
            .map(JsonValue::Number)
            .unwrap_or(JsonValue::Null),
        ValueRef::Text(bytes) => JsonValue::String(String::from_utf8_lossy(bytes).into_owned()),
        ValueRef::Blob(bytes) => JsonValue::String(BASE64.encode(bytes)),
    }
}

fn value_type_name(value: &ValueRef<'_>) -> Option<&'static str> {
    match value {
        ValueRef::Null => None,
        ValueRef::Integer(_) => Some("int"),
        ValueRef::Real(_) => Some("real"),
        ValueRef::Text(_) => Some("text"),
        ValueRef::Blob(_) => Some("blob"),
    }
}

fn normalize_decl_type(decl: &str) -> String {
    let upper = decl.to_ascii_uppercase();
    if upper.contains("INT") {
        "int".to_string()
    } else if upper.contains("CHAR") || upper.contains("CLOB") || upper.contains("TEXT") {
        "text".to_string()
    } else if upper.contains("BLOB") {
        "blob".to_string()
    } else if upper.contains("REAL") || upper.contains("FLOA") || upper.contains("DOUB") {
        "real".to_string()
    } else {
        "numeric".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn store_with_orders() -> Store {
        let store = Store::open_in_memory().expect("open store");
        store
            .create_table(
                "orders",
                &[
                    ("id".to_string(), ColumnAffinity::Integer),
                    ("qty".to_string(), ColumnAffinity::Integer),
                    ("country".to_string(), ColumnAffinity::Text),
                ],
            )
            .expect("create table");
        store
            .insert_rows(
                "orders",
                3,
                vec![
                    vec![
                        CellValue::Integer(1),
                        CellValue::Integer(3),
                        CellValue::Text("DE".to_string()),
                    ],
                    vec![
                        CellValue::Integer(2),
                        CellValue::Integer(5),
                        CellValue::Text("FR".to_string()),
                    ],
                ],
            )
            .expect("insert rows");
        store
    }

    #[test]
    fn query_returns_columns_and_rows() {
        let store = store_with_orders();
        let out = store.query("SELECT COUNT(*) FROM orders").expect("count");
        assert_eq!(out.columns, vec![ColumnInfo::new("COUNT(*)", "int")]);
        assert_eq!(out.rows, vec![vec![json!(2)]]);
    }

    #[test]
    fn query_reports_declared_types() {
        let store = store_with_orders();
        let out = store.query("SELECT id, country FROM orders").expect("select");
        assert_eq!(
            out.columns,
            vec![ColumnInfo::new("id", "int"), ColumnInfo::new("country", "text")]
        );
    }

    #[test]
    fn ddl_statements_yield_empty_output() {
        let store = store_with_orders();
        let out = store.query("DELETE FROM orders WHERE id = 1").expect("delete");
        assert_eq!(out, QueryOutput::default());
        assert_eq!(store.row_count("orders").expect("count"), 1);
    }

    #[test]
    fn rename_table_moves_data() {
        let store = store_with_orders();
        store.rename_object("orders", "sales").expect("rename");
        assert!(!store.object_exists("orders").unwrap());
        assert_eq!(store.row_count("sales").expect("count"), 2);
    }

    #[test]
    fn rename_to_taken_name_fails() {
        let store = store_with_orders();
        store
            .create_table("sales", &[("id".to_string(), ColumnAffinity::Integer)])
            .expect("create");
        let err = store.rename_object("orders", "sales").unwrap_err();
        assert!(matches!(err, StoreError::DuplicateObject(name) if name == "sales"));
    }

    #[test]
    fn rename_view_recreates_definition() {
        let store = store_with_orders();
        store
            .execute_batch("CREATE VIEW big_orders AS SELECT * FROM orders WHERE qty > 3")
            .expect("create view");
        store.rename_object("big_orders", "large_orders").expect("rename view");
        let out = store.query("SELECT COUNT(*) FROM large_orders").expect("count");
        assert_eq!(out.rows, vec![vec![json!(1)]]);
    }

    #[test]
    fn drop_unknown_object_errors() {
        let store = store_with_orders();
        let err = store.drop_object("missing").unwrap_err();
        assert!(matches!(err, StoreError::UnknownObject(name) if name == "missing"));
    }

    #[test]
    fn materialized_view_is_queryable() {
        let store = store_with_orders();
        let view = store
            .materialize_result_view("SELECT id FROM orders WHERE qty > 3")
            .expect("view created");
        let out = store
            .query(&format!("SELECT COUNT(*) FROM {}", quote_identifier(&view)))
            .expect("query view");
        assert_eq!(out.rows, vec![vec![json!(1)]]);
    }

    #[test]
    fn materializing_non_select_returns_none() {
        let store = store_with_orders();
        assert_eq!(store.materialize_result_view("DROP TABLE orders"), None);
        // The failed materialization must not have executed the statement.
        assert!(store.object_exists("orders").unwrap());
    }

    #[test]
    fn approx_db_bytes_is_positive() {
        let store = store_with_orders();
        assert!(store.approx_db_bytes().expect("bytes") > 0);
    }

    #[test]
    fn quoting() {
        assert_eq!(quote_identifier("a\"b"), "\"a\"\"b\"");
        assert_eq!(quote_string_literal("it's"), "'it''s'");
    }
}
