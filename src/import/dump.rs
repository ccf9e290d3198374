//! Table-dump import: every `<table>_dump.jsx` file in a directory holds
//! `export const NAME = [ ...rows ];` for one database table.
//!
//! Rows go through the same extraction and normalization as the graph
//! dumps. Nested values are stored as JSON text, keys without a matching
//! column are dropped, and the table is replaced in one transaction.

use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use chrono::{DateTime, Utc};
use regex::Regex;
use rusqlite::types::Value as SqlValue;
use rusqlite::{params_from_iter, Connection};
use serde::Serialize;
use serde_json::{Map, Value};
use walkdir::WalkDir;

use super::TableFailure;
use crate::db::Db;
use crate::error::{BizgraphError, Result};
use crate::literal::{declared_names, parse_declaration, Delimiter, UnbalancedPolicy};

const DUMP_SUFFIX: &str = "_dump.jsx";

/// Rows written into one table
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DumpedTable {
    pub table: String,
    pub rows: usize,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct DumpReport {
    pub tables: Vec<DumpedTable>,
    /// Tables whose dump held no rows; their stored rows are left alone
    pub skipped: Vec<String>,
    pub failures: Vec<TableFailure>,
    pub finished_at: DateTime<Utc>,
}

impl DumpReport {
    fn fail(&mut self, table: &str, source: &str, error: impl std::fmt::Display) {
        log::error!("Failed to import table {} from {}: {}", table, source, error);
        self.failures.push(TableFailure {
            table: table.to_string(),
            source: source.to_string(),
            error: error.to_string(),
        });
    }
}

fn is_table_name(name: &str) -> bool {
    static IDENT: OnceLock<Regex> = OnceLock::new();
    IDENT
        .get_or_init(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("Invalid regex pattern"))
        .is_match(name)
}

/// `(table, path)` for every dump file directly inside `dir`, sorted by table
pub fn find_dump_files(dir: &Path) -> Vec<(String, PathBuf)> {
    let mut files: Vec<(String, PathBuf)> = WalkDir::new(dir)
        .min_depth(1)
        .max_depth(1)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .filter_map(|e| {
            let name = e.file_name().to_str()?;
            let table = name.strip_suffix(DUMP_SUFFIX)?.to_string();
            Some((table, e.path().to_path_buf()))
        })
        .collect();
    files.sort();
    files
}

/// Rows of the first array declaration in `text`; non-object rows are dropped
pub fn parse_dump(text: &str, policy: UnbalancedPolicy) -> Result<Vec<Map<String, Value>>> {
    for name in declared_names(text) {
        if let Some(value) = parse_declaration(text, &name, Delimiter::Bracket, policy)? {
            let rows = match value {
                Value::Array(rows) => rows,
                _ => {
                    return Err(BizgraphError::SchemaMismatch(format!(
                        "{} must be an array",
                        name
                    )))
                }
            };
            return Ok(rows
                .into_iter()
                .filter_map(|row| match row {
                    Value::Object(map) => Some(map),
                    _ => None,
                })
                .collect());
        }
    }
    Err(BizgraphError::SchemaMismatch(
        "no exported array declaration found".to_string(),
    ))
}

fn sql_value(value: Value) -> SqlValue {
    match value {
        Value::Null => SqlValue::Null,
        Value::Bool(b) => SqlValue::Integer(b as i64),
        Value::Number(n) => match n.as_i64() {
            Some(i) => SqlValue::Integer(i),
            None => SqlValue::Real(n.as_f64().unwrap_or_default()),
        },
        Value::String(s) => SqlValue::Text(s),
        nested => SqlValue::Text(nested.to_string()),
    }
}

fn table_columns(conn: &Connection, table: &str) -> Result<Vec<String>> {
    let mut stmt = conn.prepare(&format!("PRAGMA table_info(\"{}\")", table))?;
    let columns = stmt
        .query_map([], |row| row.get::<_, String>(1))?
        .collect::<std::result::Result<Vec<_>, rusqlite::Error>>()?;
    Ok(columns)
}

/// Replace every row of `table` with `rows`. `table` must be a plain identifier.
pub fn replace_table_rows(conn: &mut Connection, table: &str, rows: Vec<Map<String, Value>>) -> Result<usize> {
    let columns = table_columns(conn, table)?;
    if columns.is_empty() {
        return Err(BizgraphError::NotFound(format!("Table '{}'", table)));
    }

    let tx = conn.transaction()?;
    tx.execute(&format!("DELETE FROM \"{}\"", table), [])?;

    let mut imported = 0;
    for row in rows {
        let (names, values): (Vec<String>, Vec<SqlValue>) = row
            .into_iter()
            .filter(|(key, _)| columns.contains(key))
            .map(|(key, value)| (format!("\"{}\"", key), sql_value(value)))
            .unzip();
        if names.is_empty() {
            continue;
        }
        let placeholders = vec!["?"; names.len()].join(", ");
        tx.execute(
            &format!(
                "INSERT INTO \"{}\" ({}) VALUES ({})",
                table,
                names.join(", "),
                placeholders
            ),
            params_from_iter(values),
        )?;
        imported += 1;
    }

    tx.commit()?;
    Ok(imported)
}

/// Import every `<table>_dump.jsx` in `dir`
pub async fn import_dump_dir(db: &Db, dir: &Path, policy: UnbalancedPolicy) -> Result<DumpReport> {
    if !dir.is_dir() {
        return Err(BizgraphError::NotFound(format!("Data directory {}", dir.display())));
    }

    let files = find_dump_files(dir);
    log::info!("Found {} dump file(s) in {}", files.len(), dir.display());
    let mut report = DumpReport::default();

    for (table, path) in files {
        let source = path.display().to_string();

        if !is_table_name(&table) {
            report.fail(&table, &source, "not a valid table name");
            continue;
        }

        let rows = match std::fs::read_to_string(&path)
            .map_err(BizgraphError::from)
            .and_then(|text| parse_dump(&text, policy))
        {
            Ok(rows) => rows,
            Err(e) => {
                report.fail(&table, &source, e);
                continue;
            }
        };

        if rows.is_empty() {
            log::warn!("{}: no data to import, skipping", table);
            report.skipped.push(table);
            continue;
        }

        let target = table.clone();
        match db
            .with_connection(move |conn| replace_table_rows(conn, &target, rows))
            .await
        {
            Ok(count) => {
                log::info!("{}: imported {} rows", table, count);
                report.tables.push(DumpedTable { table, rows: count });
            }
            Err(e) => report.fail(&table, &source, e),
        }
    }

    report.finished_at = Utc::now();
    log::info!(
        "Imported {} table(s), skipped {}, {} failed",
        report.tables.len(),
        report.skipped.len(),
        report.failures.len()
    );
    Ok(report)
}
