//! Import driver for the JS literal dumps (`nodes.jsx`, `relationships.jsx`,
//! `flow_journey.jsx`, `positions.jsx`).
//!
//! Each table is extracted, normalized and parsed on its own. A table whose
//! file or declaration is missing loads zero rows and leaves the stored table
//! alone; a table that fails to parse is reported and skipped. Tables that
//! parse replace their stored counterpart wholesale.

use std::path::{Path, PathBuf};

use serde_json::Value;

use super::{nodes_from_values, positions_from_map, relationships_from_values, ImportReport, Table};
use crate::config::DataConfig;
use crate::db::Db;
use crate::error::{BizgraphError, Result};
use crate::literal::{parse_declaration, UnbalancedPolicy};
use crate::model::{Journey, Node, Relationship};
use crate::store::{self, journeys_from_map, Positions};

/// Parsed rows of one table
#[derive(Debug, Clone)]
pub enum Records {
    Nodes(Vec<Node>),
    Relationships(Vec<Relationship>),
    Journeys(Vec<Journey>),
    Positions(Positions),
}

impl Records {
    pub fn len(&self) -> usize {
        match self {
            Records::Nodes(v) => v.len(),
            Records::Relationships(v) => v.len(),
            Records::Journeys(v) => v.len(),
            Records::Positions(m) => m.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn shape_error(table: Table, expected: &str) -> BizgraphError {
    BizgraphError::SchemaMismatch(format!("{} must be {}", table.declaration(), expected))
}

/// Extract and parse the declaration for `table` out of `text`.
///
/// `Ok(None)` when the declaration is absent.
pub fn read_table(text: &str, table: Table, policy: UnbalancedPolicy) -> Result<Option<Records>> {
    let value = match parse_declaration(text, table.declaration(), table.delimiter(), policy)? {
        Some(value) => value,
        None => return Ok(None),
    };

    let records = match (table, value) {
        (Table::Nodes, Value::Object(map)) => Records::Nodes(nodes_from_values(map.into_iter().map(|(_, v)| v))),
        (Table::Relationships, Value::Array(items)) => {
            Records::Relationships(relationships_from_values(items))
        }
        (Table::Journeys, Value::Object(map)) => Records::Journeys(journeys_from_map(map)),
        (Table::Positions, Value::Object(map)) => Records::Positions(positions_from_map(map)),
        (Table::Relationships, _) => return Err(shape_error(table, "an array")),
        (_, _) => return Err(shape_error(table, "an object")),
    };
    Ok(Some(records))
}

/// Replace the stored table with `records`
pub async fn replace_table(db: &Db, records: Records) -> Result<usize> {
    match records {
        Records::Nodes(nodes) => store::replace_nodes(db, nodes).await,
        Records::Relationships(rels) => store::replace_relationships(db, rels).await,
        Records::Journeys(journeys) => store::replace_journeys(db, journeys).await,
        Records::Positions(positions) => store::replace_positions(db, positions).await,
    }
}

fn table_path(data: &DataConfig, table: Table) -> PathBuf {
    match table {
        Table::Nodes => data.nodes_path(),
        Table::Relationships => data.relationships_path(),
        Table::Journeys => data.journeys_path(),
        Table::Positions => data.positions_path(),
    }
}

/// Read one table's file. `Ok(None)` when there is nothing to load.
fn load_table(path: &Path, table: Table, policy: UnbalancedPolicy) -> Result<Option<Records>> {
    if !path.is_file() {
        log::warn!("{} file not found: {}", table, path.display());
        return Ok(None);
    }
    log::info!("Parsing {} from {}", table, path.display());

    let text = std::fs::read_to_string(path)?;
    let records = read_table(&text, table, policy)?;
    if records.is_none() {
        log::warn!("Could not find {} in {}", table.declaration(), path.display());
    }
    Ok(records)
}

/// Import all four literal dump files configured in `data`
pub async fn import_literal_files(db: &Db, data: &DataConfig) -> Result<ImportReport> {
    log::info!("Loading data from literal files in {}", data.literal_dir.display());
    let mut report = ImportReport::default();

    for table in Table::ALL {
        let path = table_path(data, table);
        let source = path.display().to_string();

        let records = match load_table(&path, table, data.unbalanced) {
            Ok(Some(records)) => records,
            Ok(None) => continue,
            Err(e @ BizgraphError::Database(_)) => return Err(e),
            Err(e) => {
                report.fail(table, &source, e);
                continue;
            }
        };

        let count = replace_table(db, records).await?;
        log::info!("Loaded {} {}", count, table);
        report.record(table, count);
    }

    Ok(report.finish())
}
