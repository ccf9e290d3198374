//! Loading graph data from files: JS literal dumps, pre-normalized JSON, and
//! per-table dumps.
//!
//! Failures are isolated per table (or per file for table dumps): they are
//! logged, recorded in the report, and the remaining tables still load.

pub mod bootstrap;
pub mod dump;
pub mod json;
pub mod literal;

pub use bootstrap::{bootstrap, BootstrapOutcome};
pub use dump::{import_dump_dir, DumpReport};
pub use json::import_json_dir;
pub use literal::import_literal_files;

use std::fmt;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{Map, Value};

use crate::literal::Delimiter;
use crate::model::{Node, Position, Relationship};
use crate::store::Positions;

/// The four graph tables a data set provides
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Table {
    Nodes,
    Relationships,
    Journeys,
    Positions,
}

impl Table {
    pub const ALL: [Table; 4] = [
        Table::Nodes,
        Table::Relationships,
        Table::Journeys,
        Table::Positions,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Table::Nodes => "nodes",
            Table::Relationships => "relationships",
            Table::Journeys => "journeys",
            Table::Positions => "positions",
        }
    }

    /// Declaration holding this table in a literal dump
    pub fn declaration(self) -> &'static str {
        match self {
            Table::Nodes => "INITIAL_NODES",
            Table::Relationships => "INITIAL_RELATIONSHIPS",
            Table::Journeys => "SCENARIO_JOURNEYS",
            Table::Positions => "INITIAL_POSITIONS",
        }
    }

    pub fn delimiter(self) -> Delimiter {
        match self {
            Table::Relationships => Delimiter::Bracket,
            _ => Delimiter::Brace,
        }
    }
}

impl fmt::Display for Table {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// One table (or file) that could not be imported
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TableFailure {
    pub table: String,
    pub source: String,
    pub error: String,
}

/// Rows written per table by one import run
#[derive(Debug, Clone, Default, Serialize)]
pub struct ImportReport {
    pub nodes: usize,
    pub relationships: usize,
    pub journeys: usize,
    pub positions: usize,
    pub failures: Vec<TableFailure>,
    pub finished_at: DateTime<Utc>,
}

impl ImportReport {
    pub(crate) fn record(&mut self, table: Table, count: usize) {
        match table {
            Table::Nodes => self.nodes = count,
            Table::Relationships => self.relationships = count,
            Table::Journeys => self.journeys = count,
            Table::Positions => self.positions = count,
        }
    }

    pub(crate) fn fail(&mut self, table: Table, source: &str, error: impl fmt::Display) {
        log::error!("Failed to import {} from {}: {}", table, source, error);
        self.failures.push(TableFailure {
            table: table.name().to_string(),
            source: source.to_string(),
            error: error.to_string(),
        });
    }

    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }

    pub(crate) fn finish(mut self) -> Self {
        self.finished_at = Utc::now();
        log::info!(
            "Imported {} nodes, {} relationships, {} journeys, {} positions ({} failed tables)",
            self.nodes,
            self.relationships,
            self.journeys,
            self.positions,
            self.failures.len()
        );
        self
    }
}

/// Node records, skipping those without an id
pub(crate) fn nodes_from_values(values: impl IntoIterator<Item = Value>) -> Vec<Node> {
    values
        .into_iter()
        .filter_map(|value| match Node::from_value(value) {
            Ok(node) => Some(node),
            Err(e) => {
                log::warn!("Skipping node record: {}", e);
                None
            }
        })
        .collect()
}

/// Relationship records, skipping those missing an endpoint or label
pub(crate) fn relationships_from_values(values: impl IntoIterator<Item = Value>) -> Vec<Relationship> {
    values
        .into_iter()
        .filter_map(|value| match Relationship::from_value(value) {
            Ok(rel) => Some(rel),
            Err(e) => {
                log::warn!("Skipping relationship record: {}", e);
                None
            }
        })
        .collect()
}

/// `node_id -> {x, y}` entries, skipping those that are not coordinate objects
pub(crate) fn positions_from_map(map: Map<String, Value>) -> Positions {
    map.into_iter()
        .filter_map(|(node_id, value)| {
            match serde_json::from_value::<Position>(value) {
                Ok(pos) => Some((node_id, pos)),
                Err(e) => {
                    log::warn!("Skipping position for {}: {}", node_id, e);
                    None
                }
            }
        })
        .collect()
}
