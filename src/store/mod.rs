//! SQLite persistence for the graph.
//!
//! Every operation is an async fn over [`Db`] that runs its SQL on the
//! blocking pool. Structured fields are stored as JSON text; reads fall back
//! to a plain string when a column holds text that is not JSON (rows written
//! by the table-dump importer can look like that).

pub mod journeys;
pub mod nodes;
pub mod positions;
pub mod relationships;

pub use journeys::{
    insert_journey, insert_journeys, journeys_dict, journeys_for_node, journeys_from_map,
    list_journeys, replace_journeys,
};
pub use nodes::{
    count_nodes, delete_node, get_node, insert_node, list_nodes, replace_nodes, update_node,
    upsert_node, upsert_nodes,
};
pub use positions::{get_positions, insert_positions, replace_positions, upsert_position, Positions};
pub use relationships::{
    delete_relationship, get_relationship, insert_relationship, insert_relationships,
    list_relationships, relationships_for_node, replace_relationships, update_relationship,
};

use rusqlite::Connection;
use serde::Serialize;
use serde_json::Value;

use crate::db::Db;
use crate::error::{BizgraphError, Result};
use crate::model::Extra;

/// Row counts per table
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct GraphStats {
    pub nodes: usize,
    pub relationships: usize,
    pub journeys: usize,
    pub positions: usize,
}

pub async fn stats(db: &Db) -> Result<GraphStats> {
    db.with_connection(|conn| {
        Ok(GraphStats {
            nodes: count_rows(conn, "nodes")?,
            relationships: count_rows(conn, "relationships")?,
            journeys: count_rows(conn, "journeys")?,
            positions: count_rows(conn, "positions")?,
        })
    })
    .await
}

/// Delete every row of every graph table
pub async fn clear_all(db: &Db) -> Result<()> {
    db.with_connection(|conn| {
        let tx = conn.transaction()?;
        tx.execute_batch(
            "DELETE FROM positions; \
             DELETE FROM nodes; \
             DELETE FROM relationships; \
             DELETE FROM journeys;",
        )?;
        tx.commit()?;
        log::info!("Cleared all graph tables");
        Ok(())
    })
    .await
}

/// `table` is always one of the fixed graph table names
pub(crate) fn count_rows(conn: &Connection, table: &str) -> Result<usize> {
    let count: i64 = conn.query_row(&format!("SELECT COUNT(*) FROM {}", table), [], |row| {
        row.get(0)
    })?;
    Ok(count as usize)
}

pub(crate) fn to_json_text(value: &Option<Value>) -> Result<Option<String>> {
    value
        .as_ref()
        .map(serde_json::to_string)
        .transpose()
        .map_err(BizgraphError::Json)
}

pub(crate) fn from_json_text(text: Option<String>) -> Option<Value> {
    text.map(|t| serde_json::from_str(&t).unwrap_or(Value::String(t)))
}

pub(crate) fn extra_to_text(extra: &Extra) -> Result<Option<String>> {
    if extra.is_empty() {
        return Ok(None);
    }
    Ok(Some(serde_json::to_string(extra)?))
}

pub(crate) fn extra_from_text(text: Option<String>) -> Extra {
    match text.map(|t| serde_json::from_str::<Value>(&t)) {
        Some(Ok(Value::Object(map))) => map,
        Some(_) => {
            log::warn!("Ignoring extra column that is not a JSON object");
            Extra::new()
        }
        None => Extra::new(),
    }
}
