use rusqlite::{params, Connection, OptionalExtension, Row};

use super::{count_rows, extra_from_text, extra_to_text, from_json_text, to_json_text};
use crate::db::Db;
use crate::error::{BizgraphError, Result};
use crate::model::{Node, NodeUpdate};

const SELECT_NODE: &str = "SELECT id, module, nodeType, definition, businessMeaning, attributes, \
     grain, color, dataSources, columnLineage, derivedConcepts, groupByOptions, \
     storeTypeValues, usedInDecisions, businessRule, extra FROM nodes";

fn node_from_row(row: &Row) -> rusqlite::Result<Node> {
    Ok(Node {
        id: row.get(0)?,
        module: row.get(1)?,
        node_type: row.get(2)?,
        definition: row.get(3)?,
        business_meaning: row.get(4)?,
        attributes: from_json_text(row.get(5)?),
        grain: row.get(6)?,
        color: row.get(7)?,
        data_sources: from_json_text(row.get(8)?),
        column_lineage: from_json_text(row.get(9)?),
        derived_concepts: from_json_text(row.get(10)?),
        group_by_options: from_json_text(row.get(11)?),
        store_type_values: from_json_text(row.get(12)?),
        used_in_decisions: from_json_text(row.get(13)?),
        business_rule: row.get(14)?,
        extra: extra_from_text(row.get(15)?),
    })
}

pub(crate) fn fetch_node(conn: &Connection, id: &str) -> Result<Option<Node>> {
    let node = conn
        .query_row(&format!("{} WHERE id = ?1", SELECT_NODE), params![id], node_from_row)
        .optional()?;
    Ok(node)
}

/// Write every column of `node`, replacing any row with the same id
fn write_node(conn: &Connection, node: &Node) -> Result<()> {
    conn.execute(
        "INSERT OR REPLACE INTO nodes (
            id, module, nodeType, definition, businessMeaning, attributes, grain, color,
            dataSources, columnLineage, derivedConcepts, groupByOptions, storeTypeValues,
            usedInDecisions, businessRule, extra
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16)",
        params![
            node.id,
            node.module,
            node.node_type,
            node.definition,
            node.business_meaning,
            to_json_text(&node.attributes)?,
            node.grain,
            node.color,
            to_json_text(&node.data_sources)?,
            to_json_text(&node.column_lineage)?,
            to_json_text(&node.derived_concepts)?,
            to_json_text(&node.group_by_options)?,
            to_json_text(&node.store_type_values)?,
            to_json_text(&node.used_in_decisions)?,
            node.business_rule,
            extra_to_text(&node.extra)?,
        ],
    )?;
    Ok(())
}

/// Insert `node`, or merge its set fields into the existing row
fn upsert_in(conn: &Connection, node: Node) -> Result<Node> {
    let merged = match fetch_node(conn, &node.id)? {
        Some(mut existing) => {
            existing.apply(NodeUpdate::from(node));
            existing
        }
        None => node,
    };
    write_node(conn, &merged)?;
    Ok(merged)
}

pub async fn get_node(db: &Db, id: &str) -> Result<Option<Node>> {
    let id = id.to_string();
    db.with_connection(move |conn| fetch_node(conn, &id)).await
}

/// All nodes ordered by module then id, optionally filtered
pub async fn list_nodes(
    db: &Db,
    module: Option<String>,
    node_type: Option<String>,
) -> Result<Vec<Node>> {
    db.with_connection(move |conn| {
        let mut stmt = conn.prepare(&format!(
            "{} WHERE (?1 IS NULL OR module = ?1) AND (?2 IS NULL OR nodeType = ?2) \
             ORDER BY module, id",
            SELECT_NODE
        ))?;
        let nodes = stmt
            .query_map(params![module, node_type], node_from_row)?
            .collect::<std::result::Result<Vec<_>, rusqlite::Error>>()?;
        Ok(nodes)
    })
    .await
}

/// Insert a new node; an existing id is a conflict
pub async fn insert_node(db: &Db, node: Node) -> Result<Node> {
    if node.id.is_empty() {
        return Err(BizgraphError::InvalidInput("node id must not be empty".to_string()));
    }
    db.with_connection(move |conn| {
        if fetch_node(conn, &node.id)?.is_some() {
            return Err(BizgraphError::Conflict(format!("Node '{}'", node.id)));
        }
        write_node(conn, &node)?;
        Ok(node)
    })
    .await
}

/// Merge `patch` into node `id`; `None` when the node does not exist
pub async fn update_node(db: &Db, id: &str, patch: NodeUpdate) -> Result<Option<Node>> {
    let id = id.to_string();
    db.with_connection(move |conn| {
        let tx = conn.transaction()?;
        let updated = match fetch_node(&tx, &id)? {
            Some(mut node) => {
                node.apply(patch);
                write_node(&tx, &node)?;
                Some(node)
            }
            None => None,
        };
        tx.commit()?;
        Ok(updated)
    })
    .await
}

pub async fn upsert_node(db: &Db, node: Node) -> Result<Node> {
    db.with_connection(move |conn| {
        let tx = conn.transaction()?;
        let node = upsert_in(&tx, node)?;
        tx.commit()?;
        Ok(node)
    })
    .await
}

/// Upsert a batch in one transaction
pub async fn upsert_nodes(db: &Db, nodes: Vec<Node>) -> Result<usize> {
    db.with_connection(move |conn| {
        let tx = conn.transaction()?;
        let count = nodes.len();
        for node in nodes {
            upsert_in(&tx, node)?;
        }
        tx.commit()?;
        Ok(count)
    })
    .await
}

/// Delete a node together with its position and every relationship touching it.
/// Returns whether the node existed.
pub async fn delete_node(db: &Db, id: &str) -> Result<bool> {
    let id = id.to_string();
    db.with_connection(move |conn| {
        let tx = conn.transaction()?;
        tx.execute("DELETE FROM positions WHERE node_id = ?1", params![id])?;
        let edges = tx.execute(
            "DELETE FROM relationships WHERE from_node = ?1 OR to_node = ?1",
            params![id],
        )?;
        let deleted = tx.execute("DELETE FROM nodes WHERE id = ?1", params![id])?;
        tx.commit()?;
        if deleted > 0 {
            log::debug!("Deleted node {} and {} relationships", id, edges);
        }
        Ok(deleted > 0)
    })
    .await
}

/// Replace the whole node table with `nodes`
pub async fn replace_nodes(db: &Db, nodes: Vec<Node>) -> Result<usize> {
    db.with_connection(move |conn| {
        let tx = conn.transaction()?;
        tx.execute("DELETE FROM nodes", [])?;
        for node in &nodes {
            write_node(&tx, node)?;
        }
        tx.commit()?;
        Ok(nodes.len())
    })
    .await
}

pub async fn count_nodes(db: &Db) -> Result<usize> {
    db.with_connection(|conn| count_rows(conn, "nodes")).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Position, Relationship};
    use crate::store::test_support::migrated_db;
    use crate::store::{get_positions, insert_relationship, list_relationships, upsert_position};
    use serde_json::json;

    fn node(id: &str, module: &str) -> Node {
        Node {
            id: id.to_string(),
            module: Some(module.to_string()),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_insert_and_get_round_trip() {
        let (_tmp, db) = migrated_db().await;
        let original = Node::from_value(json!({
            "id": "customer",
            "module": "Sales",
            "nodeType": "entity",
            "attributes": ["name", "segment"],
            "columnLineage": [{"column": "seg", "source": "crm"}],
            "steward": "bi-team",
        }))
        .unwrap();

        insert_node(&db, original.clone()).await.unwrap();
        let loaded = get_node(&db, "customer").await.unwrap().unwrap();
        assert_eq!(loaded, original);
        assert!(get_node(&db, "missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_insert_duplicate_is_conflict() {
        let (_tmp, db) = migrated_db().await;
        insert_node(&db, node("a", "M")).await.unwrap();
        let err = insert_node(&db, node("a", "N")).await.unwrap_err();
        assert!(matches!(err, BizgraphError::Conflict(_)));
        assert_eq!(err.to_string(), "Node 'a' already exists");
    }

    #[tokio::test]
    async fn test_list_nodes_ordered_and_filtered() {
        let (_tmp, db) = migrated_db().await;
        let mut typed = node("c", "A");
        typed.node_type = Some("metric".to_string());
        upsert_nodes(&db, vec![node("b", "B"), typed, node("a", "A")]).await.unwrap();

        let ids: Vec<String> = list_nodes(&db, None, None)
            .await
            .unwrap()
            .into_iter()
            .map(|n| n.id)
            .collect();
        assert_eq!(ids, vec!["a", "c", "b"]);

        let module_a = list_nodes(&db, Some("A".to_string()), None).await.unwrap();
        assert_eq!(module_a.len(), 2);

        let metrics = list_nodes(&db, None, Some("metric".to_string())).await.unwrap();
        assert_eq!(metrics.len(), 1);
        assert_eq!(metrics[0].id, "c");
    }

    #[tokio::test]
    async fn test_update_merges_only_set_fields() {
        let (_tmp, db) = migrated_db().await;
        let mut n = node("a", "M");
        n.color = Some("#123".to_string());
        insert_node(&db, n).await.unwrap();

        let patch = NodeUpdate {
            definition: Some("Defined".to_string()),
            ..Default::default()
        };
        let updated = update_node(&db, "a", patch).await.unwrap().unwrap();
        assert_eq!(updated.definition.as_deref(), Some("Defined"));
        assert_eq!(updated.color.as_deref(), Some("#123"));
        assert_eq!(updated.module.as_deref(), Some("M"));

        assert!(update_node(&db, "zzz", NodeUpdate::default()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_upsert_keeps_existing_fields() {
        let (_tmp, db) = migrated_db().await;
        let mut n = node("a", "M");
        n.grain = Some("daily".to_string());
        upsert_node(&db, n).await.unwrap();

        let merged = upsert_node(&db, Node { id: "a".to_string(), color: Some("red".to_string()), ..Default::default() })
            .await
            .unwrap();
        assert_eq!(merged.grain.as_deref(), Some("daily"));
        assert_eq!(merged.color.as_deref(), Some("red"));
        assert_eq!(count_nodes(&db).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_delete_cascades_to_edges_and_position() {
        let (_tmp, db) = migrated_db().await;
        upsert_nodes(&db, vec![node("a", "M"), node("b", "M"), node("c", "M")]).await.unwrap();
        for (from, to) in [("a", "b"), ("c", "a"), ("b", "c")] {
            insert_relationship(
                &db,
                Relationship {
                    from: from.to_string(),
                    to: to.to_string(),
                    label: "rel".to_string(),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        }
        upsert_position(&db, "a", Position { x: 1.0, y: 1.0 }).await.unwrap();
        upsert_position(&db, "b", Position { x: 2.0, y: 2.0 }).await.unwrap();

        assert!(delete_node(&db, "a").await.unwrap());
        assert!(!delete_node(&db, "a").await.unwrap());

        let rels = list_relationships(&db).await.unwrap();
        assert_eq!(rels.len(), 1);
        assert_eq!(rels[0].from, "b");
        let positions = get_positions(&db).await.unwrap();
        assert!(!positions.contains_key("a"));
        assert!(positions.contains_key("b"));
    }

    #[tokio::test]
    async fn test_replace_nodes_drops_previous_rows() {
        let (_tmp, db) = migrated_db().await;
        upsert_nodes(&db, vec![node("old", "M")]).await.unwrap();
        let count = replace_nodes(&db, vec![node("x", "M"), node("y", "M")]).await.unwrap();
        assert_eq!(count, 2);
        assert!(get_node(&db, "old").await.unwrap().is_none());
        assert_eq!(count_nodes(&db).await.unwrap(), 2);
    }
}
