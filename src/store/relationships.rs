use std::collections::HashSet;

use rusqlite::{params, Connection, ErrorCode, OptionalExtension, Row};

use super::{extra_from_text, extra_to_text, from_json_text, to_json_text};
use crate::db::Db;
use crate::error::{BizgraphError, Result};
use crate::model::{Relationship, RelationshipUpdate};

const SELECT_RELATIONSHIP: &str = "SELECT id, from_node, to_node, label, type, description, \
     businessMeaning, joinCondition, dataLineage, derivationLogic, usedInDecisions, extra \
     FROM relationships";

const ORDER: &str = "ORDER BY from_node, to_node, label";

fn relationship_from_row(row: &Row) -> rusqlite::Result<Relationship> {
    Ok(Relationship {
        id: row.get(0)?,
        from: row.get(1)?,
        to: row.get(2)?,
        label: row.get(3)?,
        rel_type: row.get(4)?,
        description: row.get(5)?,
        business_meaning: row.get(6)?,
        join_condition: from_json_text(row.get(7)?),
        data_lineage: from_json_text(row.get(8)?),
        derivation_logic: row.get(9)?,
        used_in_decisions: from_json_text(row.get(10)?),
        extra: extra_from_text(row.get(11)?),
    })
}

fn fetch_relationship(conn: &Connection, id: i64) -> Result<Option<Relationship>> {
    let rel = conn
        .query_row(
            &format!("{} WHERE id = ?1", SELECT_RELATIONSHIP),
            params![id],
            relationship_from_row,
        )
        .optional()?;
    Ok(rel)
}

fn query_relationships(
    conn: &Connection,
    filter: &str,
    args: impl rusqlite::Params,
) -> Result<Vec<Relationship>> {
    let mut stmt = conn.prepare(&format!("{} {} {}", SELECT_RELATIONSHIP, filter, ORDER))?;
    let rels = stmt
        .query_map(args, relationship_from_row)?
        .collect::<std::result::Result<Vec<_>, rusqlite::Error>>()?;
    Ok(rels)
}

fn conflict_on_unique(err: rusqlite::Error, rel: &Relationship) -> BizgraphError {
    match err.sqlite_error_code() {
        Some(ErrorCode::ConstraintViolation) => BizgraphError::Conflict(format!(
            "Relationship {} -[{}]-> {}",
            rel.from, rel.label, rel.to
        )),
        _ => BizgraphError::Database(err),
    }
}

/// Insert `rel`, overwriting the row with the same (from, to, label). Returns
/// the row id, which stays stable across overwrites.
pub(crate) fn write_relationship(conn: &Connection, rel: &Relationship) -> Result<i64> {
    let id = conn.query_row(
        "INSERT INTO relationships (
            from_node, to_node, label, type, description, businessMeaning,
            joinCondition, dataLineage, derivationLogic, usedInDecisions, extra
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
        ON CONFLICT(from_node, to_node, label) DO UPDATE SET
            type = excluded.type,
            description = excluded.description,
            businessMeaning = excluded.businessMeaning,
            joinCondition = excluded.joinCondition,
            dataLineage = excluded.dataLineage,
            derivationLogic = excluded.derivationLogic,
            usedInDecisions = excluded.usedInDecisions,
            extra = excluded.extra
        RETURNING id",
        params![
            rel.from,
            rel.to,
            rel.label,
            rel.rel_type,
            rel.description,
            rel.business_meaning,
            to_json_text(&rel.join_condition)?,
            to_json_text(&rel.data_lineage)?,
            rel.derivation_logic,
            to_json_text(&rel.used_in_decisions)?,
            extra_to_text(&rel.extra)?,
        ],
        |row| row.get(0),
    )?;
    Ok(id)
}

pub async fn list_relationships(db: &Db) -> Result<Vec<Relationship>> {
    db.with_connection(|conn| query_relationships(conn, "", [])).await
}

pub async fn get_relationship(db: &Db, id: i64) -> Result<Option<Relationship>> {
    db.with_connection(move |conn| fetch_relationship(conn, id)).await
}

/// Every relationship with `node_id` at either end
pub async fn relationships_for_node(db: &Db, node_id: &str) -> Result<Vec<Relationship>> {
    let node_id = node_id.to_string();
    db.with_connection(move |conn| {
        query_relationships(conn, "WHERE from_node = ?1 OR to_node = ?1", params![node_id])
    })
    .await
}

pub async fn insert_relationship(db: &Db, rel: Relationship) -> Result<i64> {
    db.with_connection(move |conn| write_relationship(conn, &rel)).await
}

/// Number of distinct rows touched; repeats of a natural key collapse into one
fn write_all(conn: &Connection, rels: &[Relationship]) -> Result<usize> {
    let mut ids = HashSet::new();
    for rel in rels {
        ids.insert(write_relationship(conn, rel)?);
    }
    Ok(ids.len())
}

/// Upsert a batch in one transaction; returns the number of distinct rows written
pub async fn insert_relationships(db: &Db, rels: Vec<Relationship>) -> Result<usize> {
    db.with_connection(move |conn| {
        let tx = conn.transaction()?;
        let written = write_all(&tx, &rels)?;
        tx.commit()?;
        Ok(written)
    })
    .await
}

/// Apply `patch` to relationship `id`. Returns false when no such row exists.
/// Moving it onto another row's (from, to, label) is a conflict.
pub async fn update_relationship(db: &Db, id: i64, patch: RelationshipUpdate) -> Result<bool> {
    db.with_connection(move |conn| {
        let mut rel = match fetch_relationship(conn, id)? {
            Some(rel) => rel,
            None => return Ok(false),
        };
        rel.apply(patch);
        conn.execute(
            "UPDATE relationships SET
                from_node = ?1, to_node = ?2, label = ?3, type = ?4, description = ?5,
                businessMeaning = ?6, joinCondition = ?7, dataLineage = ?8,
                derivationLogic = ?9, usedInDecisions = ?10
            WHERE id = ?11",
            params![
                rel.from,
                rel.to,
                rel.label,
                rel.rel_type,
                rel.description,
                rel.business_meaning,
                to_json_text(&rel.join_condition)?,
                to_json_text(&rel.data_lineage)?,
                rel.derivation_logic,
                to_json_text(&rel.used_in_decisions)?,
                id,
            ],
        )
        .map_err(|e| conflict_on_unique(e, &rel))?;
        Ok(true)
    })
    .await
}

pub async fn delete_relationship(db: &Db, id: i64) -> Result<bool> {
    db.with_connection(move |conn| {
        let deleted = conn.execute("DELETE FROM relationships WHERE id = ?1", params![id])?;
        Ok(deleted > 0)
    })
    .await
}

/// Replace the whole relationship table with `rels`. Duplicate natural keys
/// in `rels` collapse to the last one.
pub async fn replace_relationships(db: &Db, rels: Vec<Relationship>) -> Result<usize> {
    db.with_connection(move |conn| {
        let tx = conn.transaction()?;
        tx.execute("DELETE FROM relationships", [])?;
        write_all(&tx, &rels)?;
        tx.commit()?;
        let stored = conn.query_row("SELECT COUNT(*) FROM relationships", [], |row| row.get::<_, i64>(0))?;
        Ok(stored as usize)
    })
    .await
}
