use std::collections::BTreeMap;

use rusqlite::{params, Connection};

use crate::db::Db;
use crate::error::Result;
use crate::model::Position;

/// Node id to layout coordinates
pub type Positions = BTreeMap<String, Position>;

fn write_position(conn: &Connection, node_id: &str, pos: Position) -> Result<()> {
    conn.execute(
        "INSERT INTO positions (node_id, x, y) VALUES (?1, ?2, ?3)
         ON CONFLICT(node_id) DO UPDATE SET x = excluded.x, y = excluded.y",
        params![node_id, pos.x, pos.y],
    )?;
    Ok(())
}

pub async fn get_positions(db: &Db) -> Result<Positions> {
    db.with_connection(|conn| {
        let mut stmt = conn.prepare("SELECT node_id, x, y FROM positions")?;
        let positions = stmt
            .query_map([], |row| {
                Ok((row.get::<_, String>(0)?, Position { x: row.get(1)?, y: row.get(2)? }))
            })?
            .collect::<std::result::Result<Positions, rusqlite::Error>>()?;
        Ok(positions)
    })
    .await
}

/// Set one node's position; the node itself need not exist
pub async fn upsert_position(db: &Db, node_id: &str, pos: Position) -> Result<()> {
    let node_id = node_id.to_string();
    db.with_connection(move |conn| write_position(conn, &node_id, pos)).await
}

/// Upsert a batch in one transaction
pub async fn insert_positions(db: &Db, positions: Positions) -> Result<usize> {
    db.with_connection(move |conn| {
        let tx = conn.transaction()?;
        for (node_id, pos) in &positions {
            write_position(&tx, node_id, *pos)?;
        }
        tx.commit()?;
        Ok(positions.len())
    })
    .await
}

/// Replace the whole position table with `positions`
pub async fn replace_positions(db: &Db, positions: Positions) -> Result<usize> {
    db.with_connection(move |conn| {
        let tx = conn.transaction()?;
        tx.execute("DELETE FROM positions", [])?;
        for (node_id, pos) in &positions {
            write_position(&tx, node_id, *pos)?;
        }
        tx.commit()?;
        Ok(positions.len())
    })
    .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::test_support::migrated_db;
    use crate::store::get_node;

    #[tokio::test]
    async fn test_upsert_position_overwrites() {
        let (_tmp, db) = migrated_db().await;
        upsert_position(&db, "a", Position { x: 1.0, y: 2.0 }).await.unwrap();
        upsert_position(&db, "a", Position { x: 3.5, y: -4.0 }).await.unwrap();

        let positions = get_positions(&db).await.unwrap();
        assert_eq!(positions.len(), 1);
        assert_eq!(positions["a"], Position { x: 3.5, y: -4.0 });
    }

    #[tokio::test]
    async fn test_positions_independent_of_nodes() {
        let (_tmp, db) = migrated_db().await;
        let mut batch = Positions::new();
        batch.insert("ghost".to_string(), Position { x: 10.0, y: 20.0 });
        batch.insert("other".to_string(), Position::default());
        assert_eq!(insert_positions(&db, batch).await.unwrap(), 2);

        assert!(get_node(&db, "ghost").await.unwrap().is_none());
        assert_eq!(get_positions(&db).await.unwrap()["ghost"].y, 20.0);
    }

    #[tokio::test]
    async fn test_replace_positions() {
        let (_tmp, db) = migrated_db().await;
        upsert_position(&db, "old", Position { x: 1.0, y: 1.0 }).await.unwrap();

        let mut batch = Positions::new();
        batch.insert("new".to_string(), Position { x: 2.0, y: 2.0 });
        replace_positions(&db, batch).await.unwrap();

        let positions = get_positions(&db).await.unwrap();
        assert!(!positions.contains_key("old"));
        assert!(positions.contains_key("new"));
    }
}
