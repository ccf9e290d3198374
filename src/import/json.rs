//! Fallback import from pre-normalized JSON files (`nodes.json`,
//! `relationships.json`, `journeys.json`, `positions.json`).
//!
//! Unlike the literal import this path upserts into the existing tables. It
//! also accepts the older channel-grouped layouts: relationships as
//! `{channel: [rel, ...]}` and journeys as `{channel: {key: journey}}`.

use std::path::Path;

use serde_json::{Map, Value};

use super::{nodes_from_values, positions_from_map, relationships_from_values, ImportReport, Table};
use crate::db::Db;
use crate::error::{BizgraphError, Result};
use crate::store;

fn file_name(table: Table) -> &'static str {
    match table {
        Table::Nodes => "nodes.json",
        Table::Relationships => "relationships.json",
        Table::Journeys => "journeys.json",
        Table::Positions => "positions.json",
    }
}

fn read_json(path: &Path) -> Result<Value> {
    let text = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&text)?)
}

/// Relationships as a plain array, or channel-grouped arrays flattened
pub(crate) fn flatten_relationships(value: Value) -> Result<Vec<Value>> {
    match value {
        Value::Array(items) => Ok(items),
        Value::Object(channels) => Ok(channels
            .into_iter()
            .filter_map(|(_, rels)| match rels {
                Value::Array(items) => Some(items),
                _ => None,
            })
            .flatten()
            .collect()),
        _ => Err(BizgraphError::SchemaMismatch(
            "relationships.json must be an array or an object of arrays".to_string(),
        )),
    }
}

/// A journey record has a path or a name; a channel group has neither and
/// holds only objects
fn is_channel_group(value: &Value) -> bool {
    match value {
        Value::Object(map) => {
            !map.contains_key("path")
                && !map.contains_key("name")
                && !map.is_empty()
                && map.values().all(Value::is_object)
        }
        _ => false,
    }
}

/// Journeys keyed directly, or channel-grouped maps merged (later channels win)
pub(crate) fn flatten_journeys(value: Value) -> Result<Map<String, Value>> {
    let top = match value {
        Value::Object(map) => map,
        _ => {
            return Err(BizgraphError::SchemaMismatch(
                "journeys.json must be an object".to_string(),
            ))
        }
    };

    let mut journeys = Map::new();
    for (key, value) in top {
        if is_channel_group(&value) {
            if let Value::Object(group) = value {
                journeys.extend(group);
            }
        } else {
            journeys.insert(key, value);
        }
    }
    Ok(journeys)
}

/// Positions as `{node_id: {x, y}}` or wrapped in `{"nodes": {...}}`
pub(crate) fn unwrap_positions(value: Value) -> Map<String, Value> {
    match value {
        Value::Object(mut map) => match map.remove("nodes") {
            Some(Value::Object(nodes)) => nodes,
            Some(other) => {
                map.insert("nodes".to_string(), other);
                map
            }
            None => map,
        },
        _ => Map::new(),
    }
}

async fn upsert_table(db: &Db, table: Table, value: Value) -> Result<usize> {
    match table {
        Table::Nodes => {
            let items = match value {
                Value::Array(items) => items,
                _ => {
                    return Err(BizgraphError::SchemaMismatch(
                        "nodes.json must be an array".to_string(),
                    ))
                }
            };
            store::upsert_nodes(db, nodes_from_values(items)).await
        }
        Table::Relationships => {
            let rels = relationships_from_values(flatten_relationships(value)?);
            store::insert_relationships(db, rels).await
        }
        Table::Journeys => store::insert_journeys(db, flatten_journeys(value)?).await,
        Table::Positions => {
            store::insert_positions(db, positions_from_map(unwrap_positions(value))).await
        }
    }
}

/// Upsert every JSON file present in `dir`
pub async fn import_json_dir(db: &Db, dir: &Path) -> Result<ImportReport> {
    log::info!("Loading data from JSON files in {}", dir.display());
    let mut report = ImportReport::default();

    for table in Table::ALL {
        let path = dir.join(file_name(table));
        if !path.is_file() {
            log::debug!("No {} in {}", file_name(table), dir.display());
            continue;
        }
        let source = path.display().to_string();

        let value = match read_json(&path) {
            Ok(value) => value,
            Err(e) => {
                report.fail(table, &source, e);
                continue;
            }
        };

        match upsert_table(db, table, value).await {
            Ok(count) => {
                log::info!("Loaded {} {} from JSON", count, table);
                report.record(table, count);
            }
            Err(e @ BizgraphError::Database(_)) => return Err(e),
            Err(e) => report.fail(table, &source, e),
        }
    }

    Ok(report.finish())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::test_support::migrated_db;
    use serde_json::json;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_flatten_relationships_channels() {
        let flat = flatten_relationships(json!({
            "web": [{"from": "a", "to": "b", "label": "x"}],
            "store": [{"from": "c", "to": "d", "label": "y"}],
            "notes": "ignored",
        }))
        .unwrap();
        assert_eq!(flat.len(), 2);
        assert!(flatten_relationships(json!("nope")).is_err());
    }

    #[test]
    fn test_flatten_journeys_both_layouts() {
        let direct = flatten_journeys(json!({"j1": {"name": "One", "path": ["a"]}})).unwrap();
        assert!(direct.contains_key("j1"));

        let grouped = flatten_journeys(json!({
            "web": {"j1": {"name": "One"}, "j2": {"name": "Two"}},
            "store": {"j3": {"path": ["x"]}},
        }))
        .unwrap();
        let mut keys: Vec<&String> = grouped.keys().collect();
        keys.sort();
        assert_eq!(keys, vec!["j1", "j2", "j3"]);
    }

    #[test]
    fn test_unwrap_positions() {
        let wrapped = unwrap_positions(json!({"nodes": {"a": {"x": 1, "y": 2}}}));
        assert!(wrapped.contains_key("a"));
        let plain = unwrap_positions(json!({"a": {"x": 1, "y": 2}}));
        assert!(plain.contains_key("a"));
        assert!(unwrap_positions(json!([1, 2])).is_empty());
    }

    #[tokio::test]
    async fn test_import_json_dir_upserts() {
        let (_db_dir, db) = migrated_db().await;
        let dir = TempDir::new().unwrap();
        fs::write(
            dir.path().join("nodes.json"),
            r#"[{"id": "a", "module": "M"}, {"id": "b"}, {"module": "no id"}]"#,
        )
        .unwrap();
        fs::write(
            dir.path().join("relationships.json"),
            r#"{"core": [{"from": "a", "to": "b", "label": "uses"}]}"#,
        )
        .unwrap();
        fs::write(dir.path().join("journeys.json"), r#"{"web": {"j": {"name": "J", "path": ["a"]}}}"#)
            .unwrap();
        fs::write(dir.path().join("positions.json"), r#"{"nodes": {"a": {"x": 3, "y": 4}}}"#).unwrap();

        store::upsert_node(
            &db,
            crate::model::Node {
                id: "a".to_string(),
                color: Some("blue".to_string()),
                ..Default::default()
            },
        )
        .await
        .unwrap();

        let report = import_json_dir(&db, dir.path()).await.unwrap();
        assert!(report.is_clean(), "{:?}", report.failures);
        assert_eq!(
            (report.nodes, report.relationships, report.journeys, report.positions),
            (2, 1, 1, 1)
        );

        // upsert keeps fields the file does not mention
        let a = store::get_node(&db, "a").await.unwrap().unwrap();
        assert_eq!(a.color.as_deref(), Some("blue"));
        assert_eq!(a.module.as_deref(), Some("M"));
    }

    #[tokio::test]
    async fn test_bad_json_file_is_isolated() {
        let (_db_dir, db) = migrated_db().await;
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("nodes.json"), "[{\"id\": \"a\"},").unwrap();
        fs::write(dir.path().join("positions.json"), r#"{"a": {"x": 1, "y": 1}}"#).unwrap();

        let report = import_json_dir(&db, dir.path()).await.unwrap();
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].table, "nodes");
        assert_eq!(report.positions, 1);
    }
}
