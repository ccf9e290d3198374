use std::collections::BTreeMap;

use rusqlite::{params, Connection, Row};
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};

use super::{extra_from_text, extra_to_text, from_json_text, to_json_text};
use crate::db::Db;
use crate::error::{BizgraphError, Result};
use crate::model::Journey;

const SELECT_JOURNEY: &str = "SELECT journey_key, name, shortName, description, color, category, \
     path, dataFlow, decisionNode, formula, kpisAffected, triggers, targetChannel, \
     usedInDecisions, differenceFromCore, triggerCondition, rule, lifecycleRegimes, questions, \
     extra FROM journeys";

/// Typed list column; unreadable content is logged and read as empty
fn list_column<T: DeserializeOwned>(key: &str, column: &str, text: Option<String>) -> Vec<T> {
    match text {
        Some(t) => serde_json::from_str(&t).unwrap_or_else(|e| {
            log::warn!("Journey {}: unreadable {} column: {}", key, column, e);
            Vec::new()
        }),
        None => Vec::new(),
    }
}

fn journey_from_row(row: &Row) -> rusqlite::Result<Journey> {
    let key: String = row.get(0)?;
    let path = list_column(&key, "path", row.get(6)?);
    let data_flow = list_column(&key, "dataFlow", row.get(7)?);
    Ok(Journey {
        name: row.get(1)?,
        short_name: row.get(2)?,
        description: row.get(3)?,
        color: row.get(4)?,
        category: row.get(5)?,
        path,
        data_flow,
        decision_node: row.get(8)?,
        formula: row.get(9)?,
        kpis_affected: from_json_text(row.get(10)?),
        triggers: from_json_text(row.get(11)?),
        target_channel: row.get(12)?,
        used_in_decisions: from_json_text(row.get(13)?),
        difference_from_core: row.get(14)?,
        trigger_condition: row.get(15)?,
        rule: row.get(16)?,
        lifecycle_regimes: from_json_text(row.get(17)?),
        questions: from_json_text(row.get(18)?),
        extra: extra_from_text(row.get(19)?),
        key,
    })
}

fn list_text<T: serde::Serialize>(items: &[T]) -> Result<Option<String>> {
    if items.is_empty() {
        return Ok(None);
    }
    Ok(Some(serde_json::to_string(items)?))
}

/// Insert or replace the journey stored under `journey.key`
pub(crate) fn write_journey(conn: &Connection, journey: &Journey) -> Result<()> {
    conn.execute(
        "INSERT OR REPLACE INTO journeys (
            journey_key, name, shortName, description, color, category, path, dataFlow,
            decisionNode, formula, kpisAffected, triggers, targetChannel, usedInDecisions,
            differenceFromCore, triggerCondition, rule, lifecycleRegimes, questions, extra
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10,
                  ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18, ?19, ?20)",
        params![
            journey.key,
            journey.name,
            journey.short_name,
            journey.description,
            journey.color,
            journey.category,
            list_text(&journey.path)?,
            list_text(&journey.data_flow)?,
            journey.decision_node,
            journey.formula,
            to_json_text(&journey.kpis_affected)?,
            to_json_text(&journey.triggers)?,
            journey.target_channel,
            to_json_text(&journey.used_in_decisions)?,
            journey.difference_from_core,
            journey.trigger_condition,
            journey.rule,
            to_json_text(&journey.lifecycle_regimes)?,
            to_json_text(&journey.questions)?,
            extra_to_text(&journey.extra)?,
        ],
    )?;
    Ok(())
}

fn fetch_journeys(conn: &Connection) -> Result<Vec<Journey>> {
    let mut stmt = conn.prepare(&format!("{} ORDER BY journey_key", SELECT_JOURNEY))?;
    let journeys = stmt
        .query_map([], journey_from_row)?
        .collect::<std::result::Result<Vec<_>, rusqlite::Error>>()?;
    Ok(journeys)
}

/// Convert a `key -> journey` map, skipping empty and non-object values
pub fn journeys_from_map(map: Map<String, Value>) -> Vec<Journey> {
    map.into_iter()
        .filter_map(|(key, value)| match value {
            Value::Object(ref obj) if obj.is_empty() => None,
            Value::Object(_) => match Journey::from_value(&key, value) {
                Ok(journey) => Some(journey),
                Err(e) => {
                    log::warn!("Skipping journey {}: {}", key, e);
                    None
                }
            },
            _ => {
                log::debug!("Skipping journey {}: not an object", key);
                None
            }
        })
        .collect()
}

/// All journeys ordered by key
pub async fn list_journeys(db: &Db) -> Result<Vec<Journey>> {
    db.with_connection(|conn| fetch_journeys(conn)).await
}

/// Journeys keyed by journey key; the key is not repeated inside each value
pub async fn journeys_dict(db: &Db) -> Result<BTreeMap<String, Journey>> {
    let journeys = list_journeys(db).await?;
    Ok(journeys
        .into_iter()
        .map(|mut j| (std::mem::take(&mut j.key), j))
        .collect())
}

pub async fn insert_journey(db: &Db, journey: Journey) -> Result<()> {
    if journey.key.is_empty() {
        return Err(BizgraphError::InvalidInput("journey_key must not be empty".to_string()));
    }
    db.with_connection(move |conn| write_journey(conn, &journey)).await
}

/// Insert or replace every object value of `map` under its key. Returns the
/// number written.
pub async fn insert_journeys(db: &Db, map: Map<String, Value>) -> Result<usize> {
    let journeys = journeys_from_map(map);
    db.with_connection(move |conn| {
        let tx = conn.transaction()?;
        for journey in &journeys {
            write_journey(&tx, journey)?;
        }
        tx.commit()?;
        Ok(journeys.len())
    })
    .await
}

/// Journeys whose path contains `node_id`
pub async fn journeys_for_node(db: &Db, node_id: &str) -> Result<Vec<Journey>> {
    let journeys = list_journeys(db).await?;
    Ok(journeys.into_iter().filter(|j| j.includes(node_id)).collect())
}

/// Replace the whole journey table with `journeys`
pub async fn replace_journeys(db: &Db, journeys: Vec<Journey>) -> Result<usize> {
    db.with_connection(move |conn| {
        let tx = conn.transaction()?;
        tx.execute("DELETE FROM journeys", [])?;
        for journey in &journeys {
            write_journey(&tx, journey)?;
        }
        tx.commit()?;
        Ok(journeys.len())
    })
    .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::test_support::migrated_db;
    use serde_json::json;

    fn journey_map() -> Map<String, Value> {
        match json!({
            "onboarding": {
                "name": "Onboarding",
                "path": ["lead", "customer"],
                "dataFlow": [{"from": "lead", "to": "customer"}],
                "kpisAffected": ["conversion"],
                "owner": "growth",
            },
            "renewal": {"name": "Renewal", "path": ["contract", "customer"]},
            "empty": {},
            "note": "not a journey",
        }) {
            Value::Object(map) => map,
            _ => unreachable!(),
        }
    }

    #[tokio::test]
    async fn test_insert_journeys_skips_non_objects() {
        let (_tmp, db) = migrated_db().await;
        let count = insert_journeys(&db, journey_map()).await.unwrap();
        assert_eq!(count, 2);

        let keys: Vec<String> = list_journeys(&db).await.unwrap().into_iter().map(|j| j.key).collect();
        assert_eq!(keys, vec!["onboarding", "renewal"]);
    }

    #[tokio::test]
    async fn test_round_trip_and_dict() {
        let (_tmp, db) = migrated_db().await;
        insert_journeys(&db, journey_map()).await.unwrap();

        let dict = journeys_dict(&db).await.unwrap();
        let onboarding = &dict["onboarding"];
        assert!(onboarding.key.is_empty());
        assert_eq!(onboarding.data_flow[0].to, "customer");
        assert_eq!(onboarding.kpis_affected, Some(json!(["conversion"])));
        assert_eq!(onboarding.extra.get("owner"), Some(&json!("growth")));

        let value = serde_json::to_value(onboarding).unwrap();
        assert!(value.get("journey_key").is_none());
    }

    #[tokio::test]
    async fn test_journeys_for_node() {
        let (_tmp, db) = migrated_db().await;
        insert_journeys(&db, journey_map()).await.unwrap();

        let for_customer = journeys_for_node(&db, "customer").await.unwrap();
        assert_eq!(for_customer.len(), 2);
        let for_lead = journeys_for_node(&db, "lead").await.unwrap();
        assert_eq!(for_lead.len(), 1);
        assert_eq!(for_lead[0].key, "onboarding");
        assert!(journeys_for_node(&db, "nobody").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_insert_journey_replaces_and_requires_key() {
        let (_tmp, db) = migrated_db().await;
        let mut journey = Journey {
            key: "k".to_string(),
            name: Some("First".to_string()),
            ..Default::default()
        };
        insert_journey(&db, journey.clone()).await.unwrap();
        journey.name = Some("Second".to_string());
        insert_journey(&db, journey).await.unwrap();

        let all = list_journeys(&db).await.unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].name.as_deref(), Some("Second"));

        let err = insert_journey(&db, Journey::default()).await.unwrap_err();
        assert!(matches!(err, BizgraphError::InvalidInput(_)));
    }

    #[tokio::test]
    async fn test_replace_journeys() {
        let (_tmp, db) = migrated_db().await;
        insert_journeys(&db, journey_map()).await.unwrap();
        let replaced = replace_journeys(
            &db,
            vec![Journey { key: "only".to_string(), ..Default::default() }],
        )
        .await
        .unwrap();
        assert_eq!(replaced, 1);
        assert_eq!(list_journeys(&db).await.unwrap()[0].key, "only");
    }
}
