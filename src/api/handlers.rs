use std::io::ErrorKind;

use axum::{
    extract::{Path, Query, State},
    http::header,
    response::{IntoResponse, Response},
    Json,
};
use serde::Deserialize;
use serde_json::{json, Map, Value};

use super::error::{ApiError, ApiResult};
use super::AppState;
use crate::error::BizgraphError;
use crate::import::{import_literal_files, relationships_from_values};
use crate::model::{Journey, Node, NodeUpdate, Position, Relationship, RelationshipUpdate};
use crate::store;

#[derive(Debug, Deserialize)]
pub struct NodeFilter {
    pub module: Option<String>,
    #[serde(rename = "nodeType")]
    pub node_type: Option<String>,
}

/// Node body for creation, with an optional initial layout position
#[derive(Debug, Deserialize)]
pub struct NewNode {
    #[serde(default)]
    pub position: Option<Position>,
    #[serde(flatten)]
    pub node: Node,
}

#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    pub message: String,
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.is_empty())
}

fn question(req: ChatRequest) -> ApiResult<String> {
    let message = req.message.trim();
    if message.is_empty() {
        return Err(BizgraphError::InvalidInput("message must not be empty".to_string()).into());
    }
    Ok(message.to_string())
}

pub async fn health() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "message": "Business graph API is running",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

pub async fn stats(State(state): State<AppState>) -> ApiResult<Json<store::GraphStats>> {
    Ok(Json(store::stats(&state.db).await?))
}

/// Raw SQLite file, checkpointed first so the download includes WAL contents
pub async fn download_db(State(state): State<AppState>) -> ApiResult<Response> {
    let path = state.db.path().to_path_buf();
    if !path.is_file() {
        return Err(ApiError::not_found("Database file"));
    }
    state
        .db
        .with_connection(|conn| {
            conn.query_row("PRAGMA wal_checkpoint(TRUNCATE)", [], |_| Ok(()))?;
            Ok(())
        })
        .await?;

    let bytes = match tokio::fs::read(&path).await {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == ErrorKind::NotFound => return Err(ApiError::not_found("Database file")),
        Err(e) => return Err(BizgraphError::from(e).into()),
    };
    let file_name = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("graph.db")
        .to_string();

    Ok((
        [
            (header::CONTENT_TYPE, "application/x-sqlite3".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{}\"", file_name),
            ),
        ],
        bytes,
    )
        .into_response())
}

// Nodes

pub async fn list_nodes(
    State(state): State<AppState>,
    Query(filter): Query<NodeFilter>,
) -> ApiResult<Json<Value>> {
    let nodes = store::list_nodes(&state.db, non_empty(filter.module), non_empty(filter.node_type)).await?;
    Ok(Json(json!({ "count": nodes.len(), "nodes": nodes })))
}

pub async fn get_node(State(state): State<AppState>, Path(id): Path<String>) -> ApiResult<Json<Node>> {
    store::get_node(&state.db, &id)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::not_found(format!("Node '{}'", id)))
}

pub async fn create_node(State(state): State<AppState>, Json(body): Json<NewNode>) -> ApiResult<Json<Node>> {
    let node = store::insert_node(&state.db, body.node).await?;
    if let Some(position) = body.position {
        store::upsert_position(&state.db, &node.id, position).await?;
    }
    log::info!("Created node {}", node.id);
    Ok(Json(node))
}

pub async fn update_node(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(patch): Json<NodeUpdate>,
) -> ApiResult<Json<Node>> {
    store::update_node(&state.db, &id, patch)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::not_found(format!("Node '{}'", id)))
}

pub async fn delete_node(State(state): State<AppState>, Path(id): Path<String>) -> ApiResult<Json<Value>> {
    if !store::delete_node(&state.db, &id).await? {
        return Err(ApiError::not_found(format!("Node '{}'", id)));
    }
    Ok(Json(json!({ "message": format!("Node '{}' deleted", id) })))
}

// Positions

pub async fn get_positions(State(state): State<AppState>) -> ApiResult<Json<store::Positions>> {
    Ok(Json(store::get_positions(&state.db).await?))
}

pub async fn update_position(
    State(state): State<AppState>,
    Path(node_id): Path<String>,
    Json(pos): Json<Position>,
) -> ApiResult<Json<Value>> {
    store::upsert_position(&state.db, &node_id, pos).await?;
    Ok(Json(json!({ "node_id": node_id, "x": pos.x, "y": pos.y })))
}

// Relationships

pub async fn list_relationships(State(state): State<AppState>) -> ApiResult<Json<Value>> {
    let rels = store::list_relationships(&state.db).await?;
    Ok(Json(json!({ "count": rels.len(), "relationships": rels })))
}

pub async fn get_relationship(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> ApiResult<Json<Relationship>> {
    store::get_relationship(&state.db, id)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::not_found(format!("Relationship id {}", id)))
}

pub async fn create_relationship(
    State(state): State<AppState>,
    Json(body): Json<Value>,
) -> ApiResult<Json<Value>> {
    let rel = Relationship::from_value(body)?;
    let id = store::insert_relationship(&state.db, rel).await?;
    Ok(Json(json!({ "id": id, "message": "Relationship created" })))
}

pub async fn update_relationship(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(patch): Json<RelationshipUpdate>,
) -> ApiResult<Json<Value>> {
    if !store::update_relationship(&state.db, id, patch).await? {
        return Err(ApiError::not_found(format!("Relationship id {}", id)));
    }
    Ok(Json(json!({ "id": id, "message": "Relationship updated" })))
}

pub async fn delete_relationship(State(state): State<AppState>, Path(id): Path<i64>) -> ApiResult<Json<Value>> {
    if !store::delete_relationship(&state.db, id).await? {
        return Err(ApiError::not_found(format!("Relationship id {}", id)));
    }
    Ok(Json(json!({ "message": format!("Relationship id {} deleted", id) })))
}

// Journeys

pub async fn list_journeys(State(state): State<AppState>) -> ApiResult<Json<Value>> {
    let journeys = store::list_journeys(&state.db).await?;
    Ok(Json(json!({ "count": journeys.len(), "journeys": journeys })))
}

pub async fn journeys_dict(State(state): State<AppState>) -> ApiResult<Json<Value>> {
    let dict = store::journeys_dict(&state.db).await?;
    Ok(Json(serde_json::to_value(dict).map_err(BizgraphError::from)?))
}

pub async fn create_journey(State(state): State<AppState>, Json(journey): Json<Journey>) -> ApiResult<Json<Value>> {
    let key = journey.key.clone();
    store::insert_journey(&state.db, journey).await?;
    Ok(Json(json!({ "journey_key": key, "message": "Journey created" })))
}

// Bulk

pub async fn bulk_nodes(State(state): State<AppState>, Json(nodes): Json<Vec<Node>>) -> ApiResult<Json<Value>> {
    if nodes.iter().any(|n| n.id.is_empty()) {
        return Err(BizgraphError::InvalidInput("every node needs an id".to_string()).into());
    }
    let count = store::upsert_nodes(&state.db, nodes).await?;
    Ok(Json(json!({ "message": format!("Upserted {} nodes", count) })))
}

pub async fn bulk_relationships(
    State(state): State<AppState>,
    Json(items): Json<Vec<Value>>,
) -> ApiResult<Json<Value>> {
    let count = store::insert_relationships(&state.db, relationships_from_values(items)).await?;
    Ok(Json(json!({ "message": format!("Inserted {} relationships", count) })))
}

pub async fn bulk_journeys(
    State(state): State<AppState>,
    Json(map): Json<Map<String, Value>>,
) -> ApiResult<Json<Value>> {
    let count = store::insert_journeys(&state.db, map).await?;
    Ok(Json(json!({ "message": format!("Inserted {} journeys", count) })))
}

// Admin

pub async fn reload(State(state): State<AppState>) -> ApiResult<Json<Value>> {
    let report = import_literal_files(&state.db, &state.config.data).await?;
    let mut body = serde_json::to_value(&report).map_err(BizgraphError::from)?;
    body["message"] = json!("Data reloaded from literal files");
    Ok(Json(body))
}

pub async fn clear(State(state): State<AppState>) -> ApiResult<Json<Value>> {
    store::clear_all(&state.db).await?;
    Ok(Json(json!({ "message": "Database cleared" })))
}

// Chat

pub async fn node_chat(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<ChatRequest>,
) -> ApiResult<Json<Value>> {
    let question = question(req)?;
    let answer = state.assistant.answer_for_node(&state.db, &id, &question).await?;
    Ok(Json(json!({ "node_id": id, "answer": answer })))
}

pub async fn graph_chat(State(state): State<AppState>, Json(req): Json<ChatRequest>) -> ApiResult<Json<Value>> {
    let question = question(req)?;
    let answer = state.assistant.answer_for_graph(&state.db, &question).await?;
    Ok(Json(json!({ "answer": answer })))
}
