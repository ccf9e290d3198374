//! Question answering over the graph: assemble a text context from the
//! store, then ask a chat model about it.

pub mod client;
pub mod context;

pub use client::ChatClient;
pub use context::{build_graph_context, build_node_context};

use std::collections::BTreeSet;

use crate::config::ChatConfig;
use crate::db::Db;
use crate::error::{BizgraphError, Result};
use crate::model::{Journey, Node, Relationship};
use crate::store;

const NODE_SYSTEM_PROMPT: &str = "You answer questions about one node of a business knowledge graph. \
Use only the context below: the focus node, its relationships, the related nodes and the flow journeys. \
Questions about the related nodes may be answered from the same context. \
Do not invent information; if the context does not contain the answer, say so. \
Decline questions that have nothing to do with this node. \
For column lineage questions, match the request to the closest entry even if it is misspelled. \
Explain your answer in at least two sentences.";

const GRAPH_SYSTEM_PROMPT: &str = "You are a traversal engine over a business logic graph, not a conversational assistant. \
Treat every request as a graph traversal: state the starting nodes, the relationship paths followed, \
the filters applied and the final node set. \
Use only the nodes and relationships listed below and never fabricate missing ones. \
If a node or relationship does not exist, reply \"Node/Relationship not found in graph.\" \
Answer in plain natural language without commentary, recommendations or summaries.";

/// Returned for whole-graph questions when no chat model is configured
pub const GRAPH_UNAVAILABLE: &str = "Not able to answer at this point (chat API key missing).";

/// Everything the node context is built from
#[derive(Debug, Clone)]
pub struct NodeNeighborhood {
    pub node: Node,
    pub relationships: Vec<Relationship>,
    pub related_nodes: Vec<Node>,
    pub journeys: Vec<Journey>,
}

impl NodeNeighborhood {
    /// Load node `node_id` with its direct relationships, the nodes at their
    /// other ends (those that exist) and the journeys through it
    pub async fn load(db: &Db, node_id: &str) -> Result<Self> {
        let node = store::get_node(db, node_id)
            .await?
            .ok_or_else(|| BizgraphError::NotFound(format!("Node '{}'", node_id)))?;
        let relationships = store::relationships_for_node(db, node_id).await?;

        let neighbor_ids: BTreeSet<&str> = relationships
            .iter()
            .map(|r| r.other_end(node_id))
            .filter(|id| *id != node_id)
            .collect();
        let mut related_nodes = Vec::with_capacity(neighbor_ids.len());
        for id in neighbor_ids {
            if let Some(n) = store::get_node(db, id).await? {
                related_nodes.push(n);
            }
        }

        let journeys = store::journeys_for_node(db, node_id).await?;
        Ok(Self {
            node,
            relationships,
            related_nodes,
            journeys,
        })
    }

    pub fn context(&self) -> String {
        build_node_context(
            &self.node,
            &self.relationships,
            &self.related_nodes,
            &self.journeys,
        )
    }
}

/// Answers questions with a chat model when one is configured, and degrades
/// to returning the raw context when not
pub struct Assistant {
    client: Option<ChatClient>,
    api_key_env: String,
}

impl Assistant {
    pub fn new(config: &ChatConfig) -> Result<Self> {
        let client = match &config.api_key {
            Some(key) => Some(ChatClient::new(key.clone(), config)?),
            None => None,
        };
        Ok(Self {
            client,
            api_key_env: config.api_key_env.clone(),
        })
    }

    pub fn is_enabled(&self) -> bool {
        self.client.is_some()
    }

    /// Answer `question` about one node
    pub async fn answer_for_node(&self, db: &Db, node_id: &str, question: &str) -> Result<String> {
        let neighborhood = NodeNeighborhood::load(db, node_id).await?;
        let context = neighborhood.context();

        match &self.client {
            Some(client) => {
                log::debug!(
                    "Asking {} about node {} ({} relationships, {} journeys)",
                    client.model(),
                    node_id,
                    neighborhood.relationships.len(),
                    neighborhood.journeys.len()
                );
                let system = format!("{}\n\n{}", NODE_SYSTEM_PROMPT, context);
                client.complete(&system, question).await
            }
            None => Ok(format!(
                "Context for this node:\n\n{}\n\nYour question: {}\n\n(Set {} for AI answers.)",
                context, question, self.api_key_env
            )
            .trim()
            .to_string()),
        }
    }

    /// Answer `question` about the whole graph
    pub async fn answer_for_graph(&self, db: &Db, question: &str) -> Result<String> {
        let Some(client) = &self.client else {
            return Ok(GRAPH_UNAVAILABLE.to_string());
        };

        let nodes = store::list_nodes(db, None, None).await?;
        let relationships = store::list_relationships(db).await?;
        let context = build_graph_context(&nodes, &relationships, nodes.len());
        let system = format!("{}\n\n{}", GRAPH_SYSTEM_PROMPT, context);
        client.complete(&system, question).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Position;
    use crate::store::test_support::migrated_db;
    use serde_json::json;

    async fn seeded() -> (tempfile::TempDir, Db) {
        let (tmp, db) = migrated_db().await;
        for (id, module) in [("customer", "Sales"), ("order", "Sales"), ("invoice", "Finance")] {
            store::upsert_node(&db, Node { id: id.to_string(), module: Some(module.to_string()), ..Default::default() })
                .await
                .unwrap();
        }
        for (from, to) in [("order", "customer"), ("customer", "ghost"), ("invoice", "order")] {
            store::insert_relationship(
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
        let journeys = match json!({"buy": {"name": "Buy", "path": ["order", "customer"]}}) {
            serde_json::Value::Object(map) => map,
            _ => unreachable!(),
        };
        store::insert_journeys(&db, journeys).await.unwrap();
        store::upsert_position(&db, "customer", Position::default()).await.unwrap();
        (tmp, db)
    }

    #[tokio::test]
    async fn test_neighborhood_skips_missing_nodes() {
        let (_tmp, db) = seeded().await;
        let hood = NodeNeighborhood::load(&db, "customer").await.unwrap();
        assert_eq!(hood.relationships.len(), 2);
        let related: Vec<&str> = hood.related_nodes.iter().map(|n| n.id.as_str()).collect();
        assert_eq!(related, vec!["order"]);
        assert_eq!(hood.journeys.len(), 1);
    }

    #[tokio::test]
    async fn test_node_answer_without_key_returns_context() {
        let (_tmp, db) = seeded().await;
        let assistant = Assistant::new(&ChatConfig::default()).unwrap();
        assert!(!assistant.is_enabled());

        let answer = assistant
            .answer_for_node(&db, "customer", "Who places orders?")
            .await
            .unwrap();
        assert!(answer.starts_with("Context for this node:"));
        assert!(answer.contains("## Focus node\nNode ID: customer"));
        assert!(answer.contains("Your question: Who places orders?"));
        assert!(answer.ends_with("(Set OPENAI_API_KEY for AI answers.)"));
    }

    #[tokio::test]
    async fn test_node_answer_for_missing_node() {
        let (_tmp, db) = seeded().await;
        let assistant = Assistant::new(&ChatConfig::default()).unwrap();
        let err = assistant.answer_for_node(&db, "nobody", "?").await.unwrap_err();
        assert!(matches!(err, BizgraphError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_graph_answer_without_key() {
        let (_tmp, db) = seeded().await;
        let assistant = Assistant::new(&ChatConfig::default()).unwrap();
        let answer = assistant.answer_for_graph(&db, "List modules").await.unwrap();
        assert_eq!(answer, GRAPH_UNAVAILABLE);
    }

    #[test]
    fn test_assistant_enabled_with_key() {
        let config = ChatConfig {
            api_key: Some("sk-test".to_string()),
            ..Default::default()
        };
        assert!(Assistant::new(&config).unwrap().is_enabled());
    }
}
