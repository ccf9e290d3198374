//! Graph records as they appear in the data dumps and on the wire.
//!
//! Field names follow the camelCase keys of the dumps. Open-ended nested
//! fields are kept as [`Value`]; keys with no dedicated field land in `extra`
//! and are persisted alongside the record.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{BizgraphError, Result};

/// Unknown record keys, preserved verbatim
pub type Extra = Map<String, Value>;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Node {
    #[serde(deserialize_with = "lenient::key")]
    pub id: String,
    #[serde(default, deserialize_with = "lenient::text", skip_serializing_if = "Option::is_none")]
    pub module: Option<String>,
    #[serde(default, deserialize_with = "lenient::text", skip_serializing_if = "Option::is_none")]
    pub node_type: Option<String>,
    #[serde(default, deserialize_with = "lenient::text", skip_serializing_if = "Option::is_none")]
    pub definition: Option<String>,
    #[serde(default, deserialize_with = "lenient::text", skip_serializing_if = "Option::is_none")]
    pub business_meaning: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attributes: Option<Value>,
    #[serde(default, deserialize_with = "lenient::text", skip_serializing_if = "Option::is_none")]
    pub grain: Option<String>,
    #[serde(default, deserialize_with = "lenient::text", skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_sources: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub column_lineage: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub derived_concepts: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group_by_options: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub store_type_values: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub used_in_decisions: Option<Value>,
    #[serde(default, deserialize_with = "lenient::text", skip_serializing_if = "Option::is_none")]
    pub business_rule: Option<String>,
    #[serde(flatten)]
    pub extra: Extra,
}

impl Node {
    /// Build a node from a parsed record; the record must carry a non-empty
    /// `id`, numeric ids are read as their decimal text
    pub fn from_value(value: Value) -> Result<Self> {
        match value.get("id") {
            Some(Value::String(id)) if !id.is_empty() => {}
            Some(Value::Number(_)) => {}
            _ => {
                return Err(BizgraphError::SchemaMismatch(
                    "node record has no id".to_string(),
                ))
            }
        }
        serde_json::from_value(value)
            .map_err(|e| BizgraphError::SchemaMismatch(format!("node record: {}", e)))
    }

    /// Merge every field set in `patch` into this node
    pub fn apply(&mut self, patch: NodeUpdate) {
        merge(&mut self.module, patch.module);
        merge(&mut self.node_type, patch.node_type);
        merge(&mut self.definition, patch.definition);
        merge(&mut self.business_meaning, patch.business_meaning);
        merge(&mut self.attributes, patch.attributes);
        merge(&mut self.grain, patch.grain);
        merge(&mut self.color, patch.color);
        merge(&mut self.data_sources, patch.data_sources);
        merge(&mut self.column_lineage, patch.column_lineage);
        merge(&mut self.derived_concepts, patch.derived_concepts);
        merge(&mut self.group_by_options, patch.group_by_options);
        merge(&mut self.store_type_values, patch.store_type_values);
        merge(&mut self.used_in_decisions, patch.used_in_decisions);
        merge(&mut self.business_rule, patch.business_rule);
        for (key, value) in patch.extra {
            // identity is not patchable
            if key != "id" && !value.is_null() {
                self.extra.insert(key, value);
            }
        }
    }
}

/// Partial node update; unset and null fields leave the stored value alone
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeUpdate {
    #[serde(default, deserialize_with = "lenient::text")]
    pub module: Option<String>,
    #[serde(default, deserialize_with = "lenient::text")]
    pub node_type: Option<String>,
    #[serde(default, deserialize_with = "lenient::text")]
    pub definition: Option<String>,
    #[serde(default, deserialize_with = "lenient::text")]
    pub business_meaning: Option<String>,
    #[serde(default)]
    pub attributes: Option<Value>,
    #[serde(default, deserialize_with = "lenient::text")]
    pub grain: Option<String>,
    #[serde(default, deserialize_with = "lenient::text")]
    pub color: Option<String>,
    #[serde(default)]
    pub data_sources: Option<Value>,
    #[serde(default)]
    pub column_lineage: Option<Value>,
    #[serde(default)]
    pub derived_concepts: Option<Value>,
    #[serde(default)]
    pub group_by_options: Option<Value>,
    #[serde(default)]
    pub store_type_values: Option<Value>,
    #[serde(default)]
    pub used_in_decisions: Option<Value>,
    #[serde(default, deserialize_with = "lenient::text")]
    pub business_rule: Option<String>,
    #[serde(flatten)]
    pub extra: Extra,
}

impl From<Node> for NodeUpdate {
    fn from(node: Node) -> Self {
        Self {
            module: node.module,
            node_type: node.node_type,
            definition: node.definition,
            business_meaning: node.business_meaning,
            attributes: node.attributes,
            grain: node.grain,
            color: node.color,
            data_sources: node.data_sources,
            column_lineage: node.column_lineage,
            derived_concepts: node.derived_concepts,
            group_by_options: node.group_by_options,
            store_type_values: node.store_type_values,
            used_in_decisions: node.used_in_decisions,
            business_rule: node.business_rule,
            extra: node.extra,
        }
    }
}

/// Directed, labeled edge. `(from, to, label)` is the natural key.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Relationship {
    /// Row id, assigned by the store
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    #[serde(alias = "from_node", deserialize_with = "lenient::key")]
    pub from: String,
    #[serde(alias = "to_node", deserialize_with = "lenient::key")]
    pub to: String,
    #[serde(deserialize_with = "lenient::key")]
    pub label: String,
    #[serde(rename = "type", default, deserialize_with = "lenient::text", skip_serializing_if = "Option::is_none")]
    pub rel_type: Option<String>,
    #[serde(default, deserialize_with = "lenient::text", skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, deserialize_with = "lenient::text", skip_serializing_if = "Option::is_none")]
    pub business_meaning: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub join_condition: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_lineage: Option<Value>,
    #[serde(default, deserialize_with = "lenient::text", skip_serializing_if = "Option::is_none")]
    pub derivation_logic: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub used_in_decisions: Option<Value>,
    #[serde(flatten)]
    pub extra: Extra,
}

impl Relationship {
    /// Build a relationship from a parsed record; `from`, `to` and `label` are required
    pub fn from_value(value: Value) -> Result<Self> {
        let rel: Relationship = serde_json::from_value(value)
            .map_err(|e| BizgraphError::SchemaMismatch(format!("relationship record: {}", e)))?;
        if rel.from.is_empty() || rel.to.is_empty() || rel.label.is_empty() {
            return Err(BizgraphError::SchemaMismatch(
                "relationship record needs from, to and label".to_string(),
            ));
        }
        Ok(rel)
    }

    /// Whether either endpoint is `node_id`
    pub fn touches(&self, node_id: &str) -> bool {
        self.from == node_id || self.to == node_id
    }

    /// The endpoint that is not `node_id`
    pub fn other_end(&self, node_id: &str) -> &str {
        if self.from == node_id {
            &self.to
        } else {
            &self.from
        }
    }

    pub fn apply(&mut self, patch: RelationshipUpdate) {
        merge(&mut self.from, patch.from);
        merge(&mut self.to, patch.to);
        merge(&mut self.label, patch.label);
        merge(&mut self.rel_type, patch.rel_type);
        merge(&mut self.description, patch.description);
        merge(&mut self.business_meaning, patch.business_meaning);
        merge(&mut self.join_condition, patch.join_condition);
        merge(&mut self.data_lineage, patch.data_lineage);
        merge(&mut self.derivation_logic, patch.derivation_logic);
        merge(&mut self.used_in_decisions, patch.used_in_decisions);
    }
}

/// Partial relationship update; unset and null fields are left alone
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RelationshipUpdate {
    #[serde(default, alias = "from_node", deserialize_with = "lenient::text")]
    pub from: Option<String>,
    #[serde(default, alias = "to_node", deserialize_with = "lenient::text")]
    pub to: Option<String>,
    #[serde(default, deserialize_with = "lenient::text")]
    pub label: Option<String>,
    #[serde(rename = "type", default, deserialize_with = "lenient::text")]
    pub rel_type: Option<String>,
    #[serde(default, deserialize_with = "lenient::text")]
    pub description: Option<String>,
    #[serde(default, deserialize_with = "lenient::text")]
    pub business_meaning: Option<String>,
    #[serde(default)]
    pub join_condition: Option<Value>,
    #[serde(default)]
    pub data_lineage: Option<Value>,
    #[serde(default, deserialize_with = "lenient::text")]
    pub derivation_logic: Option<String>,
    #[serde(default)]
    pub used_in_decisions: Option<Value>,
}

/// One `{from, to}` hop of a journey's data flow
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DataFlowStep {
    #[serde(default, deserialize_with = "lenient::key")]
    pub from: String,
    #[serde(default, deserialize_with = "lenient::key")]
    pub to: String,
    #[serde(flatten)]
    pub extra: Extra,
}

/// Named, ordered traversal of nodes
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Journey {
    /// Set from the enclosing map key when loaded from a dump
    #[serde(rename = "journey_key", default, deserialize_with = "lenient::key", skip_serializing_if = "String::is_empty")]
    pub key: String,
    #[serde(default, deserialize_with = "lenient::text", skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, deserialize_with = "lenient::text", skip_serializing_if = "Option::is_none")]
    pub short_name: Option<String>,
    #[serde(default, deserialize_with = "lenient::text", skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, deserialize_with = "lenient::text", skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
    #[serde(default, deserialize_with = "lenient::text", skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(default, deserialize_with = "lenient::path", skip_serializing_if = "Vec::is_empty")]
    pub path: Vec<String>,
    #[serde(default, deserialize_with = "lenient::or_default", skip_serializing_if = "Vec::is_empty")]
    pub data_flow: Vec<DataFlowStep>,
    #[serde(default, deserialize_with = "lenient::text", skip_serializing_if = "Option::is_none")]
    pub decision_node: Option<String>,
    #[serde(default, deserialize_with = "lenient::text", skip_serializing_if = "Option::is_none")]
    pub formula: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kpis_affected: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub triggers: Option<Value>,
    #[serde(default, deserialize_with = "lenient::text", skip_serializing_if = "Option::is_none")]
    pub target_channel: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub used_in_decisions: Option<Value>,
    #[serde(default, deserialize_with = "lenient::text", skip_serializing_if = "Option::is_none")]
    pub difference_from_core: Option<String>,
    #[serde(default, deserialize_with = "lenient::text", skip_serializing_if = "Option::is_none")]
    pub trigger_condition: Option<String>,
    #[serde(default, deserialize_with = "lenient::text", skip_serializing_if = "Option::is_none")]
    pub rule: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lifecycle_regimes: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub questions: Option<Value>,
    #[serde(flatten)]
    pub extra: Extra,
}

impl Journey {
    /// Build the journey stored under `key`; the record must be an object
    pub fn from_value(key: &str, value: Value) -> Result<Self> {
        if !value.is_object() {
            return Err(BizgraphError::SchemaMismatch(format!(
                "journey {} is not an object",
                key
            )));
        }
        let mut journey: Journey = serde_json::from_value(value)
            .map_err(|e| BizgraphError::SchemaMismatch(format!("journey {}: {}", key, e)))?;
        journey.key = key.to_string();
        Ok(journey)
    }

    /// Whether `node_id` is on this journey's path
    pub fn includes(&self, node_id: &str) -> bool {
        self.path.iter().any(|n| n == node_id)
    }
}

/// Layout coordinates for one node
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Position {
    #[serde(default, deserialize_with = "lenient::or_default")]
    pub x: f64,
    #[serde(default, deserialize_with = "lenient::or_default")]
    pub y: f64,
}

fn merge<T>(slot: &mut T, patch: Option<T::Inner>)
where
    T: Mergeable,
{
    if let Some(value) = patch {
        slot.set(value);
    }
}

/// Field that a patch value can overwrite
trait Mergeable {
    type Inner;
    fn set(&mut self, value: Self::Inner);
}

impl Mergeable for String {
    type Inner = String;
    fn set(&mut self, value: String) {
        *self = value;
    }
}

impl<T> Mergeable for Option<T> {
    type Inner = T;
    fn set(&mut self, value: T) {
        *self = Some(value);
    }
}

/// Field readers that accept what loosely typed dumps actually contain
mod lenient {
    use serde::de::{Deserialize, Deserializer, Error};
    use serde_json::Value;

    fn as_text(value: Value) -> String {
        match value {
            Value::String(s) => s,
            other => other.to_string(),
        }
    }

    /// Free text: `null` is unset, any other non-string keeps its JSON text
    pub fn text<'de, D>(deserializer: D) -> std::result::Result<Option<String>, D::Error>
    where
        D: Deserializer<'de>,
    {
        Ok(match Value::deserialize(deserializer)? {
            Value::Null => None,
            value => Some(as_text(value)),
        })
    }

    /// Identifier: a string, or a number read as its decimal text
    pub fn key<'de, D>(deserializer: D) -> std::result::Result<String, D::Error>
    where
        D: Deserializer<'de>,
    {
        match Value::deserialize(deserializer)? {
            Value::String(s) => Ok(s),
            Value::Number(n) => Ok(n.to_string()),
            Value::Null => Ok(String::new()),
            other => Err(D::Error::custom(format!(
                "expected a string or number, found {}",
                other
            ))),
        }
    }

    /// `null` reads as the empty collection
    pub fn or_default<'de, D, T>(deserializer: D) -> std::result::Result<T, D::Error>
    where
        D: Deserializer<'de>,
        T: Deserialize<'de> + Default,
    {
        Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
    }

    /// Node ids along a journey; `null` is an empty path, a lone id a one-step path
    pub fn path<'de, D>(deserializer: D) -> std::result::Result<Vec<String>, D::Error>
    where
        D: Deserializer<'de>,
    {
        match Value::deserialize(deserializer)? {
            Value::Null => Ok(Vec::new()),
            Value::Array(items) => Ok(items
                .into_iter()
                .filter(|item| !item.is_null())
                .map(as_text)
                .collect()),
            Value::String(id) => Ok(vec![id]),
            other => Err(D::Error::custom(format!(
                "expected a list of node ids, found {}",
                other
            ))),
        }
    }
}
