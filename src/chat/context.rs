//! Plain-text context blocks handed to the chat model.

use serde_json::Value;

use crate::model::{Journey, Node, Relationship};

fn truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64() != Some(0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(a) => !a.is_empty(),
        Value::Object(o) => !o.is_empty(),
    }
}

/// Strings without their quotes, anything else as compact JSON
fn display_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// A field that is either a list or a single item
fn items(value: &Value) -> Vec<&Value> {
    match value {
        Value::Array(a) => a.iter().collect(),
        other => vec![other],
    }
}

fn non_empty(field: &Option<String>) -> Option<&str> {
    field.as_deref().filter(|s| !s.is_empty())
}

fn push_descriptors(parts: &mut Vec<String>, label: &str, field: &Option<Value>) {
    let Some(value) = field.as_ref().filter(|v| truthy(v)) else {
        return;
    };
    for item in items(value) {
        match item {
            Value::Object(obj) if !obj.is_empty() => {
                parts.push(format!("{}: [raw: {}]", label, item));
            }
            other if truthy(other) => parts.push(format!("{}: {}", label, display_value(other))),
            _ => {}
        }
    }
}

fn node_text(node: &Node) -> String {
    let mut parts = vec![
        format!("Node ID: {}", node.id),
        format!("Module: {}", node.module.as_deref().unwrap_or_default()),
        format!("Type: {}", node.node_type.as_deref().unwrap_or_default()),
        format!("Definition: {}", non_empty(&node.definition).unwrap_or("(none)")),
        format!(
            "Business meaning: {}",
            non_empty(&node.business_meaning).unwrap_or("(none)")
        ),
    ];

    if let Some(attributes) = node.attributes.as_ref().filter(|v| truthy(v)) {
        let names: Vec<String> = items(attributes).into_iter().map(display_value).collect();
        parts.push(format!("Attributes: {}", names.join(", ")));
    }
    push_descriptors(&mut parts, "dataSources", &node.data_sources);
    push_descriptors(&mut parts, "columnLineage", &node.column_lineage);

    parts.join("\n")
}

fn relationships_text(relationships: &[Relationship]) -> String {
    if relationships.is_empty() {
        return "(No relationships)".to_string();
    }
    relationships
        .iter()
        .map(|r| {
            let mut line = format!("  - {} --[{}]--> {}", r.from, r.label, r.to);
            if let Some(desc) = non_empty(&r.description) {
                line.push_str(&format!("  ({})", desc));
            }
            line
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn related_nodes_text(nodes: &[Node]) -> String {
    if nodes.is_empty() {
        return "(No related nodes)".to_string();
    }
    nodes.iter().map(node_text).collect::<Vec<_>>().join("\n\n")
}

fn journeys_text(journeys: &[Journey]) -> String {
    if journeys.is_empty() {
        return "(No flow journeys for this node)".to_string();
    }
    journeys
        .iter()
        .map(|j| {
            let flow = j
                .data_flow
                .iter()
                .map(|step| format!("{}->{}", step.from, step.to))
                .collect::<Vec<_>>()
                .join(" | ");
            format!(
                "Journey: {} ({})  Path: [{}]  Flow: {}",
                j.key,
                j.name.as_deref().unwrap_or_default(),
                j.path.join(", "),
                flow
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Context for a question about one node: the node, its direct
/// relationships, the nodes at their other ends, and the journeys through it
pub fn build_node_context(
    node: &Node,
    relationships: &[Relationship],
    related_nodes: &[Node],
    journeys: &[Journey],
) -> String {
    format!(
        "## Focus node\n{}\n\n\
         ## First / direct relationships for this node\n{}\n\n\
         ## Related nodes (connected by those relationships)\n{}\n\n\
         ## Flow journeys that include this node\n{}\n",
        node_text(node),
        relationships_text(relationships),
        related_nodes_text(related_nodes),
        journeys_text(journeys),
    )
}

/// Context for a question about the whole graph
pub fn build_graph_context(nodes: &[Node], relationships: &[Relationship], count: usize) -> String {
    let nodes_json = serde_json::to_string(nodes).unwrap_or_default();
    let relationships_json = serde_json::to_string(relationships).unwrap_or_default();
    format!(
        "Nodes Information: {}\nRelationships Information: {}\nTotal Number of Nodes : {}",
        nodes_json, relationships_json, count
    )
}
