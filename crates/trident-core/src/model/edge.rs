use serde::{Deserialize, Serialize};

use super::node::NodeId;

/// One `target_var <- source_expr` pair in an edge's mapping, where
/// `source_expr` is a dotted field path into the upstream node's output.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldMapping {
    pub target_var: String,
    pub source_expr: String,
}

/// A boolean expression over the source node's output, with `output` bound
/// to that output and its top-level fields also bound by name. Evaluation
/// is delegated to the `condition` module; this wrapper just carries the
/// source text.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Condition(pub String);

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Edge {
    #[serde(default)]
    pub id: String,
    pub from_node: NodeId,
    pub to_node: NodeId,
    #[serde(default)]
    pub mappings: Vec<FieldMapping>,
    #[serde(default)]
    pub condition: Option<Condition>,
}
