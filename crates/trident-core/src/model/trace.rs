use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::value::Value;

/// Per-node execution record captured during a run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeTrace {
    pub node_id: String,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    pub inputs: Value,
    pub output: Option<Value>,
    pub model: Option<String>,
    pub input_tokens: Option<u64>,
    pub output_tokens: Option<u64>,
    pub skipped: bool,
    pub error: Option<String>,
    pub error_type: Option<String>,
    pub cost_usd: Option<f64>,
    pub session_id: Option<String>,
    pub turn_count: Option<u32>,
}

impl NodeTrace {
    pub fn start(node_id: impl Into<String>, inputs: Value) -> Self {
        Self {
            node_id: node_id.into(),
            started_at: Utc::now(),
            ended_at: None,
            inputs,
            output: None,
            model: None,
            input_tokens: None,
            output_tokens: None,
            skipped: false,
            error: None,
            error_type: None,
            cost_usd: None,
            session_id: None,
            turn_count: None,
        }
    }

    pub fn finish_ok(mut self, output: Value) -> Self {
        self.ended_at = Some(Utc::now());
        self.output = Some(output);
        self
    }

    pub fn finish_err(mut self, error_type: &str, message: impl Into<String>) -> Self {
        self.ended_at = Some(Utc::now());
        self.error_type = Some(error_type.to_string());
        self.error = Some(message.into());
        self
    }

    pub fn finish_skipped(mut self) -> Self {
        self.ended_at = Some(Utc::now());
        self.skipped = true;
        self
    }
}

/// The full trace of one run: every node's trace, plus a top-level error if
/// the run failed during setup or mid-level.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionTrace {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    pub nodes: Vec<NodeTrace>,
    pub error: Option<String>,
}

impl ExecutionTrace {
    pub fn new(run_id: Uuid) -> Self {
        Self {
            run_id,
            started_at: Utc::now(),
            ended_at: None,
            nodes: Vec::new(),
            error: None,
        }
    }

    pub fn finish(&mut self, error: Option<String>) {
        self.ended_at = Some(Utc::now());
        self.error = error;
    }

    /// Build a lookup of the final output per node id, used when
    /// flattening a trace into the run's outputs map.
    pub fn outputs_by_node(&self) -> BTreeMap<String, Value> {
        self.nodes
            .iter()
            .filter_map(|t| t.output.clone().map(|o| (t.node_id.clone(), o)))
            .collect()
    }
}
