use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::value::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Running,
    Interrupted,
    Completed,
    Failed,
}

/// Per-completed-node data stored in a checkpoint, enough to replay the
/// node's trace on resume without re-running it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckpointedNode {
    pub output: Value,
    pub completed_at: DateTime<Utc>,
    pub session_id: Option<String>,
    pub cost_usd: Option<f64>,
    pub turn_count: Option<u32>,
}

/// Durable per-run record of completed nodes and branch state that allows
/// resumption after interruption.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Checkpoint {
    pub run_id: Uuid,
    pub project_name: String,
    pub started_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub status: RunStatus,
    pub completed_nodes: BTreeMap<String, CheckpointedNode>,
    pub pending_nodes: Vec<String>,
    pub total_cost_usd: f64,
    pub original_inputs: Value,
    pub entrypoint: Option<String>,
    pub branch_states: BTreeMap<String, u32>,
}

impl Checkpoint {
    pub fn new(
        run_id: Uuid,
        project_name: impl Into<String>,
        original_inputs: Value,
        entrypoint: Option<String>,
        pending_nodes: Vec<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            run_id,
            project_name: project_name.into(),
            started_at: now,
            updated_at: now,
            status: RunStatus::Running,
            completed_nodes: BTreeMap::new(),
            pending_nodes,
            total_cost_usd: 0.0,
            original_inputs,
            entrypoint,
            branch_states: BTreeMap::new(),
        }
    }

    pub fn mark_node_completed(&mut self, node_id: &str, node: CheckpointedNode) {
        if let Some(cost) = node.cost_usd {
            self.total_cost_usd += cost;
        }
        self.completed_nodes.insert(node_id.to_string(), node);
        self.pending_nodes.retain(|id| id != node_id);
        self.updated_at = Utc::now();
    }

    pub fn mark_status(&mut self, status: RunStatus) {
        self.status = status;
        self.updated_at = Utc::now();
    }

    pub fn record_branch_iteration(&mut self, branch_id: &str, iteration: u32) {
        self.branch_states.insert(branch_id.to_string(), iteration);
        self.updated_at = Utc::now();
    }

    pub fn last_branch_iteration(&self, branch_id: &str) -> Option<u32> {
        self.branch_states.get(branch_id).copied()
    }
}

/// Per-iteration record for a branch (sub-workflow loop) node.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BranchIterationState {
    pub branch_id: String,
    pub iteration: u32,
    pub inputs: Value,
    pub outputs: Option<Value>,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    pub success: bool,
    pub error: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mark_node_completed_removes_from_pending_and_accumulates_cost() {
        let mut cp = Checkpoint::new(
            Uuid::new_v4(),
            "proj",
            Value::map(),
            Some("a".into()),
            vec!["a".into(), "b".into()],
        );
        cp.mark_node_completed(
            "a",
            CheckpointedNode {
                output: Value::map(),
                completed_at: Utc::now(),
                session_id: None,
                cost_usd: Some(0.5),
                turn_count: None,
            },
        );
        assert_eq!(cp.pending_nodes, vec!["b".to_string()]);
        assert!((cp.total_cost_usd - 0.5).abs() < 1e-9);
    }

    #[test]
    fn branch_iteration_round_trip() {
        let mut cp = Checkpoint::new(Uuid::new_v4(), "proj", Value::map(), None, vec![]);
        assert_eq!(cp.last_branch_iteration("loop1"), None);
        cp.record_branch_iteration("loop1", 4);
        assert_eq!(cp.last_branch_iteration("loop1"), Some(4));
    }
}
