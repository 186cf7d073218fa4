use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use super::edge::Edge;
use super::node::{AgentNode, BranchNode, InputNode, NodeId, OutputNode, PromptNode, ToolNode, TriggerNode};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Defaults {
    pub model: Option<String>,
    pub temperature: Option<f64>,
    pub max_tokens: Option<u32>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PublishConfig {
    pub path: Option<String>,
    pub alias: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SignalsConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_signals_dir")]
    pub directory: String,
}

fn default_signals_dir() -> String {
    "signals".to_string()
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OrchestrationConfig {
    #[serde(default)]
    pub publish: PublishConfig,
    #[serde(default)]
    pub export_path: Option<String>,
    #[serde(default)]
    pub signals: SignalsConfig,
}

/// The fully-loaded in-memory representation of a parsed project.
#[derive(Debug, Clone)]
pub struct Project {
    pub name: String,
    pub root: PathBuf,
    pub version: String,
    pub defaults: Defaults,
    pub entrypoints: Vec<NodeId>,
    pub orchestration: OrchestrationConfig,

    pub inputs: BTreeMap<NodeId, InputNode>,
    pub outputs: BTreeMap<NodeId, OutputNode>,
    pub prompts: BTreeMap<NodeId, PromptNode>,
    pub tools: BTreeMap<NodeId, ToolNode>,
    pub agents: BTreeMap<NodeId, AgentNode>,
    pub branches: BTreeMap<NodeId, BranchNode>,
    pub triggers: BTreeMap<NodeId, TriggerNode>,

    pub edges: BTreeMap<String, Edge>,
}

impl Project {
    /// All node ids across all kinds, for uniqueness checks and DAG
    /// construction.
    pub fn all_node_ids(&self) -> Vec<&NodeId> {
        self.inputs
            .keys()
            .chain(self.outputs.keys())
            .chain(self.prompts.keys())
            .chain(self.tools.keys())
            .chain(self.agents.keys())
            .chain(self.branches.keys())
            .chain(self.triggers.keys())
            .collect()
    }

    pub fn contains_node(&self, id: &str) -> bool {
        self.inputs.contains_key(id)
            || self.outputs.contains_key(id)
            || self.prompts.contains_key(id)
            || self.tools.contains_key(id)
            || self.agents.contains_key(id)
            || self.branches.contains_key(id)
            || self.triggers.contains_key(id)
    }
}
