use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// A node identifier, unique across all node kinds in a project.
pub type NodeId = String;

/// Scalar/container type used in prompt input declarations and input-node
/// schemas.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldType {
    String,
    Number,
    Integer,
    Boolean,
    Array,
    Object,
}

impl FieldType {
    /// Whether `other` is a compatible source type for a target field
    /// declared as `self`, per spec.md §4.1's type-compatibility table.
    pub fn compatible_with(self, other: FieldType) -> bool {
        use FieldType::*;
        if self == other {
            return true;
        }
        matches!(
            (self, other),
            (Integer, Number) | (Number, Integer) | (String, Object) | (String, Array)
        )
    }
}

/// A named field with a declared type and human-readable description.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldSchema {
    #[serde(rename = "type")]
    pub field_type: FieldType,
    #[serde(default)]
    pub description: String,
}

/// One of the seven closed node kinds. The DAG stores only `(id, kind_tag,
/// edges)`; concrete configuration lives here, looked up by id from the
/// `Project`.
#[derive(Debug, Clone)]
pub enum Node {
    Input(InputNode),
    Output(OutputNode),
    Prompt(PromptNode),
    Tool(ToolNode),
    Agent(AgentNode),
    Branch(BranchNode),
    Trigger(TriggerNode),
}

impl Node {
    pub fn id(&self) -> &str {
        match self {
            Node::Input(n) => &n.id,
            Node::Output(n) => &n.id,
            Node::Prompt(n) => &n.id,
            Node::Tool(n) => &n.id,
            Node::Agent(n) => &n.id,
            Node::Branch(n) => &n.id,
            Node::Trigger(n) => &n.id,
        }
    }

    pub fn kind(&self) -> NodeKind {
        match self {
            Node::Input(_) => NodeKind::Input,
            Node::Output(_) => NodeKind::Output,
            Node::Prompt(_) => NodeKind::Prompt,
            Node::Tool(_) => NodeKind::Tool,
            Node::Agent(_) => NodeKind::Agent,
            Node::Branch(_) => NodeKind::Branch,
            Node::Trigger(_) => NodeKind::Trigger,
        }
    }
}

/// Tag identifying a node's kind without its configuration — what the DAG
/// stores for dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeKind {
    Input,
    Output,
    Prompt,
    Tool,
    Agent,
    Branch,
    Trigger,
}

impl std::fmt::Display for NodeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            NodeKind::Input => "input",
            NodeKind::Output => "output",
            NodeKind::Prompt => "prompt",
            NodeKind::Tool => "tool",
            NodeKind::Agent => "agent",
            NodeKind::Branch => "branch",
            NodeKind::Trigger => "trigger",
        };
        write!(f, "{s}")
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InputNode {
    #[serde(default)]
    pub id: NodeId,
    #[serde(default)]
    pub schema: BTreeMap<String, FieldSchema>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputNode {
    #[serde(default)]
    pub id: NodeId,
    #[serde(default)]
    pub format: Option<String>,
}

/// A declared prompt input: type/description plus whether it's required
/// and an optional default applied when the caller doesn't supply it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PromptInput {
    #[serde(rename = "type")]
    pub field_type: FieldType,
    #[serde(default)]
    pub description: String,
    #[serde(default = "default_true")]
    pub required: bool,
    #[serde(default)]
    pub default: Option<crate::value::Value>,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PromptOutput {
    pub format: OutputFormat,
    #[serde(default)]
    pub schema: BTreeMap<String, FieldSchema>,
}

impl Default for PromptOutput {
    fn default() -> Self {
        Self {
            format: OutputFormat::Text,
            schema: BTreeMap::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PromptNode {
    #[serde(default)]
    pub id: NodeId,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub temperature: Option<f64>,
    #[serde(default)]
    pub max_tokens: Option<u32>,
    #[serde(default)]
    pub inputs: BTreeMap<String, PromptInput>,
    #[serde(default)]
    pub output: PromptOutput,
    pub body: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolKind {
    Python,
    Shell,
    Http,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolNode {
    #[serde(default)]
    pub id: NodeId,
    pub module: String,
    #[serde(default = "default_function_name")]
    pub function: String,
    #[serde(rename = "type")]
    pub tool_type: ToolKind,
}

fn default_function_name() -> String {
    "execute".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct McpServerSpec {
    pub command: String,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default)]
    pub env: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentNode {
    #[serde(default)]
    pub id: NodeId,
    pub prompt_file: String,
    #[serde(default)]
    pub allowed_tools: Vec<String>,
    #[serde(default)]
    pub mcp_servers: BTreeMap<String, McpServerSpec>,
    #[serde(default = "default_max_turns")]
    pub max_turns: u32,
    #[serde(default)]
    pub permission_mode: Option<String>,
    #[serde(default)]
    pub cwd: Option<String>,
    #[serde(default = "default_provider")]
    pub provider: String,
}

fn default_max_turns() -> u32 {
    20
}

fn default_provider() -> String {
    "claude".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BranchNode {
    #[serde(default)]
    pub id: NodeId,
    pub workflow_path: String,
    #[serde(default)]
    pub condition: Option<String>,
    #[serde(default)]
    pub loop_while: Option<String>,
    #[serde(default = "default_max_iterations")]
    pub max_iterations: u32,
}

fn default_max_iterations() -> u32 {
    10
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TriggerMode {
    FireAndForget,
    Wait,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TriggerNode {
    #[serde(default)]
    pub id: NodeId,
    pub workflow_path: String,
    pub mode: TriggerMode,
    #[serde(default)]
    pub pass_outputs: bool,
    #[serde(default)]
    pub emit_signal: bool,
    #[serde(default)]
    pub condition: Option<String>,
}
