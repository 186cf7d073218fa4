//! The project model: typed nodes, edges, defaults, and orchestration
//! config parsed from a project's manifest and prompt files.

mod checkpoint;
mod edge;
mod node;
mod project;
mod signal;
mod trace;

pub use checkpoint::{BranchIterationState, Checkpoint, CheckpointedNode, RunStatus};
pub use edge::{Condition, Edge, FieldMapping};
pub use node::{
    AgentNode, BranchNode, FieldSchema, FieldType, InputNode, McpServerSpec, Node, NodeId,
    NodeKind, OutputFormat, OutputNode, PromptInput, PromptNode, PromptOutput, ToolKind,
    ToolNode, TriggerMode, TriggerNode,
};
pub use project::{Defaults, OrchestrationConfig, Project, PublishConfig, SignalsConfig};
pub use signal::{Signal, SignalType};
pub use trace::{ExecutionTrace, NodeTrace};
