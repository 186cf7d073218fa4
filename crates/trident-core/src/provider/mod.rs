//! Model/agent providers as capability-bag traits (spec.md §9
//! "Providers as capabilities"). Registration happens at process startup
//! (`ProviderRegistry::with_defaults`); resolution is by `vendor/model`
//! prefix for prompts and by an explicit `provider` field for agents.
//! Swapping in a test double requires only a trivial registry edit.

mod claude;
mod mock;
mod registry;

pub use claude::ClaudeCliAgentProvider;
pub use mock::{MockAgentProvider, MockPromptProvider};
pub use registry::ProviderRegistry;

use std::collections::BTreeMap;

use crate::model::{McpServerSpec, OutputFormat};
use crate::value::Value;

/// Configuration for a single prompt-node completion call.
#[derive(Debug, Clone)]
pub struct CompletionConfig {
    pub model: String,
    pub temperature: Option<f64>,
    pub max_tokens: Option<u32>,
    pub format: OutputFormat,
    pub schema: BTreeMap<String, crate::model::FieldSchema>,
}

/// Token/cost usage reported alongside a completion or agent result.
#[derive(Debug, Clone, Default)]
pub struct Usage {
    pub input_tokens: Option<u64>,
    pub output_tokens: Option<u64>,
    pub cost_usd: Option<f64>,
}

/// A completed prompt-node call.
#[derive(Debug, Clone)]
pub struct CompletionResult {
    pub content: String,
    pub usage: Usage,
}

/// Error surfaced by a provider call; classified retryable/terminal by the
/// provider itself per spec.md §7 (the core does not retry).
#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    #[error("no provider registered for model '{0}'")]
    UnknownModel(String),

    #[error("no agent provider registered named '{0}'")]
    UnknownAgentProvider(String),

    #[error("provider binary not available: {0}")]
    BinaryUnavailable(String),

    #[error("provider call failed: {0}")]
    CallFailed(String),
}

/// Capability trait for LLM completion calls (prompt nodes).
pub trait PromptProvider: Send + Sync {
    fn complete(&self, prompt: &str, config: &CompletionConfig) -> Result<CompletionResult, ProviderError>;
}

/// Configuration for a single agent-node turn loop.
#[derive(Debug, Clone)]
pub struct AgentConfig {
    pub max_turns: u32,
    pub allowed_tools: Vec<String>,
    pub cwd: Option<String>,
    pub mcp_servers: BTreeMap<String, McpServerSpec>,
    pub permission_mode: Option<String>,
    pub resume_session_id: Option<String>,
    /// When set, the agent's prompt declared a JSON output schema and the
    /// provider should attempt to return already-parsed structured output
    /// (spec.md §4.3 "structured output ... returned directly").
    pub schema: Option<BTreeMap<String, crate::model::FieldSchema>>,
}

/// The result of a completed agent run.
#[derive(Debug, Clone)]
pub struct AgentResult {
    pub text: String,
    /// Already-parsed structured fields, when the provider supports
    /// returning them directly instead of through text parsing.
    pub structured: Option<Value>,
    pub session_id: Option<String>,
    pub turn_count: u32,
    pub usage: Usage,
}

/// Capability trait for multi-turn agent loops (agent nodes).
pub trait AgentProvider: Send + Sync {
    fn execute(&self, prompt: &str, config: &AgentConfig) -> Result<AgentResult, ProviderError>;
}
