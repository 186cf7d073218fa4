use std::collections::BTreeMap;

use super::{AgentProvider, MockAgentProvider, MockPromptProvider, ProviderError, PromptProvider};
use super::claude::ClaudeCliAgentProvider;

/// Process-startup registry of prompt/agent providers. Prompt providers
/// are resolved by the `vendor/model-name` prefix declared on a model
/// string; agent providers by the explicit `provider` field on an agent
/// node (spec.md §9).
pub struct ProviderRegistry {
    prompt_providers: BTreeMap<String, Box<dyn PromptProvider>>,
    agent_providers: BTreeMap<String, Box<dyn AgentProvider>>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self {
            prompt_providers: BTreeMap::new(),
            agent_providers: BTreeMap::new(),
        }
    }

    /// The default registry: a `mock` prompt/agent provider pair (used for
    /// dry-run and tests) plus a CLI-agent provider registered under the
    /// `claude` key, gated on whether the `claude` binary is discoverable.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register_prompt_provider("mock", MockPromptProvider);
        registry.register_agent_provider("mock", MockAgentProvider);
        registry.register_agent_provider("claude", ClaudeCliAgentProvider::new(None));
        registry
    }

    pub fn register_prompt_provider(&mut self, vendor: &str, provider: impl PromptProvider + 'static) {
        self.prompt_providers.insert(vendor.to_string(), Box::new(provider));
    }

    pub fn register_agent_provider(&mut self, name: &str, provider: impl AgentProvider + 'static) {
        self.agent_providers.insert(name.to_string(), Box::new(provider));
    }

    /// Resolve a prompt provider by a `vendor/model-name` string's vendor
    /// prefix (everything before the first `/`; the whole string if there
    /// is no `/`).
    pub fn resolve_prompt_provider(&self, model: &str) -> Result<&dyn PromptProvider, ProviderError> {
        let vendor = model.split('/').next().unwrap_or(model);
        self.prompt_providers
            .get(vendor)
            .map(|b| b.as_ref())
            .ok_or_else(|| ProviderError::UnknownModel(model.to_string()))
    }

    pub fn resolve_agent_provider(&self, name: &str) -> Result<&dyn AgentProvider, ProviderError> {
        self.agent_providers
            .get(name)
            .map(|b| b.as_ref())
            .ok_or_else(|| ProviderError::UnknownAgentProvider(name.to_string()))
    }
}

impl Default for ProviderRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolves_prompt_provider_by_vendor_prefix() {
        let registry = ProviderRegistry::with_defaults();
        assert!(registry.resolve_prompt_provider("mock/whatever").is_ok());
    }

    #[test]
    fn unknown_vendor_is_an_error() {
        let registry = ProviderRegistry::with_defaults();
        let result = registry.resolve_prompt_provider("openai/gpt-9");
        assert!(matches!(result, Err(ProviderError::UnknownModel(_))));
    }

    #[test]
    fn resolves_agent_provider_by_name() {
        let registry = ProviderRegistry::with_defaults();
        assert!(registry.resolve_agent_provider("mock").is_ok());
        assert!(registry.resolve_agent_provider("claude").is_ok());
    }
}
