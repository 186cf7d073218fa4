//! Deterministic mock providers used for dry-run execution and tests.
//! Never makes a network call or spawns a process.

use std::collections::BTreeMap;

use crate::model::{FieldSchema, FieldType, OutputFormat};
use crate::value::Value;

use super::{
    AgentConfig, AgentProvider, AgentResult, CompletionConfig, CompletionResult, PromptProvider,
    ProviderError, Usage,
};

/// A deterministic placeholder value for a declared field, per spec.md
/// scenario 1 (`output["status"] == "[mock_status]"` for a string field).
fn mock_field_value(name: &str, schema: &FieldSchema) -> Value {
    match schema.field_type {
        FieldType::String => Value::String(format!("[mock_{name}]")),
        FieldType::Number => Value::Number(0.0),
        FieldType::Integer => Value::Integer(0),
        FieldType::Boolean => Value::Bool(false),
        FieldType::Array => Value::Array(Vec::new()),
        FieldType::Object => Value::map(),
    }
}

fn mock_schema_value(schema: &BTreeMap<String, FieldSchema>) -> Value {
    let mut m = BTreeMap::new();
    for (name, field_schema) in schema {
        m.insert(name.clone(), mock_field_value(name, field_schema));
    }
    Value::Map(m)
}

/// Mock `PromptProvider`: synthesizes output matching the declared schema
/// instead of calling a real model.
pub struct MockPromptProvider;

impl PromptProvider for MockPromptProvider {
    fn complete(&self, _prompt: &str, config: &CompletionConfig) -> Result<CompletionResult, ProviderError> {
        let content = match config.format {
            OutputFormat::Text => "[mock_output]".to_string(),
            OutputFormat::Json => mock_schema_value(&config.schema).to_json().to_string(),
        };
        Ok(CompletionResult {
            content,
            usage: Usage::default(),
        })
    }
}

/// Mock `AgentProvider`: synthesizes a turn count of 1 and, when the
/// agent's prompt declared a JSON schema, structured output matching it.
pub struct MockAgentProvider;

impl AgentProvider for MockAgentProvider {
    fn execute(&self, _prompt: &str, config: &AgentConfig) -> Result<AgentResult, ProviderError> {
        let structured = config.schema.as_ref().map(mock_schema_value);
        let text = match &structured {
            Some(v) => v.to_json().to_string(),
            None => "[mock_agent_output]".to_string(),
        };
        Ok(AgentResult {
            text,
            structured,
            session_id: Some("mock-session".to_string()),
            turn_count: 1,
            usage: Usage::default(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn text_format_produces_fixed_mock_string() {
        let provider = MockPromptProvider;
        let config = CompletionConfig {
            model: "mock/any".into(),
            temperature: None,
            max_tokens: None,
            format: OutputFormat::Text,
            schema: BTreeMap::new(),
        };
        let result = provider.complete("ignored", &config).unwrap();
        assert_eq!(result.content, "[mock_output]");
    }

    #[test]
    fn json_format_mocks_each_schema_field() {
        let mut schema = BTreeMap::new();
        schema.insert(
            "status".to_string(),
            FieldSchema { field_type: FieldType::String, description: String::new() },
        );
        let provider = MockPromptProvider;
        let config = CompletionConfig {
            model: "mock/any".into(),
            temperature: None,
            max_tokens: None,
            format: OutputFormat::Json,
            schema,
        };
        let result = provider.complete("ignored", &config).unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&result.content).unwrap();
        assert_eq!(parsed["status"], "[mock_status]");
    }
}
