//! CLI-agent provider that shells out to a locally installed `claude`
//! binary, mirroring the teacher's `adapter::claude` subprocess model
//! (binary discovery via `which`, `--output-format json`, version/flag
//! probing) but collapsed to the one call shape an agent node needs:
//! print mode, structured JSON result, optional session resume.

use std::path::PathBuf;
use std::process::Command;

use super::{AgentConfig, AgentProvider, AgentResult, ProviderError, Usage};

/// Resolve the `claude` binary: explicit override first, then `$PATH`.
/// Mirrors `adapter::resolve_binary`'s precedence (explicit config wins,
/// no silent fallback past it).
pub fn resolve_claude_binary(configured: Option<&str>) -> Option<PathBuf> {
    if let Some(path) = configured {
        let p = PathBuf::from(path);
        return if p.exists() { Some(p) } else { None };
    }
    which::which("claude").ok()
}

pub struct ClaudeCliAgentProvider {
    binary: Option<PathBuf>,
}

impl ClaudeCliAgentProvider {
    pub fn new(configured_path: Option<&str>) -> Self {
        Self { binary: resolve_claude_binary(configured_path) }
    }

    pub fn is_available(&self) -> bool {
        self.binary.is_some()
    }
}

/// Shape of the `claude -p --output-format json` result object, trimmed to
/// the fields an agent node cares about.
#[derive(Debug, serde::Deserialize)]
struct ClaudeCliResult {
    result: String,
    #[serde(default)]
    session_id: Option<String>,
    #[serde(default)]
    num_turns: Option<u32>,
    #[serde(default)]
    total_cost_usd: Option<f64>,
}

impl AgentProvider for ClaudeCliAgentProvider {
    fn execute(&self, prompt: &str, config: &AgentConfig) -> Result<AgentResult, ProviderError> {
        let binary = self
            .binary
            .as_ref()
            .ok_or_else(|| ProviderError::BinaryUnavailable("claude".to_string()))?;

        let mut cmd = Command::new(binary);
        cmd.arg("-p").arg(prompt);
        cmd.arg("--output-format").arg("json");
        cmd.arg("--max-turns").arg(config.max_turns.to_string());

        if !config.allowed_tools.is_empty() {
            cmd.arg("--allowedTools").arg(config.allowed_tools.join(","));
        }
        if let Some(mode) = &config.permission_mode {
            cmd.arg("--permission-mode").arg(mode);
        }
        if let Some(cwd) = &config.cwd {
            cmd.current_dir(cwd);
        }
        if let Some(session_id) = &config.resume_session_id {
            cmd.arg("--resume").arg(session_id);
        }

        let output = cmd
            .output()
            .map_err(|e| ProviderError::CallFailed(format!("failed to spawn claude: {e}")))?;

        if !output.status.success() {
            return Err(ProviderError::CallFailed(format!(
                "claude exited with status {}: {}",
                output.status,
                String::from_utf8_lossy(&output.stderr)
            )));
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        let parsed: ClaudeCliResult = serde_json::from_str(stdout.trim())
            .map_err(|e| ProviderError::CallFailed(format!("unparseable claude output: {e}")))?;

        let structured = config
            .schema
            .as_ref()
            .and_then(|_| crate::executor::extract_json(&parsed.result))
            .map(crate::value::Value::from_json);

        Ok(AgentResult {
            text: parsed.result,
            structured,
            session_id: parsed.session_id,
            turn_count: parsed.num_turns.unwrap_or(1),
            usage: Usage {
                input_tokens: None,
                output_tokens: None,
                cost_usd: parsed.total_cost_usd,
            },
        })
    }
}
