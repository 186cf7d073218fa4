use std::collections::BTreeMap;
use std::path::Path;

use serde::Deserialize;

use crate::error::{Result, TridentError};
use crate::model::{NodeId, PromptInput, PromptNode, PromptOutput};

#[derive(Debug, Deserialize)]
struct PromptFrontmatter {
    id: NodeId,
    #[serde(default)]
    #[allow(dead_code)]
    name: Option<String>,
    #[serde(default)]
    #[allow(dead_code)]
    description: Option<String>,
    #[serde(default)]
    model: Option<String>,
    #[serde(default)]
    temperature: Option<f64>,
    #[serde(default)]
    max_tokens: Option<u32>,
    #[serde(default)]
    input: BTreeMap<String, PromptInput>,
    #[serde(default)]
    output: PromptOutput,
}

/// Position just past the closing `---` delimiter's own line, or `None` if
/// no line consisting solely of `---` appears in `content`.
fn find_closing_delimiter(content: &str) -> Option<usize> {
    let mut pos = 0;
    for line in content.lines() {
        if line.trim() == "---" {
            return Some(pos);
        }
        pos += line.len() + 1;
    }
    None
}

/// Parse a `.prompt` file: YAML frontmatter between `---` delimiters,
/// followed by a free-form template body.
pub fn parse_prompt_file(content: &str) -> Result<PromptNode> {
    let content = content.trim_start();
    if !content.starts_with("---") {
        return Err(TridentError::Parse(
            "prompt file must start with YAML frontmatter delimited by '---'".to_string(),
        ));
    }

    let rest = &content[3..];
    let rest = rest.strip_prefix('\n').unwrap_or(rest);

    let end_idx = find_closing_delimiter(rest).ok_or_else(|| {
        TridentError::Parse("prompt file is missing closing '---' frontmatter delimiter".to_string())
    })?;

    let yaml_str = &rest[..end_idx];
    let frontmatter: PromptFrontmatter = serde_yaml::from_str(yaml_str.trim())
        .map_err(|e| TridentError::Parse(format!("invalid prompt frontmatter: {e}")))?;

    let after = &rest[end_idx..];
    let body = match after.find('\n') {
        Some(newline) => after[newline + 1..].to_string(),
        None => String::new(),
    };

    Ok(PromptNode {
        id: frontmatter.id,
        model: frontmatter.model,
        temperature: frontmatter.temperature,
        max_tokens: frontmatter.max_tokens,
        inputs: frontmatter.input,
        output: frontmatter.output,
        body,
    })
}

/// Scan a directory for `*.prompt` files and parse each into a `PromptNode`
/// keyed by its frontmatter id. Returns an empty map if the directory does
/// not exist (prompts are optional).
pub fn scan_prompts_dir(dir: &Path) -> Result<BTreeMap<NodeId, PromptNode>> {
    let mut prompts = BTreeMap::new();
    if !dir.exists() {
        return Ok(prompts);
    }

    let mut entries: Vec<_> = std::fs::read_dir(dir)?.filter_map(|e| e.ok()).collect();
    entries.sort_by_key(|e| e.file_name());

    for entry in entries {
        let path = entry.path();
        if path.extension().and_then(|e| e.to_str()) != Some("prompt") {
            continue;
        }
        let content = std::fs::read_to_string(&path).map_err(|e| {
            TridentError::Parse(format!("failed to read '{}': {e}", path.display()))
        })?;
        let prompt = parse_prompt_file(&content).map_err(|e| {
            TridentError::Parse(format!("'{}': {e}", path.display()))
        })?;
        prompts.insert(prompt.id.clone(), prompt);
    }

    Ok(prompts)
}
