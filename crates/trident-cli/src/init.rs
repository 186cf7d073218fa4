use std::path::Path;

use anyhow::{bail, Context, Result};
use clap::ValueEnum;

#[derive(Debug, Clone, Copy, ValueEnum)]
#[value(rename_all = "lowercase")]
pub enum Template {
    Minimal,
    Standard,
}

const MINIMAL_MANIFEST: &str = r#"trident: "1.0"
name: new-project
entrypoints: ["in"]
nodes:
  in:
    type: input
    schema:
      message: { type: string }
  out:
    type: output
edges:
  e1:
    from: in
    to: out
    mapping:
      message: message
"#;

const STANDARD_MANIFEST: &str = r#"trident: "1.0"
name: new-project
description: A starter workflow with a prompt node.
defaults:
  model: mock/default
entrypoints: ["in"]
nodes:
  in:
    type: input
    schema:
      topic: { type: string }
  out:
    type: output
edges:
  e1:
    from: in
    to: greet
    mapping:
      topic: topic
  e2:
    from: greet
    to: out
    mapping:
      greeting: greeting
orchestration:
  signals:
    enabled: false
"#;

const STANDARD_PROMPT: &str = r#"---
id: greet
input:
  topic: { type: string, description: "What to greet", required: true }
output:
  format: json
  schema:
    greeting: { type: string, description: "A friendly greeting" }
---
Write a short, friendly greeting about {{topic}}.
"#;

/// Scaffold a new project at `path` (spec.md §6 "project init").
pub fn run(path: &Path, template: Template) -> Result<i32> {
    if path.join("trident.yaml").exists() {
        bail!("'{}' already contains a trident.yaml", path.display());
    }
    std::fs::create_dir_all(path).with_context(|| format!("failed to create '{}'", path.display()))?;
    std::fs::create_dir_all(path.join("prompts"))?;

    match template {
        Template::Minimal => {
            std::fs::write(path.join("trident.yaml"), MINIMAL_MANIFEST)?;
        }
        Template::Standard => {
            std::fs::write(path.join("trident.yaml"), STANDARD_MANIFEST)?;
            std::fs::write(path.join("prompts").join("greet.prompt"), STANDARD_PROMPT)?;
        }
    }

    println!("Scaffolded a new trident project at '{}'", path.display());
    Ok(0)
}
