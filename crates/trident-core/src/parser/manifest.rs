use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::{Result, TridentError};
use crate::model::{
    AgentNode, BranchNode, Condition, Defaults, Edge, FieldMapping, InputNode, NodeId,
    OrchestrationConfig, OutputNode, Project, PublishConfig, SignalsConfig, ToolNode, TriggerNode,
};

use super::prompt::scan_prompts_dir;

/// File names searched for in a project root, in order.
pub const MANIFEST_CANDIDATES: &[&str] = &["agent.tml", "trident.tml", "trident.yaml"];

pub fn find_manifest_path(root: &Path) -> Option<PathBuf> {
    MANIFEST_CANDIDATES
        .iter()
        .map(|name| root.join(name))
        .find(|p| p.exists())
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum RawNode {
    Input(InputNode),
    Output(OutputNode),
    Agent(AgentNode),
    Branch(BranchNode),
    Trigger(TriggerNode),
}

#[derive(Debug, Deserialize)]
struct RawEdge {
    from: NodeId,
    to: NodeId,
    #[serde(default)]
    condition: Option<String>,
    #[serde(default)]
    mapping: BTreeMap<String, String>,
}

#[derive(Debug, Default, Deserialize)]
struct RawExport {
    path: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct RawOrchestration {
    #[serde(default)]
    publish: PublishConfig,
    #[serde(default)]
    export: RawExport,
    #[serde(default)]
    signals: SignalsConfig,
}

#[derive(Debug, Deserialize)]
struct RawManifest {
    trident: String,
    name: String,
    #[serde(default)]
    #[allow(dead_code)]
    description: Option<String>,
    #[serde(default)]
    defaults: Defaults,
    #[serde(default)]
    entrypoints: Vec<NodeId>,
    #[serde(default)]
    nodes: BTreeMap<NodeId, RawNode>,
    #[serde(default)]
    tools: BTreeMap<NodeId, ToolNode>,
    #[serde(default)]
    edges: BTreeMap<String, RawEdge>,
    #[serde(default)]
    orchestration: RawOrchestration,
    /// Documentation-only declarations of environment variables the
    /// project expects; actual values come from `.env` or the OS
    /// environment, never from here.
    #[serde(default)]
    #[allow(dead_code)]
    env: BTreeMap<String, serde_yaml::Value>,
}

/// Parse a manifest file's contents, scan `prompts/` for `.prompt` files,
/// and assemble a fully-populated `Project`.
pub fn load_project(root: &Path) -> Result<Project> {
    let manifest_path = find_manifest_path(root).ok_or_else(|| {
        TridentError::Parse(format!(
            "no manifest found under '{}' (looked for {})",
            root.display(),
            MANIFEST_CANDIDATES.join(", ")
        ))
    })?;

    let data = std::fs::read_to_string(&manifest_path).map_err(|e| {
        TridentError::Parse(format!("failed to read '{}': {e}", manifest_path.display()))
    })?;

    let raw: RawManifest = serde_yaml::from_str(&data)
        .map_err(|e| TridentError::Parse(format!("invalid manifest YAML: {e}")))?;

    let mut inputs = BTreeMap::new();
    let mut outputs = BTreeMap::new();
    let mut agents = BTreeMap::new();
    let mut branches = BTreeMap::new();
    let mut triggers = BTreeMap::new();

    for (id, node) in raw.nodes {
        match node {
            RawNode::Input(mut n) => {
                n.id = id.clone();
                inputs.insert(id, n);
            }
            RawNode::Output(mut n) => {
                n.id = id.clone();
                outputs.insert(id, n);
            }
            RawNode::Agent(mut n) => {
                n.id = id.clone();
                agents.insert(id, n);
            }
            RawNode::Branch(mut n) => {
                n.id = id.clone();
                branches.insert(id, n);
            }
            RawNode::Trigger(mut n) => {
                n.id = id.clone();
                triggers.insert(id, n);
            }
        }
    }

    let mut tools = BTreeMap::new();
    for (id, mut n) in raw.tools {
        n.id = id.clone();
        tools.insert(id, n);
    }

    let mut edges = BTreeMap::new();
    for (id, raw_edge) in raw.edges {
        let mappings = raw_edge
            .mapping
            .into_iter()
            .map(|(target_var, source_expr)| FieldMapping { target_var, source_expr })
            .collect();
        edges.insert(
            id.clone(),
            Edge {
                id,
                from_node: raw_edge.from,
                to_node: raw_edge.to,
                mappings,
                condition: raw_edge.condition.map(Condition),
            },
        );
    }

    let orchestration = OrchestrationConfig {
        publish: raw.orchestration.publish,
        export_path: raw.orchestration.export.path,
        signals: raw.orchestration.signals,
    };

    let prompts = scan_prompts_dir(&root.join("prompts"))?;

    Ok(Project {
        name: raw.name,
        root: root.to_path_buf(),
        version: raw.trident,
        defaults: raw.defaults,
        entrypoints: raw.entrypoints,
        orchestration,
        inputs,
        outputs,
        prompts,
        tools,
        agents,
        branches,
        triggers,
        edges,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_project(dir: &Path, manifest: &str, prompt: Option<(&str, &str)>) {
        std::fs::write(dir.join("trident.yaml"), manifest).unwrap();
        if let Some((name, body)) = prompt {
            std::fs::create_dir_all(dir.join("prompts")).unwrap();
            let mut f = std::fs::File::create(dir.join("prompts").join(name)).unwrap();
            f.write_all(body.as_bytes()).unwrap();
        }
    }

    #[test]
    fn loads_minimal_project() {
        let tmp = tempfile::tempdir().unwrap();
        write_project(
            tmp.path(),
            r#"
trident: "1.0"
name: demo
entrypoints: ["in"]
nodes:
  in:
    type: input
    schema:
      x: { type: integer }
  out:
    type: output
edges:
  e1:
    from: in
    to: out
    mapping:
      y: x
"#,
            None,
        );
        let project = load_project(tmp.path()).unwrap();
        assert_eq!(project.name, "demo");
        assert!(project.inputs.contains_key("in"));
        assert!(project.outputs.contains_key("out"));
        let edge = project.edges.get("e1").unwrap();
        assert_eq!(edge.from_node, "in");
        assert_eq!(edge.to_node, "out");
        assert_eq!(edge.mappings[0].target_var, "y");
        assert_eq!(edge.mappings[0].source_expr, "x");
    }

    #[test]
    fn loads_prompt_files_from_prompts_dir() {
        let tmp = tempfile::tempdir().unwrap();
        write_project(
            tmp.path(),
            r#"
trident: "1.0"
name: demo
"#,
            Some((
                "summarize.prompt",
                "---\nid: summarize\noutput:\n  format: text\n---\nSummarize: {{topic}}\n",
            )),
        );
        let project = load_project(tmp.path()).unwrap();
        let prompt = project.prompts.get("summarize").unwrap();
        assert_eq!(prompt.body.trim(), "Summarize: {{topic}}");
    }

    #[test]
    fn missing_manifest_is_a_parse_error() {
        let tmp = tempfile::tempdir().unwrap();
        let err = load_project(tmp.path()).unwrap_err();
        assert!(matches!(err, TridentError::Parse(_)));
    }
}
