//! Synchronous per-node dispatch routines (spec.md §4.3 "Per-node
//! dispatch"). Each function here is a thin shim that gathers inputs,
//! renders templates, calls a provider or tool, and shapes the result into
//! a `Value::Map` output — it does no scheduling of its own. The scheduler
//! in `executor::run` runs one of these per node inside
//! `tokio::task::spawn_blocking`, mirroring the teacher's
//! `supervisor::parallel::ParallelSupervisor::run_all_to_completion`
//! fan-out but offloaded to the blocking pool since provider calls here are
//! synchronous (`PromptProvider::complete`, `AgentProvider::execute`).

use std::collections::BTreeMap;
use std::io::Write;
use std::process::{Command, Stdio};
use std::sync::Arc;

use crate::condition;
use crate::dag::DagNode;
use crate::model::{
    AgentNode, BranchNode, FieldType, InputNode, Node, NodeId, OutputFormat, OutputNode,
    PromptInput, PromptNode, Project, ToolKind, ToolNode, TriggerMode, TriggerNode,
};
use crate::provider::{AgentConfig, CompletionConfig, ProviderError, ProviderRegistry};
use crate::template;
use crate::value::Value;
use crate::ArtifactManager;

use super::extract_json;

/// Everything a node dispatch call needs besides the node's own
/// configuration and gathered inputs. Cheap to clone: `project`/`registry`
/// are `Arc`, `artifact_mgr` just wraps a path and a uuid, `runtime` is a
/// handle.
#[derive(Clone)]
pub(crate) struct DispatchContext {
    pub project: Arc<Project>,
    pub registry: Arc<ProviderRegistry>,
    pub dry_run: bool,
    pub resume_sessions: BTreeMap<String, String>,
    pub artifact_mgr: ArtifactManager,
    pub runtime: tokio::runtime::Handle,
    pub initial_inputs: Value,
}

/// Result of one successful node dispatch, carrying the pieces the
/// scheduler folds into the trace and checkpoint.
#[derive(Debug, Clone)]
pub(crate) struct DispatchOutcome {
    pub output: Value,
    pub model: Option<String>,
    pub input_tokens: Option<u64>,
    pub output_tokens: Option<u64>,
    pub cost_usd: Option<f64>,
    pub session_id: Option<String>,
    pub turn_count: Option<u32>,
    pub branch_final_iteration: Option<u32>,
}

impl DispatchOutcome {
    pub fn plain(output: Value) -> Self {
        Self {
            output,
            model: None,
            input_tokens: None,
            output_tokens: None,
            cost_usd: None,
            session_id: None,
            turn_count: None,
            branch_final_iteration: None,
        }
    }

    pub fn with_branch_iteration(mut self, iteration: u32) -> Self {
        self.branch_final_iteration = Some(iteration);
        self
    }
}

/// A node execution failure, classified by `error_type` per spec.md §7's
/// node-execution-error taxonomy (`SchemaValidationError`, `ToolError`,
/// `AgentOutputError`, `BranchError`, `RequiredInputMissing`, ...).
#[derive(Debug, Clone)]
pub(crate) struct NodeDispatchError {
    pub error_type: String,
    pub message: String,
}

impl NodeDispatchError {
    pub fn new(error_type: &str, message: impl Into<String>) -> Self {
        Self { error_type: error_type.to_string(), message: message.into() }
    }

    pub fn from_provider(err: ProviderError) -> Self {
        Self::new("ProviderError", err.to_string())
    }
}

/// Gather a node's inputs from its inbound edges' field mappings, applied
/// against the upstream `NodeOutput` map. A mapping whose source node is
/// absent (skipped upstream) simply contributes nothing — downstream nodes
/// see the field as missing, not as an error (spec.md §4.3 "Edge gating").
pub(crate) fn gather_inputs(dag_node: &DagNode, node_outputs: &BTreeMap<NodeId, Value>) -> Value {
    let mut result = BTreeMap::new();
    for edge in &dag_node.in_edges {
        let Some(source_output) = node_outputs.get(&edge.from_node) else { continue };
        for mapping in &edge.mappings {
            if let Some(v) = source_output.get_path(&mapping.source_expr) {
                result.insert(mapping.target_var.clone(), v.clone());
            }
        }
    }
    Value::Map(result)
}

fn condition_context(source_output: Option<&Value>) -> Value {
    let mut ctx = BTreeMap::new();
    if let Some(v) = source_output {
        ctx.insert("output".to_string(), v.clone());
        if let Some(m) = v.as_map() {
            for (k, val) in m {
                ctx.insert(k.clone(), val.clone());
            }
        }
    }
    Value::Map(ctx)
}

/// Whether any inbound edge's condition evaluates false against its
/// source's output, in which case the whole node is skipped (spec.md
/// §4.3 "Edge gating"). Evaluation errors (including a missing upstream
/// source) are treated as false, per spec.
pub(crate) fn is_gated_skip(dag_node: &DagNode, node_outputs: &BTreeMap<NodeId, Value>) -> bool {
    for edge in &dag_node.in_edges {
        let Some(crate::model::Condition(expr)) = &edge.condition else { continue };
        let ctx = condition_context(node_outputs.get(&edge.from_node));
        let passed = condition::evaluate(expr, &ctx).unwrap_or(false);
        if !passed {
            return true;
        }
    }
    false
}

fn infer_field_type(v: &Value) -> Option<FieldType> {
    match v {
        Value::Null => None,
        Value::Bool(_) => Some(FieldType::Boolean),
        Value::Integer(_) => Some(FieldType::Integer),
        Value::Number(_) => Some(FieldType::Number),
        Value::String(_) => Some(FieldType::String),
        Value::Array(_) => Some(FieldType::Array),
        Value::Map(_) => Some(FieldType::Object),
    }
}

/// Apply declared defaults for missing optional fields and fail on missing
/// required fields with no default, per spec.md §4.3 "Validate required
/// inputs present". `gathered` is always a `Value::Map`.
fn apply_defaults_and_validate(
    declared: &BTreeMap<String, PromptInput>,
    gathered: &mut Value,
) -> Result<(), NodeDispatchError> {
    let map = gathered.as_map_mut().expect("gathered inputs are always a Map");
    for (name, decl) in declared {
        if !map.contains_key(name) {
            if let Some(default) = &decl.default {
                map.insert(name.clone(), default.clone());
            } else if decl.required {
                return Err(NodeDispatchError::new(
                    "RequiredInputMissing",
                    format!("missing required input '{name}'"),
                ));
            }
        }
    }
    Ok(())
}

/// Top-level per-kind dispatch, invoked on the blocking pool by the
/// scheduler.
pub(crate) fn dispatch_node(
    node: &Node,
    gathered: Value,
    ctx: &DispatchContext,
) -> Result<DispatchOutcome, NodeDispatchError> {
    match node {
        Node::Input(n) => Ok(dispatch_input(n, ctx)),
        Node::Output(n) => Ok(dispatch_output(n, gathered)),
        Node::Prompt(n) => dispatch_prompt(n, gathered, ctx),
        Node::Tool(n) => dispatch_tool(n, gathered, ctx),
        Node::Agent(n) => dispatch_agent(n, gathered, ctx),
        Node::Branch(n) => dispatch_branch(n, gathered, ctx),
        Node::Trigger(n) => dispatch_trigger(n, gathered, ctx),
    }
}

fn dispatch_input(_node: &InputNode, ctx: &DispatchContext) -> DispatchOutcome {
    DispatchOutcome::plain(ctx.initial_inputs.clone())
}

fn dispatch_output(_node: &OutputNode, gathered: Value) -> DispatchOutcome {
    DispatchOutcome::plain(gathered)
}

fn dispatch_prompt(
    node: &PromptNode,
    mut gathered: Value,
    ctx: &DispatchContext,
) -> Result<DispatchOutcome, NodeDispatchError> {
    apply_defaults_and_validate(&node.inputs, &mut gathered)?;

    let model = node
        .model
        .clone()
        .or_else(|| ctx.project.defaults.model.clone())
        .ok_or_else(|| {
            NodeDispatchError::new(
                "SetupError",
                format!("prompt node '{}' has no node-local model override and no project default", node.id),
            )
        })?;

    let rendered = template::render(&node.body, &gathered);

    let provider = if ctx.dry_run {
        ctx.registry.resolve_prompt_provider("mock")
    } else {
        ctx.registry.resolve_prompt_provider(&model)
    }
    .map_err(NodeDispatchError::from_provider)?;

    let config = CompletionConfig {
        model: model.clone(),
        temperature: node.temperature.or(ctx.project.defaults.temperature),
        max_tokens: node.max_tokens.or(ctx.project.defaults.max_tokens),
        format: node.output.format,
        schema: node.output.schema.clone(),
    };
    let result = provider.complete(&rendered, &config).map_err(NodeDispatchError::from_provider)?;

    let output = match node.output.format {
        OutputFormat::Text => {
            let mut map = BTreeMap::new();
            map.insert("text".to_string(), Value::String(result.content.clone()));
            Value::Map(map)
        }
        OutputFormat::Json => {
            let parsed: serde_json::Value = serde_json::from_str(&result.content).map_err(|e| {
                NodeDispatchError::new("SchemaValidationError", format!("prompt output is not valid JSON: {e}"))
            })?;
            let parsed_value = Value::from_json(parsed);
            let parsed_map = parsed_value
                .as_map()
                .ok_or_else(|| NodeDispatchError::new("SchemaValidationError", "prompt JSON output is not an object"))?;

            for (field, schema) in &node.output.schema {
                match parsed_map.get(field) {
                    Some(v) => {
                        if let Some(inferred) = infer_field_type(v) {
                            if !schema.field_type.compatible_with(inferred) {
                                return Err(NodeDispatchError::new(
                                    "SchemaValidationError",
                                    format!(
                                        "field '{field}' expected type {:?}, got {:?}",
                                        schema.field_type, inferred
                                    ),
                                ));
                            }
                        }
                    }
                    None => {
                        return Err(NodeDispatchError::new(
                            "SchemaValidationError",
                            format!("missing required field '{field}' in prompt output"),
                        ))
                    }
                }
            }

            let mut out = parsed_map.clone();
            out.insert("text".to_string(), Value::String(result.content.clone()));
            Value::Map(out)
        }
    };

    Ok(DispatchOutcome {
        output,
        model: Some(model),
        input_tokens: result.usage.input_tokens,
        output_tokens: result.usage.output_tokens,
        cost_usd: result.usage.cost_usd,
        session_id: None,
        turn_count: None,
        branch_final_iteration: None,
    })
}

fn pipe_json_to_subprocess(mut command: Command, gathered: &Value) -> Result<Value, NodeDispatchError> {
    let mut child = command
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|e| NodeDispatchError::new("ToolError", format!("failed to spawn tool process: {e}")))?;

    let payload = serde_json::to_vec(&gathered.to_json())
        .map_err(|e| NodeDispatchError::new("ToolError", format!("failed to encode tool input: {e}")))?;
    if let Some(stdin) = child.stdin.as_mut() {
        stdin
            .write_all(&payload)
            .map_err(|e| NodeDispatchError::new("ToolError", format!("failed writing tool stdin: {e}")))?;
    }

    let output = child
        .wait_with_output()
        .map_err(|e| NodeDispatchError::new("ToolError", format!("tool process failed: {e}")))?;

    if !output.status.success() {
        return Err(NodeDispatchError::new(
            "ToolError",
            format!("tool exited with {}: {}", output.status, String::from_utf8_lossy(&output.stderr)),
        ));
    }

    let stdout = String::from_utf8_lossy(&output.stdout);
    match serde_json::from_str::<serde_json::Value>(stdout.trim()) {
        Ok(json) => Ok(Value::from_json(json)),
        Err(_) => Ok(Value::String(stdout.trim().to_string())),
    }
}

fn run_http_tool(node: &ToolNode, gathered: &Value) -> Result<Value, NodeDispatchError> {
    let client = reqwest::blocking::Client::new();
    let method = match node.function.to_ascii_lowercase().as_str() {
        "get" => reqwest::Method::GET,
        "put" => reqwest::Method::PUT,
        "delete" => reqwest::Method::DELETE,
        "patch" => reqwest::Method::PATCH,
        _ => reqwest::Method::POST,
    };

    let mut request = client.request(method.clone(), &node.module);
    if method == reqwest::Method::GET {
        let query: Vec<(String, String)> = gathered
            .as_map()
            .map(|m| m.iter().map(|(k, v)| (k.clone(), v.to_text())).collect())
            .unwrap_or_default();
        request = request.query(&query);
    } else {
        request = request.json(&gathered.to_json());
    }

    let response = request
        .send()
        .map_err(|e| NodeDispatchError::new("ToolError", format!("http tool request to '{}' failed: {e}", node.module)))?;
    let status = response.status();
    let body: serde_json::Value = response
        .json()
        .map_err(|e| NodeDispatchError::new("ToolError", format!("http tool response from '{}' is not JSON: {e}", node.module)))?;

    if !status.is_success() {
        return Err(NodeDispatchError::new(
            "ToolError",
            format!("http tool '{}' returned status {status}", node.module),
        ));
    }
    Ok(Value::from_json(body))
}

fn dispatch_tool(node: &ToolNode, gathered: Value, ctx: &DispatchContext) -> Result<DispatchOutcome, NodeDispatchError> {
    let raw = match node.tool_type {
        ToolKind::Shell => {
            let module_path = ctx.project.root.join(&node.module);
            let mut cmd = Command::new(module_path);
            cmd.arg(&node.function);
            pipe_json_to_subprocess(cmd, &gathered)?
        }
        ToolKind::Python => {
            let module_path = ctx.project.root.join(&node.module);
            let mut cmd = Command::new("python3");
            cmd.arg(module_path).arg(&node.function);
            pipe_json_to_subprocess(cmd, &gathered)?
        }
        ToolKind::Http => run_http_tool(node, &gathered)?,
    };

    let output = match raw.as_map() {
        Some(_) => raw,
        None => {
            let mut m = BTreeMap::new();
            m.insert("output".to_string(), raw);
            Value::Map(m)
        }
    };
    Ok(DispatchOutcome::plain(output))
}

fn dispatch_agent(
    node: &AgentNode,
    mut gathered: Value,
    ctx: &DispatchContext,
) -> Result<DispatchOutcome, NodeDispatchError> {
    let prompt_path = ctx.project.root.join(&node.prompt_file);
    let content = std::fs::read_to_string(&prompt_path).map_err(|e| {
        NodeDispatchError::new("SetupError", format!("failed to read agent prompt file '{}': {e}", prompt_path.display()))
    })?;
    let prompt_node = crate::parser::parse_prompt_file(&content).map_err(|e| {
        NodeDispatchError::new("SetupError", format!("invalid agent prompt file '{}': {e}", prompt_path.display()))
    })?;

    apply_defaults_and_validate(&prompt_node.inputs, &mut gathered)?;
    let rendered = template::render(&prompt_node.body, &gathered);

    let provider = if ctx.dry_run {
        ctx.registry.resolve_agent_provider("mock")
    } else {
        ctx.registry.resolve_agent_provider(&node.provider)
    }
    .map_err(NodeDispatchError::from_provider)?;

    let schema = match prompt_node.output.format {
        OutputFormat::Json => Some(prompt_node.output.schema.clone()),
        OutputFormat::Text => None,
    };

    let config = AgentConfig {
        max_turns: node.max_turns,
        allowed_tools: node.allowed_tools.clone(),
        cwd: node.cwd.clone(),
        mcp_servers: node.mcp_servers.clone(),
        permission_mode: node.permission_mode.clone(),
        resume_session_id: ctx.resume_sessions.get(&node.id).cloned(),
        schema: schema.clone(),
    };

    let result = provider.execute(&rendered, &config).map_err(NodeDispatchError::from_provider)?;

    let output = if let Some(schema) = &schema {
        let structured = match result.structured.clone() {
            Some(v) => v,
            None => {
                let extracted = extract_json(&result.text).ok_or_else(|| {
                    NodeDispatchError::new(
                        "AgentOutputError",
                        "agent response is not JSON and could not be tolerantly extracted",
                    )
                })?;
                Value::from_json(extracted)
            }
        };
        let mut map = structured
            .as_map()
            .cloned()
            .ok_or_else(|| NodeDispatchError::new("AgentOutputError", "agent structured output is not an object"))?;
        for field in schema.keys() {
            if !map.contains_key(field) {
                return Err(NodeDispatchError::new(
                    "AgentOutputError",
                    format!("missing required field '{field}' in agent output"),
                ));
            }
        }
        map.insert("text".to_string(), Value::String(result.text.clone()));
        Value::Map(map)
    } else {
        let mut m = BTreeMap::new();
        m.insert("text".to_string(), Value::String(result.text.clone()));
        Value::Map(m)
    };

    Ok(DispatchOutcome {
        output,
        model: None,
        input_tokens: result.usage.input_tokens,
        output_tokens: result.usage.output_tokens,
        cost_usd: result.usage.cost_usd,
        session_id: result.session_id,
        turn_count: Some(result.turn_count),
        branch_final_iteration: None,
    })
}

fn dispatch_branch(node: &BranchNode, gathered: Value, ctx: &DispatchContext) -> Result<DispatchOutcome, NodeDispatchError> {
    if let Some(expr) = &node.condition {
        let passed = condition::evaluate(expr, &gathered).unwrap_or(false);
        if !passed {
            return Ok(DispatchOutcome::plain(gathered));
        }
    }

    let result = crate::branch::run_branch_loop(node, gathered, ctx)
        .map_err(|e| NodeDispatchError::new("BranchError", e.to_string()))?;

    Ok(DispatchOutcome::plain(result.outputs).with_branch_iteration(result.final_iteration))
}

fn dispatch_trigger(node: &TriggerNode, gathered: Value, ctx: &DispatchContext) -> Result<DispatchOutcome, NodeDispatchError> {
    if let Some(expr) = &node.condition {
        let passed = condition::evaluate(expr, &gathered).unwrap_or(false);
        if !passed {
            return Ok(DispatchOutcome::plain(gathered));
        }
    }

    let workflow_path = ctx.project.root.join(&node.workflow_path);

    match node.mode {
        TriggerMode::FireAndForget => {
            let binary = which::which("trident").ok().or_else(|| std::env::current_exe().ok());
            match binary {
                Some(binary) => {
                    let input_json = serde_json::to_string(&gathered.to_json()).unwrap_or_else(|_| "{}".to_string());
                    let spawned = Command::new(&binary)
                        .arg("project")
                        .arg("run")
                        .arg(&workflow_path)
                        .arg("--input")
                        .arg(input_json)
                        .stdin(Stdio::null())
                        .stdout(Stdio::null())
                        .stderr(Stdio::null())
                        .spawn();
                    if let Err(e) = spawned {
                        tracing::warn!(workflow = %node.workflow_path, error = %e, "failed to spawn fire-and-forget trigger");
                    }
                }
                None => {
                    tracing::warn!(workflow = %node.workflow_path, "trident binary not discoverable; fire-and-forget trigger not spawned");
                }
            }

            if node.emit_signal {
                let _ = ctx.artifact_mgr.emit_signal(crate::model::SignalType::Started, &node.workflow_path, None, None);
            }

            let mut m = BTreeMap::new();
            m.insert("triggered".to_string(), Value::Bool(true));
            m.insert("status".to_string(), Value::String("started".to_string()));
            Ok(DispatchOutcome::plain(Value::Map(m)))
        }
        TriggerMode::Wait => {
            let sub_project = crate::parser::load_project(&workflow_path).map_err(|e| {
                NodeDispatchError::new("BranchError", format!("failed to load triggered workflow '{}': {e}", node.workflow_path))
            })?;
            let sub_inputs = if node.pass_outputs { gathered.clone() } else { Value::map() };
            let artifact_base_dir = sub_project.root.join(".trident");
            let sub_project = Arc::new(sub_project);

            let options = super::RunOptions {
                dry_run: ctx.dry_run,
                resume_sessions: ctx.resume_sessions.clone(),
                artifact_base_dir,
                ..super::RunOptions::default()
            };

            let registry = Arc::clone(&ctx.registry);
            let run_result = ctx
                .runtime
                .block_on(super::run(sub_project, sub_inputs, options, registry))
                .map_err(|e| NodeDispatchError::new("BranchError", format!("triggered sub-workflow failed: {e}")))?;

            if !run_result.success {
                return Err(NodeDispatchError::new("BranchError", "triggered sub-workflow did not complete successfully"));
            }

            let mut output = run_result.outputs.as_map().cloned().unwrap_or_default();
            output.insert("triggered".to_string(), Value::Bool(true));
            output.insert("status".to_string(), Value::String("completed".to_string()));
            Ok(DispatchOutcome::plain(Value::Map(output)))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Edge, FieldMapping};

    fn dag_node(id: &str, in_edges: Vec<Edge>) -> DagNode {
        DagNode { id: id.to_string(), kind: crate::model::NodeKind::Output, in_edges, out_edges: vec![] }
    }

    #[test]
    fn gather_inputs_applies_mapping_dotted_path() {
        let mut upstream = BTreeMap::new();
        upstream.insert("score".to_string(), Value::Integer(7));
        let mut node_outputs = BTreeMap::new();
        node_outputs.insert("p".to_string(), Value::Map(upstream));

        let edge = Edge {
            id: "e1".into(),
            from_node: "p".into(),
            to_node: "q".into(),
            mappings: vec![FieldMapping { target_var: "x".into(), source_expr: "score".into() }],
            condition: None,
        };
        let node = dag_node("q", vec![edge]);
        let gathered = gather_inputs(&node, &node_outputs);
        assert_eq!(gathered.get_path("x"), Some(&Value::Integer(7)));
    }

    #[test]
    fn gather_inputs_omits_field_when_source_missing() {
        let node_outputs: BTreeMap<String, Value> = BTreeMap::new();
        let edge = Edge {
            id: "e1".into(),
            from_node: "p".into(),
            to_node: "q".into(),
            mappings: vec![FieldMapping { target_var: "x".into(), source_expr: "score".into() }],
            condition: None,
        };
        let node = dag_node("q", vec![edge]);
        let gathered = gather_inputs(&node, &node_outputs);
        assert_eq!(gathered.get_path("x"), None);
    }

    #[test]
    fn is_gated_skip_true_when_condition_false() {
        let mut upstream = BTreeMap::new();
        upstream.insert("score".to_string(), Value::Integer(3));
        let mut node_outputs = BTreeMap::new();
        node_outputs.insert("p".to_string(), Value::Map(upstream));

        let edge = Edge {
            id: "e1".into(),
            from_node: "p".into(),
            to_node: "q".into(),
            mappings: vec![],
            condition: Some(crate::model::Condition("score > 5".into())),
        };
        let node = dag_node("q", vec![edge]);
        assert!(is_gated_skip(&node, &node_outputs));
    }

    #[test]
    fn is_gated_skip_false_when_no_conditions() {
        let node = dag_node("q", vec![]);
        let node_outputs = BTreeMap::new();
        assert!(!is_gated_skip(&node, &node_outputs));
    }

    #[test]
    fn missing_required_input_is_an_error() {
        let mut declared = BTreeMap::new();
        declared.insert(
            "x".to_string(),
            PromptInput { field_type: FieldType::String, description: String::new(), required: true, default: None },
        );
        let mut gathered = Value::map();
        let err = apply_defaults_and_validate(&declared, &mut gathered).unwrap_err();
        assert_eq!(err.error_type, "RequiredInputMissing");
    }

    #[test]
    fn missing_optional_input_uses_default() {
        let mut declared = BTreeMap::new();
        declared.insert(
            "x".to_string(),
            PromptInput {
                field_type: FieldType::String,
                description: String::new(),
                required: false,
                default: Some(Value::String("fallback".into())),
            },
        );
        let mut gathered = Value::map();
        apply_defaults_and_validate(&declared, &mut gathered).unwrap();
        assert_eq!(gathered.get_path("x"), Some(&Value::String("fallback".into())));
    }
}
