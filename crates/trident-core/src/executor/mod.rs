//! Level-by-level DAG scheduler (spec.md §4.3, §4.6). Builds the DAG,
//! resolves the run id and checkpoint, then walks execution levels in
//! order, dispatching each level's nodes concurrently on the blocking pool
//! and folding results into the running NodeOutput map, trace, and
//! checkpoint — mirroring the teacher's
//! `supervisor::parallel::ParallelSupervisor::run_all_to_completion`
//! fan-out/gather shape, generalized from a flat unit list to DAG levels.

pub(crate) mod dispatch;

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

use uuid::Uuid;

use crate::artifact::ArtifactManager;
use crate::dag;
use crate::error::{Result, TridentError};
use crate::model::{
    Checkpoint, CheckpointedNode, ExecutionTrace, NodeTrace, Project, RunStatus, SignalType,
};
use crate::provider::ProviderRegistry;
use crate::value::Value;

use dispatch::{dispatch_node, gather_inputs, is_gated_skip, DispatchContext};

/// Which prior run to resume from, and how far back.
#[derive(Debug, Clone)]
pub enum ResumeRef {
    /// Resume a specific run id.
    Id(Uuid),
    /// Resume the most recently registered run for this project.
    Latest,
}

/// Flags and overrides controlling one `run()` call (spec.md §4.3 "Entry
/// contract").
#[derive(Debug, Clone)]
pub struct RunOptions {
    pub entrypoint: Option<String>,
    pub dry_run: bool,
    pub emit_signals: bool,
    pub resume_sessions: BTreeMap<String, String>,
    pub artifact_base_dir: PathBuf,
    pub write_artifacts: bool,
    pub run_id: Option<Uuid>,
    pub resume: Option<ResumeRef>,
    pub start_from: Option<String>,
    pub publish_override: Option<PathBuf>,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            entrypoint: None,
            dry_run: false,
            emit_signals: false,
            resume_sessions: BTreeMap::new(),
            artifact_base_dir: PathBuf::from(".trident"),
            write_artifacts: true,
            run_id: None,
            resume: None,
            start_from: None,
            publish_override: None,
        }
    }
}

/// One node's execution failure, captured in the result rather than
/// propagated — only setup-phase errors raise from `run()` (spec.md §4.3).
#[derive(Debug, Clone)]
pub struct NodeExecutionError {
    pub node_id: String,
    pub node_kind: String,
    pub error_type: String,
    pub cause: String,
    pub inputs: Value,
}

impl std::fmt::Display for NodeExecutionError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "node '{}' ({}) failed: {} ({})", self.node_id, self.node_kind, self.cause, self.error_type)
    }
}

/// The outcome of a `run()` call: always returned, never an `Err`, unless
/// a setup-phase error occurred before any node ran.
#[derive(Debug, Clone)]
pub struct ExecutionResult {
    pub run_id: Uuid,
    pub success: bool,
    pub outputs: Value,
    pub trace: ExecutionTrace,
    pub error: Option<NodeExecutionError>,
}

fn resolve_run_id(options: &RunOptions, resumed_checkpoint: &Option<Checkpoint>) -> Uuid {
    if let Some(id) = options.run_id {
        return id;
    }
    if let Some(cp) = resumed_checkpoint {
        return cp.run_id;
    }
    Uuid::new_v4()
}

fn load_resumed_checkpoint(
    artifact_mgr_for_resume: Option<&ArtifactManager>,
) -> Result<Option<Checkpoint>> {
    match artifact_mgr_for_resume {
        Some(mgr) => Ok(mgr.load_checkpoint()?),
        None => Ok(None),
    }
}

/// Run a project's workflow to completion, per spec.md §4.3/§4.6.
pub async fn run(
    project: Arc<Project>,
    inputs: Value,
    options: RunOptions,
    registry: Arc<ProviderRegistry>,
) -> Result<ExecutionResult> {
    let workflow_dag = dag::build(&project)?;

    let entrypoint = options.entrypoint.clone().or_else(|| project.entrypoints.first().cloned());

    // Resolve the checkpoint to resume from, if any. `ResumeRef::Id` reads
    // that run's checkpoint directly; `Latest` reads the project's run
    // index and picks the newest entry.
    let resumed_checkpoint = match &options.resume {
        Some(ResumeRef::Id(id)) => {
            let mgr = ArtifactManager::new(&options.artifact_base_dir, *id);
            load_resumed_checkpoint(Some(&mgr))?
        }
        Some(ResumeRef::Latest) => {
            let probe = ArtifactManager::new(&options.artifact_base_dir, Uuid::new_v4());
            let index = probe.run_index()?;
            match index.latest() {
                Some(entry) => {
                    let mgr = ArtifactManager::new(&options.artifact_base_dir, entry.run_id);
                    load_resumed_checkpoint(Some(&mgr))?
                }
                None => None,
            }
        }
        None => None,
    };

    if options.resume.is_some() && resumed_checkpoint.is_none() {
        return Err(TridentError::Setup("resume target has no checkpoint to resume from".to_string()));
    }

    let run_id = resolve_run_id(&options, &resumed_checkpoint);
    let artifact_mgr = ArtifactManager::new(&options.artifact_base_dir, run_id);

    if options.write_artifacts {
        artifact_mgr.register_run(&project.name, entrypoint.as_deref())?;
        if options.emit_signals {
            if let Some(wf) = &entrypoint {
                artifact_mgr.clear_signals(wf)?;
                artifact_mgr.emit_signal(SignalType::Started, wf, None, None)?;
            }
        }
    }

    // Skip-set: which nodes reuse checkpointed output instead of
    // re-dispatching (spec.md §4.3 "Scheduling" step 1 and "Start-from
    // semantics").
    let skip_ids: std::collections::BTreeSet<String> = match (&options.start_from, &resumed_checkpoint) {
        (Some(start), Some(cp)) => {
            let ancestors = workflow_dag.ancestors(start);
            for ancestor in &ancestors {
                if !cp.completed_nodes.contains_key(ancestor) {
                    return Err(TridentError::Setup(format!(
                        "start_from '{start}': ancestor '{ancestor}' is not present in the resumed checkpoint"
                    )));
                }
            }
            ancestors
        }
        (None, Some(cp)) => cp.completed_nodes.keys().cloned().collect(),
        (_, None) => std::collections::BTreeSet::new(),
    };

    let mut checkpoint = match resumed_checkpoint {
        Some(cp) => cp,
        None => Checkpoint::new(
            run_id,
            project.name.clone(),
            inputs.clone(),
            entrypoint.clone(),
            workflow_dag.nodes.keys().cloned().collect(),
        ),
    };
    checkpoint.mark_status(RunStatus::Running);

    let mut trace = ExecutionTrace::new(run_id);
    let mut node_outputs: BTreeMap<String, Value> = checkpoint
        .completed_nodes
        .iter()
        .filter(|(id, _)| skip_ids.contains(*id))
        .map(|(id, n)| (id.clone(), n.output.clone()))
        .collect();

    let runtime = tokio::runtime::Handle::current();
    let mut execution_error: Option<NodeExecutionError> = None;

    'levels: for level in &workflow_dag.levels {
        let mut handles = Vec::new();

        for node_id in level {
            let dag_node = workflow_dag.node(node_id).expect("level node present in dag").clone();

            if skip_ids.contains(node_id) {
                if let Some(checkpointed) = checkpoint.completed_nodes.get(node_id) {
                    let node_trace = NodeTrace::start(node_id.clone(), Value::map())
                        .finish_ok(checkpointed.output.clone());
                    trace.nodes.push(node_trace);
                }
                continue;
            }

            let node = dag::resolve_node(&project, node_id)
                .ok_or_else(|| TridentError::Setup(format!("node '{node_id}' not found in project")))?;

            if is_gated_skip(&dag_node, &node_outputs) {
                let node_trace = NodeTrace::start(node_id.clone(), Value::map()).finish_skipped();
                trace.nodes.push(node_trace);
                continue;
            }

            let gathered = gather_inputs(&dag_node, &node_outputs);

            let ctx = DispatchContext {
                project: Arc::clone(&project),
                registry: Arc::clone(&registry),
                dry_run: options.dry_run,
                resume_sessions: options.resume_sessions.clone(),
                artifact_mgr: artifact_mgr.clone(),
                runtime: runtime.clone(),
                initial_inputs: inputs.clone(),
            };

            let node_id_owned = node_id.clone();
            let node_kind = node.kind().to_string();
            let gathered_for_trace = gathered.clone();

            let handle = tokio::task::spawn_blocking(move || {
                let result = dispatch_node(&node, gathered, &ctx);
                (node_id_owned, node_kind, gathered_for_trace, result)
            });
            handles.push(handle);
        }

        let mut level_results = Vec::with_capacity(handles.len());
        for handle in handles {
            let (node_id, node_kind, gathered, result) = handle
                .await
                .map_err(|e| TridentError::Setup(format!("node task panicked: {e}")))?;
            level_results.push((node_id, node_kind, gathered, result));
        }
        level_results.sort_by(|a, b| a.0.cmp(&b.0));

        for (node_id, node_kind, gathered, result) in level_results {
            match result {
                Ok(outcome) => {
                    let mut node_trace = NodeTrace::start(node_id.clone(), gathered);
                    node_trace.model = outcome.model.clone();
                    node_trace.input_tokens = outcome.input_tokens;
                    node_trace.output_tokens = outcome.output_tokens;
                    node_trace.cost_usd = outcome.cost_usd;
                    node_trace.session_id = outcome.session_id.clone();
                    node_trace.turn_count = outcome.turn_count;
                    let node_trace = node_trace.finish_ok(outcome.output.clone());
                    trace.nodes.push(node_trace);

                    if let Some(iteration) = outcome.branch_final_iteration {
                        checkpoint.record_branch_iteration(&node_id, iteration);
                    }

                    checkpoint.mark_node_completed(
                        &node_id,
                        CheckpointedNode {
                            output: outcome.output.clone(),
                            completed_at: chrono::Utc::now(),
                            session_id: outcome.session_id,
                            cost_usd: outcome.cost_usd,
                            turn_count: outcome.turn_count,
                        },
                    );
                    node_outputs.insert(node_id, outcome.output);
                }
                Err(err) => {
                    let node_trace =
                        NodeTrace::start(node_id.clone(), gathered.clone()).finish_err(&err.error_type, err.message.clone());
                    trace.nodes.push(node_trace);
                    execution_error = Some(NodeExecutionError {
                        node_id,
                        node_kind,
                        error_type: err.error_type,
                        cause: err.message,
                        inputs: gathered,
                    });
                }
            }
        }

        if options.write_artifacts {
            artifact_mgr.save_checkpoint(&checkpoint)?;
        }

        if execution_error.is_some() {
            break 'levels;
        }
    }

    let success = execution_error.is_none();
    checkpoint.mark_status(if success { RunStatus::Completed } else { RunStatus::Failed });
    if options.write_artifacts {
        artifact_mgr.save_checkpoint(&checkpoint)?;
    }

    trace.finish(execution_error.as_ref().map(|e| e.to_string()));

    let outputs = Value::Map(
        project
            .outputs
            .keys()
            .filter_map(|id| node_outputs.get(id).map(|v| (id.clone(), v.clone())))
            .collect(),
    );

    if options.write_artifacts {
        artifact_mgr.save_trace(&trace)?;
        artifact_mgr.save_outputs(&outputs, &project.orchestration, options.publish_override.as_deref())?;
        artifact_mgr.update_run_status(
            if success { crate::artifact::RunEntryStatus::Completed } else { crate::artifact::RunEntryStatus::Failed },
            Some(success),
            execution_error.as_ref().map(|e| e.to_string()),
        )?;

        if options.emit_signals {
            if let Some(wf) = &entrypoint {
                if success {
                    let outputs_path = artifact_mgr.layout().outputs_path().to_string_lossy().to_string();
                    artifact_mgr.emit_signal(SignalType::Completed, wf, Some(outputs_path), None)?;
                } else {
                    artifact_mgr.emit_signal(SignalType::Failed, wf, None, None)?;
                }
            }
        }
    }

    Ok(ExecutionResult { run_id, success, outputs, trace, error: execution_error })
}

/// Tolerant JSON extraction from an agent's free-form text response
/// (spec.md §4.3 "attempt tolerant extraction"): whole-text parse, then a
/// fenced ` ```json ` block, then a bare ` ``` ` block, then a
/// brace-matched object embedded in prose.
pub(crate) fn extract_json(text: &str) -> Option<serde_json::Value> {
    if let Ok(v) = serde_json::from_str(text.trim()) {
        return Some(v);
    }
    if let Some(v) = extract_fenced(text, "```json") {
        return Some(v);
    }
    if let Some(v) = extract_fenced(text, "```") {
        return Some(v);
    }
    extract_braced(text)
}

fn extract_fenced(text: &str, opening: &str) -> Option<serde_json::Value> {
    let start = text.find(opening)? + opening.len();
    let rest = &text[start..];
    let end = rest.find("```")?;
    serde_json::from_str(rest[..end].trim()).ok()
}

fn extract_braced(text: &str) -> Option<serde_json::Value> {
    let bytes = text.as_bytes();
    let start = bytes.iter().position(|&b| b == b'{')?;

    let mut depth = 0i32;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, &byte) in bytes[start..].iter().enumerate() {
        if in_string {
            if escaped {
                escaped = false;
            } else if byte == b'\\' {
                escaped = true;
            } else if byte == b'"' {
                in_string = false;
            }
            continue;
        }
        match byte {
            b'"' => in_string = true,
            b'{' => depth += 1,
            b'}' => {
                depth -= 1;
                if depth == 0 {
                    let end = start + offset + 1;
                    return serde_json::from_str(&text[start..end]).ok();
                }
            }
            _ => {}
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extract_json_whole_text() {
        let v = extract_json(r#"{"a": 1}"#).unwrap();
        assert_eq!(v["a"], 1);
    }

    #[test]
    fn extract_json_fenced_block() {
        let text = "Here you go:\n```json\n{\"a\": 2}\n```\nThanks.";
        let v = extract_json(text).unwrap();
        assert_eq!(v["a"], 2);
    }

    #[test]
    fn extract_json_bare_fenced_block() {
        let text = "```\n{\"a\": 3}\n```";
        let v = extract_json(text).unwrap();
        assert_eq!(v["a"], 3);
    }

    #[test]
    fn extract_json_braced_in_prose() {
        let text = "The answer is {\"a\": 4, \"nested\": {\"b\": 1}} according to the model.";
        let v = extract_json(text).unwrap();
        assert_eq!(v["a"], 4);
        assert_eq!(v["nested"]["b"], 1);
    }

    #[test]
    fn extract_json_none_when_no_json_present() {
        assert!(extract_json("no json here at all").is_none());
    }
}
