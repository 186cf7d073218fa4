//! Branch (sub-workflow) loop protocol (spec.md §4.4): run another
//! project's workflow, once or repeatedly, as a single DAG node. Durable
//! progress lives in the per-iteration `BranchIterationState` files this
//! module writes after every iteration; on entry it reads the latest
//! successful one back (same run id, same `branches/{branch_id}/` dir) to
//! resume at the next unstarted iteration, seeded with that iteration's
//! flattened output, rather than restarting from the node's original
//! inputs.

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::condition;
use crate::error::{Result, TridentError};
use crate::model::{BranchIterationState, BranchNode};
use crate::value::Value;

use crate::executor::dispatch::DispatchContext;

/// Outcome of a branch node's full loop run.
pub(crate) struct BranchLoopResult {
    pub outputs: Value,
    pub final_iteration: u32,
}

/// Flatten a sub-workflow's outputs map (keyed by its output-node ids) to a
/// single value, per spec.md §4.4 "a single output node → its contents;
/// multiple → merge field sets". On field-name collision across multiple
/// output nodes, later ids (ascending `BTreeMap` order) win.
pub(crate) fn flatten_branch_outputs(outputs: &Value) -> Value {
    let Some(map) = outputs.as_map() else { return outputs.clone() };
    if map.len() == 1 {
        return map.values().next().cloned().unwrap_or_else(Value::map);
    }
    let mut merged = BTreeMap::new();
    for inner in map.values() {
        if let Some(inner_map) = inner.as_map() {
            for (k, v) in inner_map {
                merged.insert(k.clone(), v.clone());
            }
        }
    }
    Value::Map(merged)
}

/// Run a branch node's loop to completion (or to a `BranchError`).
///
/// Resumes from the latest successful `BranchIterationState` persisted for
/// this branch id under the current run's artifact tree, if any (spec.md
/// §4.4 step 3): iteration `k+1` starts seeded with iteration `k`'s
/// flattened output, not the node's original inputs. With no persisted
/// iteration, starts fresh at iteration 1 with `initial_inputs`.
pub(crate) fn run_branch_loop(
    node: &BranchNode,
    initial_inputs: Value,
    ctx: &DispatchContext,
) -> Result<BranchLoopResult> {
    let workflow_path = if node.workflow_path == "self" {
        ctx.project.root.clone()
    } else {
        ctx.project.root.join(&node.workflow_path)
    };
    let sub_project = Arc::new(crate::parser::load_project(&workflow_path)?);

    let resume_from = ctx.artifact_mgr.get_latest_iteration(&node.id)?.filter(|s| s.success);
    let mut iteration = resume_from.as_ref().map(|s| s.iteration + 1).unwrap_or(1);
    let mut current_inputs = resume_from.and_then(|s| s.outputs).unwrap_or(initial_inputs);
    let mut flattened;

    loop {
        let nested_mgr = ctx.artifact_mgr.nested_for_branch_iteration(&node.id, iteration);
        let started_at = chrono::Utc::now();

        let options = crate::executor::RunOptions {
            dry_run: ctx.dry_run,
            resume_sessions: ctx.resume_sessions.clone(),
            artifact_base_dir: nested_mgr.layout().base_dir().to_path_buf(),
            write_artifacts: true,
            ..crate::executor::RunOptions::default()
        };

        let run_result = ctx
            .runtime
            .block_on(crate::executor::run(Arc::clone(&sub_project), current_inputs.clone(), options, Arc::clone(&ctx.registry)));

        let run_result = match run_result {
            Ok(r) if r.success => r,
            Ok(r) => {
                let error_message = r.error.map(|e| e.to_string()).unwrap_or_else(|| "sub-workflow failed".to_string());
                let _ = ctx.artifact_mgr.save_branch_iteration(
                    &node.id,
                    &BranchIterationState {
                        branch_id: node.id.clone(),
                        iteration,
                        inputs: current_inputs.clone(),
                        outputs: None,
                        started_at,
                        ended_at: Some(chrono::Utc::now()),
                        success: false,
                        error: Some(error_message.clone()),
                    },
                );
                return Err(TridentError::Branch { message: error_message, iteration, max_iterations: node.max_iterations });
            }
            Err(e) => {
                return Err(TridentError::Branch { message: e.to_string(), iteration, max_iterations: node.max_iterations });
            }
        };

        flattened = flatten_branch_outputs(&run_result.outputs);

        ctx.artifact_mgr.save_branch_iteration(
            &node.id,
            &BranchIterationState {
                branch_id: node.id.clone(),
                iteration,
                inputs: current_inputs.clone(),
                outputs: Some(flattened.clone()),
                started_at,
                ended_at: Some(chrono::Utc::now()),
                success: true,
                error: None,
            },
        )?;

        let Some(loop_while) = &node.loop_while else { break };
        let keep_going = condition::evaluate(loop_while, &flattened).unwrap_or(false);
        if !keep_going {
            break;
        }

        if iteration >= node.max_iterations {
            return Err(TridentError::Branch {
                message: "Max iterations reached".to_string(),
                iteration,
                max_iterations: node.max_iterations,
            });
        }
        iteration += 1;
        current_inputs = flattened;
    }

    Ok(BranchLoopResult { outputs: flattened, final_iteration: iteration })
}
