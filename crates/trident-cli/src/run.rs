use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::ValueEnum;
use uuid::Uuid;

use trident_core::executor::{self, ExecutionResult, ResumeRef, RunOptions};
use trident_core::orchestration::{resolve_input_source, wait_for_signals};
use trident_core::parser::load_project;
use trident_core::provider::ProviderRegistry;
use trident_core::value::Value;

#[derive(Debug, Clone, Copy, ValueEnum)]
#[value(rename_all = "lowercase")]
pub enum OutputMode {
    Json,
    Text,
    Pretty,
}

/// All flags of `project run` (spec.md §6), already parsed by clap in `main.rs`.
pub struct RunArgs {
    pub path: PathBuf,
    pub input: Option<String>,
    pub input_file: Option<PathBuf>,
    pub input_from: Option<String>,
    pub entrypoint: Option<String>,
    pub output: OutputMode,
    pub trace: bool,
    pub dry_run: bool,
    pub no_artifacts: bool,
    pub artifact_dir: Option<PathBuf>,
    pub run_id: Option<Uuid>,
    pub resume: Option<String>,
    pub start_from: Option<String>,
    pub emit_signal: bool,
    pub publish_to: Option<PathBuf>,
    pub wait_for: Vec<String>,
    pub timeout: Option<u64>,
}

/// Validate argument combinations `clap` cannot express (spec.md §6): at
/// most one of `--input`/`--input-file`/`--input-from`.
pub fn check_input_flags(args: &RunArgs) -> Result<()> {
    let count = [args.input.is_some(), args.input_file.is_some(), args.input_from.is_some()]
        .iter()
        .filter(|b| **b)
        .count();
    if count > 1 {
        bail!("only one of --input, --input-file, --input-from may be given");
    }
    Ok(())
}

fn resolve_inputs(args: &RunArgs) -> Result<Value> {
    if let Some(raw) = &args.input {
        let json: serde_json::Value = serde_json::from_str(raw).context("--input is not valid JSON")?;
        return Ok(Value::from_json(json));
    }
    if let Some(file) = &args.input_file {
        let text = std::fs::read_to_string(file).with_context(|| format!("failed to read '{}'", file.display()))?;
        let json: serde_json::Value = serde_json::from_str(&text).context("--input-file is not valid JSON")?;
        return Ok(Value::from_json(json));
    }
    if let Some(source) = &args.input_from {
        return Ok(resolve_input_source(source, &args.path)?);
    }
    Ok(Value::map())
}

fn resolve_resume(spec: &str) -> Result<ResumeRef> {
    if spec == "latest" {
        Ok(ResumeRef::Latest)
    } else {
        let id = Uuid::parse_str(spec).with_context(|| format!("'{spec}' is not a valid run id or 'latest'"))?;
        Ok(ResumeRef::Id(id))
    }
}

/// Run a project to completion (spec.md §6 "project run"). Returns the
/// process exit code: 0 success, 1 runtime error, 2 validation error, 3
/// provider error, 4 signal wait timeout.
pub async fn run(args: RunArgs) -> Result<i32> {
    check_input_flags(&args)?;

    let artifact_base_dir = args.artifact_dir.clone().unwrap_or_else(|| args.path.join(".trident"));

    if !args.wait_for.is_empty() {
        let timeout = Duration::from_secs(args.timeout.unwrap_or(300));
        if let Err(e) = wait_for_signals(&args.wait_for, &args.path, &artifact_base_dir, Duration::from_millis(500), timeout).await {
            eprintln!("{e}");
            return Ok(4);
        }
    }

    let project = match load_project(&args.path) {
        Ok(p) => p,
        Err(e) => {
            eprintln!("{e}");
            return Ok(2);
        }
    };

    let inputs = resolve_inputs(&args)?;

    let resume = match &args.resume {
        Some(spec) => Some(resolve_resume(spec)?),
        None => None,
    };

    let options = RunOptions {
        entrypoint: args.entrypoint.clone(),
        dry_run: args.dry_run,
        emit_signals: args.emit_signal,
        resume_sessions: Default::default(),
        artifact_base_dir,
        write_artifacts: !args.no_artifacts,
        run_id: args.run_id,
        resume,
        start_from: args.start_from.clone(),
        publish_override: args.publish_to.clone(),
    };

    let registry = Arc::new(ProviderRegistry::with_defaults());

    let result = match executor::run(Arc::new(project), inputs, options, registry).await {
        Ok(r) => r,
        Err(e) => {
            eprintln!("{e}");
            return Ok(exit_code_for_setup_error(&e));
        }
    };

    print_result(&result, args.output, args.trace);

    if result.success {
        return Ok(0);
    }
    Ok(result.error.as_ref().map(exit_code_for_node_error).unwrap_or(1))
}

fn exit_code_for_setup_error(err: &trident_core::TridentError) -> i32 {
    match err {
        trident_core::TridentError::Parse(_) | trident_core::TridentError::Validation(_) => 2,
        trident_core::TridentError::Provider(_) => 3,
        trident_core::TridentError::Orchestration(_) => 4,
        _ => 1,
    }
}

fn exit_code_for_node_error(err: &trident_core::executor::NodeExecutionError) -> i32 {
    if err.error_type == "ProviderError" {
        3
    } else {
        1
    }
}

fn print_result(result: &ExecutionResult, mode: OutputMode, with_trace: bool) {
    match mode {
        OutputMode::Json => {
            let body = serde_json::json!({
                "run_id": result.run_id,
                "success": result.success,
                "outputs": result.outputs.to_json(),
                "error": result.error.as_ref().map(|e| e.to_string()),
                "trace": if with_trace { Some(trace_json(result)) } else { None },
            });
            println!("{}", serde_json::to_string_pretty(&body).expect("json result"));
        }
        OutputMode::Pretty | OutputMode::Text => {
            let succeeded = result.trace.nodes.iter().filter(|n| !n.skipped && n.error.is_none()).count();
            let skipped = result.trace.nodes.iter().filter(|n| n.skipped).count();
            let failed = result.trace.nodes.iter().filter(|n| n.error.is_some()).count();
            println!(
                "run {}: {} (succeeded={succeeded}, skipped={skipped}, failed={failed})",
                result.run_id,
                if result.success { "success" } else { "failed" }
            );
            if let Some(err) = &result.error {
                println!("  failure: node '{}' ({}): {}", err.node_id, err.node_kind, err.cause);
            }
            println!("outputs: {}", result.outputs.to_text());
            if with_trace {
                for node in &result.trace.nodes {
                    let status = if node.skipped {
                        "skipped"
                    } else if node.error.is_some() {
                        "failed"
                    } else {
                        "ok"
                    };
                    println!("  [{status}] {}", node.node_id);
                    if let Some(err) = &node.error {
                        println!("      error: {err}");
                    }
                }
            }
        }
    }
}

fn trace_json(result: &ExecutionResult) -> serde_json::Value {
    serde_json::json!({
        "run_id": result.trace.run_id,
        "started_at": result.trace.started_at,
        "ended_at": result.trace.ended_at,
        "nodes": result.trace.nodes.iter().map(|n| serde_json::json!({
            "node_id": n.node_id,
            "skipped": n.skipped,
            "error": n.error,
            "error_type": n.error_type,
            "output": n.output.as_ref().map(|o| o.to_json()),
        })).collect::<Vec<_>>(),
    })
}
