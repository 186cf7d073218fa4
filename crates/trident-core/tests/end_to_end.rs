//! End-to-end scheduler scenarios, matching spec.md §8's literal test list:
//! linear dry-run, parallel fan-out, edge gating, loop-to-completion,
//! max-iteration failure, crash-resume.

use std::path::Path;
use std::sync::Arc;

use trident_core::executor::{run, ResumeRef, RunOptions};
use trident_core::parser::load_project;
use trident_core::provider::ProviderRegistry;
use trident_core::value::Value;
use uuid::Uuid;

fn write(dir: &Path, rel: &str, contents: &str) {
    let path = dir.join(rel);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).unwrap();
    }
    std::fs::write(path, contents).unwrap();
}

fn registry() -> Arc<ProviderRegistry> {
    Arc::new(ProviderRegistry::with_defaults())
}

fn run_options(root: &Path) -> RunOptions {
    RunOptions {
        artifact_base_dir: root.join(".trident"),
        dry_run: true,
        ..Default::default()
    }
}

fn input_map(pairs: &[(&str, Value)]) -> Value {
    let mut m = std::collections::BTreeMap::new();
    for (k, v) in pairs {
        m.insert(k.to_string(), v.clone());
    }
    Value::Map(m)
}

#[tokio::test]
async fn linear_dry_run_produces_mock_status() {
    let dir = tempfile::tempdir().unwrap();
    write(
        dir.path(),
        "trident.yaml",
        r#"
trident: "1.0"
name: linear
defaults:
  model: mock/default
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
    to: p
    mapping:
      x: x
  e2:
    from: p
    to: out
    mapping:
      status: status
"#,
    );
    write(
        dir.path(),
        "prompts/p.prompt",
        r#"---
id: p
input:
  x: { type: integer }
output:
  format: json
  schema:
    status: { type: string }
---
noop
"#,
    );

    let project = load_project(dir.path()).unwrap();
    let result = run(Arc::new(project), input_map(&[("x", Value::Integer(1))]), run_options(dir.path()), registry())
        .await
        .unwrap();

    assert!(result.success);
    assert_eq!(result.outputs.get_path("out.status").unwrap().as_str(), Some("[mock_status]"));
}

#[tokio::test]
async fn parallel_fan_out_runs_both_branches_in_one_level() {
    let dir = tempfile::tempdir().unwrap();
    write(
        dir.path(),
        "trident.yaml",
        r#"
trident: "1.0"
name: fanout
defaults:
  model: mock/default
entrypoints: ["in"]
nodes:
  in:
    type: input
    schema:
      x: { type: integer }
  out:
    type: output
edges:
  e1: { from: in, to: a, mapping: { x: x } }
  e2: { from: in, to: b, mapping: { x: x } }
  e3: { from: a, to: out, mapping: { a: status } }
  e4: { from: b, to: out, mapping: { b: status } }
"#,
    );
    for id in ["a", "b"] {
        let content = format!(
            "---\nid: {id}\ninput:\n  x: {{ type: integer }}\noutput:\n  format: json\n  schema:\n    status: {{ type: string }}\n---\nnoop\n"
        );
        write(dir.path(), &format!("prompts/{id}.prompt"), &content);
    }

    let project = load_project(dir.path()).unwrap();
    let workflow_dag = trident_core::dag::build(&project).unwrap();
    assert_eq!(workflow_dag.levels.len(), 3);
    assert_eq!(workflow_dag.levels[1].len(), 2);

    let result = run(Arc::new(project), input_map(&[("x", Value::Integer(1))]), run_options(dir.path()), registry())
        .await
        .unwrap();
    assert!(result.success);
    let traced: Vec<_> = result.trace.nodes.iter().map(|n| n.node_id.clone()).collect();
    assert!(traced.contains(&"a".to_string()));
    assert!(traced.contains(&"b".to_string()));
}

#[tokio::test]
async fn edge_gating_skips_downstream_node() {
    let dir = tempfile::tempdir().unwrap();
    write(
        dir.path(),
        "trident.yaml",
        r#"
trident: "1.0"
name: gated
defaults:
  model: mock/default
entrypoints: ["in"]
nodes:
  in:
    type: input
    schema:
      score: { type: number }
  q:
    type: output
edges:
  e1: { from: in, to: p, mapping: { score: score } }
  e2: { from: p, to: q, condition: "score > 5", mapping: { score: score } }
"#,
    );
    write(
        dir.path(),
        "prompts/p.prompt",
        r#"---
id: p
input:
  score: { type: number }
output:
  format: json
  schema:
    score: { type: number }
---
noop
"#,
    );

    let project = load_project(dir.path()).unwrap();
    let result = run(Arc::new(project), input_map(&[("score", Value::Number(3.0))]), run_options(dir.path()), registry())
        .await
        .unwrap();

    assert!(result.success);
    assert_eq!(result.outputs, Value::map());
    let q_trace = result.trace.nodes.iter().find(|n| n.node_id == "q").unwrap();
    assert!(q_trace.skipped);
}


fn count_iteration_records(branch_dir: &Path) -> usize {
    std::fs::read_dir(branch_dir)
        .unwrap()
        .flatten()
        .filter(|e| e.file_name().to_string_lossy().starts_with("iteration_"))
        .count()
}

fn increment_project(root: &Path) {
    write(
        root,
        "trident.yaml",
        r#"
trident: "1.0"
name: increment
defaults:
  model: mock/default
entrypoints: ["in"]
tools:
  inc:
    type: python
    module: "inc.py"
nodes:
  in:
    type: input
    schema:
      counter: { type: number }
  out:
    type: output
edges:
  e1: { from: in, to: inc, mapping: { counter: counter } }
  e2: { from: inc, to: out, mapping: { counter: counter } }
"#,
    );
    write(
        root,
        "inc.py",
        r#"import json, sys
data = json.load(sys.stdin)
data["counter"] = data.get("counter", 0) + 1
print(json.dumps(data))
"#,
    );
}

#[tokio::test]
async fn loop_runs_to_completion() {
    let dir = tempfile::tempdir().unwrap();
    let increment_dir = dir.path().join("increment");
    std::fs::create_dir_all(&increment_dir).unwrap();
    increment_project(&increment_dir);

    write(
        dir.path(),
        "trident.yaml",
        r#"
trident: "1.0"
name: loop_success
defaults:
  model: mock/default
entrypoints: ["in"]
nodes:
  in:
    type: input
    schema:
      counter: { type: number }
  loop1:
    type: branch
    workflow_path: "increment"
    loop_while: "counter < 5"
    max_iterations: 10
  out:
    type: output
edges:
  e1: { from: in, to: loop1, mapping: { counter: counter } }
  e2: { from: loop1, to: out, mapping: { counter: counter } }
"#,
    );

    let project = load_project(dir.path()).unwrap();
    let mut options = run_options(dir.path());
    options.dry_run = false;
    let result = run(Arc::new(project), input_map(&[("counter", Value::Number(0.0))]), options, registry())
        .await
        .unwrap();

    assert!(result.success);
    assert_eq!(result.outputs.get_path("out.counter").unwrap().as_f64(), Some(5.0));

    let iterations_dir = dir.path().join(".trident").join("runs").join(result.run_id.to_string()).join("branches").join("loop1");
    let count = count_iteration_records(&iterations_dir);
    assert_eq!(count, 5);
}

#[tokio::test]
async fn loop_fails_at_max_iterations() {
    let dir = tempfile::tempdir().unwrap();
    let increment_dir = dir.path().join("increment");
    std::fs::create_dir_all(&increment_dir).unwrap();
    increment_project(&increment_dir);

    write(
        dir.path(),
        "trident.yaml",
        r#"
trident: "1.0"
name: loop_failure
defaults:
  model: mock/default
entrypoints: ["in"]
nodes:
  in:
    type: input
    schema:
      counter: { type: number }
  loop1:
    type: branch
    workflow_path: "increment"
    loop_while: "counter < 100"
    max_iterations: 3
  out:
    type: output
edges:
  e1: { from: in, to: loop1, mapping: { counter: counter } }
  e2: { from: loop1, to: out, mapping: { counter: counter } }
"#,
    );

    let project = load_project(dir.path()).unwrap();
    let mut options = run_options(dir.path());
    options.dry_run = false;
    let result = run(Arc::new(project), input_map(&[("counter", Value::Number(0.0))]), options, registry())
        .await
        .unwrap();

    assert!(!result.success);
    let run_id = result.run_id;
    let err = result.error.unwrap();
    assert!(err.cause.contains("Max iterations"));

    let iterations_dir = dir.path().join(".trident").join("runs").join(run_id.to_string()).join("branches").join("loop1");
    let count = count_iteration_records(&iterations_dir);
    assert_eq!(count, 3);
}

#[tokio::test]
async fn loop_resumes_from_latest_persisted_iteration_not_original_inputs() {
    let dir = tempfile::tempdir().unwrap();
    let increment_dir = dir.path().join("increment");
    std::fs::create_dir_all(&increment_dir).unwrap();
    increment_project(&increment_dir);

    write(
        dir.path(),
        "trident.yaml",
        r#"
trident: "1.0"
name: loop_resume
defaults:
  model: mock/default
entrypoints: ["in"]
nodes:
  in:
    type: input
    schema:
      counter: { type: number }
  loop1:
    type: branch
    workflow_path: "increment"
    loop_while: "counter < 5"
    max_iterations: 10
  out:
    type: output
edges:
  e1: { from: in, to: loop1, mapping: { counter: counter } }
  e2: { from: loop1, to: out, mapping: { counter: counter } }
"#,
    );

    let project = Arc::new(load_project(dir.path()).unwrap());
    let run_id = Uuid::new_v4();

    // Simulate a crash after iteration 3 completed: seed the artifact tree
    // with its persisted record before the node ever runs, as if a prior
    // process had gotten this far and died before iteration 4.
    let mut seeded = std::collections::BTreeMap::new();
    seeded.insert("counter".to_string(), Value::Number(3.0));
    let artifact_mgr = trident_core::ArtifactManager::new(dir.path().join(".trident"), run_id);
    artifact_mgr
        .save_branch_iteration(
            "loop1",
            &trident_core::model::BranchIterationState {
                branch_id: "loop1".to_string(),
                iteration: 3,
                inputs: Value::map(),
                outputs: Some(Value::Map(seeded)),
                started_at: chrono::Utc::now(),
                ended_at: Some(chrono::Utc::now()),
                success: true,
                error: None,
            },
        )
        .unwrap();

    let mut options = run_options(dir.path());
    options.dry_run = false;
    options.run_id = Some(run_id);
    let result = run(Arc::clone(&project), input_map(&[("counter", Value::Number(0.0))]), options, registry())
        .await
        .unwrap();

    assert!(result.success);
    // Had the loop ignored the persisted iteration 3 and restarted from the
    // node's original inputs (counter=0), this would also land on 5, so the
    // iteration count below is the part that actually distinguishes resume
    // from a cold restart: only iterations 4 and 5 should have run.
    assert_eq!(result.outputs.get_path("out.counter").unwrap().as_f64(), Some(5.0));

    let iterations_dir = dir.path().join(".trident").join("runs").join(run_id.to_string()).join("branches").join("loop1");
    assert_eq!(count_iteration_records(&iterations_dir), 3);
    for iteration in [4, 5] {
        let path = iterations_dir.join(format!("iteration_{iteration}.json"));
        assert!(path.exists(), "expected {path:?} from a resumed iteration, not a cold restart");
    }
}

#[tokio::test]
async fn crash_resume_replays_completed_nodes_without_recomputation() {
    let dir = tempfile::tempdir().unwrap();
    write(
        dir.path(),
        "trident.yaml",
        r#"
trident: "1.0"
name: resumable
defaults:
  model: mock/default
entrypoints: ["in"]
nodes:
  in:
    type: input
    schema:
      x: { type: integer }
  out:
    type: output
edges:
  e1: { from: in, to: a, mapping: { x: x } }
  e2: { from: a, to: b, mapping: { x: status } }
  e3: { from: b, to: c, mapping: { x: status } }
  e4: { from: c, to: out, mapping: { status: status } }
"#,
    );
    for id in ["a", "b", "c"] {
        let content = format!(
            "---\nid: {id}\ninput:\n  x: {{ type: string }}\noutput:\n  format: json\n  schema:\n    status: {{ type: string }}\n---\nnoop\n"
        );
        write(dir.path(), &format!("prompts/{id}.prompt"), &content);
    }
    // the "in" -> "a" edge expects an integer but "a" declares a string
    // input; dry-run synthesis never reads declared types, only schema
    // field names, so the mismatch does not affect this scenario.

    let project = Arc::new(load_project(dir.path()).unwrap());
    let run_id = Uuid::new_v4();

    let mut first_options = run_options(dir.path());
    first_options.run_id = Some(run_id);
    let first = run(Arc::clone(&project), input_map(&[("x", Value::Integer(1))]), first_options, registry())
        .await
        .unwrap();
    assert!(first.success);

    let mut resume_options = run_options(dir.path());
    resume_options.resume = Some(ResumeRef::Id(run_id));
    let resumed = run(Arc::clone(&project), Value::map(), resume_options, registry()).await.unwrap();

    assert!(resumed.success);
    assert_eq!(resumed.outputs, first.outputs);
    for node in &resumed.trace.nodes {
        assert!(!node.skipped, "node '{}' should replay from checkpoint, not be gated-skipped", node.node_id);
    }
}
