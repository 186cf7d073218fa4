//! Orchestration substrate (spec.md §4.5): file-based signals plus
//! cross-run input resolution. Signals are a declarative marker — a file's
//! existence and JSON content — so waiting on one is just a poll loop over
//! the filesystem, and resolving a prior run's outputs is just building the
//! right path and reading a JSON file.

use std::path::{Path, PathBuf};
use std::time::Duration;

use uuid::Uuid;

use crate::artifact::ArtifactLayout;
use crate::error::{Result, TridentError};
use crate::model::Signal;
use crate::value::Value;

/// Resolve a `signal:<workflow>.<type>` spec, a project-relative path, or
/// an absolute path to a concrete file path (spec.md §4.5 "Wait
/// protocol").
pub fn resolve_signal_spec(spec: &str, project_root: &Path, artifact_base_dir: &Path) -> PathBuf {
    if let Some(rest) = spec.strip_prefix("signal:") {
        let (workflow, signal_type) = rest.rsplit_once('.').unwrap_or((rest, "completed"));
        let layout = ArtifactLayout::new(artifact_base_dir, Uuid::nil());
        return layout.signal_path(workflow, signal_type);
    }
    let path = Path::new(spec);
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        project_root.join(path)
    }
}

/// Poll every `poll_interval` until every resolved signal file exists and
/// parses as a `Signal`, or `timeout` elapses (spec.md §4.5 "Wait
/// protocol"). Returns the names still missing, used to build the
/// `SignalTimeoutError` message.
pub async fn wait_for_signals(
    specs: &[String],
    project_root: &Path,
    artifact_base_dir: &Path,
    poll_interval: Duration,
    timeout: Duration,
) -> Result<()> {
    let paths: Vec<(String, PathBuf)> = specs
        .iter()
        .map(|s| (s.clone(), resolve_signal_spec(s, project_root, artifact_base_dir)))
        .collect();

    let deadline = tokio::time::Instant::now() + timeout;

    loop {
        let missing: Vec<&str> = paths
            .iter()
            .filter(|(_, path)| !signal_ready(path))
            .map(|(spec, _)| spec.as_str())
            .collect();

        if missing.is_empty() {
            return Ok(());
        }

        if tokio::time::Instant::now() >= deadline {
            return Err(TridentError::Orchestration(format!(
                "timed out waiting for signals: {}",
                missing.join(", ")
            )));
        }

        tokio::time::sleep(poll_interval).await;
    }
}

fn signal_ready(path: &Path) -> bool {
    std::fs::read_to_string(path).ok().and_then(|data| serde_json::from_str::<Signal>(&data).ok()).is_some()
}

/// Resolve one of the three input-source forms (spec.md §4.5 "Input
/// resolution") to a parsed `Value`.
pub fn resolve_input_source(source: &str, project_root: &Path) -> Result<Value> {
    let path = if let Some(alias) = source.strip_prefix("alias:") {
        project_root.join(".trident").join("outputs").join(format!("{alias}.json"))
    } else if let Some(run_id) = source.strip_prefix("run:") {
        project_root.join(".trident").join("runs").join(run_id).join("outputs.json")
    } else {
        let p = Path::new(source);
        if p.is_absolute() { p.to_path_buf() } else { project_root.join(p) }
    };

    let data = std::fs::read_to_string(&path)
        .map_err(|e| TridentError::Orchestration(format!("failed to read input source '{source}' at '{}': {e}", path.display())))?;
    let json: serde_json::Value = serde_json::from_str(&data)
        .map_err(|e| TridentError::Orchestration(format!("input source '{source}' is not valid JSON: {e}")))?;
    Ok(Value::from_json(json))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolve_signal_spec_builds_signal_path() {
        let tmp = tempfile::tempdir().unwrap();
        let path = resolve_signal_spec("signal:ingest.completed", tmp.path(), &tmp.path().join(".trident"));
        assert!(path.ends_with("signals/ingest.completed"));
    }

    #[test]
    fn resolve_signal_spec_plain_relative_path() {
        let tmp = tempfile::tempdir().unwrap();
        let path = resolve_signal_spec("markers/done.json", tmp.path(), &tmp.path().join(".trident"));
        assert_eq!(path, tmp.path().join("markers/done.json"));
    }

    #[tokio::test]
    async fn wait_for_signals_succeeds_once_file_appears() {
        let tmp = tempfile::tempdir().unwrap();
        let base = tmp.path().join(".trident");
        let layout = ArtifactLayout::new(&base, Uuid::nil());
        std::fs::create_dir_all(layout.signals_dir()).unwrap();
        let signal_path = layout.signal_path("demo", "completed");
        let signal = Signal::new(crate::model::SignalType::Completed, Uuid::new_v4(), "demo", None, None);
        std::fs::write(&signal_path, serde_json::to_string(&signal).unwrap()).unwrap();

        wait_for_signals(
            &["signal:demo.completed".to_string()],
            tmp.path(),
            &base,
            Duration::from_millis(10),
            Duration::from_secs(1),
        )
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn wait_for_signals_times_out_when_missing() {
        let tmp = tempfile::tempdir().unwrap();
        let base = tmp.path().join(".trident");
        let err = wait_for_signals(
            &["signal:demo.completed".to_string()],
            tmp.path(),
            &base,
            Duration::from_millis(5),
            Duration::from_millis(30),
        )
        .await
        .unwrap_err();
        assert!(err.to_string().contains("demo.completed"));
    }

    #[test]
    fn resolve_input_source_alias_form() {
        let tmp = tempfile::tempdir().unwrap();
        let outputs_dir = tmp.path().join(".trident").join("outputs");
        std::fs::create_dir_all(&outputs_dir).unwrap();
        std::fs::write(outputs_dir.join("latest.json"), r#"{"x": 1}"#).unwrap();

        let v = resolve_input_source("alias:latest", tmp.path()).unwrap();
        assert_eq!(v.get_path("x"), Some(&Value::Integer(1)));
    }

    #[test]
    fn resolve_input_source_run_form() {
        let tmp = tempfile::tempdir().unwrap();
        let run_dir = tmp.path().join(".trident").join("runs").join("abc123");
        std::fs::create_dir_all(&run_dir).unwrap();
        std::fs::write(run_dir.join("outputs.json"), r#"{"y": 2}"#).unwrap();

        let v = resolve_input_source("run:abc123", tmp.path()).unwrap();
        assert_eq!(v.get_path("y"), Some(&Value::Integer(2)));
    }
}
