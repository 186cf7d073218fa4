use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::model::{
    BranchIterationState, Checkpoint, ExecutionTrace, OrchestrationConfig, Signal, SignalType,
};
use crate::value::Value;

use super::layout::ArtifactLayout;
use super::manifest::{RunEntry, RunEntryStatus, RunIndex};
use super::ArtifactError;

/// Serialize `value` as 2-space-indented JSON and write it atomically
/// (write to a sibling temp file, then rename) so a crash mid-write never
/// leaves a torn file behind for the next `load_checkpoint` to trip over.
pub(super) fn write_json_atomic<T: Serialize>(path: &Path, value: &T) -> Result<(), ArtifactError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let json = serde_json::to_string_pretty(value)?;
    let tmp_path = path.with_extension("json.tmp");
    std::fs::write(&tmp_path, json)?;
    std::fs::rename(&tmp_path, path)?;
    Ok(())
}

fn read_json<T: for<'de> Deserialize<'de>>(path: &Path) -> Result<Option<T>, ArtifactError> {
    if !path.exists() {
        return Ok(None);
    }
    let data = std::fs::read_to_string(path)?;
    Ok(Some(serde_json::from_str(&data)?))
}

/// Per-run metadata snapshot (`metadata.json`), the run-local counterpart
/// of the project-wide `RunEntry` row in `runs/manifest.json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunMetadata {
    pub run_id: Uuid,
    pub project_name: String,
    pub entrypoint: Option<String>,
    pub status: RunEntryStatus,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    pub success: Option<bool>,
    pub error_summary: Option<String>,
}

/// Owns the per-run directory layout: checkpoints, traces, outputs,
/// metadata, branch iterations, signals, and the project-wide run index.
/// Created fresh per `run(...)` invocation (spec.md §3 Lifecycle).
#[derive(Clone)]
pub struct ArtifactManager {
    layout: ArtifactLayout,
}

impl ArtifactManager {
    pub fn new(base_dir: impl Into<std::path::PathBuf>, run_id: Uuid) -> Self {
        Self { layout: ArtifactLayout::new(base_dir, run_id) }
    }

    pub fn layout(&self) -> &ArtifactLayout {
        &self.layout
    }

    pub fn run_id(&self) -> Uuid {
        self.layout.run_id()
    }

    /// Nested `ArtifactManager` for one iteration of a branch node, rooted
    /// under this run's `branches/{branch_id}/iter_{n}/` directory.
    pub fn nested_for_branch_iteration(&self, branch_id: &str, iteration: u32) -> Self {
        Self::new(self.layout.branch_iteration_root(branch_id, iteration), Uuid::new_v4())
    }

    // -- run registration / status -----------------------------------

    pub fn register_run(&self, project_name: &str, entrypoint: Option<&str>) -> Result<(), ArtifactError> {
        self.layout.create_run_dirs()?;

        let metadata = RunMetadata {
            run_id: self.run_id(),
            project_name: project_name.to_string(),
            entrypoint: entrypoint.map(str::to_string),
            status: RunEntryStatus::Running,
            started_at: Utc::now(),
            ended_at: None,
            success: None,
            error_summary: None,
        };
        write_json_atomic(&self.layout.metadata_path(), &metadata)?;

        let index_path = self.layout.run_index_path();
        let mut index = RunIndex::read_from(&index_path)?;
        index.upsert(RunEntry {
            run_id: metadata.run_id,
            project_name: metadata.project_name,
            entrypoint: metadata.entrypoint,
            status: metadata.status,
            started_at: metadata.started_at,
            ended_at: None,
            success: None,
            error_summary: None,
        });
        index.write_to(&index_path)?;
        Ok(())
    }

    pub fn update_run_status(
        &self,
        status: RunEntryStatus,
        success: Option<bool>,
        error_summary: Option<String>,
    ) -> Result<(), ArtifactError> {
        let metadata_path = self.layout.metadata_path();
        let mut metadata: RunMetadata = read_json(&metadata_path)?.unwrap_or(RunMetadata {
            run_id: self.run_id(),
            project_name: String::new(),
            entrypoint: None,
            status,
            started_at: Utc::now(),
            ended_at: None,
            success: None,
            error_summary: None,
        });
        metadata.status = status;
        metadata.ended_at = Some(Utc::now());
        metadata.success = success;
        metadata.error_summary = error_summary.clone();
        write_json_atomic(&metadata_path, &metadata)?;

        let index_path = self.layout.run_index_path();
        let mut index = RunIndex::read_from(&index_path)?;
        index.upsert(RunEntry {
            run_id: metadata.run_id,
            project_name: metadata.project_name,
            entrypoint: metadata.entrypoint,
            status: metadata.status,
            started_at: metadata.started_at,
            ended_at: metadata.ended_at,
            success: metadata.success,
            error_summary: metadata.error_summary,
        });
        index.write_to(&index_path)?;
        Ok(())
    }

    pub fn run_index(&self) -> Result<RunIndex, ArtifactError> {
        RunIndex::read_from(&self.layout.run_index_path())
    }

    // -- checkpoint / trace / outputs ---------------------------------

    pub fn save_checkpoint(&self, checkpoint: &Checkpoint) -> Result<(), ArtifactError> {
        write_json_atomic(&self.layout.checkpoint_path(), checkpoint)
    }

    pub fn load_checkpoint(&self) -> Result<Option<Checkpoint>, ArtifactError> {
        read_json(&self.layout.checkpoint_path())
    }

    pub fn save_trace(&self, trace: &ExecutionTrace) -> Result<(), ArtifactError> {
        write_json_atomic(&self.layout.trace_path(), trace)
    }

    /// Write the canonical `outputs.json`, and additionally publish to the
    /// orchestration-configured path/alias and a CLI-supplied override path
    /// (spec.md §4.2).
    pub fn save_outputs(
        &self,
        outputs: &Value,
        orchestration: &OrchestrationConfig,
        publish_override: Option<&Path>,
    ) -> Result<(), ArtifactError> {
        write_json_atomic(&self.layout.outputs_path(), outputs)?;

        if let Some(path) = &orchestration.publish.path {
            write_json_atomic(Path::new(path), outputs)?;
        }
        if let Some(alias) = &orchestration.publish.alias {
            self.write_alias(alias, &self.layout.outputs_path())?;
        }
        if let Some(path) = publish_override {
            write_json_atomic(path, outputs)?;
        }
        Ok(())
    }

    /// Maintain `<base>/outputs/{alias}.json` as a symlink to this run's
    /// canonical `outputs.json` (spec.md §4.2, "alias symlink"). Falls
    /// back to a plain copy on platforms/filesystems where symlinking
    /// isn't permitted.
    fn write_alias(&self, alias: &str, target: &Path) -> Result<(), ArtifactError> {
        let alias_path = self.layout.alias_path(alias);
        if let Some(parent) = alias_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        if alias_path.exists() || alias_path.symlink_metadata().is_ok() {
            std::fs::remove_file(&alias_path)?;
        }
        #[cfg(unix)]
        {
            if std::os::unix::fs::symlink(target, &alias_path).is_ok() {
                return Ok(());
            }
        }
        std::fs::copy(target, &alias_path)?;
        Ok(())
    }

    // -- branch iterations ---------------------------------------------

    pub fn save_branch_iteration(
        &self,
        branch_id: &str,
        state: &BranchIterationState,
    ) -> Result<(), ArtifactError> {
        write_json_atomic(&self.layout.branch_iteration_path(branch_id, state.iteration), state)
    }

    pub fn load_branch_iterations(&self, branch_id: &str) -> Result<Vec<BranchIterationState>, ArtifactError> {
        let dir = self.layout.branch_dir(branch_id);
        if !dir.exists() {
            return Ok(Vec::new());
        }
        let mut states = Vec::new();
        for entry in std::fs::read_dir(&dir)? {
            let entry = entry?;
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) == Some("json") {
                if let Some(state) = read_json::<BranchIterationState>(&path)? {
                    states.push(state);
                }
            }
        }
        states.sort_by_key(|s| s.iteration);
        Ok(states)
    }

    pub fn get_latest_iteration(&self, branch_id: &str) -> Result<Option<BranchIterationState>, ArtifactError> {
        Ok(self.load_branch_iterations(branch_id)?.into_iter().next_back())
    }

    // -- signals ---------------------------------------------------------

    pub fn emit_signal(
        &self,
        signal_type: SignalType,
        workflow: &str,
        outputs_path: Option<String>,
        metadata: Option<serde_json::Value>,
    ) -> Result<(), ArtifactError> {
        let signal = Signal::new(signal_type, self.run_id(), workflow, outputs_path, metadata);
        let path = self.layout.signal_path(workflow, &signal_type.to_string());
        write_json_atomic(&path, &signal)
    }

    pub fn clear_signals(&self, workflow: &str) -> Result<(), ArtifactError> {
        for signal_type in [SignalType::Started, SignalType::Completed, SignalType::Failed, SignalType::Ready] {
            let path = self.layout.signal_path(workflow, &signal_type.to_string());
            if path.exists() {
                std::fs::remove_file(path)?;
            }
        }
        Ok(())
    }

    pub fn load_signal(&self, workflow: &str, signal_type: SignalType) -> Result<Option<Signal>, ArtifactError> {
        read_json(&self.layout.signal_path(workflow, &signal_type.to_string()))
    }
}
