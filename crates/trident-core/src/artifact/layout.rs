use std::path::{Path, PathBuf};
use uuid::Uuid;

/// Deterministic path builder for one run's artifact tree, rooted at a
/// project's `.trident/` directory (spec.md §6):
///
/// ```text
/// <base>/
///   runs/
///     manifest.json
///     {run_id}/
///       metadata.json
///       checkpoint.json
///       trace.json
///       outputs.json
///       branches/{branch_id}/iteration_{n}.json
///   signals/{workflow}.{type}
///   outputs/{alias}.json
/// ```
#[derive(Debug, Clone)]
pub struct ArtifactLayout {
    base_dir: PathBuf,
    run_id: Uuid,
}

impl ArtifactLayout {
    pub fn new(base_dir: impl Into<PathBuf>, run_id: Uuid) -> Self {
        Self { base_dir: base_dir.into(), run_id }
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    pub fn runs_dir(&self) -> PathBuf {
        self.base_dir.join("runs")
    }

    pub fn run_index_path(&self) -> PathBuf {
        self.runs_dir().join("manifest.json")
    }

    pub fn run_dir(&self) -> PathBuf {
        self.runs_dir().join(self.run_id.to_string())
    }

    pub fn metadata_path(&self) -> PathBuf {
        self.run_dir().join("metadata.json")
    }

    pub fn checkpoint_path(&self) -> PathBuf {
        self.run_dir().join("checkpoint.json")
    }

    pub fn trace_path(&self) -> PathBuf {
        self.run_dir().join("trace.json")
    }

    pub fn outputs_path(&self) -> PathBuf {
        self.run_dir().join("outputs.json")
    }

    pub fn branches_dir(&self) -> PathBuf {
        self.run_dir().join("branches")
    }

    pub fn branch_dir(&self, branch_id: &str) -> PathBuf {
        self.branches_dir().join(branch_id)
    }

    pub fn branch_iteration_path(&self, branch_id: &str, iteration: u32) -> PathBuf {
        self.branch_dir(branch_id).join(format!("iteration_{iteration}.json"))
    }

    /// Root for a nested sub-workflow's own `ArtifactManager`, per
    /// spec.md §3: `branches/{branch_id}/iter_{n}/`.
    pub fn branch_iteration_root(&self, branch_id: &str, iteration: u32) -> PathBuf {
        self.branch_dir(branch_id).join(format!("iter_{iteration}"))
    }

    pub fn signals_dir(&self) -> PathBuf {
        self.base_dir.join("signals")
    }

    pub fn signal_path(&self, workflow: &str, signal_type: &str) -> PathBuf {
        self.signals_dir().join(format!("{workflow}.{signal_type}"))
    }

    pub fn published_outputs_dir(&self) -> PathBuf {
        self.base_dir.join("outputs")
    }

    pub fn alias_path(&self, alias: &str) -> PathBuf {
        self.published_outputs_dir().join(format!("{alias}.json"))
    }

    pub fn create_run_dirs(&self) -> std::io::Result<()> {
        std::fs::create_dir_all(self.run_dir())?;
        std::fs::create_dir_all(self.branches_dir())?;
        std::fs::create_dir_all(self.signals_dir())?;
        std::fs::create_dir_all(self.published_outputs_dir())?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn paths_are_deterministic() {
        let id = Uuid::parse_str("550e8400-e29b-41d4-a716-446655440000").unwrap();
        let layout = ArtifactLayout::new("/tmp/.trident", id);
        assert_eq!(
            layout.run_dir(),
            Path::new("/tmp/.trident/runs/550e8400-e29b-41d4-a716-446655440000")
        );
        assert!(layout.checkpoint_path().ends_with("checkpoint.json"));
        assert!(layout.branch_iteration_path("loop1", 3).ends_with("branches/loop1/iteration_3.json"));
        assert!(layout.signal_path("wf", "completed").ends_with("signals/wf.completed"));
        assert!(layout.alias_path("latest").ends_with("outputs/latest.json"));
    }

    #[test]
    fn create_run_dirs_creates_full_tree() {
        let tmp = tempfile::tempdir().unwrap();
        let layout = ArtifactLayout::new(tmp.path(), Uuid::new_v4());
        layout.create_run_dirs().unwrap();
        assert!(layout.run_dir().exists());
        assert!(layout.branches_dir().exists());
        assert!(layout.signals_dir().exists());
        assert!(layout.published_outputs_dir().exists());
    }
}
