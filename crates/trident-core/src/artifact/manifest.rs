use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::ArtifactError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunEntryStatus {
    Running,
    Completed,
    Failed,
    Interrupted,
}

/// One row of the project-wide run index (`runs/manifest.json`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunEntry {
    pub run_id: Uuid,
    pub project_name: String,
    pub entrypoint: Option<String>,
    pub status: RunEntryStatus,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    pub success: Option<bool>,
    pub error_summary: Option<String>,
}

/// The ordered run index for a project root: one entry per run, updated at
/// every run's start and end. Single-writer (one live run per project;
/// spec.md §1/§5 Non-goals).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RunIndex {
    pub runs: Vec<RunEntry>,
}

impl RunIndex {
    pub fn read_from(path: &std::path::Path) -> Result<Self, ArtifactError> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let data = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&data)?)
    }

    pub fn write_to(&self, path: &std::path::Path) -> Result<(), ArtifactError> {
        super::manager::write_json_atomic(path, self)?;
        Ok(())
    }

    /// Insert a new `running` entry, or update an existing one in place
    /// (upsert keyed on `run_id`).
    pub fn upsert(&mut self, entry: RunEntry) {
        if let Some(existing) = self.runs.iter_mut().find(|r| r.run_id == entry.run_id) {
            *existing = entry;
        } else {
            self.runs.push(entry);
        }
    }

    pub fn find(&self, run_id: Uuid) -> Option<&RunEntry> {
        self.runs.iter().find(|r| r.run_id == run_id)
    }

    pub fn latest(&self) -> Option<&RunEntry> {
        self.runs.iter().max_by_key(|r| r.started_at)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn upsert_inserts_then_updates() {
        let mut idx = RunIndex::default();
        let id = Uuid::new_v4();
        idx.upsert(RunEntry {
            run_id: id,
            project_name: "demo".into(),
            entrypoint: None,
            status: RunEntryStatus::Running,
            started_at: Utc::now(),
            ended_at: None,
            success: None,
            error_summary: None,
        });
        assert_eq!(idx.runs.len(), 1);

        idx.upsert(RunEntry {
            run_id: id,
            project_name: "demo".into(),
            entrypoint: None,
            status: RunEntryStatus::Completed,
            started_at: idx.runs[0].started_at,
            ended_at: Some(Utc::now()),
            success: Some(true),
            error_summary: None,
        });
        assert_eq!(idx.runs.len(), 1);
        assert_eq!(idx.runs[0].status, RunEntryStatus::Completed);
    }

    #[test]
    fn read_from_missing_file_is_empty_index() {
        let idx = RunIndex::read_from(std::path::Path::new("/tmp/no-such-manifest.json")).unwrap();
        assert!(idx.runs.is_empty());
    }

    #[test]
    fn round_trip_through_disk() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("manifest.json");
        let mut idx = RunIndex::default();
        idx.upsert(RunEntry {
            run_id: Uuid::new_v4(),
            project_name: "demo".into(),
            entrypoint: Some("main".into()),
            status: RunEntryStatus::Completed,
            started_at: Utc::now(),
            ended_at: Some(Utc::now()),
            success: Some(true),
            error_summary: None,
        });
        idx.write_to(&path).unwrap();
        let loaded = RunIndex::read_from(&path).unwrap();
        assert_eq!(loaded.runs.len(), 1);
        assert_eq!(loaded.runs[0].project_name, "demo");
    }
}
