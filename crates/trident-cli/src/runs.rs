use std::path::Path;

use anyhow::Result;
use trident_core::artifact::ArtifactManager;
use uuid::Uuid;

/// List recorded runs for a project (spec.md §6 "project runs").
pub fn run(path: &Path, limit: Option<usize>) -> Result<i32> {
    let artifact_base_dir = path.join(".trident");
    let probe = ArtifactManager::new(&artifact_base_dir, Uuid::nil());
    let index = probe.run_index()?;

    let mut entries = index.runs;
    entries.sort_by_key(|e| std::cmp::Reverse(e.started_at));
    if let Some(limit) = limit {
        entries.truncate(limit);
    }

    if entries.is_empty() {
        println!("no runs recorded at '{}'", artifact_base_dir.display());
        return Ok(0);
    }

    for entry in &entries {
        let success = entry.success.map(|s| if s { "success" } else { "failed" }).unwrap_or("-");
        println!(
            "{}  {:<9}  {}  entrypoint={}  success={}",
            entry.run_id,
            format!("{:?}", entry.status).to_lowercase(),
            entry.started_at.format("%Y-%m-%d %H:%M:%S UTC"),
            entry.entrypoint.as_deref().unwrap_or("-"),
            success,
        );
    }

    Ok(0)
}
