use std::path::Path;

use anyhow::Result;
use trident_core::artifact::ArtifactLayout;
use uuid::Uuid;

/// List or clear signal files under a project's orchestration directory
/// (spec.md §6 "project signals").
pub fn run(path: &Path, clear: bool) -> Result<i32> {
    let artifact_base_dir = path.join(".trident");
    let layout = ArtifactLayout::new(&artifact_base_dir, Uuid::nil());
    let signals_dir = layout.signals_dir();

    if !signals_dir.exists() {
        println!("no signals directory at '{}'", signals_dir.display());
        return Ok(0);
    }

    let mut entries: Vec<_> = std::fs::read_dir(&signals_dir)?
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| p.is_file())
        .collect();
    entries.sort();

    if clear {
        for path in &entries {
            std::fs::remove_file(path)?;
        }
        println!("cleared {} signal file(s)", entries.len());
        return Ok(0);
    }

    if entries.is_empty() {
        println!("no signals recorded");
        return Ok(0);
    }

    for path in &entries {
        let name = path.file_name().and_then(|n| n.to_str()).unwrap_or("?");
        let body = std::fs::read_to_string(path).unwrap_or_default();
        println!("{name}: {}", body.trim());
    }

    Ok(0)
}
