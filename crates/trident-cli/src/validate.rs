use std::path::Path;

use anyhow::Result;
use trident_core::dag::{self, validate_mappings, validate_subworkflows};
use trident_core::parser::load_project;

/// Validate a project's manifest, DAG, and edge mappings (spec.md §6
/// "project validate"). Returns the process exit code: 0 on success, 2 on
/// validation failure (including, in `--strict` mode, mere warnings).
pub fn run(path: &Path, strict: bool) -> Result<i32> {
    let project = match load_project(path) {
        Ok(p) => p,
        Err(e) => {
            eprintln!("parse error: {e}");
            return Ok(2);
        }
    };

    let workflow_dag = match dag::build(&project) {
        Ok(d) => d,
        Err(e) => {
            eprintln!("validation error: {e}");
            return Ok(2);
        }
    };

    let warnings = validate_mappings(&project, &workflow_dag);
    if let Err(e) = validate_subworkflows(&project, |p| load_project(Path::new(p))) {
        eprintln!("validation error: {e}");
        return Ok(2);
    }

    for warning in &warnings {
        println!("warning: {warning}");
    }

    println!(
        "{} node(s), {} edge(s), {} level(s)",
        workflow_dag.nodes.len(),
        project.edges.len(),
        workflow_dag.levels.len()
    );

    if !warnings.is_empty() && strict {
        eprintln!("{} warning(s) treated as errors in --strict mode", warnings.len());
        return Ok(2);
    }

    println!("OK");
    Ok(0)
}
