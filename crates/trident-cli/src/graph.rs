use std::path::Path;

use anyhow::{bail, Result};
use clap::ValueEnum;
use trident_core::dag;
use trident_core::parser::load_project;

#[derive(Debug, Clone, Copy, ValueEnum)]
#[value(rename_all = "lowercase")]
pub enum GraphFormat {
    Ascii,
    Mermaid,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum Direction {
    TD,
    LR,
    BT,
    RL,
}

/// Render a project's DAG (spec.md §6 "project graph").
pub fn run(path: &Path, format: GraphFormat, direction: Direction, open: bool) -> Result<i32> {
    let project = load_project(path)?;
    let workflow_dag = dag::build(&project)?;

    let rendered = match format {
        GraphFormat::Ascii => render_ascii(&workflow_dag),
        GraphFormat::Mermaid => render_mermaid(&project, &workflow_dag, direction),
    };

    if open {
        let tmp_path = std::env::temp_dir().join("trident-graph.txt");
        std::fs::write(&tmp_path, &rendered)?;
        if which::which("open").is_err() && which::which("xdg-open").is_err() {
            bail!("--open requires 'open' or 'xdg-open' on PATH; wrote graph to {}", tmp_path.display());
        }
        let opener = if which::which("open").is_ok() { "open" } else { "xdg-open" };
        std::process::Command::new(opener).arg(&tmp_path).status()?;
    }

    println!("{rendered}");
    Ok(0)
}

fn render_ascii(workflow_dag: &dag::WorkflowDag) -> String {
    let mut out = String::new();
    for (level_idx, level) in workflow_dag.levels.iter().enumerate() {
        out.push_str(&format!("Level {level_idx}: {}\n", level.join(", ")));
        for node_id in level {
            if let Some(node) = workflow_dag.node(node_id) {
                for edge in &node.out_edges {
                    out.push_str(&format!("  {} --> {}\n", edge.from_node, edge.to_node));
                }
            }
        }
    }
    out
}

fn render_mermaid(project: &trident_core::model::Project, workflow_dag: &dag::WorkflowDag, direction: Direction) -> String {
    let dir = match direction {
        Direction::TD => "TD",
        Direction::LR => "LR",
        Direction::BT => "BT",
        Direction::RL => "RL",
    };
    let mut out = format!("graph {dir}\n");
    for id in workflow_dag.nodes.keys() {
        out.push_str(&format!("  {id}[\"{id}\"]\n"));
    }
    for edge in project.edges.values() {
        if let Some(condition) = &edge.condition {
            out.push_str(&format!("  {} -->|{}| {}\n", edge.from_node, condition.0, edge.to_node));
        } else {
            out.push_str(&format!("  {} --> {}\n", edge.from_node, edge.to_node));
        }
    }
    out
}
