mod graph;
mod init;
mod runs;
mod run;
mod schedule;
mod signals;
mod validate;

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use uuid::Uuid;

#[derive(Parser)]
#[command(name = "trident", version, about = "Trident workflow orchestration runtime")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Nest every `project` operation under one subcommand, per the manifest-rooted CLI surface.
    #[command(subcommand)]
    Project(ProjectCommand),
}

#[derive(Subcommand)]
enum ProjectCommand {
    /// Scaffold a new project.
    Init {
        #[arg(default_value = ".")]
        path: PathBuf,
        #[arg(long, value_enum, default_value = "minimal")]
        template: init::Template,
    },
    /// Validate a project's manifest, DAG, and edge mappings.
    Validate {
        #[arg(default_value = ".")]
        path: PathBuf,
        #[arg(long)]
        strict: bool,
    },
    /// Render a project's DAG.
    Graph {
        #[arg(default_value = ".")]
        path: PathBuf,
        #[arg(long, value_enum, default_value = "ascii")]
        format: graph::GraphFormat,
        #[arg(long, value_enum, default_value = "td")]
        direction: graph::Direction,
        #[arg(long)]
        open: bool,
    },
    /// Run a project's workflow to completion.
    Run {
        #[arg(default_value = ".")]
        path: PathBuf,
        #[arg(long)]
        input: Option<String>,
        #[arg(long)]
        input_file: Option<PathBuf>,
        #[arg(long)]
        input_from: Option<String>,
        #[arg(long)]
        entrypoint: Option<String>,
        #[arg(long, value_enum, default_value = "text")]
        output: run::OutputMode,
        #[arg(long)]
        trace: bool,
        #[arg(long)]
        dry_run: bool,
        #[arg(long)]
        verbose: bool,
        #[arg(long)]
        no_artifacts: bool,
        #[arg(long)]
        artifact_dir: Option<PathBuf>,
        #[arg(long)]
        run_id: Option<Uuid>,
        #[arg(long)]
        resume: Option<String>,
        #[arg(long)]
        start_from: Option<String>,
        #[arg(long)]
        emit_signal: bool,
        #[arg(long)]
        publish_to: Option<PathBuf>,
        #[arg(long)]
        wait_for: Vec<String>,
        #[arg(long)]
        timeout: Option<u64>,
    },
    /// List recorded runs.
    Runs {
        #[arg(default_value = ".")]
        path: PathBuf,
        #[arg(long)]
        limit: Option<usize>,
    },
    /// Emit a periodic-run definition for a project.
    Schedule {
        #[arg(default_value = ".")]
        path: PathBuf,
        #[arg(long, value_enum, default_value = "cron")]
        format: schedule::ScheduleFormat,
        #[arg(long)]
        show: bool,
    },
    /// List or clear signal files.
    Signals {
        #[arg(default_value = ".")]
        path: PathBuf,
        #[arg(long)]
        clear: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    trident_core::init_tracing();

    let cli = Cli::parse();

    let exit_code = match cli.command {
        Command::Project(ProjectCommand::Init { path, template }) => init::run(&path, template)?,
        Command::Project(ProjectCommand::Validate { path, strict }) => validate::run(&path, strict)?,
        Command::Project(ProjectCommand::Graph { path, format, direction, open }) => {
            graph::run(&path, format, direction, open)?
        }
        Command::Project(ProjectCommand::Run {
            path,
            input,
            input_file,
            input_from,
            entrypoint,
            output,
            trace,
            dry_run,
            verbose,
            no_artifacts,
            artifact_dir,
            run_id,
            resume,
            start_from,
            emit_signal,
            publish_to,
            wait_for,
            timeout,
        }) => {
            if verbose {
                tracing::info!(?path, "running project");
            }
            run::run(run::RunArgs {
                path,
                input,
                input_file,
                input_from,
                entrypoint,
                output,
                trace,
                dry_run,
                no_artifacts,
                artifact_dir,
                run_id,
                resume,
                start_from,
                emit_signal,
                publish_to,
                wait_for,
                timeout,
            })
            .await?
        }
        Command::Project(ProjectCommand::Runs { path, limit }) => runs::run(&path, limit)?,
        Command::Project(ProjectCommand::Schedule { path, format, show }) => schedule::run(&path, format, show)?,
        Command::Project(ProjectCommand::Signals { path, clear }) => signals::run(&path, clear)?,
    };

    std::process::exit(exit_code);
}
