//! # tc-cli
//!
//! Command-line interface for Trust Capital.
//!
//! - `tc trust list/show/overall`: inspect per-domain trust
//! - `tc trust autonomy/recovery/calibration`: ask the policy questions
//! - `tc trust record/archive/decay`: operator writes, all audited
//! - `tc mesh list/agent/record`: peer agent trust
//! - `tc ledger verify/tail/entry/entity`: inspect the hash-chained ledger

mod commands;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tc_trust::EnginePaths;
use tracing_subscriber::EnvFilter;

/// Trust Capital CLI: inspect and operate agent trust.
#[derive(Parser)]
#[command(name = "tc", version, about)]
struct Cli {
    /// Project root directory (defaults to current directory).
    #[arg(long, default_value = ".")]
    project_root: PathBuf,

    /// State directory; overrides `<project-root>/.tc`.
    #[arg(long)]
    state_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Per-domain trust for this agent.
    Trust {
        #[command(subcommand)]
        command: commands::trust::TrustCommands,
    },
    /// Trust in peer agents.
    Mesh {
        #[command(subcommand)]
        command: commands::mesh::MeshCommands,
    },
    /// Inspect the audit ledger.
    Ledger {
        #[command(subcommand)]
        command: commands::ledger::LedgerCommands,
    },
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env()
                .add_directive("tc_trust=info".parse()?)
                .add_directive("tc_ledger=info".parse()?),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let paths = match cli.state_dir {
        Some(dir) => EnginePaths::for_state_dir(dir),
        None => {
            let root = cli.project_root.canonicalize().unwrap_or(cli.project_root);
            EnginePaths::for_project(root)
        }
    };

    match &cli.command {
        Commands::Trust { command } => commands::trust::execute(command, &paths),
        Commands::Mesh { command } => commands::mesh::execute(command, &paths),
        Commands::Ledger { command } => commands::ledger::execute(command, &paths),
    }
}
