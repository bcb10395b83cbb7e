//! # tc-daemon
//!
//! Trust Capital daemon.
//!
//! Serves the read-only trust and ledger API over HTTP and runs the
//! periodic decay tick; it never mutates trust on request.
//!
//! While running, the daemon owns its state directory: the ledger lock
//! turns away any other engine, including `tc trust record`, until the
//! daemon exits. Record events from the CLI with the daemon stopped.
//!
//! ## Usage
//!
//! ```text
//! tc-daemon --project-root . --bind 127.0.0.1:7420
//! curl 'http://127.0.0.1:7420/trust/domain/email.send/autonomy?confidence=0.8'
//! ```

mod api;

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::EnvFilter;

use tc_ledger::{Ledger, LedgerRecorder};
use tc_trust::{DecayScheduler, EnginePaths, MeshTrust, TrustConfig, TrustStore};

use crate::api::AppState;

/// Trust Capital daemon.
#[derive(Parser)]
#[command(name = "tc-daemon", about = "Trust Capital HTTP API and decay tick")]
struct Cli {
    /// Project root directory (defaults to current directory).
    #[arg(long, default_value = ".")]
    project_root: PathBuf,

    /// State directory; overrides `<project-root>/.tc`.
    #[arg(long)]
    state_dir: Option<PathBuf>,

    /// Address to serve the API on.
    #[arg(long, default_value = "127.0.0.1:7420")]
    bind: SocketAddr,

    /// Do not run the periodic decay tick.
    #[arg(long)]
    no_decay: bool,

    /// Seconds allowed for one `GET /ledger/verify` walk.
    #[arg(long, default_value_t = 30)]
    verify_timeout_secs: u64,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env()
                .add_directive("tc_trust=info".parse()?)
                .add_directive("tc_ledger=info".parse()?)
                .add_directive("tc_daemon=info".parse()?),
        )
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .init();

    let cli = Cli::parse();
    let paths = match cli.state_dir {
        Some(dir) => EnginePaths::for_state_dir(dir),
        None => EnginePaths::for_project(
            cli.project_root
                .canonicalize()
                .context("project root does not exist")?,
        ),
    };
    tracing::info!("State directory: {}", paths.state_dir.display());

    let config = Arc::new(
        TrustConfig::load_if_present(&paths.config_file)
            .with_context(|| format!("loading {}", paths.config_file.display()))?,
    );
    let ledger: Arc<dyn LedgerRecorder> = Arc::new(
        Ledger::open(&paths.ledger)
            .with_context(|| format!("opening ledger {}", paths.ledger.display()))?,
    );
    let store = Arc::new(TrustStore::open(
        &paths.scores_dir,
        Arc::clone(&config),
        Arc::clone(&ledger),
    )?);
    let mesh = Arc::new(MeshTrust::open(
        &paths.mesh_dir,
        Arc::clone(&config),
        Arc::clone(&ledger),
    )?);

    if cli.no_decay {
        tracing::info!("Decay tick disabled");
    } else {
        let scheduler = Arc::new(
            DecayScheduler::new()
                .with_target(store.clone())
                .with_target(mesh.clone()),
        );
        let every = Duration::from_secs(config.decay.tick_interval_secs);
        tokio::spawn(run_decay(scheduler, every));
    }

    let state = Arc::new(AppState {
        store,
        mesh,
        ledger,
        verify_timeout: Duration::from_secs(cli.verify_timeout_secs),
    });
    let app = api::router(state);

    let listener = tokio::net::TcpListener::bind(cli.bind)
        .await
        .with_context(|| format!("binding {}", cli.bind))?;
    tracing::info!("Listening on {}", cli.bind);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Daemon shutting down");
    Ok(())
}

/// Drive the decay tick forever. Each tick runs on a blocking worker since
/// it touches every row file.
async fn run_decay(scheduler: Arc<DecayScheduler>, every: Duration) {
    let mut interval = tokio::time::interval(every);
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    loop {
        interval.tick().await;
        let scheduler = Arc::clone(&scheduler);
        match tokio::task::spawn_blocking(move || scheduler.run_once()).await {
            Ok(Ok(_)) => {}
            Ok(Err(e)) => tracing::warn!(error = %e, "decay tick skipped"),
            Err(e) => tracing::error!(error = %e, "decay tick panicked"),
        }
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
}
