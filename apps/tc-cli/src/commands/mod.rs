pub mod ledger;
pub mod mesh;
pub mod trust;

use std::sync::Arc;

use anyhow::Context;
use clap::ValueEnum;
use tc_ledger::{Ledger, LedgerError};
use tc_trust::{EnginePaths, Impact, MeshTrust, Outcome, TrustConfig, TrustStore};

/// Config and ledger shared by every command that touches trust rows.
pub struct Engine {
    pub config: Arc<TrustConfig>,
    pub ledger: Arc<Ledger>,
    paths: EnginePaths,
}

impl Engine {
    pub fn open(paths: &EnginePaths) -> anyhow::Result<Self> {
        let config = TrustConfig::load_if_present(&paths.config_file)
            .with_context(|| format!("loading {}", paths.config_file.display()))?;
        let ledger = open_ledger(paths)?;
        Ok(Self {
            config: Arc::new(config),
            ledger: Arc::new(ledger),
            paths: paths.clone(),
        })
    }

    pub fn store(&self) -> anyhow::Result<TrustStore> {
        Ok(TrustStore::open(
            &self.paths.scores_dir,
            Arc::clone(&self.config),
            self.ledger.clone(),
        )?)
    }

    pub fn mesh(&self) -> anyhow::Result<MeshTrust> {
        Ok(MeshTrust::open(
            &self.paths.mesh_dir,
            Arc::clone(&self.config),
            self.ledger.clone(),
        )?)
    }
}

/// Open the ledger, explaining the lock when tc-daemon already owns it.
pub fn open_ledger(paths: &EnginePaths) -> anyhow::Result<Ledger> {
    match Ledger::open(&paths.ledger) {
        Ok(ledger) => Ok(ledger),
        Err(e @ LedgerError::Locked { .. }) => Err(anyhow::anyhow!(
            "{e}; stop tc-daemon to change trust from the CLI, or read it over the daemon's HTTP API"
        )),
        Err(e) => {
            Err(anyhow::Error::new(e).context(format!("opening ledger {}", paths.ledger.display())))
        }
    }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum OutcomeArg {
    Success,
    Partial,
    Failure,
}

impl From<OutcomeArg> for Outcome {
    fn from(arg: OutcomeArg) -> Self {
        match arg {
            OutcomeArg::Success => Outcome::Success,
            OutcomeArg::Partial => Outcome::Partial,
            OutcomeArg::Failure => Outcome::Failure,
        }
    }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum ImpactArg {
    Low,
    Medium,
    High,
}

impl From<ImpactArg> for Impact {
    fn from(arg: ImpactArg) -> Self {
        match arg {
            ImpactArg::Low => Impact::Low,
            ImpactArg::Medium => Impact::Medium,
            ImpactArg::High => Impact::High,
        }
    }
}
