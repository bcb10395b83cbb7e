//! # tc-trust
//!
//! Trust scoring and autonomy policy for Trust Capital.
//!
//! An assistant agent earns trust per *domain* (`email.send`,
//! `finance.transfer`, ...) from the outcomes of its actions. Failures cost
//! more than successes earn, idle trust drifts back toward neutral, and the
//! current trust state together with the agent's stated confidence decides
//! how much supervision the next action needs.
//!
//! - [`TrustStore`] keeps one score per domain and audits every change to a
//!   [`tc_ledger::LedgerRecorder`].
//! - [`AutonomyPolicy`] maps (state, confidence) to an [`ActionMode`].
//! - [`RecoveryPlanner`] explains how a Restricted domain climbs back.
//! - [`CalibrationTracker`] scores stated confidence against outcomes.
//! - [`MeshTrust`] applies the same model to peer agents.
//! - [`DecayScheduler`] runs the periodic decay tick.
//!
//! ## Quick Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use tc_ledger::Ledger;
//! use tc_trust::{ActionMode, EnginePaths, Event, Impact, TrustConfig, TrustStore};
//!
//! let paths = EnginePaths::for_project(".");
//! let ledger = Arc::new(Ledger::open(&paths.ledger).unwrap());
//! let config = Arc::new(TrustConfig::load_if_present(&paths.config_file).unwrap());
//! let store = TrustStore::open(&paths.scores_dir, config, ledger).unwrap();
//!
//! store.record_event(&Event::success("email.send", Impact::Medium)).unwrap();
//! let mode = store.autonomy_level("email.send", 0.7).unwrap();
//! assert_eq!(mode, ActionMode::Supervised);
//! ```

pub mod autonomy;
pub mod book;
pub mod calibration;
pub mod config;
pub mod decay;
pub mod error;
pub mod mesh;
pub mod recovery;
pub mod scoring;
pub mod store;
pub mod types;

pub use autonomy::{AutonomyDecision, AutonomyPolicy, ConfidenceBand};
pub use book::{DecaySummary, ScoreBook, TrustKey, TrustRecord};
pub use calibration::{Calibration, CalibrationTracker, Interpretation};
pub use config::{
    AutonomyThresholds, DecayConfig, EnginePaths, RecoveryConfig, ScoringConfig, StateThresholds,
    StorageConfig, TrustConfig,
};
pub use decay::{DecayScheduler, Decayable};
pub use error::{ConfigError, TrustError};
pub use mesh::{AgentTrust, MeshKey, MeshTrust};
pub use recovery::{RecoveryPath, RecoveryPlanner, RecoveryStep, RecoveryStepKind};
pub use store::{Domain, TrustStore};
pub use types::{
    ActionMode, DomainTrust, Event, EventRecord, Impact, Outcome, TrustScore, TrustState,
};
