// config.rs — Policy parameters and on-disk layout.
//
// Every scoring constant is a policy knob: weights, thresholds, decay rate,
// autonomy bands and recovery defaults all live in `TrustConfig`, loaded
// from `.tc/trust.toml`. Missing sections and fields fall back to the
// documented defaults.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::types::TrustState;

/// Top-level engine configuration from `.tc/trust.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct TrustConfig {
    #[serde(default)]
    pub scoring: ScoringConfig,
    #[serde(default)]
    pub thresholds: StateThresholds,
    #[serde(default)]
    pub autonomy: AutonomyThresholds,
    #[serde(default)]
    pub decay: DecayConfig,
    #[serde(default)]
    pub recovery: RecoveryConfig,
    #[serde(default)]
    pub storage: StorageConfig,
}

/// Event weights and impact multipliers.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ScoringConfig {
    pub success_weight: f64,
    pub partial_weight: f64,
    /// Negative; its magnitude should exceed `success_weight`.
    pub failure_weight: f64,
    pub low_impact: f64,
    pub medium_impact: f64,
    pub high_impact: f64,
    /// Starting value for a domain and the point domain decay pulls toward.
    pub neutral_value: f64,
    /// Starting value for a mesh peer, and where idle peer trust decays to.
    /// Unknown peers are not neutral.
    pub mesh_initial_value: f64,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            success_weight: 2.0,
            partial_weight: 0.5,
            failure_weight: -5.0,
            low_impact: 0.5,
            medium_impact: 1.0,
            high_impact: 2.0,
            neutral_value: 50.0,
            mesh_initial_value: 0.0,
        }
    }
}

/// Lower bounds of each state above Restricted.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct StateThresholds {
    pub probation: f64,
    pub learning: f64,
    pub trusted: f64,
    pub verified: f64,
}

impl Default for StateThresholds {
    fn default() -> Self {
        Self {
            probation: 30.0,
            learning: 50.0,
            trusted: 75.0,
            verified: 90.0,
        }
    }
}

impl StateThresholds {
    /// The state a value falls into. This is the only way a state is derived.
    pub fn state_for(&self, value: f64) -> TrustState {
        if value >= self.verified {
            TrustState::Verified
        } else if value >= self.trusted {
            TrustState::Trusted
        } else if value >= self.learning {
            TrustState::Learning
        } else if value >= self.probation {
            TrustState::Probation
        } else {
            TrustState::Restricted
        }
    }

    /// Smallest value inside `state`.
    pub fn lower_bound(&self, state: TrustState) -> f64 {
        match state {
            TrustState::Restricted => 0.0,
            TrustState::Probation => self.probation,
            TrustState::Learning => self.learning,
            TrustState::Trusted => self.trusted,
            TrustState::Verified => self.verified,
        }
    }
}

/// Confidence bands for the autonomy table.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AutonomyThresholds {
    pub supervised: f64,
    pub autonomous: f64,
    pub full_auto: f64,
}

impl Default for AutonomyThresholds {
    fn default() -> Self {
        Self {
            supervised: 0.6,
            autonomous: 0.75,
            full_auto: 0.85,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DecayConfig {
    /// Inactivity required before decay starts, and the unit decay is counted in.
    pub period_days: u32,
    /// Fraction of the distance to neutral removed per period.
    pub rate: f64,
    /// Largest movement a single tick may apply, in points.
    pub max_step: f64,
    /// How often the daemon runs the decay tick.
    pub tick_interval_secs: u64,
}

impl Default for DecayConfig {
    fn default() -> Self {
        Self {
            period_days: 7,
            rate: 0.01,
            max_step: 5.0,
            tick_interval_secs: 86_400,
        }
    }
}

impl DecayConfig {
    pub fn period(&self) -> chrono::Duration {
        chrono::Duration::days(i64::from(self.period_days))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RecoveryConfig {
    pub failure_free_days: u32,
    pub user_confirmations: u32,
    /// How far back successful events count toward the daily gain estimate.
    pub gain_window_days: u32,
    /// Points per day assumed when there is no recent success to learn from.
    pub fallback_daily_gain: f64,
}

impl Default for RecoveryConfig {
    fn default() -> Self {
        Self {
            failure_free_days: 7,
            user_confirmations: 3,
            gain_window_days: 30,
            fallback_daily_gain: 1.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct StorageConfig {
    /// Event records kept per key for calibration and recovery estimates.
    pub history_limit: usize,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self { history_limit: 500 }
    }
}

impl TrustConfig {
    /// Load and validate a config file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config: TrustConfig = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load the file if it exists, otherwise use defaults.
    ///
    /// A file that exists but is invalid is an error, never a silent fallback.
    pub fn load_if_present(path: &Path) -> Result<Self, ConfigError> {
        if path.exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let s = &self.scoring;
        if !is_positive(s.success_weight) {
            return Err(invalid("scoring.success_weight", "must be positive"));
        }
        if s.partial_weight.is_nan() || s.partial_weight < 0.0 {
            return Err(invalid("scoring.partial_weight", "must not be negative"));
        }
        if !is_positive(-s.failure_weight) {
            return Err(invalid("scoring.failure_weight", "must be negative"));
        }
        for (field, scale) in [
            ("scoring.low_impact", s.low_impact),
            ("scoring.medium_impact", s.medium_impact),
            ("scoring.high_impact", s.high_impact),
        ] {
            if !is_positive(scale) {
                return Err(invalid(field, "must be positive"));
            }
        }
        if !(s.low_impact <= s.medium_impact && s.medium_impact <= s.high_impact) {
            return Err(invalid("scoring", "impact scales must be ascending"));
        }
        for (field, value) in [
            ("scoring.neutral_value", s.neutral_value),
            ("scoring.mesh_initial_value", s.mesh_initial_value),
        ] {
            if !(0.0..=100.0).contains(&value) {
                return Err(invalid(field, "must be within [0, 100]"));
            }
        }

        let t = &self.thresholds;
        if !(0.0 < t.probation
            && t.probation < t.learning
            && t.learning < t.trusted
            && t.trusted < t.verified
            && t.verified <= 100.0)
        {
            return Err(invalid(
                "thresholds",
                "must satisfy 0 < probation < learning < trusted < verified <= 100",
            ));
        }

        let a = &self.autonomy;
        if !(0.0 <= a.supervised
            && a.supervised <= a.autonomous
            && a.autonomous <= a.full_auto
            && a.full_auto <= 1.0)
        {
            return Err(invalid(
                "autonomy",
                "must satisfy 0 <= supervised <= autonomous <= full_auto <= 1",
            ));
        }

        let d = &self.decay;
        if d.period_days == 0 {
            return Err(invalid("decay.period_days", "must be at least 1"));
        }
        if !(0.0..1.0).contains(&d.rate) {
            return Err(invalid("decay.rate", "must be within [0, 1)"));
        }
        if !is_positive(d.max_step) {
            return Err(invalid("decay.max_step", "must be positive"));
        }
        if d.tick_interval_secs == 0 {
            return Err(invalid("decay.tick_interval_secs", "must be at least 1"));
        }

        let r = &self.recovery;
        if r.gain_window_days == 0 {
            return Err(invalid("recovery.gain_window_days", "must be at least 1"));
        }
        if !is_positive(r.fallback_daily_gain) {
            return Err(invalid("recovery.fallback_daily_gain", "must be positive"));
        }

        if self.storage.history_limit == 0 {
            return Err(invalid("storage.history_limit", "must be at least 1"));
        }
        Ok(())
    }
}

fn invalid(field: &'static str, reason: &str) -> ConfigError {
    ConfigError::Invalid {
        field,
        reason: reason.to_string(),
    }
}

/// False for NaN as well as for zero and negatives.
fn is_positive(value: f64) -> bool {
    value > 0.0
}

/// Where the engine keeps its state.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct EnginePaths {
    /// Root of all engine state (`<project>/.tc`).
    pub state_dir: PathBuf,
    /// One JSON row per domain.
    pub scores_dir: PathBuf,
    /// One JSON row per (local agent, remote agent, domain).
    pub mesh_dir: PathBuf,
    /// The hash-chained audit ledger.
    pub ledger: PathBuf,
    /// Optional policy overrides.
    pub config_file: PathBuf,
}

impl EnginePaths {
    /// Standard `.tc/` layout for a project.
    pub fn for_project(project_root: impl AsRef<Path>) -> Self {
        Self::for_state_dir(project_root.as_ref().join(".tc"))
    }

    pub fn for_state_dir(state_dir: impl Into<PathBuf>) -> Self {
        let state_dir = state_dir.into();
        Self {
            scores_dir: state_dir.join("scores"),
            mesh_dir: state_dir.join("mesh"),
            ledger: state_dir.join("ledger.jsonl"),
            config_file: state_dir.join("trust.toml"),
            state_dir,
        }
    }
}
