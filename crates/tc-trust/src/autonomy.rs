// autonomy.rs — Autonomy policy: (state, confidence) → action mode.
//
// The decision table:
//
//   state       c < 0.6   0.6 ≤ c < 0.75   0.75 ≤ c < 0.85   c ≥ 0.85
//   Restricted  Suggest   Suggest          Suggest           Suggest
//   Probation   Suggest   Suggest          Suggest           Suggest
//   Learning    Suggest   Supervised       Supervised        Supervised
//   Trusted     Suggest   Supervised       Autonomous        Autonomous
//   Verified    Suggest   Supervised       Autonomous        FullAuto
//
// Self-reported confidence never substitutes for earned trust: the two low
// tiers are suggest-only at any confidence, and FullAuto needs both
// Verified trust and the top confidence band.
//
// The policy holds no mutable state and is evaluated fresh on every call.

use serde::{Deserialize, Serialize};

use crate::config::AutonomyThresholds;
use crate::error::TrustError;
use crate::types::{validate_confidence, ActionMode, TrustScore, TrustState};

/// Which column of the decision table a confidence falls into.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum ConfidenceBand {
    Low,
    Moderate,
    High,
    VeryHigh,
}

/// A mode plus the inputs and reasoning that produced it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AutonomyDecision {
    pub domain: String,
    pub state: TrustState,
    pub value: f64,
    pub confidence: f64,
    pub band: ConfidenceBand,
    pub mode: ActionMode,
    pub reason: String,
}

/// Maps trust state and action confidence to a permitted mode.
#[derive(Debug, Clone, Default)]
pub struct AutonomyPolicy {
    thresholds: AutonomyThresholds,
}

impl AutonomyPolicy {
    pub fn new(thresholds: AutonomyThresholds) -> Self {
        Self { thresholds }
    }

    pub fn band(&self, confidence: f64) -> ConfidenceBand {
        if confidence >= self.thresholds.full_auto {
            ConfidenceBand::VeryHigh
        } else if confidence >= self.thresholds.autonomous {
            ConfidenceBand::High
        } else if confidence >= self.thresholds.supervised {
            ConfidenceBand::Moderate
        } else {
            ConfidenceBand::Low
        }
    }

    /// The permitted mode. Rejects confidence outside [0, 1].
    pub fn mode_for(&self, state: TrustState, confidence: f64) -> Result<ActionMode, TrustError> {
        validate_confidence(confidence)?;
        Ok(table(state, self.band(confidence)))
    }

    /// Same as `mode_for`, with the inputs and a reason attached.
    pub fn decide(&self, score: &TrustScore, confidence: f64) -> Result<AutonomyDecision, TrustError> {
        validate_confidence(confidence)?;
        let band = self.band(confidence);
        let mode = table(score.state, band);
        Ok(AutonomyDecision {
            domain: score.domain.clone(),
            state: score.state,
            value: score.value,
            confidence,
            band,
            mode,
            reason: reason(score.state, band, mode),
        })
    }
}

fn table(state: TrustState, band: ConfidenceBand) -> ActionMode {
    use ActionMode::*;
    use ConfidenceBand::*;

    match (state, band) {
        (TrustState::Restricted | TrustState::Probation, _) => Suggest,
        (_, Low) => Suggest,
        (TrustState::Learning, _) => Supervised,
        (TrustState::Trusted | TrustState::Verified, Moderate) => Supervised,
        (TrustState::Trusted, High | VeryHigh) => Autonomous,
        (TrustState::Verified, High) => Autonomous,
        (TrustState::Verified, VeryHigh) => FullAuto,
    }
}

fn reason(state: TrustState, band: ConfidenceBand, mode: ActionMode) -> String {
    match (state, band) {
        (TrustState::Restricted | TrustState::Probation, _) => {
            format!("{state} trust is suggest-only regardless of confidence")
        }
        (_, ConfidenceBand::Low) => "confidence below the supervised band".to_string(),
        (TrustState::Learning, _) => "learning trust caps autonomy at supervised".to_string(),
        _ => format!("{state} trust with {band:?} confidence permits {mode}"),
    }
}
