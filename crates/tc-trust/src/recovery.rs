// recovery.rs — How a Restricted domain earns its way back.
//
// A path exists only while a domain is Restricted. It lists what has to
// happen before the agent is trusted to act in Learning again, with
// progress read from the row's event history, plus day estimates based on
// how fast the domain has been gaining recently.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::TrustConfig;
use crate::scoring;
use crate::types::{EventRecord, Impact, Outcome, TrustScore, TrustState};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RecoveryStepKind {
    ConsecutiveLowImpactSuccesses,
    FailureFreeDays,
    UserConfirmations,
    ReachLearning,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RecoveryStep {
    pub kind: RecoveryStepKind,
    pub description: String,
    pub required: u32,
    /// `None` when history cannot show progress (user confirmations happen
    /// outside the engine).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub progress: Option<u32>,
    pub completed: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RecoveryPath {
    pub domain: String,
    pub current_score: f64,
    pub current_state: TrustState,
    pub target_score: f64,
    pub steps: Vec<RecoveryStep>,
    /// Points per day used for the estimates.
    pub daily_gain: f64,
    pub estimated_days_to_learning: u32,
    pub estimated_days_to_trusted: u32,
}

/// Builds recovery paths from a score and its history.
#[derive(Debug, Clone)]
pub struct RecoveryPlanner<'a> {
    config: &'a TrustConfig,
}

impl<'a> RecoveryPlanner<'a> {
    pub fn new(config: &'a TrustConfig) -> Self {
        Self { config }
    }

    /// `None` unless the score is Restricted.
    pub fn plan(
        &self,
        score: &TrustScore,
        history: &[EventRecord],
        now: DateTime<Utc>,
    ) -> Option<RecoveryPath> {
        if score.state != TrustState::Restricted {
            return None;
        }

        let scoring_cfg = &self.config.scoring;
        let thresholds = &self.config.thresholds;
        let recovery = &self.config.recovery;
        let value = score.value;

        let low_gain = scoring::event_delta(Outcome::Success, Impact::Low, scoring_cfg);
        let medium_gain = scoring::event_delta(Outcome::Success, Impact::Medium, scoring_cfg);
        let successes_needed = events_needed(thresholds.probation - value, low_gain);
        let trailing = trailing_low_impact_successes(history);

        let clean_days = days_without_failure(history, score, now);
        let reach_needed = events_needed(thresholds.learning - value, medium_gain);

        let steps = vec![
            RecoveryStep {
                kind: RecoveryStepKind::ConsecutiveLowImpactSuccesses,
                description: format!(
                    "complete {successes_needed} low-impact actions in a row without a failure"
                ),
                required: successes_needed,
                progress: Some(trailing),
                completed: trailing >= successes_needed,
            },
            RecoveryStep {
                kind: RecoveryStepKind::FailureFreeDays,
                description: format!("go {} days without a failure", recovery.failure_free_days),
                required: recovery.failure_free_days,
                progress: Some(clean_days.min(recovery.failure_free_days)),
                completed: clean_days >= recovery.failure_free_days,
            },
            RecoveryStep {
                kind: RecoveryStepKind::UserConfirmations,
                description: format!(
                    "receive {} explicit confirmations from the user",
                    recovery.user_confirmations
                ),
                required: recovery.user_confirmations,
                progress: None,
                completed: false,
            },
            RecoveryStep {
                kind: RecoveryStepKind::ReachLearning,
                description: format!(
                    "reach {} ({reach_needed} medium-impact successes)",
                    thresholds.learning
                ),
                required: reach_needed,
                progress: None,
                completed: value >= thresholds.learning,
            },
        ];

        let daily_gain = self.daily_gain(history, now);
        Some(RecoveryPath {
            domain: score.domain.clone(),
            current_score: value,
            current_state: score.state,
            target_score: thresholds.learning,
            steps,
            daily_gain,
            estimated_days_to_learning: days_for(thresholds.learning - value, daily_gain),
            estimated_days_to_trusted: days_for(thresholds.trusted - value, daily_gain),
        })
    }

    /// Mean daily gain from successes inside the window, or the fallback.
    pub fn daily_gain(&self, history: &[EventRecord], now: DateTime<Utc>) -> f64 {
        let recovery = &self.config.recovery;
        let window_start = now - chrono::Duration::days(i64::from(recovery.gain_window_days));
        let gained: f64 = history
            .iter()
            .filter(|r| r.outcome == Outcome::Success && r.timestamp >= window_start)
            .map(|r| r.delta.max(0.0))
            .sum();
        if gained > 0.0 {
            gained / f64::from(recovery.gain_window_days)
        } else {
            recovery.fallback_daily_gain
        }
    }
}

fn events_needed(gap: f64, per_event: f64) -> u32 {
    if gap <= 0.0 || per_event <= 0.0 {
        return 0;
    }
    (gap / per_event).ceil() as u32
}

fn days_for(gap: f64, daily_gain: f64) -> u32 {
    if gap <= 0.0 {
        return 0;
    }
    (gap / daily_gain).ceil() as u32
}

fn trailing_low_impact_successes(history: &[EventRecord]) -> u32 {
    let count = history
        .iter()
        .rev()
        .take_while(|r| r.outcome == Outcome::Success && r.impact == Impact::Low)
        .count();
    u32::try_from(count).unwrap_or(u32::MAX)
}

// Measured from the last failure, or from the start of the record when the
// history holds none.
fn days_without_failure(history: &[EventRecord], score: &TrustScore, now: DateTime<Utc>) -> u32 {
    let since = history
        .iter()
        .rev()
        .find(|r| r.outcome == Outcome::Failure)
        .map(|r| r.timestamp)
        .or_else(|| history.first().map(|r| r.timestamp))
        .unwrap_or(score.last_activity);
    u32::try_from((now - since).num_days().max(0)).unwrap_or(u32::MAX)
}
