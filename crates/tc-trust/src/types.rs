// types.rs — Trust data model.
//
// `TrustScore` is the row the engine keeps per domain (and per mesh peer
// triple). Its `state` is always derived from `value` through the
// configured thresholds; nothing outside the engine can set it.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::TrustError;

/// Longest accepted domain or agent identifier.
pub const MAX_IDENTIFIER_LEN: usize = 128;

/// Discrete trust tier, lowest first.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "snake_case")]
pub enum TrustState {
    /// [0, 30): nothing runs without the user.
    Restricted,
    /// [30, 50): recovering; still suggest-only.
    Probation,
    /// [50, 75): the neutral starting tier.
    Learning,
    /// [75, 90)
    Trusted,
    /// [90, 100]
    Verified,
}

impl TrustState {
    pub const ALL: [TrustState; 5] = [
        TrustState::Restricted,
        TrustState::Probation,
        TrustState::Learning,
        TrustState::Trusted,
        TrustState::Verified,
    ];

    /// The tier directly below this one (Restricted has none and stays put).
    pub fn lower(self) -> TrustState {
        match self {
            TrustState::Restricted | TrustState::Probation => TrustState::Restricted,
            TrustState::Learning => TrustState::Probation,
            TrustState::Trusted => TrustState::Learning,
            TrustState::Verified => TrustState::Trusted,
        }
    }
}

impl fmt::Display for TrustState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TrustState::Restricted => write!(f, "restricted"),
            TrustState::Probation => write!(f, "probation"),
            TrustState::Learning => write!(f, "learning"),
            TrustState::Trusted => write!(f, "trusted"),
            TrustState::Verified => write!(f, "verified"),
        }
    }
}

/// How much supervision an action needs. Computed per call, never stored.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ActionMode {
    /// Propose only; the user performs the action.
    Suggest,
    /// Act after explicit user approval.
    Supervised,
    /// Act, with an undo window.
    Autonomous,
    /// Act with no undo window.
    FullAuto,
}

impl fmt::Display for ActionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ActionMode::Suggest => write!(f, "suggest"),
            ActionMode::Supervised => write!(f, "supervised"),
            ActionMode::Autonomous => write!(f, "autonomous"),
            ActionMode::FullAuto => write!(f, "full_auto"),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Success,
    Partial,
    Failure,
}

impl Outcome {
    /// The outcome as an observed success probability, for calibration.
    pub fn as_actual(self) -> f64 {
        match self {
            Outcome::Success => 1.0,
            Outcome::Partial => 0.5,
            Outcome::Failure => 0.0,
        }
    }

    /// Key under which this outcome's deltas accumulate in `factors`.
    pub fn contributor(self) -> &'static str {
        match self {
            Outcome::Success => "success",
            Outcome::Partial => "partial",
            Outcome::Failure => "failure",
        }
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.contributor())
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Impact {
    Low,
    Medium,
    High,
}

impl fmt::Display for Impact {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Impact::Low => write!(f, "low"),
            Impact::Medium => write!(f, "medium"),
            Impact::High => write!(f, "high"),
        }
    }
}

/// One observed outcome: the unit of scoring input.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Event {
    pub domain: String,
    pub outcome: Outcome,
    pub impact: Impact,
    /// The agent's own confidence before acting, if it reported one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub predicted_confidence: Option<f64>,
    /// Who performed the action; recorded as the ledger actor.
    #[serde(default = "default_actor")]
    pub actor: String,
    pub timestamp: DateTime<Utc>,
}

fn default_actor() -> String {
    "agent".to_string()
}

impl Event {
    pub fn new(domain: impl Into<String>, outcome: Outcome, impact: Impact) -> Self {
        Self {
            domain: domain.into(),
            outcome,
            impact,
            predicted_confidence: None,
            actor: default_actor(),
            timestamp: Utc::now(),
        }
    }

    pub fn success(domain: impl Into<String>, impact: Impact) -> Self {
        Self::new(domain, Outcome::Success, impact)
    }

    pub fn failure(domain: impl Into<String>, impact: Impact) -> Self {
        Self::new(domain, Outcome::Failure, impact)
    }

    pub fn with_confidence(mut self, confidence: f64) -> Self {
        self.predicted_confidence = Some(confidence);
        self
    }

    pub fn with_actor(mut self, actor: impl Into<String>) -> Self {
        self.actor = actor.into();
        self
    }

    pub fn at(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }
}

/// Current trust in one domain.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TrustScore {
    pub domain: String,
    /// Always within [0, 100].
    pub value: f64,
    /// Derived from `value`.
    pub state: TrustState,
    /// Cumulative signed contribution per source (`success`, `failure`, `decay`, ...).
    #[serde(default)]
    pub factors: BTreeMap<String, f64>,
    /// Events applied so far. Never decreases.
    pub action_count: u64,
    pub last_activity: DateTime<Utc>,
    /// When the current state was entered.
    pub state_entered: DateTime<Utc>,
    pub last_updated: DateTime<Utc>,
}

impl TrustScore {
    /// A row that has seen no events yet.
    pub fn initial(
        domain: impl Into<String>,
        value: f64,
        state: TrustState,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            domain: domain.into(),
            value,
            state,
            factors: BTreeMap::new(),
            action_count: 0,
            last_activity: now,
            state_entered: now,
            last_updated: now,
        }
    }
}

/// Result of looking up a domain.
///
/// Keeps "never interacted" apart from "interacted and currently neutral".
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum DomainTrust {
    Observed { score: TrustScore },
    /// No events yet; `score` is the neutral starting row.
    Unobserved { score: TrustScore },
}

impl DomainTrust {
    pub fn score(&self) -> &TrustScore {
        match self {
            DomainTrust::Observed { score } | DomainTrust::Unobserved { score } => score,
        }
    }

    pub fn into_score(self) -> TrustScore {
        match self {
            DomainTrust::Observed { score } | DomainTrust::Unobserved { score } => score,
        }
    }

    pub fn is_observed(&self) -> bool {
        matches!(self, DomainTrust::Observed { .. })
    }
}

/// An applied event as kept in a row's history.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EventRecord {
    pub outcome: Outcome,
    pub impact: Impact,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub predicted_confidence: Option<f64>,
    /// Signed change actually applied (after clamping).
    pub delta: f64,
    pub value_after: f64,
    pub timestamp: DateTime<Utc>,
}

/// Reject identifiers that are empty, oversized, or could be confused with
/// path or key separators.
pub fn validate_identifier(kind: &'static str, value: &str) -> Result<(), TrustError> {
    let reject = |reason: &str| TrustError::InvalidIdentifier {
        kind,
        value: value.to_string(),
        reason: reason.to_string(),
    };

    if value.is_empty() {
        return Err(reject("must not be empty"));
    }
    if value.len() > MAX_IDENTIFIER_LEN {
        return Err(reject("is longer than 128 characters"));
    }
    if !value
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-' | ':'))
    {
        return Err(reject(
            "may only contain ASCII letters, digits, '.', '_', '-' and ':'",
        ));
    }
    if value.contains("..") {
        return Err(reject("must not contain '..'"));
    }
    let is_separator = |c: char| matches!(c, '.' | '_' | '-' | ':');
    if value.starts_with(is_separator) || value.ends_with(is_separator) {
        return Err(reject("must start and end with a letter or digit"));
    }
    Ok(())
}

/// Reject non-finite or out-of-range confidence values.
pub fn validate_confidence(confidence: f64) -> Result<(), TrustError> {
    if confidence.is_finite() && (0.0..=1.0).contains(&confidence) {
        Ok(())
    } else {
        Err(TrustError::InvalidConfidence(confidence))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_typical_domains() {
        let domains = ["email.send", "calendar.write", "finance.transfer", "mesh:agent-7", "a"];
        for domain in domains {
            validate_identifier("domain", domain).unwrap();
        }
    }

    #[test]
    fn rejects_bad_domains() {
        let too_long = "a".repeat(MAX_IDENTIFIER_LEN + 1);
        let domains = [
            "",
            "../etc",
            "email/send",
            ".hidden",
            "send.",
            "a..b",
            "sp ace",
            too_long.as_str(),
        ];
        for domain in domains {
            assert!(
                matches!(
                    validate_identifier("domain", domain),
                    Err(TrustError::InvalidIdentifier { .. })
                ),
                "{domain:?} should be rejected"
            );
        }
    }

    #[test]
    fn confidence_range() {
        validate_confidence(0.0).unwrap();
        validate_confidence(1.0).unwrap();
        validate_confidence(0.85).unwrap();
        assert!(validate_confidence(-0.01).is_err());
        assert!(validate_confidence(1.01).is_err());
        assert!(validate_confidence(f64::NAN).is_err());
        assert!(validate_confidence(f64::INFINITY).is_err());
    }

    #[test]
    fn states_are_ordered_lowest_first() {
        assert!(TrustState::Restricted < TrustState::Probation);
        assert!(TrustState::Trusted < TrustState::Verified);
        assert_eq!(TrustState::Verified.lower(), TrustState::Trusted);
        assert_eq!(TrustState::Restricted.lower(), TrustState::Restricted);
    }

    #[test]
    fn domain_trust_tags_status() {
        let score = TrustScore::initial("email.send", 50.0, TrustState::Learning, Utc::now());
        let json = serde_json::to_value(DomainTrust::Unobserved { score }).unwrap();
        assert_eq!(json["status"], "unobserved");
        assert_eq!(json["score"]["state"], "learning");
    }

    #[test]
    fn action_mode_serializes_snake_case() {
        assert_eq!(serde_json::to_string(&ActionMode::FullAuto).unwrap(), "\"full_auto\"");
        assert_eq!(ActionMode::FullAuto.to_string(), "full_auto");
    }

    #[test]
    fn event_defaults_actor() {
        let event: Event = serde_json::from_str(
            r#"{"domain":"email.send","outcome":"success","impact":"low","timestamp":"2026-01-01T00:00:00Z"}"#,
        )
        .unwrap();
        assert_eq!(event.actor, "agent");
        assert!(event.predicted_confidence.is_none());
    }
}
