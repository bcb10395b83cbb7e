// store.rs — TrustStore: per-domain trust for a single agent.
//
// Thin layer over `ScoreBook<Domain>` that adds identifier validation, the
// neutral default for unseen domains, and the read-side queries (overall
// score, autonomy, recovery, calibration).

use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tc_ledger::LedgerRecorder;

use crate::autonomy::{AutonomyDecision, AutonomyPolicy};
use crate::book::{DecaySummary, ScoreBook, TrustKey, TrustRecord};
use crate::calibration::{Calibration, CalibrationTracker};
use crate::config::TrustConfig;
use crate::decay::Decayable;
use crate::error::TrustError;
use crate::recovery::{RecoveryPath, RecoveryPlanner};
use crate::types::{validate_identifier, ActionMode, DomainTrust, Event, EventRecord, TrustScore};

/// A validated domain name such as `email.send`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Domain(String);

impl Domain {
    pub fn parse(value: impl Into<String>) -> Result<Self, TrustError> {
        let value = value.into();
        validate_identifier("domain", &value)?;
        Ok(Self(value))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for Domain {
    type Error = TrustError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Domain::parse(value)
    }
}

impl From<Domain> for String {
    fn from(domain: Domain) -> Self {
        domain.0
    }
}

impl fmt::Display for Domain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TrustKey for Domain {
    const ENTITY_TYPE: &'static str = "trust_domain";
    const ACTION_PREFIX: &'static str = "trust";

    fn domain(&self) -> &str {
        &self.0
    }
}

/// Trust in each domain the agent acts in.
pub struct TrustStore {
    book: ScoreBook<Domain>,
    policy: AutonomyPolicy,
}

impl TrustStore {
    /// Open (or create) the store under `dir`, replaying any ledger changes
    /// the row files missed.
    pub fn open(
        dir: impl AsRef<Path>,
        config: Arc<TrustConfig>,
        ledger: Arc<dyn LedgerRecorder>,
    ) -> Result<Self, TrustError> {
        let neutral = config.scoring.neutral_value;
        let policy = AutonomyPolicy::new(config.autonomy.clone());
        let book = ScoreBook::open(dir, config, ledger, neutral)?;
        Ok(Self { book, policy })
    }

    pub fn config(&self) -> &TrustConfig {
        self.book.config()
    }

    pub fn record_event(&self, event: &Event) -> Result<TrustScore, TrustError> {
        self.record_event_at(event, Utc::now())
    }

    /// Apply an event as of `now`. Nothing changes if validation or the
    /// ledger append fails.
    pub fn record_event_at(
        &self,
        event: &Event,
        now: DateTime<Utc>,
    ) -> Result<TrustScore, TrustError> {
        let domain = Domain::parse(event.domain.as_str())?;
        self.book.record(&domain, event, now)
    }

    pub fn apply_decay(&self, domain: &str) -> Result<Option<TrustScore>, TrustError> {
        self.apply_decay_at(domain, Utc::now())
    }

    pub fn apply_decay_at(
        &self,
        domain: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<TrustScore>, TrustError> {
        self.book.decay(&Domain::parse(domain)?, now)
    }

    /// The domain's score, or the neutral row if it has never been seen.
    pub fn get_score(&self, domain: &str) -> Result<DomainTrust, TrustError> {
        let domain = Domain::parse(domain)?;
        Ok(match self.book.get(&domain)? {
            Some(record) => DomainTrust::Observed {
                score: record.score,
            },
            None => DomainTrust::Unobserved {
                score: self.book.initial_score(&domain, Utc::now()),
            },
        })
    }

    pub fn get_all_scores(&self) -> Result<BTreeMap<String, TrustScore>, TrustError> {
        Ok(self
            .book
            .records()?
            .into_iter()
            .map(|r| (r.key.0, r.score))
            .collect())
    }

    /// Mean of active domains weighted by how often each was exercised.
    /// Neutral when there are none.
    pub fn overall_score(&self) -> Result<f64, TrustError> {
        let (weighted, count) = self
            .book
            .records()?
            .iter()
            .filter(|r| !r.is_archived())
            .fold((0.0, 0u64), |(sum, n), r| {
                (
                    sum + r.score.value * r.score.action_count as f64,
                    n + r.score.action_count,
                )
            });
        if count == 0 {
            Ok(self.config().scoring.neutral_value)
        } else {
            Ok(weighted / count as f64)
        }
    }

    pub fn autonomy_level(&self, domain: &str, confidence: f64) -> Result<ActionMode, TrustError> {
        Ok(self.decide(domain, confidence)?.mode)
    }

    pub fn decide(&self, domain: &str, confidence: f64) -> Result<AutonomyDecision, TrustError> {
        let trust = self.get_score(domain)?;
        self.policy.decide(trust.score(), confidence)
    }

    pub fn recovery_path(&self, domain: &str) -> Result<Option<RecoveryPath>, TrustError> {
        self.recovery_path_at(domain, Utc::now())
    }

    pub fn recovery_path_at(
        &self,
        domain: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<RecoveryPath>, TrustError> {
        let domain = Domain::parse(domain)?;
        let Some(record) = self.book.get(&domain)? else {
            // Unseen domains start neutral, never Restricted.
            return Ok(None);
        };
        let history: Vec<EventRecord> = record.history.into_iter().collect();
        Ok(RecoveryPlanner::new(self.config()).plan(&record.score, &history, now))
    }

    pub fn calibration(&self, domain: &str) -> Result<Calibration, TrustError> {
        let history = self.history(domain)?;
        Ok(CalibrationTracker.calibrate(domain, &history))
    }

    /// Recent applied events for a domain, oldest first.
    pub fn history(&self, domain: &str) -> Result<Vec<EventRecord>, TrustError> {
        let domain = Domain::parse(domain)?;
        Ok(self
            .book
            .get(&domain)?
            .map(|r| r.history.into_iter().collect())
            .unwrap_or_default())
    }

    /// Take a domain out of decay and the overall score until its next event.
    pub fn archive(&self, domain: &str, actor: &str) -> Result<bool, TrustError> {
        self.book.archive(&Domain::parse(domain)?, actor, Utc::now())
    }

    pub fn records(&self) -> Result<Vec<TrustRecord<Domain>>, TrustError> {
        self.book.records()
    }
}

impl Decayable for TrustStore {
    fn name(&self) -> &'static str {
        "domains"
    }

    fn decay_all_at(&self, now: DateTime<Utc>) -> DecaySummary {
        self.book.decay_all(now)
    }
}
