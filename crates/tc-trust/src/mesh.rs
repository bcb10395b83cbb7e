// mesh.rs — MeshTrust: how much a local agent trusts a remote peer, per domain.
//
// Same scoring and audit path as domain trust, keyed by
// (local agent, remote agent, domain). Peers start at the configured mesh
// initial value (0 by default): an unknown peer has earned nothing.

use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tc_ledger::LedgerRecorder;

use crate::autonomy::AutonomyPolicy;
use crate::book::{DecaySummary, ScoreBook, TrustKey};
use crate::config::TrustConfig;
use crate::decay::Decayable;
use crate::error::TrustError;
use crate::types::{validate_confidence, validate_identifier, ActionMode, Event, TrustScore};

/// Identifies one mesh trust row.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct MeshKey {
    pub local_agent_id: String,
    pub remote_agent_id: String,
    pub domain: String,
}

impl MeshKey {
    pub fn new(
        local_agent_id: impl Into<String>,
        remote_agent_id: impl Into<String>,
        domain: impl Into<String>,
    ) -> Result<Self, TrustError> {
        let key = Self {
            local_agent_id: local_agent_id.into(),
            remote_agent_id: remote_agent_id.into(),
            domain: domain.into(),
        };
        validate_identifier("agent id", &key.local_agent_id)?;
        validate_identifier("agent id", &key.remote_agent_id)?;
        validate_identifier("domain", &key.domain)?;
        Ok(key)
    }
}

// '/' is not a legal identifier character, so this form is unambiguous.
impl fmt::Display for MeshKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{}/{}",
            self.local_agent_id, self.remote_agent_id, self.domain
        )
    }
}

impl TrustKey for MeshKey {
    const ENTITY_TYPE: &'static str = "agent_trust";
    const ACTION_PREFIX: &'static str = "mesh.trust";

    fn domain(&self) -> &str {
        &self.domain
    }
}

/// One peer's trust in one domain, as seen by a local agent.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AgentTrust {
    pub local_agent_id: String,
    pub remote_agent_id: String,
    #[serde(flatten)]
    pub score: TrustScore,
}

impl AgentTrust {
    fn from_parts(key: MeshKey, score: TrustScore) -> Self {
        Self {
            local_agent_id: key.local_agent_id,
            remote_agent_id: key.remote_agent_id,
            score,
        }
    }
}

/// Peer trust across the agent mesh.
pub struct MeshTrust {
    book: ScoreBook<MeshKey>,
    policy: AutonomyPolicy,
}

impl MeshTrust {
    pub fn open(
        dir: impl AsRef<Path>,
        config: Arc<TrustConfig>,
        ledger: Arc<dyn LedgerRecorder>,
    ) -> Result<Self, TrustError> {
        let initial = config.scoring.mesh_initial_value;
        let policy = AutonomyPolicy::new(config.autonomy.clone());
        let book = ScoreBook::open(dir, config, ledger, initial)?;
        Ok(Self { book, policy })
    }

    pub fn record_event(
        &self,
        local_agent_id: &str,
        remote_agent_id: &str,
        event: &Event,
    ) -> Result<AgentTrust, TrustError> {
        self.record_event_at(local_agent_id, remote_agent_id, event, Utc::now())
    }

    pub fn record_event_at(
        &self,
        local_agent_id: &str,
        remote_agent_id: &str,
        event: &Event,
        now: DateTime<Utc>,
    ) -> Result<AgentTrust, TrustError> {
        let key = MeshKey::new(local_agent_id, remote_agent_id, event.domain.as_str())?;
        let score = self.book.record(&key, event, now)?;
        Ok(AgentTrust::from_parts(key, score))
    }

    /// Fails with `NotFound` if the peer has never acted in this domain.
    pub fn get_score(
        &self,
        local_agent_id: &str,
        remote_agent_id: &str,
        domain: &str,
    ) -> Result<AgentTrust, TrustError> {
        let key = MeshKey::new(local_agent_id, remote_agent_id, domain)?;
        match self.book.get(&key)? {
            Some(record) => Ok(AgentTrust::from_parts(key, record.score)),
            None => Err(TrustError::NotFound(key.to_string())),
        }
    }

    /// The mode a peer's action is allowed.
    ///
    /// A peer with no history is evaluated at the mesh initial value, which
    /// is suggest-only with the default thresholds.
    pub fn autonomy_level(
        &self,
        local_agent_id: &str,
        remote_agent_id: &str,
        domain: &str,
        confidence: f64,
    ) -> Result<ActionMode, TrustError> {
        validate_confidence(confidence)?;
        let key = MeshKey::new(local_agent_id, remote_agent_id, domain)?;
        let state = match self.book.get(&key)? {
            Some(record) => record.score.state,
            None => self.book.initial_score(&key, Utc::now()).state,
        };
        self.policy.mode_for(state, confidence)
    }

    /// Every domain a peer has acted in. `NotFound` if the pair never interacted.
    pub fn get_all_trust_for_agent(
        &self,
        local_agent_id: &str,
        remote_agent_id: &str,
    ) -> Result<BTreeMap<String, AgentTrust>, TrustError> {
        validate_identifier("agent id", local_agent_id)?;
        validate_identifier("agent id", remote_agent_id)?;
        let found: BTreeMap<String, AgentTrust> = self
            .book
            .records()?
            .into_iter()
            .filter(|r| {
                r.key.local_agent_id == local_agent_id && r.key.remote_agent_id == remote_agent_id
            })
            .map(|r| (r.key.domain.clone(), AgentTrust::from_parts(r.key, r.score)))
            .collect();
        if found.is_empty() {
            return Err(TrustError::NotFound(format!(
                "{local_agent_id}/{remote_agent_id}"
            )));
        }
        Ok(found)
    }

    /// Every peer a local agent has dealt with: remote → domain → trust.
    pub fn get_all_trust(
        &self,
        local_agent_id: &str,
    ) -> Result<BTreeMap<String, BTreeMap<String, AgentTrust>>, TrustError> {
        validate_identifier("agent id", local_agent_id)?;
        let mut all: BTreeMap<String, BTreeMap<String, AgentTrust>> = BTreeMap::new();
        for record in self.book.records()? {
            if record.key.local_agent_id != local_agent_id {
                continue;
            }
            let remote = record.key.remote_agent_id.clone();
            let domain = record.key.domain.clone();
            all.entry(remote)
                .or_default()
                .insert(domain, AgentTrust::from_parts(record.key, record.score));
        }
        Ok(all)
    }

    pub fn archive(
        &self,
        local_agent_id: &str,
        remote_agent_id: &str,
        domain: &str,
        actor: &str,
    ) -> Result<bool, TrustError> {
        let key = MeshKey::new(local_agent_id, remote_agent_id, domain)?;
        self.book.archive(&key, actor, Utc::now())
    }
}

impl Decayable for MeshTrust {
    fn name(&self) -> &'static str {
        "mesh"
    }

    fn decay_all_at(&self, now: DateTime<Utc>) -> DecaySummary {
        self.book.decay_all(now)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Impact, TrustState};
    use tc_ledger::Ledger;
    use tempfile::tempdir;

    fn open_mesh(dir: &Path) -> (MeshTrust, Arc<Ledger>) {
        let ledger = Arc::new(Ledger::open(dir.join("ledger.jsonl")).unwrap());
        let mesh = MeshTrust::open(
            dir.join("mesh"),
            Arc::new(TrustConfig::default()),
            ledger.clone(),
        )
        .unwrap();
        (mesh, ledger)
    }

    #[test]
    fn peers_start_at_zero() {
        let dir = tempdir().unwrap();
        let (mesh, _ledger) = open_mesh(dir.path());
        let trust = mesh
            .record_event("home", "scheduler", &Event::success("calendar.write", Impact::High))
            .unwrap();
        assert_eq!(trust.score.value, 4.0);
        assert_eq!(trust.score.state, TrustState::Restricted);
        assert_eq!(trust.remote_agent_id, "scheduler");
    }

    #[test]
    fn unknown_pair_is_not_found() {
        let dir = tempdir().unwrap();
        let (mesh, _ledger) = open_mesh(dir.path());
        assert!(matches!(
            mesh.get_score("home", "stranger", "email.send"),
            Err(TrustError::NotFound(_))
        ));
        assert!(matches!(
            mesh.get_all_trust_for_agent("home", "stranger"),
            Err(TrustError::NotFound(_))
        ));
    }

    #[test]
    fn unknown_peer_is_suggest_only() {
        let dir = tempdir().unwrap();
        let (mesh, _ledger) = open_mesh(dir.path());
        assert_eq!(
            mesh.autonomy_level("home", "stranger", "email.send", 1.0)
                .unwrap(),
            ActionMode::Suggest
        );
        assert!(mesh
            .autonomy_level("home", "stranger", "email.send", 1.5)
            .is_err());
    }

    #[test]
    fn trust_is_directional_and_per_domain() {
        let dir = tempdir().unwrap();
        let (mesh, _ledger) = open_mesh(dir.path());
        let event = Event::success("calendar.write", Impact::Medium);
        mesh.record_event("home", "scheduler", &event).unwrap();
        mesh.record_event("home", "scheduler", &Event::success("email.send", Impact::Low))
            .unwrap();
        mesh.record_event("home", "mailer", &event).unwrap();

        let for_scheduler = mesh.get_all_trust_for_agent("home", "scheduler").unwrap();
        assert_eq!(
            for_scheduler.keys().collect::<Vec<_>>(),
            vec!["calendar.write", "email.send"]
        );
        assert!(mesh.get_all_trust_for_agent("scheduler", "home").is_err());

        let all = mesh.get_all_trust("home").unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all["mailer"]["calendar.write"].score.value, 2.0);
        assert!(mesh.get_all_trust("scheduler").unwrap().is_empty());
    }

    #[test]
    fn mesh_changes_are_audited_under_their_own_actions() {
        let dir = tempdir().unwrap();
        let (mesh, ledger) = open_mesh(dir.path());
        mesh.record_event("home", "scheduler", &Event::failure("calendar.write", Impact::Low))
            .unwrap();
        let history = ledger
            .entity_history("agent_trust", "home/scheduler/calendar.write")
            .unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].action, "mesh.trust.updated");
        // Clamped at the floor.
        assert_eq!(history[0].payload["new_value"], 0.0);
    }

    #[test]
    fn agent_ids_are_validated() {
        let dir = tempdir().unwrap();
        let (mesh, ledger) = open_mesh(dir.path());
        let err = mesh
            .record_event("home", "bad/peer", &Event::success("email.send", Impact::Low))
            .unwrap_err();
        assert!(matches!(err, TrustError::InvalidIdentifier { kind: "agent id", .. }));
        assert_eq!(ledger.len().unwrap(), 0);
    }

    #[test]
    fn agent_trust_flattens_score() {
        let score = TrustScore::initial("email.send", 0.0, TrustState::Restricted, Utc::now());
        let key = MeshKey::new("home", "scheduler", "email.send").unwrap();
        let json = serde_json::to_value(AgentTrust::from_parts(key, score)).unwrap();
        assert_eq!(json["remote_agent_id"], "scheduler");
        assert_eq!(json["domain"], "email.send");
        assert_eq!(json["state"], "restricted");
    }
}
