// book.rs — ScoreBook: per-key trust rows with audited, atomic updates.
//
// Domain trust and mesh trust share one implementation, parameterised by
// the key type. Each key has its own mutex; the key table lock is held
// only to find or create a slot, so updates to different keys never wait
// on each other.
//
// Commit order for every mutation, under the key's mutex:
//   1. compute the next row from the current one
//   2. append the ledger entry (the commit point; on failure nothing changes)
//   3. write the row file (temp file + rename)
//   4. publish the row in memory
//
// The ledger payload carries the full post-change score and a per-key
// revision. `open` replays any ledger revision newer than the row on disk,
// so a crash between steps 2 and 3 is rolled forward, never lost.
//
// Rows live in memory after `open`. Only the engine holding the ledger
// lock may write them; a second process is refused at `Ledger::open`.

use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::fs;
use std::hash::Hash;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, RwLock};

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tc_ledger::{hasher, LedgerRecorder, NewEntry};

use crate::config::TrustConfig;
use crate::error::TrustError;
use crate::scoring;
use crate::types::{validate_confidence, Event, EventRecord, Outcome, TrustScore, TrustState};

/// Identifies one trust row.
pub trait TrustKey:
    Clone
    + Eq
    + Hash
    + Ord
    + fmt::Debug
    + fmt::Display
    + Serialize
    + DeserializeOwned
    + Send
    + Sync
    + 'static
{
    /// Ledger `entity_type` for rows of this kind.
    const ENTITY_TYPE: &'static str;
    /// Prefix of ledger actions, e.g. `"trust"` → `"trust.updated"`.
    const ACTION_PREFIX: &'static str;

    /// The domain part of the key.
    fn domain(&self) -> &str;

    /// Ledger `entity_id`.
    fn entity_id(&self) -> String {
        self.to_string()
    }

    /// File name (without extension) of the row. Hashed so no identifier
    /// can escape the store directory.
    fn file_stem(&self) -> String {
        hasher::hash_str(&self.entity_id())
    }
}

/// The persisted form of one row.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(bound(deserialize = "K: DeserializeOwned"))]
pub struct TrustRecord<K> {
    pub key: K,
    pub score: TrustScore,
    /// Bumped on every audited mutation; matches the ledger payload.
    pub revision: u64,
    /// Decay has been applied for all whole periods up to here.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_decay: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub archived_at: Option<DateTime<Utc>>,
    /// Most recent applied events, oldest first.
    #[serde(default)]
    pub history: VecDeque<EventRecord>,
}

impl<K> TrustRecord<K> {
    pub fn is_archived(&self) -> bool {
        self.archived_at.is_some()
    }
}

/// Ledger payload for every row mutation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(bound(deserialize = "K: DeserializeOwned"))]
struct ChangePayload<K> {
    key: K,
    domain: String,
    revision: u64,
    old_value: f64,
    new_value: f64,
    old_state: TrustState,
    new_state: TrustState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    outcome: Option<Outcome>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    event: Option<EventRecord>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    periods: Option<u32>,
    snapshot: TrustScore,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    last_decay: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    archived_at: Option<DateTime<Utc>>,
}

/// Result of one decay attempt across a book.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct DecaySummary {
    pub examined: usize,
    pub decayed: usize,
    pub failed: usize,
}

impl DecaySummary {
    pub fn merge(self, other: DecaySummary) -> DecaySummary {
        DecaySummary {
            examined: self.examined + other.examined,
            decayed: self.decayed + other.decayed,
            failed: self.failed + other.failed,
        }
    }
}

type Slot<K> = Arc<Mutex<Option<TrustRecord<K>>>>;

/// Trust rows for one key type, persisted as one JSON file per key.
pub struct ScoreBook<K: TrustKey> {
    dir: PathBuf,
    config: Arc<TrustConfig>,
    ledger: Arc<dyn LedgerRecorder>,
    initial_value: f64,
    slots: RwLock<HashMap<K, Slot<K>>>,
}

impl<K: TrustKey> ScoreBook<K> {
    /// Load every row under `dir` and roll forward any change the ledger
    /// recorded but the row files missed.
    pub fn open(
        dir: impl AsRef<Path>,
        config: Arc<TrustConfig>,
        ledger: Arc<dyn LedgerRecorder>,
        initial_value: f64,
    ) -> Result<Self, TrustError> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir).map_err(|source| TrustError::Io {
            path: dir.clone(),
            source,
        })?;

        let mut slots = HashMap::new();
        let entries = fs::read_dir(&dir).map_err(|source| TrustError::Io {
            path: dir.clone(),
            source,
        })?;
        for entry in entries {
            let path = entry
                .map_err(|source| TrustError::Io {
                    path: dir.clone(),
                    source,
                })?
                .path();
            if !path.extension().is_some_and(|ext| ext == "json") {
                continue;
            }
            let json = fs::read_to_string(&path).map_err(|source| TrustError::Io {
                path: path.clone(),
                source,
            })?;
            let record: TrustRecord<K> = serde_json::from_str(&json)?;
            slots.insert(record.key.clone(), Arc::new(Mutex::new(Some(record))));
        }

        let book = Self {
            dir,
            config,
            ledger,
            initial_value,
            slots: RwLock::new(slots),
        };
        let replayed = book.reconcile()?;
        if replayed > 0 {
            tracing::warn!(
                entity_type = K::ENTITY_TYPE,
                replayed,
                "rolled trust rows forward from the ledger"
            );
        }
        Ok(book)
    }

    pub fn config(&self) -> &TrustConfig {
        &self.config
    }

    pub fn initial_value(&self) -> f64 {
        self.initial_value
    }

    /// The row a key starts from before its first event.
    pub fn initial_score(&self, key: &K, now: DateTime<Utc>) -> TrustScore {
        TrustScore::initial(
            key.domain(),
            self.initial_value,
            self.config.thresholds.state_for(self.initial_value),
            now,
        )
    }

    /// Apply one event to a key and audit it.
    pub fn record(
        &self,
        key: &K,
        event: &Event,
        now: DateTime<Utc>,
    ) -> Result<TrustScore, TrustError> {
        if let Some(confidence) = event.predicted_confidence {
            validate_confidence(confidence)?;
        }

        let slot = self.slot(key)?;
        let mut guard = slot.lock().map_err(|_| TrustError::Poisoned)?;

        let current = guard.clone().unwrap_or_else(|| TrustRecord {
            key: key.clone(),
            score: self.initial_score(key, now),
            revision: 0,
            last_decay: None,
            archived_at: None,
            history: VecDeque::new(),
        });

        let old_value = current.score.value;
        let old_state = current.score.state;
        let requested = scoring::event_delta(event.outcome, event.impact, &self.config.scoring);
        let new_value = scoring::clamp_value(old_value + requested);
        let applied = new_value - old_value;
        let new_state = self.config.thresholds.state_for(new_value);

        let mut next = current;
        next.score.value = new_value;
        next.score.state = new_state;
        next.score.action_count += 1;
        next.score.last_activity = now;
        next.score.last_updated = now;
        if new_state != old_state {
            next.score.state_entered = now;
        }
        *next
            .score
            .factors
            .entry(event.outcome.contributor().to_string())
            .or_insert(0.0) += applied;
        next.revision += 1;
        next.archived_at = None;

        let record = EventRecord {
            outcome: event.outcome,
            impact: event.impact,
            predicted_confidence: event.predicted_confidence,
            delta: applied,
            value_after: new_value,
            timestamp: event.timestamp,
        };
        next.history.push_back(record.clone());
        while next.history.len() > self.config.storage.history_limit {
            next.history.pop_front();
        }

        let payload = ChangePayload {
            key: key.clone(),
            domain: key.domain().to_string(),
            revision: next.revision,
            old_value,
            new_value,
            old_state,
            new_state,
            outcome: Some(event.outcome),
            event: Some(record),
            periods: None,
            snapshot: next.score.clone(),
            last_decay: next.last_decay,
            archived_at: None,
        };
        let score = next.score.clone();
        self.commit(&mut guard, next, "updated", &event.actor, &payload)?;

        if new_state != old_state {
            tracing::info!(
                key = %key,
                from = %old_state,
                to = %new_state,
                value = new_value,
                "trust state changed"
            );
        } else {
            tracing::debug!(key = %key, old = old_value, new = new_value, "trust updated");
        }
        Ok(score)
    }

    /// Decay one key toward its starting value if it has been idle for a
    /// full period.
    ///
    /// Returns the new score when the value changed, `None` otherwise.
    pub fn decay(&self, key: &K, now: DateTime<Utc>) -> Result<Option<TrustScore>, TrustError> {
        let Some(slot) = self.existing_slot(key)? else {
            return Ok(None);
        };
        let mut guard = slot.lock().map_err(|_| TrustError::Poisoned)?;
        let Some(current) = guard.clone() else {
            return Ok(None);
        };
        if current.is_archived() {
            return Ok(None);
        }

        let decay_cfg = &self.config.decay;
        if !scoring::decay_due(current.score.last_activity, now, decay_cfg) {
            return Ok(None);
        }
        let anchor = current
            .last_decay
            .map_or(current.score.last_activity, |d| d.max(current.score.last_activity));
        let periods = scoring::periods_elapsed(anchor, now, decay_cfg);
        if periods == 0 {
            return Ok(None);
        }

        let old_value = current.score.value;
        let old_state = current.score.state;
        let new_value = scoring::decayed_value(
            old_value,
            self.initial_value,
            periods,
            decay_cfg,
            &self.config.thresholds,
        );
        if new_value == old_value {
            tracing::debug!(key = %key, "decay left value unchanged");
            return Ok(None);
        }
        let new_state = self.config.thresholds.state_for(new_value);

        let mut next = current;
        next.score.value = new_value;
        next.score.state = new_state;
        next.score.last_updated = now;
        if new_state != old_state {
            next.score.state_entered = now;
        }
        *next.score.factors.entry("decay".to_string()).or_insert(0.0) += new_value - old_value;
        next.revision += 1;
        let consumed = decay_cfg.period() * i32::try_from(periods).unwrap_or(i32::MAX);
        next.last_decay = Some(anchor + consumed);

        let payload = ChangePayload {
            key: key.clone(),
            domain: key.domain().to_string(),
            revision: next.revision,
            old_value,
            new_value,
            old_state,
            new_state,
            outcome: None,
            event: None,
            periods: Some(periods),
            snapshot: next.score.clone(),
            last_decay: next.last_decay,
            archived_at: None,
        };
        let score = next.score.clone();
        self.commit(&mut guard, next, "decayed", "decay-tick", &payload)?;

        tracing::info!(
            key = %key,
            old = old_value,
            new = new_value,
            periods,
            state = %new_state,
            "trust decayed"
        );
        Ok(Some(score))
    }

    /// Decay every known key, one lock at a time.
    pub fn decay_all(&self, now: DateTime<Utc>) -> DecaySummary {
        let mut summary = DecaySummary::default();
        let keys = match self.keys() {
            Ok(keys) => keys,
            Err(e) => {
                tracing::error!(error = %e, "could not list keys for decay");
                summary.failed += 1;
                return summary;
            }
        };
        for key in keys {
            summary.examined += 1;
            match self.decay(&key, now) {
                Ok(Some(_)) => summary.decayed += 1,
                Ok(None) => {}
                Err(e) => {
                    summary.failed += 1;
                    tracing::error!(key = %key, error = %e, "decay failed");
                }
            }
        }
        summary
    }

    /// Mark a key inactive. Returns false if it is unknown or already archived.
    pub fn archive(&self, key: &K, actor: &str, now: DateTime<Utc>) -> Result<bool, TrustError> {
        let Some(slot) = self.existing_slot(key)? else {
            return Ok(false);
        };
        let mut guard = slot.lock().map_err(|_| TrustError::Poisoned)?;
        let Some(current) = guard.clone() else {
            return Ok(false);
        };
        if current.is_archived() {
            return Ok(false);
        }

        let mut next = current;
        next.revision += 1;
        next.archived_at = Some(now);
        next.score.last_updated = now;

        let payload = ChangePayload {
            key: key.clone(),
            domain: key.domain().to_string(),
            revision: next.revision,
            old_value: next.score.value,
            new_value: next.score.value,
            old_state: next.score.state,
            new_state: next.score.state,
            outcome: None,
            event: None,
            periods: None,
            snapshot: next.score.clone(),
            last_decay: next.last_decay,
            archived_at: next.archived_at,
        };
        self.commit(&mut guard, next, "archived", actor, &payload)?;
        tracing::info!(key = %key, "trust row archived");
        Ok(true)
    }

    /// A copy of one row, if the key has any history.
    pub fn get(&self, key: &K) -> Result<Option<TrustRecord<K>>, TrustError> {
        match self.existing_slot(key)? {
            None => Ok(None),
            Some(slot) => Ok(slot.lock().map_err(|_| TrustError::Poisoned)?.clone()),
        }
    }

    /// Copies of every row.
    pub fn records(&self) -> Result<Vec<TrustRecord<K>>, TrustError> {
        let slots: Vec<Slot<K>> = {
            let map = self.slots.read().map_err(|_| TrustError::Poisoned)?;
            map.values().cloned().collect()
        };
        let mut records = Vec::with_capacity(slots.len());
        for slot in slots {
            if let Some(record) = slot.lock().map_err(|_| TrustError::Poisoned)?.clone() {
                records.push(record);
            }
        }
        records.sort_by(|a, b| a.key.cmp(&b.key));
        Ok(records)
    }

    pub fn keys(&self) -> Result<Vec<K>, TrustError> {
        let map = self.slots.read().map_err(|_| TrustError::Poisoned)?;
        let mut keys: Vec<K> = map.keys().cloned().collect();
        keys.sort();
        Ok(keys)
    }

    /// Append the audit entry, then persist and publish `next`.
    fn commit(
        &self,
        guard: &mut Option<TrustRecord<K>>,
        next: TrustRecord<K>,
        verb: &str,
        actor: &str,
        payload: &ChangePayload<K>,
    ) -> Result<(), TrustError> {
        let entry = NewEntry::new(
            format!("{}.{}", K::ACTION_PREFIX, verb),
            K::ENTITY_TYPE,
            next.key.entity_id(),
        )
        .with_actor(actor)
        .with_payload(serde_json::to_value(payload)?);
        self.ledger.append(entry)?;

        // The ledger entry is the commit record. A failed row write is
        // repaired by `reconcile` on the next open.
        if let Err(e) = self.persist(&next) {
            tracing::error!(
                key = %next.key,
                revision = next.revision,
                error = %e,
                "row write failed after ledger commit; will replay on next open"
            );
        }
        *guard = Some(next);
        Ok(())
    }

    fn persist(&self, record: &TrustRecord<K>) -> Result<(), TrustError> {
        let path = self.row_path(&record.key);
        let tmp = path.with_extension("json.tmp");
        let json = serde_json::to_string_pretty(record)?;
        fs::write(&tmp, json).map_err(|source| TrustError::Io {
            path: tmp.clone(),
            source,
        })?;
        fs::rename(&tmp, &path).map_err(|source| TrustError::Io { path, source })?;
        Ok(())
    }

    /// Roll rows forward to the newest revision the ledger holds.
    fn reconcile(&self) -> Result<usize, TrustError> {
        let mut replayed = 0;
        for entry in self.ledger.entries()? {
            if entry.entity_type != K::ENTITY_TYPE
                || !entry.action.starts_with(K::ACTION_PREFIX)
            {
                continue;
            }
            let payload: ChangePayload<K> = match serde_json::from_value(entry.payload) {
                Ok(p) => p,
                Err(e) => {
                    tracing::warn!(
                        seq = entry.seq_num,
                        error = %e,
                        "skipping unreadable trust payload"
                    );
                    continue;
                }
            };

            let slot = self.slot(&payload.key)?;
            let mut guard = slot.lock().map_err(|_| TrustError::Poisoned)?;
            let stored_revision = guard.as_ref().map_or(0, |r| r.revision);
            if payload.revision <= stored_revision {
                continue;
            }

            let mut next = guard.clone().unwrap_or_else(|| TrustRecord {
                key: payload.key.clone(),
                score: payload.snapshot.clone(),
                revision: 0,
                last_decay: None,
                archived_at: None,
                history: VecDeque::new(),
            });
            next.score = payload.snapshot;
            next.revision = payload.revision;
            next.last_decay = payload.last_decay;
            next.archived_at = payload.archived_at;
            if let Some(event) = payload.event {
                next.history.push_back(event);
                while next.history.len() > self.config.storage.history_limit {
                    next.history.pop_front();
                }
            }
            self.persist(&next)?;
            *guard = Some(next);
            replayed += 1;
        }
        Ok(replayed)
    }

    fn row_path(&self, key: &K) -> PathBuf {
        self.dir.join(format!("{}.json", key.file_stem()))
    }

    fn existing_slot(&self, key: &K) -> Result<Option<Slot<K>>, TrustError> {
        let map = self.slots.read().map_err(|_| TrustError::Poisoned)?;
        Ok(map.get(key).cloned())
    }

    fn slot(&self, key: &K) -> Result<Slot<K>, TrustError> {
        if let Some(slot) = self.existing_slot(key)? {
            return Ok(slot);
        }
        let mut map = self.slots.write().map_err(|_| TrustError::Poisoned)?;
        Ok(Arc::clone(
            map.entry(key.clone())
                .or_insert_with(|| Arc::new(Mutex::new(None))),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::Domain;
    use crate::types::Impact;
    use tc_ledger::Ledger;
    use tempfile::tempdir;

    fn open_book(dir: &Path, config: TrustConfig) -> ScoreBook<Domain> {
        let ledger = Arc::new(Ledger::open(dir.join("ledger.jsonl")).unwrap());
        ScoreBook::open(dir.join("scores"), Arc::new(config), ledger, 50.0).unwrap()
    }

    fn email() -> Domain {
        Domain::parse("email.send").unwrap()
    }

    #[test]
    fn revision_counts_mutations() {
        let dir = tempdir().unwrap();
        let book = open_book(dir.path(), TrustConfig::default());
        let now = Utc::now();
        let event = Event::success("email.send", Impact::Low);
        book.record(&email(), &event, now).unwrap();
        book.record(&email(), &event, now).unwrap();
        book.archive(&email(), "operator", now).unwrap();
        let record = book.get(&email()).unwrap().unwrap();
        assert_eq!(record.revision, 3);
        assert!(record.is_archived());
        assert_eq!(record.score.action_count, 2);
    }

    #[test]
    fn history_is_bounded() {
        let dir = tempdir().unwrap();
        let mut config = TrustConfig::default();
        config.storage.history_limit = 3;
        let book = open_book(dir.path(), config);
        let now = Utc::now();
        for _ in 0..5 {
            book.record(&email(), &Event::success("email.send", Impact::Low), now)
                .unwrap();
        }
        let record = book.get(&email()).unwrap().unwrap();
        assert_eq!(record.history.len(), 3);
        assert_eq!(record.history.back().unwrap().value_after, 55.0);
        assert_eq!(record.score.action_count, 5);
    }

    #[test]
    fn row_file_is_named_by_hash() {
        let dir = tempdir().unwrap();
        let book = open_book(dir.path(), TrustConfig::default());
        book.record(&email(), &Event::success("email.send", Impact::Low), Utc::now())
            .unwrap();
        let expected = dir
            .path()
            .join("scores")
            .join(format!("{}.json", hasher::hash_str("email.send")));
        assert!(expected.exists());
    }

    #[test]
    fn missing_row_is_rolled_forward_from_ledger() {
        let dir = tempdir().unwrap();
        {
            let book = open_book(dir.path(), TrustConfig::default());
            let now = Utc::now();
            book.record(&email(), &Event::success("email.send", Impact::High), now)
                .unwrap();
            book.record(&email(), &Event::failure("email.send", Impact::Low), now)
                .unwrap();
        }
        // Simulate a crash after the ledger append but before the row write.
        for entry in fs::read_dir(dir.path().join("scores")).unwrap() {
            fs::remove_file(entry.unwrap().path()).unwrap();
        }

        let book = open_book(dir.path(), TrustConfig::default());
        let record = book.get(&email()).unwrap().unwrap();
        assert_eq!(record.revision, 2);
        assert_eq!(record.score.value, 51.5);
        assert_eq!(record.history.len(), 2);
    }

    #[test]
    fn stale_row_is_rolled_forward_and_replay_is_idempotent() {
        let dir = tempdir().unwrap();
        let row = dir
            .path()
            .join("scores")
            .join(format!("{}.json", hasher::hash_str("email.send")));
        let stale = {
            let book = open_book(dir.path(), TrustConfig::default());
            let now = Utc::now();
            book.record(&email(), &Event::success("email.send", Impact::Medium), now)
                .unwrap();
            let stale = fs::read_to_string(&row).unwrap();
            book.record(&email(), &Event::success("email.send", Impact::Medium), now)
                .unwrap();
            stale
        };
        fs::write(&row, stale).unwrap();

        let book = open_book(dir.path(), TrustConfig::default());
        let record = book.get(&email()).unwrap().unwrap();
        assert_eq!(record.revision, 2);
        assert_eq!(record.score.value, 54.0);
        assert_eq!(record.score.action_count, 2);
        drop(book);

        let book = open_book(dir.path(), TrustConfig::default());
        let record = book.get(&email()).unwrap().unwrap();
        assert_eq!(record.revision, 2);
        assert_eq!(record.history.len(), 2);
    }
}
