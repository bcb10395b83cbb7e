// entry.rs — Ledger entry data model.
//
// A `NewEntry` is what callers hand to `append`. The ledger assigns the
// sequence number, entry id, timestamp and chain hashes, producing the
// stored `LedgerEntry`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::hasher;

/// One line of the ledger.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LedgerEntry {
    /// 1-based, strictly increasing position in the ledger.
    pub seq_num: u64,
    pub entry_id: Uuid,
    /// Hash of the previous entry, or [`hasher::GENESIS_HASH`] for the first.
    pub prev_hash: String,
    /// `H(prev_hash ‖ canonical fields)`.
    pub hash: String,
    /// What happened, e.g. `"trust.updated"`.
    pub action: String,
    /// Who caused it.
    pub actor: String,
    /// Kind of entity the entry refers to, e.g. `"trust_domain"`.
    pub entity_type: String,
    pub entity_id: String,
    #[serde(default)]
    pub payload: serde_json::Value,
    pub timestamp: DateTime<Utc>,
}

/// The fields covered by the hash, in a fixed order.
///
/// `serde_json` keeps struct field order and sorts object keys inside
/// `payload`, and with `float_roundtrip` every parsed float is the one
/// that was written, so the encoding is stable across serialize/deserialize.
#[derive(Serialize)]
struct CanonicalEntry<'a> {
    seq_num: u64,
    entry_id: &'a Uuid,
    prev_hash: &'a str,
    action: &'a str,
    actor: &'a str,
    entity_type: &'a str,
    entity_id: &'a str,
    payload: &'a serde_json::Value,
    timestamp: &'a DateTime<Utc>,
}

impl LedgerEntry {
    /// Canonical byte encoding of every field except `hash`.
    pub fn canonical_bytes(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(&CanonicalEntry {
            seq_num: self.seq_num,
            entry_id: &self.entry_id,
            prev_hash: &self.prev_hash,
            action: &self.action,
            actor: &self.actor,
            entity_type: &self.entity_type,
            entity_id: &self.entity_id,
            payload: &self.payload,
            timestamp: &self.timestamp,
        })
    }

    /// Recompute the hash from the entry's own fields.
    pub fn compute_hash(&self) -> Result<String, serde_json::Error> {
        Ok(hasher::chain_hash(&self.prev_hash, &self.canonical_bytes()?))
    }
}

/// An entry waiting to be appended.
#[derive(Debug, Clone, PartialEq)]
pub struct NewEntry {
    pub action: String,
    pub actor: String,
    pub entity_type: String,
    pub entity_id: String,
    pub payload: serde_json::Value,
}

impl NewEntry {
    pub fn new(
        action: impl Into<String>,
        entity_type: impl Into<String>,
        entity_id: impl Into<String>,
    ) -> Self {
        Self {
            action: action.into(),
            actor: "system".to_string(),
            entity_type: entity_type.into(),
            entity_id: entity_id.into(),
            payload: serde_json::Value::Null,
        }
    }

    /// Set the actor and return self (builder pattern).
    pub fn with_actor(mut self, actor: impl Into<String>) -> Self {
        self.actor = actor.into();
        self
    }

    pub fn with_payload(mut self, payload: serde_json::Value) -> Self {
        self.payload = payload;
        self
    }
}
