// error.rs — Error types for the ledger subsystem.
//
// `LedgerError` covers I/O and serialization failures plus verification
// outcomes. A broken hash chain is reported as a `ChainError` carrying the
// exact location of the first bad link.

use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Which check failed when walking the chain.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ChainErrorKind {
    /// `seq_num` does not follow its predecessor.
    SequenceGap,
    /// `prev_hash` does not equal the previous entry's stored hash.
    PrevHashMismatch,
    /// Recomputing the entry hash does not reproduce the stored hash.
    HashMismatch,
    /// The stored line could not be parsed as an entry.
    Malformed,
}

impl fmt::Display for ChainErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChainErrorKind::SequenceGap => write!(f, "sequence_gap"),
            ChainErrorKind::PrevHashMismatch => write!(f, "prev_hash_mismatch"),
            ChainErrorKind::HashMismatch => write!(f, "hash_mismatch"),
            ChainErrorKind::Malformed => write!(f, "malformed"),
        }
    }
}

/// The first broken link found by `verify_chain`.
///
/// Never repaired automatically: a broken chain means the ledger was
/// tampered with or corrupted and needs an operator.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Error)]
#[error("ledger chain broken at entry {entry_num} ({entry_id}): {kind}")]
pub struct ChainError {
    #[serde(rename = "type")]
    pub kind: ChainErrorKind,
    /// 1-based position of the entry in the ledger.
    pub entry_num: u64,
    /// Entry id as stored, empty when the line was unreadable.
    pub entry_id: String,
}

/// Errors that can occur during ledger operations.
#[derive(Debug, Error)]
pub enum LedgerError {
    /// Failed to open or create the ledger file.
    #[error("failed to open ledger at {path}: {source}")]
    OpenFailed {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Failed to read or write ledger content.
    #[error("ledger I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// An entry could not be serialized or deserialized.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The hash chain is broken.
    #[error(transparent)]
    Chain(#[from] ChainError),

    /// Another `Ledger` already owns this file.
    #[error("ledger at {path} is in use by another process")]
    Locked { path: PathBuf },

    /// A failed append left bytes that could not be removed; reopening
    /// reports the damaged tail.
    #[error("a failed append could not be rolled back; the ledger must be reopened")]
    WriterBroken,

    /// The tail of an existing ledger is unreadable, so appends cannot link to it.
    #[error("ledger tail is corrupt at line {line}: {reason}")]
    CorruptTail { line: usize, reason: String },

    /// Verification was cancelled by the caller.
    #[error("verification cancelled after {checked} entries")]
    Cancelled { checked: u64 },

    /// Verification ran past its deadline.
    #[error("verification deadline exceeded after {checked} entries")]
    DeadlineExceeded { checked: u64 },

    /// The writer lock was poisoned by a panicking appender.
    #[error("ledger writer lock poisoned")]
    Poisoned,
}
