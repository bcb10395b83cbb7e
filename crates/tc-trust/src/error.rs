// error.rs — Error types for the trust engine.

use std::path::PathBuf;

use tc_ledger::LedgerError;
use thiserror::Error;

/// Errors from loading or validating a `TrustConfig`.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config at {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    /// A value is out of range or inconsistent with another value.
    #[error("invalid config value for {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}

/// Errors that can occur during trust operations.
#[derive(Debug, Error)]
pub enum TrustError {
    /// A domain or agent identifier failed validation. Nothing was mutated.
    #[error("invalid {kind} '{value}': {reason}")]
    InvalidIdentifier {
        kind: &'static str,
        value: String,
        reason: String,
    },

    /// A confidence value outside [0, 1]. Nothing was mutated.
    #[error("confidence must be within [0, 1], got {0}")]
    InvalidConfidence(f64),

    /// A mesh peer pair (or pair + domain) has never interacted.
    #[error("no trust record for {0}")]
    NotFound(String),

    /// The audit append failed, so the change was not applied.
    #[error("ledger error: {0}")]
    Ledger(#[from] LedgerError),

    /// Reading or writing a score row failed.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A score slot lock was poisoned by a panicking writer.
    #[error("trust store lock poisoned")]
    Poisoned,

    /// Another decay tick is still running.
    #[error("a decay tick is already in progress")]
    DecayInProgress,

    #[error(transparent)]
    Config(#[from] ConfigError),
}
