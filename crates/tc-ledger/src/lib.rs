//! # tc-ledger
//!
//! Append-only, hash-chained audit ledger for Trust Capital.
//!
//! Every trust-affecting change is recorded as a [`LedgerEntry`] in a JSONL
//! file. Each entry stores the hash of its predecessor and a SHA-256 hash of
//! its own canonical fields, so [`LedgerRecorder::verify_chain`] can point at
//! the exact entry where tampering or corruption starts.
//!
//! ## Quick Example
//!
//! ```rust,no_run
//! use tc_ledger::{Ledger, LedgerRecorder, NewEntry, VerifyControl};
//!
//! let ledger = Ledger::open("/tmp/ledger.jsonl").unwrap();
//! let entry = NewEntry::new("trust.updated", "trust_domain", "email.send")
//!     .with_actor("agent-1");
//! ledger.append(entry).unwrap();
//! ledger.verify_chain(&VerifyControl::new()).unwrap();
//! ```

pub mod entry;
pub mod error;
pub mod hasher;
pub mod ledger;

pub use entry::{LedgerEntry, NewEntry};
pub use error::{ChainError, ChainErrorKind, LedgerError};
pub use ledger::{Ledger, LedgerRecorder, VerifyControl, VerifyReport};
