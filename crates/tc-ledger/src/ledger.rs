// ledger.rs — Append-only, hash-chained JSONL ledger.
//
// One `LedgerEntry` per line. Each entry stores the hash of its predecessor
// and its own hash over (prev_hash ‖ canonical fields), so inserting,
// deleting, reordering or editing any line is detected by `verify_chain`.
//
// Appends are serialized through a single writer mutex. Readers snapshot
// the committed byte length under that mutex and then read the file prefix
// without holding it, so a long verification never stalls appenders.
//
// The writer state (head hash, next sequence number) is cached in memory,
// so only one `Ledger` may own a file at a time. `open` takes an exclusive
// lock on `<path>.lock` for the lifetime of the value; a second opener,
// in this process or another, gets `LedgerError::Locked`.
//
// A failed append is rolled back by truncating the file to the last
// committed line, so a write the caller saw fail is never replayed later.

use std::ffi::OsString;
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use chrono::Utc;
use fs2::FileExt;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::entry::{LedgerEntry, NewEntry};
use crate::error::{ChainError, ChainErrorKind, LedgerError};
use crate::hasher::GENESIS_HASH;

/// How often verification checks for cancellation, in entries.
const CONTROL_CHECK_INTERVAL: u64 = 64;

/// The audit store the trust engine writes through.
///
/// Implementations must serialize appends: every entry's hash depends on
/// the one before it.
pub trait LedgerRecorder: Send + Sync {
    /// Append an entry, returning it as stored (with sequence number and hash).
    fn append(&self, entry: NewEntry) -> Result<LedgerEntry, LedgerError>;

    /// Walk the chain in order and stop at the first broken link.
    fn verify_chain(&self, control: &VerifyControl) -> Result<VerifyReport, LedgerError>;

    /// All entries, oldest first.
    fn entries(&self) -> Result<Vec<LedgerEntry>, LedgerError>;

    /// All entries that reference one entity, in append order.
    fn entity_history(
        &self,
        entity_type: &str,
        entity_id: &str,
    ) -> Result<Vec<LedgerEntry>, LedgerError> {
        Ok(self
            .entries()?
            .into_iter()
            .filter(|e| e.entity_type == entity_type && e.entity_id == entity_id)
            .collect())
    }

    fn get_entry(&self, entry_id: Uuid) -> Result<Option<LedgerEntry>, LedgerError> {
        Ok(self.entries()?.into_iter().find(|e| e.entry_id == entry_id))
    }

    /// A page of entries starting at `offset` (0-based).
    fn list(&self, offset: usize, limit: usize) -> Result<Vec<LedgerEntry>, LedgerError> {
        Ok(self.entries()?.into_iter().skip(offset).take(limit).collect())
    }
}

/// Cancellation and deadline for a verification walk.
#[derive(Debug, Clone, Default)]
pub struct VerifyControl {
    deadline: Option<Instant>,
    cancelled: Arc<AtomicBool>,
}

impl VerifyControl {
    /// No deadline, not cancelled.
    pub fn new() -> Self {
        Self::default()
    }

    /// Give up once `timeout` has elapsed from now.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.deadline = Some(Instant::now() + timeout);
        self
    }

    /// Request cancellation. Clones share the flag.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    fn check(&self, checked: u64) -> Result<(), LedgerError> {
        if self.is_cancelled() {
            return Err(LedgerError::Cancelled { checked });
        }
        if self.deadline.is_some_and(|d| Instant::now() >= d) {
            return Err(LedgerError::DeadlineExceeded { checked });
        }
        Ok(())
    }
}

/// Result of a successful verification.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct VerifyReport {
    /// Number of entries checked.
    pub entries: u64,
    /// Hash of the last entry (genesis hash for an empty ledger).
    pub head_hash: String,
}

/// Where appended lines go.
trait AppendTarget: Send {
    /// Write one whole line and make it durable.
    fn write_line(&mut self, line: &[u8]) -> std::io::Result<()>;

    /// Cut the file back to `len` bytes.
    fn truncate(&mut self, len: u64) -> std::io::Result<()>;
}

impl AppendTarget for File {
    fn write_line(&mut self, line: &[u8]) -> std::io::Result<()> {
        self.write_all(line)?;
        self.sync_data()
    }

    fn truncate(&mut self, len: u64) -> std::io::Result<()> {
        self.set_len(len)?;
        self.sync_data()
    }
}

struct WriterState {
    target: Box<dyn AppendTarget>,
    last_hash: String,
    next_seq: u64,
    /// Bytes of fully written lines; readers never look past this.
    committed_len: u64,
    /// Set when a failed append could not be rolled back.
    broken: bool,
}

/// A ledger backed by a JSONL file.
pub struct Ledger {
    path: PathBuf,
    state: Mutex<WriterState>,
    /// Held for the lifetime of the ledger; closing it releases the lock.
    _lock: File,
}

impl Ledger {
    /// Open (or create) a ledger at the given path.
    ///
    /// An existing file is scanned to recover the chain head so new entries
    /// link to the last stored one. Fails with [`LedgerError::Locked`] while
    /// another `Ledger` has the same file open.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, LedgerError> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|source| LedgerError::OpenFailed {
                    path: path.clone(),
                    source,
                })?;
            }
        }
        let lock = Self::lock(&path)?;

        let (last_hash, next_seq) = if path.exists() {
            Self::read_head(&path)?
        } else {
            (GENESIS_HASH.to_string(), 1)
        };

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|source| LedgerError::OpenFailed {
                path: path.clone(),
                source,
            })?;
        let committed_len = file.metadata()?.len();

        tracing::debug!(path = %path.display(), next_seq, "ledger opened");

        Ok(Self {
            path,
            state: Mutex::new(WriterState {
                target: Box::new(file),
                last_hash,
                next_seq,
                committed_len,
                broken: false,
            }),
            _lock: lock,
        })
    }

    #[cfg(test)]
    fn set_target(&self, target: Box<dyn AppendTarget>) {
        if let Ok(mut state) = self.state.lock() {
            state.target = target;
        }
    }

    /// Take the exclusive lock guarding `path`.
    fn lock(path: &Path) -> Result<File, LedgerError> {
        let mut lock_path = OsString::from(path.as_os_str());
        lock_path.push(".lock");
        let lock_path = PathBuf::from(lock_path);

        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(&lock_path)
            .map_err(|source| LedgerError::OpenFailed {
                path: lock_path.clone(),
                source,
            })?;
        match file.try_lock_exclusive() {
            Ok(()) => Ok(file),
            Err(e) if e.kind() == fs2::lock_contended_error().kind() => {
                Err(LedgerError::Locked {
                    path: path.to_path_buf(),
                })
            }
            Err(source) => Err(LedgerError::OpenFailed {
                path: lock_path,
                source,
            }),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Number of committed entries.
    pub fn len(&self) -> Result<u64, LedgerError> {
        let state = self.state.lock().map_err(|_| LedgerError::Poisoned)?;
        Ok(state.next_seq - 1)
    }

    pub fn is_empty(&self) -> Result<bool, LedgerError> {
        Ok(self.len()? == 0)
    }

    /// Hash of the most recent entry.
    pub fn head_hash(&self) -> Result<String, LedgerError> {
        let state = self.state.lock().map_err(|_| LedgerError::Poisoned)?;
        Ok(state.last_hash.clone())
    }

    fn committed_len(&self) -> Result<u64, LedgerError> {
        let state = self.state.lock().map_err(|_| LedgerError::Poisoned)?;
        Ok(state.committed_len)
    }

    /// Reader over the committed prefix of the file.
    fn snapshot_reader(&self) -> Result<BufReader<std::io::Take<File>>, LedgerError> {
        let len = self.committed_len()?;
        let file = File::open(&self.path).map_err(|source| LedgerError::OpenFailed {
            path: self.path.clone(),
            source,
        })?;
        Ok(BufReader::new(file.take(len)))
    }

    /// Recover `(last_hash, next_seq)` from an existing file.
    fn read_head(path: &Path) -> Result<(String, u64), LedgerError> {
        let file = File::open(path).map_err(|source| LedgerError::OpenFailed {
            path: path.to_path_buf(),
            source,
        })?;
        let mut last: Option<(usize, String)> = None;
        for (idx, line) in BufReader::new(file).lines().enumerate() {
            let line = line?;
            if !line.trim().is_empty() {
                last = Some((idx + 1, line));
            }
        }

        match last {
            None => Ok((GENESIS_HASH.to_string(), 1)),
            Some((line_num, line)) => {
                let entry: LedgerEntry =
                    serde_json::from_str(&line).map_err(|e| LedgerError::CorruptTail {
                        line: line_num,
                        reason: e.to_string(),
                    })?;
                Ok((entry.hash, entry.seq_num + 1))
            }
        }
    }
}

impl LedgerRecorder for Ledger {
    fn append(&self, new: NewEntry) -> Result<LedgerEntry, LedgerError> {
        let mut state = self.state.lock().map_err(|_| LedgerError::Poisoned)?;
        if state.broken {
            return Err(LedgerError::WriterBroken);
        }

        let mut entry = LedgerEntry {
            seq_num: state.next_seq,
            entry_id: Uuid::new_v4(),
            prev_hash: state.last_hash.clone(),
            hash: String::new(),
            action: new.action,
            actor: new.actor,
            entity_type: new.entity_type,
            entity_id: new.entity_id,
            payload: new.payload,
            timestamp: Utc::now(),
        };
        entry.hash = entry.compute_hash()?;

        let mut line = serde_json::to_string(&entry)?;
        line.push('\n');
        if let Err(err) = state.target.write_line(line.as_bytes()) {
            let committed_len = state.committed_len;
            match state.target.truncate(committed_len) {
                Ok(()) => tracing::warn!(
                    seq = entry.seq_num,
                    error = %err,
                    "ledger append failed; rolled back"
                ),
                Err(rollback) => {
                    state.broken = true;
                    tracing::error!(
                        seq = entry.seq_num,
                        committed_len,
                        error = %rollback,
                        "ledger append failed and could not be rolled back"
                    );
                }
            }
            return Err(err.into());
        }

        state.last_hash = entry.hash.clone();
        state.next_seq += 1;
        state.committed_len += line.len() as u64;

        tracing::debug!(
            seq = entry.seq_num,
            action = %entry.action,
            entity = %entry.entity_id,
            "ledger entry appended"
        );
        Ok(entry)
    }

    fn verify_chain(&self, control: &VerifyControl) -> Result<VerifyReport, LedgerError> {
        let reader = self.snapshot_reader()?;
        let mut expected_prev = GENESIS_HASH.to_string();
        let mut checked: u64 = 0;

        for line in reader.lines() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            if checked % CONTROL_CHECK_INTERVAL == 0 {
                control.check(checked)?;
            }
            let position = checked + 1;

            let entry: LedgerEntry = match serde_json::from_str(&line) {
                Ok(entry) => entry,
                Err(_) => {
                    return Err(broken(ChainErrorKind::Malformed, position, String::new()));
                }
            };
            let entry_id = entry.entry_id.to_string();

            if entry.seq_num != position {
                return Err(broken(ChainErrorKind::SequenceGap, position, entry_id));
            }
            if entry.prev_hash != expected_prev {
                return Err(broken(ChainErrorKind::PrevHashMismatch, position, entry_id));
            }
            if entry.compute_hash()? != entry.hash {
                return Err(broken(ChainErrorKind::HashMismatch, position, entry_id));
            }

            expected_prev = entry.hash;
            checked = position;
        }

        Ok(VerifyReport {
            entries: checked,
            head_hash: expected_prev,
        })
    }

    fn entries(&self) -> Result<Vec<LedgerEntry>, LedgerError> {
        let mut entries = Vec::new();
        for line in self.snapshot_reader()?.lines() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            entries.push(serde_json::from_str(&line)?);
        }
        Ok(entries)
    }
}

fn broken(kind: ChainErrorKind, entry_num: u64, entry_id: String) -> LedgerError {
    let err = ChainError {
        kind,
        entry_num,
        entry_id,
    };
    tracing::error!(%err, "ledger integrity check failed");
    LedgerError::Chain(err)
}
