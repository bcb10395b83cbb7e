// decay.rs — The periodic decay tick.
//
// The scheduler itself has no timer; the daemon (or `tc trust decay`)
// calls `run_once`. Only one tick runs at a time per scheduler, and each
// target locks one key at a time so foreground events keep flowing while a
// tick is in progress.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::book::DecaySummary;
use crate::error::TrustError;

/// Something whose rows drift toward neutral while idle.
pub trait Decayable: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &'static str;

    /// Decay every row that is due as of `now`.
    fn decay_all_at(&self, now: DateTime<Utc>) -> DecaySummary;
}

/// Runs decay across a set of targets, one tick at a time.
#[derive(Default)]
pub struct DecayScheduler {
    targets: Vec<Arc<dyn Decayable>>,
    running: AtomicBool,
}

impl DecayScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_target(mut self, target: Arc<dyn Decayable>) -> Self {
        self.targets.push(target);
        self
    }

    pub fn run_once(&self) -> Result<DecaySummary, TrustError> {
        self.run_once_at(Utc::now())
    }

    /// One tick as of `now`. Fails with `DecayInProgress` if another tick
    /// on this scheduler has not finished.
    pub fn run_once_at(&self, now: DateTime<Utc>) -> Result<DecaySummary, TrustError> {
        let _running = RunningGuard::acquire(&self.running)?;

        let mut total = DecaySummary::default();
        for target in &self.targets {
            let summary = target.decay_all_at(now);
            tracing::debug!(
                target_name = target.name(),
                examined = summary.examined,
                decayed = summary.decayed,
                failed = summary.failed,
                "decay pass finished"
            );
            total = total.merge(summary);
        }

        if total.failed > 0 {
            tracing::warn!(failed = total.failed, "decay tick finished with failures");
        } else {
            tracing::info!(
                examined = total.examined,
                decayed = total.decayed,
                "decay tick finished"
            );
        }
        Ok(total)
    }
}

struct RunningGuard<'a>(&'a AtomicBool);

impl<'a> RunningGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Result<Self, TrustError> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map_err(|_| TrustError::DecayInProgress)?;
        Ok(Self(flag))
    }
}

impl Drop for RunningGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}
