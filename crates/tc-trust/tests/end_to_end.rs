// end_to_end.rs — Trust engine flows across store, policy, recovery and ledger.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

use chrono::{Duration, Utc};
use tc_ledger::{
    Ledger, LedgerEntry, LedgerError, LedgerRecorder, NewEntry, VerifyControl, VerifyReport,
};
use tc_trust::{
    ActionMode, DecayScheduler, EnginePaths, Event, Impact, MeshTrust, Outcome, TrustConfig,
    TrustError, TrustState, TrustStore,
};
use tempfile::tempdir;

struct Engine {
    store: TrustStore,
    ledger: Arc<Ledger>,
}

fn open_engine(root: &std::path::Path) -> Engine {
    let paths = EnginePaths::for_project(root);
    let ledger = Arc::new(Ledger::open(&paths.ledger).unwrap());
    let store = TrustStore::open(
        &paths.scores_dir,
        Arc::new(TrustConfig::default()),
        ledger.clone(),
    )
    .unwrap();
    Engine { store, ledger }
}

#[test]
fn email_send_walkthrough() {
    let dir = tempdir().unwrap();
    let engine = open_engine(dir.path());
    let store = &engine.store;

    let start = store.get_score("email.send").unwrap();
    assert!(!start.is_observed());
    assert_eq!(start.score().value, 50.0);
    assert_eq!(start.score().state, TrustState::Learning);

    for _ in 0..5 {
        store
            .record_event(&Event::success("email.send", Impact::Medium))
            .unwrap();
    }
    let score = store.get_score("email.send").unwrap().into_score();
    assert_eq!(score.value, 60.0);
    assert_eq!(score.state, TrustState::Learning);
    assert_eq!(
        store.autonomy_level("email.send", 0.7).unwrap(),
        ActionMode::Supervised
    );

    for _ in 0..3 {
        store
            .record_event(&Event::failure("email.send", Impact::High))
            .unwrap();
    }
    let score = store.get_score("email.send").unwrap().into_score();
    assert_eq!(score.value, 30.0);
    assert_eq!(score.state, TrustState::Probation);
    assert_eq!(
        store.autonomy_level("email.send", 0.95).unwrap(),
        ActionMode::Suggest
    );
    assert!(store.recovery_path("email.send").unwrap().is_none());

    store
        .record_event(&Event::failure("email.send", Impact::High))
        .unwrap();
    let score = store.get_score("email.send").unwrap().into_score();
    assert_eq!(score.value, 20.0);
    assert_eq!(score.state, TrustState::Restricted);
    let path = store.recovery_path("email.send").unwrap().unwrap();
    assert_eq!(path.target_score, 50.0);
    assert_eq!(path.current_score, 20.0);
    assert!(!path.steps.is_empty());

    // One ledger entry per event, chain intact.
    assert_eq!(engine.ledger.len().unwrap(), 9);
    let report = engine.ledger.verify_chain(&VerifyControl::new()).unwrap();
    assert_eq!(report.entries, 9);
}

#[test]
fn failure_outweighs_equal_success() {
    let dir = tempdir().unwrap();
    let engine = open_engine(dir.path());
    engine
        .store
        .record_event(&Event::success("calendar.write", Impact::High))
        .unwrap();
    let after = engine
        .store
        .record_event(&Event::failure("calendar.write", Impact::High))
        .unwrap();
    assert!(after.value < 50.0);
}

#[test]
fn invariants_hold_over_mixed_sequences() {
    let dir = tempdir().unwrap();
    let engine = open_engine(dir.path());
    let config = TrustConfig::default();
    let outcomes = [Outcome::Success, Outcome::Failure, Outcome::Partial];
    let impacts = [Impact::Low, Impact::Medium, Impact::High];

    let mut last_count = 0;
    for i in 0..120 {
        let event = Event::new(
            "files.organize",
            outcomes[(i * 7) % 3],
            impacts[(i * 5 + i / 3) % 3],
        );
        let score = engine.store.record_event(&event).unwrap();
        assert!((0.0..=100.0).contains(&score.value));
        assert_eq!(score.state, config.thresholds.state_for(score.value));
        assert!(score.action_count > last_count);
        last_count = score.action_count;
    }
    engine.ledger.verify_chain(&VerifyControl::new()).unwrap();
}

/// Ledger double that can be switched to fail every append.
struct FlakyLedger {
    inner: Ledger,
    failing: AtomicBool,
}

impl LedgerRecorder for FlakyLedger {
    fn append(&self, entry: NewEntry) -> Result<LedgerEntry, LedgerError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(LedgerError::Io(std::io::Error::other("disk full")));
        }
        self.inner.append(entry)
    }

    fn verify_chain(&self, control: &VerifyControl) -> Result<VerifyReport, LedgerError> {
        self.inner.verify_chain(control)
    }

    fn entries(&self) -> Result<Vec<LedgerEntry>, LedgerError> {
        self.inner.entries()
    }
}

#[test]
fn failed_ledger_append_leaves_score_untouched() {
    let dir = tempdir().unwrap();
    let ledger = Arc::new(FlakyLedger {
        inner: Ledger::open(dir.path().join("ledger.jsonl")).unwrap(),
        failing: AtomicBool::new(false),
    });
    let store = TrustStore::open(
        dir.path().join("scores"),
        Arc::new(TrustConfig::default()),
        ledger.clone(),
    )
    .unwrap();

    store
        .record_event(&Event::success("email.send", Impact::Medium))
        .unwrap();
    ledger.failing.store(true, Ordering::SeqCst);

    let err = store
        .record_event(&Event::failure("email.send", Impact::High))
        .unwrap_err();
    assert!(matches!(err, TrustError::Ledger(_)));
    // A domain that never committed stays unobserved.
    assert!(store
        .record_event(&Event::success("finance.transfer", Impact::Low))
        .is_err());
    assert!(!store.get_score("finance.transfer").unwrap().is_observed());

    let score = store.get_score("email.send").unwrap().into_score();
    assert_eq!(score.value, 52.0);
    assert_eq!(score.action_count, 1);

    // Nothing leaked to disk either.
    drop(store);
    ledger.failing.store(false, Ordering::SeqCst);
    let reopened = TrustStore::open(
        dir.path().join("scores"),
        Arc::new(TrustConfig::default()),
        ledger.clone(),
    )
    .unwrap();
    assert_eq!(reopened.get_all_scores().unwrap().len(), 1);
    assert_eq!(
        reopened.get_score("email.send").unwrap().score().value,
        52.0
    );
}

#[test]
fn concurrent_domains_and_one_hot_domain() {
    let dir = tempdir().unwrap();
    let engine = Arc::new(open_engine(dir.path()));

    let handles: Vec<_> = (0..4)
        .map(|t| {
            let engine = Arc::clone(&engine);
            thread::spawn(move || {
                let own = format!("domain-{t}");
                for _ in 0..10 {
                    engine
                        .store
                        .record_event(&Event::success(own.as_str(), Impact::Low))
                        .unwrap();
                    engine
                        .store
                        .record_event(&Event::success("shared.hot", Impact::Low))
                        .unwrap();
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    let scores = engine.store.get_all_scores().unwrap();
    assert_eq!(scores.len(), 5);
    for t in 0..4 {
        assert_eq!(scores[&format!("domain-{t}")].value, 55.0);
    }
    let hot = &scores["shared.hot"];
    assert_eq!(hot.action_count, 40);
    assert_eq!(hot.value, 90.0);

    let report = engine.ledger.verify_chain(&VerifyControl::new()).unwrap();
    assert_eq!(report.entries, 80);
}

#[test]
fn decay_tick_covers_domains_and_mesh() {
    let dir = tempdir().unwrap();
    let paths = EnginePaths::for_project(dir.path());
    let config = Arc::new(TrustConfig::default());
    let ledger = Arc::new(Ledger::open(&paths.ledger).unwrap());
    let store = Arc::new(TrustStore::open(&paths.scores_dir, config.clone(), ledger.clone()).unwrap());
    let mesh = Arc::new(MeshTrust::open(&paths.mesh_dir, config, ledger.clone()).unwrap());

    let t0 = Utc::now();
    for _ in 0..20 {
        store
            .record_event_at(&Event::success("email.send", Impact::Medium), t0)
            .unwrap();
    }
    store
        .record_event_at(&Event::success("calendar.write", Impact::Low), t0 + Duration::days(20))
        .unwrap();
    mesh.record_event_at("home", "scheduler", &Event::success("email.send", Impact::High), t0)
        .unwrap();

    let scheduler = DecayScheduler::new()
        .with_target(store.clone())
        .with_target(mesh.clone());
    let summary = scheduler.run_once_at(t0 + Duration::days(22)).unwrap();
    assert_eq!(summary.examined, 3);
    // calendar.write is still fresh.
    assert_eq!(summary.decayed, 2);
    assert_eq!(summary.failed, 0);

    // 90 → 3 periods of 1% toward 50, capped at Trusted's floor of 75.
    let email = store.get_score("email.send").unwrap().into_score();
    assert!(email.value < 90.0 && email.value >= 75.0);
    // Peer trust drifts back toward the mesh starting value of 0.
    let peer = mesh.get_score("home", "scheduler", "email.send").unwrap();
    assert!(peer.score.value < 4.0 && peer.score.value > 0.0);

    // Running the same tick again applies nothing new.
    let again = scheduler.run_once_at(t0 + Duration::days(22)).unwrap();
    assert_eq!(again.decayed, 0);

    let history = ledger.entity_history("trust_domain", "email.send").unwrap();
    assert_eq!(history.last().unwrap().action, "trust.decayed");
    ledger.verify_chain(&VerifyControl::new()).unwrap();
}

#[test]
fn uneven_decayed_values_verify_after_reopen() {
    let dir = tempdir().unwrap();
    let t0 = Utc::now();
    let domains: Vec<String> = (0..20).map(|i| format!("domain-{i}")).collect();

    let before = {
        let engine = open_engine(dir.path());
        for (i, domain) in domains.iter().enumerate() {
            for n in 0..(i % 7 + 1) {
                let event = match (i + n) % 5 {
                    0 => Event::failure(domain.as_str(), Impact::Low),
                    1 => Event::new(domain.as_str(), Outcome::Partial, Impact::High),
                    2 => Event::success(domain.as_str(), Impact::High),
                    _ => Event::success(domain.as_str(), Impact::Medium),
                };
                engine.store.record_event_at(&event, t0).unwrap();
            }
        }
        for tick in 1..=20 {
            let now = t0 + Duration::days(8 * tick);
            for domain in &domains {
                engine.store.apply_decay_at(domain, now).unwrap();
            }
        }
        engine.ledger.verify_chain(&VerifyControl::new()).unwrap();
        engine.store.get_all_scores().unwrap()
    };
    assert!(before.values().any(|s| s.value.fract() != 0.0));

    let engine = open_engine(dir.path());
    let report = engine.ledger.verify_chain(&VerifyControl::new()).unwrap();
    assert!(report.entries > 100);
    assert_eq!(engine.store.get_all_scores().unwrap(), before);
}

#[test]
fn second_engine_on_one_state_directory_is_refused() {
    let dir = tempdir().unwrap();
    let paths = EnginePaths::for_project(dir.path());

    let owner = open_engine(dir.path());
    for _ in 0..15 {
        owner
            .store
            .record_event(&Event::success("email.send", Impact::Medium))
            .unwrap();
    }
    assert!(matches!(
        Ledger::open(&paths.ledger),
        Err(LedgerError::Locked { .. })
    ));
    drop(owner);

    // Once the owner is gone the next engine sees every committed change.
    let next = open_engine(dir.path());
    assert_eq!(
        next.store.get_score("email.send").unwrap().score().value,
        80.0
    );
    next.store
        .record_event(&Event::failure("email.send", Impact::High))
        .unwrap();
    drop(next);

    let reopened = open_engine(dir.path());
    let score = reopened.store.get_score("email.send").unwrap().into_score();
    assert_eq!(score.value, 70.0);
    assert_eq!(score.action_count, 16);
    assert_eq!(
        reopened
            .ledger
            .verify_chain(&VerifyControl::new())
            .unwrap()
            .entries,
        16
    );
}
