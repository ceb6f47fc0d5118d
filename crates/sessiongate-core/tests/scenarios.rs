//! End-to-end session lifecycle scenarios.

use std::sync::Arc;

use chrono::Duration;
use sessiongate_core::auth::{
    Clock, CredentialStore, Gate, ManualClock, PresenceCheck, PresenceOutcome, PresenceRequest,
    Route, SessionGate, SessionManager, SessionRecord,
};
use sessiongate_core::storage::{FileBackend, MemoryBackend, SealedBackend};

const NOW: i64 = 1_700_000_000_000;

struct AlwaysSucceeds;

impl PresenceCheck for AlwaysSucceeds {
    fn verify(&self, _request: &PresenceRequest) -> PresenceOutcome {
        PresenceOutcome::Success
    }
}

fn record(expires_at: i64) -> SessionRecord {
    SessionRecord::new("t1", "u1", "a@b.ch", None, expires_at)
}

#[test]
fn test_scenario_a_session_expires_with_clock() {
    let clock = ManualClock::new(NOW);
    let store = CredentialStore::with_clock(MemoryBackend::new(), Arc::new(clock.clone()));

    store.save(&record(clock.now_millis() + 3_600_000)).unwrap();
    assert!(store.is_logged_in());

    clock.advance(Duration::hours(2));
    assert!(!store.is_logged_in());
    assert!(store.read().is_none());
}

#[test]
fn test_scenario_b_no_expiry_lives_forever() {
    let clock = ManualClock::new(NOW);
    let store = CredentialStore::with_clock(MemoryBackend::new(), Arc::new(clock.clone()));
    store.save(&record(0)).unwrap();

    for _ in 0..5 {
        clock.advance(Duration::days(3650));
        assert!(store.is_logged_in());
        assert!(!store.is_expiring_soon(Duration::days(1)));
        assert!(!store.is_expiring_soon(Duration::days(100_000)));
    }
}

#[test]
fn test_scenario_c_gate_relocks_after_teardown() {
    let backend = MemoryBackend::new();
    let clock = Arc::new(ManualClock::new(NOW));

    // Earlier run left a valid session behind
    CredentialStore::with_clock(backend.clone(), clock.clone())
        .save(&record(NOW + 3_600_000))
        .unwrap();

    // Fresh process
    let gate = Arc::new(SessionGate::new());
    let manager = SessionManager::new(
        CredentialStore::with_clock(backend.clone(), clock.clone()),
        gate.clone(),
    );
    assert!(!gate.is_unlocked());
    assert_eq!(manager.start(), Route::PresenceCheck);

    manager
        .unlock(&AlwaysSucceeds, &PresenceRequest::unlock("app"))
        .unwrap();
    assert_eq!(manager.route(), Route::Unlocked);

    manager.on_teardown();
    assert!(!gate.is_unlocked());
    assert!(manager.store().is_logged_in());
}

#[test]
fn test_scenario_d_clear_drops_header() {
    let store = CredentialStore::new(MemoryBackend::new());
    store.save(&record(0)).unwrap();
    store.clear();
    assert!(!store.is_logged_in());
    assert!(store.bearer_header_value().is_none());
}

#[test]
fn test_gate_never_opens_from_store_operations() {
    let clock = ManualClock::new(NOW);
    let gate = Arc::new(SessionGate::new());
    let manager = SessionManager::new(
        CredentialStore::with_clock(MemoryBackend::new(), Arc::new(clock.clone())),
        gate.clone(),
    );
    let store = manager.store();

    store.save(&record(NOW + 1_000)).unwrap();
    assert!(!gate.is_unlocked());
    store.read();
    store.is_logged_in();
    store.is_expiring_soon(Duration::hours(24));
    store.bearer_header_value();
    store.save(&record(0)).unwrap();
    clock.advance(Duration::hours(1));
    store.is_logged_in();
    store.clear();
    store.clear();
    assert!(!gate.is_unlocked());
}

#[test]
fn test_sealed_file_survives_restart() {
    let temp = tempfile::tempdir().expect("tempdir");
    let saved = SessionRecord::new("t1", "u1", "a@b.ch", Some("Ada".to_string()), 0);

    {
        let store = CredentialStore::new(SealedBackend::new(FileBackend::in_dir(temp.path()), "pw"));
        store.save(&saved).unwrap();
    }

    let store = CredentialStore::new(SealedBackend::new(FileBackend::in_dir(temp.path()), "pw"));
    assert_eq!(store.read(), Some(saved.clone()));

    // A mistyped passphrase reads as logged out but keeps the file
    let wrong = CredentialStore::new(SealedBackend::new(FileBackend::in_dir(temp.path()), "nope"));
    assert!(!wrong.is_logged_in());
    assert!(wrong.read().is_none());
    assert!(temp.path().join("session.json").exists());

    let again = CredentialStore::new(SealedBackend::new(FileBackend::in_dir(temp.path()), "pw"));
    assert_eq!(again.read(), Some(saved));
}
