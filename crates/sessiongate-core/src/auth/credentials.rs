use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::Duration;
use tracing::{debug, warn};

use super::error::SessionError;
use super::expiry::{self, Clock, SystemClock};
use super::gate::Gate;
use super::record::SessionRecord;
use crate::storage::RecordBackend;

/// Single source of truth for "is there a usable saved session".
///
/// Storage faults never escape as errors from the query methods: an
/// unreadable store reads as logged out.
pub struct CredentialStore {
    backend: Box<dyn RecordBackend>,
    clock: Arc<dyn Clock>,
    gate: Option<Arc<dyn Gate>>,
    // Serializes backend access so expiry eviction can't erase a fresh save.
    lock: Mutex<()>,
    storage_fault_reported: AtomicBool,
}

impl CredentialStore {
    pub fn new(backend: impl RecordBackend + 'static) -> Self {
        Self::with_clock(backend, Arc::new(SystemClock))
    }

    pub fn with_clock(backend: impl RecordBackend + 'static, clock: Arc<dyn Clock>) -> Self {
        Self {
            backend: Box::new(backend),
            clock,
            gate: None,
            lock: Mutex::new(()),
            storage_fault_reported: AtomicBool::new(false),
        }
    }

    /// Link a gate that is reset whenever the record goes away or a
    /// different user logs in.
    pub fn link_gate(mut self, gate: Arc<dyn Gate>) -> Self {
        self.gate = Some(gate);
        self
    }

    pub fn now_millis(&self) -> i64 {
        self.clock.now_millis()
    }

    pub fn describe(&self) -> String {
        self.backend.describe()
    }

    // ===== Writes =====

    /// Atomically replace the saved session.
    pub fn save(&self, record: &SessionRecord) -> Result<(), SessionError> {
        record.validate()?;
        let bytes = serde_json::to_vec(record)?;

        let _guard = self.guard();
        let previous_user = self.load_record().ok().flatten().map(|r| r.user_id);

        if let Err(e) = self.backend.store(&bytes) {
            let err = SessionError::from(e);
            self.report_fault(&err);
            self.reset_gate();
            return Err(err);
        }
        debug!(user_id = %record.user_id, expires_at = record.expires_at, "Session saved");

        if previous_user.as_deref() != Some(record.user_id.as_str()) {
            self.reset_gate();
        }
        Ok(())
    }

    /// Delete the saved session. Safe to call when nothing is stored.
    pub fn clear(&self) {
        let _guard = self.guard();
        self.erase_locked();
    }

    // ===== Reads =====

    /// Current record, or `None` if never saved, cleared, unreadable or
    /// expired. Expired and malformed records are erased on the way out.
    pub fn read(&self) -> Option<SessionRecord> {
        let _guard = self.guard();
        self.live_record()
    }

    /// The one check callers use to decide whether the saved session is
    /// still usable.
    pub fn is_logged_in(&self) -> bool {
        self.read().is_some()
    }

    /// Open `gate` if a usable session exists. The check and the gate change
    /// happen under the lock `clear` takes, so a concurrent logout either
    /// lands before (and nothing opens) or after (and resets the gate).
    pub fn unlock_gate_if_live(&self, gate: &dyn Gate) -> bool {
        let _guard = self.guard();
        if self.live_record().is_some() {
            gate.set_unlocked(true);
            true
        } else {
            false
        }
    }

    /// True when a known expiry is closer than `window`. Never mutates.
    pub fn is_expiring_soon(&self, window: Duration) -> bool {
        let _guard = self.guard();
        match self.load_record() {
            Ok(Some(record)) => {
                expiry::is_expiring_soon(record.expires_at, self.clock.now_millis(), window)
            }
            _ => false,
        }
    }

    /// `"Bearer <token>"` for the current session, if any.
    pub fn bearer_header_value(&self) -> Option<String> {
        self.read().map(|r| r.bearer_header_value())
    }

    pub fn token(&self) -> Option<String> {
        self.read().map(|r| r.token)
    }

    pub fn user_id(&self) -> Option<String> {
        self.read().map(|r| r.user_id)
    }

    pub fn email(&self) -> Option<String> {
        self.read().map(|r| r.email)
    }

    pub fn display_name(&self) -> Option<String> {
        self.read().and_then(|r| r.display_name)
    }

    // ===== Internals (caller holds the lock) =====

    fn guard(&self) -> MutexGuard<'_, ()> {
        // The guarded data is `()`, so a poisoned lock carries no broken state.
        self.lock.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn load_record(&self) -> Result<Option<SessionRecord>, SessionError> {
        let Some(bytes) = self.backend.load()? else {
            return Ok(None);
        };
        let record: SessionRecord = serde_json::from_slice(&bytes)?;
        record.validate()?;
        Ok(Some(record))
    }

    fn live_record(&self) -> Option<SessionRecord> {
        match self.load_record() {
            Ok(Some(record)) => {
                let now = self.clock.now_millis();
                if record.is_expired(now) {
                    let err = SessionError::ExpiredSession {
                        expired_at: record.expires_at,
                    };
                    debug!(error = %err, now, "Evicting expired session");
                    self.erase_locked();
                    None
                } else {
                    Some(record)
                }
            }
            Ok(None) => None,
            Err(err @ SessionError::MalformedRecord(_)) => {
                warn!(error = %err, backend = %self.backend.describe(), "Discarding unreadable session record");
                self.erase_locked();
                None
            }
            Err(err) => {
                self.report_fault(&err);
                self.reset_gate();
                None
            }
        }
    }

    fn erase_locked(&self) {
        if let Err(e) = self.backend.erase() {
            self.report_fault(&SessionError::from(e));
        } else {
            debug!("Session cleared");
        }
        self.reset_gate();
    }

    fn reset_gate(&self) {
        if let Some(ref gate) = self.gate {
            gate.reset();
        }
    }

    fn report_fault(&self, err: &SessionError) {
        if !self.storage_fault_reported.swap(true, Ordering::SeqCst) {
            warn!(error = %err, backend = %self.backend.describe(), "Session storage fault, treating as logged out");
        } else {
            debug!(error = %err, "Session storage fault");
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
