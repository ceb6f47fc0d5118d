//! Session lifecycle coordinator.
//!
//! `SessionManager` is built once at startup and wires the credential store
//! to the process-wide gate. Lifecycle events map to explicit calls:
//! - process start: `start()`
//! - login / registration: `establish()` or `complete_auth()`
//! - local presence check: `unlock()`
//! - logout or a 401 from any endpoint: `logout()` / `invalidate()`
//! - top-level UI torn down: `on_teardown()`

use std::sync::Arc;

use chrono::Duration;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::credentials::CredentialStore;
use super::error::SessionError;
use super::expiry::DEFAULT_EXPIRING_WINDOW;
use super::gate::{Gate, SessionGate};
use super::presence::{PresenceCheck, PresenceOutcome, PresenceRequest};
use super::record::SessionRecord;
use crate::api::{ApiError, AuthResponse};

/// When the gate re-locks besides logout and credential loss.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LockPolicy {
    /// Only when the top-level UI is destroyed.
    #[default]
    TeardownOnly,
    /// Also whenever the app goes to the background.
    Background,
}

/// Where the UI should send the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    /// No usable session: show login/registration.
    Welcome,
    /// Session saved but presence not yet confirmed this run.
    PresenceCheck,
    /// Protected views are reachable.
    Unlocked,
}

pub struct SessionManager {
    store: CredentialStore,
    gate: Arc<SessionGate>,
    policy: LockPolicy,
    refresh_window: Duration,
}

impl SessionManager {
    pub fn new(store: CredentialStore, gate: Arc<SessionGate>) -> Self {
        let linked: Arc<dyn Gate> = gate.clone();
        Self {
            store: store.link_gate(linked),
            gate,
            policy: LockPolicy::default(),
            refresh_window: DEFAULT_EXPIRING_WINDOW,
        }
    }

    pub fn with_policy(mut self, policy: LockPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_refresh_window(mut self, window: Duration) -> Self {
        self.refresh_window = window;
        self
    }

    pub fn store(&self) -> &CredentialStore {
        &self.store
    }

    pub fn gate(&self) -> &Arc<SessionGate> {
        &self.gate
    }

    pub fn policy(&self) -> LockPolicy {
        self.policy
    }

    // ===== Lifecycle =====

    /// Called once per process start.
    pub fn start(&self) -> Route {
        self.gate.reset();
        let route = self.route();
        info!(?route, backend = %self.store.describe(), "Session restored");
        route
    }

    pub fn route(&self) -> Route {
        if !self.store.is_logged_in() {
            Route::Welcome
        } else if self.gate.is_unlocked() {
            Route::Unlocked
        } else {
            Route::PresenceCheck
        }
    }

    /// Run the local presence check and open the gate on success.
    ///
    /// Never prompts without a usable session. If the gate is already open
    /// it is left alone, the session having just been checked for liveness.
    pub fn unlock(
        &self,
        provider: &dyn PresenceCheck,
        request: &PresenceRequest,
    ) -> Result<(), SessionError> {
        if !self.store.is_logged_in() {
            return Err(SessionError::NotLoggedIn);
        }
        if self.gate.is_unlocked() {
            return Ok(());
        }

        match Self::check_presence(provider, request) {
            PresenceOutcome::Success => {
                // The session may have expired or been cleared while the
                // prompt was open.
                if !self.store.unlock_gate_if_live(self.gate.as_ref()) {
                    return Err(SessionError::NotLoggedIn);
                }
                info!("Session unlocked");
                Ok(())
            }
            denied => {
                debug!(outcome = ?denied, "Presence check denied");
                Err(SessionError::LocalPresenceDenied(denied))
            }
        }
    }

    /// Ask for presence before a sensitive action. Prompts even when the gate
    /// is already open and never changes the gate.
    pub fn confirm(
        &self,
        provider: &dyn PresenceCheck,
        request: &PresenceRequest,
    ) -> Result<(), SessionError> {
        if !self.store.is_logged_in() {
            return Err(SessionError::NotLoggedIn);
        }
        match Self::check_presence(provider, request) {
            PresenceOutcome::Success => {
                debug!(action = %request.subtitle, "Action confirmed");
                Ok(())
            }
            denied => {
                debug!(outcome = ?denied, "Action not confirmed");
                Err(SessionError::LocalPresenceDenied(denied))
            }
        }
    }

    fn check_presence(provider: &dyn PresenceCheck, request: &PresenceRequest) -> PresenceOutcome {
        let capability = provider.capability();
        if capability.is_available() {
            provider.verify(request)
        } else {
            debug!(?capability, "Presence check not available");
            PresenceOutcome::Unavailable
        }
    }

    /// Persist a freshly authenticated session.
    pub fn establish(&self, record: &SessionRecord) -> Result<(), SessionError> {
        self.store.save(record)?;
        info!(user_id = %record.user_id, email = %record.email, "Session established");
        Ok(())
    }

    /// Persist the session returned by login or registration.
    pub fn complete_auth(&self, response: &AuthResponse) -> Result<SessionRecord, SessionError> {
        let record = response.to_record(self.store.now_millis());
        self.establish(&record)?;
        Ok(record)
    }

    pub fn logout(&self) {
        self.store.clear();
        self.gate.reset();
        info!("Logged out");
    }

    /// The backend rejected the token.
    pub fn invalidate(&self) {
        self.store.clear();
        self.gate.reset();
        info!("Session invalidated by server");
    }

    /// Drop the session if `err` says the token is no longer accepted.
    /// Returns true when the session was invalidated.
    pub fn handle_api_error(&self, err: &ApiError) -> bool {
        if err.is_unauthorized() {
            self.invalidate();
            true
        } else {
            false
        }
    }

    pub fn on_teardown(&self) {
        self.gate.reset();
    }

    pub fn on_background(&self) {
        if self.policy == LockPolicy::Background {
            self.gate.reset();
        }
    }

    // ===== Accessors =====

    pub fn bearer_header(&self) -> Option<String> {
        self.store.bearer_header_value()
    }

    pub fn current(&self) -> Option<SessionRecord> {
        self.store.read()
    }

    /// Whether the token should be refreshed before it lapses.
    pub fn needs_refresh(&self) -> bool {
        self.store.is_expiring_soon(self.refresh_window)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::User;
    use crate::auth::expiry::ManualClock;
    use crate::storage::MemoryBackend;

    const NOW: i64 = 1_700_000_000_000;

    struct Fixed(PresenceOutcome);

    impl PresenceCheck for Fixed {
        fn verify(&self, _request: &PresenceRequest) -> PresenceOutcome {
            self.0
        }
    }

    struct Panicking;

    impl PresenceCheck for Panicking {
        fn verify(&self, _request: &PresenceRequest) -> PresenceOutcome {
            panic!("must not prompt");
        }
    }

    fn new_manager() -> (SessionManager, ManualClock) {
        let clock = ManualClock::new(NOW);
        let store = CredentialStore::with_clock(MemoryBackend::new(), Arc::new(clock.clone()));
        (SessionManager::new(store, Arc::new(SessionGate::new())), clock)
    }

    fn record() -> SessionRecord {
        SessionRecord::new("t1", "u1", "a@b.ch", None, NOW + 3_600_000)
    }

    fn request() -> PresenceRequest {
        PresenceRequest::unlock("app")
    }

    #[test]
    fn test_start_routes() {
        let (manager, _) = new_manager();
        assert_eq!(manager.start(), Route::Welcome);
        manager.establish(&record()).unwrap();
        assert_eq!(manager.start(), Route::PresenceCheck);
    }

    #[test]
    fn test_unlock_requires_session() {
        let (manager, _) = new_manager();
        let err = manager.unlock(&Panicking, &request()).unwrap_err();
        assert!(matches!(err, SessionError::NotLoggedIn));
        assert!(!manager.gate().is_unlocked());
    }

    #[test]
    fn test_unlock_success_then_teardown() {
        let (manager, _) = new_manager();
        manager.establish(&record()).unwrap();
        manager.unlock(&Fixed(PresenceOutcome::Success), &request()).unwrap();
        assert_eq!(manager.route(), Route::Unlocked);

        // Already open: no second prompt
        manager.unlock(&Panicking, &request()).unwrap();

        manager.on_teardown();
        assert_eq!(manager.route(), Route::PresenceCheck);
        assert!(manager.store().is_logged_in());
    }

    #[test]
    fn test_denied_outcomes_keep_gate_locked() {
        let (manager, _) = new_manager();
        manager.establish(&record()).unwrap();
        for outcome in [
            PresenceOutcome::Cancelled,
            PresenceOutcome::Failed,
            PresenceOutcome::LockedOut,
            PresenceOutcome::Unavailable,
        ] {
            let err = manager.unlock(&Fixed(outcome), &request()).unwrap_err();
            assert!(matches!(err, SessionError::LocalPresenceDenied(o) if o == outcome));
            assert!(!manager.gate().is_unlocked());
        }
    }

    #[test]
    fn test_unavailable_capability_skips_prompt() {
        struct NoHardware;
        impl PresenceCheck for NoHardware {
            fn capability(&self) -> crate::auth::PresenceCapability {
                crate::auth::PresenceCapability::NoHardware
            }
            fn verify(&self, _request: &PresenceRequest) -> PresenceOutcome {
                panic!("must not prompt");
            }
        }

        let (manager, _) = new_manager();
        manager.establish(&record()).unwrap();
        let err = manager.unlock(&NoHardware, &request()).unwrap_err();
        assert!(matches!(
            err,
            SessionError::LocalPresenceDenied(PresenceOutcome::Unavailable)
        ));
    }

    #[test]
    fn test_confirm_prompts_even_when_unlocked() {
        struct Counting(std::sync::atomic::AtomicU32);
        impl PresenceCheck for Counting {
            fn verify(&self, _request: &PresenceRequest) -> PresenceOutcome {
                self.0.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
                PresenceOutcome::Success
            }
        }

        let (manager, _) = new_manager();
        manager.establish(&record()).unwrap();
        let counting = Counting(Default::default());
        manager.unlock(&counting, &request()).unwrap();

        let confirm = PresenceRequest::confirm_action("delete your account");
        manager.confirm(&counting, &confirm).unwrap();
        manager.confirm(&counting, &confirm).unwrap();
        assert_eq!(counting.0.load(std::sync::atomic::Ordering::SeqCst), 3);
        assert!(manager.gate().is_unlocked());
    }

    #[test]
    fn test_confirm_denied_or_without_session() {
        let (manager, _) = new_manager();
        let confirm = PresenceRequest::confirm_action("change your password");
        assert!(matches!(
            manager.confirm(&Panicking, &confirm),
            Err(SessionError::NotLoggedIn)
        ));

        manager.establish(&record()).unwrap();
        let err = manager
            .confirm(&Fixed(PresenceOutcome::Cancelled), &confirm)
            .unwrap_err();
        assert!(matches!(
            err,
            SessionError::LocalPresenceDenied(PresenceOutcome::Cancelled)
        ));
        assert!(!manager.gate().is_unlocked());
    }

    #[test]
    fn test_background_policy() {
        let (manager, _) = new_manager();
        manager.establish(&record()).unwrap();
        manager.unlock(&Fixed(PresenceOutcome::Success), &request()).unwrap();
        manager.on_background();
        assert!(manager.gate().is_unlocked());

        let (manager, _) = new_manager();
        let manager = manager.with_policy(LockPolicy::Background);
        manager.establish(&record()).unwrap();
        manager.unlock(&Fixed(PresenceOutcome::Success), &request()).unwrap();
        manager.on_background();
        assert!(!manager.gate().is_unlocked());
    }

    #[test]
    fn test_logout_and_invalidate_lock() {
        let (manager, _) = new_manager();
        manager.establish(&record()).unwrap();
        manager.unlock(&Fixed(PresenceOutcome::Success), &request()).unwrap();
        manager.logout();
        assert_eq!(manager.route(), Route::Welcome);
        assert!(manager.bearer_header().is_none());

        manager.establish(&record()).unwrap();
        manager.unlock(&Fixed(PresenceOutcome::Success), &request()).unwrap();
        assert!(manager.handle_api_error(&ApiError::Unauthorized));
        assert!(!manager.gate().is_unlocked());
        assert!(manager.current().is_none());
    }

    #[test]
    fn test_other_api_errors_keep_session() {
        let (manager, _) = new_manager();
        manager.establish(&record()).unwrap();
        assert!(!manager.handle_api_error(&ApiError::RateLimited));
        assert!(manager.store().is_logged_in());
    }

    #[test]
    fn test_complete_auth_parses_expiry() {
        let (manager, _) = new_manager();
        let response = AuthResponse {
            token: "jwt".to_string(),
            user: User {
                id: "42".to_string(),
                email: "a@b.ch".to_string(),
                full_name: Some("Ada".to_string()),
                created_at: None,
                email_verified: false,
            },
            expires_at: Some("2023-11-15T00:00:00".to_string()),
        };
        let record = manager.complete_auth(&response).unwrap();
        assert_eq!(record.user_id, "42");
        assert_eq!(record.display_name.as_deref(), Some("Ada"));
        assert_eq!(record.expires_at, 1_700_006_400_000);
        assert_eq!(manager.bearer_header().as_deref(), Some("Bearer jwt"));
    }

    #[test]
    fn test_needs_refresh_uses_window() {
        let (manager, clock) = new_manager();
        let manager = manager.with_refresh_window(Duration::minutes(30));
        manager.establish(&record()).unwrap();
        assert!(!manager.needs_refresh());
        clock.advance(Duration::minutes(31));
        assert!(manager.needs_refresh());
    }

    #[test]
    fn test_unlock_racing_logout_never_opens_without_session() {
        let (manager, _) = new_manager();
        let success = Fixed(PresenceOutcome::Success);

        for _ in 0..500 {
            manager.establish(&record()).unwrap();
            assert!(!manager.gate().is_unlocked());

            std::thread::scope(|s| {
                s.spawn(|| {
                    let _ = manager.unlock(&success, &request());
                });
                s.spawn(|| manager.logout());
            });

            assert!(manager.current().is_none());
            assert!(!manager.gate().is_unlocked());
        }
    }

    #[test]
    fn test_session_expiring_during_prompt_is_not_unlocked() {
        struct SlowPrompt(ManualClock);
        impl PresenceCheck for SlowPrompt {
            fn verify(&self, _request: &PresenceRequest) -> PresenceOutcome {
                self.0.advance(Duration::hours(2));
                PresenceOutcome::Success
            }
        }

        let (manager, clock) = new_manager();
        manager.establish(&record()).unwrap();
        let err = manager.unlock(&SlowPrompt(clock), &request()).unwrap_err();
        assert!(matches!(err, SessionError::NotLoggedIn));
        assert!(!manager.gate().is_unlocked());
    }
}
