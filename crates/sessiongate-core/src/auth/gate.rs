//! Process-lifetime "local presence confirmed" flag.
//!
//! The gate is never persisted: every process starts LOCKED, so killing the
//! app always brings the presence check back even when the saved network
//! session is still valid.

use std::fmt;

use tokio::sync::watch;
use tracing::debug;

/// Query/set/reset capability shared by every gate implementation.
pub trait Gate: Send + Sync {
    fn is_unlocked(&self) -> bool;

    fn set_unlocked(&self, value: bool);

    /// Force LOCKED.
    fn reset(&self) {
        self.set_unlocked(false);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateState {
    Locked,
    Unlocked,
}

impl From<bool> for GateState {
    fn from(unlocked: bool) -> Self {
        if unlocked {
            GateState::Unlocked
        } else {
            GateState::Locked
        }
    }
}

impl fmt::Display for GateState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GateState::Locked => f.write_str("locked"),
            GateState::Unlocked => f.write_str("unlocked"),
        }
    }
}

/// Gate backed by a watch channel so UI layers can follow changes.
#[derive(Debug)]
pub struct SessionGate {
    tx: watch::Sender<bool>,
}

impl SessionGate {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self { tx }
    }

    pub fn state(&self) -> GateState {
        self.is_unlocked().into()
    }

    /// Receiver that observes every change of the unlocked flag.
    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.tx.subscribe()
    }
}

impl Default for SessionGate {
    fn default() -> Self {
        Self::new()
    }
}

impl Gate for SessionGate {
    fn is_unlocked(&self) -> bool {
        *self.tx.borrow()
    }

    fn set_unlocked(&self, value: bool) {
        let changed = self.tx.send_if_modified(|current| {
            if *current == value {
                false
            } else {
                *current = value;
                true
            }
        });
        if changed {
            debug!(state = %GateState::from(value), "Session gate changed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_starts_locked() {
        let gate = SessionGate::new();
        assert!(!gate.is_unlocked());
        assert_eq!(gate.state(), GateState::Locked);
    }

    #[test]
    fn test_set_and_reset() {
        let gate = SessionGate::new();
        gate.set_unlocked(true);
        assert_eq!(gate.state(), GateState::Unlocked);
        gate.reset();
        assert!(!gate.is_unlocked());
        gate.reset();
        assert!(!gate.is_unlocked());
    }

    #[test]
    fn test_subscribers_notified_only_on_change() {
        let gate = SessionGate::new();
        let mut rx = gate.subscribe();
        assert!(!rx.has_changed().unwrap());

        gate.set_unlocked(false);
        assert!(!rx.has_changed().unwrap());

        gate.set_unlocked(true);
        assert!(rx.has_changed().unwrap());
        assert!(*rx.borrow_and_update());

        gate.set_unlocked(true);
        assert!(!rx.has_changed().unwrap());

        gate.reset();
        assert!(rx.has_changed().unwrap());
        assert!(!*rx.borrow_and_update());
    }

    #[tokio::test]
    async fn test_subscriber_wakes_on_unlock() {
        let gate = std::sync::Arc::new(SessionGate::new());
        let mut rx = gate.subscribe();
        let writer = std::sync::Arc::clone(&gate);
        tokio::spawn(async move { writer.set_unlocked(true) });
        rx.changed().await.unwrap();
        assert!(*rx.borrow());
    }
}
