//! Local-presence checks (biometric prompt, device PIN, ...).
//!
//! The session gate only ever sees a `PresenceOutcome`; the concrete
//! prompt lives behind the `PresenceCheck` trait.

use std::fmt;
use std::sync::atomic::{AtomicU32, Ordering};

use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::Argon2;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Consecutive wrong PINs before the provider locks out for the process.
pub const MAX_PIN_ATTEMPTS: u32 = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PresenceOutcome {
    Success,
    Cancelled,
    Failed,
    LockedOut,
    Unavailable,
}

impl PresenceOutcome {
    pub fn is_success(self) -> bool {
        matches!(self, PresenceOutcome::Success)
    }
}

impl fmt::Display for PresenceOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            PresenceOutcome::Success => "verified",
            PresenceOutcome::Cancelled => "cancelled by user",
            PresenceOutcome::Failed => "not recognized",
            PresenceOutcome::LockedOut => "too many attempts, try again later",
            PresenceOutcome::Unavailable => "no local verification available",
        };
        f.write_str(text)
    }
}

/// What the device can offer before a prompt is shown.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PresenceCapability {
    Available,
    NoHardware,
    HardwareUnavailable,
    NoneEnrolled,
    SecurityUpdateRequired,
    Unsupported,
    Unknown,
}

impl PresenceCapability {
    pub fn is_available(self) -> bool {
        matches!(self, PresenceCapability::Available)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PresenceRequest {
    pub title: String,
    pub subtitle: String,
}

impl PresenceRequest {
    /// Prompt shown when entering the app.
    pub fn unlock(app_name: &str) -> Self {
        Self {
            title: format!("Unlock {}", app_name),
            subtitle: "Authenticate to access your account".to_string(),
        }
    }

    /// Prompt shown before a sensitive action, e.g. "sell 0.5 BTC".
    pub fn confirm_action(description: &str) -> Self {
        Self {
            title: "Confirm".to_string(),
            subtitle: format!("Authenticate to {}", description),
        }
    }
}

pub trait PresenceCheck: Send + Sync {
    fn capability(&self) -> PresenceCapability {
        PresenceCapability::Available
    }

    fn verify(&self, request: &PresenceRequest) -> PresenceOutcome;
}

type PinInput = Box<dyn Fn(&PresenceRequest) -> Option<String> + Send + Sync>;

/// Device-credential style check against an Argon2 PIN hash.
///
/// Each `verify` call is one attempt. The input closure returns `None`
/// when the user backs out of the prompt.
pub struct LocalPin {
    hash: Option<String>,
    input: PinInput,
    failures: AtomicU32,
}

impl LocalPin {
    pub fn new<F>(hash: Option<String>, input: F) -> Self
    where
        F: Fn(&PresenceRequest) -> Option<String> + Send + Sync + 'static,
    {
        Self {
            hash,
            input: Box::new(input),
            failures: AtomicU32::new(0),
        }
    }

    /// Produce a PHC string suitable for `Config::presence_pin_hash`.
    pub fn hash(pin: &str) -> Result<String, argon2::password_hash::Error> {
        let mut salt_bytes = [0u8; 16];
        rand::thread_rng().fill_bytes(&mut salt_bytes);
        let salt = SaltString::encode_b64(&salt_bytes)?;
        Ok(Argon2::default()
            .hash_password(pin.as_bytes(), &salt)?
            .to_string())
    }

    fn matches(hash: &str, pin: &str) -> bool {
        match PasswordHash::new(hash) {
            Ok(parsed) => Argon2::default()
                .verify_password(pin.as_bytes(), &parsed)
                .is_ok(),
            Err(e) => {
                warn!(error = %e, "Stored PIN hash is not a valid PHC string");
                false
            }
        }
    }

    pub fn remaining_attempts(&self) -> u32 {
        MAX_PIN_ATTEMPTS.saturating_sub(self.failures.load(Ordering::SeqCst))
    }
}

impl PresenceCheck for LocalPin {
    fn capability(&self) -> PresenceCapability {
        if self.hash.is_some() {
            PresenceCapability::Available
        } else {
            PresenceCapability::NoneEnrolled
        }
    }

    fn verify(&self, request: &PresenceRequest) -> PresenceOutcome {
        let Some(hash) = self.hash.as_deref() else {
            return PresenceOutcome::Unavailable;
        };
        if self.remaining_attempts() == 0 {
            return PresenceOutcome::LockedOut;
        }
        let Some(pin) = (self.input)(request) else {
            return PresenceOutcome::Cancelled;
        };

        if Self::matches(hash, &pin) {
            self.failures.store(0, Ordering::SeqCst);
            return PresenceOutcome::Success;
        }

        let failures = self.failures.fetch_add(1, Ordering::SeqCst) + 1;
        debug!(failures, "PIN not recognized");
        if failures >= MAX_PIN_ATTEMPTS {
            warn!("PIN locked out for this run");
            PresenceOutcome::LockedOut
        } else {
            PresenceOutcome::Failed
        }
    }
}
