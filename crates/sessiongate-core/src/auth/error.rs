use thiserror::Error;

use super::presence::PresenceOutcome;

/// Failures raised by a `RecordBackend`.
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Keychain error: {0}")]
    Keyring(#[from] keyring::Error),

    #[error("Sealed record rejected: {0}")]
    Sealed(&'static str),

    /// Well-formed sealed blob that fails authentication: wrong passphrase
    /// or altered ciphertext. The blob itself is left in place.
    #[error("Sealed record cannot be opened with this passphrase")]
    Undecryptable,

    #[error("Storage lock poisoned")]
    Poisoned,
}

impl StorageError {
    /// Whether the failure means the stored bytes are unusable, as opposed to
    /// the backing store itself being unreachable.
    pub fn is_corruption(&self) -> bool {
        matches!(self, StorageError::Sealed(_))
    }
}

#[derive(Error, Debug)]
pub enum SessionError {
    #[error("Session storage unavailable: {0}")]
    StorageUnavailable(#[source] StorageError),

    #[error("Malformed session record: {0}")]
    MalformedRecord(String),

    #[error("Session expired at {expired_at} (epoch ms)")]
    ExpiredSession { expired_at: i64 },

    #[error("Local presence check did not succeed: {0}")]
    LocalPresenceDenied(PresenceOutcome),

    #[error("No usable session - log in first")]
    NotLoggedIn,
}

impl From<StorageError> for SessionError {
    fn from(err: StorageError) -> Self {
        if err.is_corruption() {
            SessionError::MalformedRecord(err.to_string())
        } else {
            SessionError::StorageUnavailable(err)
        }
    }
}

impl From<serde_json::Error> for SessionError {
    fn from(err: serde_json::Error) -> Self {
        SessionError::MalformedRecord(err.to_string())
    }
}
