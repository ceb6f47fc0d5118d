use keyring::Entry;
use tracing::debug;

use crate::auth::StorageError;

use super::RecordBackend;

/// Keychain service name
pub const SERVICE_NAME: &str = "sessiongate";

/// Keychain account holding the session record
pub const SESSION_ACCOUNT: &str = "session";

/// Stores the whole record as one secret in the OS keychain.
pub struct KeyringBackend {
    entry: Entry,
    service: String,
    account: String,
}

impl KeyringBackend {
    pub fn new(service: &str, account: &str) -> Result<Self, StorageError> {
        let entry = Entry::new(service, account)?;
        Ok(Self {
            entry,
            service: service.to_string(),
            account: account.to_string(),
        })
    }

    /// Backend at the default service/account pair.
    pub fn default_entry() -> Result<Self, StorageError> {
        Self::new(SERVICE_NAME, SESSION_ACCOUNT)
    }
}

impl RecordBackend for KeyringBackend {
    fn load(&self) -> Result<Option<Vec<u8>>, StorageError> {
        match self.entry.get_secret() {
            Ok(secret) => Ok(Some(secret)),
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn store(&self, bytes: &[u8]) -> Result<(), StorageError> {
        self.entry.set_secret(bytes)?;
        debug!(service = %self.service, account = %self.account, "Session stored in keychain");
        Ok(())
    }

    fn erase(&self) -> Result<(), StorageError> {
        match self.entry.delete_credential() {
            Ok(()) | Err(keyring::Error::NoEntry) => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    fn describe(&self) -> String {
        format!("keyring:{}/{}", self.service, self.account)
    }
}
