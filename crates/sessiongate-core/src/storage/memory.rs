use std::sync::{Arc, Mutex};

use crate::auth::StorageError;

use super::RecordBackend;

/// Keeps the blob in memory. Clones share the same slot, which lets tests
/// simulate a process restart by building a second store over a clone.
#[derive(Debug, Clone, Default)]
pub struct MemoryBackend {
    slot: Arc<Mutex<Option<Vec<u8>>>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Overwrite the raw blob, bypassing the credential store.
    pub fn put_raw(&self, bytes: impl Into<Vec<u8>>) {
        if let Ok(mut slot) = self.slot.lock() {
            *slot = Some(bytes.into());
        }
    }

    pub fn is_empty(&self) -> bool {
        self.slot.lock().map(|slot| slot.is_none()).unwrap_or(true)
    }
}

impl RecordBackend for MemoryBackend {
    fn load(&self) -> Result<Option<Vec<u8>>, StorageError> {
        let slot = self.slot.lock().map_err(|_| StorageError::Poisoned)?;
        Ok(slot.clone())
    }

    fn store(&self, bytes: &[u8]) -> Result<(), StorageError> {
        let mut slot = self.slot.lock().map_err(|_| StorageError::Poisoned)?;
        *slot = Some(bytes.to_vec());
        Ok(())
    }

    fn erase(&self) -> Result<(), StorageError> {
        let mut slot = self.slot.lock().map_err(|_| StorageError::Poisoned)?;
        *slot = None;
        Ok(())
    }

    fn describe(&self) -> String {
        "memory".to_string()
    }
}
