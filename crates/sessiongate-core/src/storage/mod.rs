//! Persistence backends for the session record.
//!
//! A backend stores one opaque blob under a single name, so writing or
//! erasing the whole record is one operation. Available backends:
//! - `MemoryBackend`: process memory only
//! - `FileBackend`: a file replaced atomically on every write
//! - `KeyringBackend`: a single OS keychain entry
//! - `SealedBackend`: ChaCha20-Poly1305 encryption around any other backend

pub mod file;
pub mod keychain;
pub mod memory;
pub mod sealed;

pub use self::file::FileBackend;
pub use self::keychain::KeyringBackend;
pub use self::memory::MemoryBackend;
pub use self::sealed::SealedBackend;

use crate::auth::StorageError;

pub trait RecordBackend: Send + Sync {
    /// Returns the stored blob, or `None` if nothing was saved.
    fn load(&self) -> Result<Option<Vec<u8>>, StorageError>;

    /// Replaces the stored blob in a single all-or-nothing write.
    fn store(&self, bytes: &[u8]) -> Result<(), StorageError>;

    /// Removes the stored blob. Erasing nothing is not an error.
    fn erase(&self) -> Result<(), StorageError>;

    /// Short name for diagnostics.
    fn describe(&self) -> String;
}

impl<B: RecordBackend + ?Sized> RecordBackend for Box<B> {
    fn load(&self) -> Result<Option<Vec<u8>>, StorageError> {
        (**self).load()
    }

    fn store(&self, bytes: &[u8]) -> Result<(), StorageError> {
        (**self).store(bytes)
    }

    fn erase(&self) -> Result<(), StorageError> {
        (**self).erase()
    }

    fn describe(&self) -> String {
        (**self).describe()
    }
}
