//! Encryption at rest for any record backend.
//!
//! Blob layout: `magic(4) | version(1) | salt(16) | nonce(12) | ciphertext`.
//! The key is derived from the passphrase with Argon2id over the per-write
//! salt, so every write produces an unrelated blob.

use argon2::Argon2;
use chacha20poly1305::aead::{Aead, KeyInit};
use chacha20poly1305::{ChaCha20Poly1305, Key, Nonce};
use rand::RngCore;

use crate::auth::StorageError;

use super::RecordBackend;

const MAGIC: &[u8; 4] = b"SGSR";
const VERSION: u8 = 1;
const SALT_LEN: usize = 16;
const NONCE_LEN: usize = 12;
const KEY_LEN: usize = 32;
const HEADER_LEN: usize = MAGIC.len() + 1 + SALT_LEN + NONCE_LEN;

pub struct SealedBackend<B> {
    inner: B,
    passphrase: Vec<u8>,
}

impl<B: RecordBackend> SealedBackend<B> {
    pub fn new(inner: B, passphrase: impl AsRef<[u8]>) -> Self {
        Self {
            inner,
            passphrase: passphrase.as_ref().to_vec(),
        }
    }

    pub fn inner(&self) -> &B {
        &self.inner
    }

    fn derive_key(&self, salt: &[u8]) -> Result<[u8; KEY_LEN], StorageError> {
        let mut key = [0u8; KEY_LEN];
        Argon2::default()
            .hash_password_into(&self.passphrase, salt, &mut key)
            .map_err(|_| StorageError::Sealed("key derivation failed"))?;
        Ok(key)
    }

    fn seal(&self, plaintext: &[u8]) -> Result<Vec<u8>, StorageError> {
        let mut rng = rand::thread_rng();
        let mut salt = [0u8; SALT_LEN];
        let mut nonce = [0u8; NONCE_LEN];
        rng.fill_bytes(&mut salt);
        rng.fill_bytes(&mut nonce);

        let key = self.derive_key(&salt)?;
        let cipher = ChaCha20Poly1305::new(Key::from_slice(&key));
        let ciphertext = cipher
            .encrypt(Nonce::from_slice(&nonce), plaintext)
            .map_err(|_| StorageError::Sealed("encryption failed"))?;

        let mut blob = Vec::with_capacity(HEADER_LEN + ciphertext.len());
        blob.extend_from_slice(MAGIC);
        blob.push(VERSION);
        blob.extend_from_slice(&salt);
        blob.extend_from_slice(&nonce);
        blob.extend_from_slice(&ciphertext);
        Ok(blob)
    }

    fn open(&self, blob: &[u8]) -> Result<Vec<u8>, StorageError> {
        if blob.len() < HEADER_LEN || &blob[..MAGIC.len()] != MAGIC {
            return Err(StorageError::Sealed("not a sealed session record"));
        }
        if blob[MAGIC.len()] != VERSION {
            return Err(StorageError::Sealed("unsupported sealed record version"));
        }
        let salt_start = MAGIC.len() + 1;
        let nonce_start = salt_start + SALT_LEN;
        let salt = &blob[salt_start..nonce_start];
        let nonce = &blob[nonce_start..HEADER_LEN];

        let key = self.derive_key(salt)?;
        let cipher = ChaCha20Poly1305::new(Key::from_slice(&key));
        cipher
            .decrypt(Nonce::from_slice(nonce), &blob[HEADER_LEN..])
            .map_err(|_| StorageError::Undecryptable)
    }
}

impl<B: RecordBackend> RecordBackend for SealedBackend<B> {
    fn load(&self) -> Result<Option<Vec<u8>>, StorageError> {
        match self.inner.load()? {
            Some(blob) => self.open(&blob).map(Some),
            None => Ok(None),
        }
    }

    fn store(&self, bytes: &[u8]) -> Result<(), StorageError> {
        let blob = self.seal(bytes)?;
        self.inner.store(&blob)
    }

    fn erase(&self) -> Result<(), StorageError> {
        self.inner.erase()
    }

    fn describe(&self) -> String {
        format!("sealed({})", self.inner.describe())
    }
}
