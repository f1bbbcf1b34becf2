//! Secret handling and at-rest encryption.
//!
//! The source this system was distilled from stored keychain chain codes
//! and private keys as "ciphertext" that was, in truth, plaintext with a
//! `// TODO: encrypt` comment. This module is the real thing: a passphrase
//! is stretched into an AEAD key with PBKDF2-HMAC-SHA256, and chain codes /
//! private keys are sealed with AES-256-GCM before they ever reach the
//! store. Plaintext only exists transiently, behind `SecureBytes`, and is
//! zeroized on drop.

use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Key, Nonce};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::error::{Result, VaultError};

const PBKDF2_ROUNDS: u32 = 100_000;
const SALT_LEN: usize = 16;
const NONCE_LEN: usize = 12;

/// A secret byte buffer that zeroizes its contents on drop and is never
/// `Debug`-printed in full.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct SecureBytes(Vec<u8>);

impl SecureBytes {
    pub fn new(bytes: Vec<u8>) -> Self {
        SecureBytes(bytes)
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl std::fmt::Debug for SecureBytes {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "SecureBytes({} bytes, redacted)", self.0.len())
    }
}

impl PartialEq for SecureBytes {
    fn eq(&self, other: &Self) -> bool {
        // Not constant-time: only used in tests to compare recovered
        // plaintext against fixtures, never on attacker-controlled input.
        self.0 == other.0
    }
}

/// Ciphertext plus the salt and nonce needed to open it. Persisted as-is;
/// the lock key that can decrypt it is never stored alongside it.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct Sealed {
    pub salt: [u8; SALT_LEN],
    pub nonce: [u8; NONCE_LEN],
    pub ciphertext: Vec<u8>,
}

fn derive_key(passphrase: &[u8], salt: &[u8; SALT_LEN]) -> [u8; 32] {
    let mut key = [0u8; 32];
    pbkdf2::pbkdf2_hmac::<sha2::Sha256>(passphrase, salt, PBKDF2_ROUNDS, &mut key);
    key
}

/// Seal `plaintext` under `passphrase`. A fresh salt and nonce are drawn
/// from the OS RNG for every call.
pub fn seal(passphrase: &[u8], plaintext: &[u8]) -> Result<Sealed> {
    let mut salt = [0u8; SALT_LEN];
    rand::rngs::OsRng.fill_bytes(&mut salt);
    let mut nonce_bytes = [0u8; NONCE_LEN];
    rand::rngs::OsRng.fill_bytes(&mut nonce_bytes);

    let key_bytes = derive_key(passphrase, &salt);
    let key = Key::<Aes256Gcm>::from_slice(&key_bytes);
    let cipher = Aes256Gcm::new(key);
    let nonce = Nonce::from_slice(&nonce_bytes);

    let ciphertext = cipher
        .encrypt(nonce, plaintext)
        .map_err(|_| VaultError::SerializationError("AEAD seal failed".to_string()))?;

    Ok(Sealed {
        salt,
        nonce: nonce_bytes,
        ciphertext,
    })
}

/// Open a `Sealed` blob with `passphrase`. Fails with `BadPassphrase` on
/// authentication failure (wrong passphrase or corrupted ciphertext) —
/// these are indistinguishable, by design of an AEAD.
pub fn open(passphrase: &[u8], sealed: &Sealed) -> Result<SecureBytes> {
    let key_bytes = derive_key(passphrase, &sealed.salt);
    let key = Key::<Aes256Gcm>::from_slice(&key_bytes);
    let cipher = Aes256Gcm::new(key);
    let nonce = Nonce::from_slice(&sealed.nonce);

    let plaintext = cipher
        .decrypt(nonce, sealed.ciphertext.as_ref())
        .map_err(|_| VaultError::BadPassphrase)?;

    Ok(SecureBytes::new(plaintext))
}

/// Re-seal a plaintext under a new passphrase without ever persisting the
/// intermediate plaintext.
pub fn reseal(old_passphrase: &[u8], new_passphrase: &[u8], sealed: &Sealed) -> Result<Sealed> {
    let plaintext = open(old_passphrase, sealed)?;
    seal(new_passphrase, plaintext.as_slice())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seal_and_open_round_trips() {
        let sealed = seal(b"correct horse battery staple", b"super secret chain code").unwrap();
        let opened = open(b"correct horse battery staple", &sealed).unwrap();
        assert_eq!(opened.as_slice(), b"super secret chain code");
    }

    #[test]
    fn wrong_passphrase_fails() {
        let sealed = seal(b"right", b"secret").unwrap();
        let err = open(b"wrong", &sealed).unwrap_err();
        assert!(matches!(err, VaultError::BadPassphrase));
    }

    #[test]
    fn reseal_changes_passphrase() {
        let sealed = seal(b"old", b"secret").unwrap();
        let resealed = reseal(b"old", b"new", &sealed).unwrap();
        assert!(open(b"old", &resealed).is_err());
        assert_eq!(open(b"new", &resealed).unwrap().as_slice(), b"secret");
    }
}
