//! Keychains: nodes of the HD tree (`spec.md` §3, §4.2).
//!
//! A `Keychain` is a plain value returned from a store query — it holds a
//! stable row id for its parent (or `None` for a root) rather than a
//! pointer, and children are looked up through the store, never walked
//! in-memory. This is the REDESIGN FLAGS resolution in `spec.md` §9 for
//! the source's cyclic strong-parent/weak-child pointer graph.

use bitcoin::secp256k1::{PublicKey, SecretKey};

use crate::crypto::{self, Sealed, SecureBytes};
use crate::error::{Result, VaultError};
use crate::hd::{self, HDKey};
use crate::store::model::{KeychainRow, RowId};

#[derive(Clone, Debug)]
pub struct Keychain {
    pub id: RowId,
    pub name: String,
    pub depth: u32,
    pub parent_fingerprint: u32,
    pub child_num: u32,
    pub pubkey: PublicKey,
    pub parent_id: Option<RowId>,
    pub derivation_path: Vec<u32>,
    pub hash: [u8; 20],

    chain_code_plain: Option<[u8; 32]>,
    chain_code_sealed: Option<Sealed>,
    privkey_plain: Option<SecretKey>,
    privkey_sealed: Option<Sealed>,
}

impl Keychain {
    pub fn is_root(&self) -> bool {
        self.parent_id.is_none()
    }

    pub fn is_private(&self) -> bool {
        self.privkey_plain.is_some() || self.privkey_sealed.is_some()
    }

    pub fn is_chain_code_locked(&self) -> bool {
        self.chain_code_plain.is_none() && self.chain_code_sealed.is_some()
    }

    pub fn is_private_key_locked(&self) -> bool {
        self.is_private() && self.privkey_plain.is_none()
    }

    /// Create a brand-new root keychain from entropy (BIP32 master key),
    /// sealing its chain code and private key under `lock_key` so that
    /// only ciphertext + salt need ever be persisted.
    pub fn new_root(name: &str, entropy: &[u8], lock_key: &[u8]) -> Result<Keychain> {
        if name.is_empty() || name.starts_with('@') {
            return Err(VaultError::NameInvalid(name.to_string()));
        }
        let master = hd::master_key_from_entropy(entropy)?;
        let hash = hd::keychain_hash(&master.public_key, &master.chain_code);
        let privkey = master.private_key.expect("master key always has a private key");

        Ok(Keychain {
            id: 0,
            name: name.to_string(),
            depth: 0,
            parent_fingerprint: 0,
            child_num: 0,
            pubkey: master.public_key,
            parent_id: None,
            derivation_path: Vec::new(),
            hash,
            chain_code_plain: Some(master.chain_code),
            chain_code_sealed: Some(crypto::seal(lock_key, &master.chain_code)?),
            privkey_plain: Some(privkey),
            privkey_sealed: Some(crypto::seal(lock_key, &privkey[..])?),
        })
    }

    pub fn lock_private_key(&mut self) {
        self.privkey_plain = None;
    }

    pub fn lock_chain_code(&mut self) {
        self.chain_code_plain = None;
    }

    pub fn lock_all(&mut self) {
        self.lock_private_key();
        self.lock_chain_code();
    }

    pub fn unlock_chain_code(&mut self, lock_key: &[u8]) -> Result<()> {
        let sealed = self
            .chain_code_sealed
            .as_ref()
            .ok_or_else(|| VaultError::ChainCodeLocked(self.name.clone()))?;
        let plain = crypto::open(lock_key, sealed)?;
        let mut buf = [0u8; 32];
        buf.copy_from_slice(plain.as_slice());
        self.chain_code_plain = Some(buf);
        Ok(())
    }

    pub fn unlock_private_key(&mut self, lock_key: &[u8]) -> Result<()> {
        if !self.is_private() {
            return Err(VaultError::KeychainPublicOnly(self.name.clone()));
        }
        let sealed = self
            .privkey_sealed
            .as_ref()
            .ok_or_else(|| VaultError::KeyLocked(self.name.clone()))?;
        let plain = crypto::open(lock_key, sealed)?;
        let secret = SecretKey::from_slice(plain.as_slice())
            .map_err(|_| VaultError::SerializationError("corrupt private key".to_string()))?;
        self.privkey_plain = Some(secret);
        Ok(())
    }

    pub fn encrypt(&mut self, lock_key: &[u8]) -> Result<()> {
        if let Some(cc) = self.chain_code_plain {
            self.chain_code_sealed = Some(crypto::seal(lock_key, &cc)?);
        }
        if let Some(pk) = self.privkey_plain {
            self.privkey_sealed = Some(crypto::seal(lock_key, &pk[..])?);
        }
        Ok(())
    }

    pub fn reencrypt(&mut self, old_lock_key: &[u8], new_lock_key: &[u8]) -> Result<()> {
        if let Some(sealed) = &self.chain_code_sealed {
            self.chain_code_sealed = Some(crypto::reseal(old_lock_key, new_lock_key, sealed)?);
        }
        if let Some(sealed) = &self.privkey_sealed {
            self.privkey_sealed = Some(crypto::reseal(old_lock_key, new_lock_key, sealed)?);
        }
        Ok(())
    }

    fn hd_key(&self) -> Result<HDKey> {
        let chain_code = self
            .chain_code_plain
            .ok_or_else(|| VaultError::ChainCodeLocked(self.name.clone()))?;
        Ok(HDKey {
            public_key: self.pubkey,
            chain_code,
            private_key: self.privkey_plain,
        })
    }

    /// Derive the public key used by a signing script at pool index `i`
    /// along `path` (bin index, then script index; `spec.md` §4.4).
    pub fn signing_pubkey(&self, path: &[u32], i: u32) -> Result<PublicKey> {
        let base = hd::derive_path(&self.hd_key()?, path)?;
        let child = hd::derive_public_child(
            &HDKey {
                public_key: base.public_key,
                chain_code: base.chain_code,
                private_key: None,
            },
            i,
        )?;
        Ok(child.public_key)
    }

    /// Derive the private key used by a signing script at pool index `i`
    /// along `path`. Fails with `KeychainPublicOnly`/`KeyLocked` per
    /// `spec.md` §4.2.
    pub fn signing_privkey(&self, path: &[u32], i: u32) -> Result<SecretKey> {
        if !self.is_private() {
            return Err(VaultError::KeychainPublicOnly(self.name.clone()));
        }
        if self.privkey_plain.is_none() {
            return Err(VaultError::KeyLocked(self.name.clone()));
        }
        let base = hd::derive_path(&self.hd_key()?, path)?;
        let child = hd::derive_child(&base, i)?;
        child
            .private_key
            .ok_or_else(|| VaultError::KeyLocked(self.name.clone()))
    }

    /// Serialize to a BIP32 extended key blob (78 bytes, pre-Base58Check).
    /// Base58Check wrapping itself is a primitive operation out of this
    /// system's scope (`spec.md` §1) and is applied by the caller.
    pub fn export_bip32(&self, with_private: bool) -> Result<Vec<u8>> {
        let mut buf = Vec::with_capacity(78);
        buf.extend_from_slice(&self.depth.to_be_bytes()[3..4]);
        buf.extend_from_slice(&self.parent_fingerprint.to_be_bytes());
        buf.extend_from_slice(&self.child_num.to_be_bytes());
        let chain_code = self
            .chain_code_plain
            .ok_or_else(|| VaultError::ChainCodeLocked(self.name.clone()))?;
        buf.extend_from_slice(&chain_code);
        if with_private {
            let privkey = self
                .privkey_plain
                .ok_or_else(|| VaultError::KeyLocked(self.name.clone()))?;
            buf.push(0x00);
            buf.extend_from_slice(&privkey[..]);
        } else {
            buf.extend_from_slice(&self.pubkey.serialize());
        }
        Ok(buf)
    }

    pub fn import_bip32(name: &str, blob: &[u8]) -> Result<Keychain> {
        if blob.len() != 78 {
            return Err(VaultError::SerializationError(
                "extended key must be 78 bytes".to_string(),
            ));
        }
        if name.is_empty() || name.starts_with('@') {
            return Err(VaultError::NameInvalid(name.to_string()));
        }
        let depth = blob[0] as u32;
        let parent_fingerprint = u32::from_be_bytes([blob[1], blob[2], blob[3], blob[4]]);
        let child_num = u32::from_be_bytes([blob[5], blob[6], blob[7], blob[8]]);
        let mut chain_code = [0u8; 32];
        chain_code.copy_from_slice(&blob[9..41]);
        let key_material = &blob[41..74];

        let (pubkey, privkey) = if key_material[0] == 0x00 {
            // Accept both the canonical 32-byte scalar and the legacy
            // 33-byte-with-leading-zero form (`spec.md` §9 Open Question).
            let secret = SecretKey::from_slice(&key_material[1..])
                .map_err(|_| VaultError::SerializationError("invalid private key".to_string()))?;
            let secp = bitcoin::secp256k1::Secp256k1::signing_only();
            let pubkey = PublicKey::from_secret_key(&secp, &secret);
            (pubkey, Some(secret))
        } else {
            let pubkey = PublicKey::from_slice(key_material)
                .map_err(|_| VaultError::SerializationError("invalid public key".to_string()))?;
            (pubkey, None)
        };

        let hash = hd::keychain_hash(&pubkey, &chain_code);

        Ok(Keychain {
            id: 0,
            name: name.to_string(),
            depth,
            parent_fingerprint,
            child_num,
            pubkey,
            parent_id: None,
            derivation_path: Vec::new(),
            hash,
            chain_code_plain: Some(chain_code),
            chain_code_sealed: None,
            privkey_plain: privkey,
            privkey_sealed: None,
        })
    }

    pub(crate) fn to_row(&self) -> KeychainRow {
        KeychainRow {
            id: self.id,
            name: self.name.clone(),
            depth: self.depth,
            parent_fingerprint: self.parent_fingerprint,
            child_num: self.child_num,
            pubkey: self.pubkey.serialize().to_vec(),
            chain_code_plain: self.chain_code_plain,
            chain_code_sealed: self.chain_code_sealed.clone(),
            privkey_plain: self.privkey_plain.map(|k| {
                let mut buf = [0u8; 32];
                buf.copy_from_slice(&k[..]);
                buf
            }),
            privkey_sealed: self.privkey_sealed.clone(),
            parent_id: self.parent_id,
            derivation_path: self.derivation_path.clone(),
            hash: self.hash,
        }
    }

    pub(crate) fn from_row(row: KeychainRow) -> Result<Keychain> {
        let pubkey = PublicKey::from_slice(&row.pubkey)
            .map_err(|_| VaultError::SerializationError("corrupt pubkey".to_string()))?;
        let privkey_plain = match row.privkey_plain {
            Some(bytes) => Some(
                SecretKey::from_slice(&bytes)
                    .map_err(|_| VaultError::SerializationError("corrupt privkey".to_string()))?,
            ),
            None => None,
        };
        Ok(Keychain {
            id: row.id,
            name: row.name,
            depth: row.depth,
            parent_fingerprint: row.parent_fingerprint,
            child_num: row.child_num,
            pubkey,
            parent_id: row.parent_id,
            derivation_path: row.derivation_path,
            hash: row.hash,
            chain_code_plain: row.chain_code_plain,
            chain_code_sealed: row.chain_code_sealed,
            privkey_plain,
            privkey_sealed: row.privkey_sealed,
        })
    }
}

/// Extract a secret's raw bytes without leaking a `Debug` impression of it;
/// used when sealing/unsealing to zeroize intermediate buffers.
pub fn secure(bytes: Vec<u8>) -> SecureBytes {
    SecureBytes::new(bytes)
}
