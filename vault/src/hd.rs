//! BIP32 hierarchical-deterministic key derivation.
//!
//! Treated elsewhere in this system as a fixed-contract primitive operation
//! (`spec.md` §1), but the vault's invariants (§8 item 1, and the
//! leading-zero-byte open question in §9) depend on exact byte layout, so
//! it is implemented directly here rather than deferred to a third-party
//! BIP32 crate whose internal representation we would not control.

use hmac::{Hmac, Mac};
use sha2::Sha512;

use crate::error::{Result, VaultError};

type HmacSha512 = Hmac<Sha512>;

/// One node of the HD tree: a public key, a chain code, and optionally the
/// matching private key. Plain value type — no parent/child pointers, see
/// REDESIGN FLAGS in `spec.md` §9.
#[derive(Clone)]
pub struct HDKey {
    pub public_key: bitcoin::secp256k1::PublicKey,
    pub chain_code: [u8; 32],
    pub private_key: Option<bitcoin::secp256k1::SecretKey>,
}

impl std::fmt::Debug for HDKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HDKey")
            .field("public_key", &self.public_key)
            .field("has_private_key", &self.private_key.is_some())
            .finish()
    }
}

const HARDENED_BIT: u32 = 1 << 31;

/// Master key from 32–64 bytes of entropy (BIP32 "I" / master key
/// generation using the fixed HMAC key `b"Bitcoin seed"`).
pub fn master_key_from_entropy(entropy: &[u8]) -> Result<HDKey> {
    let mut mac = HmacSha512::new_from_slice(b"Bitcoin seed")
        .map_err(|_| VaultError::SerializationError("bad hmac key".to_string()))?;
    mac.update(entropy);
    let i = mac.finalize().into_bytes();

    let (il, ir) = i.split_at(32);
    let secp = bitcoin::secp256k1::Secp256k1::signing_only();
    let secret_key = bitcoin::secp256k1::SecretKey::from_slice(il)
        .map_err(|_| VaultError::SerializationError("invalid master secret key".to_string()))?;
    let public_key = bitcoin::secp256k1::PublicKey::from_secret_key(&secp, &secret_key);

    let mut chain_code = [0u8; 32];
    chain_code.copy_from_slice(ir);

    Ok(HDKey {
        public_key,
        chain_code,
        private_key: Some(secret_key),
    })
}

/// Derive the normal (non-hardened) public child at index `i`. Requires
/// only the chain code and public key to be known — the defining property
/// of BIP32 that lets watch-only keychains derive receive addresses.
pub fn derive_public_child(parent: &HDKey, i: u32) -> Result<HDKey> {
    if i & HARDENED_BIT != 0 {
        return Err(VaultError::KeychainPublicOnly(
            "cannot derive a hardened child from a public key".to_string(),
        ));
    }

    let secp = bitcoin::secp256k1::Secp256k1::verification_only();
    let mut mac = HmacSha512::new_from_slice(&parent.chain_code)
        .map_err(|_| VaultError::SerializationError("bad hmac key".to_string()))?;
    mac.update(&parent.public_key.serialize());
    mac.update(&i.to_be_bytes());
    let i_hmac = mac.finalize().into_bytes();

    let (il, ir) = i_hmac.split_at(32);
    let tweak = bitcoin::secp256k1::SecretKey::from_slice(il)
        .map_err(|_| VaultError::SerializationError("invalid child tweak".to_string()))?;

    let mut child_public = parent.public_key;
    child_public
        .add_exp_assign(&secp, &tweak[..])
        .map_err(|_| VaultError::SerializationError("child key derivation failed".to_string()))?;

    let mut chain_code = [0u8; 32];
    chain_code.copy_from_slice(ir);

    Ok(HDKey {
        public_key: child_public,
        chain_code,
        private_key: None,
    })
}

/// Derive the normal (non-hardened) private child at index `i`. Requires
/// the private key to be known.
pub fn derive_private_child(parent: &HDKey, i: u32) -> Result<HDKey> {
    if i & HARDENED_BIT != 0 {
        return Err(VaultError::SerializationError(
            "hardened derivation is not used by this vault".to_string(),
        ));
    }
    let parent_secret = parent
        .private_key
        .ok_or_else(|| VaultError::KeychainPublicOnly("no private key to derive from".to_string()))?;

    let secp = bitcoin::secp256k1::Secp256k1::signing_only();
    let mut mac = HmacSha512::new_from_slice(&parent.chain_code)
        .map_err(|_| VaultError::SerializationError("bad hmac key".to_string()))?;
    // Non-hardened derivation always hashes the parent's *public* key,
    // independent of whether the private key is present.
    mac.update(&parent.public_key.serialize());
    mac.update(&i.to_be_bytes());
    let i_hmac = mac.finalize().into_bytes();

    let (il, ir) = i_hmac.split_at(32);
    let mut child_secret = parent_secret;
    child_secret
        .add_assign(il)
        .map_err(|_| VaultError::SerializationError("child key derivation failed".to_string()))?;
    let child_public = bitcoin::secp256k1::PublicKey::from_secret_key(&secp, &child_secret);

    let mut chain_code = [0u8; 32];
    chain_code.copy_from_slice(ir);

    Ok(HDKey {
        public_key: child_public,
        chain_code,
        private_key: Some(child_secret),
    })
}

/// Derive the child at index `i`, using the private path if available,
/// falling back to the public path for watch-only keys.
pub fn derive_child(parent: &HDKey, i: u32) -> Result<HDKey> {
    if parent.private_key.is_some() {
        derive_private_child(parent, i)
    } else {
        derive_public_child(parent, i)
    }
}

/// Walk a derivation path of plain (non-hardened) indices.
pub fn derive_path(root: &HDKey, path: &[u32]) -> Result<HDKey> {
    let mut current = root.clone();
    for &i in path {
        current = derive_child(&current, i)?;
    }
    Ok(current)
}

/// `hash = RIPEMD160(SHA256(pubkey ∥ chain_code))`, §3/§8 item 1.
pub fn keychain_hash(public_key: &bitcoin::secp256k1::PublicKey, chain_code: &[u8; 32]) -> [u8; 20] {
    use bitcoin::hashes::{hash160, Hash};
    let mut data = Vec::with_capacity(33 + 32);
    data.extend_from_slice(&public_key.serialize());
    data.extend_from_slice(chain_code);
    hash160::Hash::hash(&data).into_inner()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn master_key_derivation_is_deterministic() {
        let entropy = [0x01u8; 32];
        let a = master_key_from_entropy(&entropy).unwrap();
        let b = master_key_from_entropy(&entropy).unwrap();
        assert_eq!(a.public_key, b.public_key);
        assert_eq!(a.chain_code, b.chain_code);
    }

    #[test]
    fn public_and_private_derivation_paths_agree() {
        let root = master_key_from_entropy(&[0x02u8; 32]).unwrap();
        let priv_child = derive_private_child(&root, 5).unwrap();

        let watch_only = HDKey {
            public_key: root.public_key,
            chain_code: root.chain_code,
            private_key: None,
        };
        let pub_child = derive_public_child(&watch_only, 5).unwrap();

        assert_eq!(priv_child.public_key, pub_child.public_key);
        assert_eq!(priv_child.chain_code, pub_child.chain_code);
    }

    #[test]
    fn distinct_indices_give_distinct_children() {
        let root = master_key_from_entropy(&[0x03u8; 32]).unwrap();
        let c0 = derive_child(&root, 0).unwrap();
        let c1 = derive_child(&root, 1).unwrap();
        assert_ne!(c0.public_key, c1.public_key);
    }

    #[test]
    fn hardened_index_rejected_on_public_only_key() {
        let root = master_key_from_entropy(&[0x04u8; 32]).unwrap();
        let watch_only = HDKey {
            public_key: root.public_key,
            chain_code: root.chain_code,
            private_key: None,
        };
        assert!(derive_public_child(&watch_only, HARDENED_BIT).is_err());
    }
}
