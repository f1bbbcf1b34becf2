//! Accounts and account bins (`spec.md` §3, §4.3).

use bitcoin::hashes::{hash160, Hash};

use crate::error::{Result, VaultError};
use crate::store::model::{
    AccountBinRow, AccountRow, RowId, CHANGE_BIN_INDEX, CHANGE_BIN_NAME, DEFAULT_BIN_INDEX,
    DEFAULT_BIN_NAME,
};

pub const MAX_KEYCHAINS: usize = 15;
pub const DEFAULT_UNUSED_POOL_SIZE: u32 = 25;

/// `hash = RIPEMD160(SHA256(byte(minsigs) ∥ sort(keychain_hashes)))`
/// (`spec.md` §3, §8 item 2) — order-independent over keychains.
pub fn account_hash(minsigs: u8, keychain_hashes: &[[u8; 20]]) -> [u8; 20] {
    let mut sorted = keychain_hashes.to_vec();
    sorted.sort();
    let mut data = Vec::with_capacity(1 + sorted.len() * 20);
    data.push(minsigs);
    for h in &sorted {
        data.extend_from_slice(h);
    }
    hash160::Hash::hash(&data).into_inner()
}

pub fn validate_account_policy(name: &str, minsigs: u8, keychain_count: usize) -> Result<()> {
    if name.is_empty() || name.starts_with('@') {
        return Err(VaultError::NameInvalid(name.to_string()));
    }
    if keychain_count == 0 || keychain_count > MAX_KEYCHAINS {
        return Err(VaultError::AccountPolicyInvalid(format!(
            "account must have between 1 and {} keychains, got {}",
            MAX_KEYCHAINS, keychain_count
        )));
    }
    if minsigs == 0 || minsigs as usize > keychain_count {
        return Err(VaultError::AccountPolicyInvalid(format!(
            "minsigs must be between 1 and {} (keychain count), got {}",
            keychain_count, minsigs
        )));
    }
    Ok(())
}

pub fn new_account_row(
    name: &str,
    minsigs: u8,
    keychain_ids: Vec<RowId>,
    keychain_hashes: &[[u8; 20]],
    unused_pool_size: u32,
    time_created: u32,
) -> Result<AccountRow> {
    validate_account_policy(name, minsigs, keychain_ids.len())?;
    Ok(AccountRow {
        id: 0,
        name: name.to_string(),
        minsigs,
        keychain_ids,
        unused_pool_size,
        time_created,
        hash: account_hash(minsigs, keychain_hashes),
    })
}

pub fn new_default_bins(account_id: RowId) -> [AccountBinRow; 2] {
    [
        AccountBinRow {
            id: 0,
            account_id,
            index: CHANGE_BIN_INDEX,
            name: CHANGE_BIN_NAME.to_string(),
            script_count: 0,
            next_script_index: 0,
        },
        AccountBinRow {
            id: 0,
            account_id,
            index: DEFAULT_BIN_INDEX,
            name: DEFAULT_BIN_NAME.to_string(),
            script_count: 0,
            next_script_index: 0,
        },
    ]
}

pub fn validate_bin_name(index: u32, name: &str) -> Result<()> {
    if index == 0 {
        return Err(VaultError::AccountPolicyInvalid(
            "account bin index 0 is forbidden".to_string(),
        ));
    }
    if index == CHANGE_BIN_INDEX && name != CHANGE_BIN_NAME {
        return Err(VaultError::AccountPolicyInvalid(format!(
            "bin index {} is reserved for '{}'",
            CHANGE_BIN_INDEX, CHANGE_BIN_NAME
        )));
    }
    if index == DEFAULT_BIN_INDEX && name != DEFAULT_BIN_NAME {
        return Err(VaultError::AccountPolicyInvalid(format!(
            "bin index {} is reserved for '{}'",
            DEFAULT_BIN_INDEX, DEFAULT_BIN_NAME
        )));
    }
    if index >= 3 && name.starts_with('@') {
        return Err(VaultError::NameInvalid(format!(
            "bin names starting with '@' are reserved, got '{}'",
            name
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn account_hash_is_order_independent() {
        let a = [1u8; 20];
        let b = [2u8; 20];
        let c = [3u8; 20];
        let h1 = account_hash(2, &[a, b, c]);
        let h2 = account_hash(2, &[c, a, b]);
        let h3 = account_hash(2, &[b, c, a]);
        assert_eq!(h1, h2);
        assert_eq!(h2, h3);
    }

    #[test]
    fn account_hash_depends_on_minsigs() {
        let a = [1u8; 20];
        let b = [2u8; 20];
        assert_ne!(account_hash(1, &[a, b]), account_hash(2, &[a, b]));
    }

    #[test]
    fn policy_rejects_too_few_or_too_many_keychains() {
        assert!(validate_account_policy("a", 1, 0).is_err());
        assert!(validate_account_policy("a", 1, 16).is_err());
        assert!(validate_account_policy("a", 3, 2).is_err());
        assert!(validate_account_policy("a", 2, 3).is_ok());
    }

    #[test]
    fn policy_rejects_reserved_name_prefix() {
        assert!(validate_account_policy("@reserved", 1, 1).is_err());
    }
}
