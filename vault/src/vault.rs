//! The `Vault` facade (`spec.md` §5, §6): the single entry point every
//! caller (CLI, RPC, test) uses. One mutex around one `Store`, exactly as
//! `spec.md` §5 asks: "only one lock exists".

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use bitcoin::Transaction;

use crate::account;
use crate::blocks;
use crate::coinselect::{self, Output};
use crate::crypto;
use crate::error::{EntityKind, Result, VaultError};
use crate::events::{Subscriber, SubscriberRegistry, SubscriptionId};
use crate::ingest::{self, IngestOutcome};
use crate::keychain::Keychain;
use crate::network::NetworkParams;
use crate::script;
use crate::serialize;
use crate::signer;
use crate::store::model::{
    AccountBinRow, AccountRow, BlockHeaderRow, ContactRow, RowId, ScriptStatus, SigningScriptRow, TxRow,
    TxStatus,
};
use crate::store::views;
use crate::store::Store;
use crate::tx;

/// A process-wide keyring of unlock keys, scoped to one open `Vault`
/// (`spec.md` §5 "Shared resources"). Holding a key here means the vault
/// can transparently decrypt that keychain's chain code or private key
/// without asking the caller for a passphrase on every operation; keys
/// are zeroized on `Vault` drop along with everything else in the ring.
#[derive(Default)]
struct KeyRing {
    chain_code_keys: HashMap<RowId, Vec<u8>>,
    privkey_keys: HashMap<RowId, Vec<u8>>,
}

pub struct Vault {
    store: Mutex<Store>,
    keyring: Mutex<KeyRing>,
    subscribers: SubscriberRegistry,
    network: NetworkParams,
}

impl Vault {
    pub fn create(path: &Path, network: NetworkParams) -> Result<Vault> {
        let store = Store::open(path, true, &network.name, false)?;
        Ok(Vault {
            store: Mutex::new(store),
            keyring: Mutex::new(KeyRing::default()),
            subscribers: SubscriberRegistry::new(),
            network,
        })
    }

    pub fn open(path: &Path, network: NetworkParams, may_migrate: bool) -> Result<Vault> {
        let store = Store::open(path, false, &network.name, may_migrate)?;
        Ok(Vault {
            store: Mutex::new(store),
            keyring: Mutex::new(KeyRing::default()),
            subscribers: SubscriberRegistry::new(),
            network,
        })
    }

    pub fn network(&self) -> &NetworkParams {
        &self.network
    }

    pub fn subscribe(&self, subscriber: Box<dyn Subscriber>) -> SubscriptionId {
        self.subscribers.subscribe(subscriber)
    }

    pub fn unsubscribe(&self, id: SubscriptionId) {
        self.subscribers.unsubscribe(id)
    }

    fn store(&self) -> std::sync::MutexGuard<'_, Store> {
        self.store.lock().expect("vault store mutex poisoned")
    }

    // ---- Keychains ----

    pub fn keychain_exists(&self, name: &str) -> Result<bool> {
        Ok(self.store().query(|txn| txn.get_keychain_by_name(name))?.is_some())
    }

    /// `new_keychain(name, entropy, lock_passphrase)` — root keychain from
    /// fresh entropy, sealed under `lock_passphrase` immediately.
    pub fn new_keychain(&self, name: &str, entropy: &[u8], lock_passphrase: &[u8]) -> Result<Keychain> {
        let keychain = Keychain::new_root(name, entropy, lock_passphrase)?;
        let row = self.store().transaction(|txn| txn.insert_keychain(keychain.to_row()))?;
        Keychain::from_row(row)
    }

    pub fn rename_keychain(&self, name: &str, new_name: &str) -> Result<()> {
        let store = self.store();
        let row = store
            .query(|txn| txn.get_keychain_by_name(name))?
            .ok_or_else(|| not_found(EntityKind::Keychain, name))?;
        store.transaction(|txn| txn.rename_keychain(row.id, new_name))
    }

    pub fn get_keychain(&self, name: &str) -> Result<Keychain> {
        let row = self
            .store()
            .query(|txn| txn.get_keychain_by_name(name))?
            .ok_or_else(|| not_found(EntityKind::Keychain, name))?;
        Keychain::from_row(row)
    }

    /// Unlock `name`'s chain code (and, if `lock_passphrase` opens it,
    /// private key) for the rest of this vault's lifetime — the §5
    /// keyring. Subsequent address issuance and signing for this keychain
    /// skip re-entering the passphrase.
    pub fn unlock_keychain(&self, name: &str, lock_passphrase: &[u8]) -> Result<()> {
        let row = self
            .store()
            .query(|txn| txn.get_keychain_by_name(name))?
            .ok_or_else(|| not_found(EntityKind::Keychain, name))?;
        let mut kc = Keychain::from_row(row)?;
        kc.unlock_chain_code(lock_passphrase)?;
        let mut ring = self.keyring.lock().expect("keyring poisoned");
        ring.chain_code_keys.insert(kc.id, lock_passphrase.to_vec());
        if kc.is_private() {
            if kc.unlock_private_key(lock_passphrase).is_ok() {
                ring.privkey_keys.insert(kc.id, lock_passphrase.to_vec());
            }
        }
        Ok(())
    }

    pub fn lock_keychain(&self, name: &str) -> Result<()> {
        let row = self
            .store()
            .query(|txn| txn.get_keychain_by_name(name))?
            .ok_or_else(|| not_found(EntityKind::Keychain, name))?;
        let mut ring = self.keyring.lock().expect("keyring poisoned");
        ring.chain_code_keys.remove(&row.id);
        ring.privkey_keys.remove(&row.id);
        Ok(())
    }

    /// Load a keychain and, if this vault's keyring holds the key for it,
    /// unlock its chain code (and private key) in place. Used by every
    /// internal operation that needs to derive child keys without asking
    /// the caller for a passphrase again.
    fn load_unlocked_keychain(&self, id: RowId) -> Result<Keychain> {
        let row = self
            .store()
            .query(|txn| txn.get_keychain(id))?
            .ok_or_else(|| VaultError::NotFound {
                kind: EntityKind::Keychain,
                key: id.to_string(),
            })?;
        let mut kc = Keychain::from_row(row)?;
        let ring = self.keyring.lock().expect("keyring poisoned");
        if let Some(key) = ring.chain_code_keys.get(&kc.id) {
            let _ = kc.unlock_chain_code(key);
        }
        if let Some(key) = ring.privkey_keys.get(&kc.id) {
            let _ = kc.unlock_private_key(key);
        }
        Ok(kc)
    }

    fn load_account_keychains(&self, account: &AccountRow) -> Result<Vec<Keychain>> {
        account.keychain_ids.iter().map(|id| self.load_unlocked_keychain(*id)).collect()
    }

    fn keychains_by_account(&self) -> Result<HashMap<RowId, Vec<Keychain>>> {
        let accounts = self.store().query(|txn| txn.list_accounts())?;
        let mut out = HashMap::new();
        for account in accounts {
            if let Ok(keychains) = self.load_account_keychains(&account) {
                out.insert(account.id, keychains);
            }
        }
        Ok(out)
    }

    pub fn encrypt_keychain(&self, name: &str, passphrase: &[u8]) -> Result<()> {
        let store = self.store();
        let mut row = store
            .query(|txn| txn.get_keychain_by_name(name))?
            .ok_or_else(|| not_found(EntityKind::Keychain, name))?;
        let mut kc = Keychain::from_row(row.clone())?;
        kc.unlock_chain_code(passphrase).or_else(|_| Ok::<(), VaultError>(()))?;
        kc.encrypt(passphrase)?;
        row = kc.to_row();
        store.transaction(|txn| txn.update_keychain(&row))
    }

    pub fn decrypt_keychain(&self, name: &str, passphrase: &[u8]) -> Result<()> {
        self.unlock_keychain(name, passphrase)
    }

    pub fn reencrypt_keychain(&self, name: &str, old_passphrase: &[u8], new_passphrase: &[u8]) -> Result<()> {
        let store = self.store();
        let row = store
            .query(|txn| txn.get_keychain_by_name(name))?
            .ok_or_else(|| not_found(EntityKind::Keychain, name))?;
        let mut kc = Keychain::from_row(row)?;
        kc.reencrypt(old_passphrase, new_passphrase)?;
        let new_row = kc.to_row();
        store.transaction(|txn| txn.update_keychain(&new_row))?;
        let mut ring = self.keyring.lock().expect("keyring poisoned");
        if ring.chain_code_keys.remove(&kc.id).is_some() {
            ring.chain_code_keys.insert(kc.id, new_passphrase.to_vec());
        }
        if ring.privkey_keys.remove(&kc.id).is_some() {
            ring.privkey_keys.insert(kc.id, new_passphrase.to_vec());
        }
        Ok(())
    }

    pub fn export_keychain(&self, name: &str, with_private: bool) -> Result<Vec<u8>> {
        let kc = self.get_keychain(name)?;
        serialize::export_keychain(&kc, with_private)
    }

    pub fn import_keychain(&self, blob: &[u8]) -> Result<Keychain> {
        let kc = serialize::import_keychain(blob)?;
        let row = self.store().transaction(|txn| txn.insert_keychain(kc.to_row()))?;
        Keychain::from_row(row)
    }

    pub fn export_bip32(&self, name: &str, with_private: bool) -> Result<Vec<u8>> {
        self.get_keychain(name)?.export_bip32(with_private)
    }

    pub fn import_bip32(&self, name: &str, blob: &[u8]) -> Result<Keychain> {
        let kc = Keychain::import_bip32(name, blob)?;
        let row = self.store().transaction(|txn| txn.insert_keychain(kc.to_row()))?;
        Keychain::from_row(row)
    }

    // ---- Accounts ----

    pub fn account_exists(&self, name: &str) -> Result<bool> {
        Ok(self.store().query(|txn| txn.get_account_by_name(name))?.is_some())
    }

    pub fn new_account(
        &self,
        name: &str,
        minsigs: u8,
        keychain_names: &[String],
        pool_size: Option<u32>,
        time_created: u32,
    ) -> Result<AccountRow> {
        let keychain_rows = {
            let store = self.store();
            keychain_names
                .iter()
                .map(|n| store.query(|txn| txn.get_keychain_by_name(n))?.ok_or_else(|| not_found(EntityKind::Keychain, n)))
                .collect::<Result<Vec<_>>>()?
        };
        let keychain_hashes: Vec<[u8; 20]> = keychain_rows.iter().map(|r| r.hash).collect();
        let keychain_ids: Vec<RowId> = keychain_rows.iter().map(|r| r.id).collect();
        let pool_size = pool_size.unwrap_or(account::DEFAULT_UNUSED_POOL_SIZE);

        let account_row = account::new_account_row(name, minsigs, keychain_ids.clone(), &keychain_hashes, pool_size, time_created)?;
        // Go through the keyring (not a bare `Keychain::from_row`) so an
        // already-unlocked chain code carries over to the fresh pool mint —
        // `chain_code_plain` never survives the row's own store round-trip.
        let keychains: Vec<Keychain> = keychain_ids.iter().map(|id| self.load_unlocked_keychain(*id)).collect::<Result<_>>()?;

        self.store().transaction(|txn| {
            let account = txn.insert_account(account_row)?;
            for mut bin in account::new_default_bins(account.id) {
                bin = txn.insert_bin(bin)?;
                script::refill_pool(txn, &account, &mut bin, &keychains)?;
            }
            Ok(account)
        })
    }

    pub fn export_account(&self, account_name: &str, with_private: bool) -> Result<Vec<u8>> {
        let account = self.account_info(account_name)?;
        let keychains = self.load_account_keychains(&account)?;
        serialize::export_account(&account, &keychains, with_private)
    }

    /// Re-create an account (and its default `@change`/`@default` bins,
    /// freshly refilled) from an exported blob, importing every keychain
    /// it carries along the way.
    pub fn import_account(&self, blob: &[u8]) -> Result<AccountRow> {
        let imported = serialize::import_account(blob)?;
        let store = self.store();
        store.transaction(|txn| {
            let mut keychain_rows = Vec::with_capacity(imported.keychains.len());
            for kc in &imported.keychains {
                keychain_rows.push(txn.insert_keychain(kc.to_row())?);
            }
            let keychain_hashes: Vec<[u8; 20]> = keychain_rows.iter().map(|r| r.hash).collect();
            let keychain_ids: Vec<RowId> = keychain_rows.iter().map(|r| r.id).collect();
            let account_row = account::new_account_row(
                &imported.name,
                imported.minsigs,
                keychain_ids,
                &keychain_hashes,
                imported.unused_pool_size,
                imported.time_created,
            )?;
            let keychains: Vec<Keychain> = keychain_rows.into_iter().map(Keychain::from_row).collect::<Result<_>>()?;
            let account = txn.insert_account(account_row)?;
            for mut bin in account::new_default_bins(account.id) {
                bin = txn.insert_bin(bin)?;
                script::refill_pool(txn, &account, &mut bin, &keychains)?;
            }
            Ok(account)
        })
    }

    pub fn rename_account(&self, name: &str, new_name: &str) -> Result<()> {
        let store = self.store();
        let row = store.query(|txn| txn.get_account_by_name(name))?.ok_or_else(|| not_found(EntityKind::Account, name))?;
        store.transaction(|txn| txn.rename_account(row.id, new_name))
    }

    pub fn account_info(&self, name: &str) -> Result<AccountRow> {
        self.store().query(|txn| txn.get_account_by_name(name))?.ok_or_else(|| not_found(EntityKind::Account, name))
    }

    pub fn list_accounts(&self) -> Result<Vec<AccountRow>> {
        self.store().query(|txn| txn.list_accounts())
    }

    pub fn balance(&self, account_name: &str, min_confirmations: u32) -> Result<u64> {
        let account = self.account_info(account_name)?;
        self.store().query(|txn| views::balance_view(txn, account.id, min_confirmations))
    }

    // ---- Bins ----

    pub fn add_account_bin(&self, account_name: &str, bin_name: &str) -> Result<AccountBinRow> {
        let store = self.store();
        let account = store.query(|txn| txn.get_account_by_name(account_name))?.ok_or_else(|| not_found(EntityKind::Account, account_name))?;
        store.transaction(|txn| {
            let existing = txn.list_bins_for_account(account.id)?;
            let index = existing.iter().map(|b| b.index).max().unwrap_or(2) + 1;
            account::validate_bin_name(index, bin_name)?;
            txn.insert_bin(AccountBinRow {
                id: 0,
                account_id: account.id,
                index,
                name: bin_name.to_string(),
                script_count: 0,
                next_script_index: 0,
            })
        })
    }

    pub fn list_bins(&self, account_name: &str) -> Result<Vec<AccountBinRow>> {
        let account = self.account_info(account_name)?;
        self.store().query(|txn| txn.list_bins_for_account(account.id))
    }

    pub fn export_bin(&self, account_name: &str, bin_name: &str) -> Result<Vec<u8>> {
        let account = self.account_info(account_name)?;
        let bin = self
            .store()
            .query(|txn| txn.get_bin_by_name(account.id, bin_name))?
            .ok_or_else(|| not_found(EntityKind::AccountBin, bin_name))?;
        Ok(serialize::export_bin(&bin))
    }

    pub fn import_bin(&self, account_name: &str, blob: &[u8]) -> Result<AccountBinRow> {
        let imported = serialize::import_bin(blob)?;
        let account = self.account_info(account_name)?;
        self.store().transaction(|txn| {
            account::validate_bin_name(imported.index, &imported.name)?;
            txn.insert_bin(AccountBinRow {
                id: 0,
                account_id: account.id,
                index: imported.index,
                name: imported.name.clone(),
                script_count: 0,
                next_script_index: 0,
            })
        })
    }

    // ---- Signing scripts ----

    pub fn issue_signing_script(&self, account_name: &str, bin_name: &str, label: &str) -> Result<SigningScriptRow> {
        let account = self.store().query(|txn| txn.get_account_by_name(account_name))?.ok_or_else(|| not_found(EntityKind::Account, account_name))?;
        let keychains = self.load_account_keychains(&account)?;
        let is_change = bin_name == crate::store::model::CHANGE_BIN_NAME;
        self.store().transaction(|txn| {
            let mut bin = txn.get_bin_by_name(account.id, bin_name)?.ok_or_else(|| not_found(EntityKind::AccountBin, bin_name))?;
            script::issue_script(txn, &account, &mut bin, &keychains, label, is_change)
        })
    }

    pub fn list_scripts(&self, account_name: &str, bin_name: Option<&str>, status_mask: ScriptStatus) -> Result<Vec<SigningScriptRow>> {
        let account = self.account_info(account_name)?;
        Ok(self
            .store()
            .query(|txn| views::signing_script_view(txn, account.id, bin_name, status_mask))?
            .into_iter()
            .map(|row| row.script)
            .collect())
    }

    pub fn refill_account_pool(&self, account_name: &str) -> Result<u32> {
        let account = self.store().query(|txn| txn.get_account_by_name(account_name))?.ok_or_else(|| not_found(EntityKind::Account, account_name))?;
        let keychains = self.load_account_keychains(&account)?;
        self.store().transaction(|txn| {
            let mut total = 0;
            for mut bin in txn.list_bins_for_account(account.id)? {
                total += script::refill_pool(txn, &account, &mut bin, &keychains)?;
            }
            Ok(total)
        })
    }

    // ---- Transactions ----

    pub fn insert_tx(&self, raw: &Transaction, timestamp: u32, default_status: TxStatus) -> Result<TxRow> {
        let keychains = self.keychains_by_account()?;
        let store = self.store();
        let outcome = store.transaction(|txn| ingest::insert_tx(txn, raw, timestamp, default_status, &keychains))?;
        self.notify_ingest(&outcome);
        Ok(outcome.tx)
    }

    fn notify_ingest(&self, outcome: &IngestOutcome) {
        if outcome.inserted {
            self.subscribers.notify_tx_inserted(&outcome.tx);
        }
        if outcome.status_changed {
            self.subscribers.notify_tx_status_changed(&outcome.tx);
        }
        if outcome.newly_confirmed {
            self.subscribers.notify_tx_confirmed(&outcome.tx);
        }
    }

    pub fn create_tx(
        &self,
        account_name: &str,
        version: i32,
        lock_time: u32,
        outputs: &[Output],
        fee: u64,
        min_confirmations: u32,
        allow_unconfirmed: bool,
        timestamp: u32,
    ) -> Result<TxRow> {
        let account = self.store().query(|txn| txn.get_account_by_name(account_name))?.ok_or_else(|| not_found(EntityKind::Account, account_name))?;
        let keychains = self.load_account_keychains(&account)?;
        let outcome = self.store().transaction(|txn| {
            coinselect::create_tx(txn, &account, version, lock_time, outputs, fee, min_confirmations, allow_unconfirmed, &keychains, timestamp)
        })?;
        self.notify_ingest(&outcome);
        Ok(outcome.tx)
    }

    pub fn consolidate_tx_outs(&self, account_name: &str, payout_script: &[u8], min_fee: u64, max_tx_size: usize, timestamp: u32) -> Result<Vec<TxRow>> {
        let account = self.store().query(|txn| txn.get_account_by_name(account_name))?.ok_or_else(|| not_found(EntityKind::Account, account_name))?;
        let keychains = self.load_account_keychains(&account)?;
        let outcomes = self.store().transaction(|txn| {
            coinselect::consolidate_tx_outs(txn, &account, payout_script, min_fee, max_tx_size, &keychains, timestamp)
        })?;
        for outcome in &outcomes {
            self.notify_ingest(outcome);
        }
        Ok(outcomes.into_iter().map(|o| o.tx).collect())
    }

    pub fn delete_tx(&self, id: RowId) -> Result<()> {
        self.store().transaction(|txn| ingest::delete_tx(txn, id).map(|_| ()))
    }

    pub fn signing_request(&self, id: RowId) -> Result<signer::SigningRequest> {
        let tx = self.store().query(|txn| txn.get_tx(id))?.ok_or_else(|| VaultError::TxUnknown(id.to_string()))?;
        let (txins, txouts) = self.load_tx_rows(&tx)?;
        let keychains = self.keychains_by_account()?;
        self.store().query(|txn| signer::signing_request(txn, &tx, &txins, &txouts, &keychains))
    }

    fn load_tx_rows(&self, tx: &TxRow) -> Result<(Vec<crate::store::model::TxInRow>, Vec<crate::store::model::TxOutRow>)> {
        let store = self.store();
        let txins = store.query(|txn| {
            tx.input_ids.iter().map(|id| txn.get_txin(*id)?.ok_or_else(|| VaultError::SerializationError("missing txin".to_string()))).collect::<Result<Vec<_>>>()
        })?;
        let txouts = store.query(|txn| {
            tx.output_ids.iter().map(|id| txn.get_txout(*id)?.ok_or_else(|| VaultError::SerializationError("missing txout".to_string()))).collect::<Result<Vec<_>>>()
        })?;
        Ok((txins, txouts))
    }

    pub fn sign_tx(&self, id: RowId, keychain_name: &str, passphrase: Option<&[u8]>, promote_to: TxStatus) -> Result<TxRow> {
        let tx = self.store().query(|txn| txn.get_tx(id))?.ok_or_else(|| VaultError::TxUnknown(id.to_string()))?;
        if tx.status != TxStatus::UNSIGNED {
            return Ok(tx);
        }
        let (txins, txouts) = self.load_tx_rows(&tx)?;

        let row = self.store().query(|txn| txn.get_keychain_by_name(keychain_name))?.ok_or_else(|| not_found(EntityKind::Keychain, keychain_name))?;
        let kc = if let Some(pass) = passphrase {
            let mut kc = Keychain::from_row(row)?;
            kc.unlock_chain_code(pass)?;
            kc.unlock_private_key(pass)?;
            kc
        } else {
            self.load_unlocked_keychain(row.id)?
        };

        let (new_tx, new_txins, changed) = self.store().query(|txn| signer::sign_tx(txn, &tx, &txins, &txouts, &kc, promote_to))?;
        if !changed {
            return Ok(tx);
        }

        let old_tx = tx.clone();
        self.store().transaction(|txn| {
            for row in &new_txins {
                txn.update_txin(row)?;
            }
            txn.update_tx(Some(&old_tx), &new_tx)?;
            if new_tx.hash.is_some() && new_tx.hash != old_tx.hash {
                let new_hash = new_tx.hash.unwrap();
                let old_hash = old_tx.hash.unwrap_or(old_tx.unsigned_hash);
                for id in &new_tx.output_ids {
                    txn.rekey_txout(*id, &old_hash, new_hash)?;
                }
            }
            Ok(())
        })?;

        if new_tx.status != old_tx.status {
            self.subscribers.notify_tx_status_changed(&new_tx);
        }
        Ok(new_tx)
    }

    pub fn get_tx(&self, id: RowId) -> Result<TxRow> {
        self.store().query(|txn| txn.get_tx(id))?.ok_or_else(|| VaultError::TxUnknown(id.to_string()))
    }

    pub fn list_txs(&self) -> Result<Vec<TxRow>> {
        self.store().query(|txn| txn.list_txs())
    }

    /// Export the raw, consensus-serialized wire bytes of each tx in `ids`
    /// (`spec.md` §6): enough to replay through `import_txs` elsewhere, no
    /// internal row state travels with them.
    pub fn export_txs(&self, ids: &[RowId]) -> Result<Vec<u8>> {
        let store = self.store();
        let raws = store.query(|txn| {
            ids.iter()
                .map(|id| {
                    let row = txn.get_tx(*id)?.ok_or_else(|| VaultError::TxUnknown(id.to_string()))?;
                    let txins = row
                        .input_ids
                        .iter()
                        .map(|i| txn.get_txin(*i)?.ok_or_else(|| VaultError::SerializationError("missing txin".to_string())))
                        .collect::<Result<Vec<_>>>()?;
                    let txouts = row
                        .output_ids
                        .iter()
                        .map(|o| txn.get_txout(*o)?.ok_or_else(|| VaultError::SerializationError("missing txout".to_string())))
                        .collect::<Result<Vec<_>>>()?;
                    let raw = tx::to_bitcoin_tx(&row, &txins, &txouts)?;
                    Ok(bitcoin::consensus::serialize(&raw))
                })
                .collect::<Result<Vec<_>>>()
        })?;
        Ok(serialize::export_txs(&raws))
    }

    /// Re-ingest every tx in an exported blob, in order (`spec.md` §6).
    pub fn import_txs(&self, blob: &[u8], timestamp: u32, default_status: TxStatus) -> Result<Vec<TxRow>> {
        let raws = serialize::import_txs(blob)?;
        let mut out = Vec::with_capacity(raws.len());
        for raw in &raws {
            let parsed: Transaction = bitcoin::consensus::deserialize(raw)
                .map_err(|_| VaultError::SerializationError("invalid tx wire bytes".to_string()))?;
            out.push(self.insert_tx(&parsed, timestamp, default_status)?);
        }
        Ok(out)
    }

    // ---- Blockchain ----

    pub fn best_height(&self) -> Result<Option<u32>> {
        self.store().query(|txn| txn.best_height())
    }

    pub fn horizon_timestamp(&self) -> Result<Option<u32>> {
        self.store().query(|txn| views::horizon_timestamp_view(txn))
    }

    pub fn horizon_height(&self) -> Result<Option<u32>> {
        self.store().query(|txn| views::horizon_height_view(txn))
    }

    pub fn get_block_header(&self, height: u32) -> Result<BlockHeaderRow> {
        self.store()
            .query(|txn| txn.get_block_header_by_height(height))?
            .ok_or(VaultError::BlockHeaderUnknown(height))
    }

    pub fn insert_merkle_block(&self, raw: &[u8], height: u32) -> Result<BlockHeaderRow> {
        let store = self.store();
        let outcome = store.transaction(|txn| blocks::insert_merkle_block(txn, raw, height))?;
        self.subscribers.notify_block_inserted(&outcome.block_header);
        for tx_id in &outcome.confirmed_tx_ids {
            if let Ok(Some(tx)) = store.query(|txn| txn.get_tx(*tx_id)) {
                self.subscribers.notify_tx_confirmed(&tx);
            }
        }
        Ok(outcome.block_header)
    }

    pub fn delete_merkle_block(&self, from_height: u32) -> Result<()> {
        let store = self.store();
        let header = store.query(|txn| txn.get_block_header_by_height(from_height))?;
        store.transaction(|txn| blocks::delete_merkle_block(txn, from_height, TxStatus::RECEIVED).map(|_| ()))?;
        if let Some(header) = header {
            self.subscribers.notify_block_removed(&header);
        }
        Ok(())
    }

    /// Export `{height, raw_merkle_block}` pairs (`spec.md` §6
    /// "Merkle-block export"), re-assembling the original consensus-encoded
    /// `MerkleBlock` from its stored header and partial-merkle-tree bytes.
    pub fn export_merkle_blocks(&self, heights: &[u32]) -> Result<Vec<u8>> {
        let store = self.store();
        let blocks = store.query(|txn| {
            heights
                .iter()
                .map(|height| {
                    let header = txn
                        .get_block_header_by_height(*height)?
                        .ok_or(VaultError::BlockHeaderUnknown(*height))?;
                    let mb = txn
                        .get_merkle_block_by_header(header.id)?
                        .ok_or(VaultError::BlockHeaderUnknown(*height))?;
                    let partial: bitcoin::util::merkleblock::PartialMerkleTree =
                        bitcoin::consensus::deserialize(&mb.flags)
                            .map_err(|_| VaultError::MerkleProofInvalid)?;
                    let btc_header = bitcoin::BlockHeader {
                        version: header.version,
                        prev_blockhash: bitcoin::BlockHash::from_inner(header.prev_hash),
                        merkle_root: bitcoin::TxMerkleNode::from_inner(header.merkle_root),
                        time: header.timestamp,
                        bits: header.bits,
                        nonce: header.nonce,
                    };
                    let full = bitcoin::util::merkleblock::MerkleBlock { header: btc_header, txn: partial };
                    Ok((*height, bitcoin::consensus::serialize(&full)))
                })
                .collect::<Result<Vec<_>>>()
        })?;
        Ok(serialize::export_merkle_blocks(&blocks))
    }

    pub fn import_merkle_blocks(&self, blob: &[u8]) -> Result<Vec<BlockHeaderRow>> {
        let blocks = serialize::import_merkle_blocks(blob)?;
        let mut out = Vec::with_capacity(blocks.len());
        for (height, raw) in &blocks {
            out.push(self.insert_merkle_block(raw, *height)?);
        }
        Ok(out)
    }

    pub fn incomplete_block_hashes(&self) -> Result<Vec<[u8; 32]>> {
        self.store().query(|txn| {
            let mut out = Vec::new();
            for mb in txn.list_merkle_blocks()? {
                for hash in &mb.hashes {
                    if txn.get_tx_by_hash(hash)?.is_none() {
                        out.push(*hash);
                    }
                }
            }
            Ok(out)
        })
    }

    // ---- Contacts ----

    pub fn add_contact(&self, username: &str) -> Result<ContactRow> {
        self.store().transaction(|txn| txn.insert_contact(ContactRow { id: 0, username: username.to_string() }))
    }

    pub fn list_contacts(&self) -> Result<Vec<ContactRow>> {
        self.store().query(|txn| txn.list_contacts())
    }

    pub fn remove_contact(&self, username: &str) -> Result<()> {
        self.store().transaction(|txn| txn.delete_contact(username))
    }

    pub fn flush(&self) -> Result<()> {
        self.store().flush()
    }
}

fn not_found(kind: EntityKind, key: &str) -> VaultError {
    VaultError::NotFound { kind, key: key.to_string() }
}

pub fn default_db_path(base: &Path) -> PathBuf {
    base.join("vault.db")
}

pub fn seal_passphrase(passphrase: &str) -> Vec<u8> {
    passphrase.as_bytes().to_vec()
}

pub use crypto::Sealed;
