//! The persistence layer (`spec.md` §4.1).
//!
//! Built on `sled`, the same embedded keyspace engine the teacher
//! (`thunder::db::Database`) uses to persist `thor::Channel` values. That
//! code persists one kind of object into one tree with `serde_cbor`
//! encoding and a compare-and-swap write; this module generalizes the same
//! codec and the same "one atomic write settles the whole operation" shape
//! across the full entity set of `spec.md` §3, using a single flat
//! `sled::Tree` keyspace (see `keys.rs`) rather than one tree per entity,
//! because `sled`'s multi-tree transaction API is fixed-arity and does not
//! support range scans inside a transaction — the views of §4.1 need
//! range scans.
//!
//! Atomicity is provided by two things working together: the `Vault`
//! facade holds every `Store` behind one `std::sync::Mutex` (`spec.md`
//! §5), so within one public operation no concurrent reader or writer can
//! observe a half-finished state; and every operation's writes are
//! collected into one `sled::Batch` applied in one call to
//! `Tree::apply_batch`, which `sled` guarantees is atomic and durable. A
//! `Txn` never partially commits: either every accumulated write lands, or
//! (on an early `?` return) none of them do.

pub mod codec;
pub mod keys;
pub mod model;
pub mod views;

use std::collections::HashMap;
use std::path::Path;

use crate::error::{EntityKind, Result, VaultError};
use model::*;

pub const SCHEMA_VERSION: u32 = 3;

pub struct Store {
    db: sled::Db,
    tree: sled::Tree,
}

impl Store {
    pub fn open(path: &Path, create_if_missing: bool, network_name: &str, may_migrate: bool) -> Result<Store> {
        let existed = path.exists();
        if !existed && !create_if_missing {
            return Err(VaultError::IOError(format!(
                "database {} does not exist",
                path.display()
            )));
        }

        let db = sled::open(path)?;
        let tree = db.open_tree(b"vault")?;
        let store = Store { db, tree };

        if existed {
            let meta = store.read_meta()?;
            if let Some(meta) = meta {
                if meta.schema_version != SCHEMA_VERSION {
                    if !may_migrate {
                        return Err(VaultError::SchemaMigrationNeeded {
                            found: meta.schema_version,
                            current: SCHEMA_VERSION,
                        });
                    }
                    if meta.schema_version > SCHEMA_VERSION {
                        return Err(VaultError::SchemaFutureVersion(meta.schema_version));
                    }
                    store.migrate(meta.schema_version)?;
                }
            } else {
                store.write_meta(&MetaRow {
                    schema_version: SCHEMA_VERSION,
                    network_name: network_name.to_string(),
                })?;
            }
        } else {
            store.write_meta(&MetaRow {
                schema_version: SCHEMA_VERSION,
                network_name: network_name.to_string(),
            })?;
        }

        Ok(store)
    }

    fn migrate(&self, from: u32) -> Result<()> {
        // No prior schema versions are reachable from a freshly written
        // store; this is the hook future migrations attach to.
        tracing::warn!(from, to = SCHEMA_VERSION, "migrating vault schema");
        self.write_meta(&MetaRow {
            schema_version: SCHEMA_VERSION,
            network_name: self.read_meta()?.map(|m| m.network_name).unwrap_or_default(),
        })
    }

    fn read_meta(&self) -> Result<Option<MetaRow>> {
        match self.tree.get(keys::meta_key())? {
            Some(bytes) => Ok(Some(codec::decode(&bytes)?)),
            None => Ok(None),
        }
    }

    fn write_meta(&self, meta: &MetaRow) -> Result<()> {
        self.tree.insert(keys::meta_key(), codec::encode(meta)?)?;
        Ok(())
    }

    pub fn network_name(&self) -> Result<String> {
        Ok(self.read_meta()?.map(|m| m.network_name).unwrap_or_default())
    }

    /// Run `f` as one atomic unit: every write `f` performs through the
    /// `Txn` it is given either all lands (on `Ok`) or none of it does (on
    /// `Err`). Corresponds to "begin/commit/rollback" in `spec.md` §4.1.
    pub fn transaction<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut Txn<'_>) -> Result<T>,
    {
        let mut txn = Txn {
            store: self,
            overlay: HashMap::new(),
        };
        let result = f(&mut txn)?;
        txn.commit()?;
        Ok(result)
    }

    /// Read-only convenience wrapper for query-only operations (views).
    pub fn query<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Txn<'_>) -> Result<T>,
    {
        let txn = Txn {
            store: self,
            overlay: HashMap::new(),
        };
        f(&txn)
    }

    pub fn flush(&self) -> Result<()> {
        self.db.flush()?;
        Ok(())
    }
}

/// One logical session/transaction against the store. Reads see the
/// committed tree overlaid with this session's own not-yet-committed
/// writes (read-your-writes); nothing is visible to any other session
/// until `commit` runs, and nothing at all is visible to other sessions
/// mid-flight because `Vault` only ever runs one `Txn` at a time.
pub struct Txn<'a> {
    store: &'a Store,
    overlay: HashMap<Vec<u8>, Option<Vec<u8>>>,
}

impl<'a> Txn<'a> {
    fn raw_get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        if let Some(v) = self.overlay.get(key) {
            return Ok(v.clone());
        }
        Ok(self.store.tree.get(key)?.map(|ivec| ivec.to_vec()))
    }

    fn raw_put(&mut self, key: Vec<u8>, value: Vec<u8>) {
        self.overlay.insert(key, Some(value));
    }

    fn raw_delete(&mut self, key: Vec<u8>) {
        self.overlay.insert(key, None);
    }

    fn raw_scan_prefix(&self, prefix: &[u8]) -> Result<Vec<(Vec<u8>, Vec<u8>)>> {
        let mut merged: std::collections::BTreeMap<Vec<u8>, Option<Vec<u8>>> =
            std::collections::BTreeMap::new();
        for kv in self.store.tree.scan_prefix(prefix) {
            let (k, v) = kv?;
            merged.insert(k.to_vec(), Some(v.to_vec()));
        }
        for (k, v) in self.overlay.iter() {
            if k.starts_with(prefix) {
                merged.insert(k.clone(), v.clone());
            }
        }
        Ok(merged.into_iter().filter_map(|(k, v)| v.map(|v| (k, v))).collect())
    }

    fn commit(self) -> Result<()> {
        if self.overlay.is_empty() {
            return Ok(());
        }
        let mut batch = sled::Batch::default();
        for (k, v) in self.overlay {
            match v {
                Some(val) => batch.insert(k, val),
                None => batch.remove(k),
            }
        }
        self.store.tree.apply_batch(batch)?;
        Ok(())
    }

    fn next_id(&mut self, entity: &str) -> Result<RowId> {
        let key = keys::seq_key(entity);
        let current = match self.raw_get(&key)? {
            Some(bytes) => keys::id_from_bytes(&bytes),
            None => 0,
        };
        let next = current + 1;
        self.raw_put(key, next.to_be_bytes().to_vec());
        Ok(next)
    }

    fn get_row<T: serde::de::DeserializeOwned>(&self, entity: &str, id: RowId) -> Result<Option<T>> {
        match self.raw_get(&keys::row_key(entity, id))? {
            Some(bytes) => Ok(Some(codec::decode(&bytes)?)),
            None => Ok(None),
        }
    }

    fn put_row<T: serde::Serialize>(&mut self, entity: &str, id: RowId, row: &T) -> Result<()> {
        self.raw_put(keys::row_key(entity, id), codec::encode(row)?);
        Ok(())
    }

    fn delete_row(&mut self, entity: &str, id: RowId) {
        self.raw_delete(keys::row_key(entity, id));
    }

    fn scan_rows<T: serde::de::DeserializeOwned>(&self, entity: &str) -> Result<Vec<T>> {
        self.raw_scan_prefix(&keys::row_prefix(entity))?
            .into_iter()
            .map(|(_, v)| codec::decode(&v))
            .collect()
    }

    fn get_idx(&self, entity: &str, index: &str, key: &[u8]) -> Result<Option<RowId>> {
        Ok(self
            .raw_get(&keys::idx_key(entity, index, key))?
            .map(|bytes| keys::id_from_bytes(&bytes)))
    }

    fn put_idx(&mut self, entity: &str, index: &str, key: &[u8], id: RowId) {
        self.raw_put(keys::idx_key(entity, index, key), id.to_be_bytes().to_vec());
    }

    fn delete_idx(&mut self, entity: &str, index: &str, key: &[u8]) {
        self.raw_delete(keys::idx_key(entity, index, key));
    }

    fn scan_idx(&self, entity: &str, index: &str, partial: &[u8]) -> Result<Vec<RowId>> {
        Ok(self
            .raw_scan_prefix(&keys::idx_prefix_with(entity, index, partial))?
            .into_iter()
            .map(|(_, v)| keys::id_from_bytes(&v))
            .collect())
    }

    // ---- Keychains ----

    pub fn insert_keychain(&mut self, mut row: KeychainRow) -> Result<KeychainRow> {
        if self.get_idx("keychain", "name", row.name.as_bytes())?.is_some() {
            return Err(VaultError::NameAlreadyExists {
                kind: EntityKind::Keychain,
                name: row.name.clone(),
            });
        }
        let id = self.next_id("keychain")?;
        row.id = id;
        self.put_idx("keychain", "name", row.name.as_bytes(), id);
        self.put_idx("keychain", "hash", &row.hash, id);
        self.put_row("keychain", id, &row)?;
        Ok(row)
    }

    pub fn get_keychain(&self, id: RowId) -> Result<Option<KeychainRow>> {
        self.get_row("keychain", id)
    }

    pub fn get_keychain_by_name(&self, name: &str) -> Result<Option<KeychainRow>> {
        match self.get_idx("keychain", "name", name.as_bytes())? {
            Some(id) => self.get_keychain(id),
            None => Ok(None),
        }
    }

    pub fn get_keychain_by_hash(&self, hash: &[u8; 20]) -> Result<Option<KeychainRow>> {
        match self.get_idx("keychain", "hash", hash)? {
            Some(id) => self.get_keychain(id),
            None => Ok(None),
        }
    }

    pub fn list_keychains(&self) -> Result<Vec<KeychainRow>> {
        self.scan_rows("keychain")
    }

    pub fn update_keychain(&mut self, row: &KeychainRow) -> Result<()> {
        self.put_row("keychain", row.id, row)
    }

    pub fn rename_keychain(&mut self, id: RowId, new_name: &str) -> Result<()> {
        let mut row = self
            .get_keychain(id)?
            .ok_or(VaultError::NotFound { kind: EntityKind::Keychain, key: id.to_string() })?;
        if self.get_idx("keychain", "name", new_name.as_bytes())?.is_some() {
            return Err(VaultError::NameAlreadyExists {
                kind: EntityKind::Keychain,
                name: new_name.to_string(),
            });
        }
        self.delete_idx("keychain", "name", row.name.as_bytes());
        row.name = new_name.to_string();
        self.put_idx("keychain", "name", row.name.as_bytes(), id);
        self.put_row("keychain", id, &row)
    }

    // ---- Accounts ----

    pub fn insert_account(&mut self, mut row: AccountRow) -> Result<AccountRow> {
        if self.get_idx("account", "name", row.name.as_bytes())?.is_some() {
            return Err(VaultError::NameAlreadyExists {
                kind: EntityKind::Account,
                name: row.name.clone(),
            });
        }
        let id = self.next_id("account")?;
        row.id = id;
        self.put_idx("account", "name", row.name.as_bytes(), id);
        self.put_row("account", id, &row)?;
        Ok(row)
    }

    pub fn get_account(&self, id: RowId) -> Result<Option<AccountRow>> {
        self.get_row("account", id)
    }

    pub fn get_account_by_name(&self, name: &str) -> Result<Option<AccountRow>> {
        match self.get_idx("account", "name", name.as_bytes())? {
            Some(id) => self.get_account(id),
            None => Ok(None),
        }
    }

    pub fn list_accounts(&self) -> Result<Vec<AccountRow>> {
        self.scan_rows("account")
    }

    pub fn rename_account(&mut self, id: RowId, new_name: &str) -> Result<()> {
        let mut row = self
            .get_account(id)?
            .ok_or(VaultError::NotFound { kind: EntityKind::Account, key: id.to_string() })?;
        if self.get_idx("account", "name", new_name.as_bytes())?.is_some() {
            return Err(VaultError::NameAlreadyExists {
                kind: EntityKind::Account,
                name: new_name.to_string(),
            });
        }
        self.delete_idx("account", "name", row.name.as_bytes());
        row.name = new_name.to_string();
        self.put_idx("account", "name", row.name.as_bytes(), id);
        self.put_row("account", id, &row)
    }

    // ---- Account bins ----

    pub fn insert_bin(&mut self, mut row: AccountBinRow) -> Result<AccountBinRow> {
        let key = bin_name_key(row.account_id, &row.name);
        if self.get_idx("bin", "name_in_account", &key)?.is_some() {
            return Err(VaultError::NameAlreadyExists {
                kind: EntityKind::AccountBin,
                name: row.name.clone(),
            });
        }
        let id = self.next_id("bin")?;
        row.id = id;
        self.put_idx("bin", "name_in_account", &key, id);
        self.put_idx("bin", "byaccount", &bin_by_account_key(row.account_id, id), id);
        self.put_row("bin", id, &row)?;
        Ok(row)
    }

    pub fn get_bin(&self, id: RowId) -> Result<Option<AccountBinRow>> {
        self.get_row("bin", id)
    }

    pub fn get_bin_by_name(&self, account_id: RowId, name: &str) -> Result<Option<AccountBinRow>> {
        match self.get_idx("bin", "name_in_account", &bin_name_key(account_id, name))? {
            Some(id) => self.get_bin(id),
            None => Ok(None),
        }
    }

    pub fn list_bins_for_account(&self, account_id: RowId) -> Result<Vec<AccountBinRow>> {
        let ids = self.scan_idx("bin", "byaccount", &account_id.to_be_bytes())?;
        ids.into_iter()
            .filter_map(|id| self.get_bin(id).transpose())
            .collect()
    }

    pub fn list_bins(&self) -> Result<Vec<AccountBinRow>> {
        self.scan_rows("bin")
    }

    pub fn update_bin(&mut self, row: &AccountBinRow) -> Result<()> {
        self.put_row("bin", row.id, row)
    }

    // ---- Signing scripts ----

    pub fn insert_script(&mut self, mut row: SigningScriptRow) -> Result<SigningScriptRow> {
        let id = self.next_id("script")?;
        row.id = id;
        self.put_idx(
            "script",
            "bybin",
            &script_bybin_key(row.bin_id, row.index),
            id,
        );
        self.put_idx("script", "txoutscript", &row.txout_script, id);
        self.put_row("script", id, &row)?;
        Ok(row)
    }

    pub fn get_script(&self, id: RowId) -> Result<Option<SigningScriptRow>> {
        self.get_row("script", id)
    }

    pub fn get_script_by_txoutscript(&self, txout_script: &[u8]) -> Result<Option<SigningScriptRow>> {
        match self.get_idx("script", "txoutscript", txout_script)? {
            Some(id) => self.get_script(id),
            None => Ok(None),
        }
    }

    pub fn get_script_in_bin(&self, bin_id: RowId, index: u32) -> Result<Option<SigningScriptRow>> {
        match self.get_idx("script", "bybin", &script_bybin_key(bin_id, index))? {
            Some(id) => self.get_script(id),
            None => Ok(None),
        }
    }

    /// All scripts of a bin, ordered by index ascending (the `bybin` index
    /// key is `bin_id ++ index_be`, so prefixing by `bin_id` yields them in
    /// index order for free).
    pub fn list_scripts_in_bin(&self, bin_id: RowId) -> Result<Vec<SigningScriptRow>> {
        let ids = self.scan_idx("script", "bybin", &bin_id.to_be_bytes())?;
        ids.into_iter()
            .filter_map(|id| self.get_script(id).transpose())
            .collect()
    }

    pub fn update_script(&mut self, row: &SigningScriptRow) -> Result<()> {
        self.put_row("script", row.id, row)
    }

    // ---- Transactions ----

    pub fn insert_tx(&mut self, mut row: TxRow) -> Result<TxRow> {
        let id = self.next_id("tx")?;
        row.id = id;
        self.put_idx("tx", "uhash", &row.unsigned_hash, id);
        if let Some(hash) = row.hash {
            self.put_idx("tx", "hash", &hash, id);
        }
        self.put_row("tx", id, &row)?;
        Ok(row)
    }

    pub fn get_tx(&self, id: RowId) -> Result<Option<TxRow>> {
        self.get_row("tx", id)
    }

    pub fn get_tx_by_unsigned_hash(&self, hash: &[u8; 32]) -> Result<Option<TxRow>> {
        match self.get_idx("tx", "uhash", hash)? {
            Some(id) => self.get_tx(id),
            None => Ok(None),
        }
    }

    pub fn get_tx_by_hash(&self, hash: &[u8; 32]) -> Result<Option<TxRow>> {
        match self.get_idx("tx", "hash", hash)? {
            Some(id) => self.get_tx(id),
            None => Ok(None),
        }
    }

    pub fn list_txs(&self) -> Result<Vec<TxRow>> {
        self.scan_rows("tx")
    }

    /// Updates the row and keeps the `hash` index in sync (a tx acquires
    /// `hash` only once it is fully signed, §3).
    pub fn update_tx(&mut self, old: Option<&TxRow>, new: &TxRow) -> Result<()> {
        if let Some(old) = old {
            if let Some(old_hash) = old.hash {
                if new.hash != Some(old_hash) {
                    self.delete_idx("tx", "hash", &old_hash);
                }
            }
        }
        if let Some(hash) = new.hash {
            self.put_idx("tx", "hash", &hash, new.id);
        }
        self.put_row("tx", new.id, new)
    }

    pub fn delete_tx(&mut self, id: RowId) -> Result<Option<TxRow>> {
        let row = self.get_tx(id)?;
        if let Some(row) = &row {
            self.delete_idx("tx", "uhash", &row.unsigned_hash);
            if let Some(hash) = row.hash {
                self.delete_idx("tx", "hash", &hash);
            }
            self.delete_row("tx", id);
        }
        Ok(row)
    }

    // ---- TxIns ----

    pub fn insert_txin(&mut self, mut row: TxInRow) -> Result<TxInRow> {
        let id = self.next_id("txin")?;
        row.id = id;
        self.put_row("txin", id, &row)?;
        Ok(row)
    }

    pub fn get_txin(&self, id: RowId) -> Result<Option<TxInRow>> {
        self.get_row("txin", id)
    }

    pub fn update_txin(&mut self, row: &TxInRow) -> Result<()> {
        self.put_row("txin", row.id, row)
    }

    pub fn delete_txin(&mut self, id: RowId) {
        self.delete_row("txin", id);
    }

    // ---- TxOuts ----

    pub fn insert_txout(&mut self, mut row: TxOutRow, out_hash: [u8; 32]) -> Result<TxOutRow> {
        let id = self.next_id("txout")?;
        row.id = id;
        self.put_idx(
            "txout",
            "outpoint",
            &outpoint_key(&out_hash, row.txindex),
            id,
        );
        if let Some(account_id) = row.receiving_account_id {
            self.put_idx("txout", "byaccount", &txout_byaccount_key(account_id, id), id);
        }
        self.put_row("txout", id, &row)?;
        Ok(row)
    }

    pub fn get_txout(&self, id: RowId) -> Result<Option<TxOutRow>> {
        self.get_row("txout", id)
    }

    pub fn get_txout_by_outpoint(&self, out_hash: &[u8; 32], out_index: u32) -> Result<Option<TxOutRow>> {
        match self.get_idx("txout", "outpoint", &outpoint_key(out_hash, out_index))? {
            Some(id) => self.get_txout(id),
            None => Ok(None),
        }
    }

    pub fn list_txouts_for_account(&self, account_id: RowId) -> Result<Vec<TxOutRow>> {
        let ids = self.scan_idx("txout", "byaccount", &account_id.to_be_bytes())?;
        ids.into_iter()
            .filter_map(|id| self.get_txout(id).transpose())
            .collect()
    }

    pub fn list_txouts(&self) -> Result<Vec<TxOutRow>> {
        self.scan_rows("txout")
    }

    pub fn update_txout(&mut self, row: &TxOutRow) -> Result<()> {
        self.put_row("txout", row.id, row)
    }

    pub fn delete_txout(&mut self, id: RowId, out_hash: &[u8; 32]) -> Result<()> {
        if let Some(row) = self.get_txout(id)? {
            self.delete_idx("txout", "outpoint", &outpoint_key(out_hash, row.txindex));
            if let Some(account_id) = row.receiving_account_id {
                self.delete_idx("txout", "byaccount", &txout_byaccount_key(account_id, id));
            }
        }
        self.delete_row("txout", id);
        Ok(())
    }

    /// Move the "outpoint" index entry for `id` from `(old_hash, txindex)`
    /// to `(new_hash, txindex)` — needed when a local tx's identity moves
    /// from `unsigned_hash` to its real `hash` once fully signed, so a
    /// spender looking up the output by the now-canonical txid still
    /// finds it.
    pub fn rekey_txout(&mut self, id: RowId, old_hash: &[u8; 32], new_hash: [u8; 32]) -> Result<()> {
        let row: Option<TxOutRow> = self.get_row("txout", id)?;
        if let Some(row) = row {
            self.delete_idx("txout", "outpoint", &outpoint_key(old_hash, row.txindex));
            self.put_idx("txout", "outpoint", &outpoint_key(&new_hash, row.txindex), id);
        }
        Ok(())
    }

    // ---- Block headers ----

    pub fn insert_block_header(&mut self, mut row: BlockHeaderRow) -> Result<BlockHeaderRow> {
        if let Some(id) = self.get_idx("block", "hash", &row.hash)? {
            return self.get_row("block", id).map(|r: Option<BlockHeaderRow>| r.unwrap());
        }
        let id = self.next_id("block")?;
        row.id = id;
        self.put_idx("block", "hash", &row.hash, id);
        self.put_idx("block", "height", &row.height.to_be_bytes(), id);
        self.put_row("block", id, &row)?;
        Ok(row)
    }

    pub fn get_block_header(&self, id: RowId) -> Result<Option<BlockHeaderRow>> {
        self.get_row("block", id)
    }

    pub fn get_block_header_by_height(&self, height: u32) -> Result<Option<BlockHeaderRow>> {
        match self.get_idx("block", "height", &height.to_be_bytes())? {
            Some(id) => self.get_block_header(id),
            None => Ok(None),
        }
    }

    pub fn get_block_header_by_hash(&self, hash: &[u8; 32]) -> Result<Option<BlockHeaderRow>> {
        match self.get_idx("block", "hash", hash)? {
            Some(id) => self.get_block_header(id),
            None => Ok(None),
        }
    }

    pub fn best_height(&self) -> Result<Option<u32>> {
        let rows: Vec<BlockHeaderRow> = self.scan_rows("block")?;
        Ok(rows.into_iter().map(|r| r.height).max())
    }

    pub fn list_block_headers(&self) -> Result<Vec<BlockHeaderRow>> {
        self.scan_rows("block")
    }

    pub fn delete_block_headers_from_height(&mut self, from_height: u32) -> Result<Vec<BlockHeaderRow>> {
        let rows: Vec<BlockHeaderRow> = self
            .scan_rows::<BlockHeaderRow>("block")?
            .into_iter()
            .filter(|r| r.height >= from_height)
            .collect();
        for row in &rows {
            self.delete_idx("block", "hash", &row.hash);
            self.delete_idx("block", "height", &row.height.to_be_bytes());
            self.delete_row("block", row.id);
        }
        Ok(rows)
    }

    // ---- Merkle blocks ----

    pub fn insert_merkle_block(&mut self, mut row: MerkleBlockRow) -> Result<MerkleBlockRow> {
        let id = self.next_id("merkleblock")?;
        row.id = id;
        self.put_idx(
            "merkleblock",
            "byheader",
            &row.block_header_id.to_be_bytes(),
            id,
        );
        self.put_row("merkleblock", id, &row)?;
        Ok(row)
    }

    pub fn get_merkle_block_by_header(&self, block_header_id: RowId) -> Result<Option<MerkleBlockRow>> {
        match self.get_idx("merkleblock", "byheader", &block_header_id.to_be_bytes())? {
            Some(id) => self.get_row("merkleblock", id),
            None => Ok(None),
        }
    }

    pub fn list_merkle_blocks(&self) -> Result<Vec<MerkleBlockRow>> {
        self.scan_rows("merkleblock")
    }

    // ---- Contacts ----

    pub fn insert_contact(&mut self, mut row: ContactRow) -> Result<ContactRow> {
        if self.get_idx("contact", "username", row.username.as_bytes())?.is_some() {
            return Err(VaultError::NameAlreadyExists {
                kind: EntityKind::Contact,
                name: row.username.clone(),
            });
        }
        let id = self.next_id("contact")?;
        row.id = id;
        self.put_idx("contact", "username", row.username.as_bytes(), id);
        self.put_row("contact", id, &row)?;
        Ok(row)
    }

    pub fn list_contacts(&self) -> Result<Vec<ContactRow>> {
        self.scan_rows("contact")
    }

    pub fn delete_contact(&mut self, username: &str) -> Result<()> {
        if let Some(id) = self.get_idx("contact", "username", username.as_bytes())? {
            self.delete_idx("contact", "username", username.as_bytes());
            self.delete_row("contact", id);
        }
        Ok(())
    }
}

fn bin_name_key(account_id: RowId, name: &str) -> Vec<u8> {
    let mut k = account_id.to_be_bytes().to_vec();
    k.extend_from_slice(name.as_bytes());
    k
}

fn bin_by_account_key(account_id: RowId, bin_id: RowId) -> Vec<u8> {
    let mut k = account_id.to_be_bytes().to_vec();
    k.extend_from_slice(&bin_id.to_be_bytes());
    k
}

fn script_bybin_key(bin_id: RowId, index: u32) -> Vec<u8> {
    let mut k = bin_id.to_be_bytes().to_vec();
    k.extend_from_slice(&index.to_be_bytes());
    k
}

fn outpoint_key(out_hash: &[u8; 32], out_index: u32) -> Vec<u8> {
    let mut k = out_hash.to_vec();
    k.extend_from_slice(&out_index.to_be_bytes());
    k
}

fn txout_byaccount_key(account_id: RowId, txout_id: RowId) -> Vec<u8> {
    let mut k = account_id.to_be_bytes().to_vec();
    k.extend_from_slice(&txout_id.to_be_bytes());
    k
}
