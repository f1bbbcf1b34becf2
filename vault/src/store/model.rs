//! Row types persisted in the store. Plain value structs — per the
//! REDESIGN FLAGS in `spec.md` §9, nothing here holds a reference-counted
//! handle or an in-memory pointer to another row; relationships are
//! expressed as stable row ids resolved through the store.

use serde::{Deserialize, Serialize};

pub type RowId = u64;

/// `SigningScript.status`, a bitset-encoded enum (`spec.md` §3).
#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct ScriptStatus(pub u8);

impl ScriptStatus {
    pub const UNUSED: ScriptStatus = ScriptStatus(1);
    pub const CHANGE: ScriptStatus = ScriptStatus(1 << 1);
    pub const ISSUED: ScriptStatus = ScriptStatus(1 << 2);
    pub const USED: ScriptStatus = ScriptStatus(1 << 3);
    pub const ALL: ScriptStatus = ScriptStatus((1 << 4) - 1);

    pub fn matches(self, mask: ScriptStatus) -> bool {
        self.0 & mask.0 != 0
    }
}

impl std::ops::BitOr for ScriptStatus {
    type Output = ScriptStatus;
    fn bitor(self, rhs: ScriptStatus) -> ScriptStatus {
        ScriptStatus(self.0 | rhs.0)
    }
}

/// `Tx.status`, §3.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct TxStatus(pub u8);

impl TxStatus {
    pub const UNSIGNED: TxStatus = TxStatus(1);
    pub const UNSENT: TxStatus = TxStatus(1 << 1);
    pub const SENT: TxStatus = TxStatus(1 << 2);
    pub const RECEIVED: TxStatus = TxStatus(1 << 3);
    pub const CONFLICTING: TxStatus = TxStatus(1 << 4);
    pub const CANCELED: TxStatus = TxStatus(1 << 5);
    pub const CONFIRMED: TxStatus = TxStatus(1 << 6);
}

impl std::fmt::Display for TxStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match *self {
            TxStatus::UNSIGNED => "UNSIGNED",
            TxStatus::UNSENT => "UNSENT",
            TxStatus::SENT => "SENT",
            TxStatus::RECEIVED => "RECEIVED",
            TxStatus::CONFLICTING => "CONFLICTING",
            TxStatus::CANCELED => "CANCELED",
            TxStatus::CONFIRMED => "CONFIRMED",
            _ => "UNKNOWN",
        };
        f.write_str(s)
    }
}

/// `TxOut.status`, §3. Redundant with `spent`, maintained for query speed.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub enum TxOutStatus {
    Unspent,
    Spent,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct KeychainRow {
    pub id: RowId,
    pub name: String,
    pub depth: u32,
    pub parent_fingerprint: u32,
    pub child_num: u32,
    /// 33-byte compressed public key.
    pub pubkey: Vec<u8>,
    /// Plaintext chain code, present only while unlocked in memory. Never
    /// written to the store in this field; see `chain_code_sealed`.
    #[serde(skip)]
    pub chain_code_plain: Option<[u8; 32]>,
    pub chain_code_sealed: Option<crate::crypto::Sealed>,
    #[serde(skip)]
    pub privkey_plain: Option<[u8; 32]>,
    pub privkey_sealed: Option<crate::crypto::Sealed>,
    pub parent_id: Option<RowId>,
    pub derivation_path: Vec<u32>,
    pub hash: [u8; 20],
}

impl KeychainRow {
    pub fn is_root(&self) -> bool {
        self.parent_id.is_none()
    }

    pub fn is_private(&self) -> bool {
        self.privkey_plain.is_some() || self.privkey_sealed.is_some()
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AccountRow {
    pub id: RowId,
    pub name: String,
    pub minsigs: u8,
    pub keychain_ids: Vec<RowId>,
    pub unused_pool_size: u32,
    pub time_created: u32,
    pub hash: [u8; 20],
}

pub const CHANGE_BIN_INDEX: u32 = 1;
pub const DEFAULT_BIN_INDEX: u32 = 2;
pub const CHANGE_BIN_NAME: &str = "@change";
pub const DEFAULT_BIN_NAME: &str = "@default";

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AccountBinRow {
    pub id: RowId,
    pub account_id: RowId,
    pub index: u32,
    pub name: String,
    /// Next index that will be minted by the pool (monotonically
    /// increasing, post-incremented on mint).
    pub script_count: u32,
    /// Highest *issued* index + 1 (the Open Question resolution in
    /// `spec.md` §9: this only advances on explicit issuance/use, never on
    /// a bare mint).
    pub next_script_index: u32,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SigningScriptRow {
    pub id: RowId,
    pub account_id: RowId,
    pub bin_id: RowId,
    pub index: u32,
    pub label: String,
    pub status: ScriptStatus,
    pub txin_script: Vec<u8>,
    pub txout_script: Vec<u8>,
    /// Sorted child pubkeys, one per root keychain of the account.
    pub pubkeys: Vec<Vec<u8>>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TxRow {
    pub id: RowId,
    pub version: i32,
    pub lock_time: u32,
    pub input_ids: Vec<RowId>,
    pub output_ids: Vec<RowId>,
    pub timestamp: u32,
    pub status: TxStatus,
    /// Valid iff fully signed.
    pub hash: Option<[u8; 32]>,
    /// Always defined, the unique natural key.
    pub unsigned_hash: [u8; 32],
    pub fee: Option<u64>,
    pub block_header_id: Option<RowId>,
    pub block_index: Option<u32>,
    /// The status this tx held immediately before it was marked
    /// `CONFIRMED`, so a reorg (`delete_merkle_block`) can restore it
    /// exactly rather than guessing `SENT` vs `RECEIVED` (`spec.md` §4.8).
    pub pre_confirm_status: Option<TxStatus>,
    /// The status this tx held immediately before it was marked
    /// `CONFLICTING` by a later double-spend, so deleting the winning tx
    /// (`spec.md` §8 S5) can restore it instead of leaving it stuck.
    pub pre_conflict_status: Option<TxStatus>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TxInRow {
    pub id: RowId,
    pub tx_id: RowId,
    pub txindex: u32,
    pub out_hash: [u8; 32],
    pub out_index: u32,
    pub script: Vec<u8>,
    pub sequence: u32,
    pub outpoint_amount: Option<u64>,
    /// Whether this input spends one of our own signing-script outputs —
    /// the only case where `script` follows the placeholder/multisig
    /// scriptSig shape `parse_script_sig` understands. An input spending
    /// someone else's output (or an outpoint this vault never saw) carries
    /// whatever scriptSig its original signer produced, in whatever format,
    /// and is not ours to count signatures on.
    #[serde(default)]
    pub is_multisig: bool,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TxOutRow {
    pub id: RowId,
    pub tx_id: RowId,
    pub txindex: u32,
    pub value: u64,
    pub script: Vec<u8>,
    pub status: TxOutStatus,
    pub spent_txin_id: Option<RowId>,
    pub sending_account_id: Option<RowId>,
    pub sending_label: Option<String>,
    pub receiving_account_id: Option<RowId>,
    pub receiving_bin_id: Option<RowId>,
    pub receiving_script_id: Option<RowId>,
    pub receiving_label: Option<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BlockHeaderRow {
    pub id: RowId,
    pub hash: [u8; 32],
    pub height: u32,
    pub version: i32,
    pub prev_hash: [u8; 32],
    pub merkle_root: [u8; 32],
    pub timestamp: u32,
    pub bits: u32,
    pub nonce: u32,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MerkleBlockRow {
    pub id: RowId,
    pub block_header_id: RowId,
    pub txcount: u32,
    pub hashes: Vec<[u8; 32]>,
    pub flags: Vec<u8>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ContactRow {
    pub id: RowId,
    pub username: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MetaRow {
    pub schema_version: u32,
    pub network_name: String,
}
