//! The read-side views required by `spec.md` §4.1. Each is a plain
//! function over a `Txn` rather than a materialized SQL view — there is no
//! query engine underneath, only the flat `sled` keyspace described in
//! `mod.rs`, so a view is "recomputed on every call" rather than cached.
//! That is acceptable given the concurrency model of §5: one mutex, short
//! operations, no concurrent readers to go stale relative to.

use super::model::*;
use super::Txn;
use crate::error::Result;

#[derive(Clone, Debug)]
pub struct AccountBinViewRow {
    pub account_id: RowId,
    pub account_name: String,
    pub bin_id: RowId,
    pub bin_name: String,
}

pub fn account_bin_view(txn: &Txn<'_>) -> Result<Vec<AccountBinViewRow>> {
    let accounts = txn.list_accounts()?;
    let mut out = Vec::new();
    for account in accounts {
        for bin in txn.list_bins_for_account(account.id)? {
            out.push(AccountBinViewRow {
                account_id: account.id,
                account_name: account.name.clone(),
                bin_id: bin.id,
                bin_name: bin.name,
            });
        }
    }
    Ok(out)
}

#[derive(Clone, Debug)]
pub struct SigningScriptViewRow {
    pub script: SigningScriptRow,
    pub account_name: String,
    pub bin_name: String,
}

/// Scripts of one account filtered by an optional bin name and a status
/// bitmask (any bit in `status_mask` matching the script's status
/// qualifies it, per the bitset semantics in `spec.md` §3).
pub fn signing_script_view(
    txn: &Txn<'_>,
    account_id: RowId,
    bin_name: Option<&str>,
    status_mask: ScriptStatus,
) -> Result<Vec<SigningScriptViewRow>> {
    let account = match txn.get_account(account_id)? {
        Some(a) => a,
        None => return Ok(Vec::new()),
    };
    let bins = txn.list_bins_for_account(account_id)?;
    let mut out = Vec::new();
    for bin in bins {
        if let Some(name) = bin_name {
            if bin.name != name {
                continue;
            }
        }
        for script in txn.list_scripts_in_bin(bin.id)? {
            if script.status.matches(status_mask) {
                out.push(SigningScriptViewRow {
                    script,
                    account_name: account.name.clone(),
                    bin_name: bin.name.clone(),
                });
            }
        }
    }
    Ok(out)
}

pub fn script_count_view(
    txn: &Txn<'_>,
    account_id: RowId,
    bin_name: Option<&str>,
    status_mask: ScriptStatus,
) -> Result<usize> {
    Ok(signing_script_view(txn, account_id, bin_name, status_mask)?.len())
}

#[derive(Clone, Debug)]
pub struct TxOutViewRow {
    pub txout: TxOutRow,
    pub tx_id: RowId,
    pub tx_status: TxStatus,
    pub tx_unsigned_hash: [u8; 32],
    pub block_height: Option<u32>,
}

/// `TxOut ⨝ Tx ⨝ BlockHeader`, restricted to outputs received by
/// `account_id`. Sender-side and receiver-side accounting both read a
/// `TxOutRow` directly (it already carries both `sending_account_id` and
/// `receiving_account_id`); this view adds the transaction and block
/// context every caller of `spec.md` §4.1 needs alongside it.
pub fn txout_view_for_account(txn: &Txn<'_>, account_id: RowId) -> Result<Vec<TxOutViewRow>> {
    let mut out = Vec::new();
    for txout in txn.list_txouts_for_account(account_id)? {
        let tx = match txn.get_tx(txout.tx_id)? {
            Some(tx) => tx,
            None => continue,
        };
        let block_height = match tx.block_header_id {
            Some(bh_id) => txn.get_block_header(bh_id)?.map(|b| b.height),
            None => None,
        };
        out.push(TxOutViewRow {
            txout,
            tx_id: tx.id,
            tx_status: tx.status,
            tx_unsigned_hash: tx.unsigned_hash,
            block_height,
        });
    }
    Ok(out)
}

/// `SUM(value)` over unspent outputs of `account_id`, restricted to
/// confirmed-with-enough-depth outputs when `min_confirmations > 0`, or to
/// every unspent output (confirmed or not) when `min_confirmations == 0`.
pub fn balance_view(txn: &Txn<'_>, account_id: RowId, min_confirmations: u32) -> Result<u64> {
    let best_height = txn.best_height()?.unwrap_or(0);
    let mut total = 0u64;
    for row in txout_view_for_account(txn, account_id)? {
        if row.txout.status != TxOutStatus::Unspent {
            continue;
        }
        if min_confirmations == 0 {
            total += row.txout.value;
            continue;
        }
        let confs = match row.block_height {
            Some(h) if row.tx_status == TxStatus::CONFIRMED => best_height.saturating_sub(h) + 1,
            _ => 0,
        };
        if confs >= min_confirmations {
            total += row.txout.value;
        }
    }
    Ok(total)
}

pub fn horizon_timestamp_view(txn: &Txn<'_>) -> Result<Option<u32>> {
    Ok(txn.list_accounts()?.into_iter().map(|a| a.time_created).min())
}

/// The height of the earliest known block header at or after the horizon
/// timestamp — the lowest point a rescan needs to start from. `None` when
/// no account exists yet, or when every known header predates the horizon
/// (the scan should start from genesis, which the caller already knows).
pub fn horizon_height_view(txn: &Txn<'_>) -> Result<Option<u32>> {
    let horizon = match horizon_timestamp_view(txn)? {
        Some(t) => t,
        None => return Ok(None),
    };
    Ok(txn
        .list_block_headers()?
        .into_iter()
        .filter(|h| h.timestamp >= horizon)
        .map(|h| h.height)
        .min())
}

/// Transactions that appear in some stored `MerkleBlock`'s hash list,
/// joined to the block header that carries the proof.
pub fn confirmed_tx_view(txn: &Txn<'_>) -> Result<Vec<(TxRow, BlockHeaderRow)>> {
    let mut out = Vec::new();
    for mb in txn.list_merkle_blocks()? {
        let header = match txn.get_block_header(mb.block_header_id)? {
            Some(h) => h,
            None => continue,
        };
        for hash in &mb.hashes {
            if let Some(tx) = txn.get_tx_by_hash(hash)? {
                out.push((tx, header.clone()));
            }
        }
    }
    Ok(out)
}
