//! Coin selection and transaction construction (`spec.md` §4.7).

use std::collections::HashMap;

use bitcoin::{OutPoint, Script, Transaction, TxIn as BtcTxIn, TxOut as BtcTxOut};
use rand::seq::SliceRandom;

use crate::error::{Result, VaultError};
use crate::ingest;
use crate::keychain::Keychain;
use crate::script;
use crate::store::model::{AccountRow, RowId, TxOutStatus, TxStatus};
use crate::store::views;
use crate::store::Txn;

pub struct Output {
    pub script_pubkey: Vec<u8>,
    pub value: u64,
}

/// `create_tx(account, version, locktime, outputs, fee, min_confirmations,
/// allow_unconfirmed)` — greedy coin selection, an optional change output
/// minted from the account's `@change` bin, shuffled inputs/outputs, then
/// inserted as if freshly received locally.
pub fn create_tx(
    txn: &mut Txn<'_>,
    account: &AccountRow,
    version: i32,
    lock_time: u32,
    outputs: &[Output],
    fee: u64,
    min_confirmations: u32,
    allow_unconfirmed: bool,
    keychains: &[Keychain],
    timestamp: u32,
) -> Result<ingest::IngestOutcome> {
    let target: u64 = outputs.iter().map(|o| o.value).sum::<u64>() + fee;
    let best_height = txn.best_height()?.unwrap_or(0);

    let mut candidates: Vec<_> = views::txout_view_for_account(txn, account.id)?
        .into_iter()
        .filter(|row| row.txout.status == TxOutStatus::Unspent)
        .filter(|row| {
            if allow_unconfirmed {
                return true;
            }
            match row.block_height {
                Some(h) if row.tx_status == TxStatus::CONFIRMED => {
                    best_height.saturating_sub(h) + 1 >= min_confirmations.max(1)
                }
                _ => false,
            }
        })
        .collect();
    candidates.sort_by_key(|row| (row.block_height.unwrap_or(u32::MAX), row.tx_id, row.txout.txindex));

    let mut selected = Vec::new();
    let mut total = 0u64;
    for candidate in candidates {
        if total >= target {
            break;
        }
        total += candidate.txout.value;
        selected.push(candidate);
    }
    if total < target {
        return Err(VaultError::InsufficientFunds {
            needed: target,
            available: total,
        });
    }

    let mut inputs = Vec::with_capacity(selected.len());
    for candidate in &selected {
        let tx_row = txn
            .get_tx(candidate.tx_id)?
            .ok_or_else(|| VaultError::SerializationError("selected txout has no parent tx".to_string()))?;
        let out_hash = tx_row.hash.unwrap_or(tx_row.unsigned_hash);
        let placeholder_script = placeholder_for(txn, &candidate.txout)?;
        inputs.push(BtcTxIn {
            previous_output: OutPoint {
                txid: bitcoin::Txid::from_inner(out_hash),
                vout: candidate.txout.txindex,
            },
            script_sig: placeholder_script,
            sequence: 0xFFFFFFFF,
            witness: Vec::new(),
        });
    }

    let mut btc_outputs: Vec<BtcTxOut> = outputs
        .iter()
        .map(|o| BtcTxOut {
            value: o.value,
            script_pubkey: Script::from(o.script_pubkey.clone()),
        })
        .collect();

    if total > target {
        let mut change_bin = txn
            .get_bin_by_name(account.id, crate::store::model::CHANGE_BIN_NAME)?
            .ok_or_else(|| VaultError::NotFound {
                kind: crate::error::EntityKind::AccountBin,
                key: crate::store::model::CHANGE_BIN_NAME.to_string(),
            })?;
        let change_script = script::issue_script(txn, account, &mut change_bin, keychains, "", true)?;
        btc_outputs.push(BtcTxOut {
            value: total - target,
            script_pubkey: Script::from(change_script.txout_script),
        });
    }

    let mut rng = rand::thread_rng();
    inputs.shuffle(&mut rng);
    btc_outputs.shuffle(&mut rng);

    let raw = Transaction {
        version,
        lock_time,
        input: inputs,
        output: btc_outputs,
    };

    let mut keychains_by_account: HashMap<RowId, Vec<Keychain>> = HashMap::new();
    keychains_by_account.insert(account.id, keychains.to_vec());

    ingest::insert_tx(txn, &raw, timestamp, TxStatus::UNSIGNED, &keychains_by_account)
}

fn placeholder_for(txn: &Txn<'_>, txout: &crate::store::model::TxOutRow) -> Result<Script> {
    let script_id = txout
        .receiving_script_id
        .ok_or_else(|| VaultError::SerializationError("txout has no signing script".to_string()))?;
    let script_row = txn
        .get_script(script_id)?
        .ok_or_else(|| VaultError::NotFound {
            kind: crate::error::EntityKind::SigningScript,
            key: script_id.to_string(),
        })?;
    Ok(Script::from(script_row.txin_script))
}

/// Bulk variant: package many UTXOs into one or more transactions whose
/// serialized size does not exceed `max_tx_size`, each paying back to
/// `payout_script` after deducting `min_fee`.
pub fn consolidate_tx_outs(
    txn: &mut Txn<'_>,
    account: &AccountRow,
    payout_script: &[u8],
    min_fee: u64,
    max_tx_size: usize,
    keychains: &[Keychain],
    timestamp: u32,
) -> Result<Vec<ingest::IngestOutcome>> {
    let mut candidates: Vec<_> = views::txout_view_for_account(txn, account.id)?
        .into_iter()
        .filter(|row| row.txout.status == TxOutStatus::Unspent)
        .collect();
    candidates.sort_by_key(|row| (row.block_height.unwrap_or(u32::MAX), row.tx_id, row.txout.txindex));

    const ASSUMED_INPUT_SIZE: usize = 300;
    const BASE_TX_SIZE: usize = 64;

    let mut outcomes = Vec::new();
    let mut batch = Vec::new();
    let mut batch_value = 0u64;
    let mut batch_size = BASE_TX_SIZE;

    for candidate in candidates {
        if batch_size + ASSUMED_INPUT_SIZE > max_tx_size && !batch.is_empty() {
            outcomes.push(flush_consolidation_batch(
                txn, account, &batch, batch_value, payout_script, min_fee, keychains, timestamp,
            )?);
            batch.clear();
            batch_value = 0;
            batch_size = BASE_TX_SIZE;
        }
        batch_value += candidate.txout.value;
        batch_size += ASSUMED_INPUT_SIZE;
        batch.push(candidate);
    }
    if !batch.is_empty() {
        outcomes.push(flush_consolidation_batch(
            txn, account, &batch, batch_value, payout_script, min_fee, keychains, timestamp,
        )?);
    }
    Ok(outcomes)
}

fn flush_consolidation_batch(
    txn: &mut Txn<'_>,
    account: &AccountRow,
    batch: &[views::TxOutViewRow],
    batch_value: u64,
    payout_script: &[u8],
    min_fee: u64,
    keychains: &[Keychain],
    timestamp: u32,
) -> Result<ingest::IngestOutcome> {
    let mut inputs = Vec::with_capacity(batch.len());
    for candidate in batch {
        let tx_row = txn
            .get_tx(candidate.tx_id)?
            .ok_or_else(|| VaultError::SerializationError("selected txout has no parent tx".to_string()))?;
        let out_hash = tx_row.hash.unwrap_or(tx_row.unsigned_hash);
        let placeholder_script = placeholder_for(txn, &candidate.txout)?;
        inputs.push(BtcTxIn {
            previous_output: OutPoint {
                txid: bitcoin::Txid::from_inner(out_hash),
                vout: candidate.txout.txindex,
            },
            script_sig: placeholder_script,
            sequence: 0xFFFFFFFF,
            witness: Vec::new(),
        });
    }

    let payout_value = batch_value.saturating_sub(min_fee);
    let raw = Transaction {
        version: 1,
        lock_time: 0,
        input: inputs,
        output: vec![BtcTxOut {
            value: payout_value,
            script_pubkey: Script::from(payout_script.to_vec()),
        }],
    };

    let mut keychains_by_account: HashMap<RowId, Vec<Keychain>> = HashMap::new();
    keychains_by_account.insert(account.id, keychains.to_vec());
    ingest::insert_tx(txn, &raw, timestamp, TxStatus::UNSIGNED, &keychains_by_account)
}
