//! Transaction ingestion and classification (`spec.md` §4.5): the single
//! path by which a raw transaction — locally created, received from a
//! peer, or replayed from an export — enters the store.

use std::collections::HashMap;

use bitcoin::Transaction;

use crate::error::Result;
use crate::keychain::Keychain;
use crate::script;
use crate::signer;
use crate::store::model::{RowId, ScriptStatus, TxOutStatus, TxRow, TxStatus};
use crate::store::Txn;
use crate::tx;

pub struct IngestOutcome {
    pub tx: TxRow,
    pub inserted: bool,
    pub status_changed: bool,
    pub newly_confirmed: bool,
    pub conflicted: Vec<RowId>,
}

/// `insert_tx` — see `spec.md` §4.5 for the numbered steps this follows.
/// `account_keychains` supplies, for every account that might receive or
/// spend in this transaction, the (already chain-code-unlocked) keychains
/// needed to refill a signing-script pool after a match; a missing or
/// still-locked entry simply skips that bin's refill rather than failing
/// the whole ingest.
pub fn insert_tx(
    txn: &mut Txn<'_>,
    raw: &Transaction,
    timestamp: u32,
    default_status: TxStatus,
    account_keychains: &HashMap<RowId, Vec<Keychain>>,
) -> Result<IngestOutcome> {
    let u_hash = tx::unsigned_hash(raw);

    if let Some(existing) = txn.get_tx_by_unsigned_hash(&u_hash)? {
        return merge_into_existing(txn, existing, raw, default_status);
    }

    let (mut tx_row, txin_rows, txout_rows) = tx::rows_from_bitcoin_tx(raw, timestamp, default_status);
    let out_hash_key = tx_row.hash.unwrap_or(tx_row.unsigned_hash);

    let inserted = txn.insert_tx(tx_row.clone())?;
    let tx_id = inserted.id;

    let mut conflicted = Vec::new();
    let mut final_txins = Vec::with_capacity(txin_rows.len());
    let mut total_in: Option<u64> = Some(0);
    let mut spending_account_id: Option<RowId> = None;

    for mut txin in txin_rows {
        txin.tx_id = tx_id;
        match txn.get_txout_by_outpoint(&txin.out_hash, txin.out_index)? {
            Some(prev_txout) => {
                txin.outpoint_amount = Some(prev_txout.value);
                txin.is_multisig = prev_txout.receiving_script_id.is_some();
                total_in = total_in.map(|t| t + prev_txout.value);
                if spending_account_id.is_none() {
                    spending_account_id = prev_txout.receiving_account_id;
                }
                if let Some(old_spent_id) = prev_txout.spent_txin_id {
                    flag_conflict(txn, old_spent_id, tx_id, &mut conflicted)?;
                }
            }
            None => total_in = None,
        }
        let row = txn.insert_txin(txin)?;
        final_txins.push(row);
    }

    for txin in &final_txins {
        if let Some(mut prev_txout) = txn.get_txout_by_outpoint(&txin.out_hash, txin.out_index)? {
            prev_txout.status = TxOutStatus::Spent;
            prev_txout.spent_txin_id = Some(txin.id);
            txn.update_txout(&prev_txout)?;
        }
    }

    let mut final_txouts = Vec::with_capacity(txout_rows.len());
    let mut total_out: u64 = 0;
    for mut txout in txout_rows {
        txout.tx_id = tx_id;
        total_out += txout.value;
        if let Some(mut script_row) = txn.get_script_by_txoutscript(&txout.script)? {
            if script_row.status != ScriptStatus::USED {
                txout.receiving_account_id = Some(script_row.account_id);
                txout.receiving_bin_id = Some(script_row.bin_id);
                txout.receiving_script_id = Some(script_row.id);
                script_row.status = ScriptStatus::USED;
                txn.update_script(&script_row)?;
                refill_after_match(txn, script_row.account_id, script_row.bin_id, account_keychains);
            }
        }
        if txout.receiving_account_id.is_none() {
            txout.sending_account_id = spending_account_id;
        }
        let row = txn.insert_txout(txout, out_hash_key)?;
        final_txouts.push(row);
    }

    tx_row.input_ids = final_txins.iter().map(|r| r.id).collect();
    tx_row.output_ids = final_txouts.iter().map(|r| r.id).collect();
    tx_row.fee = total_in.map(|t_in| t_in.saturating_sub(total_out));

    let missing = tx::missing_sig_count(&final_txins)?;
    let mut newly_confirmed = false;
    if missing > 0 {
        tx_row.status = TxStatus::UNSIGNED;
        tx_row.hash = None;
    } else {
        tx_row.status = default_status;
        if let Some(hash) = tx_row.hash {
            for mb in txn.list_merkle_blocks()? {
                if let Some(idx) = mb.hashes.iter().position(|h| *h == hash) {
                    tx_row.block_header_id = Some(mb.block_header_id);
                    tx_row.block_index = Some(idx as u32);
                    tx_row.pre_confirm_status = Some(tx_row.status);
                    tx_row.status = TxStatus::CONFIRMED;
                    newly_confirmed = true;
                    break;
                }
            }
        }
    }
    tx_row.id = tx_id;
    txn.update_tx(Some(&inserted), &tx_row)?;

    // Outputs were first indexed under the tentative guess `rows_from_bitcoin_tx`
    // made before `missing_sig_count` saw which inputs are actually ours; if the
    // authoritative hash differs (e.g. the guess thought a foreign scriptSig meant
    // "fully signed" but this tx turned out to still be missing a signature, or
    // vice versa), re-point the index to the real key.
    let final_hash_key = tx_row.hash.unwrap_or(tx_row.unsigned_hash);
    if final_hash_key != out_hash_key {
        for id in &tx_row.output_ids {
            txn.rekey_txout(*id, &out_hash_key, final_hash_key)?;
        }
    }

    Ok(IngestOutcome {
        tx: tx_row,
        inserted: true,
        status_changed: true,
        newly_confirmed,
        conflicted,
    })
}

fn flag_conflict(
    txn: &mut Txn<'_>,
    old_spent_txin_id: RowId,
    new_tx_id: RowId,
    conflicted: &mut Vec<RowId>,
) -> Result<()> {
    let old_txin = match txn.get_txin(old_spent_txin_id)? {
        Some(t) => t,
        None => return Ok(()),
    };
    if old_txin.tx_id == new_tx_id {
        return Ok(());
    }
    let old_tx = match txn.get_tx(old_txin.tx_id)? {
        Some(t) => t,
        None => return Ok(()),
    };
    if matches!(old_tx.status, TxStatus::CONFIRMED | TxStatus::CONFLICTING | TxStatus::CANCELED) {
        return Ok(());
    }
    let mut updated = old_tx.clone();
    updated.pre_conflict_status = Some(old_tx.status);
    updated.status = TxStatus::CONFLICTING;
    txn.update_tx(Some(&old_tx), &updated)?;
    conflicted.push(old_tx.id);
    Ok(())
}

/// After a tx is removed, re-examine every other tx spending one of its
/// freed outpoints: if one of them is the `CONFLICTING` loser of a
/// double-spend against the tx just deleted, restore it to its
/// pre-conflict status and re-point the outpoint at its own input
/// (`spec.md` §8 S5).
fn resurrect_conflicting_spenders(txn: &mut Txn<'_>, removed_txins: &[crate::store::model::TxInRow]) -> Result<()> {
    for removed in removed_txins {
        let candidates: Vec<TxRow> = txn
            .list_txs()?
            .into_iter()
            .filter(|t| t.status == TxStatus::CONFLICTING)
            .collect();
        for mut candidate in candidates {
            let spends_same_outpoint = candidate.input_ids.iter().any(|id| {
                txn.get_txin(*id)
                    .ok()
                    .flatten()
                    .map(|txin| txin.out_hash == removed.out_hash && txin.out_index == removed.out_index)
                    .unwrap_or(false)
            });
            if !spends_same_outpoint {
                continue;
            }
            let restored_status = candidate.pre_conflict_status.unwrap_or(TxStatus::RECEIVED);
            let old_candidate = candidate.clone();
            candidate.status = restored_status;
            candidate.pre_conflict_status = None;
            txn.update_tx(Some(&old_candidate), &candidate)?;

            if let Some(txin_id) = candidate
                .input_ids
                .iter()
                .find(|id| {
                    txn.get_txin(**id)
                        .ok()
                        .flatten()
                        .map(|txin| txin.out_hash == removed.out_hash && txin.out_index == removed.out_index)
                        .unwrap_or(false)
                })
                .copied()
            {
                if let Some(mut prev_txout) = txn.get_txout_by_outpoint(&removed.out_hash, removed.out_index)? {
                    prev_txout.status = TxOutStatus::Spent;
                    prev_txout.spent_txin_id = Some(txin_id);
                    txn.update_txout(&prev_txout)?;
                }
            }
        }
    }
    Ok(())
}

fn refill_after_match(
    txn: &mut Txn<'_>,
    account_id: RowId,
    bin_id: RowId,
    account_keychains: &HashMap<RowId, Vec<Keychain>>,
) {
    let keychains = match account_keychains.get(&account_id) {
        Some(k) => k,
        None => return,
    };
    let account = match txn.get_account(account_id) {
        Ok(Some(a)) => a,
        _ => return,
    };
    let mut bin = match txn.get_bin(bin_id) {
        Ok(Some(b)) => b,
        _ => return,
    };
    if let Err(err) = script::refill_pool(txn, &account, &mut bin, keychains) {
        tracing::warn!(%err, bin_id, "signing-script pool refill skipped");
    }
}

fn merge_into_existing(
    txn: &mut Txn<'_>,
    existing: TxRow,
    raw: &Transaction,
    default_status: TxStatus,
) -> Result<IngestOutcome> {
    if existing.status != TxStatus::UNSIGNED {
        return Ok(IngestOutcome {
            tx: existing,
            inserted: false,
            status_changed: false,
            newly_confirmed: false,
            conflicted: Vec::new(),
        });
    }

    let old_txins: Vec<_> = existing
        .input_ids
        .iter()
        .filter_map(|id| txn.get_txin(*id).transpose())
        .collect::<Result<Vec<_>>>()?;

    let (merged_txins, changed) = signer::merge_txins(txn, &old_txins, raw, true)?;
    if !changed {
        return Ok(IngestOutcome {
            tx: existing,
            inserted: false,
            status_changed: false,
            newly_confirmed: false,
            conflicted: Vec::new(),
        });
    }

    for row in &merged_txins {
        txn.update_txin(row)?;
    }

    let missing = tx::missing_sig_count(&merged_txins)?;
    let mut new_tx = existing.clone();
    if missing == 0 {
        new_tx.status = default_status;
        let txouts: Vec<_> = existing
            .output_ids
            .iter()
            .filter_map(|id| txn.get_txout(*id).transpose())
            .collect::<Result<Vec<_>>>()?;
        let signed_raw = tx::to_bitcoin_tx(&new_tx, &merged_txins, &txouts)?;
        new_tx.hash = Some(tx::signed_hash(&signed_raw));
    }
    txn.update_tx(Some(&existing), &new_tx)?;

    // Outputs are indexed by the identity their owning tx had at insertion
    // time (`unsigned_hash`, since a merge only ever starts from an
    // UNSIGNED row). Once the merge completes the signature set, the tx's
    // real `hash` becomes its spendable identity — re-point the index so a
    // later `insert_tx` can resolve this output by outpoint.
    if let Some(new_hash) = new_tx.hash {
        if Some(new_hash) != existing.hash {
            let old_hash = existing.hash.unwrap_or(existing.unsigned_hash);
            for id in &new_tx.output_ids {
                txn.rekey_txout(*id, &old_hash, new_hash)?;
            }
        }
    }

    Ok(IngestOutcome {
        tx: new_tx,
        inserted: false,
        status_changed: true,
        newly_confirmed: false,
        conflicted: Vec::new(),
    })
}

/// `delete_tx` — cascades to txins/txouts and resets the `spent` status of
/// previously-consumed outputs (`spec.md` §4.5).
pub fn delete_tx(txn: &mut Txn<'_>, id: RowId) -> Result<Option<TxRow>> {
    let tx = match txn.get_tx(id)? {
        Some(t) => t,
        None => return Ok(None),
    };

    let mut freed_txins = Vec::new();
    for input_id in &tx.input_ids {
        if let Some(txin) = txn.get_txin(*input_id)? {
            if let Some(mut prev_txout) = txn.get_txout_by_outpoint(&txin.out_hash, txin.out_index)? {
                if prev_txout.spent_txin_id == Some(txin.id) {
                    prev_txout.status = TxOutStatus::Unspent;
                    prev_txout.spent_txin_id = None;
                    txn.update_txout(&prev_txout)?;
                    freed_txins.push(txin.clone());
                }
            }
            txn.delete_txin(*input_id);
        }
    }

    resurrect_conflicting_spenders(txn, &freed_txins)?;

    let out_hash = tx.hash.unwrap_or(tx.unsigned_hash);
    for output_id in &tx.output_ids {
        txn.delete_txout(*output_id, &out_hash)?;
    }

    txn.delete_tx(id)?;
    Ok(Some(tx))
}
