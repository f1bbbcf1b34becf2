//! Transactions, inputs and outputs as stored rows, and their conversion
//! to and from `bitcoin::Transaction` wire values (`spec.md` §3, §4.5).

use bitcoin::hashes::{sha256d, Hash};
use bitcoin::{OutPoint, Script, Transaction, TxIn as BtcTxIn, TxOut as BtcTxOut};

use crate::error::{Result, VaultError};
use crate::store::model::{RowId, TxInRow, TxOutRow, TxOutStatus, TxRow, TxStatus};

/// Double-SHA256 of the consensus serialization with every `script_sig`
/// cleared — the natural key that survives third-party signature
/// malleability (`spec.md` §4.5 "Hash invariant").
pub fn unsigned_hash(tx: &Transaction) -> [u8; 32] {
    let mut stripped = tx.clone();
    for input in stripped.input.iter_mut() {
        input.script_sig = Script::new();
    }
    let bytes = bitcoin::consensus::serialize(&stripped);
    sha256d::Hash::hash(&bytes).into_inner()
}

/// Double-SHA256 of the fully-signed consensus serialization, valid only
/// once every input carries its final `script_sig`.
pub fn signed_hash(tx: &Transaction) -> [u8; 32] {
    let bytes = bitcoin::consensus::serialize(tx);
    sha256d::Hash::hash(&bytes).into_inner()
}

/// Build a `bitcoin::Transaction` from stored rows, `input_ids`/`output_ids`
/// resolved and ordered exactly as recorded on the `TxRow`.
pub fn to_bitcoin_tx(tx: &TxRow, txins: &[TxInRow], txouts: &[TxOutRow]) -> Result<Transaction> {
    let mut by_id_in: std::collections::HashMap<RowId, &TxInRow> =
        txins.iter().map(|r| (r.id, r)).collect();
    let mut by_id_out: std::collections::HashMap<RowId, &TxOutRow> =
        txouts.iter().map(|r| (r.id, r)).collect();

    let mut input = Vec::with_capacity(tx.input_ids.len());
    for id in &tx.input_ids {
        let row = by_id_in
            .remove(id)
            .ok_or_else(|| VaultError::SerializationError(format!("missing txin row {}", id)))?;
        input.push(BtcTxIn {
            previous_output: OutPoint {
                txid: bitcoin::Txid::from_inner(row.out_hash),
                vout: row.out_index,
            },
            script_sig: Script::from(row.script.clone()),
            sequence: row.sequence,
            witness: Vec::new(),
        });
    }

    let mut output = Vec::with_capacity(tx.output_ids.len());
    for id in &tx.output_ids {
        let row = by_id_out
            .remove(id)
            .ok_or_else(|| VaultError::SerializationError(format!("missing txout row {}", id)))?;
        output.push(BtcTxOut {
            value: row.value,
            script_pubkey: Script::from(row.script.clone()),
        });
    }

    Ok(Transaction {
        version: tx.version,
        lock_time: tx.lock_time,
        input,
        output,
    })
}

/// Build fresh (unsaved, `id == 0`) rows from a raw transaction plus the
/// bookkeeping fields the ingestion pipeline fills in afterward.
pub fn rows_from_bitcoin_tx(raw: &Transaction, timestamp: u32, status: TxStatus) -> (TxRow, Vec<TxInRow>, Vec<TxOutRow>) {
    let u_hash = unsigned_hash(raw);
    // A tentative guess only, used to pick the key outputs are first
    // indexed under; `insert_tx` recomputes the authoritative status/hash
    // once it knows which inputs are actually ours (see `is_multisig`
    // below) and re-keys if this guess turns out wrong. A non-empty
    // scriptSig of unknown shape is assumed complete — only an empty one
    // (no attempt at all) is unambiguously unsigned.
    let is_fully_signed = raw.input.iter().all(|i| !i.script_sig.is_empty());

    let txins = raw
        .input
        .iter()
        .enumerate()
        .map(|(idx, input)| TxInRow {
            id: 0,
            tx_id: 0,
            txindex: idx as u32,
            out_hash: input.previous_output.txid.into_inner(),
            out_index: input.previous_output.vout,
            script: input.script_sig.to_bytes(),
            sequence: input.sequence,
            outpoint_amount: None,
            is_multisig: false,
        })
        .collect::<Vec<_>>();

    let txouts = raw
        .output
        .iter()
        .enumerate()
        .map(|(idx, out)| TxOutRow {
            id: 0,
            tx_id: 0,
            txindex: idx as u32,
            value: out.value,
            script: out.script_pubkey.to_bytes(),
            status: TxOutStatus::Unspent,
            spent_txin_id: None,
            sending_account_id: None,
            sending_label: None,
            receiving_account_id: None,
            receiving_bin_id: None,
            receiving_script_id: None,
            receiving_label: None,
        })
        .collect::<Vec<_>>();

    let tx = TxRow {
        id: 0,
        version: raw.version,
        lock_time: raw.lock_time,
        input_ids: Vec::new(),
        output_ids: Vec::new(),
        timestamp,
        status,
        hash: if is_fully_signed { Some(signed_hash(raw)) } else { None },
        unsigned_hash: u_hash,
        fee: None,
        block_header_id: None,
        block_index: None,
        pre_confirm_status: None,
        pre_conflict_status: None,
    };

    (tx, txins, txouts)
}

/// Number of inputs still missing at least one required signature.
///
/// Only inputs spending one of our own signing scripts (`is_multisig`) are
/// parsed as the placeholder/multisig scriptSig shape `spec.md` §4.4 mints;
/// an input spending an outpoint this vault doesn't own carries whatever
/// scriptSig its original signer produced and is outside this vault's
/// signing responsibility (`spec.md` §4.6 step 2: "each input that uses
/// this account's redeem script"), so it never counts as missing.
pub fn missing_sig_count(txins: &[TxInRow]) -> Result<u32> {
    let mut missing = 0;
    for input in txins {
        if !input.is_multisig {
            continue;
        }
        let script_sig = Script::from(input.script.clone());
        let parts = crate::script::parse_script_sig(&script_sig)?;
        if parts.sig_slots.iter().any(|s| s.is_empty()) {
            missing += 1;
        }
    }
    Ok(missing)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_tx() -> Transaction {
        Transaction {
            version: 1,
            lock_time: 0,
            input: vec![BtcTxIn {
                previous_output: OutPoint {
                    txid: bitcoin::Txid::from_inner([0x11; 32]),
                    vout: 0,
                },
                script_sig: Script::new(),
                sequence: 0xFFFFFFFF,
                witness: Vec::new(),
            }],
            output: vec![BtcTxOut {
                value: 50_000,
                script_pubkey: Script::new(),
            }],
        }
    }

    #[test]
    fn unsigned_hash_ignores_script_sig() {
        let mut a = sample_tx();
        let b_with_sig = {
            let mut b = sample_tx();
            b.input[0].script_sig = Script::from(vec![0x01, 0x02]);
            b
        };
        a.input[0].script_sig = Script::new();
        assert_eq!(unsigned_hash(&a), unsigned_hash(&b_with_sig));
    }

    #[test]
    fn unsigned_hash_changes_with_outputs() {
        let a = sample_tx();
        let mut b = sample_tx();
        b.output[0].value = 1;
        assert_ne!(unsigned_hash(&a), unsigned_hash(&b));
    }
}
