//! Signing protocol (`spec.md` §4.6): listing what a transaction still
//! needs, attaching one keychain's signatures, and merging two
//! partially-signed copies of the same transaction.

use std::collections::{BTreeMap, HashMap};

use bitcoin::secp256k1::{Message, PublicKey, Secp256k1, Signature};
use bitcoin::{Script, SigHashType, Transaction};

use crate::error::{Result, VaultError};
use crate::keychain::Keychain;
use crate::script;
use crate::store::model::{AccountBinRow, AccountRow, RowId, SigningScriptRow, TxInRow, TxOutRow, TxRow, TxStatus};
use crate::store::Txn;
use crate::tx;

#[derive(Debug)]
pub struct KeychainInfo {
    pub name: String,
    pub hash: [u8; 20],
}

#[derive(Debug)]
pub struct SigningRequest {
    pub unsigned_hash: [u8; 32],
    pub raw_tx: Transaction,
    pub keychain_info: Vec<KeychainInfo>,
    pub sigs_needed: u32,
}

/// The account/bin/script that minted the output an input spends, or
/// `None` if the outpoint is unknown to this vault (an external input).
fn input_context(
    txn: &Txn<'_>,
    txin: &TxInRow,
) -> Result<Option<(AccountRow, AccountBinRow, SigningScriptRow)>> {
    let prev_out = match txn.get_txout_by_outpoint(&txin.out_hash, txin.out_index)? {
        Some(row) => row,
        None => return Ok(None),
    };
    let script_id = match prev_out.receiving_script_id {
        Some(id) => id,
        None => return Ok(None),
    };
    let script = match txn.get_script(script_id)? {
        Some(s) => s,
        None => return Ok(None),
    };
    let bin = match txn.get_bin(script.bin_id)? {
        Some(b) => b,
        None => return Ok(None),
    };
    let account = match txn.get_account(script.account_id)? {
        Some(a) => a,
        None => return Ok(None),
    };
    Ok(Some((account, bin, script)))
}

pub fn signing_request(
    txn: &Txn<'_>,
    tx: &TxRow,
    txins: &[TxInRow],
    txouts: &[TxOutRow],
    account_keychains: &HashMap<RowId, Vec<Keychain>>,
) -> Result<SigningRequest> {
    let raw_tx = tx::to_bitcoin_tx(tx, txins, txouts)?;
    let mut needed: BTreeMap<[u8; 20], String> = BTreeMap::new();

    for txin in txins {
        let (account, bin, script) = match input_context(txn, txin)? {
            Some(ctx) => ctx,
            None => continue,
        };
        let parts = script::parse_script_sig(&Script::from(txin.script.clone()))?;
        let keychains = account_keychains.get(&account.id);
        for (idx, pubkey) in script.pubkeys.iter().enumerate() {
            let empty = parts.sig_slots.get(idx).map(|s| s.is_empty()).unwrap_or(true);
            if !empty {
                continue;
            }
            if let Some(kc) = find_owning_keychain(keychains, pubkey, bin.index, script.index) {
                needed.insert(kc.hash, kc.name.clone());
            }
        }
    }

    let sigs_needed = tx::missing_sig_count(txins)?;
    Ok(SigningRequest {
        unsigned_hash: tx.unsigned_hash,
        raw_tx,
        keychain_info: needed
            .into_iter()
            .map(|(hash, name)| KeychainInfo { name, hash })
            .collect(),
        sigs_needed,
    })
}

fn find_owning_keychain<'a>(
    keychains: Option<&'a Vec<Keychain>>,
    pubkey: &[u8],
    bin_index: u32,
    script_index: u32,
) -> Option<&'a Keychain> {
    let keychains = keychains?;
    keychains.iter().find(|kc| {
        kc.signing_pubkey(&[bin_index], script_index)
            .map(|pk| pk.serialize().to_vec() == pubkey)
            .unwrap_or(false)
    })
}

/// Attach `signer_keychain`'s signatures to every input of `tx` whose
/// redeem script it participates in. Returns the updated tx/txin rows and
/// whether anything changed.
pub fn sign_tx(
    txn: &Txn<'_>,
    tx: &TxRow,
    txins: &[TxInRow],
    txouts: &[TxOutRow],
    signer_keychain: &Keychain,
    promote_to: TxStatus,
) -> Result<(TxRow, Vec<TxInRow>, bool)> {
    let secp = Secp256k1::signing_only();
    let raw = tx::to_bitcoin_tx(tx, txins, txouts)?;
    let mut new_txins = txins.to_vec();
    let mut changed = false;

    for (i, txin) in new_txins.iter_mut().enumerate() {
        let (account, bin, script) = match input_context(txn, txin)? {
            Some(ctx) => ctx,
            None => continue,
        };
        if !account.keychain_ids.contains(&signer_keychain.id) {
            continue;
        }
        let pubkey = signer_keychain.signing_pubkey(&[bin.index], script.index)?;
        let pubkey_bytes = pubkey.serialize().to_vec();
        let slot_idx = match script.pubkeys.iter().position(|pk| pk == &pubkey_bytes) {
            Some(idx) => idx,
            None => continue,
        };

        let mut parts = script::parse_script_sig(&Script::from(txin.script.clone()))?;
        if parts.sig_slots.get(slot_idx).map(|s| !s.is_empty()).unwrap_or(false) {
            continue;
        }

        let privkey = signer_keychain.signing_privkey(&[bin.index], script.index)?;
        let sighash = raw.signature_hash(i, &parts.redeem_script, SigHashType::All as u32);
        let msg = Message::from_slice(&sighash.into_inner())
            .map_err(|_| VaultError::SerializationError("bad sighash".to_string()))?;
        let signature = secp.sign(&msg, &privkey);
        let mut der = signature.serialize_der().to_vec();
        der.push(SigHashType::All as u8);

        while parts.sig_slots.len() <= slot_idx {
            parts.sig_slots.push(Vec::new());
        }
        parts.sig_slots[slot_idx] = der;
        txin.script = script::build_script_sig(&parts.sig_slots, &parts.redeem_script).into_bytes();
        changed = true;
    }

    let mut new_tx = tx.clone();
    if changed {
        let missing = tx::missing_sig_count(&new_txins)?;
        if missing == 0 && new_tx.status == TxStatus::UNSIGNED {
            new_tx.status = promote_to;
            let signed_raw = tx::to_bitcoin_tx(&new_tx, &new_txins, txouts)?;
            new_tx.hash = Some(tx::signed_hash(&signed_raw));
        }
    }

    Ok((new_tx, new_txins, changed))
}

/// `Ok(true)`/`Ok(false)` for a well-formed SIGHASH_ALL signature that
/// does/doesn't check out; `Err(UnsupportedSigHashType)` for any other
/// hashtype byte, since this vault only ever produces or accepts ALL.
fn verify_signature(
    secp: &Secp256k1<bitcoin::secp256k1::VerifyOnly>,
    raw: &Transaction,
    index: usize,
    redeem_script: &Script,
    pubkey_bytes: &[u8],
    sig_with_hashtype: &[u8],
) -> Result<bool> {
    if sig_with_hashtype.is_empty() {
        return Ok(false);
    }
    let (der, hash_ty) = sig_with_hashtype.split_at(sig_with_hashtype.len() - 1);
    if hash_ty[0] != SigHashType::All as u8 {
        return Err(VaultError::UnsupportedSigHashType(hash_ty[0] as u32));
    }
    let signature = match Signature::from_der(der) {
        Ok(s) => s,
        Err(_) => return Ok(false),
    };
    let pubkey = match PublicKey::from_slice(pubkey_bytes) {
        Ok(p) => p,
        Err(_) => return Ok(false),
    };
    let sighash = raw.signature_hash(index, redeem_script, SigHashType::All as u32);
    let msg = match Message::from_slice(&sighash.into_inner()) {
        Ok(m) => m,
        Err(_) => return Ok(false),
    };
    Ok(secp.verify(&msg, &signature, &pubkey).is_ok())
}

/// Merge signatures from `new_raw` (another copy of the same
/// `unsigned_hash`) into `old_txins`. For each slot, a non-empty signature
/// already present is kept as-is; a different non-empty signature arriving
/// for an already-occupied slot is a `SignatureSlotOccupied` error
/// (mismatched redeem scripts or conflicting signers). Invalid incoming
/// signatures are rejected in strict mode and replaced with a placeholder
/// in lenient mode.
pub fn merge_txins(
    txn: &Txn<'_>,
    old_txins: &[TxInRow],
    new_raw: &Transaction,
    lenient: bool,
) -> Result<(Vec<TxInRow>, bool)> {
    let secp = Secp256k1::verification_only();
    let mut merged = Vec::with_capacity(old_txins.len());
    let mut changed = false;

    for (i, old) in old_txins.iter().enumerate() {
        if !old.is_multisig {
            merged.push(old.clone());
            continue;
        }
        let new_script_sig = &new_raw.input[i].script_sig;
        let old_parts = script::parse_script_sig(&Script::from(old.script.clone()))?;
        let new_parts = script::parse_script_sig(new_script_sig)?;
        if old_parts.redeem_script != new_parts.redeem_script {
            return Err(VaultError::SignatureInvalid);
        }

        let ctx = input_context(txn, old)?;
        let mut slots = Vec::with_capacity(old_parts.sig_slots.len());
        for (slot_idx, (o, n)) in old_parts
            .sig_slots
            .iter()
            .zip(new_parts.sig_slots.iter())
            .enumerate()
        {
            if !o.is_empty() {
                if !n.is_empty() && n != o {
                    return Err(VaultError::SignatureSlotOccupied);
                }
                slots.push(o.clone());
                continue;
            }
            if n.is_empty() {
                slots.push(Vec::new());
                continue;
            }
            let pubkey = ctx.as_ref().and_then(|(_, _, s)| s.pubkeys.get(slot_idx));
            let valid = match pubkey {
                Some(pk) => verify_signature(&secp, new_raw, i, &old_parts.redeem_script, pk, n)?,
                None => false,
            };
            if valid {
                slots.push(n.clone());
                changed = true;
            } else if lenient {
                slots.push(Vec::new());
            } else {
                return Err(VaultError::SignatureInvalid);
            }
        }

        let mut row = old.clone();
        row.script = script::build_script_sig(&slots, &old_parts.redeem_script).into_bytes();
        merged.push(row);
    }

    Ok((merged, changed))
}
