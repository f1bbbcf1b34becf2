//! Signing scripts and the signing-script pool (`spec.md` §3, §4.4).
//!
//! This is the address-issuance engine: for a given account bin, a pool of
//! `UNUSED` pay-to-script-hash addresses is kept pre-minted `unused_pool_size`
//! deep so that an incoming payment can be matched against a script the
//! vault already knows about without deriving anything synchronously.

use bitcoin::blockdata::opcodes::all::OP_CHECKMULTISIG;
use bitcoin::blockdata::script::{Builder, Instruction};
use bitcoin::hashes::{hash160, Hash};
use bitcoin::secp256k1::PublicKey;
use bitcoin::Script;

use crate::account::DEFAULT_UNUSED_POOL_SIZE;
use crate::error::{Result, VaultError};
use crate::keychain::Keychain;
use crate::store::model::{AccountBinRow, AccountRow, RowId, ScriptStatus, SigningScriptRow};
use crate::store::Txn;

/// `OP_M <pubkey1> ... <pubkeyN> OP_N OP_CHECKMULTISIG`, pubkeys in
/// canonical (lexicographically sorted) order — `spec.md` §3 invariant on
/// `SigningScript`.
pub fn build_redeem_script(minsigs: u8, pubkeys: &[Vec<u8>]) -> Script {
    let mut sorted = pubkeys.to_vec();
    sorted.sort();

    let mut builder = Builder::new().push_int(minsigs as i64);
    for pk in &sorted {
        builder = builder.push_slice(pk);
    }
    builder
        .push_int(sorted.len() as i64)
        .push_opcode(OP_CHECKMULTISIG)
        .into_script()
}

/// `HASH160 <redeem_script_hash> EQUAL`, the P2SH locking script.
pub fn build_txout_script(redeem_script: &Script) -> Script {
    let hash = hash160::Hash::hash(redeem_script.as_bytes());
    Script::new_p2sh(&bitcoin::hash_types::ScriptHash::from_inner(hash.into_inner()))
}

/// `txin_script` placeholder form: `OP_0 <sig-placeholder>... <redeem_script>`,
/// one empty push per required co-signer, used before any signatures exist
/// (§4.4 "placeholders for sigs").
pub fn build_placeholder_txin_script(minsigs: u8, redeem_script: &Script) -> Script {
    let mut builder = Builder::new().push_opcode(bitcoin::blockdata::opcodes::all::OP_PUSHBYTES_0.into());
    for _ in 0..minsigs {
        builder = builder.push_slice(&[]);
    }
    builder.push_slice(redeem_script.as_bytes()).into_script()
}

/// Derive the sorted pubkey set and build the redeem/txout script pair for
/// one `(bin_index, script_index)` pool slot, across every root keychain
/// of the account (`spec.md` §4.4).
pub fn derive_script_pubkeys(
    keychains: &[Keychain],
    bin_index: u32,
    script_index: u32,
) -> Result<Vec<Vec<u8>>> {
    let mut pubkeys = Vec::with_capacity(keychains.len());
    for kc in keychains {
        let pk: PublicKey = kc.signing_pubkey(&[bin_index], script_index)?;
        pubkeys.push(pk.serialize().to_vec());
    }
    pubkeys.sort();
    Ok(pubkeys)
}

pub fn new_signing_script_row(
    account_id: RowId,
    bin: &AccountBinRow,
    index: u32,
    minsigs: u8,
    keychains: &[Keychain],
    label: &str,
    status: ScriptStatus,
) -> Result<SigningScriptRow> {
    let pubkeys = derive_script_pubkeys(keychains, bin.index, index)?;
    let redeem_script = build_redeem_script(minsigs, &pubkeys);
    let txout_script = build_txout_script(&redeem_script);
    let txin_script = build_placeholder_txin_script(minsigs, &redeem_script);

    Ok(SigningScriptRow {
        id: 0,
        account_id,
        bin_id: bin.id,
        index,
        label: label.to_string(),
        status,
        txin_script: txin_script.into_bytes(),
        txout_script: txout_script.into_bytes(),
        pubkeys,
    })
}

/// How many additional scripts must be minted so that
/// `script_count - next_script_index >= unused_pool_size` holds
/// (`spec.md` §4.4). Resolves the Open Question in §9: `script_count` is
/// the next index to mint (post-incremented on every mint, matching the
/// source's `script_count_++`), `next_script_index` only advances past an
/// index once it is actually issued/used.
pub fn refill_amount(bin: &AccountBinRow, unused_pool_size: u32) -> u32 {
    let gap = bin.script_count.saturating_sub(bin.next_script_index);
    unused_pool_size.saturating_sub(gap)
}

pub fn default_pool_size() -> u32 {
    DEFAULT_UNUSED_POOL_SIZE
}

/// `true` once an issued/used index should advance `next_script_index`
/// past it — mirrors `AccountBin::markSigningScriptIssued` in the source.
pub fn advances_next_index(index: u32, next_script_index: u32) -> bool {
    index >= next_script_index
}

/// The pieces of a legacy P2SH multisig `scriptSig`: one slot per expected
/// signature (empty `Vec` for a not-yet-filled slot) plus the trailing
/// redeem script (`spec.md` §4.6).
pub struct ScriptSigParts {
    pub sig_slots: Vec<Vec<u8>>,
    pub redeem_script: Script,
}

/// Parse `OP_0 <sig-or-empty>... <redeem_script>` back into its slots.
pub fn parse_script_sig(script_sig: &Script) -> Result<ScriptSigParts> {
    let mut pushes: Vec<Vec<u8>> = Vec::new();
    for instr in script_sig.instructions() {
        match instr.map_err(|_| VaultError::SerializationError("malformed scriptSig".to_string()))? {
            Instruction::PushBytes(bytes) => pushes.push(bytes.to_vec()),
            Instruction::Op(op) if op.into_u8() == 0x00 => pushes.push(Vec::new()),
            Instruction::Op(_) => {
                return Err(VaultError::SerializationError(
                    "unexpected opcode in multisig scriptSig".to_string(),
                ))
            }
        }
    }
    if pushes.len() < 2 {
        return Err(VaultError::SerializationError(
            "scriptSig too short for a multisig redeem script".to_string(),
        ));
    }
    let redeem_script = Script::from(pushes.pop().expect("checked len >= 2"));
    // First push is the OP_0 placeholder required by the CHECKMULTISIG bug.
    let sig_slots = pushes.into_iter().skip(1).collect();
    Ok(ScriptSigParts {
        sig_slots,
        redeem_script,
    })
}

/// Rebuild a `scriptSig` from (possibly partially filled) signature slots
/// and the redeem script.
pub fn build_script_sig(sig_slots: &[Vec<u8>], redeem_script: &Script) -> Script {
    let mut builder = Builder::new().push_opcode(bitcoin::blockdata::opcodes::all::OP_PUSHBYTES_0.into());
    for slot in sig_slots {
        builder = builder.push_slice(slot);
    }
    builder.push_slice(redeem_script.as_bytes()).into_script()
}

/// Sorted pubkeys pushed into a redeem script, in slot order — the order
/// `sign_tx` (`spec.md` §4.6) matches a derived pubkey against its slot.
pub fn redeem_script_pubkeys(redeem_script: &Script) -> Result<Vec<Vec<u8>>> {
    let mut out = Vec::new();
    for instr in redeem_script.instructions() {
        if let Instruction::PushBytes(bytes) = instr
            .map_err(|_| VaultError::SerializationError("malformed redeem script".to_string()))?
        {
            if bytes.len() == 33 || bytes.len() == 65 {
                out.push(bytes.to_vec());
            }
        }
    }
    Ok(out)
}

pub fn status_allows_issuance(status: ScriptStatus) -> Result<()> {
    if status != ScriptStatus::UNUSED {
        return Err(VaultError::ScriptPoolExhausted(
            "script is not in the UNUSED state".to_string(),
        ));
    }
    Ok(())
}

/// Mint scripts until the bin's `UNUSED` pool is `unused_pool_size` deep
/// again. Requires every keychain's chain code to be unlocked (public
/// derivation only — no private key needed); propagates
/// `ChainCodeLocked` if one is not, leaving `bin` untouched.
pub fn refill_pool(
    txn: &mut Txn<'_>,
    account: &AccountRow,
    bin: &mut AccountBinRow,
    keychains: &[Keychain],
) -> Result<u32> {
    let amount = refill_amount(bin, account.unused_pool_size);
    let mut minted = 0;
    for _ in 0..amount {
        let index = bin.script_count;
        let row = new_signing_script_row(
            account.id,
            bin,
            index,
            account.minsigs,
            keychains,
            "",
            ScriptStatus::UNUSED,
        )?;
        txn.insert_script(row)?;
        bin.script_count += 1;
        minted += 1;
    }
    if minted > 0 {
        txn.update_bin(bin)?;
    }
    Ok(minted)
}

/// Issue the lowest-index `UNUSED` script in `bin`, flip it to `ISSUED`
/// (or `CHANGE` when the bin is the account's change bin), advance
/// `next_script_index` per the Open Question resolution (§9), and top the
/// pool back up. `spec.md` §4.4/§6 `issue_signing_script`.
pub fn issue_script(
    txn: &mut Txn<'_>,
    account: &AccountRow,
    bin: &mut AccountBinRow,
    keychains: &[Keychain],
    label: &str,
    is_change: bool,
) -> Result<SigningScriptRow> {
    refill_pool(txn, account, bin, keychains)?;

    let mut candidates: Vec<SigningScriptRow> = txn
        .list_scripts_in_bin(bin.id)?
        .into_iter()
        .filter(|s| s.status == ScriptStatus::UNUSED)
        .collect();
    candidates.sort_by_key(|s| s.index);
    let mut script = candidates
        .into_iter()
        .next()
        .ok_or_else(|| VaultError::ScriptPoolExhausted(bin.name.clone()))?;

    script.status = if is_change { ScriptStatus::CHANGE } else { ScriptStatus::ISSUED };
    script.label = label.to_string();
    if advances_next_index(script.index, bin.next_script_index) {
        bin.next_script_index = script.index + 1;
        txn.update_bin(bin)?;
    }
    txn.update_script(&script)?;
    refill_pool(txn, account, bin, keychains)?;
    Ok(script)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn redeem_script_sorts_pubkeys() {
        let pk_a = vec![0x02; 33];
        let pk_b = vec![0x03; 33];
        let script_hi_first = build_redeem_script(2, &[pk_b.clone(), pk_a.clone()]);
        let script_lo_first = build_redeem_script(2, &[pk_a, pk_b]);
        assert_eq!(script_hi_first, script_lo_first);
    }

    #[test]
    fn refill_amount_tops_up_to_pool_size() {
        let bin = AccountBinRow {
            id: 1,
            account_id: 1,
            index: 2,
            name: "@default".to_string(),
            script_count: 1,
            next_script_index: 1,
        };
        assert_eq!(refill_amount(&bin, 25), 25);

        let bin = AccountBinRow {
            script_count: 26,
            next_script_index: 1,
            ..bin
        };
        assert_eq!(refill_amount(&bin, 25), 0);
    }
}
