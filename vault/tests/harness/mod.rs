//! Shared scaffolding for the end-to-end scenario tests: a fresh on-disk
//! vault per test, and the small amount of raw-`bitcoin` plumbing needed to
//! hand the vault something that looks like it came from the network (a
//! funding transaction, a merkle block) without actually running one.

use bitcoin::blockdata::opcodes::all::{OP_CHECKSIG, OP_DUP, OP_EQUALVERIFY, OP_HASH160};
use bitcoin::blockdata::script::Builder;
use bitcoin::hashes::Hash;
use bitcoin::util::merkleblock::{MerkleBlock, PartialMerkleTree};
use bitcoin::{BlockHeader, OutPoint, Script, Transaction, TxIn, TxOut, Txid};

use vault::{NetworkParams, Vault};

pub fn open_vault(dir: &std::path::Path) -> Vault {
    Vault::create(&dir.join("vault.db"), NetworkParams::testnet()).expect("vault create")
}

/// A scriptSig that looks like a spent legacy multisig input: present, no
/// empty signature slots, not tied to any keychain this vault knows about.
/// Good enough to make an externally-funded input count as fully signed.
pub fn external_scriptsig() -> Script {
    Builder::new()
        .push_opcode(bitcoin::blockdata::opcodes::all::OP_PUSHBYTES_0.into())
        .push_slice(&[0xABu8; 70])
        .push_slice(&[0x51u8])
        .into_script()
}

/// An arbitrary P2PKH-shaped output script standing in for some address
/// outside this vault.
pub fn external_output_script() -> Script {
    Builder::new()
        .push_opcode(OP_DUP)
        .push_opcode(OP_HASH160)
        .push_slice(&[0x77u8; 20])
        .push_opcode(OP_EQUALVERIFY)
        .push_opcode(OP_CHECKSIG)
        .into_script()
}

/// A one-input, one-output transaction paying `value` satoshis to
/// `txout_script`, as if received from an external funder.
pub fn build_funding_tx(txout_script: &[u8], value: u64) -> Transaction {
    Transaction {
        version: 1,
        lock_time: 0,
        input: vec![TxIn {
            previous_output: OutPoint {
                txid: Txid::from_inner([0xEE; 32]),
                vout: 0,
            },
            script_sig: external_scriptsig(),
            sequence: 0xFFFFFFFF,
            witness: Vec::new(),
        }],
        output: vec![TxOut {
            value,
            script_pubkey: Script::from(txout_script.to_vec()),
        }],
    }
}

/// A single-transaction merkle block confirming `txid` at `height`,
/// consensus-serialized exactly as `Vault::insert_merkle_block` expects.
/// The merkle root of a one-transaction block is the transaction's own id.
pub fn build_merkle_block(txid: Txid, height: u32) -> Vec<u8> {
    let header = BlockHeader {
        version: 1,
        prev_blockhash: bitcoin::BlockHash::from_inner([0x11; 32]),
        merkle_root: bitcoin::TxMerkleNode::from_inner(txid.into_inner()),
        time: 1_600_000_000 + height,
        bits: 0x1d00ffff,
        nonce: 0,
    };
    let partial = PartialMerkleTree::from_txids(&[txid], &[true]);
    let block = MerkleBlock { header, txn: partial };
    bitcoin::consensus::serialize(&block)
}

pub const K1_ENTROPY: [u8; 32] = [0x01; 32];
pub const K2_ENTROPY: [u8; 32] = [0x02; 32];
pub const K3_ENTROPY: [u8; 32] = [0x03; 32];

pub const K1_PASS: &[u8] = b"k1-passphrase";
pub const K2_PASS: &[u8] = b"k2-passphrase";
pub const K3_PASS: &[u8] = b"k3-passphrase";
