//! Block headers and merkle-block confirmation proofs (`spec.md` §4.8).

use bitcoin::util::merkleblock::MerkleBlock;
use bitcoin::BlockHeader as BtcBlockHeader;

use crate::error::{Result, VaultError};
use crate::store::model::{BlockHeaderRow, MerkleBlockRow, RowId, TxStatus};
use crate::store::Txn;

pub fn header_row_from_btc(header: &BtcBlockHeader, height: u32) -> BlockHeaderRow {
    BlockHeaderRow {
        id: 0,
        hash: header.block_hash().into_inner(),
        height,
        version: header.version,
        prev_hash: header.prev_blockhash.into_inner(),
        merkle_root: header.merkle_root.into_inner(),
        timestamp: header.time,
        bits: header.bits,
        nonce: header.nonce,
    }
}

pub struct MerkleBlockInsertOutcome {
    pub block_header: BlockHeaderRow,
    pub merkle_block: MerkleBlockRow,
    pub confirmed_tx_ids: Vec<RowId>,
}

/// `insert_merkle_block(raw, height)` — parse, persist, back-match every
/// transaction this vault already has a row for, and transition those to
/// `CONFIRMED`.
pub fn insert_merkle_block(txn: &mut Txn<'_>, raw: &[u8], height: u32) -> Result<MerkleBlockInsertOutcome> {
    let parsed: MerkleBlock = bitcoin::consensus::deserialize(raw)
        .map_err(|_| VaultError::MerkleProofInvalid)?;

    let mut matches = Vec::new();
    let mut indexes = Vec::new();
    parsed
        .txn
        .extract_matches(&mut matches, &mut indexes)
        .map_err(|_| VaultError::MerkleProofInvalid)?;

    let header_row = header_row_from_btc(&parsed.header, height);
    let header_row = txn.insert_block_header(header_row)?;

    let hashes: Vec<[u8; 32]> = matches.iter().map(|txid| txid.into_inner()).collect();
    let flags = bitcoin::consensus::serialize(&parsed.txn);

    let merkle_block_row = MerkleBlockRow {
        id: 0,
        block_header_id: header_row.id,
        txcount: hashes.len() as u32,
        hashes: hashes.clone(),
        flags,
    };
    let merkle_block_row = txn.insert_merkle_block(merkle_block_row)?;

    let mut confirmed_tx_ids = Vec::new();
    for (hash, index) in hashes.iter().zip(indexes.iter()) {
        if let Some(mut tx) = txn.get_tx_by_hash(hash)? {
            tx.block_header_id = Some(header_row.id);
            tx.block_index = Some(*index);
            let old_status = tx.status;
            if old_status != TxStatus::CONFIRMED {
                tx.pre_confirm_status = Some(old_status);
            }
            tx.status = TxStatus::CONFIRMED;
            txn.update_tx(None, &tx)?;
            if old_status != TxStatus::CONFIRMED {
                confirmed_tx_ids.push(tx.id);
            }
        }
    }

    Ok(MerkleBlockInsertOutcome {
        block_header: header_row,
        merkle_block: merkle_block_row,
        confirmed_tx_ids,
    })
}

/// `delete_merkle_block(height)` — cascade-unconfirm every transaction
/// attached to a header at or above `height` (reorg handling, §4.8).
/// Each transaction returns to the status it held just before it was
/// confirmed (`pre_confirm_status`), falling back to `default_status` for
/// rows written before that field existed.
pub fn delete_merkle_block(txn: &mut Txn<'_>, from_height: u32, default_status: TxStatus) -> Result<Vec<RowId>> {
    let removed_headers = txn.delete_block_headers_from_height(from_height)?;
    let mut reverted = Vec::new();

    for header in &removed_headers {
        if let Some(mb) = txn.get_merkle_block_by_header(header.id)? {
            for hash in &mb.hashes {
                if let Some(mut tx) = txn.get_tx_by_hash(hash)? {
                    if tx.block_header_id == Some(header.id) {
                        tx.block_header_id = None;
                        tx.block_index = None;
                        tx.status = tx.pre_confirm_status.unwrap_or(default_status);
                        tx.pre_confirm_status = None;
                        txn.update_tx(None, &tx)?;
                        reverted.push(tx.id);
                    }
                }
            }
        }
    }

    Ok(reverted)
}
