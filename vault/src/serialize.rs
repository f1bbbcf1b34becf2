//! Export/import framed blob format (`spec.md` §6 "File formats"):
//! length-prefixed strings and byte strings, little-endian fixed-width
//! integers, BIP32's fixed 78-byte extended-key layout, and 32-byte
//! hashes — endian-stable, each frame self-contained so import can stop
//! at the first truncated record.

use std::io::{Cursor, Read, Write};

use crate::error::{Result, VaultError};
use crate::keychain::Keychain;
use crate::store::model::{AccountBinRow, AccountRow};

fn io_err(e: std::io::Error) -> VaultError {
    VaultError::SerializationError(e.to_string())
}

fn write_bytes(w: &mut Vec<u8>, bytes: &[u8]) -> Result<()> {
    w.write_all(&(bytes.len() as u32).to_le_bytes()).map_err(io_err)?;
    w.write_all(bytes).map_err(io_err)
}

fn write_str(w: &mut Vec<u8>, s: &str) -> Result<()> {
    write_bytes(w, s.as_bytes())
}

fn read_bytes(r: &mut Cursor<&[u8]>) -> Result<Vec<u8>> {
    let mut len_buf = [0u8; 4];
    r.read_exact(&mut len_buf).map_err(io_err)?;
    let len = u32::from_le_bytes(len_buf) as usize;
    let mut buf = vec![0u8; len];
    r.read_exact(&mut buf).map_err(io_err)?;
    Ok(buf)
}

fn read_str(r: &mut Cursor<&[u8]>) -> Result<String> {
    String::from_utf8(read_bytes(r)?).map_err(|_| VaultError::SerializationError("invalid utf8".to_string()))
}

/// `name (string) ++ extended_key (78 bytes, fixed-width)`.
pub fn export_keychain(keychain: &Keychain, with_private: bool) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    write_str(&mut buf, &keychain.name)?;
    let ext = keychain.export_bip32(with_private)?;
    buf.extend_from_slice(&ext);
    Ok(buf)
}

pub fn import_keychain(blob: &[u8]) -> Result<Keychain> {
    let mut cur = Cursor::new(blob);
    let name = read_str(&mut cur)?;
    let mut ext = [0u8; 78];
    cur.read_exact(&mut ext).map_err(io_err)?;
    Keychain::import_bip32(&name, &ext)
}

/// `name ++ minsigs (u8) ++ unused_pool_size (u32 LE) ++ time_created (u32
/// LE) ++ keychain_count (u32 LE) ++ keychains[]`.
pub fn export_account(account: &AccountRow, keychains: &[Keychain], with_priv: bool) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    write_str(&mut buf, &account.name)?;
    buf.push(account.minsigs);
    buf.extend_from_slice(&account.unused_pool_size.to_le_bytes());
    buf.extend_from_slice(&account.time_created.to_le_bytes());
    buf.extend_from_slice(&(keychains.len() as u32).to_le_bytes());
    for kc in keychains {
        let frame = export_keychain(kc, with_priv)?;
        write_bytes(&mut buf, &frame)?;
    }
    Ok(buf)
}

pub struct ImportedAccount {
    pub name: String,
    pub minsigs: u8,
    pub unused_pool_size: u32,
    pub time_created: u32,
    pub keychains: Vec<Keychain>,
}

pub fn import_account(blob: &[u8]) -> Result<ImportedAccount> {
    let mut cur = Cursor::new(blob);
    let name = read_str(&mut cur)?;
    let mut minsigs_buf = [0u8; 1];
    cur.read_exact(&mut minsigs_buf).map_err(io_err)?;
    let mut u32_buf = [0u8; 4];
    cur.read_exact(&mut u32_buf).map_err(io_err)?;
    let unused_pool_size = u32::from_le_bytes(u32_buf);
    cur.read_exact(&mut u32_buf).map_err(io_err)?;
    let time_created = u32::from_le_bytes(u32_buf);
    cur.read_exact(&mut u32_buf).map_err(io_err)?;
    let count = u32::from_le_bytes(u32_buf);

    let mut keychains = Vec::with_capacity(count as usize);
    for _ in 0..count {
        let frame = read_bytes(&mut cur)?;
        keychains.push(import_keychain(&frame)?);
    }

    Ok(ImportedAccount {
        name,
        minsigs: minsigs_buf[0],
        unused_pool_size,
        time_created,
        keychains,
    })
}

/// `name ++ index (u32 LE)`.
pub fn export_bin(bin: &AccountBinRow) -> Vec<u8> {
    let mut buf = Vec::new();
    buf.extend_from_slice(&(bin.name.len() as u32).to_le_bytes());
    buf.extend_from_slice(bin.name.as_bytes());
    buf.extend_from_slice(&bin.index.to_le_bytes());
    buf
}

pub struct ImportedBin {
    pub name: String,
    pub index: u32,
}

pub fn import_bin(blob: &[u8]) -> Result<ImportedBin> {
    let mut cur = Cursor::new(blob);
    let name = read_str(&mut cur)?;
    let mut idx_buf = [0u8; 4];
    cur.read_exact(&mut idx_buf).map_err(io_err)?;
    Ok(ImportedBin {
        name,
        index: u32::from_le_bytes(idx_buf),
    })
}

/// `count (u32 LE) ++ raw_tx[]` (each `raw_tx` itself length-prefixed,
/// standard Bitcoin wire format inside).
pub fn export_txs(raws: &[Vec<u8>]) -> Vec<u8> {
    let mut buf = Vec::new();
    buf.extend_from_slice(&(raws.len() as u32).to_le_bytes());
    for raw in raws {
        buf.extend_from_slice(&(raw.len() as u32).to_le_bytes());
        buf.extend_from_slice(raw);
    }
    buf
}

pub fn import_txs(blob: &[u8]) -> Result<Vec<Vec<u8>>> {
    let mut cur = Cursor::new(blob);
    let mut count_buf = [0u8; 4];
    cur.read_exact(&mut count_buf).map_err(io_err)?;
    let count = u32::from_le_bytes(count_buf);
    let mut out = Vec::with_capacity(count as usize);
    for _ in 0..count {
        out.push(read_bytes(&mut cur)?);
    }
    Ok(out)
}

/// `{height (u32 LE), raw_merkle_block}` sequence (§6 "Merkle-block
/// export").
pub fn export_merkle_blocks(blocks: &[(u32, Vec<u8>)]) -> Vec<u8> {
    let mut buf = Vec::new();
    buf.extend_from_slice(&(blocks.len() as u32).to_le_bytes());
    for (height, raw) in blocks {
        buf.extend_from_slice(&height.to_le_bytes());
        buf.extend_from_slice(&(raw.len() as u32).to_le_bytes());
        buf.extend_from_slice(raw);
    }
    buf
}

pub fn import_merkle_blocks(blob: &[u8]) -> Result<Vec<(u32, Vec<u8>)>> {
    let mut cur = Cursor::new(blob);
    let mut count_buf = [0u8; 4];
    cur.read_exact(&mut count_buf).map_err(io_err)?;
    let count = u32::from_le_bytes(count_buf);
    let mut out = Vec::with_capacity(count as usize);
    for _ in 0..count {
        let mut height_buf = [0u8; 4];
        cur.read_exact(&mut height_buf).map_err(io_err)?;
        out.push((u32::from_le_bytes(height_buf), read_bytes(&mut cur)?));
    }
    Ok(out)
}
