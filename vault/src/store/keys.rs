//! Byte-key encoding for the single flat `sled::Tree` the store is built
//! on. Each logical "table" and "index" from `spec.md` §4.1 is a key
//! namespace (a fixed prefix) within that one ordered keyspace, so that one
//! `sled` transaction can touch every table/index it needs atomically
//! without juggling `sled`'s fixed-arity multi-tree transaction API.

use super::model::RowId;

fn push_str(buf: &mut Vec<u8>, s: &str) {
    buf.extend_from_slice(&(s.len() as u32).to_be_bytes());
    buf.extend_from_slice(s.as_bytes());
}

pub fn row_key(entity: &str, id: RowId) -> Vec<u8> {
    let mut k = Vec::with_capacity(entity.len() + 9);
    k.extend_from_slice(b"row:");
    k.extend_from_slice(entity.as_bytes());
    k.push(b':');
    k.extend_from_slice(&id.to_be_bytes());
    k
}

pub fn row_prefix(entity: &str) -> Vec<u8> {
    let mut k = Vec::with_capacity(entity.len() + 5);
    k.extend_from_slice(b"row:");
    k.extend_from_slice(entity.as_bytes());
    k.push(b':');
    k
}

pub fn seq_key(entity: &str) -> Vec<u8> {
    let mut k = Vec::with_capacity(entity.len() + 4);
    k.extend_from_slice(b"seq:");
    k.extend_from_slice(entity.as_bytes());
    k
}

/// `idx:<entity>:<index-name>:<encoded key>` -> row id (or presence marker).
pub fn idx_key(entity: &str, index: &str, encoded: &[u8]) -> Vec<u8> {
    let mut k = Vec::new();
    k.extend_from_slice(b"idx:");
    push_str(&mut k, entity);
    push_str(&mut k, index);
    k.extend_from_slice(encoded);
    k
}

pub fn idx_prefix(entity: &str, index: &str) -> Vec<u8> {
    let mut k = Vec::new();
    k.extend_from_slice(b"idx:");
    push_str(&mut k, entity);
    push_str(&mut k, index);
    k
}

pub fn idx_prefix_with(entity: &str, index: &str, partial: &[u8]) -> Vec<u8> {
    let mut k = idx_prefix(entity, index);
    k.extend_from_slice(partial);
    k
}

pub fn meta_key() -> &'static [u8] {
    b"meta:singleton"
}

pub fn id_from_bytes(bytes: &[u8]) -> RowId {
    let mut buf = [0u8; 8];
    buf.copy_from_slice(&bytes[..8]);
    RowId::from_be_bytes(buf)
}
