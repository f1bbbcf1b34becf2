//! Row encoding, lifted directly from the teacher's `thunder::db`
//! `serialize`/`deserialize` helpers (CBOR via `serde_cbor`), generalized
//! from one object kind to every row type in the schema.

use crate::error::Result;
use serde::{de::DeserializeOwned, Serialize};

pub fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>> {
    Ok(serde_cbor::to_vec(value)?)
}

pub fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T> {
    Ok(serde_cbor::from_slice(bytes)?)
}
