//! `vault` — a persistent Bitcoin-style wallet vault: hierarchical
//! deterministic keychains, multisignature accounts, signing-script
//! issuance, and transaction/block-header lifecycle tracking.
//!
//! This crate is the core described across the whole of `spec.md`: it has
//! no network or UI code of its own (see `DESIGN.md` and `SPEC_FULL.md`'s
//! Non-goals). `vaultd` wraps it behind a CLI; everything else (P2P
//! fetching, SPV header-chain validation) is an external collaborator that
//! calls `Vault::insert_tx`/`Vault::insert_merkle_block` with
//! already-validated data.

pub mod account;
pub mod blocks;
pub mod coinselect;
pub mod crypto;
pub mod error;
pub mod events;
pub mod hd;
pub mod ingest;
pub mod keychain;
pub mod network;
pub mod script;
pub mod serialize;
pub mod signer;
pub mod store;
pub mod tx;
pub mod vault;

pub use crate::error::{EntityKind, Result, VaultError};
pub use crate::keychain::Keychain;
pub use crate::network::NetworkParams;
pub use crate::vault::Vault;
