use thiserror::Error;

/// The kind of entity a `NotFound` or `NameAlreadyExists` error refers to.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum EntityKind {
    Keychain,
    Account,
    AccountBin,
    SigningScript,
    Tx,
    TxOut,
    BlockHeader,
    MerkleBlock,
    Contact,
}

impl std::fmt::Display for EntityKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            EntityKind::Keychain => "keychain",
            EntityKind::Account => "account",
            EntityKind::AccountBin => "account bin",
            EntityKind::SigningScript => "signing script",
            EntityKind::Tx => "tx",
            EntityKind::TxOut => "txout",
            EntityKind::BlockHeader => "block header",
            EntityKind::MerkleBlock => "merkle block",
            EntityKind::Contact => "contact",
        };
        f.write_str(s)
    }
}

/// The closed set of error kinds a `Vault` operation can fail with.
///
/// Every public `Vault` method either commits fully or returns one of
/// these and leaves the store unchanged.
#[derive(Debug, Error)]
pub enum VaultError {
    #[error("name is invalid: {0}")]
    NameInvalid(String),

    #[error("{kind} named '{name}' already exists")]
    NameAlreadyExists { kind: EntityKind, name: String },

    #[error("{kind} not found: {key}")]
    NotFound { kind: EntityKind, key: String },

    #[error("keychain '{0}' only has a public key, no private key")]
    KeychainPublicOnly(String),

    #[error("private key of keychain '{0}' is locked")]
    KeyLocked(String),

    #[error("chain code of keychain '{0}' is locked")]
    ChainCodeLocked(String),

    #[error("passphrase is incorrect")]
    BadPassphrase,

    #[error("account policy is invalid: {0}")]
    AccountPolicyInvalid(String),

    #[error("signing script pool for bin '{0}' is exhausted")]
    ScriptPoolExhausted(String),

    #[error("insufficient funds: needed {needed}, available {available}")]
    InsufficientFunds { needed: u64, available: u64 },

    #[error("fee too low: {0} satoshis")]
    FeeTooLow(u64),

    #[error("transaction already exists: {0}")]
    TxAlreadyExists(String),

    #[error("transaction unknown: {0}")]
    TxUnknown(String),

    #[error("transaction is still unsigned: {0}")]
    TxStillUnsigned(String),

    #[error("transaction conflicts with an already-stored transaction: {0}")]
    TxConflict(String),

    #[error("signature is invalid")]
    SignatureInvalid,

    #[error("signature slot already occupied by a different signature")]
    SignatureSlotOccupied,

    #[error("unsupported sighash type: {0:#x}")]
    UnsupportedSigHashType(u32),

    #[error("block header unknown at height {0}")]
    BlockHeaderUnknown(u32),

    #[error("merkle proof is invalid")]
    MerkleProofInvalid,

    #[error("schema migration needed: found version {found}, current version {current}")]
    SchemaMigrationNeeded { found: u32, current: u32 },

    #[error("database schema version {0} is newer than this build supports")]
    SchemaFutureVersion(u32),

    #[error("serialization error: {0}")]
    SerializationError(String),

    #[error("I/O error: {0}")]
    IOError(String),
}

pub type Result<T> = std::result::Result<T, VaultError>;

impl From<std::io::Error> for VaultError {
    fn from(e: std::io::Error) -> Self {
        VaultError::IOError(e.to_string())
    }
}

impl From<sled::Error> for VaultError {
    fn from(e: sled::Error) -> Self {
        VaultError::IOError(e.to_string())
    }
}

impl From<serde_cbor::Error> for VaultError {
    fn from(e: serde_cbor::Error) -> Self {
        VaultError::SerializationError(e.to_string())
    }
}
