//! `vaultd` — a thin CLI front end for the `vault` wallet core. One
//! subcommand per operation group in `spec.md` §6, each opening the vault
//! file named by `--db`, calling exactly one `vault::Vault` method, and
//! printing the result — mirroring the original `vaultd` shell's
//! `cmd_*`-per-command dispatch.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use vault::store::model::{ScriptStatus, TxStatus};
use vault::{NetworkParams, Vault};

mod config;

use config::Config;

#[derive(Parser)]
#[clap(name = "vaultd", about = "Bitcoin-style HD wallet vault CLI", version)]
struct Cli {
    /// Path to the vault's sled database file.
    #[clap(long, global = true)]
    db: Option<PathBuf>,

    /// Path to a `vaultd` TOML config file; falls back to the platform
    /// config directory, then to built-in defaults.
    #[clap(long, global = true)]
    config: Option<PathBuf>,

    #[clap(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Create a new, empty vault database.
    Create,
    /// Keychain operations.
    Keychain {
        #[clap(subcommand)]
        cmd: KeychainCommand,
    },
    /// Account operations.
    Account {
        #[clap(subcommand)]
        cmd: AccountCommand,
    },
    /// Account bin operations.
    Bin {
        #[clap(subcommand)]
        cmd: BinCommand,
    },
    /// Signing-script operations.
    Script {
        #[clap(subcommand)]
        cmd: ScriptCommand,
    },
    /// Transaction operations.
    Tx {
        #[clap(subcommand)]
        cmd: TxCommand,
    },
    /// Block header / merkle-block operations.
    Block {
        #[clap(subcommand)]
        cmd: BlockCommand,
    },
}

#[derive(Subcommand)]
enum KeychainCommand {
    Exists { name: String },
    New { name: String, passphrase: String },
    Rename { name: String, new_name: String },
    Info { name: String },
    Unlock { name: String, passphrase: String },
    Lock { name: String },
    ExportBip32 { name: String, #[clap(long)] with_private: bool },
    ImportBip32 { name: String, extkey_hex: String },
}

#[derive(Subcommand)]
enum AccountCommand {
    Exists { name: String },
    New {
        name: String,
        minsigs: u8,
        keychains: Vec<String>,
        #[clap(long)]
        pool_size: Option<u32>,
    },
    Rename { name: String, new_name: String },
    Info { name: String },
    List,
    Balance { name: String, #[clap(long, default_value_t = 1)] min_confirmations: u32 },
}

#[derive(Subcommand)]
enum BinCommand {
    Add { account: String, name: String },
    List { account: String },
}

#[derive(Subcommand)]
enum ScriptCommand {
    Issue { account: String, #[clap(long, default_value = "@default")] bin: String, #[clap(long, default_value = "")] label: String },
    List { account: String, #[clap(long)] bin: Option<String> },
    Refill { account: String },
}

#[derive(Subcommand)]
enum TxCommand {
    Insert { raw_hex: String, timestamp: u32 },
    Delete { id: u64 },
    SigningRequest { id: u64 },
    Sign { id: u64, keychain: String, passphrase: String },
    Info { id: u64 },
    List,
}

#[derive(Subcommand)]
enum BlockCommand {
    BestHeight,
    HorizonTimestamp,
    HorizonHeight,
    Info { height: u32 },
    InsertMerkle { raw_hex: String, height: u32 },
    Delete { from_height: u32 },
}

/// User-facing errors (bad arguments, not-found names) get exit code 1;
/// anything that reaches here from inside the vault core is an internal
/// error and gets exit code 2 (`spec.md` §6 "Exit codes").
enum CliError {
    User(String),
    Internal(String),
}

impl From<vault::VaultError> for CliError {
    fn from(err: vault::VaultError) -> Self {
        use vault::VaultError::*;
        match err {
            NameInvalid(_)
            | NameAlreadyExists { .. }
            | NotFound { .. }
            | KeychainPublicOnly(_)
            | KeyLocked(_)
            | ChainCodeLocked(_)
            | BadPassphrase
            | AccountPolicyInvalid(_)
            | ScriptPoolExhausted(_)
            | InsufficientFunds { .. }
            | FeeTooLow(_)
            | TxAlreadyExists(_)
            | TxUnknown(_)
            | TxStillUnsigned(_)
            | TxConflict(_)
            | UnsupportedSigHashType(_)
            | BlockHeaderUnknown(_)
            | MerkleProofInvalid => CliError::User(err.to_string()),
            other => CliError::Internal(other.to_string()),
        }
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match cli.config.as_deref().map(Config::from_file).unwrap_or_else(|| {
        Config::default_path().and_then(|p| if p.exists() { Config::from_file(p) } else { Ok(Config::default()) })
    }) {
        Ok(c) => c,
        Err(err) => {
            eprintln!("error: {}", err);
            return ExitCode::from(2);
        }
    };

    let filter = tracing_subscriber::EnvFilter::try_new(&config.logging.filter)
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let db_path = cli.db.unwrap_or_else(|| config.vault.data_dir.join("vault.db"));
    let network = match NetworkParams::by_name(&config.network.name) {
        Some(n) => n,
        None => {
            eprintln!("error: unknown network {:?}", config.network.name);
            return ExitCode::from(1);
        }
    };

    match run(&cli.command, &db_path, network) {
        Ok(output) => {
            println!("{}", output);
            ExitCode::from(0)
        }
        Err(CliError::User(msg)) => {
            eprintln!("error: {}", msg);
            ExitCode::from(1)
        }
        Err(CliError::Internal(msg)) => {
            eprintln!("internal error: {}", msg);
            ExitCode::from(2)
        }
    }
}

fn run(command: &Command, db_path: &std::path::Path, network: NetworkParams) -> Result<String, CliError> {
    match command {
        Command::Create => {
            Vault::create(db_path, network)?;
            Ok(format!("created vault at {}", db_path.display()))
        }
        Command::Keychain { cmd } => run_keychain(cmd, db_path, network),
        Command::Account { cmd } => run_account(cmd, db_path, network),
        Command::Bin { cmd } => run_bin(cmd, db_path, network),
        Command::Script { cmd } => run_script(cmd, db_path, network),
        Command::Tx { cmd } => run_tx(cmd, db_path, network),
        Command::Block { cmd } => run_block(cmd, db_path, network),
    }
}

fn open(db_path: &std::path::Path, network: NetworkParams) -> Result<Vault, CliError> {
    Ok(Vault::open(db_path, network, true)?)
}

fn run_keychain(cmd: &KeychainCommand, db_path: &std::path::Path, network: NetworkParams) -> Result<String, CliError> {
    let vault = open(db_path, network)?;
    match cmd {
        KeychainCommand::Exists { name } => Ok(vault.keychain_exists(name)?.to_string()),
        KeychainCommand::New { name, passphrase } => {
            let entropy: [u8; 32] = rand::random();
            let kc = vault.new_keychain(name, &entropy, passphrase.as_bytes())?;
            Ok(format!("created keychain {}", kc.name))
        }
        KeychainCommand::Rename { name, new_name } => {
            vault.rename_keychain(name, new_name)?;
            Ok(format!("renamed {} to {}", name, new_name))
        }
        KeychainCommand::Info { name } => {
            let kc = vault.get_keychain(name)?;
            Ok(format!("{:?}", kc))
        }
        KeychainCommand::Unlock { name, passphrase } => {
            vault.unlock_keychain(name, passphrase.as_bytes())?;
            Ok(format!("unlocked {}", name))
        }
        KeychainCommand::Lock { name } => {
            vault.lock_keychain(name)?;
            Ok(format!("locked {}", name))
        }
        KeychainCommand::ExportBip32 { name, with_private } => {
            let blob = vault.export_bip32(name, *with_private)?;
            Ok(hex::encode(blob))
        }
        KeychainCommand::ImportBip32 { name, extkey_hex } => {
            let blob = hex::decode(extkey_hex).map_err(|e| CliError::User(e.to_string()))?;
            let kc = vault.import_bip32(name, &blob)?;
            Ok(format!("imported keychain {}", kc.name))
        }
    }
}

fn run_account(cmd: &AccountCommand, db_path: &std::path::Path, network: NetworkParams) -> Result<String, CliError> {
    let vault = open(db_path, network)?;
    match cmd {
        AccountCommand::Exists { name } => Ok(vault.account_exists(name)?.to_string()),
        AccountCommand::New { name, minsigs, keychains, pool_size } => {
            let row = vault.new_account(name, *minsigs, keychains, *pool_size, now())?;
            Ok(format!("created account {} ({})", row.name, hex::encode(row.hash)))
        }
        AccountCommand::Rename { name, new_name } => {
            vault.rename_account(name, new_name)?;
            Ok(format!("renamed {} to {}", name, new_name))
        }
        AccountCommand::Info { name } => Ok(format!("{:?}", vault.account_info(name)?)),
        AccountCommand::List => Ok(vault
            .list_accounts()?
            .into_iter()
            .map(|a| a.name)
            .collect::<Vec<_>>()
            .join("\n")),
        AccountCommand::Balance { name, min_confirmations } => {
            Ok(vault.balance(name, *min_confirmations)?.to_string())
        }
    }
}

fn run_bin(cmd: &BinCommand, db_path: &std::path::Path, network: NetworkParams) -> Result<String, CliError> {
    let vault = open(db_path, network)?;
    match cmd {
        BinCommand::Add { account, name } => {
            let row = vault.add_account_bin(account, name)?;
            Ok(format!("added bin {} (index {})", row.name, row.index))
        }
        BinCommand::List { account } => Ok(vault
            .list_bins(account)?
            .into_iter()
            .map(|b| format!("{} ({})", b.name, b.index))
            .collect::<Vec<_>>()
            .join("\n")),
    }
}

fn run_script(cmd: &ScriptCommand, db_path: &std::path::Path, network: NetworkParams) -> Result<String, CliError> {
    let vault = open(db_path, network)?;
    match cmd {
        ScriptCommand::Issue { account, bin, label } => {
            let row = vault.issue_signing_script(account, bin, label)?;
            Ok(format!("issued script {} (index {})", hex::encode(&row.txout_script), row.index))
        }
        ScriptCommand::List { account, bin } => Ok(vault
            .list_scripts(account, bin.as_deref(), ScriptStatus::ALL)?
            .into_iter()
            .map(|s| format!("{} index={} status={:?}", s.label, s.index, s.status))
            .collect::<Vec<_>>()
            .join("\n")),
        ScriptCommand::Refill { account } => Ok(format!("minted {} scripts", vault.refill_account_pool(account)?)),
    }
}

fn run_tx(cmd: &TxCommand, db_path: &std::path::Path, network: NetworkParams) -> Result<String, CliError> {
    let vault = open(db_path, network)?;
    match cmd {
        TxCommand::Insert { raw_hex, timestamp } => {
            let raw_bytes = hex::decode(raw_hex).map_err(|e| CliError::User(e.to_string()))?;
            let raw: bitcoin::Transaction =
                bitcoin::consensus::deserialize(&raw_bytes).map_err(|e| CliError::User(e.to_string()))?;
            let row = vault.insert_tx(&raw, *timestamp, TxStatus::RECEIVED)?;
            Ok(format!("inserted tx {} status={}", row.id, row.status))
        }
        TxCommand::Delete { id } => {
            vault.delete_tx(*id)?;
            Ok(format!("deleted tx {}", id))
        }
        TxCommand::SigningRequest { id } => Ok(format!("{:?}", vault.signing_request(*id)?)),
        TxCommand::Sign { id, keychain, passphrase } => {
            let row = vault.sign_tx(*id, keychain, Some(passphrase.as_bytes()), TxStatus::UNSENT)?;
            Ok(format!("tx {} status={}", row.id, row.status))
        }
        TxCommand::Info { id } => Ok(format!("{:?}", vault.get_tx(*id)?)),
        TxCommand::List => Ok(vault
            .list_txs()?
            .into_iter()
            .map(|t| format!("{} {}", t.id, t.status))
            .collect::<Vec<_>>()
            .join("\n")),
    }
}

fn run_block(cmd: &BlockCommand, db_path: &std::path::Path, network: NetworkParams) -> Result<String, CliError> {
    let vault = open(db_path, network)?;
    match cmd {
        BlockCommand::BestHeight => Ok(vault
            .best_height()?
            .map(|h| h.to_string())
            .unwrap_or_else(|| "none".to_string())),
        BlockCommand::HorizonTimestamp => Ok(vault
            .horizon_timestamp()?
            .map(|h| h.to_string())
            .unwrap_or_else(|| "none".to_string())),
        BlockCommand::HorizonHeight => Ok(vault
            .horizon_height()?
            .map(|h| h.to_string())
            .unwrap_or_else(|| "none".to_string())),
        BlockCommand::Info { height } => Ok(format!("{:?}", vault.get_block_header(*height)?)),
        BlockCommand::InsertMerkle { raw_hex, height } => {
            let raw = hex::decode(raw_hex).map_err(|e| CliError::User(e.to_string()))?;
            let header = vault.insert_merkle_block(&raw, *height)?;
            Ok(format!("inserted block {} at height {}", hex::encode(header.hash), header.height))
        }
        BlockCommand::Delete { from_height } => {
            vault.delete_merkle_block(*from_height)?;
            Ok(format!("reverted blocks from height {}", from_height))
        }
    }
}

fn now() -> u32 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs() as u32)
        .unwrap_or(0)
}
