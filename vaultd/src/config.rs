//! TOML configuration file for `vaultd`, loaded from the path `--config`
//! names or, failing that, `dirs::config_dir()/vaultd/config.toml`
//! (`spec.md` §6, [AMBIENT] Configuration in `SPEC_FULL.md`).

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    FileRead(#[from] std::io::Error),
    #[error("failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),
    #[error("could not determine a config directory for this platform")]
    NoConfigDir,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub network: NetworkConfig,
    pub vault: VaultFileConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkConfig {
    /// One of "mainnet", "testnet", "regtest" (`vault::NetworkParams::by_name`).
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VaultFileConfig {
    /// Directory holding the `sled` database; `vault.db` is created inside it.
    pub data_dir: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// `tracing_subscriber::EnvFilter` directive, e.g. "info" or "vault=debug".
    pub filter: String,
}

impl Config {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path.as_ref())?;
        Ok(toml::from_str(&contents)?)
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        let contents = toml::to_string_pretty(self)?;
        if let Some(parent) = path.as_ref().parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, contents)?;
        Ok(())
    }

    pub fn default_path() -> Result<PathBuf, ConfigError> {
        let dir = dirs::config_dir().ok_or(ConfigError::NoConfigDir)?.join("vaultd");
        Ok(dir.join("config.toml"))
    }
}

impl Default for Config {
    fn default() -> Self {
        Config {
            network: NetworkConfig { name: "mainnet".to_string() },
            vault: VaultFileConfig { data_dir: default_data_dir() },
            logging: LoggingConfig { filter: "info".to_string() },
        }
    }
}

fn default_data_dir() -> PathBuf {
    dirs::data_dir().unwrap_or_else(|| PathBuf::from(".")).join("vaultd")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_through_toml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        let config = Config::default();
        config.save(&path).unwrap();
        let loaded = Config::from_file(&path).unwrap();
        assert_eq!(loaded.network.name, config.network.name);
        assert_eq!(loaded.logging.filter, config.logging.filter);
    }

    #[test]
    fn missing_file_is_a_read_error() {
        let result = Config::from_file("/nonexistent/vaultd/config.toml");
        assert!(matches!(result, Err(ConfigError::FileRead(_))));
    }

    #[test]
    fn invalid_toml_is_a_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "not valid toml = [").unwrap();
        let result = Config::from_file(&path);
        assert!(matches!(result, Err(ConfigError::Parse(_))));
    }
}
