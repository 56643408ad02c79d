//! Configuration module for pollbus-watcher.
//!
//! Loads the TOML file, applies CLI overrides and validates the result.

pub mod file;

use crate::config::file::{AccountConfig, FileConfig};
use pollbus_core::BusConfig;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use url::Url;

/// Errors that can occur during configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    IoError(#[from] std::io::Error),

    #[error("failed to parse config file: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("validation error: {0}")]
    ValidationError(String),
}

/// Node connection settings after overrides.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RpcSettings {
    pub url: Url,
    pub poll_interval: Duration,
}

/// A validated watched account. The address is lowercased.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchedAccount {
    pub label: String,
    pub address: String,
}

/// Fully loaded and validated configuration.
#[derive(Debug, Clone)]
pub struct LoadedConfig {
    pub rpc: RpcSettings,
    pub bus: BusConfig,
    pub accounts: Vec<WatchedAccount>,
}

/// Configuration loader that handles the complete loading process.
pub struct ConfigLoader {
    config_path: PathBuf,
    rpc_url_override: Option<Url>,
}

impl ConfigLoader {
    /// Create a new config loader.
    pub fn new(config_path: impl AsRef<Path>, rpc_url_override: Option<Url>) -> Self {
        Self {
            config_path: config_path.as_ref().to_path_buf(),
            rpc_url_override,
        }
    }

    pub fn path(&self) -> &Path {
        &self.config_path
    }

    /// Load and process the configuration.
    ///
    /// This will:
    /// 1. Read the TOML file
    /// 2. Apply CLI overrides
    /// 3. Validate the configuration
    pub fn load(&self) -> Result<LoadedConfig, ConfigError> {
        let config_content = std::fs::read_to_string(&self.config_path)?;
        self.load_str(&config_content)
    }

    /// Reload the configuration (used during SIGHUP).
    pub fn reload(&self) -> Result<LoadedConfig, ConfigError> {
        self.load()
    }

    fn load_str(&self, content: &str) -> Result<LoadedConfig, ConfigError> {
        let mut file_config: FileConfig = toml::from_str(content)?;

        if let Some(url) = &self.rpc_url_override {
            file_config.rpc.url = Some(url.clone());
        }

        self.validate(&file_config)?;
        self.build_loaded_config(file_config)
    }

    fn validate(&self, config: &FileConfig) -> Result<(), ConfigError> {
        if config.rpc.poll_interval_ms == 0 {
            return Err(ConfigError::ValidationError(
                "rpc.poll_interval_ms must be greater than zero".to_string(),
            ));
        }

        let mut labels = HashSet::new();
        for account in &config.accounts {
            if !is_valid_address(&account.address) {
                return Err(ConfigError::ValidationError(format!(
                    "account {} has invalid address {}",
                    account.label, account.address
                )));
            }
            if !labels.insert(account.label.as_str()) {
                return Err(ConfigError::ValidationError(format!(
                    "account label {} is used more than once",
                    account.label
                )));
            }
        }
        Ok(())
    }

    fn build_loaded_config(&self, file_config: FileConfig) -> Result<LoadedConfig, ConfigError> {
        let url = file_config.rpc.url.ok_or_else(|| {
            ConfigError::ValidationError(
                "rpc.url is not set (pass --rpc-url or set it in the config file)".to_string(),
            )
        })?;

        Ok(LoadedConfig {
            rpc: RpcSettings {
                url,
                poll_interval: Duration::from_millis(file_config.rpc.poll_interval_ms),
            },
            bus: file_config.bus,
            accounts: file_config
                .accounts
                .into_iter()
                .map(convert_account)
                .collect(),
        })
    }
}

fn convert_account(account: AccountConfig) -> WatchedAccount {
    WatchedAccount {
        label: account.label,
        address: account.address.to_ascii_lowercase(),
    }
}

fn is_valid_address(address: &str) -> bool {
    address
        .strip_prefix("0x")
        .is_some_and(|hex| hex.len() == 40 && hex.chars().all(|c| c.is_ascii_hexdigit()))
}
