//! TOML file configuration structures.
//!
//! These structs directly map to the `pollbus-watcher.toml` file format.

use pollbus_core::BusConfig;
use serde::{Deserialize, Serialize};
use url::Url;

/// Root configuration structure as read from the TOML file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileConfig {
    #[serde(default)]
    pub rpc: RpcConfig,
    #[serde(default)]
    pub bus: BusConfig,
    #[serde(default)]
    pub accounts: Vec<AccountConfig>,
}

/// Node connection section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcConfig {
    /// JSON-RPC endpoint. May be left out when `--rpc-url` is given.
    #[serde(default)]
    pub url: Option<Url>,
    /// How often the head follower asks for the latest block.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
}

impl Default for RpcConfig {
    fn default() -> Self {
        Self {
            url: None,
            poll_interval_ms: default_poll_interval_ms(),
        }
    }
}

fn default_poll_interval_ms() -> u64 {
    4000
}

/// An account whose balance and nonce are watched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountConfig {
    /// Unique human-readable name, used in logs.
    pub label: String,
    /// `0x`-prefixed, 20-byte hex address.
    pub address: String,
}
