//! Configuration types for Ballot

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::BallotError;
use crate::traits::BallotResult;

/// Main node configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeConfig {
    /// Node name for logging
    pub name: String,

    /// Data directory
    pub data_dir: PathBuf,

    /// Logging level, overridden by `RUST_LOG`
    pub log_level: String,

    /// Storage configuration
    pub storage: StorageConfig,

    /// API configuration
    pub api: ApiConfig,

    /// Signed call handling
    pub calls: CallConfig,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            name: "ballot-node".to_string(),
            data_dir: PathBuf::from("./data"),
            log_level: "info".to_string(),
            storage: StorageConfig::default(),
            api: ApiConfig::default(),
            calls: CallConfig::default(),
        }
    }
}

impl NodeConfig {
    /// Load from a JSON file. Missing fields take their defaults.
    pub fn load<P: AsRef<Path>>(path: P) -> BallotResult<Self> {
        let content = std::fs::read_to_string(path.as_ref()).map_err(|e| {
            BallotError::ConfigError(format!("{}: {}", path.as_ref().display(), e))
        })?;
        let config = Self::from_json(&content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_json(json: &str) -> BallotResult<Self> {
        serde_json::from_str(json).map_err(|e| BallotError::ConfigError(e.to_string()))
    }

    pub fn to_json(&self) -> BallotResult<String> {
        serde_json::to_string_pretty(self)
            .map_err(|e| BallotError::SerializationError(e.to_string()))
    }

    /// Reject settings the node cannot run with
    pub fn validate(&self) -> BallotResult<()> {
        if self.api.enabled && self.api.listen_addr.parse::<std::net::SocketAddr>().is_err() {
            return Err(BallotError::ConfigError(format!(
                "Invalid API listen address: {}",
                self.api.listen_addr
            )));
        }

        if self.calls.expiry_seconds == 0 {
            return Err(BallotError::ConfigError(
                "Call expiry must be at least one second".into(),
            ));
        }

        if self.calls.replay_cache_size == 0 {
            return Err(BallotError::ConfigError(
                "Replay cache size must be non-zero".into(),
            ));
        }

        Ok(())
    }

    /// Directory holding the sled database
    pub fn db_path(&self) -> PathBuf {
        self.data_dir.join("ledger.db")
    }
}

/// Storage backend selection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    /// Everything in memory, lost on restart
    #[default]
    Memory,
    /// Durable sled database under the data directory
    Sled,
}

/// Storage configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct StorageConfig {
    pub backend: StorageBackend,
}

/// API configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    /// Enable HTTP API
    pub enabled: bool,

    /// API listen address
    pub listen_addr: String,

    /// Enable CORS
    pub enable_cors: bool,

    /// CORS allowed origins
    pub cors_origins: Vec<String>,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            listen_addr: "127.0.0.1:8080".to_string(),
            enable_cors: true,
            cors_origins: vec!["*".to_string()],
        }
    }
}

/// Signed call configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CallConfig {
    /// Calls older than this are rejected
    pub expiry_seconds: u64,

    /// Maximum number of remembered call ids for replay detection
    pub replay_cache_size: usize,
}

impl Default for CallConfig {
    fn default() -> Self {
        Self {
            expiry_seconds: 300,
            replay_cache_size: 100_000,
        }
    }
}
