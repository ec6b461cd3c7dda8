//! On-disk configuration for a PISA tower, modeled on `reth-config`'s
//! `Config` type: a single TOML document, `serde(default)` throughout so a
//! partial file still produces a usable configuration, loaded once at
//! start-up and handed down to every component that needs it.

use serde::{Deserialize, Serialize};
use std::{fs, path::Path};

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read { path: String, source: std::io::Error },
    #[error("failed to parse config file {path}: {source}")]
    Parse { path: String, source: toml::de::Error },
    #[error("failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),
}

/// Top-level tower configuration.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    pub chain: ChainConfig,
    pub cache: CacheConfig,
    pub confirmations: ConfirmationsConfig,
    pub responder: ResponderConfig,
    pub store: StoreConfig,
    pub ingress: IngressConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            chain: ChainConfig::default(),
            cache: CacheConfig::default(),
            confirmations: ConfirmationsConfig::default(),
            responder: ResponderConfig::default(),
            store: StoreConfig::default(),
            ingress: IngressConfig::default(),
        }
    }
}

impl Config {
    /// Loads configuration from `path`, falling back to defaults for any
    /// field the file omits.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path)
            .map_err(|source| ConfigError::Read { path: path.display().to_string(), source })?;
        toml::from_str(&contents).map_err(|source| ConfigError::Parse { path: path.display().to_string(), source })
    }

    pub fn to_toml_string(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }
}

/// How to reach the chain provider (§6 "Chain provider").
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ChainConfig {
    pub rpc_url: String,
    pub chain_id: u64,
    /// Milliseconds between polling `getBlockNumber` when the provider has
    /// no push subscription available.
    pub poll_interval_ms: u64,
}

impl Default for ChainConfig {
    fn default() -> Self {
        Self { rpc_url: "http://127.0.0.1:8545".to_string(), chain_id: 1, poll_interval_ms: 4000 }
    }
}

/// Block cache sizing (§3 "Cache invariants").
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct CacheConfig {
    pub max_depth: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self { max_depth: 200 }
    }
}

/// The confirmation-count thresholds named throughout §4.5/§4.6.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ConfirmationsConfig {
    pub before_response: u64,
    pub before_removal: u64,
    pub before_retire: u64,
    /// `STALE_BLOCKS`: heads a `Pending` transaction may sit uninlcuded
    /// before the responder bumps its gas price (§4.6).
    pub stale_blocks: u64,
}

impl Default for ConfirmationsConfig {
    fn default() -> Self {
        Self { before_response: 4, before_removal: 20, before_retire: 4, stale_blocks: 5 }
    }
}

/// Multi-responder broadcast policy (§4.6, §5 "Timeouts").
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ResponderConfig {
    /// Path to the file holding the responder wallet's hex-encoded private
    /// key. The signing API itself is an external collaborator (§1); this
    /// is only how the tower locates its key material.
    pub signer_key_path: String,
    pub max_broadcast_retries: u32,
    pub backoff_base_ms: u64,
    pub backoff_max_ms: u64,
}

impl Default for ResponderConfig {
    fn default() -> Self {
        Self {
            signer_key_path: "signer.key".to_string(),
            max_broadcast_retries: 5,
            backoff_base_ms: 500,
            backoff_max_ms: 30_000,
        }
    }
}

/// Block-item store location and concurrency bound (§4.1).
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct StoreConfig {
    pub data_dir: String,
    pub batch_open_timeout_ms: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self { data_dir: "data".to_string(), batch_open_timeout_ms: 1_000 }
    }
}

/// The HTTP ingress surface (§4.9, §6 "HTTP surface").
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct IngressConfig {
    pub bind_address: String,
    /// Path to the file holding the tower's own hex-encoded private key,
    /// used to countersign accepted appointments (§4.9 "Issues a
    /// receipt"). Distinct from `responder.signer_key_path` - the tower's
    /// signature authenticates its own API responses, the responder's
    /// wallet signs on-chain transactions (§1: two separate collaborators).
    pub tower_key_path: String,
    /// How many blocks of slack an appointment's `startBlock` may have from
    /// the current head before `POST /appointment` rejects it (§4.9).
    pub start_block_window: u64,
    /// How old an `x-auth-block` header may be before
    /// `GET /appointment/customer/{address}` rejects it as stale (§4.9).
    pub auth_block_window: u64,
}

impl Default for IngressConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:3000".to_string(),
            tower_key_path: "tower.key".to_string(),
            start_block_window: 20,
            auth_block_window: 200,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_file_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pisa.toml");
        fs::write(&path, "[chain]\nrpc_url = \"http://example.invalid\"\n").unwrap();

        let config = Config::load(&path).unwrap();
        assert_eq!(config.chain.rpc_url, "http://example.invalid");
        assert_eq!(config.chain.chain_id, ChainConfig::default().chain_id);
        assert_eq!(config.cache, CacheConfig::default());
    }

    #[test]
    fn round_trips_through_toml() {
        let config = Config::default();
        let serialized = config.to_toml_string().unwrap();
        let parsed: Config = toml::from_str(&serialized).unwrap();
        assert_eq!(config, parsed);
    }
}
