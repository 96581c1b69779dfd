//! Configuration for driving workflows against a ledger backend
//!
//! # Example Configuration File (scriptflow.toml)
//!
//! ```toml
//! [network]
//! network = "preprod"
//!
//! [backend]
//! url = "http://127.0.0.1:8090"
//! user = "user"
//! password = "password"
//!
//! [submit]
//! interval_ms = 1000
//! max_attempts = 60
//!
//! [window]
//! tolerance_slots = 10
//! ```
//!
//! A `[chain]` table with `zero_time_ms`, `zero_slot` and `slot_length_ms`
//! overrides the network's slot clock, e.g. for a local devnet.

use crate::ledger::NetworkId;
use crate::time::SlotConfig;
use crate::wait::PollPolicy;
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

/// Named network
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Network {
    #[default]
    Preprod,
    Preview,
    Mainnet,
}

impl Network {
    /// Network id carried in addresses
    #[must_use]
    pub const fn network_id(self) -> NetworkId {
        match self {
            Self::Preprod | Self::Preview => NetworkId::Testnet,
            Self::Mainnet => NetworkId::Mainnet,
        }
    }

    /// Published slot clock for this network
    #[must_use]
    pub const fn slot_config(self) -> SlotConfig {
        match self {
            Self::Preprod => SlotConfig::PREPROD,
            Self::Preview => SlotConfig::PREVIEW,
            Self::Mainnet => SlotConfig::MAINNET,
        }
    }
}

impl std::fmt::Display for Network {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Preprod => write!(f, "preprod"),
            Self::Preview => write!(f, "preview"),
            Self::Mainnet => write!(f, "mainnet"),
        }
    }
}

/// Backend connection settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackendConfig {
    /// JSON-RPC endpoint (e.g., `http://127.0.0.1:8090`)
    pub url: String,
    pub user: String,
    pub password: String,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            url: "http://127.0.0.1:8090".to_string(),
            user: "user".to_string(),
            password: "password".to_string(),
        }
    }
}

/// Slot clock override
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct ChainConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub zero_time_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub zero_slot: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub slot_length_ms: Option<u64>,
}

/// Validity window settings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WindowConfig {
    /// Slots of slack on each side of "now"
    pub tolerance_slots: u64,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self { tolerance_slots: 10 }
    }
}

/// Network configuration wrapper (for TOML structure)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
struct NetworkWrapper {
    network: Network,
}

/// Complete driver configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct DriverConfig {
    #[serde(default, rename = "network")]
    network_wrapper: NetworkWrapper,
    #[serde(default)]
    pub backend: BackendConfig,
    #[serde(default)]
    pub chain: ChainConfig,
    #[serde(default)]
    pub submit: PollPolicy,
    #[serde(default)]
    pub window: WindowConfig,
}

impl DriverConfig {
    /// Load configuration from a TOML file
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_toml(&contents)
    }

    /// Parse configuration from TOML string
    ///
    /// # Errors
    ///
    /// Returns an error if the TOML is invalid or the slot length is zero.
    pub fn from_toml(toml_str: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(toml_str)?;
        if config.chain.slot_length_ms == Some(0) {
            return Err(ConfigError::InvalidChain("slot_length_ms must be non-zero".into()));
        }
        Ok(config)
    }

    /// Serialize configuration to TOML string
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(ConfigError::Serialize)
    }

    /// Save configuration to a file
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        let toml_str = self.to_toml()?;
        std::fs::write(path, toml_str)?;
        Ok(())
    }

    #[must_use]
    pub const fn network(&self) -> Network {
        self.network_wrapper.network
    }

    pub fn set_network(&mut self, network: Network) {
        self.network_wrapper.network = network;
    }

    #[must_use]
    pub const fn network_id(&self) -> NetworkId {
        self.network().network_id()
    }

    /// Network slot clock with any `[chain]` overrides applied
    #[must_use]
    pub fn slot_config(&self) -> SlotConfig {
        let base = self.network().slot_config();
        SlotConfig {
            zero_time_ms: self.chain.zero_time_ms.unwrap_or(base.zero_time_ms),
            zero_slot: self.chain.zero_slot.unwrap_or(base.zero_slot),
            slot_length_ms: self.chain.slot_length_ms.unwrap_or(base.slot_length_ms),
        }
    }

    /// Default config for a network
    #[must_use]
    pub fn for_network(network: Network) -> Self {
        Self {
            network_wrapper: NetworkWrapper { network },
            ..Self::default()
        }
    }

    /// Set backend connection settings
    #[must_use]
    pub fn with_backend(mut self, url: &str, user: &str, password: &str) -> Self {
        self.backend.url = url.to_string();
        self.backend.user = user.to_string();
        self.backend.password = password.to_string();
        self
    }

    /// Override the slot clock
    #[must_use]
    pub const fn with_slot_config(mut self, slots: SlotConfig) -> Self {
        self.chain = ChainConfig {
            zero_time_ms: Some(slots.zero_time_ms),
            zero_slot: Some(slots.zero_slot),
            slot_length_ms: Some(slots.slot_length_ms),
        };
        self
    }

    #[must_use]
    pub const fn with_poll_policy(mut self, policy: PollPolicy) -> Self {
        self.submit = policy;
        self
    }

    #[must_use]
    pub const fn with_tolerance(mut self, tolerance_slots: u64) -> Self {
        self.window.tolerance_slots = tolerance_slots;
        self
    }
}

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Serialize error: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("Invalid chain settings: {0}")]
    InvalidChain(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_default_config() {
        let config = DriverConfig::default();
        assert_eq!(config.network(), Network::Preprod);
        assert_eq!(config.backend.url, "http://127.0.0.1:8090");
        assert_eq!(config.slot_config(), SlotConfig::PREPROD);
        assert_eq!(config.window.tolerance_slots, 10);
        assert_eq!(config.submit, PollPolicy::default());
    }

    #[test]
    fn test_parse_toml() {
        let toml_str = r#"
[network]
network = "preview"

[backend]
url = "http://localhost:9000"
user = "myuser"
password = "mypass"

[submit]
interval_ms = 500
max_attempts = 5

[window]
tolerance_slots = 30
"#;
        let config = DriverConfig::from_toml(toml_str).unwrap();
        assert_eq!(config.network(), Network::Preview);
        assert_eq!(config.network_id(), NetworkId::Testnet);
        assert_eq!(config.backend.user, "myuser");
        assert_eq!(config.submit, PollPolicy::new(Duration::from_millis(500), 5));
        assert_eq!(config.window.tolerance_slots, 30);
        assert_eq!(config.slot_config(), SlotConfig::PREVIEW);
    }

    #[test]
    fn test_chain_override() {
        let toml_str = r#"
[network]
network = "mainnet"

[chain]
zero_time_ms = 1000
zero_slot = 0
"#;
        let config = DriverConfig::from_toml(toml_str).unwrap();
        let slots = config.slot_config();
        assert_eq!(slots.zero_time_ms, 1000);
        assert_eq!(slots.zero_slot, 0);
        assert_eq!(slots.slot_length_ms, SlotConfig::MAINNET.slot_length_ms);
    }

    #[test]
    fn test_zero_slot_length_rejected() {
        let toml_str = "[chain]\nslot_length_ms = 0\n";
        assert!(matches!(
            DriverConfig::from_toml(toml_str),
            Err(ConfigError::InvalidChain(_))
        ));
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("scriptflow.toml");
        let config = DriverConfig::for_network(Network::Mainnet)
            .with_backend("http://node:1234", "alice", "secret")
            .with_tolerance(5);
        config.save(&path).unwrap();

        let loaded = DriverConfig::from_file(&path).unwrap();
        assert_eq!(loaded, config);
        assert_eq!(loaded.network_id(), NetworkId::Mainnet);
    }

    #[test]
    fn test_network_slot_configs() {
        assert_eq!(Network::Mainnet.slot_config(), SlotConfig::MAINNET);
        assert_eq!(Network::Preprod.to_string(), "preprod");
    }
}
