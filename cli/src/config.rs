//! YAML configuration for the `launchindex` binary.
//!
//! ```yaml
//! indexer:
//!   start_block: 18000000
//!   batch_size: 500
//!   contracts:
//!     - address: "0x…factory"
//!       events: [LaunchCreated, Graduated]
//! rpc:
//!   url: https://eth.llamarpc.com
//! database:
//!   url: postgres://indexer@localhost/launches
//! log:
//!   level: info
//! ```

use std::collections::BTreeMap;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use launchindex_core::config::IndexerConfig;
use launchindex_evm::EventAbi;

use crate::logging::LogConfig;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub indexer: IndexerConfig,
    pub rpc: RpcConfig,
    pub database: DatabaseConfig,
    pub log: LogConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RpcConfig {
    pub url: String,
    pub timeout_secs: u64,
    /// Event name → Solidity signature. Added on top of the built-in launch
    /// events; an entry with a built-in name replaces it.
    pub events: BTreeMap<String, String>,
}

impl Default for RpcConfig {
    fn default() -> Self {
        Self {
            url: "http://localhost:8545".into(),
            timeout_secs: 30,
            events: BTreeMap::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// `postgres://…` selects Postgres; anything else is a SQLite path or URL.
    pub url: String,
    pub max_connections: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "launchindex.db".into(),
            max_connections: 10,
        }
    }
}

impl DatabaseConfig {
    pub fn is_postgres(&self) -> bool {
        self.url.starts_with("postgres://") || self.url.starts_with("postgresql://")
    }
}

impl AppConfig {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        Self::from_yaml(&raw).with_context(|| format!("parsing config {}", path.display()))
    }

    pub fn from_yaml(raw: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(raw)?)
    }

    /// Command-line / environment values win over the file.
    pub fn apply_overrides(&mut self, rpc_url: Option<String>, database_url: Option<String>) {
        if let Some(url) = rpc_url {
            self.rpc.url = url;
        }
        if let Some(url) = database_url {
            self.database.url = url;
        }
    }

    /// Built-in signatures plus `rpc.events`.
    pub fn event_abi(&self) -> Result<EventAbi> {
        let mut abi = EventAbi::launch_defaults().context("built-in event signatures")?;
        for (name, signature) in &self.rpc.events {
            abi.insert(name, signature)
                .with_context(|| format!("rpc.events.{name}"))?;
        }
        Ok(abi)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
indexer:
  start_block: 100
  batch_size: 50
  poll_interval_ms: 2000
  contracts:
    - address: "0xfactory"
      events: [LaunchCreated, Graduated]
    - address: "0xpool"
      events: [ContributionMade, Refunded]
rpc:
  url: http://node:8545
  events:
    Refunded: "event Refunded(address indexed tokenAddress, bytes32 indexed nullifier, uint256 amount)"
database:
  url: postgres://indexer@db/launches
log:
  level: debug
  json: true
"#;

    #[test]
    fn parses_all_sections() {
        let config = AppConfig::from_yaml(SAMPLE).unwrap();
        assert_eq!(config.indexer.start_block, 100);
        assert_eq!(config.indexer.batch_size, 50);
        assert_eq!(config.indexer.contracts.len(), 2);
        assert_eq!(config.indexer.contracts[1].events, vec!["ContributionMade", "Refunded"]);
        assert_eq!(config.rpc.url, "http://node:8545");
        assert_eq!(config.rpc.timeout_secs, 30);
        assert!(config.database.is_postgres());
        assert_eq!(config.log.level, "debug");
        assert!(config.log.json);
        config.indexer.validate().unwrap();
    }

    #[test]
    fn empty_file_uses_defaults() {
        let config = AppConfig::from_yaml("{}").unwrap();
        assert!(config.indexer.enabled);
        assert_eq!(config.indexer.poll_interval_ms, 5000);
        assert_eq!(config.database.url, "launchindex.db");
        assert!(!config.database.is_postgres());
    }

    #[test]
    fn overrides_replace_urls() {
        let mut config = AppConfig::from_yaml(SAMPLE).unwrap();
        config.apply_overrides(Some("http://other:8545".into()), None);
        assert_eq!(config.rpc.url, "http://other:8545");
        assert_eq!(config.database.url, "postgres://indexer@db/launches");

        config.apply_overrides(None, Some("sqlite:local.db".into()));
        assert!(!config.database.is_postgres());
    }

    #[test]
    fn extra_signatures_join_the_defaults() {
        let config = AppConfig::from_yaml(SAMPLE).unwrap();
        let abi = config.event_abi().unwrap();
        assert!(abi.contains("Refunded"));
        assert!(abi.contains("LaunchCreated"));
    }

    #[test]
    fn bad_signature_names_the_entry() {
        let mut config = AppConfig::default();
        config.rpc.events.insert("Broken".into(), "event Broken(".into());
        let err = config.event_abi().unwrap_err();
        assert!(format!("{err:#}").contains("rpc.events.Broken"));
    }
}
