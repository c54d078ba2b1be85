//! Indexer configuration and the fluent builder for it.
//!
//! # Example
//!
//! ```rust
//! use launchindex_core::config::IndexerBuilder;
//!
//! let config = IndexerBuilder::new()
//!     .start_block(19_000_000)
//!     .batch_size(250)
//!     .poll_interval_ms(3_000)
//!     .track("0xfactory", ["LaunchCreated", "Graduated"])
//!     .track("0xpool", ["ContributionMade"])
//!     .build_config();
//! assert_eq!(config.contracts.len(), 2);
//! ```

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::IndexerError;

/// A contract address together with the event names to index from it.
///
/// Event names are fetched in the order listed here.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackedContract {
    pub address: String,
    pub events: Vec<String>,
}

impl TrackedContract {
    pub fn new<I, S>(address: impl Into<String>, events: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            address: address.into(),
            events: events.into_iter().map(Into::into).collect(),
        }
    }
}

/// Configuration for an indexer instance.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexerConfig {
    /// When `false`, `start_indexer` returns immediately.
    pub enabled: bool,
    /// Delay between polls, in milliseconds. Failures back off for twice this.
    pub poll_interval_ms: u64,
    /// Maximum number of blocks covered by one window.
    pub batch_size: u64,
    /// Checkpoint value used when no checkpoint has been written yet.
    /// Indexing starts at `start_block + 1`.
    pub start_block: u64,
    /// Contracts visited in this order on every poll.
    pub contracts: Vec<TrackedContract>,
}

impl Default for IndexerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            poll_interval_ms: 5_000,
            batch_size: 100,
            start_block: 0,
            contracts: vec![],
        }
    }
}

impl IndexerConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Delay applied after a failed cycle.
    pub fn backoff_interval(&self) -> Duration {
        self.poll_interval() * 2
    }

    /// Inclusive block window following `checkpoint`, capped at `head`.
    ///
    /// Returns `None` when the chain has not moved past the checkpoint.
    pub fn window(&self, checkpoint: u64, head: u64) -> Option<(u64, u64)> {
        if head <= checkpoint {
            return None;
        }
        let from = checkpoint + 1;
        let to = checkpoint.saturating_add(self.batch_size).min(head);
        Some((from, to))
    }

    /// Iterate `(contract, event_name)` pairs in configured order.
    pub fn tracked_pairs(&self) -> impl Iterator<Item = (&str, &str)> {
        self.contracts.iter().flat_map(|c| {
            c.events
                .iter()
                .map(move |e| (c.address.as_str(), e.as_str()))
        })
    }

    pub fn validate(&self) -> Result<(), IndexerError> {
        if self.batch_size == 0 {
            return Err(IndexerError::Config("batch_size must be at least 1".into()));
        }
        if self.poll_interval_ms == 0 {
            return Err(IndexerError::Config(
                "poll_interval_ms must be greater than zero".into(),
            ));
        }
        for contract in &self.contracts {
            if contract.address.trim().is_empty() {
                return Err(IndexerError::Config("tracked contract with empty address".into()));
            }
            if contract.events.is_empty() {
                return Err(IndexerError::Config(format!(
                    "contract {} tracks no events",
                    contract.address
                )));
            }
        }
        Ok(())
    }
}

/// Fluent builder for `IndexerConfig`.
#[derive(Default)]
pub struct IndexerBuilder {
    config: IndexerConfig,
}

impl IndexerBuilder {
    pub fn new() -> Self {
        Self {
            config: IndexerConfig::default(),
        }
    }

    pub fn enabled(mut self, enabled: bool) -> Self {
        self.config.enabled = enabled;
        self
    }

    /// Set the fallback checkpoint used before anything has been indexed.
    pub fn start_block(mut self, block: u64) -> Self {
        self.config.start_block = block;
        self
    }

    /// Set the maximum number of blocks per window.
    pub fn batch_size(mut self, size: u64) -> Self {
        self.config.batch_size = size;
        self
    }

    /// Set the polling interval in milliseconds.
    pub fn poll_interval_ms(mut self, ms: u64) -> Self {
        self.config.poll_interval_ms = ms;
        self
    }

    /// Track `events` on `address`. Call order defines visit order.
    pub fn track<I, S>(mut self, address: impl Into<String>, events: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.config.contracts.push(TrackedContract::new(address, events));
        self
    }

    pub fn build_config(self) -> IndexerConfig {
        self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_defaults() {
        let cfg = IndexerBuilder::new().build_config();
        assert!(cfg.enabled);
        assert_eq!(cfg.batch_size, 100);
        assert_eq!(cfg.poll_interval_ms, 5_000);
        assert_eq!(cfg.start_block, 0);
        assert!(cfg.contracts.is_empty());
    }

    #[test]
    fn window_is_bounded_by_batch_size_and_head() {
        let cfg = IndexerBuilder::new().batch_size(50).build_config();
        assert_eq!(cfg.window(100, 105), Some((101, 105)));
        assert_eq!(cfg.window(100, 1_000), Some((101, 150)));
        assert_eq!(cfg.window(100, 100), None);
        assert_eq!(cfg.window(100, 90), None);
    }

    #[test]
    fn window_single_block_batches() {
        let cfg = IndexerBuilder::new().batch_size(1).build_config();
        assert_eq!(cfg.window(7, 9), Some((8, 8)));
    }

    #[test]
    fn tracked_pairs_follow_configured_order() {
        let cfg = IndexerBuilder::new()
            .track("0xb", ["Graduated", "LaunchCreated"])
            .track("0xa", ["ContributionMade"])
            .build_config();
        let pairs: Vec<_> = cfg.tracked_pairs().collect();
        assert_eq!(
            pairs,
            vec![
                ("0xb", "Graduated"),
                ("0xb", "LaunchCreated"),
                ("0xa", "ContributionMade"),
            ]
        );
    }

    #[test]
    fn validate_rejects_bad_values() {
        assert!(IndexerBuilder::new().batch_size(0).build_config().validate().is_err());
        assert!(IndexerBuilder::new().poll_interval_ms(0).build_config().validate().is_err());
        let empty_events = IndexerBuilder::new()
            .track("0xa", Vec::<String>::new())
            .build_config();
        assert!(empty_events.validate().is_err());
        assert!(IndexerBuilder::new()
            .track("0xa", ["LaunchCreated"])
            .build_config()
            .validate()
            .is_ok());
    }

    #[test]
    fn deserializes_with_defaults() {
        let cfg: IndexerConfig = serde_json::from_value(serde_json::json!({
            "start_block": 42,
            "contracts": [{ "address": "0xabc", "events": ["LaunchCreated"] }]
        }))
        .unwrap();
        assert!(cfg.enabled);
        assert_eq!(cfg.start_block, 42);
        assert_eq!(cfg.batch_size, 100);
        assert_eq!(cfg.contracts[0].events, vec!["LaunchCreated".to_string()]);
    }
}
