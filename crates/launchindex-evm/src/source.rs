//! `ChainEventSource` over `eth_blockNumber` / `eth_getLogs`.

use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use alloy_primitives::{hex, B256};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::debug;

use launchindex_core::config::IndexerConfig;
use launchindex_core::error::IndexerError;
use launchindex_core::event::SourceEvent;
use launchindex_core::source::ChainEventSource;

use crate::abi::EventAbi;
use crate::transport::{JsonRpcRequest, RpcTransport, TransportError};

/// A raw EVM log as returned by `eth_getLogs`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawLog {
    pub address: String,
    pub topics: Vec<String>,
    pub data: String,
    pub block_number: String,
    pub transaction_hash: String,
    pub log_index: String,
    #[serde(default)]
    pub removed: Option<bool>,
}

impl RawLog {
    pub fn block_number_u64(&self) -> Result<u64, IndexerError> {
        parse_hex_u64(&self.block_number)
    }

    pub fn log_index_u32(&self) -> Result<u32, IndexerError> {
        let index = parse_hex_u64(&self.log_index)?;
        u32::try_from(index)
            .map_err(|_| IndexerError::Source(format!("log index {index} out of range")))
    }

    /// `true` if the node flagged this log as dropped by a reorg.
    pub fn is_removed(&self) -> bool {
        self.removed.unwrap_or(false)
    }

    fn topics_b256(&self) -> Result<Vec<B256>, IndexerError> {
        self.topics
            .iter()
            .map(|t| {
                B256::from_str(t).map_err(|e| IndexerError::Source(format!("bad topic '{t}': {e}")))
            })
            .collect()
    }

    fn data_bytes(&self) -> Result<Vec<u8>, IndexerError> {
        let digits = self.data.strip_prefix("0x").unwrap_or(&self.data);
        hex::decode(digits).map_err(|e| IndexerError::Source(format!("bad log data: {e}")))
    }
}

/// Parse a `0x`-prefixed quantity.
pub fn parse_hex_u64(s: &str) -> Result<u64, IndexerError> {
    let digits = s.strip_prefix("0x").unwrap_or(s);
    u64::from_str_radix(digits, 16)
        .map_err(|e| IndexerError::Source(format!("invalid hex quantity '{s}': {e}")))
}

/// Reads launch events from an EVM node.
pub struct EvmEventSource<T> {
    transport: T,
    abi: EventAbi,
    next_id: AtomicU64,
}

impl<T: RpcTransport> EvmEventSource<T> {
    /// Fails if `config` tracks an event name `abi` has no signature for.
    pub fn new(transport: T, abi: EventAbi, config: &IndexerConfig) -> Result<Self, IndexerError> {
        for (contract, name) in config.tracked_pairs() {
            if !abi.contains(name) {
                return Err(IndexerError::Config(format!(
                    "no event signature for '{name}' (tracked on {contract})"
                )));
            }
        }
        Ok(Self {
            transport,
            abi,
            next_id: AtomicU64::new(1),
        })
    }

    pub fn abi(&self) -> &EventAbi {
        &self.abi
    }

    async fn call<R: DeserializeOwned>(
        &self,
        method: &str,
        params: Vec<Value>,
    ) -> Result<R, TransportError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let resp = self
            .transport
            .send(JsonRpcRequest::new(id, method, params))
            .await?;
        let result = resp.into_result().map_err(TransportError::Rpc)?;
        Ok(serde_json::from_value(result)?)
    }
}

#[async_trait]
impl<T: RpcTransport> ChainEventSource for EvmEventSource<T> {
    async fn current_block_number(&self) -> Result<u64, IndexerError> {
        let head: String = self.call("eth_blockNumber", vec![]).await?;
        parse_hex_u64(&head)
    }

    async fn get_events(
        &self,
        contract_address: &str,
        event_name: &str,
        from_block: u64,
        to_block: u64,
    ) -> Result<Vec<SourceEvent>, IndexerError> {
        let selector = self.abi.selector(event_name).ok_or_else(|| {
            IndexerError::Config(format!("no event signature for '{event_name}'"))
        })?;

        let filter = json!({
            "address": contract_address,
            "topics": [format!("{selector:#x}")],
            "fromBlock": format!("{from_block:#x}"),
            "toBlock": format!("{to_block:#x}"),
        });
        let logs: Vec<RawLog> = self.call("eth_getLogs", vec![filter]).await?;

        let mut events = Vec::with_capacity(logs.len());
        for log in logs.iter().filter(|l| !l.is_removed()) {
            let data = self
                .abi
                .decode(event_name, &log.topics_b256()?, &log.data_bytes()?)?;
            events.push(SourceEvent {
                block_number: log.block_number_u64()?,
                transaction_hash: log.transaction_hash.to_ascii_lowercase(),
                log_index: log.log_index_u32()?,
                data,
            });
        }
        events.sort_by_key(|e| (e.block_number, e.log_index));

        debug!(
            contract = contract_address,
            event = event_name,
            from_block,
            to_block,
            count = events.len(),
            url = self.transport.url(),
            "fetched logs"
        );
        Ok(events)
    }
}
