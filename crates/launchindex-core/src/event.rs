//! Chain event representations: what the source returns, what handlers see,
//! and what lands in the raw audit table.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::IndexerError;
use crate::payload::EventPayload;

/// An event as returned by a `ChainEventSource` for one (contract, name) query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceEvent {
    pub block_number: u64,
    pub transaction_hash: String,
    /// Position of the log within its block.
    pub log_index: u32,
    /// Decoded event arguments.
    pub data: Value,
}

/// A fully identified event handed to the dispatcher.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChainEvent {
    pub event_name: String,
    pub contract_address: String,
    pub block_number: u64,
    pub transaction_hash: String,
    pub event_index: u32,
    pub data: Value,
}

impl ChainEvent {
    pub fn from_source(contract_address: &str, event_name: &str, event: SourceEvent) -> Self {
        Self {
            event_name: event_name.to_string(),
            contract_address: contract_address.to_string(),
            block_number: event.block_number,
            transaction_hash: event.transaction_hash,
            event_index: event.log_index,
            data: event.data,
        }
    }

    /// Decode the typed payload for this event's name.
    pub fn payload(&self) -> Result<EventPayload, IndexerError> {
        EventPayload::decode(&self.event_name, &self.data)
    }
}

/// Append-only audit record of an observed event.
///
/// Unique on `(transaction_hash, event_index)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawEvent {
    pub event_name: String,
    pub contract_address: String,
    pub block_number: u64,
    pub transaction_hash: String,
    pub event_index: u32,
    pub data: Value,
    /// Whether a handler was registered for this event name when it was stored.
    pub indexed: bool,
    /// Unix seconds.
    pub observed_at: i64,
}

impl RawEvent {
    pub fn from_event(event: &ChainEvent, indexed: bool) -> Self {
        Self {
            event_name: event.event_name.clone(),
            contract_address: event.contract_address.clone(),
            block_number: event.block_number,
            transaction_hash: event.transaction_hash.clone(),
            event_index: event.event_index,
            data: event.data.clone(),
            indexed,
            observed_at: chrono::Utc::now().timestamp(),
        }
    }
}
