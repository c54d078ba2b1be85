//! The chain event source consumed by the index loop.

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::IndexerError;
use crate::event::SourceEvent;

/// Read access to a chain node.
///
/// Any failure is treated by the index loop as transient and retried.
#[async_trait]
pub trait ChainEventSource: Send + Sync {
    /// Current chain head.
    async fn current_block_number(&self) -> Result<u64, IndexerError>;

    /// Events named `event_name` emitted by `contract_address` in
    /// `[from_block, to_block]`, ordered by block then log index.
    async fn get_events(
        &self,
        contract_address: &str,
        event_name: &str,
        from_block: u64,
        to_block: u64,
    ) -> Result<Vec<SourceEvent>, IndexerError>;
}

#[async_trait]
impl<T: ChainEventSource + ?Sized> ChainEventSource for Arc<T> {
    async fn current_block_number(&self) -> Result<u64, IndexerError> {
        (**self).current_block_number().await
    }

    async fn get_events(
        &self,
        contract_address: &str,
        event_name: &str,
        from_block: u64,
        to_block: u64,
    ) -> Result<Vec<SourceEvent>, IndexerError> {
        (**self)
            .get_events(contract_address, event_name, from_block, to_block)
            .await
    }
}
