//! Event handler trait + registry.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::warn;

use crate::error::IndexerError;
use crate::event::ChainEvent;

/// Trait for event handlers.
///
/// A handler either succeeds or fails; a failure aborts the enclosing batch.
#[async_trait]
pub trait EventHandler: Send + Sync {
    async fn handle(&self, event: &ChainEvent) -> Result<(), IndexerError>;
}

/// What `HandlerRegistry::dispatch` did with an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    Handled,
    /// No handler registered for the event name.
    Skipped,
}

/// Maps event names to handlers.
///
/// Built once at startup and then owned by the index loop.
#[derive(Default, Clone)]
pub struct HandlerRegistry {
    handlers: HashMap<String, Arc<dyn EventHandler>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `handler` for `event_name`, returning the handler it replaces.
    pub fn register(
        &mut self,
        event_name: impl Into<String>,
        handler: Arc<dyn EventHandler>,
    ) -> Option<Arc<dyn EventHandler>> {
        self.handlers.insert(event_name.into(), handler)
    }

    pub fn contains(&self, event_name: &str) -> bool {
        self.handlers.contains_key(event_name)
    }

    /// Registered event names, sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.handlers.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    /// Run the handler registered for `event.event_name`.
    ///
    /// Unknown names are logged and skipped, not treated as errors.
    pub async fn dispatch(&self, event: &ChainEvent) -> Result<DispatchOutcome, IndexerError> {
        match self.handlers.get(&event.event_name) {
            Some(handler) => {
                handler.handle(event).await?;
                Ok(DispatchOutcome::Handled)
            }
            None => {
                warn!(
                    event = %event.event_name,
                    contract = %event.contract_address,
                    tx = %event.transaction_hash,
                    index = event.event_index,
                    "no handler registered; skipping event"
                );
                Ok(DispatchOutcome::Skipped)
            }
        }
    }
}
