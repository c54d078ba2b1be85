//! Error types for the launchindex pipeline.

use thiserror::Error;

/// Errors that can occur during indexing.
#[derive(Debug, Error)]
pub enum IndexerError {
    /// The chain event source (node, RPC endpoint) failed.
    #[error("Source error: {0}")]
    Source(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Handler error in '{handler}': {reason}")]
    Handler { handler: String, reason: String },

    /// An event payload did not match the shape expected for its name.
    #[error("Malformed '{event}' payload: {reason}")]
    Decode { event: String, reason: String },

    #[error("Checkpoint regression: at block {current}, refused to move to {requested}")]
    CheckpointRegression { current: u64, requested: u64 },

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("{0}")]
    Other(String),
}

impl IndexerError {
    /// Shorthand for a handler failure.
    pub fn handler(handler: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Handler {
            handler: handler.into(),
            reason: reason.into(),
        }
    }

    /// Returns `true` for failures that are expected to clear up on their own
    /// (node hiccups, database connectivity).
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Source(_) | Self::Storage(_))
    }
}
