//! Checkpoint manager. Persists the indexer's position across restarts.
//!
//! A single checkpoint row records the last block whose window was fully
//! processed, plus a status/error pair for operators. On restart the index loop
//! resumes at `last_indexed_block + 1`.

use std::fmt;
use std::str::FromStr;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::IndexerError;

/// Health of the indexer as recorded alongside the checkpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CheckpointStatus {
    Running,
    Error,
}

impl CheckpointStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Error => "error",
        }
    }
}

impl fmt::Display for CheckpointStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CheckpointStatus {
    type Err = IndexerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "running" => Ok(Self::Running),
            "error" => Ok(Self::Error),
            other => Err(IndexerError::Storage(format!(
                "unknown checkpoint status '{other}'"
            ))),
        }
    }
}

/// The persisted checkpoint row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Checkpoint {
    /// Last block whose window was fully processed.
    pub last_indexed_block: u64,
    /// Unix timestamp (seconds) of the last write.
    pub last_update: i64,
    pub status: CheckpointStatus,
    /// Set by `mark_error`; cleared when the checkpoint advances as running.
    pub error_message: Option<String>,
}

impl Checkpoint {
    pub fn new(last_indexed_block: u64) -> Self {
        Self {
            last_indexed_block,
            last_update: chrono::Utc::now().timestamp(),
            status: CheckpointStatus::Running,
            error_message: None,
        }
    }
}

/// Durable storage for the singleton checkpoint row.
///
/// Implementations: `MemoryCheckpointStore` here, plus the SQLite and Postgres
/// backends in `launchindex-storage`. A single writer is assumed.
#[async_trait]
pub trait CheckpointStore: Send + Sync {
    /// Load the checkpoint, if one has been written.
    async fn load(&self) -> Result<Option<Checkpoint>, IndexerError>;

    /// Create the row at `start_block` if it does not exist yet.
    async fn initialize(&self, start_block: u64) -> Result<(), IndexerError>;

    /// Set `last_indexed_block`, `last_update` and `status` in one write.
    /// A `Running` status clears any stored error message.
    async fn advance(&self, block: u64, status: CheckpointStatus) -> Result<(), IndexerError>;

    /// Record a failure without touching `last_indexed_block`.
    async fn mark_error(&self, message: &str) -> Result<(), IndexerError>;
}

/// Wraps a `CheckpointStore` with the configured start block and the
/// monotonicity rule.
#[derive(Clone)]
pub struct CheckpointManager {
    store: Arc<dyn CheckpointStore>,
    start_block: u64,
}

impl CheckpointManager {
    pub fn new(store: Arc<dyn CheckpointStore>, start_block: u64) -> Self {
        Self { store, start_block }
    }

    pub fn start_block(&self) -> u64 {
        self.start_block
    }

    /// Make sure the checkpoint row exists and return it.
    pub async fn initialize(&self) -> Result<Checkpoint, IndexerError> {
        self.store.initialize(self.start_block).await?;
        Ok(self
            .store
            .load()
            .await?
            .unwrap_or_else(|| Checkpoint::new(self.start_block)))
    }

    /// The full checkpoint row, if any.
    pub async fn checkpoint(&self) -> Result<Option<Checkpoint>, IndexerError> {
        self.store.load().await
    }

    /// Last indexed block, falling back to the start block when nothing has
    /// been written yet.
    pub async fn current_block(&self) -> Result<u64, IndexerError> {
        Ok(self
            .store
            .load()
            .await?
            .map(|cp| cp.last_indexed_block)
            .unwrap_or(self.start_block))
    }

    /// Recorded status, `Running` when no row exists yet.
    pub async fn status(&self) -> Result<CheckpointStatus, IndexerError> {
        Ok(self
            .store
            .load()
            .await?
            .map(|cp| cp.status)
            .unwrap_or(CheckpointStatus::Running))
    }

    /// Move the checkpoint to `block` with status `running`.
    ///
    /// Refuses to move backwards.
    pub async fn advance(&self, block: u64) -> Result<(), IndexerError> {
        let current = self.current_block().await?;
        if block < current {
            return Err(IndexerError::CheckpointRegression {
                current,
                requested: block,
            });
        }
        self.store.advance(block, CheckpointStatus::Running).await
    }

    pub async fn mark_error(&self, message: &str) -> Result<(), IndexerError> {
        self.store.mark_error(message).await
    }
}

// ─── In-memory store (for testing) ────────────────────────────────────────────

/// In-memory checkpoint store for tests and ephemeral indexers.
#[derive(Default)]
pub struct MemoryCheckpointStore {
    data: Mutex<Option<Checkpoint>>,
}

impl MemoryCheckpointStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// A store that already holds a running checkpoint at `block`.
    pub fn at(block: u64) -> Self {
        Self {
            data: Mutex::new(Some(Checkpoint::new(block))),
        }
    }

    fn slot(&self) -> Result<std::sync::MutexGuard<'_, Option<Checkpoint>>, IndexerError> {
        self.data
            .lock()
            .map_err(|_| IndexerError::Storage("checkpoint lock poisoned".into()))
    }
}

#[async_trait]
impl CheckpointStore for MemoryCheckpointStore {
    async fn load(&self) -> Result<Option<Checkpoint>, IndexerError> {
        Ok(self.slot()?.clone())
    }

    async fn initialize(&self, start_block: u64) -> Result<(), IndexerError> {
        self.slot()?.get_or_insert_with(|| Checkpoint::new(start_block));
        Ok(())
    }

    async fn advance(&self, block: u64, status: CheckpointStatus) -> Result<(), IndexerError> {
        let mut slot = self.slot()?;
        let cp = slot.get_or_insert_with(|| Checkpoint::new(block));
        cp.last_indexed_block = block;
        cp.last_update = chrono::Utc::now().timestamp();
        cp.status = status;
        if status == CheckpointStatus::Running {
            cp.error_message = None;
        }
        Ok(())
    }

    async fn mark_error(&self, message: &str) -> Result<(), IndexerError> {
        if let Some(cp) = self.slot()?.as_mut() {
            cp.status = CheckpointStatus::Error;
            cp.error_message = Some(message.to_string());
            cp.last_update = chrono::Utc::now().timestamp();
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn falls_back_to_start_block() {
        let mgr = CheckpointManager::new(Arc::new(MemoryCheckpointStore::new()), 500);
        assert!(mgr.checkpoint().await.unwrap().is_none());
        assert_eq!(mgr.current_block().await.unwrap(), 500);
    }

    #[tokio::test]
    async fn initialize_does_not_overwrite_existing_row() {
        let store = Arc::new(MemoryCheckpointStore::at(900));
        let mgr = CheckpointManager::new(store, 500);
        let cp = mgr.initialize().await.unwrap();
        assert_eq!(cp.last_indexed_block, 900);
    }

    #[tokio::test]
    async fn advance_clears_error() {
        let mgr = CheckpointManager::new(Arc::new(MemoryCheckpointStore::new()), 10);
        mgr.initialize().await.unwrap();

        mgr.mark_error("node unreachable").await.unwrap();
        let cp = mgr.checkpoint().await.unwrap().unwrap();
        assert_eq!(cp.status, CheckpointStatus::Error);
        assert_eq!(cp.error_message.as_deref(), Some("node unreachable"));
        assert_eq!(cp.last_indexed_block, 10);
        assert_eq!(mgr.status().await.unwrap(), CheckpointStatus::Error);

        mgr.advance(20).await.unwrap();
        let cp = mgr.checkpoint().await.unwrap().unwrap();
        assert_eq!(cp.status, CheckpointStatus::Running);
        assert!(cp.error_message.is_none());
        assert_eq!(cp.last_indexed_block, 20);
    }

    #[tokio::test]
    async fn advance_refuses_regression() {
        let mgr = CheckpointManager::new(Arc::new(MemoryCheckpointStore::at(100)), 0);
        let err = mgr.advance(99).await.unwrap_err();
        assert!(matches!(
            err,
            IndexerError::CheckpointRegression { current: 100, requested: 99 }
        ));
        assert_eq!(mgr.current_block().await.unwrap(), 100);

        // Same block is allowed (re-processing an empty window).
        mgr.advance(100).await.unwrap();
    }

    #[test]
    fn status_roundtrip() {
        for status in [CheckpointStatus::Running, CheckpointStatus::Error] {
            assert_eq!(status.as_str().parse::<CheckpointStatus>().unwrap(), status);
        }
        assert!("paused".parse::<CheckpointStatus>().is_err());
    }
}
