//! The index loop: polls the source, processes one bounded window at a time,
//! and advances the checkpoint only after the whole window succeeded.
//!
//! # Cycle
//! 1. **Idle**: stop if shutdown was requested, otherwise wait out the delay.
//! 2. **Fetching**: read the checkpoint and the chain head. If the head has not
//!    moved past the checkpoint, go back to Idle. Otherwise fetch every tracked
//!    (contract, event) pair for `[checkpoint + 1, min(checkpoint + batch, head)]`.
//! 3. **Processing**: store each event in the raw table, then dispatch it.
//! 4. **Advancing**: move the checkpoint to the end of the window.
//!
//! Any failure lands in **BackoffError**: the error is written to the
//! checkpoint row, the loop waits twice the poll interval, and the same window
//! is fetched again. Events are processed serially in contract order, then
//! event-name order, then source order, so they are not globally interleaved
//! by chain position across pairs.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::checkpoint::{CheckpointManager, CheckpointStore};
use crate::config::IndexerConfig;
use crate::error::IndexerError;
use crate::event::{ChainEvent, RawEvent};
use crate::handler::{DispatchOutcome, HandlerRegistry};
use crate::source::ChainEventSource;
use crate::store::RawEventStore;

/// Where the loop currently is in its cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    Idle,
    Fetching,
    Processing,
    Advancing,
    BackoffError,
    Stopped,
}

impl fmt::Display for LoopState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::Fetching => write!(f, "fetching"),
            Self::Processing => write!(f, "processing"),
            Self::Advancing => write!(f, "advancing"),
            Self::BackoffError => write!(f, "backoff-error"),
            Self::Stopped => write!(f, "stopped"),
        }
    }
}

/// Result of a single successful poll.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollOutcome {
    /// The head has not moved past the checkpoint.
    UpToDate { head: u64 },
    /// `[from, to]` was processed and the checkpoint now sits at `to`.
    /// `skipped` counts events with no registered handler.
    Indexed {
        from: u64,
        to: u64,
        events: usize,
        skipped: usize,
    },
}

/// The stores the loop itself writes to.
#[derive(Clone)]
pub struct IndexStores {
    pub checkpoints: Arc<dyn CheckpointStore>,
    pub raw_events: Arc<dyn RawEventStore>,
}

/// The core index loop implementation.
pub struct IndexLoop<S: ChainEventSource> {
    config: IndexerConfig,
    source: S,
    checkpoint: CheckpointManager,
    raw_events: Arc<dyn RawEventStore>,
    handlers: HandlerRegistry,
    shutdown: CancellationToken,
    state: LoopState,
    initialized: bool,
}

impl<S: ChainEventSource> IndexLoop<S> {
    pub fn new(
        config: IndexerConfig,
        source: S,
        stores: IndexStores,
        handlers: HandlerRegistry,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            checkpoint: CheckpointManager::new(stores.checkpoints, config.start_block),
            raw_events: stores.raw_events,
            source,
            handlers,
            shutdown,
            state: LoopState::Idle,
            initialized: false,
            config,
        }
    }

    pub fn state(&self) -> LoopState {
        self.state
    }

    pub fn checkpoint(&self) -> &CheckpointManager {
        &self.checkpoint
    }

    /// Poll until the shutdown token is cancelled.
    ///
    /// Errors never escape: they are logged, recorded on the checkpoint row,
    /// and retried after a backoff. Cancellation is observed while idle or
    /// sleeping, never in the middle of a window.
    pub async fn run(&mut self) {
        let mut delay = Duration::ZERO;

        loop {
            self.state = LoopState::Idle;
            if self.shutdown.is_cancelled() {
                break;
            }
            if !delay.is_zero() && !self.sleep(delay).await {
                break;
            }

            delay = match self.poll_once().await {
                Ok(_) => self.config.poll_interval(),
                Err(e) => {
                    self.state = LoopState::BackoffError;
                    error!(error = %e, transient = e.is_transient(), "index cycle failed");
                    if let Err(mark) = self.checkpoint.mark_error(&e.to_string()).await {
                        error!(error = %mark, "failed to record error on checkpoint");
                    }
                    self.config.backoff_interval()
                }
            };
        }

        self.state = LoopState::Stopped;
        info!("index loop stopped");
    }

    /// Run one Fetching → Processing → Advancing cycle.
    pub async fn poll_once(&mut self) -> Result<PollOutcome, IndexerError> {
        self.state = LoopState::Fetching;

        if !self.initialized {
            let cp = self.checkpoint.initialize().await?;
            info!(
                block = cp.last_indexed_block,
                status = %cp.status,
                "resuming from checkpoint"
            );
            self.initialized = true;
        }

        let checkpoint = self.checkpoint.current_block().await?;
        let head = self.source.current_block_number().await?;

        let Some((from, to)) = self.config.window(checkpoint, head) else {
            debug!(checkpoint, head, "no new blocks");
            self.state = LoopState::Idle;
            return Ok(PollOutcome::UpToDate { head });
        };

        let mut events: Vec<ChainEvent> = Vec::new();
        for (contract, name) in self.config.tracked_pairs() {
            let batch = self.source.get_events(contract, name, from, to).await?;
            events.extend(
                batch
                    .into_iter()
                    .map(|e| ChainEvent::from_source(contract, name, e)),
            );
        }

        self.state = LoopState::Processing;
        let mut skipped = 0usize;
        for event in &events {
            let raw = RawEvent::from_event(event, self.handlers.contains(&event.event_name));
            if !self.raw_events.insert_raw_event(&raw).await? {
                debug!(
                    tx = %event.transaction_hash,
                    index = event.event_index,
                    "raw event already stored"
                );
            }
            if self.handlers.dispatch(event).await? == DispatchOutcome::Skipped {
                skipped += 1;
            }
        }

        self.state = LoopState::Advancing;
        self.checkpoint.advance(to).await?;

        info!(from, to, head, events = events.len(), skipped, "window indexed");
        self.state = LoopState::Idle;
        Ok(PollOutcome::Indexed {
            from,
            to,
            events: events.len(),
            skipped,
        })
    }

    /// Sleep for `delay`; returns `false` if shutdown was requested meanwhile.
    async fn sleep(&self, delay: Duration) -> bool {
        tokio::select! {
            _ = self.shutdown.cancelled() => false,
            _ = tokio::time::sleep(delay) => true,
        }
    }
}

/// Entry point: validate `config` and run the loop until `shutdown` fires.
///
/// Returns immediately when indexing is disabled.
pub async fn start_indexer<S: ChainEventSource>(
    config: IndexerConfig,
    source: S,
    stores: IndexStores,
    handlers: HandlerRegistry,
    shutdown: CancellationToken,
) -> Result<(), IndexerError> {
    if !config.enabled {
        info!("indexer disabled; not starting");
        return Ok(());
    }
    config.validate()?;

    info!(
        contracts = config.contracts.len(),
        handlers = handlers.len(),
        batch_size = config.batch_size,
        poll_interval_ms = config.poll_interval_ms,
        "starting indexer"
    );
    IndexLoop::new(config, source, stores, handlers, shutdown)
        .run()
        .await;
    Ok(())
}
