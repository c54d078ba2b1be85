//! launchindex-core: the polling indexer behind LaunchIndex.
//!
//! # Architecture
//!
//! ```text
//! IndexerBuilder → IndexLoop
//!                      ├── ChainEventSource  (chain head + per-event log queries)
//!                      ├── CheckpointManager (resume point, monotonic)
//!                      ├── RawEventStore     (append-only audit table)
//!                      ├── HandlerRegistry   (event name → handler)
//!                      │      └── launch handlers → LaunchStore
//!                      └── Storage backend (memory / SQLite / Postgres)
//! ```

pub mod checkpoint;
pub mod config;
pub mod error;
pub mod event;
pub mod handler;
pub mod index_loop;
pub mod launch_handlers;
pub mod payload;
pub mod source;
pub mod store;

pub use checkpoint::{Checkpoint, CheckpointManager, CheckpointStatus, CheckpointStore};
pub use config::{IndexerBuilder, IndexerConfig, TrackedContract};
pub use error::IndexerError;
pub use event::{ChainEvent, RawEvent, SourceEvent};
pub use handler::{DispatchOutcome, EventHandler, HandlerRegistry};
pub use index_loop::{start_indexer, IndexLoop, IndexStores, LoopState, PollOutcome};
pub use launch_handlers::register_default_handlers;
pub use payload::{Amount, EventPayload, Quantity};
pub use source::ChainEventSource;
pub use store::{Contribution, Graduation, Launch, LaunchStore, NewLaunch, ProofRecord, RawEventStore};
