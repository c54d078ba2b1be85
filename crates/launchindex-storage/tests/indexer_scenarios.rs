//! End-to-end indexer behaviour against SQLite with a scripted chain.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;

use launchindex_core::launch_handlers::LaunchCreatedHandler;
use launchindex_core::{
    register_default_handlers, start_indexer, Amount, ChainEvent, ChainEventSource,
    CheckpointStatus, CheckpointStore, EventHandler, HandlerRegistry, IndexLoop, IndexStores,
    IndexerBuilder, IndexerConfig, IndexerError, LaunchStore, PollOutcome, RawEventStore,
    SourceEvent,
};
use launchindex_storage::{InMemoryStorage, SqliteStorage};

const FACTORY: &str = "0xfactory";
const POOL: &str = "0xpool";
const TOKEN: &str = "0x00000000000000000000000000000000000000aa";

// ─── Scripted chain ──────────────────────────────────────────────────────────

#[derive(Default)]
struct ScriptedSource {
    head: AtomicU64,
    logs: Mutex<Vec<(String, String, SourceEvent)>>,
    event_queries: AtomicUsize,
}

impl ScriptedSource {
    fn at(head: u64) -> Arc<Self> {
        let source = Self::default();
        source.head.store(head, Ordering::SeqCst);
        Arc::new(source)
    }

    fn emit(&self, contract: &str, name: &str, block: u64, tx: &str, log_index: u32, data: Value) {
        self.logs.lock().unwrap().push((
            contract.into(),
            name.into(),
            SourceEvent {
                block_number: block,
                transaction_hash: tx.into(),
                log_index,
                data,
            },
        ));
    }

    fn replace_data(&self, tx: &str, data: Value) {
        for (_, _, event) in self.logs.lock().unwrap().iter_mut() {
            if event.transaction_hash == tx {
                event.data = data.clone();
            }
        }
    }
}

#[async_trait]
impl ChainEventSource for ScriptedSource {
    async fn current_block_number(&self) -> Result<u64, IndexerError> {
        Ok(self.head.load(Ordering::SeqCst))
    }

    async fn get_events(
        &self,
        contract: &str,
        name: &str,
        from: u64,
        to: u64,
    ) -> Result<Vec<SourceEvent>, IndexerError> {
        self.event_queries.fetch_add(1, Ordering::SeqCst);
        Ok(self
            .logs
            .lock()
            .unwrap()
            .iter()
            .filter(|(c, n, e)| c == contract && n == name && (from..=to).contains(&e.block_number))
            .map(|(_, _, e)| e.clone())
            .collect())
    }
}

// ─── Fixtures ────────────────────────────────────────────────────────────────

fn config(start_block: u64) -> IndexerConfig {
    IndexerBuilder::new()
        .start_block(start_block)
        .batch_size(50)
        .poll_interval_ms(1_000)
        .track(FACTORY, ["LaunchCreated", "Graduated"])
        .track(POOL, ["ContributionMade", "ProofVerified", "UnknownThing"])
        .build_config()
}

async fn sqlite_loop(
    config: IndexerConfig,
    source: Arc<ScriptedSource>,
) -> (Arc<SqliteStorage>, IndexLoop<Arc<ScriptedSource>>) {
    let store = Arc::new(SqliteStorage::in_memory().await.unwrap());
    let mut registry = HandlerRegistry::new();
    register_default_handlers(&mut registry, store.clone());

    let stores = IndexStores {
        checkpoints: store.clone(),
        raw_events: store.clone(),
    };
    let index_loop = IndexLoop::new(config, source, stores, registry, CancellationToken::new());
    (store, index_loop)
}

fn launch_created() -> Value {
    json!({
        "tokenAddress": TOKEN,
        "creator": "0x00000000000000000000000000000000000000cc",
        "name": "Shadow",
        "symbol": "SHD",
        "totalSupply": "1000000000000000000000000"
    })
}

fn contribution(nullifier: &str, amount: &str, token_amount: &str) -> Value {
    json!({
        "tokenAddress": TOKEN,
        "nullifier": nullifier,
        "commitment": "0xc0ffee",
        "amount": amount,
        "tokenAmount": token_amount
    })
}

// ─── Scenarios ───────────────────────────────────────────────────────────────

#[tokio::test]
async fn scenario_a_processes_window_up_to_head() {
    let source = ScriptedSource::at(105);
    source.emit(FACTORY, "LaunchCreated", 101, "0xt1", 0, launch_created());
    source.emit(POOL, "ContributionMade", 104, "0xt2", 3, contribution("0xn1", "500", "2500"));
    source.emit(POOL, "ContributionMade", 106, "0xt3", 0, contribution("0xn2", "1", "1"));

    let (store, mut index_loop) = sqlite_loop(config(100), source.clone()).await;

    let outcome = index_loop.poll_once().await.unwrap();
    assert_eq!(
        outcome,
        PollOutcome::Indexed { from: 101, to: 105, events: 2, skipped: 0 }
    );

    let cp = store.load().await.unwrap().unwrap();
    assert_eq!(cp.last_indexed_block, 105);
    assert_eq!(cp.status, CheckpointStatus::Running);

    let launch = store.launch(TOKEN).await.unwrap().unwrap();
    assert_eq!(launch.raised_amount, Amount(500));
    assert_eq!(launch.sold_amount, Amount(2_500));
    // Block 106 is past the head and was never fetched.
    assert!(store.contribution("0xn2").await.unwrap().is_none());
    assert_eq!(source.event_queries.load(Ordering::SeqCst), 5);
}

#[tokio::test]
async fn scenario_b_head_at_checkpoint_issues_no_queries() {
    let source = ScriptedSource::at(100);
    let (store, mut index_loop) = sqlite_loop(config(100), source.clone()).await;

    let outcome = index_loop.poll_once().await.unwrap();
    assert_eq!(outcome, PollOutcome::UpToDate { head: 100 });
    assert_eq!(source.event_queries.load(Ordering::SeqCst), 0);
    assert_eq!(store.load().await.unwrap().unwrap().last_indexed_block, 100);
}

#[tokio::test]
async fn scenario_c_reused_nullifier_is_ignored() {
    let source = ScriptedSource::at(110);
    source.emit(FACTORY, "LaunchCreated", 101, "0xt1", 0, launch_created());
    source.emit(POOL, "ContributionMade", 102, "0xt2", 0, contribution("0xn1", "500", "2500"));
    source.emit(POOL, "ContributionMade", 103, "0xt3", 0, contribution("0xn1", "900", "4500"));

    let (store, mut index_loop) = sqlite_loop(config(100), source).await;
    index_loop.poll_once().await.unwrap();

    // Both observations land in the raw table...
    assert_eq!(store.raw_event_count().await.unwrap(), 3);
    // ...but only the first contribution counts.
    assert_eq!(store.contribution_count().await.unwrap(), 1);
    let stored = store.contribution("0xn1").await.unwrap().unwrap();
    assert_eq!(stored.transaction_hash, "0xt2");

    let launch = store.launch(TOKEN).await.unwrap().unwrap();
    assert_eq!(launch.raised_amount, Amount(500));
    assert_eq!(launch.sold_amount, Amount(2_500));
    assert_eq!(launch.contribution_count, 1);
}

#[tokio::test]
async fn scenario_d_unknown_event_is_stored_and_skipped() {
    let source = ScriptedSource::at(101);
    source.emit(POOL, "UnknownThing", 101, "0xt1", 0, json!({ "anything": 1 }));

    let (store, mut index_loop) = sqlite_loop(config(100), source).await;
    let outcome = index_loop.poll_once().await.unwrap();
    // Skipped means the dispatcher found no handler and logged a warning.
    assert_eq!(
        outcome,
        PollOutcome::Indexed { from: 101, to: 101, events: 1, skipped: 1 }
    );

    let raw = store.recent_raw_events(10).await.unwrap();
    assert_eq!(raw.len(), 1);
    assert_eq!(raw[0].event_name, "UnknownThing");
    assert!(!raw[0].indexed);
    assert_eq!(store.load().await.unwrap().unwrap().last_indexed_block, 101);
}

// ─── Properties ──────────────────────────────────────────────────────────────

#[tokio::test]
async fn failed_batch_keeps_checkpoint_and_stops_dispatch() {
    let source = ScriptedSource::at(120);
    source.emit(FACTORY, "LaunchCreated", 101, "0xt1", 0, launch_created());
    source.emit(POOL, "ContributionMade", 102, "0xbad", 0, json!({ "nullifier": "0xn1" }));
    source.emit(POOL, "ProofVerified", 103, "0xt3", 0, json!({
        "proofHash": "0xproof", "verified": true, "gasUsed": "210000"
    }));

    let (store, mut index_loop) = sqlite_loop(config(100), source.clone()).await;

    let err = index_loop.poll_once().await.unwrap_err();
    assert!(matches!(err, IndexerError::Decode { .. }));
    assert_eq!(store.load().await.unwrap().unwrap().last_indexed_block, 100);
    // The proof comes after the failing event and was never dispatched.
    assert!(store.proof("0xproof").await.unwrap().is_none());
    assert!(store.launch(TOKEN).await.unwrap().is_some());

    // Fixing the payload lets the same window go through.
    source.replace_data("0xbad", contribution("0xn1", "10", "50"));
    index_loop.poll_once().await.unwrap();
    assert_eq!(store.load().await.unwrap().unwrap().last_indexed_block, 120);
    assert!(store.proof("0xproof").await.unwrap().unwrap().verified);
}

#[tokio::test]
async fn replayed_window_is_idempotent() {
    let source = ScriptedSource::at(110);
    source.emit(FACTORY, "LaunchCreated", 101, "0xt1", 0, launch_created());
    source.emit(POOL, "ContributionMade", 102, "0xt2", 0, contribution("0xn1", "500", "2500"));

    let (store, mut first) = sqlite_loop(config(100), source.clone()).await;
    first.poll_once().await.unwrap();

    // A second loop that starts from the old block sees the same window again.
    let mut registry = HandlerRegistry::new();
    register_default_handlers(&mut registry, store.clone());
    let fresh_checkpoint = Arc::new(launchindex_core::checkpoint::MemoryCheckpointStore::at(100));
    let mut replay = IndexLoop::new(
        config(100),
        source,
        IndexStores {
            checkpoints: fresh_checkpoint,
            raw_events: store.clone(),
        },
        registry,
        CancellationToken::new(),
    );
    replay.poll_once().await.unwrap();

    assert_eq!(store.raw_event_count().await.unwrap(), 2);
    assert_eq!(store.launch_count().await.unwrap(), 1);
    let launch = store.launch(TOKEN).await.unwrap().unwrap();
    assert_eq!(launch.raised_amount, Amount(500));
    assert_eq!(launch.contribution_count, 1);
}

#[tokio::test]
async fn checkpoint_is_monotonic_across_windows() {
    let source = ScriptedSource::at(230);
    let (store, mut index_loop) = sqlite_loop(config(100), source).await;

    let mut seen = vec![];
    loop {
        match index_loop.poll_once().await.unwrap() {
            PollOutcome::Indexed { to, .. } => seen.push(to),
            PollOutcome::UpToDate { .. } => break,
        }
    }
    assert_eq!(seen, vec![150, 200, 230]);
    assert_eq!(store.load().await.unwrap().unwrap().last_indexed_block, 230);
}

#[tokio::test]
async fn pair_order_beats_chain_order() {
    // Pool contract listed first: its contribution is handled before the
    // factory's launch even though the launch is earlier on chain.
    let config = IndexerBuilder::new()
        .start_block(100)
        .track(POOL, ["ContributionMade"])
        .track(FACTORY, ["LaunchCreated"])
        .build_config();
    let source = ScriptedSource::at(110);
    source.emit(FACTORY, "LaunchCreated", 101, "0xt1", 0, launch_created());
    source.emit(POOL, "ContributionMade", 105, "0xt2", 0, contribution("0xn1", "500", "2500"));

    let (store, mut index_loop) = sqlite_loop(config, source).await;
    index_loop.poll_once().await.unwrap();

    let launch = store.launch(TOKEN).await.unwrap().unwrap();
    assert_eq!(launch.raised_amount, Amount::ZERO);
    assert_eq!(launch.contribution_count, 0);
    assert!(store.contribution("0xn1").await.unwrap().is_some());
}

#[tokio::test]
async fn graduation_and_proof_projection() {
    let source = ScriptedSource::at(110);
    source.emit(FACTORY, "LaunchCreated", 101, "0xt1", 0, launch_created());
    source.emit(FACTORY, "Graduated", 108, "0xt2", 1, json!({
        "tokenAddress": TOKEN,
        "ammAddress": "0x00000000000000000000000000000000000000Dd",
        "liquidity": "123456789",
        "timestamp": 1_700_000_000u64
    }));
    source.emit(POOL, "ProofVerified", 103, "0xt3", 0, json!({
        "proofHash": "0xP1", "tokenAddress": TOKEN, "verified": false, "gasUsed": 100
    }));
    source.emit(POOL, "ProofVerified", 104, "0xt4", 0, json!({
        "proofHash": "0xp1", "tokenAddress": TOKEN, "verified": true, "gasUsed": 250000
    }));

    let (store, mut index_loop) = sqlite_loop(config(100), source).await;
    index_loop.poll_once().await.unwrap();

    let launch = store.launch(TOKEN).await.unwrap().unwrap();
    assert!(launch.graduated);
    assert_eq!(launch.amm_address.as_deref(), Some("0x00000000000000000000000000000000000000dd"));
    assert_eq!(launch.graduated_at, Some(1_700_000_000));
    assert_eq!(launch.metadata["liquidity"], "123456789");

    let proof = store.proof("0xp1").await.unwrap().unwrap();
    assert!(proof.verified);
    assert_eq!(proof.gas_cost, 250_000);
}

// ─── Run loop ────────────────────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn run_follows_the_head_until_cancelled() {
    let store = Arc::new(InMemoryStorage::new());
    let source = ScriptedSource::at(101);
    source.emit(FACTORY, "LaunchCreated", 101, "0xt1", 0, launch_created());

    let mut registry = HandlerRegistry::new();
    register_default_handlers(&mut registry, store.clone());
    let stores = IndexStores {
        checkpoints: store.clone(),
        raw_events: store.clone(),
    };

    let shutdown = CancellationToken::new();
    let task = tokio::spawn(start_indexer(
        config(100),
        source.clone(),
        stores,
        registry,
        shutdown.clone(),
    ));

    // First poll runs without delay.
    tokio::time::sleep(Duration::from_millis(10)).await;
    assert_eq!(store.load().await.unwrap().unwrap().last_indexed_block, 101);

    source.head.store(103, Ordering::SeqCst);
    source.emit(POOL, "ContributionMade", 103, "0xt2", 0, contribution("0xn1", "5", "25"));
    tokio::time::sleep(Duration::from_millis(1_100)).await;
    assert_eq!(store.load().await.unwrap().unwrap().last_indexed_block, 103);
    assert_eq!(
        store.launch(TOKEN).await.unwrap().unwrap().raised_amount,
        Amount(5)
    );

    shutdown.cancel();
    tokio::time::timeout(Duration::from_secs(1), task)
        .await
        .expect("loop did not stop")
        .unwrap()
        .unwrap();
}

/// Requests shutdown from inside the batch, then keeps working before
/// handing over to the real launch handler.
struct CancelMidBatch {
    shutdown: CancellationToken,
    inner: LaunchCreatedHandler,
}

#[async_trait]
impl EventHandler for CancelMidBatch {
    async fn handle(&self, event: &ChainEvent) -> Result<(), IndexerError> {
        self.shutdown.cancel();
        tokio::time::sleep(Duration::from_millis(500)).await;
        self.inner.handle(event).await
    }
}

#[tokio::test(start_paused = true)]
async fn shutdown_waits_for_the_batch_in_flight() {
    let store = Arc::new(InMemoryStorage::new());
    let source = ScriptedSource::at(105);
    source.emit(FACTORY, "LaunchCreated", 101, "0xt1", 0, launch_created());
    source.emit(POOL, "ContributionMade", 104, "0xt2", 0, contribution("0xn1", "7", "70"));

    let shutdown = CancellationToken::new();
    let mut registry = HandlerRegistry::new();
    register_default_handlers(&mut registry, store.clone());
    registry.register(
        "LaunchCreated",
        Arc::new(CancelMidBatch {
            shutdown: shutdown.clone(),
            inner: LaunchCreatedHandler::new(store.clone()),
        }),
    );
    let stores = IndexStores {
        checkpoints: store.clone(),
        raw_events: store.clone(),
    };

    tokio::time::timeout(
        Duration::from_secs(5),
        start_indexer(config(100), source.clone(), stores, registry, shutdown.clone()),
    )
    .await
    .expect("indexer did not stop after shutdown")
    .unwrap();

    assert!(shutdown.is_cancelled());
    let cp = store.load().await.unwrap().unwrap();
    assert_eq!(cp.last_indexed_block, 105);
    assert_eq!(cp.status, CheckpointStatus::Running);
    assert_eq!(store.raw_event_count().await.unwrap(), 2);

    // Events after the cancelling handler still ran.
    let launch = store.launch(TOKEN).await.unwrap().unwrap();
    assert_eq!(launch.raised_amount, Amount(7));
    assert_eq!(launch.contribution_count, 1);
    // Stopped before a second poll.
    assert_eq!(source.event_queries.load(Ordering::SeqCst), 5);
}

#[tokio::test(start_paused = true)]
async fn run_backs_off_after_failure() {
    let store = Arc::new(InMemoryStorage::new());
    let source = ScriptedSource::at(101);
    source.emit(POOL, "ContributionMade", 101, "0xbad", 0, json!({}));

    let mut registry = HandlerRegistry::new();
    register_default_handlers(&mut registry, store.clone());
    let stores = IndexStores {
        checkpoints: store.clone(),
        raw_events: store.clone(),
    };
    let shutdown = CancellationToken::new();
    let task = tokio::spawn(start_indexer(
        config(100),
        source.clone(),
        stores,
        registry,
        shutdown.clone(),
    ));

    tokio::time::sleep(Duration::from_millis(10)).await;
    let cp = store.load().await.unwrap().unwrap();
    assert_eq!(cp.status, CheckpointStatus::Error);
    assert_eq!(cp.last_indexed_block, 100);
    let queries_after_first = source.event_queries.load(Ordering::SeqCst);

    // One poll interval is not enough: failures wait twice as long.
    tokio::time::sleep(Duration::from_millis(1_500)).await;
    assert_eq!(source.event_queries.load(Ordering::SeqCst), queries_after_first);

    source.replace_data("0xbad", contribution("0xn1", "1", "1"));
    tokio::time::sleep(Duration::from_millis(600)).await;
    let cp = store.load().await.unwrap().unwrap();
    assert_eq!(cp.status, CheckpointStatus::Running);
    assert_eq!(cp.last_indexed_block, 101);
    assert!(cp.error_message.is_none());

    shutdown.cancel();
    task.await.unwrap().unwrap();
}

#[tokio::test]
async fn invalid_config_is_rejected_before_running() {
    let store = Arc::new(InMemoryStorage::new());
    let stores = IndexStores {
        checkpoints: store.clone(),
        raw_events: store,
    };
    let err = start_indexer(
        IndexerBuilder::new().batch_size(0).build_config(),
        ScriptedSource::at(0),
        stores,
        HandlerRegistry::new(),
        CancellationToken::new(),
    )
    .await
    .unwrap_err();
    assert!(matches!(err, IndexerError::Config(_)));
}
