//! In-memory storage backend.
//!
//! Stores the checkpoint, raw events and launch projections in RAM.
//! Useful for testing and short-lived indexers that don't need persistence.

use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, MutexGuard};

use launchindex_core::checkpoint::{Checkpoint, CheckpointStatus, CheckpointStore};
use launchindex_core::error::IndexerError;
use launchindex_core::event::RawEvent;
use launchindex_core::payload::Amount;
use launchindex_core::store::{
    Contribution, Graduation, Launch, LaunchStore, NewLaunch, ProofRecord, RawEventStore,
};

#[derive(Default)]
struct Tables {
    checkpoint: Option<Checkpoint>,
    raw_events: Vec<RawEvent>,
    /// `(transaction_hash, event_index)` of every row in `raw_events`.
    raw_keys: HashSet<(String, u32)>,
    launches: HashMap<String, Launch>,
    contributions: HashMap<String, Contribution>,
    proofs: HashMap<String, ProofRecord>,
}

/// In-memory indexer storage.
///
/// One lock covers every table, so `record_contribution` is atomic.
/// All data is lost when the process exits.
#[derive(Default)]
pub struct InMemoryStorage {
    tables: Mutex<Tables>,
}

impl InMemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    fn tables(&self) -> Result<MutexGuard<'_, Tables>, IndexerError> {
        self.tables
            .lock()
            .map_err(|_| IndexerError::Storage("memory storage lock poisoned".into()))
    }

    /// Number of contribution rows.
    pub fn contribution_count(&self) -> Result<usize, IndexerError> {
        Ok(self.tables()?.contributions.len())
    }
}

// ─── CheckpointStore impl ────────────────────────────────────────────────────

#[async_trait]
impl CheckpointStore for InMemoryStorage {
    async fn load(&self) -> Result<Option<Checkpoint>, IndexerError> {
        Ok(self.tables()?.checkpoint.clone())
    }

    async fn initialize(&self, start_block: u64) -> Result<(), IndexerError> {
        self.tables()?
            .checkpoint
            .get_or_insert_with(|| Checkpoint::new(start_block));
        Ok(())
    }

    async fn advance(&self, block: u64, status: CheckpointStatus) -> Result<(), IndexerError> {
        let mut tables = self.tables()?;
        let cp = tables.checkpoint.get_or_insert_with(|| Checkpoint::new(block));
        cp.last_indexed_block = block;
        cp.last_update = chrono::Utc::now().timestamp();
        cp.status = status;
        if status == CheckpointStatus::Running {
            cp.error_message = None;
        }
        Ok(())
    }

    async fn mark_error(&self, message: &str) -> Result<(), IndexerError> {
        if let Some(cp) = self.tables()?.checkpoint.as_mut() {
            cp.status = CheckpointStatus::Error;
            cp.error_message = Some(message.to_string());
            cp.last_update = chrono::Utc::now().timestamp();
        }
        Ok(())
    }
}

// ─── RawEventStore impl ──────────────────────────────────────────────────────

#[async_trait]
impl RawEventStore for InMemoryStorage {
    async fn insert_raw_event(&self, event: &RawEvent) -> Result<bool, IndexerError> {
        let mut tables = self.tables()?;
        let key = (event.transaction_hash.clone(), event.event_index);
        if !tables.raw_keys.insert(key) {
            return Ok(false);
        }
        tables.raw_events.push(event.clone());
        Ok(true)
    }

    async fn raw_event_count(&self) -> Result<u64, IndexerError> {
        Ok(self.tables()?.raw_events.len() as u64)
    }

    async fn recent_raw_events(&self, limit: u32) -> Result<Vec<RawEvent>, IndexerError> {
        let mut events = self.tables()?.raw_events.clone();
        events.sort_by(|a, b| {
            (b.block_number, b.event_index).cmp(&(a.block_number, a.event_index))
        });
        events.truncate(limit as usize);
        Ok(events)
    }
}

// ─── LaunchStore impl ────────────────────────────────────────────────────────

#[async_trait]
impl LaunchStore for InMemoryStorage {
    async fn insert_launch(&self, launch: &NewLaunch) -> Result<bool, IndexerError> {
        let mut tables = self.tables()?;
        if tables.launches.contains_key(&launch.token_address) {
            return Ok(false);
        }
        tables.launches.insert(
            launch.token_address.clone(),
            Launch {
                token_address: launch.token_address.clone(),
                creator: launch.creator.clone(),
                name: launch.name.clone(),
                symbol: launch.symbol.clone(),
                total_supply: launch.total_supply,
                raised_amount: Amount::ZERO,
                sold_amount: Amount::ZERO,
                contribution_count: 0,
                graduated: false,
                amm_address: None,
                graduated_at: None,
                metadata: serde_json::json!({}),
                created_block: launch.created_block,
                created_tx: launch.created_tx.clone(),
                created_at: launch.created_at,
            },
        );
        Ok(true)
    }

    async fn record_contribution(&self, c: &Contribution) -> Result<bool, IndexerError> {
        let mut tables = self.tables()?;
        if tables.contributions.contains_key(&c.nullifier) {
            return Ok(false);
        }

        // Compute the new counters before writing anything.
        let counters = match tables.launches.get(&c.token_address) {
            Some(launch) => Some((
                crate::add_amount(&c.token_address, launch.raised_amount, c.amount)?,
                crate::add_amount(&c.token_address, launch.sold_amount, c.token_amount)?,
            )),
            None => {
                tracing::warn!(token = %c.token_address, "contribution for unknown launch");
                None
            }
        };

        if let (Some((raised, sold)), Some(launch)) =
            (counters, tables.launches.get_mut(&c.token_address))
        {
            launch.raised_amount = raised;
            launch.sold_amount = sold;
            launch.contribution_count += 1;
        }
        tables.contributions.insert(c.nullifier.clone(), c.clone());
        Ok(true)
    }

    async fn mark_graduated(&self, g: &Graduation) -> Result<bool, IndexerError> {
        let mut tables = self.tables()?;
        let Some(launch) = tables.launches.get_mut(&g.token_address) else {
            return Ok(false);
        };
        launch.graduated = true;
        launch.amm_address = Some(g.amm_address.clone());
        launch.graduated_at = Some(g.graduated_at);
        if !launch.metadata.is_object() {
            launch.metadata = serde_json::json!({});
        }
        launch.metadata["liquidity"] = serde_json::Value::String(g.liquidity.to_string());
        Ok(true)
    }

    async fn upsert_proof(&self, proof: &ProofRecord) -> Result<(), IndexerError> {
        let mut tables = self.tables()?;
        match tables.proofs.get_mut(&proof.proof_hash) {
            Some(existing) => {
                existing.verified = proof.verified;
                existing.verified_at = proof.verified_at;
                existing.gas_cost = proof.gas_cost;
            }
            None => {
                tables.proofs.insert(proof.proof_hash.clone(), proof.clone());
            }
        }
        Ok(())
    }

    async fn launch(&self, token_address: &str) -> Result<Option<Launch>, IndexerError> {
        Ok(self.tables()?.launches.get(token_address).cloned())
    }

    async fn contribution(&self, nullifier: &str) -> Result<Option<Contribution>, IndexerError> {
        Ok(self.tables()?.contributions.get(nullifier).cloned())
    }

    async fn proof(&self, proof_hash: &str) -> Result<Option<ProofRecord>, IndexerError> {
        Ok(self.tables()?.proofs.get(proof_hash).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn new_launch(token: &str) -> NewLaunch {
        NewLaunch {
            token_address: token.into(),
            creator: "0xcreator".into(),
            name: "Shadow".into(),
            symbol: "SHD".into(),
            total_supply: Amount(1_000_000),
            created_block: 10,
            created_tx: "0xtx".into(),
            created_at: 0,
        }
    }

    fn contribution(nullifier: &str, token: &str, amount: u128) -> Contribution {
        Contribution {
            nullifier: nullifier.into(),
            token_address: token.into(),
            commitment: None,
            amount: Amount(amount),
            token_amount: Amount(amount * 10),
            block_number: 11,
            transaction_hash: format!("0x{nullifier}"),
            created_at: 0,
        }
    }

    fn raw(tx: &str, index: u32, block: u64) -> RawEvent {
        RawEvent {
            event_name: "LaunchCreated".into(),
            contract_address: "0xfactory".into(),
            block_number: block,
            transaction_hash: tx.into(),
            event_index: index,
            data: json!({}),
            indexed: true,
            observed_at: 0,
        }
    }

    #[tokio::test]
    async fn raw_events_dedupe_and_order() {
        let store = InMemoryStorage::new();
        assert!(store.insert_raw_event(&raw("0xa", 0, 5)).await.unwrap());
        assert!(!store.insert_raw_event(&raw("0xa", 0, 5)).await.unwrap());
        assert!(store.insert_raw_event(&raw("0xa", 1, 5)).await.unwrap());
        assert!(store.insert_raw_event(&raw("0xb", 0, 9)).await.unwrap());

        assert_eq!(store.raw_event_count().await.unwrap(), 3);
        let recent = store.recent_raw_events(2).await.unwrap();
        assert_eq!(recent[0].transaction_hash, "0xb");
        assert_eq!(recent[1].event_index, 1);
    }

    #[tokio::test]
    async fn dedupe_key_is_hash_and_index() {
        let store = InMemoryStorage::new();
        for i in 0..1_000u32 {
            assert!(store.insert_raw_event(&raw("0xa", i, 5)).await.unwrap());
        }
        assert!(store.insert_raw_event(&raw("0xb", 0, 5)).await.unwrap());
        assert!(!store.insert_raw_event(&raw("0xa", 999, 5)).await.unwrap());
        assert!(!store.insert_raw_event(&raw("0xb", 0, 6)).await.unwrap());
        assert_eq!(store.raw_event_count().await.unwrap(), 1_001);
    }

    #[tokio::test]
    async fn duplicate_nullifier_counts_once() {
        let store = InMemoryStorage::new();
        store.insert_launch(&new_launch("0xt")).await.unwrap();

        assert!(store.record_contribution(&contribution("n1", "0xt", 100)).await.unwrap());
        assert!(!store.record_contribution(&contribution("n1", "0xt", 100)).await.unwrap());

        let launch = store.launch("0xt").await.unwrap().unwrap();
        assert_eq!(launch.raised_amount, Amount(100));
        assert_eq!(launch.sold_amount, Amount(1_000));
        assert_eq!(launch.contribution_count, 1);
        assert_eq!(store.contribution_count().unwrap(), 1);
    }

    #[tokio::test]
    async fn graduation_merges_liquidity() {
        let store = InMemoryStorage::new();
        assert!(!store
            .mark_graduated(&Graduation {
                token_address: "0xt".into(),
                amm_address: "0xpool".into(),
                liquidity: Amount(5),
                graduated_at: 1,
            })
            .await
            .unwrap());

        store.insert_launch(&new_launch("0xt")).await.unwrap();
        assert!(store
            .mark_graduated(&Graduation {
                token_address: "0xt".into(),
                amm_address: "0xpool".into(),
                liquidity: Amount(5),
                graduated_at: 1,
            })
            .await
            .unwrap());
        let launch = store.launch("0xt").await.unwrap().unwrap();
        assert!(launch.graduated);
        assert_eq!(launch.metadata["liquidity"], "5");
    }
}
