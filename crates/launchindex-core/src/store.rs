//! Storage traits for raw events and the launch domain tables, plus the row
//! types they exchange.
//!
//! Backends live in `launchindex-storage` (memory, SQLite, Postgres).

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::IndexerError;
use crate::event::RawEvent;
use crate::payload::Amount;

// ─── Rows ────────────────────────────────────────────────────────────────────

/// A token launch, keyed by token address.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Launch {
    pub token_address: String,
    pub creator: String,
    pub name: String,
    pub symbol: String,
    pub total_supply: Amount,
    pub raised_amount: Amount,
    pub sold_amount: Amount,
    pub contribution_count: u64,
    pub graduated: bool,
    pub amm_address: Option<String>,
    pub graduated_at: Option<i64>,
    /// Free-form JSON object; graduation merges `liquidity` into it.
    pub metadata: Value,
    pub created_block: u64,
    pub created_tx: String,
    pub created_at: i64,
}

/// Fields written when a launch is first seen.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewLaunch {
    pub token_address: String,
    pub creator: String,
    pub name: String,
    pub symbol: String,
    pub total_supply: Amount,
    pub created_block: u64,
    pub created_tx: String,
    pub created_at: i64,
}

/// A private contribution, keyed by nullifier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Contribution {
    pub nullifier: String,
    pub token_address: String,
    pub commitment: Option<String>,
    pub amount: Amount,
    pub token_amount: Amount,
    pub block_number: u64,
    pub transaction_hash: String,
    pub created_at: i64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Graduation {
    pub token_address: String,
    pub amm_address: String,
    pub liquidity: Amount,
    pub graduated_at: i64,
}

/// Verification outcome for a proof, keyed by proof hash.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProofRecord {
    pub proof_hash: String,
    pub token_address: Option<String>,
    pub verified: bool,
    pub verified_at: i64,
    pub gas_cost: u64,
    pub block_number: u64,
    pub transaction_hash: String,
}

// ─── Traits ──────────────────────────────────────────────────────────────────

/// Append-only store of every observed event.
#[async_trait]
pub trait RawEventStore: Send + Sync {
    /// Insert `event`; returns `false` when `(transaction_hash, event_index)`
    /// was already stored.
    async fn insert_raw_event(&self, event: &RawEvent) -> Result<bool, IndexerError>;

    async fn raw_event_count(&self) -> Result<u64, IndexerError>;

    /// Most recent events first (by block, then index).
    async fn recent_raw_events(&self, limit: u32) -> Result<Vec<RawEvent>, IndexerError>;
}

/// Projections maintained by the launch event handlers.
///
/// Every write is conflict-tolerant so that replaying a window is harmless.
#[async_trait]
pub trait LaunchStore: Send + Sync {
    /// Insert unless a launch with the same token address exists.
    /// Returns `true` if a row was inserted.
    async fn insert_launch(&self, launch: &NewLaunch) -> Result<bool, IndexerError>;

    /// In one transaction: insert the contribution unless its nullifier is
    /// already known, and only if it was inserted, add its amounts to the
    /// parent launch counters. Returns `true` if the contribution was new.
    async fn record_contribution(&self, contribution: &Contribution) -> Result<bool, IndexerError>;

    /// Flag the launch as graduated. Returns `false` if the launch is unknown.
    async fn mark_graduated(&self, graduation: &Graduation) -> Result<bool, IndexerError>;

    /// Insert, or overwrite `verified`, `verified_at` and `gas_cost`.
    async fn upsert_proof(&self, proof: &ProofRecord) -> Result<(), IndexerError>;

    async fn launch(&self, token_address: &str) -> Result<Option<Launch>, IndexerError>;

    async fn contribution(&self, nullifier: &str) -> Result<Option<Contribution>, IndexerError>;

    async fn proof(&self, proof_hash: &str) -> Result<Option<ProofRecord>, IndexerError>;
}
