//! Built-in handlers projecting launch events into the domain tables.
//!
//! Each handler decodes its typed payload and performs conflict-tolerant writes
//! through a [`LaunchStore`], so a window can be replayed after a failure
//! without duplicating rows or double-counting contributions.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::error::IndexerError;
use crate::event::ChainEvent;
use crate::handler::{EventHandler, HandlerRegistry};
use crate::payload::{
    EventPayload, CONTRIBUTION_MADE, GRADUATED, LAUNCH_CREATED, PROOF_VERIFIED,
};
use crate::store::{Contribution, Graduation, LaunchStore, NewLaunch, ProofRecord};

/// Register the four launch handlers on `registry`, all sharing `store`.
pub fn register_default_handlers(registry: &mut HandlerRegistry, store: Arc<dyn LaunchStore>) {
    registry.register(LAUNCH_CREATED, Arc::new(LaunchCreatedHandler::new(store.clone())));
    registry.register(
        CONTRIBUTION_MADE,
        Arc::new(ContributionMadeHandler::new(store.clone())),
    );
    registry.register(GRADUATED, Arc::new(GraduatedHandler::new(store.clone())));
    registry.register(PROOF_VERIFIED, Arc::new(ProofVerifiedHandler::new(store)));
}

/// Addresses and hashes are keyed in lowercase so that every event agrees.
fn key(s: &str) -> String {
    s.trim().to_ascii_lowercase()
}

fn unexpected(expected: &str, got: &EventPayload) -> IndexerError {
    IndexerError::handler(expected, format!("received a '{}' payload", got.name()))
}

fn now() -> i64 {
    chrono::Utc::now().timestamp()
}

// ─── LaunchCreated ───────────────────────────────────────────────────────────

/// First write wins: replays leave the existing launch untouched.
pub struct LaunchCreatedHandler {
    store: Arc<dyn LaunchStore>,
}

impl LaunchCreatedHandler {
    pub fn new(store: Arc<dyn LaunchStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl EventHandler for LaunchCreatedHandler {
    async fn handle(&self, event: &ChainEvent) -> Result<(), IndexerError> {
        let payload = match event.payload()? {
            EventPayload::LaunchCreated(p) => p,
            other => return Err(unexpected(LAUNCH_CREATED, &other)),
        };

        let launch = NewLaunch {
            token_address: key(&payload.token_address),
            creator: key(&payload.creator),
            name: payload.name,
            symbol: payload.symbol,
            total_supply: payload.total_supply,
            created_block: event.block_number,
            created_tx: event.transaction_hash.clone(),
            created_at: now(),
        };

        if self.store.insert_launch(&launch).await? {
            debug!(token = %launch.token_address, symbol = %launch.symbol, "launch created");
        } else {
            debug!(token = %launch.token_address, "launch already indexed");
        }
        Ok(())
    }
}

// ─── ContributionMade ────────────────────────────────────────────────────────

/// The nullifier is the idempotency key; counters move only for new ones.
pub struct ContributionMadeHandler {
    store: Arc<dyn LaunchStore>,
}

impl ContributionMadeHandler {
    pub fn new(store: Arc<dyn LaunchStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl EventHandler for ContributionMadeHandler {
    async fn handle(&self, event: &ChainEvent) -> Result<(), IndexerError> {
        let payload = match event.payload()? {
            EventPayload::ContributionMade(p) => p,
            other => return Err(unexpected(CONTRIBUTION_MADE, &other)),
        };

        let contribution = Contribution {
            nullifier: key(&payload.nullifier),
            token_address: key(&payload.token_address),
            commitment: payload.commitment.as_deref().map(key),
            amount: payload.amount,
            token_amount: payload.token_amount,
            block_number: event.block_number,
            transaction_hash: event.transaction_hash.clone(),
            created_at: now(),
        };

        if self.store.record_contribution(&contribution).await? {
            debug!(
                token = %contribution.token_address,
                amount = %contribution.amount,
                "contribution recorded"
            );
        } else {
            warn!(
                nullifier = %contribution.nullifier,
                tx = %event.transaction_hash,
                "nullifier already used; contribution ignored"
            );
        }
        Ok(())
    }
}

// ─── Graduated ───────────────────────────────────────────────────────────────

pub struct GraduatedHandler {
    store: Arc<dyn LaunchStore>,
}

impl GraduatedHandler {
    pub fn new(store: Arc<dyn LaunchStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl EventHandler for GraduatedHandler {
    async fn handle(&self, event: &ChainEvent) -> Result<(), IndexerError> {
        let payload = match event.payload()? {
            EventPayload::Graduated(p) => p,
            other => return Err(unexpected(GRADUATED, &other)),
        };

        let graduated_at = match payload.timestamp {
            Some(ts) => i64::try_from(ts.0).map_err(|_| {
                IndexerError::handler(GRADUATED, format!("timestamp {ts} out of range"))
            })?,
            None => now(),
        };

        let graduation = Graduation {
            token_address: key(&payload.token_address),
            amm_address: key(&payload.amm_address),
            liquidity: payload.liquidity,
            graduated_at,
        };

        if !self.store.mark_graduated(&graduation).await? {
            warn!(token = %graduation.token_address, "graduation for unknown launch");
        }
        Ok(())
    }
}

// ─── ProofVerified ───────────────────────────────────────────────────────────

/// Last write wins on the proof hash.
pub struct ProofVerifiedHandler {
    store: Arc<dyn LaunchStore>,
}

impl ProofVerifiedHandler {
    pub fn new(store: Arc<dyn LaunchStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl EventHandler for ProofVerifiedHandler {
    async fn handle(&self, event: &ChainEvent) -> Result<(), IndexerError> {
        let payload = match event.payload()? {
            EventPayload::ProofVerified(p) => p,
            other => return Err(unexpected(PROOF_VERIFIED, &other)),
        };

        let proof = ProofRecord {
            proof_hash: key(&payload.proof_hash),
            token_address: payload.token_address.as_deref().map(key),
            verified: payload.verified,
            verified_at: now(),
            gas_cost: payload.gas_used.0,
            block_number: event.block_number,
            transaction_hash: event.transaction_hash.clone(),
        };

        self.store.upsert_proof(&proof).await?;
        debug!(proof = %proof.proof_hash, verified = proof.verified, "proof recorded");
        Ok(())
    }
}
