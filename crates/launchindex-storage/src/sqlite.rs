//! SQLite storage backend for LaunchIndex.
//!
//! Persists the checkpoint, the raw event audit table and the launch
//! projections to a single SQLite file. Uses `sqlx` with WAL mode for
//! file-backed databases.
//!
//! # Usage
//! ```rust,no_run
//! use launchindex_storage::sqlite::SqliteStorage;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! // File-backed (persistent)
//! let store = SqliteStorage::open("./launchindex.db").await?;
//!
//! // In-memory (tests / ephemeral)
//! let store = SqliteStorage::in_memory().await?;
//! # Ok(())
//! # }
//! ```

use async_trait::async_trait;
use sqlx::sqlite::{SqlitePoolOptions, SqliteRow};
use sqlx::{Row, SqlitePool};
use tracing::{debug, warn};

use launchindex_core::checkpoint::{Checkpoint, CheckpointStatus, CheckpointStore};
use launchindex_core::error::IndexerError;
use launchindex_core::event::RawEvent;
use launchindex_core::store::{
    Contribution, Graduation, Launch, LaunchStore, NewLaunch, ProofRecord, RawEventStore,
};

use crate::{add_amount, db_err, parse_amount};

const SCHEMA: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS indexer_checkpoint (
        id                 INTEGER PRIMARY KEY CHECK (id = 1),
        last_indexed_block INTEGER NOT NULL,
        last_update        INTEGER NOT NULL,
        status             TEXT    NOT NULL DEFAULT 'running',
        error_message      TEXT
    );",
    "CREATE TABLE IF NOT EXISTS raw_events (
        id               INTEGER PRIMARY KEY AUTOINCREMENT,
        event_name       TEXT    NOT NULL,
        contract_address TEXT    NOT NULL,
        block_number     INTEGER NOT NULL,
        transaction_hash TEXT    NOT NULL,
        event_index      INTEGER NOT NULL,
        data             TEXT    NOT NULL,
        indexed          INTEGER NOT NULL,
        observed_at      INTEGER NOT NULL,
        UNIQUE (transaction_hash, event_index)
    );",
    "CREATE INDEX IF NOT EXISTS idx_raw_events_block ON raw_events (block_number);",
    "CREATE TABLE IF NOT EXISTS launches (
        token_address      TEXT    PRIMARY KEY,
        creator            TEXT    NOT NULL,
        name               TEXT    NOT NULL,
        symbol             TEXT    NOT NULL,
        total_supply       TEXT    NOT NULL,
        raised_amount      TEXT    NOT NULL DEFAULT '0',
        sold_amount        TEXT    NOT NULL DEFAULT '0',
        contribution_count INTEGER NOT NULL DEFAULT 0,
        graduated          INTEGER NOT NULL DEFAULT 0,
        amm_address        TEXT,
        graduated_at       INTEGER,
        metadata           TEXT    NOT NULL DEFAULT '{}',
        created_block      INTEGER NOT NULL,
        created_tx         TEXT    NOT NULL,
        created_at         INTEGER NOT NULL
    );",
    "CREATE TABLE IF NOT EXISTS contributions (
        nullifier        TEXT    PRIMARY KEY,
        token_address    TEXT    NOT NULL,
        commitment       TEXT,
        amount           TEXT    NOT NULL,
        token_amount     TEXT    NOT NULL,
        block_number     INTEGER NOT NULL,
        transaction_hash TEXT    NOT NULL,
        created_at       INTEGER NOT NULL
    );",
    "CREATE INDEX IF NOT EXISTS idx_contributions_token ON contributions (token_address);",
    "CREATE TABLE IF NOT EXISTS proofs (
        proof_hash       TEXT    PRIMARY KEY,
        token_address    TEXT,
        verified         INTEGER NOT NULL,
        verified_at      INTEGER NOT NULL,
        gas_cost         INTEGER NOT NULL,
        block_number     INTEGER NOT NULL,
        transaction_hash TEXT    NOT NULL
    );",
];

/// SQLite-backed storage for the checkpoint, raw events and launch tables.
#[derive(Clone)]
pub struct SqliteStorage {
    pool: SqlitePool,
}

impl SqliteStorage {
    /// Open (or create) a SQLite database at `path`.
    ///
    /// The path may be a plain file path (`"./launchindex.db"`) or a full
    /// SQLite URL (`"sqlite:./launchindex.db?mode=rwc"`).
    pub async fn open(path: &str) -> Result<Self, IndexerError> {
        let url = if path.starts_with("sqlite:") {
            path.to_string()
        } else {
            format!("sqlite:{path}?mode=rwc")
        };

        let pool = SqlitePool::connect(&url).await.map_err(db_err)?;

        sqlx::query("PRAGMA journal_mode=WAL;")
            .execute(&pool)
            .await
            .map_err(db_err)?;

        let storage = Self { pool };
        storage.init_schema().await?;
        Ok(storage)
    }

    /// Open an in-memory SQLite database.
    ///
    /// Pinned to one connection that never expires, since every connection to
    /// `sqlite::memory:` is a separate database. All data is lost when the
    /// pool is dropped.
    pub async fn in_memory() -> Result<Self, IndexerError> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect("sqlite::memory:")
            .await
            .map_err(db_err)?;

        let storage = Self { pool };
        storage.init_schema().await?;
        Ok(storage)
    }

    async fn init_schema(&self) -> Result<(), IndexerError> {
        for stmt in SCHEMA {
            sqlx::query(stmt)
                .execute(&self.pool)
                .await
                .map_err(db_err)?;
        }
        debug!("sqlite schema initialized");
        Ok(())
    }

    /// Number of contribution rows.
    pub async fn contribution_count(&self) -> Result<u64, IndexerError> {
        let row = sqlx::query("SELECT COUNT(*) AS cnt FROM contributions")
            .fetch_one(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(row.get::<i64, _>("cnt") as u64)
    }

    /// Number of launch rows.
    pub async fn launch_count(&self) -> Result<u64, IndexerError> {
        let row = sqlx::query("SELECT COUNT(*) AS cnt FROM launches")
            .fetch_one(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(row.get::<i64, _>("cnt") as u64)
    }
}

// ─── Row mapping ─────────────────────────────────────────────────────────────

fn raw_event_from_row(r: &SqliteRow) -> Result<RawEvent, IndexerError> {
    let data: String = r.get("data");
    Ok(RawEvent {
        event_name: r.get("event_name"),
        contract_address: r.get("contract_address"),
        block_number: r.get::<i64, _>("block_number") as u64,
        transaction_hash: r.get("transaction_hash"),
        event_index: r.get::<i64, _>("event_index") as u32,
        data: serde_json::from_str(&data)
            .map_err(|e| IndexerError::Storage(format!("raw event data: {e}")))?,
        indexed: r.get("indexed"),
        observed_at: r.get("observed_at"),
    })
}

fn launch_from_row(r: &SqliteRow) -> Result<Launch, IndexerError> {
    let metadata: String = r.get("metadata");
    Ok(Launch {
        token_address: r.get("token_address"),
        creator: r.get("creator"),
        name: r.get("name"),
        symbol: r.get("symbol"),
        total_supply: parse_amount("total_supply", r.get("total_supply"))?,
        raised_amount: parse_amount("raised_amount", r.get("raised_amount"))?,
        sold_amount: parse_amount("sold_amount", r.get("sold_amount"))?,
        contribution_count: r.get::<i64, _>("contribution_count") as u64,
        graduated: r.get("graduated"),
        amm_address: r.get("amm_address"),
        graduated_at: r.get("graduated_at"),
        metadata: serde_json::from_str(&metadata)
            .map_err(|e| IndexerError::Storage(format!("launch metadata: {e}")))?,
        created_block: r.get::<i64, _>("created_block") as u64,
        created_tx: r.get("created_tx"),
        created_at: r.get("created_at"),
    })
}

// ─── CheckpointStore impl ────────────────────────────────────────────────────

#[async_trait]
impl CheckpointStore for SqliteStorage {
    async fn load(&self) -> Result<Option<Checkpoint>, IndexerError> {
        let row = sqlx::query(
            "SELECT last_indexed_block, last_update, status, error_message
             FROM indexer_checkpoint WHERE id = 1",
        )
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?;

        row.map(|r| {
            Ok(Checkpoint {
                last_indexed_block: r.get::<i64, _>("last_indexed_block") as u64,
                last_update: r.get("last_update"),
                status: r.get::<String, _>("status").parse()?,
                error_message: r.get("error_message"),
            })
        })
        .transpose()
    }

    async fn initialize(&self, start_block: u64) -> Result<(), IndexerError> {
        sqlx::query(
            "INSERT INTO indexer_checkpoint (id, last_indexed_block, last_update, status)
             VALUES (1, ?, ?, 'running')
             ON CONFLICT (id) DO NOTHING",
        )
        .bind(start_block as i64)
        .bind(chrono::Utc::now().timestamp())
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(())
    }

    async fn advance(&self, block: u64, status: CheckpointStatus) -> Result<(), IndexerError> {
        sqlx::query(
            "INSERT INTO indexer_checkpoint (id, last_indexed_block, last_update, status)
             VALUES (1, ?, ?, ?)
             ON CONFLICT (id) DO UPDATE SET
                last_indexed_block = excluded.last_indexed_block,
                last_update        = excluded.last_update,
                status             = excluded.status,
                error_message      = CASE WHEN excluded.status = 'running'
                                          THEN NULL ELSE indexer_checkpoint.error_message END",
        )
        .bind(block as i64)
        .bind(chrono::Utc::now().timestamp())
        .bind(status.as_str())
        .execute(&self.pool)
        .await
        .map_err(db_err)?;

        debug!(block, %status, "checkpoint saved");
        Ok(())
    }

    async fn mark_error(&self, message: &str) -> Result<(), IndexerError> {
        sqlx::query(
            "UPDATE indexer_checkpoint
             SET status = 'error', error_message = ?, last_update = ?
             WHERE id = 1",
        )
        .bind(message)
        .bind(chrono::Utc::now().timestamp())
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(())
    }
}

// ─── RawEventStore impl ──────────────────────────────────────────────────────

#[async_trait]
impl RawEventStore for SqliteStorage {
    async fn insert_raw_event(&self, event: &RawEvent) -> Result<bool, IndexerError> {
        let data = serde_json::to_string(&event.data)
            .map_err(|e| IndexerError::Storage(e.to_string()))?;

        let result = sqlx::query(
            "INSERT INTO raw_events
                (event_name, contract_address, block_number, transaction_hash,
                 event_index, data, indexed, observed_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT (transaction_hash, event_index) DO NOTHING",
        )
        .bind(&event.event_name)
        .bind(&event.contract_address)
        .bind(event.block_number as i64)
        .bind(&event.transaction_hash)
        .bind(event.event_index as i64)
        .bind(&data)
        .bind(event.indexed)
        .bind(event.observed_at)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;

        Ok(result.rows_affected() == 1)
    }

    async fn raw_event_count(&self) -> Result<u64, IndexerError> {
        let row = sqlx::query("SELECT COUNT(*) AS cnt FROM raw_events")
            .fetch_one(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(row.get::<i64, _>("cnt") as u64)
    }

    async fn recent_raw_events(&self, limit: u32) -> Result<Vec<RawEvent>, IndexerError> {
        let rows = sqlx::query(
            "SELECT event_name, contract_address, block_number, transaction_hash,
                    event_index, data, indexed, observed_at
             FROM raw_events
             ORDER BY block_number DESC, event_index DESC
             LIMIT ?",
        )
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;

        rows.iter().map(raw_event_from_row).collect()
    }
}

// ─── LaunchStore impl ────────────────────────────────────────────────────────

#[async_trait]
impl LaunchStore for SqliteStorage {
    async fn insert_launch(&self, launch: &NewLaunch) -> Result<bool, IndexerError> {
        let result = sqlx::query(
            "INSERT INTO launches
                (token_address, creator, name, symbol, total_supply,
                 created_block, created_tx, created_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT (token_address) DO NOTHING",
        )
        .bind(&launch.token_address)
        .bind(&launch.creator)
        .bind(&launch.name)
        .bind(&launch.symbol)
        .bind(launch.total_supply.to_string())
        .bind(launch.created_block as i64)
        .bind(&launch.created_tx)
        .bind(launch.created_at)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;

        Ok(result.rows_affected() == 1)
    }

    async fn record_contribution(&self, c: &Contribution) -> Result<bool, IndexerError> {
        let mut tx = self.pool.begin().await.map_err(db_err)?;

        let inserted = sqlx::query(
            "INSERT INTO contributions
                (nullifier, token_address, commitment, amount, token_amount,
                 block_number, transaction_hash, created_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT (nullifier) DO NOTHING",
        )
        .bind(&c.nullifier)
        .bind(&c.token_address)
        .bind(&c.commitment)
        .bind(c.amount.to_string())
        .bind(c.token_amount.to_string())
        .bind(c.block_number as i64)
        .bind(&c.transaction_hash)
        .bind(c.created_at)
        .execute(&mut *tx)
        .await
        .map_err(db_err)?
        .rows_affected()
            == 1;

        if !inserted {
            tx.rollback().await.map_err(db_err)?;
            return Ok(false);
        }

        let counters = sqlx::query(
            "SELECT raised_amount, sold_amount FROM launches WHERE token_address = ?",
        )
        .bind(&c.token_address)
        .fetch_optional(&mut *tx)
        .await
        .map_err(db_err)?;

        match counters {
            Some(row) => {
                let raised = parse_amount("raised_amount", row.get("raised_amount"))?;
                let sold = parse_amount("sold_amount", row.get("sold_amount"))?;
                sqlx::query(
                    "UPDATE launches
                     SET raised_amount = ?, sold_amount = ?,
                         contribution_count = contribution_count + 1
                     WHERE token_address = ?",
                )
                .bind(add_amount(&c.token_address, raised, c.amount)?.to_string())
                .bind(add_amount(&c.token_address, sold, c.token_amount)?.to_string())
                .bind(&c.token_address)
                .execute(&mut *tx)
                .await
                .map_err(db_err)?;
            }
            None => warn!(token = %c.token_address, "contribution for unknown launch"),
        }

        tx.commit().await.map_err(db_err)?;
        Ok(true)
    }

    async fn mark_graduated(&self, g: &Graduation) -> Result<bool, IndexerError> {
        let result = sqlx::query(
            "UPDATE launches
             SET graduated = 1, amm_address = ?, graduated_at = ?,
                 metadata = json_set(COALESCE(metadata, '{}'), '$.liquidity', ?)
             WHERE token_address = ?",
        )
        .bind(&g.amm_address)
        .bind(g.graduated_at)
        .bind(g.liquidity.to_string())
        .bind(&g.token_address)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;

        Ok(result.rows_affected() == 1)
    }

    async fn upsert_proof(&self, p: &ProofRecord) -> Result<(), IndexerError> {
        sqlx::query(
            "INSERT INTO proofs
                (proof_hash, token_address, verified, verified_at, gas_cost,
                 block_number, transaction_hash)
             VALUES (?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT (proof_hash) DO UPDATE SET
                verified    = excluded.verified,
                verified_at = excluded.verified_at,
                gas_cost    = excluded.gas_cost",
        )
        .bind(&p.proof_hash)
        .bind(&p.token_address)
        .bind(p.verified)
        .bind(p.verified_at)
        .bind(p.gas_cost as i64)
        .bind(p.block_number as i64)
        .bind(&p.transaction_hash)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(())
    }

    async fn launch(&self, token_address: &str) -> Result<Option<Launch>, IndexerError> {
        let row = sqlx::query("SELECT * FROM launches WHERE token_address = ?")
            .bind(token_address)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?;
        row.as_ref().map(launch_from_row).transpose()
    }

    async fn contribution(&self, nullifier: &str) -> Result<Option<Contribution>, IndexerError> {
        let row = sqlx::query("SELECT * FROM contributions WHERE nullifier = ?")
            .bind(nullifier)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?;

        row.map(|r| {
            Ok(Contribution {
                nullifier: r.get("nullifier"),
                token_address: r.get("token_address"),
                commitment: r.get("commitment"),
                amount: parse_amount("amount", r.get("amount"))?,
                token_amount: parse_amount("token_amount", r.get("token_amount"))?,
                block_number: r.get::<i64, _>("block_number") as u64,
                transaction_hash: r.get("transaction_hash"),
                created_at: r.get("created_at"),
            })
        })
        .transpose()
    }

    async fn proof(&self, proof_hash: &str) -> Result<Option<ProofRecord>, IndexerError> {
        let row = sqlx::query("SELECT * FROM proofs WHERE proof_hash = ?")
            .bind(proof_hash)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?;

        Ok(row.map(|r| ProofRecord {
            proof_hash: r.get("proof_hash"),
            token_address: r.get("token_address"),
            verified: r.get("verified"),
            verified_at: r.get("verified_at"),
            gas_cost: r.get::<i64, _>("gas_cost") as u64,
            block_number: r.get::<i64, _>("block_number") as u64,
            transaction_hash: r.get("transaction_hash"),
        }))
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────
