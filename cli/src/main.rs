//! LaunchIndex CLI: runs the launch event indexer and inspects its state.
//!
//! # Commands
//! ```text
//! launchindex run    --config <file.yaml>
//! launchindex status --config <file.yaml>
//! launchindex events --config <file.yaml> [--limit N]
//! launchindex info
//! ```

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing::info;

use launchindex_core::{
    register_default_handlers, start_indexer, CheckpointStore, HandlerRegistry, IndexStores,
    LaunchStore, RawEventStore,
};
use launchindex_evm::{EvmEventSource, HttpTransport, DEFAULT_SIGNATURES};
use launchindex_storage::{PostgresOptions, PostgresStorage, SqliteStorage};

mod config;
mod logging;

use config::{AppConfig, DatabaseConfig};
use logging::{init_tracing, LogConfig};

#[derive(Parser)]
#[command(
    name = "launchindex",
    about = "Chain event indexer for private token launches",
    long_about = "
LaunchIndex polls an EVM node for launch, contribution, graduation and proof
events, stores every event in an audit table and keeps launch projections up
to date in SQLite or PostgreSQL.

ENVIRONMENT VARIABLES:
  LAUNCHINDEX_RPC_URL        JSON-RPC endpoint (overrides rpc.url)
  LAUNCHINDEX_DATABASE_URL   Database URL or SQLite path (overrides database.url)
  RUST_LOG                   Log filter (overrides log.level)
",
    version
)]
struct Cli {
    /// Log at debug level
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Index until interrupted with Ctrl-C
    Run {
        #[command(flatten)]
        target: Target,
    },

    /// Print the checkpoint row
    Status {
        #[command(flatten)]
        target: Target,
    },

    /// Print the most recent raw events
    Events {
        #[command(flatten)]
        target: Target,
        #[arg(long, default_value_t = 20)]
        limit: u32,
    },

    /// Show defaults and built-in event signatures
    Info,
}

#[derive(clap::Args)]
struct Target {
    /// YAML config file
    #[arg(short, long, default_value = "launchindex.yaml")]
    config: PathBuf,

    #[arg(long, env = "LAUNCHINDEX_RPC_URL")]
    rpc_url: Option<String>,

    #[arg(long, env = "LAUNCHINDEX_DATABASE_URL")]
    database_url: Option<String>,
}

impl Target {
    fn load(self, verbose: bool) -> Result<AppConfig> {
        let mut config = AppConfig::load(&self.config)?;
        config.apply_overrides(self.rpc_url, self.database_url);
        if verbose {
            config.log.level = "debug".into();
        }
        init_tracing(&config.log);
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Run { target } => cmd_run(target.load(cli.verbose)?).await,
        Commands::Status { target } => cmd_status(target.load(cli.verbose)?).await,
        Commands::Events { target, limit } => cmd_events(target.load(cli.verbose)?, limit).await,
        Commands::Info => cmd_info(),
    }
}

// ─── Storage ─────────────────────────────────────────────────────────────────

/// One backend seen through the three core storage traits.
struct Stores {
    checkpoints: Arc<dyn CheckpointStore>,
    raw_events: Arc<dyn RawEventStore>,
    launches: Arc<dyn LaunchStore>,
}

impl Stores {
    fn from_backend<B>(backend: B) -> Self
    where
        B: CheckpointStore + RawEventStore + LaunchStore + 'static,
    {
        let backend = Arc::new(backend);
        Self {
            checkpoints: backend.clone(),
            raw_events: backend.clone(),
            launches: backend,
        }
    }

    fn index_stores(&self) -> IndexStores {
        IndexStores {
            checkpoints: self.checkpoints.clone(),
            raw_events: self.raw_events.clone(),
        }
    }
}

async fn open_stores(database: &DatabaseConfig) -> Result<Stores> {
    if database.is_postgres() {
        let opts = PostgresOptions {
            max_connections: database.max_connections,
            ..PostgresOptions::default()
        };
        let storage = PostgresStorage::connect_with_options(&database.url, opts)
            .await
            .context("connecting to postgres")?;
        Ok(Stores::from_backend(storage))
    } else {
        let storage = SqliteStorage::open(&database.url)
            .await
            .with_context(|| format!("opening sqlite database {}", database.url))?;
        Ok(Stores::from_backend(storage))
    }
}

// ─── Command implementations ─────────────────────────────────────────────────

async fn cmd_run(config: AppConfig) -> Result<()> {
    let stores = open_stores(&config.database).await?;

    let transport = HttpTransport::new(
        config.rpc.url.clone(),
        Duration::from_secs(config.rpc.timeout_secs),
    )
    .context("building HTTP transport")?;
    let source = EvmEventSource::new(transport, config.event_abi()?, &config.indexer)
        .context("building event source")?;

    let mut handlers = HandlerRegistry::new();
    register_default_handlers(&mut handlers, stores.launches.clone());

    let shutdown = CancellationToken::new();
    let signal = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("interrupt received, finishing current batch");
            signal.cancel();
        }
    });

    info!(
        rpc = %config.rpc.url,
        postgres = config.database.is_postgres(),
        "launchindex starting"
    );
    start_indexer(
        config.indexer,
        source,
        stores.index_stores(),
        handlers,
        shutdown,
    )
    .await
    .context("indexer failed to start")?;
    Ok(())
}

async fn cmd_status(config: AppConfig) -> Result<()> {
    let stores = open_stores(&config.database).await?;
    let checkpoint = stores.checkpoints.load().await?;
    let events = stores.raw_events.raw_event_count().await?;

    match checkpoint {
        Some(cp) => {
            println!("Last indexed block: {}", cp.last_indexed_block);
            println!("Status:             {}", cp.status);
            println!("Last update:        {}", format_timestamp(cp.last_update));
            if let Some(message) = cp.error_message {
                println!("Error:              {message}");
            }
        }
        None => {
            println!(
                "No checkpoint yet (indexing will start at block {})",
                config.indexer.start_block
            );
        }
    }
    println!("Raw events stored:  {events}");
    Ok(())
}

async fn cmd_events(config: AppConfig, limit: u32) -> Result<()> {
    let stores = open_stores(&config.database).await?;
    let events = stores.raw_events.recent_raw_events(limit).await?;
    if events.is_empty() {
        println!("No events indexed yet.");
        return Ok(());
    }
    for event in events {
        println!(
            "{:>10}  {:>4}  {:<18} {}  {}{}",
            event.block_number,
            event.event_index,
            event.event_name,
            event.contract_address,
            event.transaction_hash,
            if event.indexed { "" } else { "  (not indexed)" },
        );
        println!("            {}", serde_json::to_string(&event.data)?);
    }
    Ok(())
}

fn cmd_info() -> Result<()> {
    let defaults = AppConfig::default();
    println!("LaunchIndex v{}", env!("CARGO_PKG_VERSION"));
    println!();
    println!("Defaults:");
    println!("  poll interval    {} ms", defaults.indexer.poll_interval_ms);
    println!("  error backoff    {} ms", defaults.indexer.backoff_interval().as_millis());
    println!("  batch size       {} blocks", defaults.indexer.batch_size);
    println!("  rpc url          {}", defaults.rpc.url);
    println!("  database         {}", defaults.database.url);
    println!("  log level        {}", LogConfig::default().level);
    println!();
    println!("Built-in event handlers:");
    for (name, signature) in DEFAULT_SIGNATURES {
        println!("  {name:<18} {signature}");
    }
    Ok(())
}

fn format_timestamp(secs: i64) -> String {
    chrono::DateTime::from_timestamp(secs, 0)
        .map(|t| t.to_rfc3339())
        .unwrap_or_else(|| secs.to_string())
}
