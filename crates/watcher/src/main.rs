use anyhow::Context;
use clap::Parser;
use heirloom_storage::open_store;
use heirloom_types::defaults;
use heirloom_watcher::config::parse_entities;
use heirloom_watcher::{NetworkSelection, Watcher, WatcherConfig};
use std::process::ExitCode;
use tracing::{error, info, warn};

/// Mirrors attester, safe and claim contract state into the key-value store.
#[derive(Debug, Parser)]
#[command(name = "heirloom-watcher", version)]
struct Args {
    /// Watch mainnet only.
    #[arg(long)]
    mainnet: bool,

    /// Watch the Sepolia testnet only.
    #[arg(long, alias = "testnet")]
    sepolia: bool,

    /// Watch both networks (the default).
    #[arg(long = "both", id = "both")]
    _both: bool,

    /// Comma-separated entity types, overriding WATCH_ENTITIES.
    #[arg(long, value_name = "LIST")]
    entities: Option<String>,

    /// Store URL: redis://, rediss://, memory:// or rocksdb://<path>.
    #[arg(long, env = "STORE_URL")]
    store_url: Option<String>,
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    match run(Args::parse()).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{:#}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(args: Args) -> anyhow::Result<()> {
    let selection = NetworkSelection::from_flags(args.mainnet, args.sepolia);
    let mut config = WatcherConfig::from_env(selection);
    if let Some(list) = args.entities.as_deref() {
        let entities = parse_entities(list);
        anyhow::ensure!(!entities.is_empty(), "--entities names no known entity type: {}", list);
        config.entities = entities;
    }

    let store_url = args
        .store_url
        .or_else(|| std::env::var("REDIS_URL").ok())
        .unwrap_or_else(|| defaults::STORE_URL.to_string());
    let store = open_store(&store_url)
        .await
        .with_context(|| format!("failed to open store {}", store_url))?;

    let watcher = Watcher::new(config, store);
    let mut handle = watcher.start().await.context("watcher failed to start")?;
    info!(pairs = ?handle.pairs(), "watching");

    // A stopped pair stays stopped; the process keeps serving the rest.
    tokio::select! {
        signal = tokio::signal::ctrl_c() => {
            signal.context("failed to listen for shutdown signal")?;
            info!("shutting down");
            handle.abort();
            Ok(())
        }
        _ = handle.join() => {
            let board = handle.status().snapshot().await;
            for (pair, status) in &board {
                warn!(pair = %pair, run = ?status.run, "pair ended");
            }
            anyhow::bail!("every watched pair has stopped")
        }
    }
}
