//! burrowkv Server Binary
//!
//! Serves one database file over TCP.

use std::sync::Arc;

use burrowkv::network::Server;
use burrowkv::{Config, Store, SyncStrategy};
use clap::Parser;
use tracing_subscriber::{fmt, EnvFilter};

/// burrowkv Server
#[derive(Parser, Debug)]
#[command(name = "burrowkv-server")]
#[command(about = "Embedded copy-on-write key-value store served over TCP")]
#[command(version)]
struct Args {
    /// Database file
    #[arg(short, long, default_value = "./burrow.db")]
    path: String,

    /// Listen address (host:port)
    #[arg(short, long, default_value = "127.0.0.1:8080")]
    listen: String,

    /// Maximum queued connections
    #[arg(short, long, default_value = "1024")]
    max_connections: usize,

    /// Connection worker threads
    #[arg(short, long, default_value = "8")]
    workers: usize,

    /// Page size for a newly created file
    #[arg(long, default_value = "4096")]
    page_size: usize,

    /// Skip fsync on commit (survives process crashes only)
    #[arg(long)]
    no_sync: bool,

    /// Check the whole tree before every commit
    #[arg(long)]
    strict: bool,
}

fn main() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,burrowkv=debug"));

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(true)
        .init();

    let args = Args::parse();

    tracing::info!("burrowkv server v{}", burrowkv::VERSION);
    tracing::info!("Database file: {}", args.path);
    tracing::info!("Listen address: {}", args.listen);

    let config = Config::builder()
        .path(&args.path)
        .listen_addr(&args.listen)
        .max_connections(args.max_connections)
        .worker_threads(args.workers)
        .page_size(args.page_size)
        .sync_strategy(if args.no_sync {
            SyncStrategy::Never
        } else {
            SyncStrategy::EveryCommit
        })
        .strict_mode(args.strict)
        .build();

    let store = match Store::open(config.clone()) {
        Ok(store) => Arc::new(store),
        Err(e) => {
            tracing::error!("Failed to open store: {}", e);
            std::process::exit(1);
        }
    };

    let stats = store.stats();
    tracing::info!(
        "Store ready at txid {} ({} pages of {} bytes)",
        stats.txid,
        stats.page_count,
        stats.page_size
    );

    let server = match Server::bind(config, Arc::clone(&store)) {
        Ok(server) => server,
        Err(e) => {
            tracing::error!("Failed to bind {}: {}", args.listen, e);
            std::process::exit(1);
        }
    };

    if let Err(e) = server.run() {
        tracing::error!("Server error: {}", e);
        std::process::exit(1);
    }

    match Arc::try_unwrap(store) {
        Ok(store) => {
            if let Err(e) = store.close() {
                tracing::error!("Failed to close store: {}", e);
            }
        }
        Err(_) => tracing::warn!("Store still shared at exit; skipping close"),
    }
}
