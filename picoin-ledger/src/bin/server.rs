//! Wallet server binary
//!
//! Serves newline-delimited JSON requests on stdin and writes one JSON
//! response per line to stdout. Configuration comes from the TOML file named
//! by the first argument, or from `PICOIN_*` environment variables.

use anyhow::Context;
use picoin_ledger::{
    config::StorageBackend, Config, LedgerEngine, MemoryWalletStore, RocksWalletStore,
    WalletService, WalletStore,
};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing; stdout carries responses, so logs go to stderr
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    // Load configuration
    let config = match std::env::args().nth(1) {
        Some(path) => Config::from_file(&path)
            .with_context(|| format!("Failed to load config from {}", path))?,
        None => Config::from_env().context("Failed to load config from environment")?,
    };

    tracing::info!(
        service = %config.service_name,
        version = %config.service_version,
        backend = ?config.storage.backend,
        "Starting Pi Coin wallet server"
    );

    let store: Arc<dyn WalletStore> = match config.storage.backend {
        StorageBackend::RocksDb => Arc::new(
            RocksWalletStore::open(&config).context("Failed to open wallet store")?,
        ),
        StorageBackend::Memory => Arc::new(MemoryWalletStore::new()),
    };

    let engine = Arc::new(
        LedgerEngine::new(store, &config).context("Failed to start ledger engine")?,
    );

    // Forget rate-limit history of users idle for a whole window
    let purge_engine = engine.clone();
    let purge_every = config.rate_limit.window();
    let purge_task = tokio::spawn(async move {
        let mut ticker = tokio::time::interval(purge_every);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            purge_engine.purge_idle();
        }
    });

    let service = WalletService::new(engine);
    tracing::info!("Wallet service ready");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = tokio::io::stdout();

    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line? else {
                    tracing::info!("Input closed");
                    break;
                };
                if line.trim().is_empty() {
                    continue;
                }

                let response = service.handle_json(&line).await;
                let mut out = serde_json::to_vec(&response)?;
                out.push(b'\n');
                stdout.write_all(&out).await?;
                stdout.flush().await?;
            }
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Interrupt received");
                break;
            }
        }
    }

    purge_task.abort();
    let metrics = service.engine().metrics();
    tracing::info!(
        wallets_created = metrics.wallets_created.get(),
        level_ups = metrics.level_ups_total.get(),
        "Shutting down wallet server"
    );
    Ok(())
}
