// crates/hodl-daemon/src/main.rs
//
// Binary entrypoint for the HODL staking ledger daemon.
//
// Initializes tracing, parses CLI arguments, loads configuration, opens the
// ledger store, spawns the epoch scheduler, and serves ledger events read
// from stdin until interrupted.

mod config;
mod events;
mod oracle;
mod reporter;
mod scheduler;
mod shared;

use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::sync::{mpsc, watch};

use config::DaemonConfig;
use hodl_store::{LedgerStore, StoreOptions};
use oracle::HttpBalanceOracle;
use reporter::WebhookReporter;
use scheduler::EpochScheduler;
use shared::LedgerServices;

/// HODL staking ledger daemon: keeps epochs rolling and applies point
/// transfers and staking enrollments.
#[derive(Parser, Debug)]
#[command(name = "hodl-daemon", version = "0.1.0", about = "HODL staking ledger daemon")]
struct Args {
    /// Path to the TOML configuration file.
    #[arg(long, default_value = "~/.hodl/config.toml")]
    config: String,

    /// Override the data directory from the config file.
    #[arg(long)]
    data_dir: Option<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    let config_path = expand_tilde(&args.config);

    // Load configuration from TOML file, falling back to defaults if the file
    // is not found. A file that exists but is invalid is fatal.
    let (mut daemon_config, load_error) = if std::path::Path::new(&config_path).exists() {
        (DaemonConfig::load(&config_path)?, None)
    } else {
        (DaemonConfig::default(), Some(config_path.clone()))
    };
    if let Some(dir) = args.data_dir {
        daemon_config.data_dir = dir;
    }
    daemon_config.validate()?;

    // Initialize tracing subscriber for structured logging.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&daemon_config.log_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    match load_error {
        None => tracing::info!("Loaded configuration from {}", config_path),
        Some(path) => tracing::warn!("No config file at {}. Using defaults.", path),
    }

    let params = daemon_config.epochs.clone();
    tracing::info!("HODL ledger daemon v0.1.0");
    tracing::info!("Data directory: {}", daemon_config.data_dir);
    tracing::info!(
        "Epochs: {} days, {}s gap, checked every {} min",
        params.epoch_duration_days,
        params.space_between_epochs_secs,
        params.check_epoch_minutes
    );

    // ---------------------------------------------------------------
    // Ledger store and services.
    // ---------------------------------------------------------------
    let data_dir = expand_tilde(&daemon_config.data_dir);
    let db_path = format!("{}/ledger_rocksdb", data_dir);
    std::fs::create_dir_all(&data_dir)?;
    let store = Arc::new(LedgerStore::open_with(
        &db_path,
        &StoreOptions {
            lock_timeout_ms: daemon_config.lock_timeout_ms,
        },
    )?);
    tracing::info!("Ledger store opened at {}", db_path);

    let reporter = Arc::new(WebhookReporter::new(daemon_config.report_url.clone()));
    let oracle = Arc::new(HttpBalanceOracle::new(
        &daemon_config.balance_api_url,
        Duration::from_secs(daemon_config.oracle_timeout_secs),
    ));
    tracing::info!("Balance oracle: {}", oracle.endpoint());
    let services = Arc::new(LedgerServices::new(
        store,
        params.clone(),
        oracle,
        reporter.clone(),
        &daemon_config.points_emoji,
        &daemon_config.points_marker,
    )?);

    // ---------------------------------------------------------------
    // Epoch scheduler.
    // ---------------------------------------------------------------
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let scheduler = EpochScheduler::new(
        services.keeper.clone(),
        reporter.clone(),
        params.check_interval(),
    );
    let scheduler_task = tokio::spawn(async move {
        scheduler.run(shutdown_rx).await;
    });

    // ---------------------------------------------------------------
    // Inbound events: stdin lines in, replies out on stdout.
    // ---------------------------------------------------------------
    let (reply_tx, reply_rx) = mpsc::channel::<events::Reply>(256);
    tokio::spawn(write_replies(reply_rx));
    tokio::spawn(read_events(services, reply_tx));

    tokio::signal::ctrl_c().await?;
    tracing::info!("Shutdown signal received");
    let _ = shutdown_tx.send(true);
    if let Err(e) = scheduler_task.await {
        tracing::error!("Epoch scheduler task failed: {}", e);
    }

    tracing::info!("HODL ledger daemon shut down gracefully");
    Ok(())
}

/// Read one event per line from stdin; each is handled on its own task.
async fn read_events(services: Arc<LedgerServices>, replies: mpsc::Sender<events::Reply>) {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => {
                if line.trim().is_empty() {
                    continue;
                }
                let services = services.clone();
                let replies = replies.clone();
                tokio::spawn(async move {
                    let reply = events::handle_line(services, &line).await;
                    let _ = replies.send(reply).await;
                });
            }
            Ok(None) => {
                tracing::info!("Event input closed; scheduler keeps running");
                break;
            }
            Err(e) => {
                tracing::error!("Failed to read event input: {}", e);
                break;
            }
        }
    }
}

/// Serialize replies to stdout, one JSON object per line.
async fn write_replies(mut replies: mpsc::Receiver<events::Reply>) {
    let mut stdout = tokio::io::stdout();
    while let Some(reply) = replies.recv().await {
        let mut line = match serde_json::to_string(&reply) {
            Ok(line) => line,
            Err(e) => {
                tracing::error!("Failed to serialize reply: {}", e);
                continue;
            }
        };
        line.push('\n');
        if let Err(e) = stdout.write_all(line.as_bytes()).await {
            tracing::error!("Failed to write reply: {}", e);
            break;
        }
        let _ = stdout.flush().await;
    }
}

/// Expand a leading `~/` to the user's home directory.
fn expand_tilde(path: &str) -> String {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return format!("{}/{}", home.display(), rest);
        }
    }
    path.to_string()
}
