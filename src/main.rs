//! Validator node entry point: loads config, connects to Postgres, starts
//! one chain watcher per configured chain, and serves the HTTP front end.

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;

use validator_api::AppState;
use validator_chain::EthereumWatcher;
use validator_common::Config;
use validator_core::security::HealthChecker;
use validator_core::ChainWatcher;
use validator_processor::dispatch::process_event;
use validator_processor::Processor;
use validator_sql::Validator;
use validator_storage::{PgConfig, PostgresReceiptStore, PostgresStore, ReceiptStore};

#[derive(Parser)]
#[command(name = "validator-node")]
#[command(author, version, about = "Validator node for a multi-chain table database", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the validator node: connect to Postgres, watch every configured
    /// chain, and serve the HTTP API.
    Run {
        /// Path to the TOML config file.
        #[arg(short, long, default_value = "config.toml")]
        config: String,

        /// Emit structured JSON logs instead of human-readable text.
        #[arg(long)]
        json_logs: bool,
    },

    /// Validate a config file without starting the node.
    CheckConfig {
        #[arg(short, long, default_value = "config.toml")]
        config: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Run { config, json_logs } => run(&config, json_logs).await,
        Commands::CheckConfig { config } => check_config(&config),
    }
}

fn check_config(path: &str) -> Result<()> {
    let config = Config::from_file(path).with_context(|| format!("loading config from {path}"))?;
    println!("config at {path} is valid ({} chain(s) configured)", config.chains.len());
    Ok(())
}

async fn run(config_path: &str, json_logs: bool) -> Result<()> {
    validator_common::logging::init(json_logs);

    let config = Config::from_file(config_path).with_context(|| format!("loading config from {config_path}"))?;

    tracing::info!(chains = config.chains.len(), "starting validator node");

    let pg_config = PgConfig {
        url: config.postgres_url.clone(),
        ..PgConfig::default()
    };
    let store = Arc::new(
        PostgresStore::connect(pg_config)
            .await
            .context("connecting to postgres")?,
    );

    let receipts: Arc<dyn ReceiptStore> = {
        let receipt_store = PostgresReceiptStore::new(store.pool());
        receipt_store.ensure_schema().await.context("bootstrapping receipts table")?;
        Arc::new(receipt_store)
    };

    let accepted_types = config.validator.accepted_type_names();
    let validator = Arc::new(Validator::new(&config.validator.system_table_prefix, accepted_types));

    let health = Arc::new(HealthChecker::new());

    let shutdown = CancellationToken::new();
    let mut chain_tasks = Vec::new();

    for (name, chain_config) in config.chains.clone() {
        let watcher = EthereumWatcher::new(&chain_config).with_context(|| format!("configuring chain `{name}`"))?;
        let processor = Arc::new(Processor::new(
            store.clone() as Arc<dyn validator_processor::Store>,
            config.validator.max_row_count,
        ));
        let validator = validator.clone();
        let receipts = receipts.clone();
        let health = health.clone();
        let shutdown = shutdown.clone();

        chain_tasks.push(tokio::spawn(watch_chain(
            name, watcher, processor, validator, receipts, health, shutdown,
        )));
    }

    let app_state = AppState {
        validator: validator.clone(),
        store: store.clone() as Arc<dyn validator_storage::QueryStore>,
        receipts: receipts.clone(),
        health: health.clone(),
        auth: validator_api::auth::AuthState::disabled(),
    };

    let http_addr: std::net::SocketAddr = config.http_addr.parse().context("parsing http_addr")?;
    let http_shutdown = shutdown.clone();
    let http_handle = tokio::spawn(async move {
        tokio::select! {
            res = validator_api::start_http_server(http_addr, app_state) => {
                if let Err(e) = res {
                    tracing::error!(error = %e, "HTTP server exited with an error");
                }
            }
            _ = http_shutdown.cancelled() => {
                tracing::info!("HTTP server shutting down");
            }
        }
    });

    tokio::signal::ctrl_c().await.context("waiting for shutdown signal")?;
    tracing::info!("shutdown signal received");
    shutdown.cancel();

    for task in chain_tasks {
        let _ = task.await;
    }
    let _ = http_handle.await;

    Ok(())
}

/// One task per configured chain: subscribe to registry events (already
/// held back past the chain's reorg depth by the watcher) and run each one
/// through the Processor, persisting the resulting receipt.
async fn watch_chain(
    chain_name: String,
    watcher: EthereumWatcher,
    processor: Arc<Processor>,
    validator: Arc<Validator>,
    receipts: Arc<dyn ReceiptStore>,
    health: Arc<HealthChecker>,
    shutdown: CancellationToken,
) {
    loop {
        if shutdown.is_cancelled() {
            break;
        }

        let mut subscription = match watcher.subscribe().await {
            Ok(sub) => {
                health.record_success(&chain_name, 0).await;
                sub
            }
            Err(e) => {
                tracing::error!(chain = %chain_name, error = %e, "failed to subscribe to chain");
                health.record_failure(&chain_name).await;
                tokio::select! {
                    _ = tokio::time::sleep(std::time::Duration::from_secs(5)) => continue,
                    _ = shutdown.cancelled() => break,
                }
            }
        };

        loop {
            let event = tokio::select! {
                biased;
                _ = shutdown.cancelled() => {
                    let _ = subscription.close().await;
                    return;
                }
                event = subscription.next() => event,
            };

            let Some(event) = event else {
                tracing::warn!(chain = %chain_name, "chain subscription ended, reconnecting");
                break;
            };

            let ctx = CancellationToken::new();
            let receipt = process_event(&processor, &validator, &event, &ctx).await;
            if !receipt.is_success() {
                tracing::warn!(chain = %chain_name, error = ?receipt.error, "batch failed");
            }
            if let Err(e) = receipts.put(&receipt).await {
                tracing::error!(chain = %chain_name, error = %e, "failed to persist receipt");
            }
        }
    }
}
