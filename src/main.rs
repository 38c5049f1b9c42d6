//! Transaction executor CLI.
//!
//! # Architecture Overview
//!
//! ```text
//!   intents ──▶ TxExecutor::queue ──▶ RateLimitedScheduler ──▶ execute
//!                                     (throttle + concurrency)   │
//!                                                                ▼
//!                                       NonceAllocator lock ─▶ RpcLedger::submit
//!                                                                │
//!                                                                ▼
//!                                               receipt polling (backoff, failover)
//!
//!   cross-cutting: config (TOML) · tracing · metrics (Prometheus)
//! ```

use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;

use alloy::primitives::{Address, U256};
use clap::{Parser, Subcommand};
use serde_json::json;

use tx_executor::config::{load_config, ExecutorConfig};
use tx_executor::executor::{GasSetting, SharedDiagnostics, TxExecutor, TxHooks, TxLogEvent};
use tx_executor::ledger::{LedgerConnection, RpcLedger, TxIntent, Wallet};
use tx_executor::observability::{logging, metrics};
use tx_executor::Transaction;

#[derive(Parser)]
#[command(name = "tx-executor")]
#[command(about = "Rate-limited transaction executor", long_about = None)]
struct Cli {
    /// TOML configuration file. Defaults apply when omitted.
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the account's next nonce as reported by the ledger
    Nonce,
    /// Queue value transfers and wait for their confirmation
    Send {
        /// Recipient address
        #[arg(long)]
        to: String,

        /// Value per transfer, in wei
        #[arg(long, default_value_t = 0)]
        value_wei: u128,

        /// Number of transfers to queue
        #[arg(long, default_value_t = 1)]
        count: u32,

        /// slow, average, fast or a price in gwei
        #[arg(long, default_value = "average")]
        gas: GasSetting,
    },
}

/// Prints every finished transaction as a JSON line.
struct JsonLogHooks;

#[async_trait::async_trait]
impl TxHooks for JsonLogHooks {
    async fn after_transaction(&self, _tx: &Transaction, event: &TxLogEvent) {
        match serde_json::to_string(event) {
            Ok(line) => println!("{line}"),
            Err(err) => tracing::warn!(error = %err, "Failed to encode transaction log event"),
        }
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => load_config(path)?,
        None => ExecutorConfig::default(),
    };

    logging::init(&config.observability.log_level);
    tracing::info!("tx-executor v{} starting", env!("CARGO_PKG_VERSION"));

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse::<SocketAddr>() {
            Ok(addr) => metrics::init_metrics(addr)?,
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    let wallet = Wallet::from_env(config.ledger.chain_id)?;
    let ledger = RpcLedger::new(config.ledger.clone(), Some(wallet)).await?;
    ledger.verify_chain_id().await?;

    match cli.command {
        Commands::Nonce => {
            let nonce = ledger.sequence_number().await?;
            let output = json!({
                "account": ledger.account(),
                "endpoint": ledger.endpoint(),
                "nonce": nonce,
            });
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
        Commands::Send {
            to,
            value_wei,
            count,
            gas,
        } => {
            let to = Address::from_str(&to)?;
            let executor = TxExecutor::builder(Arc::new(ledger))
                .config(&config)
                .gas_setting_provider(Arc::new(move |_: &TxIntent| gas))
                .hooks(Arc::new(JsonLogHooks))
                .build()?;
            let diagnostics = SharedDiagnostics::new();
            executor.set_diagnostic_updater(Arc::new(diagnostics.clone()));

            let mut transactions = Vec::with_capacity(count as usize);
            for _ in 0..count {
                let intent = TxIntent::transfer(to, U256::from(value_wei));
                transactions.push(executor.queue(intent, None).await?);
            }
            tracing::info!(count, "Transfers queued");

            let mut failed = 0usize;
            for tx in &transactions {
                if let Err(err) = tx.confirmed().await {
                    failed += 1;
                    tracing::error!(tx_id = %tx.id(), error = %err, "Transfer failed");
                }
            }

            let output = json!({
                "diagnostics": diagnostics.snapshot(),
                "confirmed": transactions.len() - failed,
                "failed": failed,
            });
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
    }

    tracing::info!("Done");
    Ok(())
}
