//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the executor.
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::ledger::types::GasPrices;
use crate::queue::SchedulerConfig;
use crate::resilience::BackoffPolicy;

/// Root configuration for the transaction executor.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct ExecutorConfig {
    /// Throttle and concurrency limits for dispatch.
    pub queue: QueueConfig,

    /// Sequence number refresh policy.
    pub nonce: NonceConfig,

    /// Submission defaults and deadline.
    pub submission: SubmissionConfig,

    /// Ledger endpoint settings.
    pub ledger: LedgerConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Dispatch throttle configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct QueueConfig {
    /// Length of the throttle window in milliseconds.
    pub interval_ms: u64,

    /// Task starts allowed per window (a count).
    pub max_invocations_per_interval: usize,

    /// Maximum simultaneously running transactions. `None` (only reachable
    /// when built in code) means unbounded.
    pub max_concurrency: Option<usize>,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            interval_ms: 200,
            max_invocations_per_interval: 3,
            max_concurrency: Some(10),
        }
    }
}

impl QueueConfig {
    pub fn scheduler_config(&self) -> SchedulerConfig {
        SchedulerConfig {
            interval: Duration::from_millis(self.interval_ms),
            max_invocations_per_interval: self.max_invocations_per_interval,
            max_concurrency: self.max_concurrency,
        }
    }
}

/// Sequence number configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct NonceConfig {
    /// Re-read the ledger nonce when no submission happened recently.
    /// Needed when other processes share the account.
    pub stale_refresh: bool,

    /// Idle time after which the local nonce is considered stale.
    pub stale_after_ms: u64,
}

impl Default for NonceConfig {
    fn default() -> Self {
        Self {
            stale_refresh: true,
            stale_after_ms: 5_000,
        }
    }
}

/// Submission configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SubmissionConfig {
    /// Deadline for a submit call to be accepted by the ledger.
    pub timeout_ms: u64,

    /// Gas limit used unless a transaction overrides it.
    pub default_gas_limit: u64,

    /// Cap applied to auto gas prices, in gwei.
    pub max_gas_price_gwei: f64,
}

impl Default for SubmissionConfig {
    fn default() -> Self {
        Self {
            timeout_ms: 30_000,
            default_gas_limit: 2_000_000,
            max_gas_price_gwei: 15.0,
        }
    }
}

/// Ledger JSON-RPC configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LedgerConfig {
    /// JSON-RPC endpoint URL.
    pub rpc_url: String,

    /// Failover JSON-RPC endpoint URLs, used for reads.
    pub failover_urls: Vec<String>,

    /// Chain ID (e.g., 1 for Ethereum mainnet, 31337 for local Anvil).
    pub chain_id: u64,

    /// RPC request timeout in seconds.
    pub rpc_timeout_secs: u64,

    /// Number of block confirmations required for finality.
    pub confirmation_blocks: u32,

    /// Receipt polling retries before giving up.
    pub receipt_retries: u32,

    pub receipt_min_backoff_ms: u64,

    pub receipt_max_backoff_ms: u64,

    pub receipt_backoff_factor: f64,

    /// Initial gas prices (gwei) for the auto gas settings.
    pub gas_prices: GasPrices,
}

impl LedgerConfig {
    pub fn receipt_backoff(&self) -> BackoffPolicy {
        BackoffPolicy {
            retries: self.receipt_retries,
            min_delay_ms: self.receipt_min_backoff_ms,
            max_delay_ms: self.receipt_max_backoff_ms,
            factor: self.receipt_backoff_factor,
        }
    }
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            rpc_url: "http://localhost:8545".to_string(),
            failover_urls: Vec::new(),
            chain_id: 1,
            rpc_timeout_secs: 10,
            confirmation_blocks: 1,
            receipt_retries: 12,
            receipt_min_backoff_ms: 2_000,
            receipt_max_backoff_ms: 60_000,
            receipt_backoff_factor: 1.5,
            gas_prices: GasPrices::default(),
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            metrics_enabled: false,
            metrics_address: "127.0.0.1:9090".to_string(),
        }
    }
}
