//! Ledger-facing types and error definitions.

use alloy::primitives::{Address, Bytes, TxHash, U256};
use serde::{Deserialize, Serialize};
use thiserror::Error;

// Re-export LedgerConfig from config module to avoid duplication
pub use crate::config::schema::LedgerConfig;

/// Chain ID type for strong typing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ChainId(pub u64);

impl From<u64> for ChainId {
    fn from(id: u64) -> Self {
        Self(id)
    }
}

impl From<ChainId> for u64 {
    fn from(id: ChainId) -> Self {
        id.0
    }
}

/// Errors that can occur while talking to the ledger.
#[derive(Debug, Clone, Error)]
pub enum LedgerError {
    /// RPC connection or request failed.
    #[error("RPC error: {0}")]
    Rpc(String),

    /// RPC request timed out.
    #[error("RPC timeout after {0} seconds")]
    Timeout(u64),

    /// No receipt was found within the polling budget.
    #[error("Transaction receipt not found after {0} attempts")]
    ReceiptNotFound(u32),

    /// Invalid private key format or signing error.
    #[error("Wallet error: {0}")]
    Wallet(String),

    /// Chain configuration mismatch.
    #[error("Chain ID mismatch: expected {expected}, got {actual}")]
    ChainMismatch { expected: u64, actual: u64 },

    /// Ledger client not initialized or missing a capability.
    #[error("Ledger not available: {0}")]
    NotAvailable(String),
}

/// Result type for ledger operations.
pub type LedgerResult<T> = Result<T, LedgerError>;

/// Caller-supplied description of an operation, before it is tracked.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxIntent {
    /// Target contract or account.
    pub to: Address,
    /// Method label used for logs and diagnostics.
    pub method: String,
    /// ABI-encoded call data.
    pub calldata: Bytes,
    /// Native value attached to the call.
    pub value: U256,
}

impl TxIntent {
    /// Contract call carrying pre-encoded call data.
    pub fn call(to: Address, method: impl Into<String>, calldata: Bytes) -> Self {
        Self {
            to,
            method: method.into(),
            calldata,
            value: U256::ZERO,
        }
    }

    /// Plain value transfer.
    pub fn transfer(to: Address, value: U256) -> Self {
        Self {
            to,
            method: "transfer".to_string(),
            calldata: Bytes::new(),
            value,
        }
    }
}

/// Per-transaction overrides of the executor defaults.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxOverrides {
    pub gas_limit: Option<u64>,
    /// Gas price in wei. When unset the executor fills it from the gas setting.
    pub gas_price: Option<u128>,
}

/// Fully resolved options for one submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmitOptions {
    pub nonce: u64,
    pub gas_limit: u64,
    pub gas_price: Option<u128>,
}

/// Acknowledgement that the ledger accepted a submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubmittedTx {
    pub hash: TxHash,
}

/// Outcome of an included operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TxReceipt {
    pub hash: TxHash,
    pub block_number: Option<u64>,
    pub gas_used: u64,
    /// `false` when the operation was reverted.
    pub success: bool,
}

/// Gas prices in gwei for the auto gas settings.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GasPrices {
    pub slow: f64,
    pub average: f64,
    pub fast: f64,
}

impl Default for GasPrices {
    fn default() -> Self {
        Self {
            slow: 1.0,
            average: 3.0,
            fast: 10.0,
        }
    }
}
