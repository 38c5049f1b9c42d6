//! Ledger collaborator subsystem.
//!
//! # Data Flow
//! ```text
//! Environment Variables (private key) + [ledger] config (RPC URLs)
//!     → wallet.rs (key loading, signing wallet)
//!     → client.rs (RpcLedger: failover reads, signed submits, receipt polling)
//!     → connection.rs (LedgerConnection trait consumed by the executor)
//! ```
//!
//! # Security Constraints
//! - Private keys ONLY from environment variables
//! - Never log private keys or sensitive data
//! - All read calls have configurable timeouts

pub mod client;
pub mod connection;
pub mod types;
pub mod wallet;

pub use client::RpcLedger;
pub use connection::LedgerConnection;
pub use types::{
    ChainId, GasPrices, LedgerConfig, LedgerError, LedgerResult, SubmitOptions, SubmittedTx,
    TxIntent, TxOverrides, TxReceipt,
};
pub use wallet::Wallet;
