//! Rate-limited transaction executor.
//!
//! Queues ledger transactions behind a sliding-window throttle, assigns
//! sequence numbers (nonces) under a lock, and tracks every transaction from
//! submission to confirmation.

pub mod config;
pub mod executor;
pub mod ledger;
pub mod observability;
pub mod queue;
pub mod resilience;

pub use config::schema::ExecutorConfig;
pub use executor::{Transaction, TxExecutor};
pub use ledger::{LedgerConnection, RpcLedger};
pub use queue::RateLimitedScheduler;
