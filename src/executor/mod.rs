//! Transaction execution subsystem.
//!
//! # Data Flow
//! ```text
//! queue(intent, overrides)
//!     → hooks.rs (before_queued may reject)
//!     → gas.rs (gas setting → gas price)
//!     → transaction.rs (Transaction in Init + settlement)
//!     → queue::RateLimitedScheduler (throttled dispatch)
//!     → orchestrator.rs execute:
//!         nonce.rs lock → allocate → ledger submit (deadline) → unlock
//!         → submitted future → ledger confirmation → confirmed future
//!     → diagnostics.rs counters, hooks.rs after_transaction(TxLogEvent)
//! ```
//!
//! # Design Decisions
//! - Nonces are assigned in lock acquisition order, not queue order
//! - Every failure before or after submission invalidates the local nonce,
//!   so the next allocation re-reads the ledger
//! - Errors reach callers only through the transaction's futures; one
//!   failed transaction never stops the queue

pub mod collection;
pub mod diagnostics;
pub mod gas;
pub mod hooks;
pub mod nonce;
pub mod orchestrator;
pub mod transaction;
pub mod types;

pub use collection::TxCollection;
pub use diagnostics::{Diagnostics, DiagnosticsUpdater, SharedDiagnostics};
pub use gas::{resolve_gas_price, GasSetting, GasSettingProvider};
pub use hooks::{HookError, NoHooks, TxHooks, TxLogEvent};
pub use nonce::{NonceAllocator, NonceGuard};
pub use orchestrator::{ExecutorSettings, TxExecutor, TxExecutorBuilder};
pub use transaction::Transaction;
pub use types::{ExecutorError, PersistedTransaction, TxError, TxId, TxState};
