//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! Executor, scheduler and ledger client produce:
//!     → logging.rs (structured log events via tracing)
//!     → metrics.rs (counters, gauges, histograms via the metrics facade)
//!
//! Consumers:
//!     → stdout log output (RUST_LOG / configured level)
//!     → Prometheus scrape endpoint (optional)
//! ```
//!
//! # Design Decisions
//! - Structured fields (tx_id, nonce, tx_hash) on every transaction event
//! - Metric updates are no-ops until a recorder is installed

pub mod logging;
pub mod metrics;
