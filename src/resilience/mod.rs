//! Resilience helpers for ledger calls.
//!
//! # Data Flow
//! ```text
//! Receipt polling (ledger/client.rs):
//!     → receipt missing or RPC failed
//!     → backoff.rs (next delay, growing by the configured factor)
//!     → poll again until the retry budget is spent
//! ```
//!
//! # Design Decisions
//! - Timeouts are non-negotiable; every external call has a deadline
//! - Submissions are never retried here; a failed submit surfaces to the
//!   caller, who decides whether to queue again

pub mod backoff;

pub use backoff::{calculate_backoff, BackoffPolicy};
