//! Sequence number (nonce) allocation.
//!
//! The ledger rejects out-of-order nonces, so allocation and submission
//! happen under one async lock: the nonce handed out by
//! [`NonceGuard::allocate`] is only reused by the next holder once the
//! current holder has either submitted or invalidated.
//!
//! The local counter is reconciled with the ledger when it is unknown, and
//! (with stale refresh enabled) when no submission happened for
//! `stale_after`, since other processes may share the account.
//!
//! A guard that allocated a nonce and is released without
//! [`NonceGuard::record_submission`] invalidates the counter, so an
//! aborted submission never leaves a gap.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, MutexGuard};
use tokio::time::Instant;

use crate::ledger::connection::LedgerConnection;
use crate::ledger::types::LedgerResult;
use crate::observability::metrics;
use crate::queue::Clock;

#[derive(Debug)]
struct NonceState {
    /// Next nonce to hand out. `None` until first use or after invalidation.
    next: Option<u64>,
    last_submission_at: Instant,
}

/// Mutex-guarded monotonic nonce counter.
pub struct NonceAllocator {
    state: Mutex<NonceState>,
    stale_refresh: bool,
    stale_after: Duration,
    clock: Arc<dyn Clock>,
}

impl NonceAllocator {
    pub fn new(stale_refresh: bool, stale_after: Duration, clock: Arc<dyn Clock>) -> Self {
        let now = clock.now();
        Self {
            state: Mutex::new(NonceState {
                next: None,
                last_submission_at: now,
            }),
            stale_refresh,
            stale_after,
            clock,
        }
    }

    /// Acquire exclusive access to the counter.
    pub async fn lock(&self) -> NonceGuard<'_> {
        NonceGuard {
            state: self.state.lock().await,
            allocator: self,
            unsubmitted: false,
        }
    }

    /// Forget the local counter so the next allocation reads the ledger.
    ///
    /// Waits for the lock; holders should call [`NonceGuard::invalidate`]
    /// instead.
    pub async fn invalidate(&self) {
        self.lock().await.invalidate();
    }

    /// Current local counter, without allocating.
    pub async fn peek(&self) -> Option<u64> {
        self.state.lock().await.next
    }
}

impl std::fmt::Debug for NonceAllocator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NonceAllocator")
            .field("stale_refresh", &self.stale_refresh)
            .field("stale_after", &self.stale_after)
            .finish()
    }
}

/// Exclusive access to the nonce counter. Released on drop.
pub struct NonceGuard<'a> {
    state: MutexGuard<'a, NonceState>,
    allocator: &'a NonceAllocator,
    /// A nonce was handed out and not yet recorded as submitted.
    unsubmitted: bool,
}

impl NonceGuard<'_> {
    /// Return the next nonce and advance the counter.
    ///
    /// Reads the ledger when the counter is unknown or stale, keeping the
    /// larger of the ledger and local values. On error the counter is left
    /// untouched.
    pub async fn allocate<L>(&mut self, ledger: &L) -> LedgerResult<u64>
    where
        L: LedgerConnection + ?Sized,
    {
        let current = match self.state.next {
            Some(local) if !self.is_stale() => local,
            local => {
                let fetched = ledger.sequence_number().await?;
                let local = local.unwrap_or(0);
                tracing::info!(local, ledger = fetched, "Refreshing nonce");
                metrics::record_nonce_refresh();
                fetched.max(local)
            }
        };

        self.state.next = Some(current + 1);
        self.unsubmitted = true;
        Ok(current)
    }

    /// Note a successful submission; resets the staleness timer.
    pub fn record_submission(&mut self) {
        self.state.last_submission_at = self.allocator.clock.now();
        self.unsubmitted = false;
    }

    pub fn invalidate(&mut self) {
        self.state.next = None;
        self.unsubmitted = false;
    }

    pub fn peek(&self) -> Option<u64> {
        self.state.next
    }

    fn is_stale(&self) -> bool {
        self.allocator.stale_refresh
            && self
                .allocator
                .clock
                .now()
                .saturating_duration_since(self.state.last_submission_at)
                > self.allocator.stale_after
    }
}

impl Drop for NonceGuard<'_> {
    fn drop(&mut self) {
        if self.unsubmitted {
            tracing::warn!(nonce = ?self.state.next, "Nonce released without submission, invalidating");
            self.state.next = None;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::types::{GasPrices, SubmitOptions, SubmittedTx, TxIntent, TxReceipt};
    use crate::ledger::LedgerError;
    use crate::queue::TokioClock;
    use alloy::primitives::{Address, TxHash};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

    #[derive(Default)]
    struct CountingLedger {
        nonce: AtomicU64,
        reads: AtomicUsize,
    }

    #[async_trait]
    impl LedgerConnection for CountingLedger {
        async fn sequence_number(&self) -> LedgerResult<u64> {
            self.reads.fetch_add(1, Ordering::SeqCst);
            Ok(self.nonce.load(Ordering::SeqCst))
        }

        async fn submit(&self, _: &TxIntent, _: &SubmitOptions) -> LedgerResult<SubmittedTx> {
            Err(LedgerError::NotAvailable("read-only".to_string()))
        }

        async fn wait_for_confirmation(&self, _: TxHash) -> LedgerResult<TxReceipt> {
            Err(LedgerError::NotAvailable("read-only".to_string()))
        }

        fn endpoint(&self) -> String {
            "memory".to_string()
        }

        fn account(&self) -> Option<Address> {
            None
        }

        fn gas_prices(&self) -> GasPrices {
            GasPrices::default()
        }
    }

    fn allocator(stale_refresh: bool) -> NonceAllocator {
        NonceAllocator::new(stale_refresh, Duration::from_millis(5_000), Arc::new(TokioClock))
    }

    async fn submit_next(nonces: &NonceAllocator, ledger: &CountingLedger) -> u64 {
        let mut guard = nonces.lock().await;
        let nonce = guard.allocate(ledger).await.unwrap();
        guard.record_submission();
        nonce
    }

    #[tokio::test(start_paused = true)]
    async fn test_first_allocation_reads_ledger_then_counts_locally() {
        let ledger = CountingLedger::default();
        ledger.nonce.store(7, Ordering::SeqCst);
        let nonces = allocator(true);

        let mut guard = nonces.lock().await;
        assert_eq!(guard.allocate(&ledger).await.unwrap(), 7);
        guard.record_submission();
        assert_eq!(guard.allocate(&ledger).await.unwrap(), 8);
        assert_eq!(guard.peek(), Some(9));
        drop(guard);

        assert_eq!(ledger.reads.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_invalidate_forces_refresh() {
        let ledger = CountingLedger::default();
        let nonces = allocator(false);

        assert_eq!(submit_next(&nonces, &ledger).await, 0);
        assert_eq!(nonces.peek().await, Some(1));
        nonces.invalidate().await;
        assert_eq!(nonces.peek().await, None);

        ledger.nonce.store(3, Ordering::SeqCst);
        assert_eq!(submit_next(&nonces, &ledger).await, 3);
        assert_eq!(ledger.reads.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stale_counter_keeps_larger_value() {
        let ledger = CountingLedger::default();
        ledger.nonce.store(2, Ordering::SeqCst);
        let nonces = allocator(true);

        {
            let mut guard = nonces.lock().await;
            for expected in 2..5 {
                assert_eq!(guard.allocate(&ledger).await.unwrap(), expected);
                guard.record_submission();
            }
        }

        tokio::time::advance(Duration::from_millis(5_001)).await;

        // Ledger lags behind the local counter: local wins
        assert_eq!(submit_next(&nonces, &ledger).await, 5);
        assert_eq!(ledger.reads.load(Ordering::SeqCst), 2);

        // Another writer moved the ledger ahead: ledger wins
        tokio::time::advance(Duration::from_millis(5_001)).await;
        ledger.nonce.store(20, Ordering::SeqCst);
        assert_eq!(submit_next(&nonces, &ledger).await, 20);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stale_refresh_disabled() {
        let ledger = CountingLedger::default();
        let nonces = allocator(false);

        assert_eq!(submit_next(&nonces, &ledger).await, 0);
        tokio::time::advance(Duration::from_secs(60)).await;
        assert_eq!(submit_next(&nonces, &ledger).await, 1);
        assert_eq!(ledger.reads.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_guard_released_without_submission_invalidates() {
        let ledger = CountingLedger::default();
        ledger.nonce.store(4, Ordering::SeqCst);
        let nonces = allocator(false);

        assert_eq!(submit_next(&nonces, &ledger).await, 4);
        assert_eq!(nonces.lock().await.allocate(&ledger).await.unwrap(), 5);
        assert_eq!(nonces.peek().await, None);

        // A holder that panics mid-submission releases the lock the same way
        let panicked = std::panic::AssertUnwindSafe(async {
            let mut guard = nonces.lock().await;
            guard.allocate(&ledger).await.unwrap();
            panic!("submission aborted");
        });
        assert!(futures_util::FutureExt::catch_unwind(panicked).await.is_err());
        assert_eq!(nonces.peek().await, None);

        assert_eq!(submit_next(&nonces, &ledger).await, 4);
        assert_eq!(ledger.reads.load(Ordering::SeqCst), 3);
    }
}
