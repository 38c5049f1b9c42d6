//! Transaction executor.
//!
//! # Responsibilities
//! - Turn intents into tracked [`Transaction`]s and hand them to the scheduler
//! - Assign nonces in lock order and submit under a deadline
//! - Follow each transaction to confirmation and settle its futures
//! - Report counters and timing to the diagnostics updater and hooks
//!
//! The nonce lock covers allocation and the submit call only. Confirmation
//! waits happen outside it, so one slow block does not stall dispatch.

use alloy::primitives::TxHash;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;
use tokio::time::Instant;

use crate::config::schema::{ExecutorConfig, SubmissionConfig};
use crate::executor::diagnostics::{Diagnostics, DiagnosticsUpdater};
use crate::executor::gas::{resolve_gas_price, GasSetting, GasSettingProvider};
use crate::executor::hooks::{NoHooks, TxHooks, TxLogEvent};
use crate::executor::nonce::NonceAllocator;
use crate::executor::transaction::{unix_millis, Settlement, Transaction};
use crate::executor::types::{ExecutorError, PersistedTransaction, TxError, TxId, TxState};
use crate::ledger::connection::LedgerConnection;
use crate::ledger::types::{SubmitOptions, TxIntent, TxOverrides, TxReceipt};
use crate::observability::metrics;
use crate::queue::{Clock, RateLimitedScheduler, SchedulerConfig, TokioClock};

/// Submission defaults applied to every transaction.
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutorSettings {
    /// Deadline for the ledger to accept a submit call.
    pub submit_timeout: Duration,
    /// Gas limit used unless overridden.
    pub default_gas_limit: u64,
    /// Cap for auto gas prices, in gwei.
    pub max_gas_price_gwei: f64,
}

impl Default for ExecutorSettings {
    fn default() -> Self {
        Self {
            submit_timeout: Duration::from_millis(30_000),
            default_gas_limit: 2_000_000,
            max_gas_price_gwei: 15.0,
        }
    }
}

impl From<&SubmissionConfig> for ExecutorSettings {
    fn from(config: &SubmissionConfig) -> Self {
        Self {
            submit_timeout: Duration::from_millis(config.timeout_ms),
            default_gas_limit: config.default_gas_limit,
            max_gas_price_gwei: config.max_gas_price_gwei,
        }
    }
}

struct Inner<L> {
    ledger: Arc<L>,
    scheduler: RateLimitedScheduler<TxId>,
    nonces: NonceAllocator,
    gas_setting_provider: GasSettingProvider,
    hooks: Arc<dyn TxHooks>,
    settings: ExecutorSettings,
    clock: Arc<dyn Clock>,
    id_sequence: AtomicU64,
    diagnostics: RwLock<Option<Arc<dyn DiagnosticsUpdater>>>,
}

/// Queues, submits and tracks transactions against one ledger account.
///
/// Cloning is cheap; clones share the same queue and nonce counter.
pub struct TxExecutor<L> {
    inner: Arc<Inner<L>>,
}

impl<L> Clone for TxExecutor<L> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<L: LedgerConnection> TxExecutor<L> {
    /// Executor with default throttle, nonce and submission settings.
    pub fn new(ledger: Arc<L>) -> Result<Self, ExecutorError> {
        Self::builder(ledger).build()
    }

    pub fn builder(ledger: Arc<L>) -> TxExecutorBuilder<L> {
        TxExecutorBuilder::new(ledger)
    }

    /// Create a transaction for `intent` and queue it for execution.
    ///
    /// Returns as soon as the transaction is queued; its `submitted` and
    /// `confirmed` futures settle later.
    ///
    /// # Errors
    /// `ExecutorError::Rejected` if the `before_queued` hook refuses the
    /// intent. No transaction is created in that case.
    pub async fn queue(
        &self,
        intent: TxIntent,
        overrides: Option<TxOverrides>,
    ) -> Result<Transaction, ExecutorError> {
        let inner = &self.inner;
        let id = inner.next_id();

        inner
            .hooks
            .before_queued(id, &intent, overrides.as_ref())
            .await
            .map_err(|err| ExecutorError::Rejected(err.to_string()))?;

        let gas_setting = (inner.gas_setting_provider)(&intent);
        let mut overrides = overrides.unwrap_or_default();
        if overrides.gas_price.is_none() {
            overrides.gas_price = Some(resolve_gas_price(
                gas_setting,
                &inner.ledger.gas_prices(),
                inner.settings.max_gas_price_gwei,
            ));
        }

        let (tx, settlement) = Transaction::new(id, intent, overrides, Some(gas_setting));
        inner.update_diagnostics(|d| d.transactions_in_queue += 1);

        let job_inner = Arc::clone(inner);
        let job_tx = tx.clone();
        // Outcomes flow through the transaction's futures, not the task handle
        let _handle = inner.scheduler.submit(
            move || async move {
                job_inner.update_diagnostics(|d| {
                    d.transactions_in_queue = d.transactions_in_queue.saturating_sub(1)
                });
                job_inner.execute(job_tx, settlement).await;
            },
            Some(id),
        );

        tracing::debug!(
            tx_id = %id,
            method = %tx.intent().method,
            to = %tx.intent().to,
            gas_setting = ?gas_setting,
            "Transaction queued"
        );
        Ok(tx)
    }

    /// Remove a transaction that has not started executing.
    ///
    /// Its futures resolve with `TxError::Cancelled`.
    ///
    /// # Errors
    /// `QueueError::TaskNotFound` if the transaction already started or
    /// belongs to another executor.
    pub fn dequeue(&self, tx: &Transaction) -> Result<(), ExecutorError> {
        let id = tx.id();
        self.inner.scheduler.cancel(|candidate| *candidate == id)?;
        tx.transition(TxState::Cancel);
        self.inner.update_diagnostics(|d| {
            d.transactions_in_queue = d.transactions_in_queue.saturating_sub(1)
        });

        tracing::info!(tx_id = %id, "Transaction dequeued");
        Ok(())
    }

    /// Move a pending transaction ahead of every other pending transaction.
    ///
    /// # Errors
    /// `QueueError::TaskNotFound` if the transaction already started.
    pub fn prioritize(&self, tx: &Transaction) -> Result<(), ExecutorError> {
        let id = tx.id();
        self.inner.scheduler.prioritize(|candidate| *candidate == id)?;
        tx.transition(TxState::Prioritized);

        tracing::debug!(tx_id = %id, "Transaction prioritized");
        Ok(())
    }

    /// Track a transaction that was submitted elsewhere, without
    /// re-submitting it.
    ///
    /// `submitted` resolves immediately with the known hash; `confirmed`
    /// follows the ledger.
    pub fn wait_for_transaction(&self, persisted: PersistedTransaction) -> Transaction {
        let inner = &self.inner;
        let id = inner.next_id();
        let hash = persisted.hash;

        let (tx, mut settlement) =
            Transaction::new(id, persisted.intent, TxOverrides::default(), None);
        tx.transition(TxState::Submit);
        tx.record_hash(hash);
        settlement.arm();
        let pending = settlement.submitted(hash);

        let watch_inner = Arc::clone(inner);
        let watched = tx.clone();
        tokio::spawn(async move {
            match watch_inner.await_receipt(id, hash).await {
                Ok(receipt) => {
                    watched.transition(TxState::Confirm);
                    tracing::info!(tx_id = %id, tx_hash = %hash, "Recovered transaction confirmed");
                    pending.confirmed(receipt);
                }
                Err(err) => {
                    watched.transition(TxState::Fail);
                    tracing::warn!(tx_id = %id, tx_hash = %hash, error = %err, "Recovered transaction failed");
                    pending.fail(err);
                }
            }
        });

        tracing::info!(tx_id = %id, tx_hash = %hash, "Waiting for recovered transaction");
        tx
    }

    /// Install the sink for queue and submission counters, replacing any
    /// previous one.
    pub fn set_diagnostic_updater(&self, updater: Arc<dyn DiagnosticsUpdater>) {
        *self
            .inner
            .diagnostics
            .write()
            .expect("diagnostics lock poisoned") = Some(updater);
    }

    /// Transactions queued but not yet executing.
    pub fn pending_count(&self) -> usize {
        self.inner.scheduler.pending_count()
    }

    /// Next nonce the executor would use, or `None` if it must be read from
    /// the ledger first.
    pub async fn current_nonce(&self) -> Option<u64> {
        self.inner.nonces.peek().await
    }

    pub fn ledger(&self) -> &Arc<L> {
        &self.inner.ledger
    }
}

impl<L: LedgerConnection> Inner<L> {
    fn next_id(&self) -> TxId {
        TxId(self.id_sequence.fetch_add(1, Ordering::Relaxed) + 1)
    }

    fn update_diagnostics(&self, mut update: impl FnMut(&mut Diagnostics)) {
        let updater = self
            .diagnostics
            .read()
            .expect("diagnostics lock poisoned")
            .clone();
        if let Some(updater) = updater {
            updater.update_diagnostics(&mut update);
        }
    }

    /// Body of every scheduled task.
    ///
    /// If this future panics or is dropped midway, the armed settlement
    /// fails the transaction and the nonce guard invalidates the counter.
    async fn execute(&self, tx: Transaction, mut settlement: Settlement) {
        let id = tx.id();
        let exec_started = self.clock.now();
        let mut event = TxLogEvent::new(
            &tx,
            unix_millis(),
            self.ledger.endpoint(),
            self.ledger.account(),
        );

        tx.transition(TxState::Processing);
        settlement.arm();
        if let Err(err) = self.hooks.before_transaction(&tx).await {
            tracing::warn!(tx_id = %id, error = %err, "before_transaction hook failed");
        }

        let submit_started = self.clock.now();
        match self.submit(&tx).await {
            Ok(hash) => {
                let wait_submit = self.elapsed_since(submit_started);
                metrics::record_submission("success", Some(wait_submit));
                event.tx_hash = Some(hash);
                event.wait_submit = Some(wait_submit.as_millis() as u64);

                tx.transition(TxState::Submit);
                tx.record_hash(hash);
                let pending = settlement.submitted(hash);

                match self.await_receipt(id, hash).await {
                    Ok(receipt) => {
                        let wait_confirm = self.elapsed_since(submit_started);
                        metrics::record_confirmation("success", Some(wait_confirm));
                        event.wait_confirm = Some(wait_confirm.as_millis() as u64);

                        tx.transition(TxState::Confirm);
                        tracing::info!(
                            tx_id = %id,
                            tx_hash = %hash,
                            block_number = ?receipt.block_number,
                            gas_used = receipt.gas_used,
                            "Transaction confirmed"
                        );
                        pending.confirmed(receipt);
                    }
                    Err(err) => {
                        // The nonce may have been consumed or skipped
                        self.nonces.invalidate().await;
                        metrics::record_confirmation("failure", None);
                        event.error = Some(err.to_string());
                        event.wait_error = Some(self.elapsed_since(exec_started).as_millis() as u64);

                        tx.transition(TxState::Fail);
                        tracing::warn!(tx_id = %id, tx_hash = %hash, error = %err, "Transaction failed");
                        pending.fail(err);
                    }
                }
            }
            Err(err) => {
                let outcome = match err {
                    TxError::SubmissionTimeout { .. } => "timeout",
                    _ => "error",
                };
                metrics::record_submission(outcome, None);
                event.error = Some(err.to_string());
                event.wait_error = Some(self.elapsed_since(exec_started).as_millis() as u64);

                tx.transition(TxState::Fail);
                tracing::error!(tx_id = %id, error = %err, "Transaction submission failed");
                settlement.fail(err);
            }
        }

        self.update_diagnostics(|d| d.total_transactions += 1);
        self.hooks.after_transaction(&tx, &event).await;
    }

    /// Allocate a nonce and submit, holding the nonce lock throughout.
    ///
    /// Any failure invalidates the counter before the lock is released.
    async fn submit(&self, tx: &Transaction) -> Result<TxHash, TxError> {
        let id = tx.id();
        let mut nonces = self.nonces.lock().await;

        let nonce = match nonces.allocate(self.ledger.as_ref()).await {
            Ok(nonce) => nonce,
            Err(err) => {
                nonces.invalidate();
                return Err(TxError::Submission {
                    id,
                    reason: format!("nonce lookup failed: {err}"),
                });
            }
        };

        let options = SubmitOptions {
            nonce,
            gas_limit: tx
                .overrides()
                .gas_limit
                .unwrap_or(self.settings.default_gas_limit),
            gas_price: tx.overrides().gas_price,
        };
        tracing::debug!(tx_id = %id, nonce, gas_limit = options.gas_limit, "Submitting transaction");

        let deadline = self.clock.now() + self.settings.submit_timeout;
        let outcome = tokio::select! {
            biased;
            result = self.ledger.submit(tx.intent(), &options) => {
                result.map_err(|err| TxError::Submission { id, reason: err.to_string() })
            }
            _ = self.clock.sleep_until(deadline) => Err(TxError::SubmissionTimeout {
                id,
                timeout_ms: self.settings.submit_timeout.as_millis() as u64,
            }),
        };

        match outcome {
            Ok(submitted) => {
                nonces.record_submission();
                tracing::info!(tx_id = %id, nonce, tx_hash = %submitted.hash, "Transaction submitted");
                Ok(submitted.hash)
            }
            Err(err) => {
                nonces.invalidate();
                Err(err)
            }
        }
    }

    /// Wait for inclusion. A reverted receipt or a ledger error is a
    /// confirmation failure.
    async fn await_receipt(&self, id: TxId, hash: TxHash) -> Result<TxReceipt, TxError> {
        match self.ledger.wait_for_confirmation(hash).await {
            Ok(receipt) if receipt.success => Ok(receipt),
            Ok(receipt) => Err(TxError::ConfirmationFailure {
                id,
                reason: match receipt.block_number {
                    Some(block) => format!("reverted in block {block}"),
                    None => "reverted".to_string(),
                },
            }),
            Err(err) => Err(TxError::ConfirmationFailure {
                id,
                reason: err.to_string(),
            }),
        }
    }

    fn elapsed_since(&self, start: Instant) -> Duration {
        self.clock.now().saturating_duration_since(start)
    }
}

/// Builder for [`TxExecutor`].
pub struct TxExecutorBuilder<L> {
    ledger: Arc<L>,
    gas_setting_provider: GasSettingProvider,
    hooks: Arc<dyn TxHooks>,
    scheduler_config: SchedulerConfig,
    settings: ExecutorSettings,
    stale_refresh: bool,
    stale_after: Duration,
    clock: Arc<dyn Clock>,
}

impl<L: LedgerConnection> TxExecutorBuilder<L> {
    pub fn new(ledger: Arc<L>) -> Self {
        Self {
            ledger,
            gas_setting_provider: Arc::new(|_: &TxIntent| GasSetting::Average),
            hooks: Arc::new(NoHooks),
            scheduler_config: SchedulerConfig::default(),
            settings: ExecutorSettings::default(),
            stale_refresh: true,
            stale_after: Duration::from_millis(5_000),
            clock: Arc::new(TokioClock),
        }
    }

    /// Apply every section of a loaded configuration file.
    pub fn config(mut self, config: &ExecutorConfig) -> Self {
        self.scheduler_config = config.queue.scheduler_config();
        self.settings = ExecutorSettings::from(&config.submission);
        self.stale_refresh = config.nonce.stale_refresh;
        self.stale_after = Duration::from_millis(config.nonce.stale_after_ms);
        self
    }

    pub fn gas_setting_provider(mut self, provider: GasSettingProvider) -> Self {
        self.gas_setting_provider = provider;
        self
    }

    pub fn hooks(mut self, hooks: Arc<dyn TxHooks>) -> Self {
        self.hooks = hooks;
        self
    }

    pub fn scheduler_config(mut self, config: SchedulerConfig) -> Self {
        self.scheduler_config = config;
        self
    }

    pub fn settings(mut self, settings: ExecutorSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Re-read the ledger nonce after `stale_after` without submissions.
    pub fn stale_refresh(mut self, enabled: bool) -> Self {
        self.stale_refresh = enabled;
        self
    }

    pub fn stale_after(mut self, stale_after: Duration) -> Self {
        self.stale_after = stale_after;
        self
    }

    /// Time source for throttling, submit deadlines and staleness.
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// # Errors
    /// `QueueError::InvalidConfig` if the scheduler limits are invalid.
    pub fn build(self) -> Result<TxExecutor<L>, ExecutorError> {
        let scheduler =
            RateLimitedScheduler::with_clock(self.scheduler_config, Arc::clone(&self.clock))?;
        let nonces = NonceAllocator::new(self.stale_refresh, self.stale_after, Arc::clone(&self.clock));

        Ok(TxExecutor {
            inner: Arc::new(Inner {
                ledger: self.ledger,
                scheduler,
                nonces,
                gas_setting_provider: self.gas_setting_provider,
                hooks: self.hooks,
                settings: self.settings,
                clock: self.clock,
                id_sequence: AtomicU64::new(0),
                diagnostics: RwLock::new(None),
            }),
        })
    }
}
