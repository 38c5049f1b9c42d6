//! Transaction handle and its one-shot settlement.
//!
//! A [`Transaction`] is shared between the caller and the executor. Its
//! `submitted` and `confirmed` futures are fed by a [`Settlement`] that the
//! executor owns; settling consumes the settlement, so each future receives
//! exactly one value and `submitted` always settles first.
//!
//! Once execution starts the settlement is armed: if it is dropped unsettled
//! (the executing task panicked or was aborted) the transaction moves to
//! `Fail` and both futures receive an error instead of `Cancelled`.

use alloy::primitives::TxHash;
use futures_util::future::{BoxFuture, FutureExt, Shared};
use std::fmt;
use std::sync::{Arc, Mutex};
use std::time::{SystemTime, UNIX_EPOCH};
use tokio::sync::oneshot;

use crate::executor::gas::GasSetting;
use crate::executor::types::{TxError, TxId, TxState};
use crate::ledger::types::{TxIntent, TxOverrides, TxReceipt};

type SubmittedResult = Result<TxHash, TxError>;
type ConfirmedResult = Result<TxReceipt, TxError>;

#[derive(Debug)]
struct TxRecord {
    state: TxState,
    hash: Option<TxHash>,
    /// Milliseconds since the Unix epoch.
    last_updated_at: u64,
}

struct TxInner {
    id: TxId,
    intent: TxIntent,
    overrides: TxOverrides,
    gas_setting: Option<GasSetting>,
    record: Mutex<TxRecord>,
    submitted: Shared<BoxFuture<'static, SubmittedResult>>,
    confirmed: Shared<BoxFuture<'static, ConfirmedResult>>,
}

/// A queued transaction, tracked through its lifecycle.
///
/// Cloning is cheap; clones observe the same state and futures.
#[derive(Clone)]
pub struct Transaction {
    inner: Arc<TxInner>,
}

impl Transaction {
    /// Build a transaction in state `Init` together with the settlement
    /// that completes its futures.
    pub(crate) fn new(
        id: TxId,
        intent: TxIntent,
        overrides: TxOverrides,
        gas_setting: Option<GasSetting>,
    ) -> (Self, Settlement) {
        let (submitted_tx, submitted_rx) = oneshot::channel::<SubmittedResult>();
        let (confirmed_tx, confirmed_rx) = oneshot::channel::<ConfirmedResult>();

        // A dropped settlement means the transaction was dequeued
        let submitted = async move {
            submitted_rx
                .await
                .unwrap_or(Err(TxError::Cancelled { id }))
        }
        .boxed()
        .shared();
        let confirmed = async move {
            confirmed_rx
                .await
                .unwrap_or(Err(TxError::Cancelled { id }))
        }
        .boxed()
        .shared();

        let tx = Self {
            inner: Arc::new(TxInner {
                id,
                intent,
                overrides,
                gas_setting,
                record: Mutex::new(TxRecord {
                    state: TxState::Init,
                    hash: None,
                    last_updated_at: unix_millis(),
                }),
                submitted,
                confirmed,
            }),
        };
        let settlement = Settlement {
            tx: tx.clone(),
            submitted: Some(submitted_tx),
            confirmed: Some(confirmed_tx),
            armed: false,
        };

        (tx, settlement)
    }

    pub fn id(&self) -> TxId {
        self.inner.id
    }

    pub fn intent(&self) -> &TxIntent {
        &self.inner.intent
    }

    /// Overrides as sent, including the resolved gas price.
    pub fn overrides(&self) -> &TxOverrides {
        &self.inner.overrides
    }

    /// Gas setting chosen when queued. `None` for recovered transactions.
    pub fn gas_setting(&self) -> Option<GasSetting> {
        self.inner.gas_setting
    }

    pub fn state(&self) -> TxState {
        self.lock().state
    }

    /// Hash assigned by the ledger once submitted.
    pub fn hash(&self) -> Option<TxHash> {
        self.lock().hash
    }

    /// Milliseconds since the Unix epoch of the last state change.
    pub fn last_updated_at(&self) -> u64 {
        self.lock().last_updated_at
    }

    /// Resolves with the hash once the ledger accepted the submission.
    pub fn submitted(&self) -> Shared<BoxFuture<'static, SubmittedResult>> {
        self.inner.submitted.clone()
    }

    /// Resolves with the receipt once the transaction is confirmed.
    pub fn confirmed(&self) -> Shared<BoxFuture<'static, ConfirmedResult>> {
        self.inner.confirmed.clone()
    }

    /// Move to `next` if it is a forward transition. Returns whether the
    /// state changed.
    pub(crate) fn transition(&self, next: TxState) -> bool {
        let mut record = self.lock();
        if !record.state.can_transition_to(next) {
            tracing::debug!(
                tx_id = %self.inner.id,
                from = %record.state,
                to = %next,
                "Ignoring backward state transition"
            );
            return false;
        }
        record.state = next;
        record.last_updated_at = unix_millis();
        true
    }

    pub(crate) fn record_hash(&self, hash: TxHash) {
        self.lock().hash = Some(hash);
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, TxRecord> {
        self.inner.record.lock().expect("transaction record mutex poisoned")
    }
}

impl fmt::Debug for Transaction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let record = self.lock();
        f.debug_struct("Transaction")
            .field("id", &self.inner.id)
            .field("method", &self.inner.intent.method)
            .field("to", &self.inner.intent.to)
            .field("state", &record.state)
            .field("hash", &record.hash)
            .finish()
    }
}

/// Sending half of a transaction's futures, before submission.
#[derive(Debug)]
pub(crate) struct Settlement {
    tx: Transaction,
    submitted: Option<oneshot::Sender<SubmittedResult>>,
    confirmed: Option<oneshot::Sender<ConfirmedResult>>,
    armed: bool,
}

impl Settlement {
    /// Treat a later unsettled drop as an aborted execution.
    pub(crate) fn arm(&mut self) {
        self.armed = true;
    }

    /// Resolve `submitted` and hand back the confirmation half.
    pub(crate) fn submitted(mut self, hash: TxHash) -> PendingConfirmation {
        // Receivers live inside the shared futures, which outlive the send
        if let Some(sender) = self.submitted.take() {
            let _ = sender.send(Ok(hash));
        }
        PendingConfirmation {
            tx: self.tx.clone(),
            confirmed: self.confirmed.take(),
            armed: self.armed,
        }
    }

    /// Fail before submission. `confirmed` resolves with the same error
    /// after `submitted` does.
    pub(crate) fn fail(mut self, error: TxError) {
        self.settle_err(error);
    }

    fn settle_err(&mut self, error: TxError) {
        if let Some(sender) = self.submitted.take() {
            let _ = sender.send(Err(error.clone()));
        }
        if let Some(sender) = self.confirmed.take() {
            let _ = sender.send(Err(error));
        }
    }
}

impl Drop for Settlement {
    fn drop(&mut self) {
        if !self.armed || self.submitted.is_none() {
            return;
        }
        let id = self.tx.id();
        tracing::error!(tx_id = %id, "Transaction execution aborted before submission");
        self.tx.transition(TxState::Fail);
        self.settle_err(TxError::Submission {
            id,
            reason: "execution aborted".to_string(),
        });
    }
}

/// Sending half of `confirmed`, after a successful submission.
#[derive(Debug)]
pub(crate) struct PendingConfirmation {
    tx: Transaction,
    confirmed: Option<oneshot::Sender<ConfirmedResult>>,
    armed: bool,
}

impl PendingConfirmation {
    pub(crate) fn confirmed(mut self, receipt: TxReceipt) {
        if let Some(sender) = self.confirmed.take() {
            let _ = sender.send(Ok(receipt));
        }
    }

    pub(crate) fn fail(mut self, error: TxError) {
        if let Some(sender) = self.confirmed.take() {
            let _ = sender.send(Err(error));
        }
    }
}

impl Drop for PendingConfirmation {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let Some(sender) = self.confirmed.take() else {
            return;
        };
        let id = self.tx.id();
        tracing::error!(tx_id = %id, "Transaction execution aborted while confirming");
        self.tx.transition(TxState::Fail);
        let _ = sender.send(Err(TxError::ConfirmationFailure {
            id,
            reason: "execution aborted".to_string(),
        }));
    }
}

pub(crate) fn unix_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}
