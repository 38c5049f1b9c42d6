//! Caller-supplied callbacks around queueing and execution.

use alloy::primitives::{Address, TxHash};
use async_trait::async_trait;
use serde::Serialize;

use crate::executor::gas::GasSetting;
use crate::executor::transaction::Transaction;
use crate::executor::types::TxId;
use crate::ledger::types::{TxIntent, TxOverrides};

/// Error type hooks may return.
pub type HookError = Box<dyn std::error::Error + Send + Sync>;

/// Callbacks invoked by the executor. Every method has a no-op default.
#[async_trait]
pub trait TxHooks: Send + Sync + 'static {
    /// Runs before a transaction is created. An error aborts queueing and is
    /// returned to the caller of `queue`.
    async fn before_queued(
        &self,
        _id: TxId,
        _intent: &TxIntent,
        _overrides: Option<&TxOverrides>,
    ) -> Result<(), HookError> {
        Ok(())
    }

    /// Runs when a transaction starts executing. Errors are logged and
    /// execution continues.
    async fn before_transaction(&self, _tx: &Transaction) -> Result<(), HookError> {
        Ok(())
    }

    /// Runs once per executed transaction, whatever the outcome.
    async fn after_transaction(&self, _tx: &Transaction, _event: &TxLogEvent) {}
}

/// Hooks that do nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoHooks;

impl TxHooks for NoHooks {}

/// Timing and outcome of one executed transaction.
///
/// Times are milliseconds; `time_exec_called` is since the Unix epoch, the
/// `wait_*` fields are durations.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TxLogEvent {
    pub tx_id: TxId,
    pub tx_to: Address,
    pub tx_type: String,
    pub gas_setting: Option<GasSetting>,
    pub time_exec_called: u64,
    pub tx_hash: Option<TxHash>,
    /// Submit call start to ledger acceptance.
    pub wait_submit: Option<u64>,
    /// Submit call start to confirmation.
    pub wait_confirm: Option<u64>,
    pub error: Option<String>,
    /// Execution start to failure.
    pub wait_error: Option<u64>,
    pub rpc_endpoint: String,
    pub user_address: Option<Address>,
}

impl TxLogEvent {
    pub(crate) fn new(
        tx: &Transaction,
        time_exec_called: u64,
        rpc_endpoint: String,
        user_address: Option<Address>,
    ) -> Self {
        Self {
            tx_id: tx.id(),
            tx_to: tx.intent().to,
            tx_type: tx.intent().method.clone(),
            gas_setting: tx.gas_setting(),
            time_exec_called,
            tx_hash: None,
            wait_submit: None,
            wait_confirm: None,
            error: None,
            wait_error: None,
            rpc_endpoint,
            user_address,
        }
    }
}
