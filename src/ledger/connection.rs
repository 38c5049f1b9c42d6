//! Interface the executor needs from the external ledger.

use alloy::primitives::{Address, TxHash};
use async_trait::async_trait;

use crate::ledger::types::{GasPrices, LedgerResult, SubmitOptions, SubmittedTx, TxIntent, TxReceipt};

/// Connection to a ledger that orders operations by a per-account sequence
/// number.
#[async_trait]
pub trait LedgerConnection: Send + Sync + 'static {
    /// Authoritative next sequence number (nonce) for the account.
    async fn sequence_number(&self) -> LedgerResult<u64>;

    /// Sign and broadcast an operation. Returns once the ledger has
    /// accepted it, not once it is confirmed.
    async fn submit(&self, intent: &TxIntent, options: &SubmitOptions) -> LedgerResult<SubmittedTx>;

    /// Wait until the operation is included and return its receipt.
    ///
    /// A reverted operation is returned as a receipt with `success == false`.
    async fn wait_for_confirmation(&self, hash: TxHash) -> LedgerResult<TxReceipt>;

    /// Identifier of the endpoint in use, for diagnostics.
    fn endpoint(&self) -> String;

    /// Account that signs submissions, if any.
    fn account(&self) -> Option<Address>;

    /// Current gas prices for the auto gas settings.
    fn gas_prices(&self) -> GasPrices {
        GasPrices::default()
    }
}
