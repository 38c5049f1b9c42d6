//! JSON-RPC ledger client with timeout and failover handling.
//!
//! # Responsibilities
//! - Connect to the primary and failover JSON-RPC endpoints
//! - Query chain state (block number, nonce, receipts)
//! - Sign and broadcast transactions through the primary endpoint
//! - Poll for receipts with backoff until the confirmation depth is reached

use alloy::network::TransactionBuilder;
use alloy::primitives::{Address, TxHash};
use alloy::providers::{Provider, ProviderBuilder};
use alloy::rpc::types::{TransactionReceipt, TransactionRequest};
use async_trait::async_trait;
use std::sync::{Arc, RwLock};
use std::time::Duration;
use tokio::time::{sleep, timeout};

use crate::ledger::connection::LedgerConnection;
use crate::ledger::types::{
    ChainId, GasPrices, LedgerConfig, LedgerError, LedgerResult, SubmitOptions, SubmittedTx,
    TxIntent, TxReceipt,
};
use crate::ledger::wallet::Wallet;
use crate::observability::metrics;

/// Ledger connection backed by alloy providers.
#[derive(Clone)]
pub struct RpcLedger {
    /// Read providers (primary + failovers).
    providers: Vec<Arc<dyn Provider + Send + Sync>>,
    /// Primary provider with the wallet attached, if a key was supplied.
    signer: Option<Arc<dyn Provider + Send + Sync>>,
    wallet: Option<Wallet>,
    config: LedgerConfig,
    timeout_duration: Duration,
    gas_prices: Arc<RwLock<GasPrices>>,
}

impl RpcLedger {
    /// Create a new ledger client.
    ///
    /// Without a wallet the client can read chain state but every
    /// [`submit`](LedgerConnection::submit) fails with `NotAvailable`.
    pub async fn new(config: LedgerConfig, wallet: Option<Wallet>) -> LedgerResult<Self> {
        let timeout_duration = Duration::from_secs(config.rpc_timeout_secs);
        let mut providers = Vec::new();

        // 1. Add primary provider
        let primary_url: url::Url = config.rpc_url.parse().map_err(|e| {
            LedgerError::Rpc(format!("Invalid RPC URL '{}': {}", config.rpc_url, e))
        })?;
        providers.push(Arc::new(ProviderBuilder::new().connect_http(primary_url.clone()))
            as Arc<dyn Provider + Send + Sync>);

        // 2. Add failover providers
        for url_str in &config.failover_urls {
            if let Ok(url) = url_str.parse() {
                providers.push(Arc::new(ProviderBuilder::new().connect_http(url))
                    as Arc<dyn Provider + Send + Sync>);
            } else {
                tracing::warn!(url = %url_str, "Ignoring invalid failover RPC URL");
            }
        }

        // 3. Signing provider always targets the primary endpoint
        let signer = wallet.as_ref().map(|wallet| {
            Arc::new(
                ProviderBuilder::new()
                    .wallet(wallet.ethereum_wallet())
                    .connect_http(primary_url.clone()),
            ) as Arc<dyn Provider + Send + Sync>
        });

        let client = Self {
            providers,
            signer,
            wallet,
            gas_prices: Arc::new(RwLock::new(config.gas_prices)),
            config: config.clone(),
            timeout_duration,
        };

        match client.verify_chain_id().await {
            Ok(()) => {
                tracing::info!(
                    rpc_url = %config.rpc_url,
                    chain_id = config.chain_id,
                    account = ?client.account(),
                    "Ledger client initialized"
                );
            }
            Err(e) => {
                tracing::warn!(
                    error = %e,
                    "Ledger client initialized but chain verification failed"
                );
                // Don't fail initialization - allow graceful degradation
            }
        }

        Ok(client)
    }

    /// Verify the connected chain ID matches configuration.
    pub async fn verify_chain_id(&self) -> LedgerResult<()> {
        let chain_id = self.get_chain_id().await?;
        if chain_id.0 != self.config.chain_id {
            return Err(LedgerError::ChainMismatch {
                expected: self.config.chain_id,
                actual: chain_id.0,
            });
        }
        Ok(())
    }

    /// Get the chain ID from the RPC.
    pub async fn get_chain_id(&self) -> LedgerResult<ChainId> {
        for (i, provider) in self.providers.iter().enumerate() {
            match timeout(self.timeout_duration, provider.get_chain_id()).await {
                Ok(Ok(result)) => return Ok(ChainId(result)),
                Ok(Err(e)) => {
                    tracing::warn!(provider_idx = i, error = %e, "RPC error, trying next provider");
                }
                Err(_) => {
                    tracing::warn!(provider_idx = i, "RPC timeout, trying next provider");
                }
            }
        }
        Err(LedgerError::Rpc("All RPC providers failed".to_string()))
    }

    /// Get the latest block number.
    pub async fn get_block_number(&self) -> LedgerResult<u64> {
        for (i, provider) in self.providers.iter().enumerate() {
            match timeout(self.timeout_duration, provider.get_block_number()).await {
                Ok(Ok(result)) => return Ok(result),
                Ok(Err(e)) => tracing::warn!(provider_idx = i, error = %e, "RPC error"),
                Err(_) => tracing::warn!(provider_idx = i, "RPC timeout"),
            }
        }
        Err(LedgerError::Rpc("All providers failed to get block number".to_string()))
    }

    /// Get the pending transaction count (nonce) for an address.
    pub async fn get_transaction_count(&self, address: Address) -> LedgerResult<u64> {
        for (i, provider) in self.providers.iter().enumerate() {
            let fut = provider.get_transaction_count(address).pending();
            match timeout(self.timeout_duration, fut).await {
                Ok(Ok(result)) => return Ok(result),
                Ok(Err(e)) => tracing::warn!(provider_idx = i, error = %e, "RPC error"),
                Err(_) => tracing::warn!(provider_idx = i, "RPC timeout"),
            }
        }
        Err(LedgerError::Rpc("All providers failed to get transaction count".to_string()))
    }

    /// Get a transaction receipt by hash.
    pub async fn get_transaction_receipt(
        &self,
        tx_hash: TxHash,
    ) -> LedgerResult<Option<TransactionReceipt>> {
        for (i, provider) in self.providers.iter().enumerate() {
            match timeout(self.timeout_duration, provider.get_transaction_receipt(tx_hash)).await {
                Ok(Ok(result)) => return Ok(result),
                Ok(Err(e)) => tracing::warn!(provider_idx = i, error = %e, "RPC error"),
                Err(_) => tracing::warn!(provider_idx = i, "RPC timeout"),
            }
        }
        Err(LedgerError::Rpc("All providers failed to get receipt".to_string()))
    }

    /// Replace the gas prices used for auto gas settings.
    pub fn set_gas_prices(&self, prices: GasPrices) {
        *self.gas_prices.write().expect("gas price lock poisoned") = prices;
    }

    /// Check if the ledger is reachable and healthy.
    ///
    /// Returns true if we can query the block number.
    pub async fn is_healthy(&self) -> bool {
        let healthy = self.get_block_number().await.is_ok();
        metrics::record_ledger_health(&self.config.rpc_url, healthy);
        healthy
    }

    pub fn config(&self) -> &LedgerConfig {
        &self.config
    }

    // Confirmations seen for a receipt included at `tx_block`.
}

/// Confirmation depth of a mined receipt, judged against the chain head.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Depth {
    Reached,
    Pending(u32),
    /// Chain head unavailable; poll again.
    Unknown(String),
}

fn confirmation_depth(
    tx_block: Option<u64>,
    current_block: LedgerResult<u64>,
    required: u32,
) -> Depth {
    let current_block = match current_block {
        Ok(block) => block,
        Err(e) => return Depth::Unknown(e.to_string()),
    };
    let tx_block = tx_block.unwrap_or(current_block);
    let confirmations =
        u32::try_from(current_block.saturating_sub(tx_block)).unwrap_or(u32::MAX);
    if confirmations >= required {
        Depth::Reached
    } else {
        Depth::Pending(confirmations)
    }
}

#[async_trait]
impl LedgerConnection for RpcLedger {
    async fn sequence_number(&self) -> LedgerResult<u64> {
        let address = self
            .account()
            .ok_or_else(|| LedgerError::NotAvailable("no wallet configured".to_string()))?;
        self.get_transaction_count(address).await
    }

    async fn submit(&self, intent: &TxIntent, options: &SubmitOptions) -> LedgerResult<SubmittedTx> {
        let (provider, wallet) = match (&self.signer, &self.wallet) {
            (Some(provider), Some(wallet)) => (provider, wallet),
            _ => return Err(LedgerError::NotAvailable("no wallet configured".to_string())),
        };

        let mut request = TransactionRequest::default()
            .with_from(wallet.address())
            .with_to(intent.to)
            .with_value(intent.value)
            .with_input(intent.calldata.clone())
            .with_nonce(options.nonce)
            .with_gas_limit(options.gas_limit)
            .with_chain_id(wallet.chain_id());
        if let Some(gas_price) = options.gas_price {
            request = request.with_gas_price(gas_price);
        }

        let pending = provider
            .send_transaction(request)
            .await
            .map_err(|e| LedgerError::Rpc(format!("Failed to send transaction: {}", e)))?;

        Ok(SubmittedTx {
            hash: *pending.tx_hash(),
        })
    }

    async fn wait_for_confirmation(&self, hash: TxHash) -> LedgerResult<TxReceipt> {
        let required_confirmations = self.config.confirmation_blocks;
        let policy = self.config.receipt_backoff();
        let mut attempt = 0u32;

        loop {
            match self.get_transaction_receipt(hash).await {
                Ok(Some(receipt)) if !receipt.status() => {
                    return Ok(TxReceipt {
                        hash,
                        block_number: receipt.block_number,
                        gas_used: receipt.gas_used,
                        success: false,
                    });
                }
                Ok(Some(receipt)) => {
                    let current_block = self.get_block_number().await;
                    match confirmation_depth(
                        receipt.block_number,
                        current_block,
                        required_confirmations,
                    ) {
                        Depth::Reached => {
                            return Ok(TxReceipt {
                                hash,
                                block_number: receipt.block_number,
                                gas_used: receipt.gas_used,
                                success: true,
                            });
                        }
                        Depth::Pending(confirmations) => tracing::debug!(
                            tx_hash = %hash,
                            confirmations = confirmations,
                            required = required_confirmations,
                            "Waiting for confirmations"
                        ),
                        Depth::Unknown(error) => tracing::warn!(
                            tx_hash = %hash,
                            attempt,
                            error = %error,
                            "Block number lookup failed"
                        ),
                    }
                }
                Ok(None) => tracing::debug!(tx_hash = %hash, attempt, "Transaction pending"),
                Err(e) => tracing::warn!(tx_hash = %hash, attempt, error = %e, "Receipt lookup failed"),
            }

            if !policy.allows(attempt) {
                return Err(LedgerError::ReceiptNotFound(attempt + 1));
            }
            attempt += 1;
            sleep(policy.delay(attempt)).await;
        }
    }

    fn endpoint(&self) -> String {
        self.config.rpc_url.clone()
    }

    fn account(&self) -> Option<Address> {
        self.wallet.as_ref().map(Wallet::address)
    }

    fn gas_prices(&self) -> GasPrices {
        *self.gas_prices.read().expect("gas price lock poisoned")
    }
}

impl std::fmt::Debug for RpcLedger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RpcLedger")
            .field("rpc_url", &self.config.rpc_url)
            .field("chain_id", &self.config.chain_id)
            .field("timeout_secs", &self.config.rpc_timeout_secs)
            .field("account", &self.account())
            .finish()
    }
}
