//! Shared utilities for integration testing.

#![allow(dead_code)]

use alloy::primitives::{Address, Bytes, TxHash, U256};
use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Mutex;
use tokio::time::Instant;

use tx_executor::ledger::{
    GasPrices, LedgerConnection, LedgerError, LedgerResult, SubmitOptions, SubmittedTx, TxIntent,
    TxReceipt,
};

/// One accepted submission, as seen by the mock ledger.
#[derive(Debug, Clone)]
pub struct Submission {
    pub method: String,
    pub nonce: u64,
    pub hash: TxHash,
    pub at: Instant,
}

/// In-memory ledger whose behaviour is scripted per intent method.
///
/// - methods in `hang` never return from `submit`
/// - methods in `fail` are rejected by `submit`
/// - methods in `revert` are accepted but confirm as reverted
/// - methods in `panic` make `submit` panic
#[derive(Default)]
pub struct MockLedger {
    sequence: AtomicU64,
    sequence_reads: AtomicUsize,
    hashes: AtomicU64,
    submissions: Mutex<Vec<Submission>>,
    hang: Mutex<HashSet<String>>,
    fail: Mutex<HashSet<String>>,
    revert: Mutex<HashSet<String>>,
    panic: Mutex<HashSet<String>>,
    reverted: Mutex<HashSet<TxHash>>,
}

impl MockLedger {
    pub fn with_sequence(sequence: u64) -> Self {
        let ledger = Self::default();
        ledger.sequence.store(sequence, Ordering::SeqCst);
        ledger
    }

    pub fn set_sequence(&self, sequence: u64) {
        self.sequence.store(sequence, Ordering::SeqCst);
    }

    pub fn hang_on(&self, method: &str) {
        self.hang.lock().unwrap().insert(method.to_string());
    }

    pub fn fail_on(&self, method: &str) {
        self.fail.lock().unwrap().insert(method.to_string());
    }

    pub fn revert_on(&self, method: &str) {
        self.revert.lock().unwrap().insert(method.to_string());
    }

    pub fn panic_on(&self, method: &str) {
        self.panic.lock().unwrap().insert(method.to_string());
    }

    pub fn revert_hash(&self, hash: TxHash) {
        self.reverted.lock().unwrap().insert(hash);
    }

    pub fn sequence_reads(&self) -> usize {
        self.sequence_reads.load(Ordering::SeqCst)
    }

    pub fn submissions(&self) -> Vec<Submission> {
        self.submissions.lock().unwrap().clone()
    }

    pub fn submitted_methods(&self) -> Vec<String> {
        self.submissions().into_iter().map(|s| s.method).collect()
    }

    pub fn nonce_of(&self, hash: TxHash) -> Option<u64> {
        self.submissions()
            .into_iter()
            .find(|s| s.hash == hash)
            .map(|s| s.nonce)
    }
}

#[async_trait]
impl LedgerConnection for MockLedger {
    async fn sequence_number(&self) -> LedgerResult<u64> {
        self.sequence_reads.fetch_add(1, Ordering::SeqCst);
        Ok(self.sequence.load(Ordering::SeqCst))
    }

    async fn submit(&self, intent: &TxIntent, options: &SubmitOptions) -> LedgerResult<SubmittedTx> {
        let hangs = self.hang.lock().unwrap().contains(&intent.method);
        if hangs {
            std::future::pending::<()>().await;
        }
        let panics = self.panic.lock().unwrap().contains(&intent.method);
        if panics {
            panic!("ledger client crashed submitting {}", intent.method);
        }
        if self.fail.lock().unwrap().contains(&intent.method) {
            return Err(LedgerError::Rpc("insufficient funds for gas".to_string()));
        }

        let n = self.hashes.fetch_add(1, Ordering::SeqCst) + 1;
        let hash = TxHash::left_padding_from(&n.to_be_bytes());
        if self.revert.lock().unwrap().contains(&intent.method) {
            self.reverted.lock().unwrap().insert(hash);
        }

        // The pending nonce moves past every accepted submission
        self.sequence.fetch_max(options.nonce + 1, Ordering::SeqCst);
        self.submissions.lock().unwrap().push(Submission {
            method: intent.method.clone(),
            nonce: options.nonce,
            hash,
            at: Instant::now(),
        });

        Ok(SubmittedTx { hash })
    }

    async fn wait_for_confirmation(&self, hash: TxHash) -> LedgerResult<TxReceipt> {
        let success = !self.reverted.lock().unwrap().contains(&hash);
        Ok(TxReceipt {
            hash,
            block_number: Some(100),
            gas_used: 21_000,
            success,
        })
    }

    fn endpoint(&self) -> String {
        "mock://ledger".to_string()
    }

    fn account(&self) -> Option<Address> {
        Some(Address::repeat_byte(0xaa))
    }

    fn gas_prices(&self) -> GasPrices {
        GasPrices::default()
    }
}

/// Contract call intent labelled `method`.
pub fn call(method: &str) -> TxIntent {
    TxIntent::call(Address::repeat_byte(0x42), method, Bytes::new())
}

/// Plain value transfer.
pub fn transfer() -> TxIntent {
    TxIntent::transfer(Address::repeat_byte(0x42), U256::from(1_000u64))
}
