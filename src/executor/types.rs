//! Transaction identifiers, lifecycle states and error definitions.

use alloy::primitives::TxHash;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

use crate::ledger::types::TxIntent;
use crate::queue::QueueError;

/// Local, monotonically increasing transaction identifier.
///
/// Orders transactions client-side; unrelated to the ledger nonce.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TxId(pub u64);

impl fmt::Display for TxId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Lifecycle of a queued transaction.
///
/// ```text
/// Init → Processing → Submit → Confirm
///          Processing → Fail,  Submit → Fail
/// Init → Prioritized → Processing
/// Init | Prioritized | Processing | Submit → Cancel
/// Init → Submit (recovered transaction)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TxState {
    Init,
    Prioritized,
    Processing,
    Submit,
    Confirm,
    Fail,
    Cancel,
}

impl TxState {
    pub fn is_terminal(self) -> bool {
        matches!(self, TxState::Confirm | TxState::Fail | TxState::Cancel)
    }

    /// Whether `self → next` moves forward along the lifecycle.
    pub fn can_transition_to(self, next: TxState) -> bool {
        use TxState::*;
        matches!(
            (self, next),
            (Init, Prioritized | Processing | Submit | Cancel)
                | (Prioritized, Prioritized | Processing | Cancel)
                | (Processing, Submit | Fail | Cancel)
                | (Submit, Confirm | Fail | Cancel)
        )
    }
}

impl fmt::Display for TxState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Failure delivered through a transaction's `submitted` / `confirmed`
/// futures. Never returned synchronously.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TxError {
    /// The submit call did not return within the deadline.
    #[error("tx request {id} failed to submit: timed out after {timeout_ms}ms")]
    SubmissionTimeout { id: TxId, timeout_ms: u64 },

    /// Nonce lookup, signing or broadcast failed.
    #[error("tx request {id} failed to submit: {reason}")]
    Submission { id: TxId, reason: String },

    /// The ledger reported the transaction as failed or reverted.
    #[error("tx {id} failed on the ledger: {reason}")]
    ConfirmationFailure { id: TxId, reason: String },

    /// The transaction was dequeued before it started.
    #[error("tx {id} was cancelled")]
    Cancelled { id: TxId },
}

impl TxError {
    pub fn id(&self) -> TxId {
        match self {
            TxError::SubmissionTimeout { id, .. }
            | TxError::Submission { id, .. }
            | TxError::ConfirmationFailure { id, .. }
            | TxError::Cancelled { id } => *id,
        }
    }
}

/// Errors returned directly by executor calls.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExecutorError {
    /// Queue configuration was invalid, or no pending transaction matched.
    #[error(transparent)]
    Queue(#[from] QueueError),

    /// The `before_queued` hook refused the transaction.
    #[error("Transaction rejected before queueing: {0}")]
    Rejected(String),
}

/// A transaction that was submitted earlier, e.g. recovered from storage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersistedTransaction {
    pub intent: TxIntent,
    pub hash: TxHash,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_success_path_transitions() {
        assert!(TxState::Init.can_transition_to(TxState::Processing));
        assert!(TxState::Processing.can_transition_to(TxState::Submit));
        assert!(TxState::Submit.can_transition_to(TxState::Confirm));
        assert!(TxState::Confirm.is_terminal());
    }

    #[test]
    fn test_no_backward_or_terminal_transitions() {
        assert!(!TxState::Submit.can_transition_to(TxState::Processing));
        assert!(!TxState::Processing.can_transition_to(TxState::Prioritized));
        assert!(!TxState::Init.can_transition_to(TxState::Fail));
        for terminal in [TxState::Confirm, TxState::Fail, TxState::Cancel] {
            assert!(!terminal.can_transition_to(TxState::Cancel));
            assert!(!terminal.can_transition_to(TxState::Processing));
        }
    }

    #[test]
    fn test_prioritized_still_processes() {
        assert!(TxState::Init.can_transition_to(TxState::Prioritized));
        assert!(TxState::Prioritized.can_transition_to(TxState::Processing));
        assert!(TxState::Prioritized.can_transition_to(TxState::Cancel));
    }

    #[test]
    fn test_error_display_and_id() {
        let err = TxError::SubmissionTimeout {
            id: TxId(4),
            timeout_ms: 30_000,
        };
        assert_eq!(err.to_string(), "tx request 4 failed to submit: timed out after 30000ms");
        assert_eq!(err.id(), TxId(4));

        let err: ExecutorError = QueueError::TaskNotFound.into();
        assert_eq!(err.to_string(), "Specified task was not found");
    }
}
