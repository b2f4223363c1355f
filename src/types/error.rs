//! Error types for the ATM withdrawal engine
//!
//! This module defines all error types that can occur while validating,
//! processing or cancelling a withdrawal.
//!
//! # Error Categories
//!
//! - **Rejections**: malformed intents, exhausted daily quota, duplicate requests
//! - **Account Errors**: unknown card, insufficient balance, stale account version
//! - **Lifecycle Errors**: unknown withdrawal, cancellation of an in-flight withdrawal
//! - **Store Errors**: failures reported by the durable store or the cache
//! - **Replay Errors**: operation-log rows that cannot be applied
//!
//! Every failure carries a distinguishable variant so the caller can map it to
//! its own response. No failure is ever turned into a silent success.

use super::account::AccountId;
use super::withdrawal::{WithdrawalId, WithdrawalStatus};
use super::Timestamp;
use crate::core::lifecycle::WithdrawalAction;
use rust_decimal::Decimal;
use thiserror::Error;

/// Reason a withdrawal intent failed policy validation
///
/// One variant per validator check. Validation failures are recoverable: the
/// caller may fix the request and try again.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RejectionReason {
    /// No intent was supplied
    #[error("Withdrawal request is missing")]
    MissingIntent,

    /// Card identifier has the wrong length
    #[error("Invalid card number format: expected 16 characters, got {length}")]
    InvalidCardNumber {
        /// Observed length in characters
        length: usize,
    },

    /// Secret code has the wrong length
    #[error("Invalid secret code format: expected 4 characters, got {length}")]
    InvalidSecretCode {
        /// Observed length in characters
        length: usize,
    },

    /// Amount truncated to whole units is not positive
    #[error("Invalid withdrawal amount {amount}")]
    NonPositiveAmount {
        /// Requested amount
        amount: Decimal,
    },

    /// Accepting the request would break the daily count or amount limit
    #[error("Daily withdrawal limit exceeded: {count} withdrawals totalling {withdrawn} already today, requested {requested}")]
    DailyLimitExceeded {
        /// Withdrawals already accepted today
        count: u32,
        /// Amount already withdrawn today
        withdrawn: Decimal,
        /// Requested amount
        requested: Decimal,
    },

    /// A request for the same card arrived inside the duplicate window
    #[error("Duplicate withdrawal request: previous request at {last_request}")]
    DuplicateRequest {
        /// Timestamp of the request that opened the window
        last_request: Timestamp,
    },
}

/// Failure reported by an external collaborator (record store or cache)
#[derive(Debug, Clone, PartialEq, Error)]
pub enum StoreError {
    /// The backing store could not be reached or refused the operation
    #[error("Store unavailable: {message}")]
    Unavailable {
        /// Description of the failure
        message: String,
    },

    /// A stored value could not be encoded or decoded
    #[error("Serialization error: {message}")]
    Serialization {
        /// Description of the failure
        message: String,
    },

    /// An account was saved with a version that is no longer current
    #[error("Version conflict on account {account}: expected {expected}, found {found}")]
    VersionConflict {
        /// Account ID
        account: AccountId,
        /// Version carried by the write
        expected: u64,
        /// Version currently stored
        found: u64,
    },

    /// An account save targeted an account the store does not know
    #[error("Account {account} does not exist in the store")]
    UnknownAccount {
        /// Account ID
        account: AccountId,
    },
}

impl From<serde_json::Error> for StoreError {
    fn from(error: serde_json::Error) -> Self {
        StoreError::Serialization {
            message: error.to_string(),
        }
    }
}

/// Main error type for withdrawal processing and cancellation
#[derive(Debug, Clone, PartialEq, Error)]
pub enum WithdrawalError {
    /// The intent failed policy validation; nothing was debited
    #[error("Withdrawal rejected: {0}")]
    Rejected(#[from] RejectionReason),

    /// No account is associated with the card
    #[error("Bank account not found for card {card}")]
    AccountNotFound {
        /// Masked card identifier
        card: String,
    },

    /// The requested amount exceeds the current balance; nothing was debited
    #[error("Insufficient balance on account {account}: balance {balance}, requested {requested}")]
    InsufficientBalance {
        /// Account ID
        account: AccountId,
        /// Current balance
        balance: Decimal,
        /// Requested amount
        requested: Decimal,
    },

    /// The withdrawal record does not exist
    #[error("Withdrawal {id} not found")]
    WithdrawalNotFound {
        /// Withdrawal ID
        id: WithdrawalId,
    },

    /// Cancellation of a withdrawal whose balance effect is not settled yet
    #[error("Withdrawal {id} is {status} and cannot be canceled")]
    CancelConflict {
        /// Withdrawal ID
        id: WithdrawalId,
        /// Current status
        status: WithdrawalStatus,
    },

    /// Another cancellation of the same withdrawal is running
    #[error("Cancellation of withdrawal {id} is already in progress")]
    CancellationInProgress {
        /// Withdrawal ID
        id: WithdrawalId,
    },

    /// The lifecycle table refuses the action from the current status
    #[error("Cannot {action} withdrawal {id} in status {from}")]
    IllegalTransition {
        /// Withdrawal ID
        id: WithdrawalId,
        /// Current status
        from: WithdrawalStatus,
        /// Refused action
        action: WithdrawalAction,
    },

    /// The account changed underneath this operation; nothing was written
    #[error("Account {account} was modified concurrently")]
    ConcurrentModification {
        /// Account ID
        account: AccountId,
    },

    /// The balance was persisted but the withdrawal record was not
    ///
    /// The account and the withdrawal history disagree. This must be
    /// reconciled; it is never retried here.
    #[error("Balance of account {account} changed by {delta} but withdrawal {withdrawal} was not persisted: {source}")]
    UnrecordedBalanceChange {
        /// Account ID
        account: AccountId,
        /// Signed balance change that was persisted
        delta: Decimal,
        /// Withdrawal whose record write failed
        withdrawal: WithdrawalId,
        /// Underlying store failure
        source: StoreError,
    },

    /// The withdrawal's card now resolves to a different account
    #[error("Withdrawal {id} belongs to account {expected} but its card resolves to account {found}")]
    AccountMismatch {
        /// Withdrawal ID
        id: WithdrawalId,
        /// Account recorded on the withdrawal
        expected: AccountId,
        /// Account the card resolves to now
        found: AccountId,
    },

    /// Crediting the balance would overflow
    #[error("Arithmetic overflow in {operation} for account {account}")]
    ArithmeticOverflow {
        /// Operation that would overflow
        operation: String,
        /// Account ID
        account: AccountId,
    },

    /// A collaborator failed before any balance change was persisted
    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

/// Failure of one replayed operation
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ReplayError {
    /// A cancel row names a reference no accepted withdrawal carried
    #[error("Unknown withdrawal reference '{reference}'")]
    UnknownReference {
        /// Reference from the operation log
        reference: String,
    },

    /// The orchestrator refused or failed the operation
    #[error(transparent)]
    Withdrawal(#[from] WithdrawalError),
}

// Helper functions for creating common errors

impl WithdrawalError {
    /// Create an AccountNotFound error (the card is masked)
    pub fn account_not_found(card: &str) -> Self {
        WithdrawalError::AccountNotFound {
            card: super::account::mask_card(card),
        }
    }

    /// Create an InsufficientBalance error
    pub fn insufficient_balance(account: AccountId, balance: Decimal, requested: Decimal) -> Self {
        WithdrawalError::InsufficientBalance {
            account,
            balance,
            requested,
        }
    }

    /// Create a WithdrawalNotFound error
    pub fn withdrawal_not_found(id: WithdrawalId) -> Self {
        WithdrawalError::WithdrawalNotFound { id }
    }

    /// Create an ArithmeticOverflow error
    pub fn arithmetic_overflow(operation: &str, account: AccountId) -> Self {
        WithdrawalError::ArithmeticOverflow {
            operation: operation.to_string(),
            account,
        }
    }

    /// Whether the error is a policy rejection
    pub fn is_rejection(&self) -> bool {
        matches!(self, WithdrawalError::Rejected(_))
    }
}
