//! Types module
//!
//! Contains core data structures used throughout the application.
//! This module organizes types into logical submodules:
//! - `account`: Account-related types
//! - `withdrawal`: Withdrawal intents, records and lifecycle status
//! - `operation`: Replayable withdraw and cancel operations
//! - `error`: Error types for the withdrawal engine

pub mod account;
pub mod error;
pub mod operation;
pub mod withdrawal;

/// Point in time used for records, quota state and cache expiry
pub type Timestamp = chrono::DateTime<chrono::Utc>;

pub use account::{mask_card, Account, AccountId, CardNumber};
pub use error::{RejectionReason, ReplayError, StoreError, WithdrawalError};
pub use operation::{Operation, OperationRef};
pub use withdrawal::{
    CancelOutcome, WithdrawalId, WithdrawalIntent, WithdrawalRecord, WithdrawalStatus,
};
