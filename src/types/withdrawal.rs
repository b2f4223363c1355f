//! Withdrawal-related types for the ATM withdrawal engine
//!
//! This module defines the caller-supplied intent, the persisted withdrawal
//! record and its lifecycle status.

use super::account::{AccountId, CardNumber};
use super::Timestamp;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Unique identifier for a withdrawal record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WithdrawalId(Uuid);

impl WithdrawalId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for WithdrawalId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for WithdrawalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Request to withdraw an amount against a card
///
/// The intent is immutable once built. Its fields are deliberately unvalidated
/// strings: structural checks belong to the policy validator so that every
/// malformed request is rejected with its own reason.
#[derive(Debug, Clone, PartialEq)]
pub struct WithdrawalIntent {
    /// Card identifier (expected to be exactly 16 characters)
    pub card: CardNumber,

    /// Secret code (expected to be exactly 4 characters, never interpreted)
    pub secret: String,

    /// Requested amount with 2 decimal places precision
    pub amount: Decimal,
}

impl WithdrawalIntent {
    pub fn new(card: impl Into<CardNumber>, secret: impl Into<String>, amount: Decimal) -> Self {
        Self {
            card: card.into(),
            secret: secret.into(),
            amount,
        }
    }
}

/// Lifecycle status of a withdrawal record
///
/// `IN_PROGRESS` is the single "not yet settled" state; records persisted
/// under the older `PENDING` name deserialize into it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WithdrawalStatus {
    /// Balance debited, settlement not yet confirmed
    #[serde(alias = "PENDING")]
    InProgress,
    /// Debit applied and settled
    Completed,
    /// Completed withdrawal that was reversed
    Canceled,
}

impl fmt::Display for WithdrawalStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WithdrawalStatus::InProgress => write!(f, "IN_PROGRESS"),
            WithdrawalStatus::Completed => write!(f, "COMPLETED"),
            WithdrawalStatus::Canceled => write!(f, "CANCELED"),
        }
    }
}

/// Persisted withdrawal
///
/// Created once per accepted intent and never deleted. Only `status` and
/// `updated_at` change after creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WithdrawalRecord {
    pub id: WithdrawalId,
    pub card: CardNumber,
    pub secret: String,
    pub amount: Decimal,
    pub account_id: AccountId,
    pub status: WithdrawalStatus,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl WithdrawalRecord {
    /// Build a new in-flight record for an accepted intent
    pub fn in_flight(intent: &WithdrawalIntent, account_id: AccountId, now: Timestamp) -> Self {
        Self {
            id: WithdrawalId::new(),
            card: intent.card.clone(),
            secret: intent.secret.clone(),
            amount: intent.amount,
            account_id,
            status: WithdrawalStatus::InProgress,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Successful result of a cancellation
#[derive(Debug, Clone, PartialEq)]
pub enum CancelOutcome {
    /// The completed withdrawal was reversed and is now `CANCELED`
    Canceled(WithdrawalRecord),
    /// The withdrawal was already `CANCELED`; nothing changed
    AlreadyCanceled(WithdrawalRecord),
}

impl CancelOutcome {
    pub fn record(&self) -> &WithdrawalRecord {
        match self {
            CancelOutcome::Canceled(record) | CancelOutcome::AlreadyCanceled(record) => record,
        }
    }
}
