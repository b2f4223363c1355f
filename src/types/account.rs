//! Account-related types for the ATM withdrawal engine
//!
//! This module defines the Account structure and the card identifier helpers
//! used when an account is looked up or logged.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Account identifier
pub type AccountId = u64;

/// Card identifier as presented at the ATM (16 characters when well-formed)
pub type CardNumber = String;

/// Bank account state
///
/// The balance is never validated by the account itself: the orchestrator is
/// responsible for keeping it non-negative. Accounts travel through the cache
/// serialized as JSON, so every field must round-trip through serde.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Account {
    /// The account ID
    pub id: AccountId,

    /// Current balance with 2 decimal places precision
    pub balance: Decimal,

    /// Card identifiers that resolve to this account
    pub cards: Vec<CardNumber>,

    /// Row version used by the record store for optimistic concurrency
    ///
    /// Incremented by the store on every successful save. A save carrying a
    /// stale version is refused.
    #[serde(default)]
    pub version: u64,
}

impl Account {
    /// Create a new account with the given balance and no cards
    pub fn new(id: AccountId, balance: Decimal) -> Self {
        Account {
            id,
            balance,
            cards: Vec::new(),
            version: 0,
        }
    }

    /// Attach a card to this account (builder style)
    pub fn with_card(mut self, card: impl Into<CardNumber>) -> Self {
        self.cards.push(card.into());
        self
    }

    /// Whether the given card identifier belongs to this account
    pub fn owns_card(&self, card: &str) -> bool {
        self.cards.iter().any(|c| c == card)
    }
}

/// Mask a card identifier for logging, keeping only the last four characters
pub fn mask_card(card: &str) -> String {
    let visible: String = card
        .chars()
        .rev()
        .take(4)
        .collect::<Vec<_>>()
        .into_iter()
        .rev()
        .collect();
    format!("****{}", visible)
}
