//! Ports to the external collaborators of the withdrawal core
//!
//! The core never talks to a database, a cache server or the wall clock
//! directly. It calls these traits, so concrete technologies (in-memory,
//! relational, distributed cache) stay implementation details and tests can
//! substitute failing or time-travelling implementations.
//!
//! All methods are synchronous and may block on I/O.

use crate::types::{
    Account, StoreError, Timestamp, WithdrawalId, WithdrawalRecord, WithdrawalStatus,
};
use chrono::NaiveDate;
use std::time::Duration;

/// Durable store for withdrawal records and account balances
///
/// The store is the source of truth. Account saves are optimistic: the saved
/// account must carry the version currently stored, and the store returns the
/// account with its new version.
pub trait RecordStore: Send + Sync {
    /// Insert or replace a withdrawal record
    fn save_withdrawal(&self, record: &WithdrawalRecord) -> Result<(), StoreError>;

    /// Get a withdrawal record by ID
    fn find_withdrawal_by_id(&self, id: WithdrawalId)
        -> Result<Option<WithdrawalRecord>, StoreError>;

    /// Get every withdrawal record currently in the given status
    fn find_withdrawals_by_status(
        &self,
        status: WithdrawalStatus,
    ) -> Result<Vec<WithdrawalRecord>, StoreError>;

    /// Persist an account balance
    ///
    /// Fails with `StoreError::VersionConflict` if `account.version` is stale.
    fn save_account(&self, account: &Account) -> Result<Account, StoreError>;

    /// Get the account owning a card
    fn find_account_by_card(&self, card: &str) -> Result<Option<Account>, StoreError>;

    /// Get all accounts for final output
    fn all_accounts(&self) -> Result<Vec<Account>, StoreError>;
}

/// Key-value cache holding serialized accounts keyed by card identifier
pub trait CacheStore: Send + Sync {
    /// Get a cached value, or `None` on miss or expiry
    fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

    /// Store a value that expires after `ttl`
    fn set(&self, key: &str, value: String, ttl: Duration) -> Result<(), StoreError>;

    /// Drop a cached value
    fn remove(&self, key: &str) -> Result<(), StoreError>;
}

/// Port for time abstraction
///
/// This allows the system to use different time sources:
/// - Real system time for production
/// - Fixed or manually advanced time for deterministic tests
pub trait Clock: Send + Sync {
    /// Get the current time according to this clock
    fn now(&self) -> Timestamp;

    /// Calendar day used for daily quota rollover
    fn today(&self) -> NaiveDate {
        self.now().date_naive()
    }

    /// Get the clock's name/identifier for debugging
    fn name(&self) -> &str {
        "Clock"
    }
}
