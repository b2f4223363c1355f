//! In-memory implementations of the record store and the cache store
//!
//! Both stores are backed by `DashMap`, so they can be shared across worker
//! threads behind an `Arc` without a global lock.
//!
//! # Record store
//!
//! `InMemoryRecordStore` keeps accounts by ID, a card → account index and
//! every withdrawal record ever saved. Account saves are optimistic: the
//! incoming account must carry the version currently stored, and the entry
//! lock held by `DashMap::get_mut` makes the compare-and-bump atomic for that
//! account.
//!
//! # Cache store
//!
//! `InMemoryCacheStore` keeps string values with an absolute expiry computed
//! from an injected [`Clock`]. Expired entries are dropped lazily on read.

use crate::core::traits::{CacheStore, Clock, RecordStore};
use crate::types::{
    Account, AccountId, CardNumber, StoreError, Timestamp, WithdrawalId, WithdrawalRecord,
    WithdrawalStatus,
};
use chrono::TimeDelta;
use dashmap::DashMap;
use std::sync::Arc;
use std::time::Duration;

/// Thread-safe in-memory durable store
#[derive(Debug, Default)]
pub struct InMemoryRecordStore {
    /// Accounts by ID
    accounts: DashMap<AccountId, Account>,

    /// Card identifier to owning account
    card_index: DashMap<CardNumber, AccountId>,

    /// Every withdrawal record saved so far
    withdrawals: DashMap<WithdrawalId, WithdrawalRecord>,
}

impl InMemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store holding the given accounts
    pub fn with_accounts(accounts: impl IntoIterator<Item = Account>) -> Self {
        let store = Self::new();
        store.seed(accounts);
        store
    }

    /// Insert accounts as-is, replacing any account with the same ID
    ///
    /// Bypasses the version check. Intended for loading an initial state.
    pub fn seed(&self, accounts: impl IntoIterator<Item = Account>) {
        for account in accounts {
            for card in &account.cards {
                self.card_index.insert(card.clone(), account.id);
            }
            self.accounts.insert(account.id, account);
        }
    }

    /// Current state of an account by ID
    pub fn account(&self, id: AccountId) -> Option<Account> {
        self.accounts.get(&id).map(|entry| entry.value().clone())
    }

    /// Number of withdrawal records stored
    pub fn withdrawal_count(&self) -> usize {
        self.withdrawals.len()
    }
}

impl RecordStore for InMemoryRecordStore {
    fn save_withdrawal(&self, record: &WithdrawalRecord) -> Result<(), StoreError> {
        self.withdrawals.insert(record.id, record.clone());
        Ok(())
    }

    fn find_withdrawal_by_id(
        &self,
        id: WithdrawalId,
    ) -> Result<Option<WithdrawalRecord>, StoreError> {
        Ok(self.withdrawals.get(&id).map(|entry| entry.value().clone()))
    }

    fn find_withdrawals_by_status(
        &self,
        status: WithdrawalStatus,
    ) -> Result<Vec<WithdrawalRecord>, StoreError> {
        let mut records: Vec<WithdrawalRecord> = self
            .withdrawals
            .iter()
            .filter(|entry| entry.value().status == status)
            .map(|entry| entry.value().clone())
            .collect();
        records.sort_by_key(|record| record.created_at);
        Ok(records)
    }

    fn save_account(&self, account: &Account) -> Result<Account, StoreError> {
        let saved = {
            let mut stored = self
                .accounts
                .get_mut(&account.id)
                .ok_or(StoreError::UnknownAccount {
                    account: account.id,
                })?;

            if stored.version != account.version {
                return Err(StoreError::VersionConflict {
                    account: account.id,
                    expected: account.version,
                    found: stored.version,
                });
            }

            let mut saved = account.clone();
            saved.version = stored.version.wrapping_add(1);
            *stored = saved.clone();
            saved
        };

        // Index updates happen after the account lock is released.
        for card in &saved.cards {
            self.card_index.insert(card.clone(), saved.id);
        }
        Ok(saved)
    }

    fn find_account_by_card(&self, card: &str) -> Result<Option<Account>, StoreError> {
        let Some(id) = self.card_index.get(card).map(|entry| *entry.value()) else {
            return Ok(None);
        };
        Ok(self.account(id))
    }

    fn all_accounts(&self) -> Result<Vec<Account>, StoreError> {
        let mut accounts: Vec<Account> = self
            .accounts
            .iter()
            .map(|entry| entry.value().clone())
            .collect();
        accounts.sort_by_key(|account| account.id);
        Ok(accounts)
    }
}

/// Thread-safe in-memory cache with per-entry expiry
pub struct InMemoryCacheStore {
    /// Value and the instant it expires
    entries: DashMap<String, (String, Timestamp)>,
    clock: Arc<dyn Clock>,
}

impl InMemoryCacheStore {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: DashMap::new(),
            clock,
        }
    }

    /// Number of entries held, expired or not
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl CacheStore for InMemoryCacheStore {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let now = self.clock.now();
        let hit = self
            .entries
            .get(key)
            .map(|entry| (entry.value().0.clone(), entry.value().1));

        match hit {
            Some((value, expires_at)) if now < expires_at => Ok(Some(value)),
            Some(_) => {
                self.entries
                    .remove_if(key, |_, (_, expires_at)| now >= *expires_at);
                Ok(None)
            }
            None => Ok(None),
        }
    }

    fn set(&self, key: &str, value: String, ttl: Duration) -> Result<(), StoreError> {
        let ttl = TimeDelta::from_std(ttl).unwrap_or(TimeDelta::MAX);
        let expires_at = self
            .clock
            .now()
            .checked_add_signed(ttl)
            .unwrap_or(Timestamp::MAX_UTC);
        self.entries.insert(key.to_string(), (value, expires_at));
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StoreError> {
        self.entries.remove(key);
        Ok(())
    }
}
