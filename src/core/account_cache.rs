//! Cache-aside account accessor
//!
//! `AccountCache::resolve` checks the cache first and only reads the record
//! store on a miss, populating the cache when the store knows the card. After
//! every successful balance save, `write_through` refreshes the cached copy
//! under each of the account's cards so cache and store hold the same balance.
//!
//! The cache is an optimisation, never the source of truth: an unreadable or
//! unwritable cache entry is logged and the store is used instead.
//!
//! # Stale writes
//!
//! Saves and cache writes are not atomic together, so a slow writer may try to
//! cache an account after a newer version of it was cached. Every cache write
//! goes through a per-card version fence: a copy older than the newest version
//! already written for that card and account is dropped.

use crate::core::traits::{CacheStore, RecordStore};
use crate::types::{mask_card, Account, AccountId, CardNumber, WithdrawalError};
use dashmap::DashMap;
use log::{debug, warn};
use std::sync::Arc;
use std::time::Duration;

/// Account lookup by card through a TTL cache
#[derive(Clone)]
pub struct AccountCache {
    cache: Arc<dyn CacheStore>,
    store: Arc<dyn RecordStore>,
    ttl: Duration,
    /// Newest account version written to the cache, per card
    fences: Arc<DashMap<CardNumber, (AccountId, u64)>>,
}

impl AccountCache {
    pub fn new(cache: Arc<dyn CacheStore>, store: Arc<dyn RecordStore>, ttl: Duration) -> Self {
        Self {
            cache,
            store,
            ttl,
            fences: Arc::new(DashMap::new()),
        }
    }

    /// Account owning `card`, or `None` if the store does not know the card
    ///
    /// # Errors
    ///
    /// Returns `WithdrawalError::Store` only when the record store itself fails.
    pub fn resolve(&self, card: &str) -> Result<Option<Account>, WithdrawalError> {
        if let Some(account) = self.cached(card) {
            debug!("Account cache hit for card {}", mask_card(card));
            return Ok(Some(account));
        }

        debug!("Account cache miss for card {}", mask_card(card));
        self.refresh(card)
    }

    /// Read the account owning `card` from the store, bypassing the cache
    ///
    /// The cached copy is replaced unless a newer one is already there.
    pub fn refresh(&self, card: &str) -> Result<Option<Account>, WithdrawalError> {
        let Some(account) = self.store.find_account_by_card(card)? else {
            return Ok(None);
        };

        if self.put(card, &account) {
            debug!(
                "Populated account cache for card {} (account {})",
                mask_card(card),
                account.id
            );
        }
        Ok(Some(account))
    }

    /// Refresh the cached copy of `account` under every one of its cards
    pub fn write_through(&self, account: &Account) {
        for card in &account.cards {
            self.put(card, account);
        }
    }

    /// Drop every cached copy of `account`
    pub fn invalidate(&self, account: &Account) {
        for card in &account.cards {
            if let Err(e) = self.cache.remove(card) {
                warn!(
                    "Failed to invalidate cached account for card {}: {}",
                    mask_card(card),
                    e
                );
            }
        }
    }

    fn cached(&self, card: &str) -> Option<Account> {
        let raw = match self.cache.get(card) {
            Ok(raw) => raw?,
            Err(e) => {
                warn!("Account cache read failed for card {}: {}", mask_card(card), e);
                return None;
            }
        };

        match serde_json::from_str(&raw) {
            Ok(account) => Some(account),
            Err(e) => {
                warn!(
                    "Discarding undecodable cached account for card {}: {}",
                    mask_card(card),
                    e
                );
                None
            }
        }
    }

    /// Cache `account` under `card` unless a newer version was cached before
    ///
    /// Returns whether the copy was written.
    fn put(&self, card: &str, account: &Account) -> bool {
        // The fence entry stays locked until the cache write is done.
        let mut fence = self.fences.entry(card.to_string()).or_insert((account.id, 0));
        let (fenced_id, fenced_version) = *fence.value();
        if fenced_id == account.id && account.version < fenced_version {
            debug!(
                "Skipping stale cache write for card {} (version {} < {})",
                mask_card(card),
                account.version,
                fenced_version
            );
            return false;
        }

        let result = serde_json::to_string(account)
            .map_err(Into::into)
            .and_then(|raw| self.cache.set(card, raw, self.ttl));

        match result {
            Ok(()) => {
                *fence.value_mut() = (account.id, account.version);
                true
            }
            Err(e) => {
                warn!("Account cache write failed for card {}: {}", mask_card(card), e);
                false
            }
        }
    }
}
