//! Withdrawal orchestration
//!
//! `WithdrawalOrchestrator` ties the policy validator, the account cache and
//! the record store together into the two caller-facing operations:
//!
//! - [`process`](WithdrawalOrchestrator::process) validates an intent, debits
//!   the account and records the withdrawal
//! - [`cancel`](WithdrawalOrchestrator::cancel) reverses a completed withdrawal
//!
//! # Write ordering
//!
//! `process` persists the debited balance first, then the record as
//! `IN_PROGRESS`, then the record as `COMPLETED`. A failure after the balance
//! write leaves an in-flight record (or, if even the first record write fails,
//! returns `UnrecordedBalanceChange`) so the inconsistency can be found by
//! [`in_flight_withdrawals`](WithdrawalOrchestrator::in_flight_withdrawals).
//! A `COMPLETED` record therefore always implies an applied debit.
//!
//! # Concurrency
//!
//! Account saves are optimistic. A stale account version is reported as
//! `ConcurrentModification` after dropping the cached copy; nothing is retried.
//! Concurrent cancellations of one withdrawal are serialized by a per-record
//! guard: the loser fails with `CancellationInProgress`.

use crate::config::{EngineConfig, SettlementMode};
use crate::core::account_cache::AccountCache;
use crate::core::card_activity::CardActivityStore;
use crate::core::lifecycle::{transition, Transition, WithdrawalAction};
use crate::core::policy_validator::PolicyValidator;
use crate::core::traits::{CacheStore, Clock, RecordStore};
use crate::types::{
    mask_card, Account, CancelOutcome, StoreError, WithdrawalError, WithdrawalId,
    WithdrawalIntent, WithdrawalRecord, WithdrawalStatus,
};
use dashmap::DashMap;
use log::{debug, error, info, warn};
use std::sync::Arc;

/// Withdrawal state machine over injected collaborators
pub struct WithdrawalOrchestrator {
    validator: PolicyValidator,
    accounts: AccountCache,
    store: Arc<dyn RecordStore>,
    clock: Arc<dyn Clock>,
    settlement: SettlementMode,
    /// Withdrawals with a cancellation currently running
    cancellations: DashMap<WithdrawalId, ()>,
}

impl WithdrawalOrchestrator {
    /// Create an orchestrator with fresh per-card state
    pub fn new(
        config: &EngineConfig,
        store: Arc<dyn RecordStore>,
        cache: Arc<dyn CacheStore>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self::with_activity(
            config,
            store,
            cache,
            clock,
            Arc::new(CardActivityStore::new()),
        )
    }

    /// Create an orchestrator over an existing per-card activity store
    pub fn with_activity(
        config: &EngineConfig,
        store: Arc<dyn RecordStore>,
        cache: Arc<dyn CacheStore>,
        clock: Arc<dyn Clock>,
        activity: Arc<CardActivityStore>,
    ) -> Self {
        Self {
            validator: PolicyValidator::new(config, activity, Arc::clone(&clock)),
            accounts: AccountCache::new(cache, Arc::clone(&store), config.cache_ttl),
            store,
            clock,
            settlement: config.settlement,
            cancellations: DashMap::new(),
        }
    }

    pub fn validator(&self) -> &PolicyValidator {
        &self.validator
    }

    /// Validate, debit and record a withdrawal
    ///
    /// Returns the persisted record: `COMPLETED` under immediate settlement,
    /// `IN_PROGRESS` under deferred settlement.
    ///
    /// # Errors
    ///
    /// * `Rejected` - the validator refused the intent; nothing changed
    /// * `AccountNotFound` / `InsufficientBalance` - no balance or record change
    /// * `ConcurrentModification` - the account changed underneath; nothing written
    /// * `UnrecordedBalanceChange` - debit persisted, record not
    /// * `Store` - any other collaborator failure
    pub fn process(&self, intent: &WithdrawalIntent) -> Result<WithdrawalRecord, WithdrawalError> {
        self.validator.check(Some(intent))?;

        let not_found = || {
            warn!("No account for card {}", mask_card(&intent.card));
            WithdrawalError::account_not_found(&intent.card)
        };
        let mut account = self.accounts.resolve(&intent.card)?.ok_or_else(not_found)?;

        if intent.amount > account.balance {
            // Only the store's balance may refuse a withdrawal.
            debug!(
                "Cached balance of account {} too low, re-reading from store",
                account.id
            );
            account = self.accounts.refresh(&intent.card)?.ok_or_else(not_found)?;
        }

        if intent.amount > account.balance {
            warn!(
                "Insufficient balance on account {}: balance {}, requested {}",
                account.id, account.balance, intent.amount
            );
            return Err(WithdrawalError::insufficient_balance(
                account.id,
                account.balance,
                intent.amount,
            ));
        }

        let mut debited = account.clone();
        debited.balance = account
            .balance
            .checked_sub(intent.amount)
            .ok_or_else(|| WithdrawalError::arithmetic_overflow("debit", account.id))?;
        let debited = self.save_balance(&debited)?;
        info!(
            "Debited {} from account {}, balance now {}",
            intent.amount, debited.id, debited.balance
        );

        let record = WithdrawalRecord::in_flight(intent, debited.id, self.clock.now());
        self.store.save_withdrawal(&record).map_err(|source| {
            error!(
                "Account {} debited but withdrawal {} could not be recorded: {}",
                debited.id, record.id, source
            );
            WithdrawalError::UnrecordedBalanceChange {
                account: debited.id,
                delta: -intent.amount,
                withdrawal: record.id,
                source,
            }
        })?;
        debug!("Withdrawal {} recorded as {}", record.id, record.status);

        match self.settlement {
            SettlementMode::Immediate => self.settle(record),
            SettlementMode::Deferred => Ok(record),
        }
    }

    /// Mark an in-flight withdrawal as settled
    ///
    /// Completing an already `COMPLETED` withdrawal returns it unchanged.
    pub fn complete(&self, id: WithdrawalId) -> Result<WithdrawalRecord, WithdrawalError> {
        let record = self.find(id)?;
        self.settle(record)
    }

    /// Reverse a completed withdrawal
    ///
    /// # Errors
    ///
    /// * `WithdrawalNotFound` - unknown ID
    /// * `CancelConflict` - the withdrawal is still in flight; nothing changed
    /// * `CancellationInProgress` - another cancellation of this ID is running
    /// * `AccountMismatch` - the card no longer resolves to the debited account
    /// * `ConcurrentModification` / `UnrecordedBalanceChange` / `Store` - as for `process`
    pub fn cancel(&self, id: WithdrawalId) -> Result<CancelOutcome, WithdrawalError> {
        let _guard = self.begin_cancellation(id)?;
        let record = self.find(id)?;

        match transition(record.status, WithdrawalAction::Cancel) {
            Transition::Stay => {
                debug!("Withdrawal {} already canceled", id);
                Ok(CancelOutcome::AlreadyCanceled(record))
            }
            Transition::Rejected => {
                error!(
                    "Refusing to cancel withdrawal {} in status {}",
                    id, record.status
                );
                Err(WithdrawalError::CancelConflict {
                    id,
                    status: record.status,
                })
            }
            Transition::Move(next) => self.reverse(record, next),
        }
    }

    /// Withdrawals still `IN_PROGRESS`, oldest first
    ///
    /// Under immediate settlement these are records whose completion could not
    /// be persisted and need reconciliation.
    pub fn in_flight_withdrawals(&self) -> Result<Vec<WithdrawalRecord>, WithdrawalError> {
        Ok(self
            .store
            .find_withdrawals_by_status(WithdrawalStatus::InProgress)?)
    }

    fn find(&self, id: WithdrawalId) -> Result<WithdrawalRecord, WithdrawalError> {
        self.store
            .find_withdrawal_by_id(id)?
            .ok_or_else(|| WithdrawalError::withdrawal_not_found(id))
    }

    fn settle(&self, mut record: WithdrawalRecord) -> Result<WithdrawalRecord, WithdrawalError> {
        match transition(record.status, WithdrawalAction::Complete) {
            Transition::Stay => Ok(record),
            Transition::Rejected => Err(WithdrawalError::IllegalTransition {
                id: record.id,
                from: record.status,
                action: WithdrawalAction::Complete,
            }),
            Transition::Move(next) => {
                record.status = next;
                record.updated_at = self.clock.now();
                self.store.save_withdrawal(&record).inspect_err(|e| {
                    error!(
                        "Withdrawal {} debited but left in flight: {}",
                        record.id, e
                    );
                })?;
                debug!("Withdrawal {} moved to {}", record.id, record.status);
                Ok(record)
            }
        }
    }

    fn reverse(
        &self,
        mut record: WithdrawalRecord,
        next: WithdrawalStatus,
    ) -> Result<CancelOutcome, WithdrawalError> {
        let account = self
            .accounts
            .resolve(&record.card)?
            .ok_or_else(|| WithdrawalError::account_not_found(&record.card))?;

        if account.id != record.account_id {
            error!(
                "Withdrawal {} was debited from account {} but card {} now resolves to {}",
                record.id,
                record.account_id,
                mask_card(&record.card),
                account.id
            );
            return Err(WithdrawalError::AccountMismatch {
                id: record.id,
                expected: record.account_id,
                found: account.id,
            });
        }

        let mut credited = account.clone();
        credited.balance = account
            .balance
            .checked_add(record.amount)
            .ok_or_else(|| WithdrawalError::arithmetic_overflow("credit", account.id))?;
        let credited = self.save_balance(&credited)?;
        info!(
            "Credited {} back to account {}, balance now {}",
            record.amount, credited.id, credited.balance
        );

        record.status = next;
        record.updated_at = self.clock.now();
        self.store.save_withdrawal(&record).map_err(|source| {
            error!(
                "Account {} credited but withdrawal {} could not be marked {}: {}",
                credited.id, record.id, next, source
            );
            WithdrawalError::UnrecordedBalanceChange {
                account: credited.id,
                delta: record.amount,
                withdrawal: record.id,
                source,
            }
        })?;
        debug!("Withdrawal {} moved to {}", record.id, record.status);

        Ok(CancelOutcome::Canceled(record))
    }

    /// Persist a balance change and refresh the cache
    fn save_balance(&self, account: &Account) -> Result<Account, WithdrawalError> {
        match self.store.save_account(account) {
            Ok(saved) => {
                self.accounts.write_through(&saved);
                Ok(saved)
            }
            Err(StoreError::VersionConflict {
                account: id,
                expected,
                found,
            }) => {
                warn!(
                    "Account {} changed concurrently (version {} != {})",
                    id, expected, found
                );
                self.accounts.invalidate(account);
                Err(WithdrawalError::ConcurrentModification { account: id })
            }
            Err(e) => Err(e.into()),
        }
    }

    fn begin_cancellation(&self, id: WithdrawalId) -> Result<CancellationGuard<'_>, WithdrawalError> {
        if self.cancellations.insert(id, ()).is_some() {
            warn!("Cancellation of withdrawal {} already running", id);
            return Err(WithdrawalError::CancellationInProgress { id });
        }
        Ok(CancellationGuard {
            active: &self.cancellations,
            id,
        })
    }
}

/// Marks a withdrawal as being canceled until dropped
struct CancellationGuard<'a> {
    active: &'a DashMap<WithdrawalId, ()>,
    id: WithdrawalId,
}

impl Drop for CancellationGuard<'_> {
    fn drop(&mut self) {
        self.active.remove(&self.id);
    }
}
