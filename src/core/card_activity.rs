//! Per-card quota and duplicate-suppression state
//!
//! This module provides `CardActivity`, the running totals kept for one card,
//! and `CardActivityStore`, the concurrent map that owns them.
//!
//! # Design
//!
//! The quota rules are pure methods on `CardActivity` so each one can be tested
//! without any shared state. `CardActivityStore` wraps a `DashMap` and hands out
//! exclusive access to one card's entry at a time: requests for the same card
//! are serialized on the entry, while requests for different cards only contend
//! when they hash to the same shard.
//!
//! The store is injected into the validator instead of being a hidden global,
//! so tests can inspect or reset it and a distributed implementation can
//! replace it when the service runs on several nodes.

use crate::config::WithdrawalLimits;
use crate::types::{CardNumber, RejectionReason, Timestamp};
use chrono::{NaiveDate, TimeDelta};
use dashmap::DashMap;
use rust_decimal::Decimal;

/// Running totals for a single card
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CardActivity {
    /// When the last accepted withdrawal was counted
    pub last_withdrawal: Option<Timestamp>,
    /// Calendar day the daily totals belong to
    pub withdrawal_day: Option<NaiveDate>,
    /// Cumulative amount accepted on `withdrawal_day`
    pub daily_amount: Decimal,
    /// Number of withdrawals accepted on `withdrawal_day`
    pub daily_count: u32,
    /// When the last request passed duplicate suppression
    pub last_request: Option<Timestamp>,
}

/// Quota change computed for an accepted request, applied separately
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum QuotaUpdate {
    /// First withdrawal of a new calendar day: totals restart from this request
    NewDay {
        amount: Decimal,
        at: Timestamp,
        day: NaiveDate,
    },
    /// Another withdrawal on the current day: totals become the given values
    SameDay {
        daily_amount: Decimal,
        daily_count: u32,
        at: Timestamp,
    },
}

impl QuotaUpdate {
    pub fn is_new_day(&self) -> bool {
        matches!(self, QuotaUpdate::NewDay { .. })
    }
}

impl CardActivity {
    /// Decide whether `amount` fits in today's quota
    ///
    /// The first withdrawal of a day is always within limits, whatever its
    /// amount. Later ones must keep both the cumulative amount and the count
    /// inside `limits`. Nothing is mutated; see [`CardActivity::apply_quota`].
    pub fn plan_quota(
        &self,
        amount: Decimal,
        now: Timestamp,
        today: NaiveDate,
        limits: &WithdrawalLimits,
    ) -> Result<QuotaUpdate, RejectionReason> {
        let same_day = matches!(self.withdrawal_day, Some(day) if day >= today);
        if !same_day {
            return Ok(QuotaUpdate::NewDay {
                amount,
                at: now,
                day: today,
            });
        }

        let exceeded = || RejectionReason::DailyLimitExceeded {
            count: self.daily_count,
            withdrawn: self.daily_amount,
            requested: amount,
        };

        let daily_amount = self.daily_amount.checked_add(amount).ok_or_else(exceeded)?;
        let daily_count = self.daily_count.saturating_add(1);

        if daily_amount <= limits.max_daily_amount && daily_count <= limits.max_daily_count {
            Ok(QuotaUpdate::SameDay {
                daily_amount,
                daily_count,
                at: now,
            })
        } else {
            Err(exceeded())
        }
    }

    /// Commit a planned quota change
    pub fn apply_quota(&mut self, update: &QuotaUpdate) {
        match *update {
            QuotaUpdate::NewDay { amount, at, day } => {
                self.daily_amount = amount;
                self.daily_count = 1;
                self.withdrawal_day = Some(day);
                self.last_withdrawal = Some(at);
            }
            QuotaUpdate::SameDay {
                daily_amount,
                daily_count,
                at,
            } => {
                self.daily_amount = daily_amount;
                self.daily_count = daily_count;
                self.last_withdrawal = Some(at);
            }
        }
    }

    /// Reject a request arriving within `threshold` of the previous one
    pub fn check_duplicate(
        &self,
        now: Timestamp,
        threshold: TimeDelta,
    ) -> Result<(), RejectionReason> {
        match self.last_request {
            Some(last) => {
                // A window too large to compute covers every earlier request.
                let inside_window = now
                    .checked_sub_signed(threshold)
                    .is_none_or(|cutoff| cutoff < last);
                if inside_window {
                    Err(RejectionReason::DuplicateRequest { last_request: last })
                } else {
                    Ok(())
                }
            }
            None => Ok(()),
        }
    }

    /// Most recent time this card was seen by either check
    pub fn last_seen(&self) -> Option<Timestamp> {
        self.last_withdrawal.max(self.last_request)
    }
}

/// Concurrent map of per-card activity keyed by card identifier
#[derive(Debug, Default)]
pub struct CardActivityStore {
    cards: DashMap<CardNumber, CardActivity>,
}

impl CardActivityStore {
    pub fn new() -> Self {
        Self {
            cards: DashMap::new(),
        }
    }

    /// Run `f` with exclusive access to the card's entry
    ///
    /// The entry is created with empty totals on first use. No other caller
    /// can read or modify this card's entry until `f` returns, so `f` must not
    /// block on I/O.
    pub fn with_card<F, T>(&self, card: &str, f: F) -> T
    where
        F: FnOnce(&mut CardActivity) -> T,
    {
        let mut entry = self.cards.entry(card.to_string()).or_default();
        f(entry.value_mut())
    }

    /// Copy of the card's current state, if any
    pub fn snapshot(&self, card: &str) -> Option<CardActivity> {
        self.cards.get(card).map(|entry| entry.value().clone())
    }

    /// Drop every entry last seen before `cutoff`; returns how many were dropped
    pub fn evict_idle(&self, cutoff: Timestamp) -> usize {
        let mut evicted = 0;
        self.cards.retain(|_, activity| {
            let keep = activity.last_seen().is_some_and(|seen| seen >= cutoff);
            if !keep {
                evicted += 1;
            }
            keep
        });
        evicted
    }

    pub fn len(&self) -> usize {
        self.cards.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cards.is_empty()
    }

    /// Forget all cards
    pub fn clear(&self) {
        self.cards.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use rstest::rstest;
    use rust_decimal_macros::dec;

    fn noon() -> Timestamp {
        Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap()
    }

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 5, d).unwrap()
    }

    fn activity_with(count: u32, amount: Decimal) -> CardActivity {
        CardActivity {
            last_withdrawal: Some(noon()),
            withdrawal_day: Some(day(1)),
            daily_amount: amount,
            daily_count: count,
            last_request: Some(noon()),
        }
    }

    #[test]
    fn test_first_withdrawal_ignores_amount_limit() {
        let activity = CardActivity::default();
        let limits = WithdrawalLimits::default();

        let update = activity
            .plan_quota(dec!(5000.00), noon(), day(1), &limits)
            .unwrap();

        assert!(update.is_new_day());
    }

    #[test]
    fn test_new_day_resets_totals() {
        let mut activity = activity_with(5, dec!(2000.00));
        let limits = WithdrawalLimits::default();
        let tomorrow = noon() + TimeDelta::days(1);

        let update = activity
            .plan_quota(dec!(300.00), tomorrow, day(2), &limits)
            .unwrap();
        activity.apply_quota(&update);

        assert_eq!(activity.daily_amount, dec!(300.00));
        assert_eq!(activity.daily_count, 1);
        assert_eq!(activity.withdrawal_day, Some(day(2)));
        assert_eq!(activity.last_withdrawal, Some(tomorrow));
    }

    #[rstest]
    #[case::fits(1, dec!(1000.00), dec!(1000.00), true)]
    #[case::amount_over_by_one_cent(1, dec!(1000.00), dec!(1000.01), false)]
    #[case::count_at_limit(4, dec!(100.00), dec!(100.00), true)]
    #[case::count_over(5, dec!(100.00), dec!(100.00), false)]
    fn test_same_day_limits(
        #[case] count: u32,
        #[case] withdrawn: Decimal,
        #[case] requested: Decimal,
        #[case] accepted: bool,
    ) {
        let activity = activity_with(count, withdrawn);
        let limits = WithdrawalLimits::default();

        let result = activity.plan_quota(requested, noon(), day(1), &limits);

        assert_eq!(result.is_ok(), accepted);
    }

    #[test]
    fn test_rejected_plan_does_not_mutate() {
        let activity = activity_with(5, dec!(500.00));
        let before = activity.clone();

        let result =
            activity.plan_quota(dec!(10.00), noon(), day(1), &WithdrawalLimits::default());

        assert!(matches!(
            result,
            Err(RejectionReason::DailyLimitExceeded { count: 5, .. })
        ));
        assert_eq!(activity, before);
    }

    #[test]
    fn test_same_day_update_accumulates() {
        let mut activity = activity_with(2, dec!(300.00));
        let later = noon() + TimeDelta::hours(1);

        let update = activity
            .plan_quota(dec!(200.00), later, day(1), &WithdrawalLimits::default())
            .unwrap();
        activity.apply_quota(&update);

        assert_eq!(activity.daily_amount, dec!(500.00));
        assert_eq!(activity.daily_count, 3);
        assert_eq!(activity.last_withdrawal, Some(later));
    }

    #[rstest]
    #[case::inside_window(TimeDelta::seconds(59), true)]
    #[case::window_boundary(TimeDelta::seconds(60), false)]
    #[case::after_window(TimeDelta::minutes(5), false)]
    fn test_duplicate_window(#[case] elapsed: TimeDelta, #[case] duplicate: bool) {
        let activity = activity_with(1, dec!(10.00));

        let result = activity.check_duplicate(noon() + elapsed, TimeDelta::minutes(1));

        assert_eq!(result.is_err(), duplicate);
    }

    #[test]
    fn test_no_previous_request_is_never_duplicate() {
        let activity = CardActivity::default();
        assert!(activity.check_duplicate(noon(), TimeDelta::minutes(10)).is_ok());
    }

    #[test]
    fn test_store_creates_entries_lazily() {
        let store = CardActivityStore::new();
        assert!(store.snapshot("1111222233334444").is_none());

        store.with_card("1111222233334444", |activity| {
            activity.last_request = Some(noon());
        });

        let snapshot = store.snapshot("1111222233334444").unwrap();
        assert_eq!(snapshot.last_request, Some(noon()));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_evict_idle_drops_only_stale_cards() {
        let store = CardActivityStore::new();
        store.with_card("old", |a| a.last_request = Some(noon() - TimeDelta::hours(72)));
        store.with_card("fresh", |a| a.last_request = Some(noon()));
        store.with_card("never-seen", |_| ());

        let evicted = store.evict_idle(noon() - TimeDelta::hours(48));

        assert_eq!(evicted, 2);
        assert!(store.snapshot("fresh").is_some());
        assert!(store.snapshot("old").is_none());

        store.clear();
        assert!(store.is_empty());
    }
}
