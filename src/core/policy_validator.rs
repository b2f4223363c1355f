//! Policy validation of withdrawal intents
//!
//! `PolicyValidator` runs a fixed sequence of checks against an intent and stops
//! at the first failure, which logs and reports its own reason:
//!
//! 1. the intent is present
//! 2. the card identifier is exactly 16 characters
//! 3. the secret code is exactly 4 characters
//! 4. the amount, truncated to whole units, is positive
//! 5. the daily count and amount limits of the card still allow it
//! 6. no other request for the card arrived within the duplicate window
//!
//! Checks 1-4 are stateless. Checks 5-6 read and update the card's entry in a
//! [`CardActivityStore`] while holding that entry exclusively, so two concurrent
//! requests for one card can never both squeeze under the same limit.
//!
//! # State changes on failure
//!
//! A new-day reset from check 5 is committed before check 6 runs and survives a
//! duplicate rejection. A same-day quota increase is only committed once check 6
//! has passed. A rejection by either check leaves everything else untouched.

use crate::config::{EngineConfig, WithdrawalLimits};
use crate::core::card_activity::CardActivityStore;
use crate::core::traits::Clock;
use crate::types::{mask_card, RejectionReason, Timestamp, WithdrawalIntent};
use chrono::TimeDelta;
use log::{debug, error};
use rust_decimal::Decimal;
use std::sync::Arc;

const VALID_CARD_NUMBER_LENGTH: usize = 16;
const VALID_SECRET_CODE_LENGTH: usize = 4;

/// Thread-safe withdrawal policy engine
#[derive(Clone)]
pub struct PolicyValidator {
    limits: WithdrawalLimits,
    duplicate_threshold: TimeDelta,
    idle_eviction: TimeDelta,
    activity: Arc<CardActivityStore>,
    clock: Arc<dyn Clock>,
}

impl PolicyValidator {
    /// Create a validator over an injected activity store and clock
    pub fn new(
        config: &EngineConfig,
        activity: Arc<CardActivityStore>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            limits: config.limits,
            duplicate_threshold: config.duplicate_threshold,
            idle_eviction: config.idle_eviction,
            activity,
            clock,
        }
    }

    /// Whether the intent passes every check
    pub fn evaluate(&self, intent: Option<&WithdrawalIntent>) -> bool {
        self.check(intent).is_ok()
    }

    /// Run every check in order, returning the first failure
    pub fn check(&self, intent: Option<&WithdrawalIntent>) -> Result<(), RejectionReason> {
        let intent = check_present(intent)?;
        check_card_format(intent)?;
        check_secret_format(intent)?;
        check_amount(intent)?;
        self.check_card_activity(intent)
    }

    /// Checks 5 and 6, performed atomically for the intent's card
    fn check_card_activity(&self, intent: &WithdrawalIntent) -> Result<(), RejectionReason> {
        let now = self.clock.now();
        let today = self.clock.today();

        self.activity.with_card(&intent.card, |activity| {
            let update = activity
                .plan_quota(intent.amount, now, today, &self.limits)
                .inspect_err(|reason| {
                    error!(
                        "Exceeded daily withdrawal limit or count for card {}: {}",
                        mask_card(&intent.card),
                        reason
                    );
                })?;

            if update.is_new_day() {
                debug!("New withdrawal day for card {}", mask_card(&intent.card));
                activity.apply_quota(&update);
            }

            activity
                .check_duplicate(now, self.duplicate_threshold)
                .inspect_err(|_| {
                    error!(
                        "Duplicate withdrawal request detected for card {}",
                        mask_card(&intent.card)
                    );
                })?;

            if !update.is_new_day() {
                activity.apply_quota(&update);
            }
            activity.last_request = Some(now);
            Ok(())
        })
    }

    /// Drop per-card state not seen within the configured idle period
    pub fn evict_idle(&self) -> usize {
        let cutoff = self
            .clock
            .now()
            .checked_sub_signed(self.idle_eviction)
            .unwrap_or(Timestamp::MIN_UTC);
        let evicted = self.activity.evict_idle(cutoff);
        if evicted > 0 {
            debug!("Evicted {} idle card entries", evicted);
        }
        evicted
    }

    /// The activity store backing checks 5 and 6
    pub fn activity(&self) -> &CardActivityStore {
        &self.activity
    }
}

/// Check 1: the intent must be present
pub fn check_present(intent: Option<&WithdrawalIntent>) -> Result<&WithdrawalIntent, RejectionReason> {
    intent.ok_or_else(|| {
        error!("Withdrawal request is null");
        RejectionReason::MissingIntent
    })
}

/// Check 2: card identifier length
pub fn check_card_format(intent: &WithdrawalIntent) -> Result<(), RejectionReason> {
    let length = intent.card.chars().count();
    if length != VALID_CARD_NUMBER_LENGTH {
        error!("Invalid card number format: {}", mask_card(&intent.card));
        return Err(RejectionReason::InvalidCardNumber { length });
    }
    Ok(())
}

/// Check 3: secret code length (the code itself is never logged)
pub fn check_secret_format(intent: &WithdrawalIntent) -> Result<(), RejectionReason> {
    let length = intent.secret.chars().count();
    if length != VALID_SECRET_CODE_LENGTH {
        error!(
            "Invalid secret code format for card {}",
            mask_card(&intent.card)
        );
        return Err(RejectionReason::InvalidSecretCode { length });
    }
    Ok(())
}

/// Check 4: amount truncated to whole units must be positive
pub fn check_amount(intent: &WithdrawalIntent) -> Result<(), RejectionReason> {
    if intent.amount.trunc() <= Decimal::ZERO {
        error!("Invalid withdrawal amount: {}", intent.amount);
        return Err(RejectionReason::NonPositiveAmount {
            amount: intent.amount,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::clock::ManualClock;
    use chrono::{TimeZone, Utc};
    use rstest::rstest;
    use rust_decimal_macros::dec;

    const CARD: &str = "1111222233334444";

    fn start() -> Timestamp {
        Utc.with_ymd_and_hms(2024, 5, 1, 9, 0, 0).unwrap()
    }

    fn validator(threshold: TimeDelta) -> (PolicyValidator, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(start()));
        let config = EngineConfig::default().with_duplicate_threshold(threshold);
        let validator =
            PolicyValidator::new(&config, Arc::new(CardActivityStore::new()), clock.clone());
        (validator, clock)
    }

    fn intent(amount: Decimal) -> WithdrawalIntent {
        WithdrawalIntent::new(CARD, "1234", amount)
    }

    #[test]
    fn test_missing_intent_rejected() {
        let (validator, _) = validator(TimeDelta::minutes(1));
        assert_eq!(validator.check(None), Err(RejectionReason::MissingIntent));
        assert!(!validator.evaluate(None));
    }

    #[rstest]
    #[case::short_card("111122223333444", "1234", dec!(10), RejectionReason::InvalidCardNumber { length: 15 })]
    #[case::long_card("11112222333344445", "1234", dec!(10), RejectionReason::InvalidCardNumber { length: 17 })]
    #[case::short_secret(CARD, "123", dec!(10), RejectionReason::InvalidSecretCode { length: 3 })]
    #[case::long_secret(CARD, "12345", dec!(10), RejectionReason::InvalidSecretCode { length: 5 })]
    #[case::zero_amount(CARD, "1234", dec!(0), RejectionReason::NonPositiveAmount { amount: dec!(0) })]
    #[case::fractional_amount(CARD, "1234", dec!(0.99), RejectionReason::NonPositiveAmount { amount: dec!(0.99) })]
    #[case::negative_amount(CARD, "1234", dec!(-5), RejectionReason::NonPositiveAmount { amount: dec!(-5) })]
    fn test_structural_rejections_leave_no_state(
        #[case] card: &str,
        #[case] secret: &str,
        #[case] amount: Decimal,
        #[case] expected: RejectionReason,
    ) {
        let (validator, _) = validator(TimeDelta::minutes(1));
        let intent = WithdrawalIntent::new(card, secret, amount);

        assert_eq!(validator.check(Some(&intent)), Err(expected));
        assert!(validator.activity().is_empty());
    }

    #[test]
    fn test_card_check_runs_before_secret_check() {
        let (validator, _) = validator(TimeDelta::minutes(1));
        let intent = WithdrawalIntent::new("123", "1", dec!(10));

        assert!(matches!(
            validator.check(Some(&intent)),
            Err(RejectionReason::InvalidCardNumber { .. })
        ));
    }

    #[test]
    fn test_first_withdrawal_of_day_accepted_regardless_of_amount() {
        let (validator, _) = validator(TimeDelta::minutes(1));

        assert!(validator.evaluate(Some(&intent(dec!(9000.00)))));

        let activity = validator.activity().snapshot(CARD).unwrap();
        assert_eq!(activity.daily_amount, dec!(9000.00));
        assert_eq!(activity.daily_count, 1);
        assert_eq!(activity.last_request, Some(start()));
    }

    #[test]
    fn test_daily_amount_limit() {
        let (validator, clock) = validator(TimeDelta::minutes(1));

        for _ in 0..4 {
            assert!(validator.evaluate(Some(&intent(dec!(500.00)))));
            clock.advance(TimeDelta::minutes(2));
        }
        let before = validator.activity().snapshot(CARD).unwrap();
        assert_eq!(before.daily_amount, dec!(2000.00));

        assert!(matches!(
            validator.check(Some(&intent(dec!(1.00)))),
            Err(RejectionReason::DailyLimitExceeded { count: 4, .. })
        ));
        assert_eq!(validator.activity().snapshot(CARD).unwrap(), before);
    }

    #[test]
    fn test_daily_count_limit() {
        let (validator, clock) = validator(TimeDelta::minutes(1));

        for _ in 0..5 {
            assert!(validator.evaluate(Some(&intent(dec!(10.00)))));
            clock.advance(TimeDelta::minutes(2));
        }

        assert!(!validator.evaluate(Some(&intent(dec!(10.00)))));
        let activity = validator.activity().snapshot(CARD).unwrap();
        assert_eq!(activity.daily_count, 5);
        assert_eq!(activity.daily_amount, dec!(50.00));
    }

    #[test]
    fn test_quota_resets_on_next_calendar_day() {
        let (validator, clock) = validator(TimeDelta::minutes(1));
        for _ in 0..5 {
            assert!(validator.evaluate(Some(&intent(dec!(400.00)))));
            clock.advance(TimeDelta::minutes(2));
        }
        assert!(!validator.evaluate(Some(&intent(dec!(1.00)))));

        clock.advance(TimeDelta::days(1));

        assert!(validator.evaluate(Some(&intent(dec!(2500.00)))));
        let activity = validator.activity().snapshot(CARD).unwrap();
        assert_eq!(activity.daily_count, 1);
        assert_eq!(activity.daily_amount, dec!(2500.00));
    }

    #[test]
    fn test_duplicate_within_window_rejected_then_accepted() {
        let (validator, clock) = validator(TimeDelta::minutes(1));

        assert!(validator.evaluate(Some(&intent(dec!(100.00)))));
        clock.advance(TimeDelta::seconds(30));

        assert!(matches!(
            validator.check(Some(&intent(dec!(100.00)))),
            Err(RejectionReason::DuplicateRequest { last_request }) if last_request == start()
        ));
        let activity = validator.activity().snapshot(CARD).unwrap();
        assert_eq!(activity.daily_count, 1);
        assert_eq!(activity.daily_amount, dec!(100.00));
        assert_eq!(activity.last_request, Some(start()));

        clock.advance(TimeDelta::seconds(31));
        assert!(validator.evaluate(Some(&intent(dec!(100.00)))));
        let activity = validator.activity().snapshot(CARD).unwrap();
        assert_eq!(activity.daily_count, 2);
        assert_eq!(activity.last_request, Some(clock.now()));
    }

    #[test]
    fn test_new_day_reset_survives_duplicate_rejection() {
        let (validator, clock) = validator(TimeDelta::hours(48));
        assert!(validator.evaluate(Some(&intent(dec!(100.00)))));

        clock.advance(TimeDelta::days(1));
        assert!(matches!(
            validator.check(Some(&intent(dec!(70.00)))),
            Err(RejectionReason::DuplicateRequest { .. })
        ));

        let activity = validator.activity().snapshot(CARD).unwrap();
        assert_eq!(activity.daily_amount, dec!(70.00));
        assert_eq!(activity.daily_count, 1);
        assert_eq!(activity.last_request, Some(start()));
    }

    #[test]
    fn test_cards_are_independent() {
        let (validator, _) = validator(TimeDelta::minutes(1));
        let other = WithdrawalIntent::new("9999888877776666", "4321", dec!(100.00));

        assert!(validator.evaluate(Some(&intent(dec!(100.00)))));
        assert!(validator.evaluate(Some(&other)));
        assert_eq!(validator.activity().len(), 2);
    }

    #[test]
    fn test_evict_idle_uses_configured_period() {
        let (validator, clock) = validator(TimeDelta::minutes(1));
        assert!(validator.evaluate(Some(&intent(dec!(100.00)))));

        clock.advance(TimeDelta::hours(47));
        assert_eq!(validator.evict_idle(), 0);

        clock.advance(TimeDelta::hours(2));
        assert_eq!(validator.evict_idle(), 1);
        assert!(validator.activity().is_empty());
    }
}
