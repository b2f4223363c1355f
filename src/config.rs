//! Engine configuration
//!
//! Limits, time windows and cache settings consumed by the validator, the
//! account cache and the orchestrator. Defaults match the reference ATM
//! policy; the CLI overrides any of them.

use chrono::TimeDelta;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::time::Duration;

/// Per-card daily withdrawal limits
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WithdrawalLimits {
    /// Maximum number of withdrawals per card per calendar day
    pub max_daily_count: u32,
    /// Maximum cumulative amount per card per calendar day
    pub max_daily_amount: Decimal,
}

impl Default for WithdrawalLimits {
    fn default() -> Self {
        Self {
            max_daily_count: 5,
            max_daily_amount: dec!(2000.00),
        }
    }
}

/// When a processed withdrawal is marked `COMPLETED`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SettlementMode {
    /// `process` completes the record right after persisting it
    #[default]
    Immediate,
    /// `process` leaves the record `IN_PROGRESS` until `complete` is called
    Deferred,
}

/// Complete engine configuration
#[derive(Debug, Clone, PartialEq)]
pub struct EngineConfig {
    /// Daily count and amount limits
    pub limits: WithdrawalLimits,
    /// Window in which a second request for the same card is a duplicate
    pub duplicate_threshold: TimeDelta,
    /// Time-to-live of cached accounts
    pub cache_ttl: Duration,
    /// Per-card state untouched for longer than this is evicted
    pub idle_eviction: TimeDelta,
    /// Settlement behaviour of `process`
    pub settlement: SettlementMode,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            limits: WithdrawalLimits::default(),
            duplicate_threshold: TimeDelta::minutes(1),
            cache_ttl: Duration::from_secs(10),
            idle_eviction: TimeDelta::hours(48),
            settlement: SettlementMode::Immediate,
        }
    }
}

impl EngineConfig {
    pub fn with_limits(mut self, limits: WithdrawalLimits) -> Self {
        self.limits = limits;
        self
    }

    pub fn with_duplicate_threshold(mut self, threshold: TimeDelta) -> Self {
        self.duplicate_threshold = threshold;
        self
    }

    pub fn with_cache_ttl(mut self, ttl: Duration) -> Self {
        self.cache_ttl = ttl;
        self
    }

    pub fn with_idle_eviction(mut self, idle: TimeDelta) -> Self {
        self.idle_eviction = idle;
        self
    }

    pub fn with_settlement(mut self, settlement: SettlementMode) -> Self {
        self.settlement = settlement;
        self
    }
}
