use crate::config::{EngineConfig, SettlementMode, WithdrawalLimits};
use crate::strategy::BatchConfig;
use chrono::TimeDelta;
use clap::{Parser, ValueEnum};
use log::warn;
use rust_decimal::Decimal;
use std::path::PathBuf;
use std::time::Duration;

/// Replay ATM withdrawal operations against seeded accounts
#[derive(Parser, Debug)]
#[command(name = "atm-withdrawal-engine")]
#[command(about = "Replay ATM withdrawal operations against seeded accounts", long_about = None)]
pub struct CliArgs {
    /// Operation log CSV file path
    #[arg(value_name = "OPERATIONS", help = "Path to the operation log CSV file")]
    pub operations_file: PathBuf,

    /// Account seed CSV file path
    #[arg(
        long = "accounts",
        value_name = "FILE",
        help = "Path to the account seed CSV file (account,card,balance)"
    )]
    pub accounts_file: PathBuf,

    /// Processing strategy to use for replaying operations
    #[arg(
        long = "strategy",
        value_name = "STRATEGY",
        default_value = "async",
        help = "Processing strategy: 'sync' for synchronous or 'async' for asynchronous"
    )]
    pub strategy: StrategyType,

    /// Number of operations per batch (async mode only)
    #[arg(
        long = "batch-size",
        value_name = "SIZE",
        help = "Number of operations per batch (default: 1000)"
    )]
    pub batch_size: Option<usize>,

    /// Number of runtime worker threads (async mode only)
    #[arg(
        long = "max-concurrent",
        value_name = "COUNT",
        help = "Number of worker threads processing partitions (default: CPU cores)"
    )]
    pub max_concurrent_batches: Option<usize>,

    #[arg(
        long = "max-daily-count",
        value_name = "COUNT",
        help = "Maximum withdrawals per card per day (default: 5)"
    )]
    pub max_daily_count: Option<u32>,

    #[arg(
        long = "max-daily-amount",
        value_name = "AMOUNT",
        help = "Maximum cumulative amount per card per day (default: 2000.00)"
    )]
    pub max_daily_amount: Option<Decimal>,

    #[arg(
        long = "duplicate-threshold-minutes",
        value_name = "MINUTES",
        help = "Window in which a repeated request for a card is a duplicate; 0 disables (default: 1)"
    )]
    pub duplicate_threshold_minutes: Option<i64>,

    #[arg(
        long = "cache-ttl-secs",
        value_name = "SECONDS",
        help = "Time-to-live of cached accounts (default: 10)"
    )]
    pub cache_ttl_secs: Option<u64>,

    #[arg(
        long = "idle-eviction-hours",
        value_name = "HOURS",
        help = "Forget per-card activity idle for longer than this (default: 48)"
    )]
    pub idle_eviction_hours: Option<i64>,

    #[arg(
        long = "settlement",
        value_name = "MODE",
        default_value = "immediate",
        help = "'immediate' completes withdrawals right away, 'deferred' waits for complete rows"
    )]
    pub settlement: SettlementArg,
}

/// Available processing strategies
#[derive(Clone, Debug, ValueEnum)]
pub enum StrategyType {
    Sync,
    Async,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum SettlementArg {
    Immediate,
    Deferred,
}

impl From<SettlementArg> for SettlementMode {
    fn from(arg: SettlementArg) -> Self {
        match arg {
            SettlementArg::Immediate => SettlementMode::Immediate,
            SettlementArg::Deferred => SettlementMode::Deferred,
        }
    }
}

impl CliArgs {
    /// Create a BatchConfig from CLI arguments
    ///
    /// Missing values fall back to defaults. Zero values are replaced by
    /// defaults with a warning.
    pub fn to_batch_config(&self) -> BatchConfig {
        if self.batch_size.is_some() || self.max_concurrent_batches.is_some() {
            let default = BatchConfig::default();
            BatchConfig::new(
                self.batch_size.unwrap_or(default.batch_size),
                self.max_concurrent_batches
                    .unwrap_or(default.max_concurrent_batches),
            )
        } else {
            BatchConfig::default()
        }
    }

    /// Create an EngineConfig from CLI arguments
    ///
    /// A zero or negative limit, TTL or eviction period is meaningless and is
    /// replaced by the default with a warning. A zero duplicate threshold is
    /// valid and disables duplicate suppression.
    pub fn to_engine_config(&self) -> EngineConfig {
        let default = EngineConfig::default();

        let max_daily_count = match self.max_daily_count {
            Some(0) => {
                warn!(
                    "Invalid max_daily_count (0), using default ({})",
                    default.limits.max_daily_count
                );
                default.limits.max_daily_count
            }
            Some(count) => count,
            None => default.limits.max_daily_count,
        };

        let max_daily_amount = match self.max_daily_amount {
            Some(amount) if amount <= Decimal::ZERO => {
                warn!(
                    "Invalid max_daily_amount ({}), using default ({})",
                    amount, default.limits.max_daily_amount
                );
                default.limits.max_daily_amount
            }
            Some(amount) => amount,
            None => default.limits.max_daily_amount,
        };

        let duplicate_threshold = match self.duplicate_threshold_minutes {
            Some(minutes) if minutes < 0 => {
                warn!(
                    "Invalid duplicate_threshold_minutes ({}), using default ({})",
                    minutes,
                    default.duplicate_threshold.num_minutes()
                );
                default.duplicate_threshold
            }
            Some(minutes) => TimeDelta::try_minutes(minutes).unwrap_or_else(|| {
                warn!(
                    "duplicate_threshold_minutes ({}) out of range, using default ({})",
                    minutes,
                    default.duplicate_threshold.num_minutes()
                );
                default.duplicate_threshold
            }),
            None => default.duplicate_threshold,
        };

        let cache_ttl = match self.cache_ttl_secs {
            Some(0) => {
                warn!(
                    "Invalid cache_ttl_secs (0), using default ({})",
                    default.cache_ttl.as_secs()
                );
                default.cache_ttl
            }
            Some(secs) => Duration::from_secs(secs),
            None => default.cache_ttl,
        };

        let idle_eviction = match self.idle_eviction_hours {
            Some(hours) if hours <= 0 => {
                warn!(
                    "Invalid idle_eviction_hours ({}), using default ({})",
                    hours,
                    default.idle_eviction.num_hours()
                );
                default.idle_eviction
            }
            Some(hours) => TimeDelta::try_hours(hours).unwrap_or_else(|| {
                warn!(
                    "idle_eviction_hours ({}) out of range, using default ({})",
                    hours,
                    default.idle_eviction.num_hours()
                );
                default.idle_eviction
            }),
            None => default.idle_eviction,
        };

        default
            .with_limits(WithdrawalLimits {
                max_daily_count,
                max_daily_amount,
            })
            .with_duplicate_threshold(duplicate_threshold)
            .with_cache_ttl(cache_ttl)
            .with_idle_eviction(idle_eviction)
            .with_settlement(self.settlement.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use rust_decimal_macros::dec;

    // Strategy parsing tests
    #[rstest]
    #[case::default_strategy(&["program", "--accounts", "a.csv", "ops.csv"], StrategyType::Async)]
    #[case::explicit_sync(&["program", "--strategy", "sync", "--accounts", "a.csv", "ops.csv"], StrategyType::Sync)]
    #[case::explicit_async(&["program", "--strategy", "async", "--accounts", "a.csv", "ops.csv"], StrategyType::Async)]
    fn test_strategy_parsing(#[case] args: &[&str], #[case] expected: StrategyType) {
        let parsed = CliArgs::try_parse_from(args).unwrap();
        match (&parsed.strategy, &expected) {
            (StrategyType::Sync, StrategyType::Sync) => (),
            (StrategyType::Async, StrategyType::Async) => (),
            _ => panic!("Expected {:?}, got {:?}", expected, parsed.strategy),
        }
    }

    // BatchConfig conversion tests
    #[rstest]
    #[case::all_defaults(&["program", "--accounts", "a.csv", "ops.csv"], 1000, num_cpus::get())]
    #[case::custom_batch_size(&["program", "--accounts", "a.csv", "--batch-size", "2000", "ops.csv"], 2000, num_cpus::get())]
    #[case::custom_max_concurrent(&["program", "--accounts", "a.csv", "--max-concurrent", "8", "ops.csv"], 1000, 8)]
    #[case::zero_batch_size(&["program", "--accounts", "a.csv", "--batch-size", "0", "ops.csv"], 1000, num_cpus::get())]
    fn test_batch_config_conversion(
        #[case] args: &[&str],
        #[case] expected_batch_size: usize,
        #[case] expected_max_concurrent: usize,
    ) {
        let parsed = CliArgs::try_parse_from(args).unwrap();
        let config = parsed.to_batch_config();

        assert_eq!(config.batch_size, expected_batch_size);
        assert_eq!(config.max_concurrent_batches, expected_max_concurrent);
    }

    #[test]
    fn test_engine_config_defaults() {
        let parsed = CliArgs::try_parse_from(["program", "--accounts", "a.csv", "ops.csv"]).unwrap();
        assert_eq!(parsed.to_engine_config(), EngineConfig::default());
    }

    #[test]
    fn test_engine_config_overrides() {
        let parsed = CliArgs::try_parse_from([
            "program",
            "--accounts",
            "a.csv",
            "--max-daily-count",
            "3",
            "--max-daily-amount",
            "750.50",
            "--duplicate-threshold-minutes",
            "0",
            "--cache-ttl-secs",
            "30",
            "--idle-eviction-hours",
            "24",
            "--settlement",
            "deferred",
            "ops.csv",
        ])
        .unwrap();

        let config = parsed.to_engine_config();

        assert_eq!(config.limits.max_daily_count, 3);
        assert_eq!(config.limits.max_daily_amount, dec!(750.50));
        assert_eq!(config.duplicate_threshold, TimeDelta::zero());
        assert_eq!(config.cache_ttl, Duration::from_secs(30));
        assert_eq!(config.idle_eviction, TimeDelta::hours(24));
        assert_eq!(config.settlement, SettlementMode::Deferred);
    }

    #[rstest]
    #[case::zero_count(&["program", "--accounts", "a.csv", "--max-daily-count", "0", "ops.csv"])]
    #[case::zero_amount(&["program", "--accounts", "a.csv", "--max-daily-amount", "0", "ops.csv"])]
    #[case::zero_ttl(&["program", "--accounts", "a.csv", "--cache-ttl-secs", "0", "ops.csv"])]
    #[case::zero_eviction(&["program", "--accounts", "a.csv", "--idle-eviction-hours", "0", "ops.csv"])]
    #[case::huge_threshold(&["program", "--accounts", "a.csv", "--duplicate-threshold-minutes", "9223372036854775807", "ops.csv"])]
    #[case::huge_eviction(&["program", "--accounts", "a.csv", "--idle-eviction-hours", "9223372036854775807", "ops.csv"])]
    fn test_engine_config_invalid_values_fall_back(#[case] args: &[&str]) {
        let parsed = CliArgs::try_parse_from(args).unwrap();
        assert_eq!(parsed.to_engine_config(), EngineConfig::default());
    }

    // Error handling tests
    #[rstest]
    #[case::missing_operations(&["program", "--accounts", "a.csv"])]
    #[case::missing_accounts(&["program", "ops.csv"])]
    #[case::invalid_strategy(&["program", "--strategy", "invalid", "--accounts", "a.csv", "ops.csv"])]
    #[case::invalid_settlement(&["program", "--settlement", "later", "--accounts", "a.csv", "ops.csv"])]
    #[case::invalid_amount(&["program", "--max-daily-amount", "lots", "--accounts", "a.csv", "ops.csv"])]
    fn test_parsing_errors(#[case] args: &[&str]) {
        let result = CliArgs::try_parse_from(args);
        assert!(result.is_err());
    }
}
