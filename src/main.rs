//! ATM Withdrawal Engine CLI
//!
//! Replays an operation log of withdrawals, completions and cancellations
//! against seeded accounts and prints the final balances.
//!
//! # Usage
//!
//! ```bash
//! cargo run -- --accounts accounts.csv operations.csv > balances.csv
//! cargo run -- --strategy sync --accounts accounts.csv operations.csv > balances.csv
//! cargo run -- --settlement deferred --duplicate-threshold-minutes 0 --accounts accounts.csv operations.csv
//! RUST_LOG=info cargo run -- --accounts accounts.csv operations.csv
//! ```
//!
//! # Processing Strategies
//!
//! - **sync**: Rows applied one at a time in log order
//! - **async**: Batches partitioned by account and applied in parallel (default)
//!
//! # Exit Codes
//!
//! - 0: Success
//! - 1: Error (missing arguments, file not found, contradictory account seed, etc.)

use atm_withdrawal_engine::cli;
use atm_withdrawal_engine::strategy;
use env_logger::Env;
use std::process;

fn main() {
    // Rejections are logged at error level; keep stdout for balances only.
    env_logger::Builder::from_env(Env::default().default_filter_or("warn")).init();

    let args = cli::parse_args();

    let strategy = {
        let batch = if matches!(args.strategy, cli::StrategyType::Async) {
            Some(args.to_batch_config())
        } else {
            None
        };
        strategy::create_strategy(args.strategy.clone(), args.to_engine_config(), batch)
    };

    let mut output = std::io::stdout();
    if let Err(e) = strategy.process(&args.operations_file, &args.accounts_file, &mut output) {
        eprintln!("Error: {}", e);
        process::exit(1);
    }
}
