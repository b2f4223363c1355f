//! ATM Withdrawal Engine Library
//! # Overview
//!
//! This library provides the withdrawal core of an ATM service: policy
//! validation of withdrawal intents, a cache-aside account lookup, and an
//! orchestrator that debits, records and reverses withdrawals. A replay layer
//! feeds it from CSV operation logs with a sync and an async strategy.
//!
//! # Architecture
//!
//! - [`types`] - Core data types (Account, WithdrawalIntent, WithdrawalRecord, errors)
//! - [`config`] - Limits, time windows and settlement mode
//! - [`cli`] - CLI arguments parsing
//! - [`core`] - Business logic components:
//!   - [`core::policy_validator`] - Ordered checks, daily quota and duplicate window
//!   - [`core::account_cache`] - Cache-aside account resolution with write-through
//!   - [`core::lifecycle`] - Withdrawal status transition table
//!   - [`core::orchestrator`] - Withdrawal processing and cancellation
//!   - [`core::batch_processor`] - Account-partitioned replay
//! - [`store`] - In-memory record store and cache
//! - [`io`] - CSV operation logs, account seeds and balance output
//! - [`strategy`] - Sync and async replay pipelines
//!
//! # Operations
//!
//! - **Withdraw**: Validate the intent, debit the account and record the withdrawal
//! - **Complete**: Settle an in-progress withdrawal (deferred settlement only)
//! - **Cancel**: Reverse a completed withdrawal and restore the balance
//!
//! # Withdrawal States
//!
//! ```text
//! IN_PROGRESS ──complete──▶ COMPLETED ──cancel──▶ CANCELED
//! ```

// Module declarations
pub mod cli;
pub mod config;
pub mod core;
pub mod io;
pub mod store;
pub mod strategy;
pub mod types;

pub use config::{EngineConfig, SettlementMode, WithdrawalLimits};
pub use core::{AccountCache, BatchProcessor, PolicyValidator, WithdrawalOrchestrator};
pub use io::write_accounts_csv;
pub use types::{
    Account, CancelOutcome, Operation, RejectionReason, WithdrawalError, WithdrawalId,
    WithdrawalIntent, WithdrawalRecord, WithdrawalStatus,
};
