//! Core business logic module
//!
//! This module contains the withdrawal processing components:
//! - `traits` - Ports to the record store, the cache and the clock
//! - `clock` - System and manually driven clocks
//! - `card_activity` - Per-card quota and duplicate-suppression state
//! - `policy_validator` - Ordered validation of withdrawal intents
//! - `account_cache` - Cache-aside account lookup with write-through
//! - `lifecycle` - Withdrawal status transition table
//! - `orchestrator` - Withdrawal processing and cancellation
//! - `batch_processor` - Concurrent replay of operation logs

pub mod account_cache;
pub mod batch_processor;
pub mod card_activity;
pub mod clock;
pub mod lifecycle;
pub mod orchestrator;
pub mod policy_validator;
pub mod traits;

pub use account_cache::AccountCache;
pub use batch_processor::{BatchProcessor, OperationOutcome, Partition, ProcessingResult};
pub use card_activity::{CardActivity, CardActivityStore};
pub use clock::{ManualClock, SystemClock};
pub use lifecycle::{transition, Transition, WithdrawalAction};
pub use orchestrator::WithdrawalOrchestrator;
pub use policy_validator::PolicyValidator;
pub use traits::{CacheStore, Clock, RecordStore};
