//! Processing strategy module for operation log replay
//!
//! This module defines the Strategy pattern for complete replay pipelines,
//! encompassing CSV parsing, withdrawal processing and balance output. This
//! allows different implementations (synchronous, asynchronous batch) to be
//! selected at runtime.

use crate::cli::StrategyType;
use crate::config::EngineConfig;
use crate::core::{BatchProcessor, Clock, RecordStore, SystemClock, WithdrawalOrchestrator};
use crate::io::write_accounts_csv;
use crate::store::{InMemoryCacheStore, InMemoryRecordStore};
use crate::types::Account;
use log::warn;
use std::io::Write;
use std::path::Path;
use std::sync::Arc;

pub mod r#async;
pub mod sync;

pub use self::r#async::{AsyncProcessingStrategy, BatchConfig};
pub use sync::SyncProcessingStrategy;

/// Processing strategy trait for complete replay pipelines
pub trait ProcessingStrategy: Send + Sync {
    /// Replay an operation log against seeded accounts and write final balances
    ///
    /// # Arguments
    ///
    /// * `operations_path` - CSV operation log (`type,card,secret,amount,ref`)
    /// * `accounts_path` - CSV account seed (`account,card,balance`)
    /// * `output` - Writer receiving `account,balance` rows
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - Either input file cannot be opened
    /// - The account seed is contradictory
    /// - Output cannot be written
    ///
    /// Individual operation failures are logged and do not cause this method
    /// to return an error.
    fn process(
        &self,
        operations_path: &Path,
        accounts_path: &Path,
        output: &mut dyn Write,
    ) -> Result<(), String>;
}

/// In-memory engine shared by both strategies
pub(crate) struct ReplayEngine {
    pub processor: BatchProcessor,
    pub store: Arc<InMemoryRecordStore>,
}

impl ReplayEngine {
    pub fn new(config: &EngineConfig, accounts: Vec<Account>) -> Self {
        Self::with_clock(config, accounts, Arc::new(SystemClock::new()))
    }

    pub fn with_clock(config: &EngineConfig, accounts: Vec<Account>, clock: Arc<dyn Clock>) -> Self {
        let store = Arc::new(InMemoryRecordStore::new());
        store.seed(accounts.iter().cloned());
        let orchestrator = WithdrawalOrchestrator::new(
            config,
            store.clone(),
            Arc::new(InMemoryCacheStore::new(clock.clone())),
            clock,
        );

        Self {
            processor: BatchProcessor::new(Arc::new(orchestrator), &accounts),
            store,
        }
    }

    /// Report records left in flight and write final balances
    pub fn finish(&self, output: &mut dyn Write) -> Result<(), String> {
        match self.processor.orchestrator().in_flight_withdrawals() {
            Ok(in_flight) if !in_flight.is_empty() => {
                warn!("{} withdrawals left in flight", in_flight.len())
            }
            Ok(_) => {}
            Err(e) => warn!("Could not list in-flight withdrawals: {}", e),
        }

        let accounts = self
            .store
            .all_accounts()
            .map_err(|e| format!("Failed to read final balances: {}", e))?;
        write_accounts_csv(&accounts, output)
    }
}

/// Create a processing strategy based on the specified strategy type
///
/// # Arguments
///
/// * `strategy_type` - The type of processing strategy to create (Sync or Async)
/// * `engine` - Limits and windows applied to every replayed operation
/// * `batch` - Optional configuration for async batch processing (ignored for sync)
pub fn create_strategy(
    strategy_type: StrategyType,
    engine: EngineConfig,
    batch: Option<BatchConfig>,
) -> Box<dyn ProcessingStrategy> {
    match strategy_type {
        StrategyType::Sync => Box::new(SyncProcessingStrategy::new(engine)),
        StrategyType::Async => {
            let batch = batch.unwrap_or_default();
            Box::new(AsyncProcessingStrategy::new(engine, batch))
        }
    }
}
