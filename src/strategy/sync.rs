//! Synchronous processing strategy
//!
//! Replays an operation log on the calling thread, one row at a time, in log
//! order.
//!
//! # Design
//!
//! The SyncProcessingStrategy focuses on orchestration, delegating:
//! - CSV parsing to `SyncReader` (iterator interface) and `read_accounts`
//! - Withdrawal processing to the `BatchProcessor` of a `ReplayEngine`
//! - CSV output to `csv_format::write_accounts_csv`
//!
//! Operations are streamed, so memory use is bounded by the accounts and the
//! withdrawal records, not by the length of the log. Idle per-card state is
//! evicted every [`EVICTION_INTERVAL`] rows.

use crate::config::EngineConfig;
use crate::io::sync_reader::{read_accounts, SyncReader};
use crate::strategy::{ProcessingStrategy, ReplayEngine};
use crate::types::Operation;
use log::warn;
use std::io::Write;
use std::path::Path;

/// Rows replayed between two idle evictions
pub const EVICTION_INTERVAL: usize = 1000;

/// Synchronous processing strategy
///
/// ```no_run
/// use atm_withdrawal_engine::config::EngineConfig;
/// use atm_withdrawal_engine::strategy::{ProcessingStrategy, SyncProcessingStrategy};
/// use std::path::Path;
///
/// let strategy = SyncProcessingStrategy::new(EngineConfig::default());
/// let mut output = std::io::stdout();
///
/// strategy
///     .process(Path::new("operations.csv"), Path::new("accounts.csv"), &mut output)
///     .expect("Processing failed");
/// ```
#[derive(Debug, Clone)]
pub struct SyncProcessingStrategy {
    config: EngineConfig,
}

impl SyncProcessingStrategy {
    pub fn new(config: EngineConfig) -> Self {
        Self { config }
    }
}

impl ProcessingStrategy for SyncProcessingStrategy {
    fn process(
        &self,
        operations_path: &Path,
        accounts_path: &Path,
        output: &mut dyn Write,
    ) -> Result<(), String> {
        let accounts = read_accounts(accounts_path)?;
        let reader = SyncReader::new(operations_path)?;
        let engine = ReplayEngine::new(&self.config, accounts);

        replay(&engine, reader, EVICTION_INTERVAL);
        engine.finish(output)
    }
}

fn replay(
    engine: &ReplayEngine,
    rows: impl Iterator<Item = Result<Operation, String>>,
    eviction_interval: usize,
) {
    for (index, row) in rows.enumerate() {
        match row {
            Ok(operation) => {
                engine.processor.process_operation(operation);
            }
            Err(e) => warn!("{}", e),
        }

        if (index + 1) % eviction_interval == 0 {
            engine.processor.orchestrator().validator().evict_idle();
        }
    }
}
