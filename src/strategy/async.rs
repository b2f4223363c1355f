//! Asynchronous batch processing strategy
//!
//! Replays an operation log in batches on a multi-threaded tokio runtime.
//!
//! # Architecture
//!
//! ```text
//! AsyncProcessingStrategy
//!     ├── EngineConfig (limits, windows, settlement)
//!     ├── BatchConfig (batch_size, max_concurrent_batches)
//!     ├── AsyncReader (batch CSV reading)
//!     └── ReplayEngine
//!         └── BatchProcessor (account partitioning + blocking workers)
//!             └── WithdrawalOrchestrator
//! ```
//!
//! # Ordering
//!
//! - Batches are processed one after another
//! - Within a batch, partitions (one per account) run in parallel
//! - Within a partition, operations run in log order
//!
//! Operations on one account therefore see exactly the same order as under
//! the sync strategy. Per-card state idle for longer than the configured
//! period is evicted after every batch.

use crate::config::EngineConfig;
use crate::io::async_reader::AsyncReader;
use crate::io::sync_reader::read_accounts;
use crate::strategy::{ProcessingStrategy, ReplayEngine};
use log::warn;
use std::io::Write;
use std::path::Path;

/// Configuration for batch processing
#[derive(Clone, Debug)]
pub struct BatchConfig {
    /// Number of operations per batch
    pub batch_size: usize,
    /// Number of runtime worker threads
    pub max_concurrent_batches: usize,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            batch_size: 1000,
            max_concurrent_batches: num_cpus::get(),
        }
    }
}

impl BatchConfig {
    /// Create a new BatchConfig, replacing zero values with defaults
    pub fn new(batch_size: usize, max_concurrent_batches: usize) -> Self {
        let default = Self::default();

        let batch_size = if batch_size == 0 {
            warn!(
                "Invalid batch_size ({}), using default ({})",
                batch_size, default.batch_size
            );
            default.batch_size
        } else {
            batch_size
        };

        let max_concurrent_batches = if max_concurrent_batches == 0 {
            warn!(
                "Invalid max_concurrent_batches ({}), using default ({})",
                max_concurrent_batches, default.max_concurrent_batches
            );
            default.max_concurrent_batches
        } else {
            max_concurrent_batches
        };

        Self {
            batch_size,
            max_concurrent_batches,
        }
    }
}

/// Asynchronous batch processing strategy
#[derive(Debug, Clone)]
pub struct AsyncProcessingStrategy {
    engine: EngineConfig,
    batch: BatchConfig,
}

impl AsyncProcessingStrategy {
    pub fn new(engine: EngineConfig, batch: BatchConfig) -> Self {
        Self { engine, batch }
    }
}

impl ProcessingStrategy for AsyncProcessingStrategy {
    fn process(
        &self,
        operations_path: &Path,
        accounts_path: &Path,
        output: &mut dyn Write,
    ) -> Result<(), String> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(self.batch.max_concurrent_batches)
            .build()
            .map_err(|e| format!("Failed to create tokio runtime: {}", e))?;

        let accounts = read_accounts(accounts_path)?;

        runtime.block_on(async {
            let engine = ReplayEngine::new(&self.engine, accounts);

            let file = tokio::fs::File::open(operations_path).await.map_err(|e| {
                format!(
                    "Failed to open file '{}': {}",
                    operations_path.display(),
                    e
                )
            })?;

            // csv-async reads through the futures I/O traits.
            let compat_file = tokio_util::compat::TokioAsyncReadCompatExt::compat(file);
            let mut reader = AsyncReader::new(compat_file);

            loop {
                let batch = reader.read_batch(self.batch.batch_size).await;
                if batch.is_empty() {
                    break;
                }

                // Finish this batch before reading the next so an account's
                // operations spanning two batches keep their order.
                engine.processor.process_batch(batch).await;
                engine.processor.orchestrator().validator().evict_idle();
            }

            engine.finish(output)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeDelta;
    use tempfile::NamedTempFile;

    /// Helper function to create a temporary CSV file for testing
    fn create_temp_csv(content: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().expect("Failed to create temp file");
        file.write_all(content.as_bytes())
            .expect("Failed to write to temp file");
        file.flush().expect("Failed to flush temp file");
        file
    }

    #[test]
    fn test_batch_config_zero_values_fall_back() {
        let config = BatchConfig::new(0, 0);
        assert_eq!(config.batch_size, 1000);
        assert_eq!(config.max_concurrent_batches, num_cpus::get());

        let config = BatchConfig::new(5, 2);
        assert_eq!(config.batch_size, 5);
        assert_eq!(config.max_concurrent_batches, 2);
    }

    #[test]
    fn test_async_strategy_handles_missing_file() {
        let accounts = create_temp_csv("account,card,balance\n");
        let strategy = AsyncProcessingStrategy::new(EngineConfig::default(), BatchConfig::default());
        let mut output = Vec::new();

        let result = strategy.process(Path::new("nonexistent.csv"), accounts.path(), &mut output);

        assert!(result.unwrap_err().contains("Failed to open file"));
    }

    #[test]
    fn test_async_strategy_maintains_ordering_across_batches() {
        // Small batches split each account's operations across several batches.
        let operations = create_temp_csv(
            "type,card,secret,amount,ref\n\
             withdraw,1111000000000001,1234,100.00,w1\n\
             withdraw,2222000000000001,1234,50.00,w2\n\
             withdraw,1111000000000002,1234,30.00,w3\n\
             cancel,1111000000000001,,,w1\n\
             withdraw,2222000000000001,1234,25.00,w4\n\
             withdraw,1111000000000001,1234,20.00,w5\n",
        );
        let accounts = create_temp_csv(
            "account,card,balance\n\
             1,1111000000000001,100.00\n\
             1,1111000000000002,\n\
             2,2222000000000001,80.00\n",
        );
        let strategy = AsyncProcessingStrategy::new(
            EngineConfig::default().with_duplicate_threshold(TimeDelta::zero()),
            BatchConfig::new(2, num_cpus::get()),
        );
        let mut output = Vec::new();

        strategy
            .process(operations.path(), accounts.path(), &mut output)
            .unwrap();

        // Account 1: 100 - 100, w3 refused, + 100, - 20 = 80.
        // Account 2: 80 - 50 - 25 = 5.
        assert_eq!(
            String::from_utf8(output).unwrap(),
            "account,balance\n1,80.00\n2,5.00\n"
        );
    }
}
