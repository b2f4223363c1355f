//! Operation replay with account-based partitioning
//!
//! This module provides the `BatchProcessor` struct, which applies operations
//! from an operation log to a [`WithdrawalOrchestrator`].
//!
//! # Design
//!
//! Operations are partitioned by the account their card belongs to. Operations
//! of one partition run sequentially in log order; partitions run concurrently
//! on tokio's blocking pool, because the orchestrator's collaborators may block.
//! Two cards of the same account therefore never race on the account version.
//! Cards unknown to the seed get a partition of their own.
//!
//! Complete and cancel rows carry the card of the withdrawal they refer to, so
//! they land in the same partition and always run after it.
//!
//! # Architecture
//!
//! ```text
//! BatchProcessor
//!     ├── Arc<WithdrawalOrchestrator>          (shared state machine)
//!     ├── Arc<HashMap<CardNumber, AccountId>>  (routing from the account seed)
//!     └── Arc<DashMap<OperationRef, WithdrawalId>>
//! ```

use crate::core::orchestrator::WithdrawalOrchestrator;
use crate::types::{
    Account, AccountId, CancelOutcome, CardNumber, Operation, OperationRef, ReplayError,
    WithdrawalId, WithdrawalRecord,
};
use dashmap::DashMap;
use log::{debug, error, warn};
use std::collections::HashMap;
use std::sync::Arc;

/// Successful result of one operation
#[derive(Debug, Clone, PartialEq)]
pub enum OperationOutcome {
    Withdrawn(WithdrawalRecord),
    Completed(WithdrawalRecord),
    Canceled(CancelOutcome),
}

/// Result of processing a single operation
#[derive(Debug, Clone)]
pub struct ProcessingResult {
    /// The operation that was processed
    pub operation: Operation,

    /// The result of processing (success or error)
    pub result: Result<OperationOutcome, ReplayError>,
}

/// Key operations are grouped by
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Partition {
    Account(AccountId),
    UnknownCard(CardNumber),
}

/// Replay driver with account-based partitioning
#[derive(Clone)]
pub struct BatchProcessor {
    orchestrator: Arc<WithdrawalOrchestrator>,
    routes: Arc<HashMap<CardNumber, AccountId>>,
    references: Arc<DashMap<OperationRef, WithdrawalId>>,
}

impl BatchProcessor {
    /// Create a processor routing cards as in `accounts`
    pub fn new(orchestrator: Arc<WithdrawalOrchestrator>, accounts: &[Account]) -> Self {
        let routes = accounts
            .iter()
            .flat_map(|account| account.cards.iter().map(move |card| (card.clone(), account.id)))
            .collect();

        Self {
            orchestrator,
            routes: Arc::new(routes),
            references: Arc::new(DashMap::new()),
        }
    }

    pub fn orchestrator(&self) -> &WithdrawalOrchestrator {
        &self.orchestrator
    }

    /// Partition an operation belongs to
    pub fn partition_of(&self, operation: &Operation) -> Partition {
        let card = operation.card();
        match self.routes.get(card) {
            Some(account) => Partition::Account(*account),
            None => Partition::UnknownCard(card.to_string()),
        }
    }

    /// Partition a batch, keeping log order inside each partition
    pub fn partition(&self, batch: Vec<Operation>) -> HashMap<Partition, Vec<Operation>> {
        let mut partitions: HashMap<Partition, Vec<Operation>> = HashMap::new();

        for operation in batch {
            partitions
                .entry(self.partition_of(&operation))
                .or_default()
                .push(operation);
        }

        partitions
    }

    /// Apply one operation
    ///
    /// Accepted withdrawals are remembered under their reference so later
    /// cancel rows can find them. A reference reused by a later accepted
    /// withdrawal points at the newest one.
    pub fn apply(&self, operation: &Operation) -> Result<OperationOutcome, ReplayError> {
        match operation {
            Operation::Withdraw { reference, intent } => {
                let record = self.orchestrator.process(intent)?;
                self.references.insert(reference.clone(), record.id);
                Ok(OperationOutcome::Withdrawn(record))
            }
            Operation::Complete { reference, .. } => {
                let id = self.resolve(reference)?;
                Ok(OperationOutcome::Completed(self.orchestrator.complete(id)?))
            }
            Operation::Cancel { reference, .. } => {
                let id = self.resolve(reference)?;
                Ok(OperationOutcome::Canceled(self.orchestrator.cancel(id)?))
            }
        }
    }

    fn resolve(&self, reference: &str) -> Result<WithdrawalId, ReplayError> {
        self.references
            .get(reference)
            .map(|entry| *entry.value())
            .ok_or_else(|| ReplayError::UnknownReference {
                reference: reference.to_string(),
            })
    }

    /// Apply operations in order, recording each outcome
    ///
    /// Failures are logged and do not stop the remaining operations.
    pub fn apply_all(&self, operations: Vec<Operation>) -> Vec<ProcessingResult> {
        operations
            .into_iter()
            .map(|operation| self.process_operation(operation))
            .collect()
    }

    /// Apply one operation and log its outcome
    pub fn process_operation(&self, operation: Operation) -> ProcessingResult {
        let result = self.apply(&operation);
        match &result {
            Ok(_) => debug!("Applied operation {}", operation.reference()),
            Err(e) => warn!("Operation {} failed: {}", operation.reference(), e),
        }
        ProcessingResult { operation, result }
    }

    /// Apply a batch with partitions running concurrently
    ///
    /// Results of one partition keep log order; results of different
    /// partitions may interleave in any order.
    pub async fn process_batch(&self, batch: Vec<Operation>) -> Vec<ProcessingResult> {
        let mut tasks = Vec::new();
        for (_partition, operations) in self.partition(batch) {
            let processor = self.clone();
            tasks.push(tokio::task::spawn_blocking(move || {
                processor.apply_all(operations)
            }));
        }

        let mut results = Vec::new();
        for task in tasks {
            match task.await {
                Ok(partition_results) => results.extend(partition_results),
                Err(e) => error!("Replay task failed: {}", e),
            }
        }

        results
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{EngineConfig, SettlementMode};
    use crate::core::clock::ManualClock;
    use crate::store::{InMemoryCacheStore, InMemoryRecordStore};
    use crate::types::{WithdrawalError, WithdrawalIntent, WithdrawalStatus};
    use chrono::{TimeDelta, Utc};
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;

    const CARD_A1: &str = "1111000000000001";
    const CARD_A2: &str = "1111000000000002";
    const CARD_B: &str = "2222000000000001";
    const STRANGER: &str = "9999000000000000";

    fn accounts() -> Vec<Account> {
        vec![
            Account::new(1, dec!(1000.00))
                .with_card(CARD_A1)
                .with_card(CARD_A2),
            Account::new(2, dec!(500.00)).with_card(CARD_B),
        ]
    }

    fn setup() -> (BatchProcessor, Arc<InMemoryRecordStore>) {
        setup_with(EngineConfig::default().with_duplicate_threshold(TimeDelta::zero()))
    }

    fn setup_with(config: EngineConfig) -> (BatchProcessor, Arc<InMemoryRecordStore>) {
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let store = Arc::new(InMemoryRecordStore::with_accounts(accounts()));
        let orchestrator = Arc::new(WithdrawalOrchestrator::new(
            &config,
            store.clone(),
            Arc::new(InMemoryCacheStore::new(clock.clone())),
            clock,
        ));
        (BatchProcessor::new(orchestrator, &accounts()), store)
    }

    fn withdraw(card: &str, amount: Decimal, reference: &str) -> Operation {
        Operation::Withdraw {
            reference: reference.to_string(),
            intent: WithdrawalIntent::new(card, "1234", amount),
        }
    }

    fn cancel(card: &str, reference: &str) -> Operation {
        Operation::Cancel {
            reference: reference.to_string(),
            card: card.to_string(),
        }
    }

    #[test]
    fn test_partition_groups_cards_of_one_account() {
        let (processor, _) = setup();

        let partitions = processor.partition(vec![
            withdraw(CARD_A1, dec!(1), "w1"),
            withdraw(CARD_B, dec!(1), "w2"),
            withdraw(CARD_A2, dec!(1), "w3"),
            cancel(CARD_A1, "w1"),
            withdraw(STRANGER, dec!(1), "w4"),
        ]);

        assert_eq!(partitions.len(), 3);
        let refs: Vec<&str> = partitions[&Partition::Account(1)]
            .iter()
            .map(Operation::reference)
            .collect();
        assert_eq!(refs, vec!["w1", "w3", "w1"]);
        assert_eq!(partitions[&Partition::Account(2)].len(), 1);
        assert_eq!(
            partitions[&Partition::UnknownCard(STRANGER.to_string())].len(),
            1
        );
    }

    #[test]
    fn test_partition_empty_batch() {
        let (processor, _) = setup();
        assert!(processor.partition(vec![]).is_empty());
    }

    #[test]
    fn test_cancel_resolves_reference() {
        let (processor, store) = setup();

        let results = processor.apply_all(vec![
            withdraw(CARD_A1, dec!(100.00), "w1"),
            cancel(CARD_A1, "w1"),
        ]);

        assert!(results.iter().all(|r| r.result.is_ok()));
        match &results[1].result {
            Ok(OperationOutcome::Canceled(CancelOutcome::Canceled(record))) => {
                assert_eq!(record.status, WithdrawalStatus::Canceled)
            }
            other => panic!("Expected cancellation, got {:?}", other),
        }
        assert_eq!(store.account(1).unwrap().balance, dec!(1000.00));
    }

    #[test]
    fn test_failures_do_not_stop_replay() {
        let (processor, store) = setup();

        let results = processor.apply_all(vec![
            cancel(CARD_A1, "missing"),
            withdraw(CARD_B, dec!(600.00), "w1"),
            withdraw(CARD_B, dec!(200.00), "w2"),
        ]);

        assert_eq!(
            results[0].result,
            Err(ReplayError::UnknownReference {
                reference: "missing".to_string()
            })
        );
        assert!(matches!(
            results[1].result,
            Err(ReplayError::Withdrawal(
                WithdrawalError::InsufficientBalance { .. }
            ))
        ));
        assert!(results[2].result.is_ok());
        assert_eq!(store.account(2).unwrap().balance, dec!(300.00));
    }

    #[test]
    fn test_deferred_withdrawal_completed_by_reference() {
        let config = EngineConfig::default()
            .with_duplicate_threshold(TimeDelta::zero())
            .with_settlement(SettlementMode::Deferred);
        let (processor, store) = setup_with(config);

        let results = processor.apply_all(vec![
            withdraw(CARD_B, dec!(100.00), "w1"),
            cancel(CARD_B, "w1"),
            Operation::Complete {
                reference: "w1".to_string(),
                card: CARD_B.to_string(),
            },
            cancel(CARD_B, "w1"),
        ]);

        assert!(matches!(
            results[1].result,
            Err(ReplayError::Withdrawal(WithdrawalError::CancelConflict { .. }))
        ));
        assert!(matches!(
            results[2].result,
            Ok(OperationOutcome::Completed(ref record)) if record.status == WithdrawalStatus::Completed
        ));
        assert!(results[3].result.is_ok());
        assert_eq!(store.account(2).unwrap().balance, dec!(500.00));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_process_batch_shared_account_cards() {
        let (processor, store) = setup();

        let results = processor
            .process_batch(vec![
                withdraw(CARD_A1, dec!(100.00), "w1"),
                withdraw(CARD_A2, dec!(200.00), "w2"),
                withdraw(CARD_B, dec!(50.00), "w3"),
                cancel(CARD_A1, "w1"),
                withdraw(CARD_A2, dec!(300.00), "w4"),
            ])
            .await;

        assert_eq!(results.len(), 5);
        assert!(results.iter().all(|r| r.result.is_ok()));
        assert_eq!(store.account(1).unwrap().balance, dec!(500.00));
        assert_eq!(store.account(2).unwrap().balance, dec!(450.00));
    }
}
