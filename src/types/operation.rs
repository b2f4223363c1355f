//! Replayable operations
//!
//! An operation log is a sequence of withdrawals, completions and cancellations.
//! Completions and cancellations name the withdrawal they act on by the reference the log gave it, since
//! withdrawal IDs are only assigned once the withdrawal is accepted.

use super::account::CardNumber;
use super::withdrawal::WithdrawalIntent;

/// Caller-chosen name of a withdraw row, referenced by later cancel rows
pub type OperationRef = String;

/// One replayable operation
#[derive(Debug, Clone, PartialEq)]
pub enum Operation {
    /// Withdraw through the orchestrator and remember the result under `reference`
    Withdraw {
        reference: OperationRef,
        intent: WithdrawalIntent,
    },
    /// Settle the withdrawal remembered under `reference`
    Complete {
        reference: OperationRef,
        card: CardNumber,
    },
    /// Cancel the withdrawal remembered under `reference`
    ///
    /// For this and `Complete`, `card` is only used to route the operation
    /// next to the withdrawal it refers to.
    Cancel {
        reference: OperationRef,
        card: CardNumber,
    },
}

impl Operation {
    pub fn reference(&self) -> &str {
        match self {
            Operation::Withdraw { reference, .. }
            | Operation::Complete { reference, .. }
            | Operation::Cancel { reference, .. } => reference,
        }
    }

    pub fn card(&self) -> &str {
        match self {
            Operation::Withdraw { intent, .. } => &intent.card,
            Operation::Complete { card, .. } | Operation::Cancel { card, .. } => card,
        }
    }
}
