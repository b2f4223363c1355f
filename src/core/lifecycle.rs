//! Withdrawal lifecycle table
//!
//! Every status change of a withdrawal record goes through [`transition`].
//! The match is exhaustive over (status, action), so adding a status or an
//! action fails to compile until each pair has an explicit outcome.
//!
//! ```text
//!                 complete                  cancel
//! IN_PROGRESS ─────────────▶ COMPLETED ─────────────▶ CANCELED
//! ```

use crate::types::WithdrawalStatus;
use std::fmt;

/// Action requested against a withdrawal record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WithdrawalAction {
    /// Confirm settlement of the debit
    Complete,
    /// Reverse a settled debit
    Cancel,
}

impl fmt::Display for WithdrawalAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WithdrawalAction::Complete => write!(f, "complete"),
            WithdrawalAction::Cancel => write!(f, "cancel"),
        }
    }
}

/// Outcome of applying an action to a status
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// The record moves to the given status
    Move(WithdrawalStatus),
    /// The record is already where the action would take it
    Stay,
    /// The action is not allowed from the current status
    Rejected,
}

/// Look up the outcome of `action` for a record in status `from`
pub fn transition(from: WithdrawalStatus, action: WithdrawalAction) -> Transition {
    use WithdrawalAction::*;
    use WithdrawalStatus::*;

    match (from, action) {
        (InProgress, Complete) => Transition::Move(Completed),
        // The debit is not settled yet.
        (InProgress, Cancel) => Transition::Rejected,
        (Completed, Complete) => Transition::Stay,
        (Completed, Cancel) => Transition::Move(Canceled),
        (Canceled, Cancel) => Transition::Stay,
        (Canceled, Complete) => Transition::Rejected,
    }
}
