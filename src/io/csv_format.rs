//! CSV format handling for operation logs, account seeds and account output
//!
//! This module centralizes all CSV format concerns, providing:
//! - `OperationCsvRecord` and its conversion to an [`Operation`]
//! - `AccountCsvRecord` and the merge of seed rows into [`Account`]s
//! - Account output serialization
//!
//! All functions are pure (no I/O) for easy testing.
//!
//! # Formats
//!
//! ```text
//! operations:  type,card,secret,amount,ref
//!              withdraw,1111222233334444,1234,100.00,w1
//!              complete,1111222233334444,,,w1
//!              cancel,1111222233334444,,,w1
//!
//! accounts:    account,card,balance
//!              1,1111222233334444,1000.00
//!              1,5555666677778888,
//!
//! output:      account,balance
//!              1,1000.00
//! ```

use crate::types::{Account, AccountId, CardNumber, Operation, OperationRef, WithdrawalIntent};
use rust_decimal::Decimal;
use serde::Deserialize;
use std::collections::HashMap;
use std::io::Write;
use std::str::FromStr;

/// Operation log row as it appears in the CSV
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct OperationCsvRecord {
    #[serde(rename = "type")]
    pub op_type: String,
    pub card: String,
    pub secret: Option<String>,
    pub amount: Option<String>,
    #[serde(rename = "ref")]
    pub reference: OperationRef,
}

/// Convert an OperationCsvRecord to an Operation
///
/// Card and secret are passed through unvalidated; the policy validator
/// rejects malformed ones with their own reason. Only the row structure is
/// checked here.
///
/// # Returns
///
/// Result containing either:
/// - Ok(Operation) - Successfully converted row
/// - Err(String) - Error message describing the conversion failure
pub fn convert_operation_record(csv_record: OperationCsvRecord) -> Result<Operation, String> {
    if csv_record.reference.is_empty() {
        return Err(format!(
            "Missing ref for '{}' operation",
            csv_record.op_type
        ));
    }

    match csv_record.op_type.to_lowercase().as_str() {
        "withdraw" => {
            let amount = parse_amount(csv_record.amount.as_deref(), &csv_record.reference)?
                .ok_or_else(|| {
                    format!("Withdraw {} requires an amount", csv_record.reference)
                })?;
            Ok(Operation::Withdraw {
                intent: WithdrawalIntent::new(
                    csv_record.card,
                    csv_record.secret.unwrap_or_default(),
                    amount,
                ),
                reference: csv_record.reference,
            })
        }
        // Any amount or secret on a complete or cancel row is ignored.
        "complete" => Ok(Operation::Complete {
            reference: csv_record.reference,
            card: csv_record.card,
        }),
        "cancel" => Ok(Operation::Cancel {
            reference: csv_record.reference,
            card: csv_record.card,
        }),
        _ => Err(format!(
            "Invalid operation type: '{}' for ref {}",
            csv_record.op_type, csv_record.reference
        )),
    }
}

fn parse_amount(raw: Option<&str>, reference: &str) -> Result<Option<Decimal>, String> {
    match raw.map(str::trim) {
        Some(text) if !text.is_empty() => Decimal::from_str(text)
            .map(Some)
            .map_err(|_| format!("Invalid amount '{}' for ref {}", text, reference)),
        _ => Ok(None),
    }
}

/// Account seed row as it appears in the CSV
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct AccountCsvRecord {
    pub account: AccountId,
    pub card: String,
    pub balance: Option<String>,
}

/// Fold seed rows into accounts
///
/// The first row of an account sets its balance; later rows only attach
/// further cards and may leave the balance empty. A later row with a
/// different balance, a card listed for two accounts, or an account without
/// any balance is an error.
pub fn merge_account_records(
    records: impl IntoIterator<Item = AccountCsvRecord>,
) -> Result<Vec<Account>, String> {
    let mut accounts: HashMap<AccountId, Account> = HashMap::new();
    let mut owners: HashMap<CardNumber, AccountId> = HashMap::new();
    let mut order = Vec::new();

    for record in records {
        let balance = parse_amount(record.balance.as_deref(), &record.account.to_string())?;

        match accounts.get_mut(&record.account) {
            Some(account) => {
                if let Some(balance) = balance.filter(|b| *b != account.balance) {
                    return Err(format!(
                        "Conflicting balance {} for account {} (already {})",
                        balance, record.account, account.balance
                    ));
                }
            }
            None => {
                let balance = balance.ok_or_else(|| {
                    format!("First row of account {} requires a balance", record.account)
                })?;
                accounts.insert(record.account, Account::new(record.account, balance));
                order.push(record.account);
            }
        }

        if record.card.is_empty() {
            continue;
        }
        if let Some(owner) = owners.get(&record.card).filter(|o| **o != record.account) {
            return Err(format!(
                "Card ending {} is listed for accounts {} and {}",
                crate::types::mask_card(&record.card),
                owner,
                record.account
            ));
        }
        if let Some(account) = accounts.get_mut(&record.account) {
            if !account.owns_card(&record.card) {
                account.cards.push(record.card.clone());
            }
        }
        owners.insert(record.card, record.account);
    }

    Ok(order
        .into_iter()
        .filter_map(|id| accounts.remove(&id))
        .collect())
}

/// Write account balances to CSV format
///
/// Writes accounts in CSV format with columns: account, balance.
/// Accounts are sorted by ID for deterministic output.
///
/// # Returns
///
/// * `Ok(())` if writing succeeded
/// * `Err(String)` if a write error occurred
pub fn write_accounts_csv(accounts: &[Account], output: &mut dyn Write) -> Result<(), String> {
    use csv::Writer;

    let mut writer = Writer::from_writer(output);

    writer
        .write_record(["account", "balance"])
        .map_err(|e| format!("Failed to write CSV header: {}", e))?;

    let mut sorted_accounts = accounts.to_vec();
    sorted_accounts.sort_by_key(|account| account.id);

    for account in sorted_accounts {
        writer
            .write_record(&[account.id.to_string(), format!("{:.2}", account.balance)])
            .map_err(|e| format!("Failed to write account record: {}", e))?;
    }

    writer
        .flush()
        .map_err(|e| format!("Failed to flush output: {}", e))?;

    Ok(())
}
