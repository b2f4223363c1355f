//! Synchronous CSV readers
//!
//! `SyncReader` streams operations from an operation log one row at a time.
//! `read_accounts` loads a whole account seed file, which is small by nature.
//!
//! # Error Handling
//!
//! - Fatal errors (file not found, I/O errors) are returned from `new()` / `read_accounts()`
//! - Individual operation rows that fail to parse are yielded as Err variants
//! - Line numbers are included in error messages for debugging

use crate::io::csv_format::{
    convert_operation_record, merge_account_records, AccountCsvRecord, OperationCsvRecord,
};
use crate::types::{Account, Operation};
use csv::{ReaderBuilder, Trim};
use log::warn;
use std::fs::File;
use std::path::Path;

fn open_csv(path: &Path) -> Result<csv::Reader<File>, String> {
    let file = File::open(path)
        .map_err(|e| format!("Failed to open file '{}': {}", path.display(), e))?;

    Ok(ReaderBuilder::new()
        .trim(Trim::All)
        .flexible(true)
        .buffer_capacity(8 * 1024)
        .from_reader(file))
}

/// Streaming reader over an operation log
///
/// ```no_run
/// use atm_withdrawal_engine::io::sync_reader::SyncReader;
/// use std::path::Path;
///
/// let reader = SyncReader::new(Path::new("operations.csv")).unwrap();
/// let operations: Vec<_> = reader.filter_map(Result::ok).collect();
/// println!("Parsed {} operations", operations.len());
/// ```
#[derive(Debug)]
pub struct SyncReader {
    reader: csv::Reader<File>,
    line_num: usize,
}

impl SyncReader {
    /// Open an operation log for streaming
    ///
    /// Fields are trimmed and short rows are accepted, so cancel rows may omit
    /// the secret and amount columns.
    pub fn new(path: &Path) -> Result<Self, String> {
        Ok(Self {
            reader: open_csv(path)?,
            line_num: 0,
        })
    }
}

impl Iterator for SyncReader {
    type Item = Result<Operation, String>;

    fn next(&mut self) -> Option<Self::Item> {
        let mut deserializer = self.reader.deserialize::<OperationCsvRecord>();
        let row = deserializer.next()?;
        self.line_num += 1;
        // Header is line 1.
        let line = self.line_num + 1;

        Some(match row {
            Ok(csv_record) => {
                convert_operation_record(csv_record).map_err(|e| format!("Line {}: {}", line, e))
            }
            Err(e) => Err(format!("Line {}: CSV parse error: {}", line, e)),
        })
    }
}

/// Load and merge an account seed file
///
/// Rows that fail to parse are skipped with a warning. Rows that parse but
/// contradict each other make the whole seed invalid.
pub fn read_accounts(path: &Path) -> Result<Vec<Account>, String> {
    let mut reader = open_csv(path)?;
    let mut records = Vec::new();

    for (index, row) in reader.deserialize::<AccountCsvRecord>().enumerate() {
        match row {
            Ok(record) => records.push(record),
            Err(e) => warn!("Skipping account row at line {}: {}", index + 2, e),
        }
    }

    merge_account_records(records)
        .map_err(|e| format!("Invalid account file '{}': {}", path.display(), e))
}
