//! I/O module
//!
//! Handles CSV parsing and output.
//!
//! # Components
//!
//! - `csv_format` - CSV format handling (row conversion, seed merging, output serialization)
//! - `sync_reader` - Synchronous operation reader with iterator interface, account seed loader
//! - `async_reader` - Asynchronous operation reader with batch reading interface

pub mod async_reader;
pub mod csv_format;
pub mod sync_reader;

pub use async_reader::AsyncReader;
pub use csv_format::{
    convert_operation_record, merge_account_records, write_accounts_csv, AccountCsvRecord,
    OperationCsvRecord,
};
pub use sync_reader::{read_accounts, SyncReader};
