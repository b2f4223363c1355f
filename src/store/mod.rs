//! Store implementations
//!
//! Concrete implementations of the [`RecordStore`](crate::core::traits::RecordStore)
//! and [`CacheStore`](crate::core::traits::CacheStore) ports.

pub mod in_memory;

pub use in_memory::{InMemoryCacheStore, InMemoryRecordStore};
