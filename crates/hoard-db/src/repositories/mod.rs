//! Repository implementations for SQLite.

mod cache_records;

pub use cache_records::SqliteCacheIndex;
