//! Hoard Core
//!
//! Core domain types, port traits, and error handling for the hoard
//! task-output cache. This crate has minimal dependencies and defines the
//! shared vocabulary used by the store, remote and index crates.

pub mod cache;
pub mod error;
pub mod ids;
pub mod ports;
pub mod size;

pub use cache::{CachedResult, RecordLayout, RemoteCacheResult};
pub use error::{Error, Result};
pub use ids::{CacheTask, TaskHash};
pub use size::{format_cache_size, parse_max_cache_size};
