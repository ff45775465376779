//! Hoard Cache
//!
//! Local task-output stores: the legacy directory store and the
//! SQLite-indexed store, plus the configuration, trust validation, retry and
//! housekeeping they share. Callers obtain a store through
//! [`create_cache_store`].

pub mod config;
pub mod context;
pub mod expand;
pub mod factory;
pub mod fsutil;
pub mod housekeeping;
pub mod indexed;
pub mod local;
pub mod machine;
pub mod retry;
pub mod size;
pub mod trust;

pub use config::{CacheConfig, EnvOverrides};
pub use context::StoreContext;
pub use expand::expand_outputs;
pub use factory::{StoreOptions, create_cache_store};
pub use indexed::IndexedCacheStore;
pub use local::LocalCacheStore;
pub use machine::HostMachineId;
pub use retry::RetryExecutor;
pub use size::resolve_max_cache_size;
pub use trust::TrustValidator;
