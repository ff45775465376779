//! Remote caches for hoard.
//!
//! A remote cache mirrors records of the local store. This crate provides the
//! record archive codec, reference backends (S3-compatible object storage,
//! shared filesystem, Google Cloud Storage, Azure Blob Storage and a
//! self-hosted HTTP server), the adapter for the older retrieve/store
//! contract, and the resolver that picks at most one backend per process.

pub mod archive;
pub mod backends;
pub mod config;
pub mod keys;
pub mod legacy;
pub mod registry;
pub mod resolver;

pub use backends::{ArchiveBackend, BlobTransport, FilesystemTransport, HttpTransport};
pub use config::{
    AzureConfig, GcsConfig, HttpCacheConfig, RemoteCacheConfig, S3Config, SharedFsConfig,
};
pub use legacy::LegacyCacheAdapter;
pub use registry::{BackendKind, BackendRegistration, plugin_registry};
pub use resolver::{RemoteCacheResolver, ResolverOptions};
