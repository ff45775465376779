//! Selection of the remote cache backend.
//!
//! At most one backend is active per resolver. The first call to
//! [`RemoteCacheResolver::resolve`] runs the selection and every later call,
//! including concurrent ones, observes the same answer.

use crate::backends::{ArchiveBackend, HttpTransport};
use crate::config::RemoteCacheConfig;
use crate::legacy::LegacyCacheAdapter;
use crate::registry::{BackendRegistration, plugin_registry};
use hoard_core::RecordLayout;
use hoard_core::ports::{ManagedCacheClient, RemoteCacheBackend};
use std::sync::{Arc, OnceLock};
use tracing::{debug, info, warn};

/// Inputs to remote cache resolution.
#[derive(Clone, Default)]
pub struct ResolverOptions {
    /// Disable remote caching entirely.
    pub skip_remote_cache: bool,
    pub config: RemoteCacheConfig,
    /// Client of a managed remote-orchestration service, if one is connected.
    pub managed_client: Option<Arc<dyn ManagedCacheClient>>,
    /// Record layout of the store the backend will serve.
    pub layout: RecordLayout,
}

pub struct RemoteCacheResolver {
    options: ResolverOptions,
    registry: Vec<BackendRegistration>,
    resolved: OnceLock<Option<Arc<dyn RemoteCacheBackend>>>,
}

impl RemoteCacheResolver {
    pub fn new(options: ResolverOptions) -> Self {
        Self::with_registry(options, plugin_registry())
    }

    /// Create a resolver over a custom registry.
    pub fn with_registry(options: ResolverOptions, registry: Vec<BackendRegistration>) -> Self {
        Self {
            options,
            registry,
            resolved: OnceLock::new(),
        }
    }

    /// The active remote backend, or `None` when remote caching is disabled.
    pub fn resolve(&self) -> Option<Arc<dyn RemoteCacheBackend>> {
        self.resolved.get_or_init(|| self.select()).clone()
    }

    fn select(&self) -> Option<Arc<dyn RemoteCacheBackend>> {
        if self.options.skip_remote_cache {
            warn!("Remote caching is disabled; task results are cached locally only");
            return None;
        }

        if let Some(client) = &self.options.managed_client {
            if let Some(cache) = client.remote_cache() {
                info!(backend = cache.name(), "Using managed remote cache");
                return Some(cache);
            }
            if let Some(legacy) = client.legacy_cache() {
                info!("Using managed remote cache through the legacy adapter");
                let adapter: Arc<dyn RemoteCacheBackend> =
                    Arc::new(LegacyCacheAdapter::new(legacy, self.options.layout));
                return Some(adapter);
            }
            debug!("Managed client provides no remote cache");
        }

        for registration in &self.registry {
            match registration.try_construct(&self.options.config) {
                Some(Ok(backend)) => {
                    info!(backend = %registration.kind, "Using remote cache backend");
                    return Some(backend);
                }
                Some(Err(e)) => {
                    debug!(backend = %registration.kind, error = %e, "Remote cache backend unavailable");
                }
                None => {}
            }
        }

        if let Some(http) = &self.options.config.http {
            if cfg!(target_arch = "wasm32") {
                warn!("The self-hosted remote cache is not supported in this runtime and is disabled");
                return None;
            }
            match HttpTransport::new(http) {
                Ok(transport) => {
                    info!(url = %http.url, "Using self-hosted remote cache");
                    let backend: Arc<dyn RemoteCacheBackend> =
                        Arc::new(ArchiveBackend::new(transport, None));
                    return Some(backend);
                }
                Err(e) => {
                    warn!(url = %http.url, error = %e, "Self-hosted remote cache is misconfigured");
                }
            }
        }

        None
    }
}
