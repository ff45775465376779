//! Static registry of remote cache backends.
//!
//! Backends are compiled in behind cargo features and become available when
//! their configuration section is present. The registry order is the
//! resolution priority.

use crate::backends::{ArchiveBackend, FilesystemTransport};
use crate::config::RemoteCacheConfig;
use hoard_core::Result;
use hoard_core::ports::RemoteCacheBackend;
use std::fmt;
use std::sync::Arc;

/// The registered backend families.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BackendKind {
    S3,
    SharedFs,
    Gcs,
    Azure,
}

impl BackendKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            BackendKind::S3 => "s3",
            BackendKind::SharedFs => "shared-fs",
            BackendKind::Gcs => "gcs",
            BackendKind::Azure => "azure",
        }
    }

    /// Whether support for this backend was compiled in.
    pub fn is_compiled_in(&self) -> bool {
        match self {
            BackendKind::S3 => cfg!(feature = "s3"),
            BackendKind::SharedFs => true,
            BackendKind::Gcs => cfg!(feature = "gcs"),
            BackendKind::Azure => cfg!(feature = "azure"),
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Builds a backend from configuration. `None` means "not configured".
pub type BackendConstructor = fn(&RemoteCacheConfig) -> Option<Result<Arc<dyn RemoteCacheBackend>>>;

/// One entry of the registry.
#[derive(Clone, Copy)]
pub struct BackendRegistration {
    pub kind: BackendKind,
    pub construct: BackendConstructor,
}

impl BackendRegistration {
    /// Construct the backend if it is compiled in and configured.
    pub fn try_construct(
        &self,
        config: &RemoteCacheConfig,
    ) -> Option<Result<Arc<dyn RemoteCacheBackend>>> {
        if !self.kind.is_compiled_in() {
            return None;
        }
        (self.construct)(config)
    }
}

impl fmt::Debug for BackendRegistration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BackendRegistration")
            .field("kind", &self.kind)
            .finish()
    }
}

/// The built-in registry, in resolution priority order.
pub fn plugin_registry() -> Vec<BackendRegistration> {
    vec![
        BackendRegistration {
            kind: BackendKind::S3,
            construct: construct_s3,
        },
        BackendRegistration {
            kind: BackendKind::SharedFs,
            construct: construct_shared_fs,
        },
        BackendRegistration {
            kind: BackendKind::Gcs,
            construct: construct_gcs,
        },
        BackendRegistration {
            kind: BackendKind::Azure,
            construct: construct_azure,
        },
    ]
}

#[cfg(feature = "s3")]
fn construct_s3(config: &RemoteCacheConfig) -> Option<Result<Arc<dyn RemoteCacheBackend>>> {
    let s3 = config.s3.as_ref()?;
    Some(crate::backends::S3Transport::new(s3).map(|transport| {
        Arc::new(ArchiveBackend::new(transport, s3.prefix.clone())) as Arc<dyn RemoteCacheBackend>
    }))
}

#[cfg(not(feature = "s3"))]
fn construct_s3(_config: &RemoteCacheConfig) -> Option<Result<Arc<dyn RemoteCacheBackend>>> {
    None
}

fn construct_shared_fs(config: &RemoteCacheConfig) -> Option<Result<Arc<dyn RemoteCacheBackend>>> {
    let shared = config.shared_fs.as_ref()?;
    let transport = FilesystemTransport::new(shared.path.clone());
    let backend: Arc<dyn RemoteCacheBackend> = Arc::new(ArchiveBackend::new(transport, None));
    Some(Ok(backend))
}

#[cfg(feature = "gcs")]
fn construct_gcs(config: &RemoteCacheConfig) -> Option<Result<Arc<dyn RemoteCacheBackend>>> {
    let gcs = config.gcs.as_ref()?;
    Some(crate::backends::GcsTransport::new(gcs).map(|transport| {
        Arc::new(ArchiveBackend::new(transport, gcs.prefix.clone())) as Arc<dyn RemoteCacheBackend>
    }))
}

#[cfg(not(feature = "gcs"))]
fn construct_gcs(_config: &RemoteCacheConfig) -> Option<Result<Arc<dyn RemoteCacheBackend>>> {
    None
}

#[cfg(feature = "azure")]
fn construct_azure(config: &RemoteCacheConfig) -> Option<Result<Arc<dyn RemoteCacheBackend>>> {
    let azure = config.azure.as_ref()?;
    Some(
        crate::backends::AzureBlobTransport::new(azure).map(|transport| {
            Arc::new(ArchiveBackend::new(transport, azure.prefix.clone()))
                as Arc<dyn RemoteCacheBackend>
        }),
    )
}

#[cfg(not(feature = "azure"))]
fn construct_azure(_config: &RemoteCacheConfig) -> Option<Result<Arc<dyn RemoteCacheBackend>>> {
    None
}
