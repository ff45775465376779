//! Cache configuration.
//!
//! Settings come from `hoard.yaml` in the workspace root (or the user config
//! directory) and are overlaid once with an [`EnvOverrides`] snapshot of the
//! process environment. Nothing reads the environment after that.

use hoard_core::size::CacheSizeSetting;
use hoard_core::{Error, Result};
use hoard_remote::{HttpCacheConfig, RemoteCacheConfig};
use hoard_trace::TracingConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Name of the configuration file.
pub const CONFIG_FILE: &str = "hoard.yaml";

pub const ENV_CACHE_DIRECTORY: &str = "HOARD_CACHE_DIRECTORY";
pub const ENV_MAX_CACHE_SIZE: &str = "HOARD_MAX_CACHE_SIZE";
pub const ENV_SKIP_REMOTE_CACHE: &str = "HOARD_SKIP_REMOTE_CACHE";
pub const ENV_SELF_HOSTED_SERVER: &str = "HOARD_SELF_HOSTED_REMOTE_CACHE_SERVER";
pub const ENV_SELF_HOSTED_TOKEN: &str = "HOARD_SELF_HOSTED_REMOTE_CACHE_ACCESS_TOKEN";
pub const ENV_REJECT_UNKNOWN_LOCAL_CACHE: &str = "HOARD_REJECT_UNKNOWN_LOCAL_CACHE";
pub const ENV_VERBOSE_LOGGING: &str = "HOARD_VERBOSE_LOGGING";
pub const ENV_DB_CACHE: &str = "HOARD_DB_CACHE";
pub const ENV_CI: &str = "CI";

/// Cache configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Workspace the outputs are relative to. Not read from the file.
    #[serde(skip, default = "default_workspace_root")]
    pub workspace_root: PathBuf,
    /// Cache root; relative paths are resolved against the workspace root.
    #[serde(default = "default_cache_directory")]
    pub cache_directory: PathBuf,
    /// Maximum cache size as bytes or text with a unit. `0` disables the limit.
    #[serde(default, alias = "maxCacheSize")]
    pub max_cache_size: Option<CacheSizeSetting>,
    #[serde(default)]
    pub skip_remote_cache: bool,
    #[serde(default)]
    pub remote: RemoteCacheConfig,
    /// Use the SQLite-indexed store instead of the legacy directory store.
    #[serde(default = "default_true")]
    pub use_indexed_store: bool,
    /// Reject local records produced on another machine. Deprecated: only the
    /// legacy store honors `false`.
    #[serde(default = "default_true")]
    pub reject_unknown_local_cache: bool,
    #[serde(default)]
    pub verbose_logging: bool,
    /// Running under continuous integration.
    #[serde(default)]
    pub ci: bool,
}

fn default_workspace_root() -> PathBuf {
    PathBuf::from(".")
}

fn default_cache_directory() -> PathBuf {
    PathBuf::from(".hoard/cache")
}

fn default_true() -> bool {
    true
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            workspace_root: default_workspace_root(),
            cache_directory: default_cache_directory(),
            max_cache_size: None,
            skip_remote_cache: false,
            remote: RemoteCacheConfig::default(),
            use_indexed_store: true,
            reject_unknown_local_cache: true,
            verbose_logging: false,
            ci: false,
        }
    }
}

impl CacheConfig {
    /// Load the configuration for `workspace_root` and apply the process
    /// environment.
    pub fn load(workspace_root: &Path) -> Result<Self> {
        let workspace_file = workspace_root.join(CONFIG_FILE);
        let config = if workspace_file.exists() {
            Self::from_file(&workspace_file)?
        } else {
            match Self::user_config_path().filter(|p| p.exists()) {
                Some(path) => Self::from_file(&path)?,
                None => Self::default(),
            }
        };

        Ok(config
            .with_overrides(&EnvOverrides::from_env())
            .for_workspace(workspace_root))
    }

    /// Load configuration from a YAML file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        serde_yaml::from_str(&contents).map_err(|e| {
            Error::Configuration(format!("Failed to parse {}: {}", path.display(), e))
        })
    }

    /// The per-user configuration file.
    pub fn user_config_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("dev", "hoard", "hoard")
            .map(|dirs| dirs.config_dir().join(CONFIG_FILE))
    }

    /// Anchor the configuration at `workspace_root`.
    pub fn for_workspace(mut self, workspace_root: &Path) -> Self {
        self.workspace_root = workspace_root.to_path_buf();
        if self.cache_directory.is_relative() {
            self.cache_directory = workspace_root.join(&self.cache_directory);
        }
        self
    }

    /// Apply environment overrides. Set variables win over file settings.
    pub fn with_overrides(mut self, overrides: &EnvOverrides) -> Self {
        if let Some(dir) = &overrides.cache_directory {
            self.cache_directory = dir.clone();
        }
        if let Some(size) = &overrides.max_cache_size {
            self.max_cache_size = Some(CacheSizeSetting::Text(size.clone()));
        }
        if let Some(skip) = overrides.skip_remote_cache {
            self.skip_remote_cache = skip;
        }
        if let Some(url) = &overrides.self_hosted_url {
            let access_token = overrides.self_hosted_token.clone().or_else(|| {
                self.remote
                    .http
                    .as_ref()
                    .and_then(|http| http.access_token.clone())
            });
            self.remote.http = Some(HttpCacheConfig {
                url: url.clone(),
                access_token,
            });
        } else if let (Some(token), Some(http)) =
            (&overrides.self_hosted_token, self.remote.http.as_mut())
        {
            http.access_token = Some(token.clone());
        }
        if let Some(reject) = overrides.reject_unknown_local_cache {
            self.reject_unknown_local_cache = reject;
        }
        if let Some(verbose) = overrides.verbose_logging {
            self.verbose_logging = verbose;
        }
        if let Some(db_cache) = overrides.db_cache {
            self.use_indexed_store = db_cache;
        }
        if let Some(ci) = overrides.ci {
            self.ci = ci;
        }
        self
    }

    /// Logging settings derived from this configuration.
    pub fn tracing_config(&self) -> TracingConfig {
        TracingConfig {
            verbose: self.verbose_logging,
            ..Default::default()
        }
    }
}

/// Snapshot of the environment variables that override [`CacheConfig`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EnvOverrides {
    pub cache_directory: Option<PathBuf>,
    pub max_cache_size: Option<String>,
    pub skip_remote_cache: Option<bool>,
    pub self_hosted_url: Option<String>,
    pub self_hosted_token: Option<String>,
    pub reject_unknown_local_cache: Option<bool>,
    pub verbose_logging: Option<bool>,
    pub db_cache: Option<bool>,
    pub ci: Option<bool>,
}

impl EnvOverrides {
    pub fn from_env() -> Self {
        Self::from_vars(std::env::vars())
    }

    /// Build from explicit `(name, value)` pairs. Unknown names are ignored,
    /// empty values count as unset.
    pub fn from_vars<I, K, V>(vars: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<String>,
    {
        let mut overrides = Self::default();
        for (name, value) in vars {
            let value: String = value.into();
            let value = value.trim().to_string();
            if value.is_empty() {
                continue;
            }
            match name.as_ref() {
                ENV_CACHE_DIRECTORY => overrides.cache_directory = Some(PathBuf::from(value)),
                ENV_MAX_CACHE_SIZE => overrides.max_cache_size = Some(value),
                ENV_SKIP_REMOTE_CACHE => overrides.skip_remote_cache = parse_flag(&value),
                ENV_SELF_HOSTED_SERVER => overrides.self_hosted_url = Some(value),
                ENV_SELF_HOSTED_TOKEN => overrides.self_hosted_token = Some(value),
                ENV_REJECT_UNKNOWN_LOCAL_CACHE => {
                    overrides.reject_unknown_local_cache = parse_flag(&value)
                }
                ENV_VERBOSE_LOGGING => overrides.verbose_logging = parse_flag(&value),
                ENV_DB_CACHE => overrides.db_cache = parse_flag(&value),
                // any CI value other than an explicit false means CI
                ENV_CI => overrides.ci = Some(parse_flag(&value).unwrap_or(true)),
                _ => {}
            }
        }
        overrides
    }
}

fn parse_flag(value: &str) -> Option<bool> {
    match value.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_yaml_with_defaults() {
        let config: CacheConfig = serde_yaml::from_str(
            "maxCacheSize: 2GB\nremote:\n  shared_fs:\n    path: /mnt/cache\n",
        )
        .unwrap();
        assert_eq!(
            config.max_cache_size,
            Some(CacheSizeSetting::Text("2GB".to_string()))
        );
        assert!(config.use_indexed_store);
        assert!(config.reject_unknown_local_cache);
        assert!(config.remote.shared_fs.is_some());
        assert_eq!(config.cache_directory, PathBuf::from(".hoard/cache"));
    }

    #[test]
    fn test_numeric_size_is_bytes() {
        let config: CacheConfig = serde_yaml::from_str("max_cache_size: 1048576\n").unwrap();
        assert_eq!(config.max_cache_size, Some(CacheSizeSetting::Bytes(1_048_576)));
    }

    #[test]
    fn test_env_overrides_win() {
        let overrides = EnvOverrides::from_vars([
            (ENV_MAX_CACHE_SIZE, "500MB"),
            (ENV_SKIP_REMOTE_CACHE, "true"),
            (ENV_SELF_HOSTED_SERVER, "https://cache.internal"),
            (ENV_SELF_HOSTED_TOKEN, "secret"),
            (ENV_REJECT_UNKNOWN_LOCAL_CACHE, "0"),
            (ENV_DB_CACHE, "false"),
            (ENV_CI, "github"),
            ("UNRELATED", "x"),
        ]);
        let config = CacheConfig {
            max_cache_size: Some(CacheSizeSetting::Bytes(1)),
            ..Default::default()
        }
        .with_overrides(&overrides);

        assert_eq!(
            config.max_cache_size,
            Some(CacheSizeSetting::Text("500MB".to_string()))
        );
        assert!(config.skip_remote_cache);
        assert!(!config.reject_unknown_local_cache);
        assert!(!config.use_indexed_store);
        assert!(config.ci);
        assert_eq!(
            config.remote.http,
            Some(HttpCacheConfig {
                url: "https://cache.internal".to_string(),
                access_token: Some("secret".to_string()),
            })
        );
    }

    #[test]
    fn test_empty_or_unknown_values_are_ignored() {
        let overrides = EnvOverrides::from_vars([
            (ENV_SKIP_REMOTE_CACHE, "maybe"),
            (ENV_MAX_CACHE_SIZE, "  "),
            (ENV_CI, "false"),
        ]);
        assert_eq!(overrides.skip_remote_cache, None);
        assert_eq!(overrides.max_cache_size, None);
        assert_eq!(overrides.ci, Some(false));
    }

    #[test]
    fn test_workspace_anchoring() {
        let config = CacheConfig::default().for_workspace(Path::new("/repo"));
        assert_eq!(config.cache_directory, PathBuf::from("/repo/.hoard/cache"));

        let absolute = CacheConfig {
            cache_directory: PathBuf::from("/var/cache/hoard"),
            ..Default::default()
        }
        .for_workspace(Path::new("/repo"));
        assert_eq!(absolute.cache_directory, PathBuf::from("/var/cache/hoard"));
    }

    #[test]
    fn test_load_reads_workspace_file() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(CONFIG_FILE), "cache_directory: cache\n").unwrap();
        let config = CacheConfig::from_file(&dir.path().join(CONFIG_FILE))
            .unwrap()
            .for_workspace(dir.path());
        assert_eq!(config.cache_directory, dir.path().join("cache"));
    }
}
