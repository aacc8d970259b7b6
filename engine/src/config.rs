use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use failsafe_core::FailSafeConfig;
use failsafe_storage::{FileStorage, MemoryStorage, PersistentStorage, SqliteStorage};
use serde::Deserialize;

/// Environment variable that overrides the config file location.
pub const CONFIG_ENV: &str = "FAILSAFE_CONFIG";

#[derive(Debug, Default, Deserialize)]
pub struct DeviceConfig {
    pub fail_safe: Option<FailSafeSection>,
    pub storage: Option<StorageConfig>,
    pub runtime: Option<RuntimeConfig>,
}

#[derive(Debug, Default, Deserialize)]
pub struct FailSafeSection {
    /// Upper bound on a whole commissioning session, in seconds.
    pub max_cumulative_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
pub struct StorageConfig {
    pub backend: Option<StorageBackend>,
    /// Directory (file backend) or database file (sqlite backend).
    /// A leading `~/` expands to the home directory.
    pub path: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    Memory,
    #[default]
    File,
    Sqlite,
}

impl StorageBackend {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Memory => "memory",
            Self::File => "file",
            Self::Sqlite => "sqlite",
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct RuntimeConfig {
    pub max_queue_depth: Option<usize>,
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config at {}: {source}", path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse config at {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
    #[error("invalid config at {}: {reason}", path.display())]
    Invalid { path: PathBuf, reason: &'static str },
}

impl ConfigError {
    pub fn path(&self) -> &PathBuf {
        match self {
            ConfigError::Read { path, .. }
            | ConfigError::Parse { path, .. }
            | ConfigError::Invalid { path, .. } => path,
        }
    }
}

impl DeviceConfig {
    /// Load from [`config_path`]. `Ok(None)` when there is no config file.
    pub fn load() -> Result<Option<Self>, ConfigError> {
        match config_path() {
            Some(path) => Self::load_from(&path),
            None => Ok(None),
        }
    }

    pub fn load_from(path: &Path) -> Result<Option<Self>, ConfigError> {
        if !path.exists() {
            return Ok(None);
        }

        let content = match std::fs::read_to_string(path) {
            Ok(content) => content,
            Err(err) => {
                tracing::warn!("Failed to read config at {:?}: {}", path, err);
                return Err(ConfigError::Read {
                    path: path.to_path_buf(),
                    source: err,
                });
            }
        };

        let config: Self = match toml::from_str(&content) {
            Ok(config) => config,
            Err(err) => {
                tracing::warn!("Failed to parse config at {:?}: {}", path, err);
                return Err(ConfigError::Parse {
                    path: path.to_path_buf(),
                    source: err,
                });
            }
        };

        config.validate().map_err(|reason| ConfigError::Invalid {
            path: path.to_path_buf(),
            reason,
        })?;
        Ok(Some(config))
    }

    fn validate(&self) -> Result<(), &'static str> {
        if self
            .fail_safe
            .as_ref()
            .and_then(|section| section.max_cumulative_secs)
            == Some(0)
        {
            return Err("fail_safe.max_cumulative_secs must be positive");
        }
        if self
            .runtime
            .as_ref()
            .and_then(|runtime| runtime.max_queue_depth)
            == Some(0)
        {
            return Err("runtime.max_queue_depth must be positive");
        }
        Ok(())
    }

    #[must_use]
    pub fn fail_safe_config(&self) -> FailSafeConfig {
        let mut config = FailSafeConfig::default();
        if let Some(secs) = self
            .fail_safe
            .as_ref()
            .and_then(|section| section.max_cumulative_secs)
        {
            config.max_cumulative = Duration::from_secs(secs);
        }
        config
    }

    #[must_use]
    pub fn max_queue_depth(&self) -> Option<usize> {
        self.runtime
            .as_ref()
            .and_then(|runtime| runtime.max_queue_depth)
    }

    #[must_use]
    pub fn storage_backend(&self) -> StorageBackend {
        self.storage
            .as_ref()
            .and_then(|storage| storage.backend)
            .unwrap_or_default()
    }

    /// Location of the configured backend, if it has one.
    #[must_use]
    pub fn storage_path(&self) -> Option<PathBuf> {
        let backend = self.storage_backend();
        let configured = self.storage.as_ref().and_then(|storage| storage.path.as_deref());
        match (backend, configured) {
            (StorageBackend::Memory, _) => None,
            (_, Some(path)) => Some(expand_home(path)),
            (StorageBackend::File, None) => data_dir().map(|dir| dir.join("storage")),
            (StorageBackend::Sqlite, None) => data_dir().map(|dir| dir.join("storage.sqlite")),
        }
    }

    /// Open the configured persistence backend.
    pub fn open_storage(&self) -> anyhow::Result<Arc<dyn PersistentStorage>> {
        let backend = self.storage_backend();
        if backend == StorageBackend::Memory {
            return Ok(Arc::new(MemoryStorage::new()));
        }

        let path = self
            .storage_path()
            .context("no storage path configured and home directory is unknown")?;
        tracing::debug!(backend = backend.as_str(), path = %path.display(), "Opening storage");
        let storage: Arc<dyn PersistentStorage> = match backend {
            StorageBackend::Sqlite => Arc::new(
                SqliteStorage::open(&path)
                    .with_context(|| format!("opening sqlite storage at {}", path.display()))?,
            ),
            StorageBackend::File | StorageBackend::Memory => Arc::new(
                FileStorage::open(&path)
                    .with_context(|| format!("opening file storage at {}", path.display()))?,
            ),
        };
        Ok(storage)
    }
}

/// `$FAILSAFE_CONFIG` if set, otherwise `~/.failsafe/config.toml`.
pub fn config_path() -> Option<PathBuf> {
    config_path_from(std::env::var_os(CONFIG_ENV))
}

fn config_path_from(override_path: Option<OsString>) -> Option<PathBuf> {
    match override_path {
        Some(path) if !path.is_empty() => Some(PathBuf::from(path)),
        _ => data_dir().map(|dir| dir.join("config.toml")),
    }
}

fn data_dir() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(".failsafe"))
}

fn expand_home(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/")
        && let Some(home) = dirs::home_dir()
    {
        return home.join(rest);
    }
    PathBuf::from(path)
}
