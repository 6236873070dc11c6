use galleria_core::{GalleriaError, Result, Timeouts};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    pub object_store: ObjectStoreConfig,
    pub metadata: MetadataConfig,
    #[serde(default)]
    pub tagging: Option<TaggingConfig>,
    #[serde(default)]
    pub timeouts: TimeoutConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,
    /// Empty means any origin.
    #[serde(default)]
    pub cors_allowed_origins: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
            cors_allowed_origins: Vec::new(),
        }
    }
}

fn default_bind_addr() -> String {
    "127.0.0.1:8080".to_string()
}

/// Object store backend: `memory`, `local`, `s3` or `azure`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ObjectStoreConfig {
    pub backend: String,
    #[serde(default)]
    pub root: Option<PathBuf>,
    #[serde(default)]
    pub bucket: Option<String>,
    #[serde(default)]
    pub region: Option<String>,
    #[serde(default)]
    pub account: Option<String>,
    #[serde(default)]
    pub access_key: Option<String>,
    #[serde(default)]
    pub container: Option<String>,
    #[serde(default)]
    pub public_base_url: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetadataConfig {
    pub sqlite_path: PathBuf,
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,
}

fn default_busy_timeout_ms() -> u64 {
    5000
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaggingConfig {
    pub endpoint: String,
    pub subscription_key: String,
    #[serde(default = "default_tagging_ms")]
    pub timeout_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimeoutConfig {
    #[serde(default = "default_store_ms")]
    pub store_ms: u64,
    #[serde(default = "default_tagging_ms")]
    pub tagging_ms: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            store_ms: default_store_ms(),
            tagging_ms: default_tagging_ms(),
        }
    }
}

fn default_store_ms() -> u64 {
    10_000
}

fn default_tagging_ms() -> u64 {
    15_000
}

impl TimeoutConfig {
    pub fn to_timeouts(&self) -> Timeouts {
        Timeouts {
            store: Duration::from_millis(self.store_ms),
            tagging: Duration::from_millis(self.tagging_ms),
        }
    }
}

impl Config {
    pub fn from_file(path: &str) -> Result<Self> {
        let settings = ::config::Config::builder()
            .add_source(::config::File::with_name(path))
            .add_source(
                ::config::Environment::with_prefix("GALLERIA")
                    .prefix_separator("_")
                    .separator("__"),
            )
            .build()
            .map_err(|e| GalleriaError::Config(e.to_string()))?;

        let config: Config = settings
            .try_deserialize()
            .map_err(|e| GalleriaError::Config(e.to_string()))?;

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.server.bind_addr.trim().is_empty() {
            return Err(GalleriaError::Config(
                "server.bind_addr cannot be empty".to_string(),
            ));
        }
        if self.object_store.backend.trim().is_empty() {
            return Err(GalleriaError::Config(
                "object_store.backend is required".to_string(),
            ));
        }
        if self.metadata.sqlite_path.as_os_str().is_empty() {
            return Err(GalleriaError::Config(
                "metadata.sqlite_path is required".to_string(),
            ));
        }
        if self.timeouts.store_ms == 0 || self.timeouts.tagging_ms == 0 {
            return Err(GalleriaError::Config(
                "timeouts must be greater than zero".to_string(),
            ));
        }
        if let Some(tagging) = &self.tagging {
            if tagging.endpoint.trim().is_empty() {
                return Err(GalleriaError::Config(
                    "tagging.endpoint cannot be empty when tagging is configured".to_string(),
                ));
            }
        }
        Ok(())
    }
}
