//! Load configuration via `config` crate with env-override support.

use std::{collections::HashMap, ops::Deref, path::PathBuf, sync::Arc, time::Duration};

use serde::Deserialize;

use super::types::Res;

/// Default location of the persisted case collection.
fn default_data_file() -> PathBuf {
    PathBuf::from("emergency_data.json")
}

/// Default directory for conversation artifacts.
fn default_conversation_dir() -> PathBuf {
    PathBuf::from(".")
}

/// Default bound on a single storage I/O step, in seconds.
fn default_storage_timeout_secs() -> u64 {
    10
}

/// Unparseable stores fail loudly by default.
fn default_strict_load() -> bool {
    true
}

/// Configuration for the case registry.
#[derive(Debug, Clone, Default)]
pub struct Config {
    pub inner: Arc<ConfigInner>,
}

impl Deref for Config {
    type Target = ConfigInner;

    fn deref(&self) -> &Self::Target {
        &self.inner
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct ConfigInner {
    /// Persisted case collection (`DATA_FILE`).
    #[serde(default = "default_data_file")]
    pub data_file: PathBuf,
    /// Directory holding one `conversation_{id}.txt` per case (`CONVERSATION_DIR`).
    #[serde(default = "default_conversation_dir")]
    pub conversation_dir: PathBuf,
    /// Upper bound on each storage read or write (`STORAGE_TIMEOUT_SECS`).
    #[serde(default = "default_storage_timeout_secs")]
    pub storage_timeout_secs: u64,
    /// Whether an unparseable data file is an error (`STRICT_LOAD`).
    /// When false, the store logs a warning and starts empty.
    #[serde(default = "default_strict_load")]
    pub strict_load: bool,
    /// Responders on hand per label, used when summarizing dispatch.
    #[serde(default)]
    pub available_responders: HashMap<String, usize>,
}

impl Default for ConfigInner {
    fn default() -> Self {
        Self {
            data_file: default_data_file(),
            conversation_dir: default_conversation_dir(),
            storage_timeout_secs: default_storage_timeout_secs(),
            strict_load: default_strict_load(),
            available_responders: HashMap::new(),
        }
    }
}

impl ConfigInner {
    pub fn storage_timeout(&self) -> Duration {
        Duration::from_secs(self.storage_timeout_secs)
    }
}

impl Config {
    pub fn load(explicit_path: Option<&std::path::Path>) -> Res<Self> {
        let mut cfg = config::Config::builder();

        if let Some(p) = explicit_path {
            cfg = cfg.add_source(config::File::from(p.to_path_buf()));
        } else if std::path::Path::new(".hidden/config.toml").exists() {
            cfg = cfg.add_source(config::File::with_name(".hidden/config.toml"));
        }

        // Environment wins over the file.
        cfg = cfg.add_source(config::Environment::default().prefix("DISASTER_RELIEF"));

        let result = Config {
            inner: Arc::new(cfg.build()?.try_deserialize()?),
        };

        result.validate()?;

        Ok(result)
    }

    /// Wrap an already-built inner configuration.
    pub fn new(inner: ConfigInner) -> Res<Self> {
        let result = Config { inner: Arc::new(inner) };
        result.validate()?;
        Ok(result)
    }

    fn validate(&self) -> Res<()> {
        if self.storage_timeout_secs < 1 || self.storage_timeout_secs > 3600 {
            return Err(anyhow::anyhow!("Storage timeout must be between 1 and 3600 seconds."));
        }

        if self.data_file.as_os_str().is_empty() {
            return Err(anyhow::anyhow!("Data file path must not be empty."));
        }

        Ok(())
    }
}
