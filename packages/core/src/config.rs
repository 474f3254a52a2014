//! Core configuration
//!
//! Loaded from a JSON file. Every field has a serde default so files written
//! by older versions keep loading.

use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::fs;

/// Overrides `cache_path` when set
pub const CACHE_PATH_ENV: &str = "PAGESPACE_CACHE_PATH";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoreConfig {
    /// libsql file backing the Local Cache; `None` keeps everything in memory
    #[serde(default)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cache_path: Option<PathBuf>,

    /// Transient failures tolerated before an operation is moved to failed
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Periodic drain timer; `None` drains only on reconnect or flush
    #[serde(default)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub drain_interval_secs: Option<u64>,

    /// Buffered change events per document store subscriber
    #[serde(default = "default_event_channel_capacity")]
    pub event_channel_capacity: usize,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            cache_path: None,
            max_retries: default_max_retries(),
            drain_interval_secs: None,
            event_channel_capacity: default_event_channel_capacity(),
        }
    }
}

fn default_max_retries() -> u32 {
    3
}

fn default_event_channel_capacity() -> usize {
    256
}

impl CoreConfig {
    /// Load configuration from `path`, or defaults if the file doesn't exist
    ///
    /// `PAGESPACE_CACHE_PATH` takes precedence over the file's `cache_path`.
    pub async fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let mut config = if fs::try_exists(path).await.unwrap_or(false) {
            let contents = fs::read_to_string(path)
                .await
                .with_context(|| format!("Failed to read config {}", path.display()))?;
            serde_json::from_str(&contents)
                .with_context(|| format!("Failed to parse config {}", path.display()))?
        } else {
            Self::default()
        };

        if let Ok(env_path) = std::env::var(CACHE_PATH_ENV) {
            tracing::info!("Using cache path from {}: {}", CACHE_PATH_ENV, env_path);
            config.cache_path = Some(PathBuf::from(env_path));
        }
        Ok(config)
    }

    /// Save configuration to `path`
    ///
    /// Writes to a temp file first, then renames it over the target.
    pub async fn save(&self, path: impl AsRef<Path>) -> anyhow::Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)
                    .await
                    .with_context(|| format!("Failed to create {}", parent.display()))?;
            }
        }

        let mut temp_name = path.as_os_str().to_owned();
        temp_name.push(".tmp");
        let temp_file = PathBuf::from(temp_name);

        let serialized = serde_json::to_string_pretty(self).context("Failed to serialize config")?;
        fs::write(&temp_file, serialized)
            .await
            .with_context(|| format!("Failed to write {}", temp_file.display()))?;
        fs::rename(&temp_file, path)
            .await
            .with_context(|| format!("Failed to save config {}", path.display()))?;
        Ok(())
    }
}
