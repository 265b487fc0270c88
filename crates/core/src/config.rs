//! Application configuration.
//!
//! Values are layered: built-in defaults, then `config.toml` in the user
//! config directory, then `POSTDESK_*` environment variables.

use std::{
    fs,
    path::{Path, PathBuf},
};

use anyhow::{bail, Context, Result};
use config::{Config, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::table::DEFAULT_PAGE_SIZE;

/// Upstream posts service.
pub const DEFAULT_API_BASE_URL: &str = "https://jsonplaceholder.typicode.com";

/// Directory under the user config directory.
pub const CONFIG_DIR_NAME: &str = "postdesk";

const ENV_PREFIX: &str = "POSTDESK";

const DEFAULT_CONFIG: &str = r#"# postdesk configuration
#
# Every key can also be set through the environment, e.g.
# POSTDESK_API_BASE_URL=http://localhost:3000

# Root of the REST service; posts live under <api_base_url>/posts.
api_base_url = "https://jsonplaceholder.typicode.com"

# Rows per table page.
page_size = 10

# How long notifications stay in the status bar.
notice_seconds = 5

# Where postdesk.log is written. Relative paths resolve from the working directory.
log_dir = "logs"
"#;

/// Runtime settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppConfig {
    /// Root of the REST service.
    pub api_base_url: String,
    /// Rows per table page.
    pub page_size: usize,
    /// Seconds a notification stays visible.
    pub notice_seconds: u64,
    /// Directory for the log file.
    pub log_dir: PathBuf,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
            page_size: DEFAULT_PAGE_SIZE,
            notice_seconds: 5,
            log_dir: PathBuf::from("logs"),
        }
    }
}

impl AppConfig {
    /// Load from the default config file and the environment.
    pub fn load() -> Result<Self> {
        Self::load_from(config_path())
    }

    /// Load from `path` (optional) and the environment.
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let defaults = Config::try_from(&AppConfig::default())
            .context("failed to build default configuration")?;
        let settings = Config::builder()
            .add_source(defaults)
            .add_source(File::from(path).format(FileFormat::Toml).required(false))
            .add_source(Environment::with_prefix(ENV_PREFIX).try_parsing(true))
            .build()
            .with_context(|| format!("failed to read configuration {}", path.display()))?;
        let config: AppConfig = settings
            .try_deserialize()
            .with_context(|| format!("invalid configuration in {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.page_size == 0 {
            bail!("page_size must be at least 1");
        }
        if self.api_base_url.trim().is_empty() {
            bail!("api_base_url must not be empty");
        }
        Ok(())
    }
}

/// `~/.config/postdesk` or the platform equivalent.
pub fn config_dir() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(CONFIG_DIR_NAME)
}

/// Default config file location.
pub fn config_path() -> PathBuf {
    config_dir().join("config.toml")
}

/// Write the commented default file if no config file exists yet.
pub fn ensure_default_config() -> Result<()> {
    write_default_config(config_path())?;
    Ok(())
}

/// Write the default file to `path` unless it exists. Returns whether a file
/// was written.
pub fn write_default_config(path: impl AsRef<Path>) -> Result<bool> {
    let path = path.as_ref();
    if path.exists() {
        return Ok(false);
    }
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }
    fs::write(path, DEFAULT_CONFIG)
        .with_context(|| format!("failed to write {}", path.display()))?;
    info!(path = %path.display(), "wrote default configuration");
    Ok(true)
}
