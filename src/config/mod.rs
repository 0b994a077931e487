//! Application configuration
//!
//! A single TOML file, `<config_dir>/invowk/config.toml` unless `--config`
//! points elsewhere. A missing file is the same as an empty one.

pub mod schema;

pub use schema::Config;

use crate::error::{InvowkError, InvowkResult};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, info};

/// Loads and saves the config file at one fixed path
#[derive(Debug, Clone)]
pub struct ConfigManager {
    config_path: PathBuf,
}

impl ConfigManager {
    /// Manager for the per-user config file
    pub fn new() -> Self {
        Self::with_path(Self::default_config_path())
    }

    pub fn with_path(path: PathBuf) -> Self {
        Self { config_path: path }
    }

    /// `<config_dir>/invowk/config.toml`, relative to the cwd when the
    /// platform has no config directory
    pub fn default_config_path() -> PathBuf {
        let base = dirs::config_dir().unwrap_or_else(|| PathBuf::from("."));
        base.join("invowk").join("config.toml")
    }

    pub fn path(&self) -> &Path {
        &self.config_path
    }

    /// Read the config file, falling back to defaults when it does not exist.
    pub async fn load(&self) -> InvowkResult<Config> {
        let content = match fs::read_to_string(&self.config_path).await {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!(
                    "No config at {}, using defaults",
                    self.config_path.display()
                );
                return Ok(Config::default());
            }
            Err(e) => {
                return Err(InvowkError::io(
                    format!("reading config {}", self.config_path.display()),
                    e,
                ))
            }
        };

        parse(&self.config_path, &content)
    }

    /// Write `config`, creating the parent directory if needed.
    pub async fn save(&self, config: &Config) -> InvowkResult<()> {
        if let Some(dir) = self.config_path.parent() {
            fs::create_dir_all(dir)
                .await
                .map_err(|source| InvowkError::ConfigDirCreate {
                    path: dir.to_path_buf(),
                    source,
                })?;
        }

        let rendered = toml::to_string_pretty(config)?;
        fs::write(&self.config_path, rendered)
            .await
            .map_err(|e| {
                InvowkError::io(format!("writing config {}", self.config_path.display()), e)
            })?;

        info!("Wrote configuration to {}", self.config_path.display());
        Ok(())
    }
}

impl Default for ConfigManager {
    fn default() -> Self {
        Self::new()
    }
}

/// Parse config text; errors name the file they came from
fn parse(path: &Path, content: &str) -> InvowkResult<Config> {
    toml::from_str(content).map_err(|e| InvowkError::ConfigInvalid {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })
}
