//! Configuration schema for invowk-provision
//!
//! Configuration is stored at `~/.config/invowk/config.toml`

use crate::engine::EngineKind;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Root configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// General settings
    pub general: GeneralConfig,

    /// Container settings
    pub container: ContainerConfig,

    /// Module search roots shared with the rest of invowk
    pub includes: Vec<PathBuf>,
}

/// General application settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Log format: "text" or "json"
    pub log_format: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_format: "text".to_string(),
        }
    }
}

/// Container configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ContainerConfig {
    /// Preferred engine; the other one is used when it is missing
    pub engine: EngineKind,

    /// Auto-provisioning of invowk resources into images
    pub auto_provision: AutoProvisionConfig,
}

/// `[container.auto_provision]`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AutoProvisionConfig {
    /// Provision images at all (default: true)
    pub enabled: bool,

    /// Fail instead of falling back to the base image
    pub strict: bool,

    /// Binary to embed (default: the running executable)
    pub binary_path: Option<PathBuf>,

    /// Extra module search roots for provisioning
    pub includes: Vec<PathBuf>,

    /// Also provision modules from the top-level `includes`
    pub inherit_includes: bool,

    /// Provisioning metadata directory
    pub cache_dir: Option<PathBuf>,

    /// In-container binary directory
    pub binary_mount_path: Option<String>,

    /// In-container modules directory
    pub modules_mount_path: Option<String>,
}

impl Default for AutoProvisionConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            strict: false,
            binary_path: None,
            includes: Vec::new(),
            inherit_includes: true,
            cache_dir: None,
            binary_mount_path: None,
            modules_mount_path: None,
        }
    }
}
