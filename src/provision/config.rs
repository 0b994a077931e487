//! Provisioning configuration
//!
//! `ProvisionConfig` is built once per provisioning operation and never
//! mutated afterwards. Environment-derived defaults are resolved in exactly
//! one place, [`ProvisionConfig::detect`]; everything else goes through the
//! pure [`ProvisionConfig::with_overrides`] step.

use crate::config::Config;
use crate::error::{ConfigFieldError, InvowkError, InvowkResult};
use std::path::{Path, PathBuf};

/// Where the binary is placed inside provisioned images
pub const DEFAULT_BINARY_MOUNT_PATH: &str = "/invowk/bin";

/// Where modules are placed inside provisioned images
pub const DEFAULT_MODULES_MOUNT_PATH: &str = "/invowk/modules";

/// Environment variable carrying a tag suffix for test isolation
pub const TAG_SUFFIX_ENV: &str = "INVOWK_PROVISION_TAG_SUFFIX";

/// Configuration for auto-provisioning invowk resources into containers
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProvisionConfig {
    /// When false, provisioning passes the base image through untouched
    pub enabled: bool,

    /// Fail hard on provisioning errors instead of falling back to the base image
    pub strict: bool,

    /// Skip the cache lookup and always build
    pub force_rebuild: bool,

    /// Host binary to embed; `None` embeds no binary
    pub binary_path: Option<PathBuf>,

    /// Directories searched for `*.invowkmod` modules, in order
    pub module_paths: Vec<PathBuf>,

    /// Invowkfile being executed; its directory contributes to the cache key
    pub invowkfile_path: Option<PathBuf>,

    /// In-container directory for the binary
    pub binary_mount_path: String,

    /// In-container directory for modules
    pub modules_mount_path: String,

    /// Reserved for provisioning metadata
    pub cache_dir: Option<PathBuf>,

    /// Parent directory for ephemeral build contexts (home, cwd, temp when unset)
    pub context_root: Option<PathBuf>,

    /// Appended to provisioned tags as `-<suffix>`
    pub tag_suffix: Option<String>,
}

impl Default for ProvisionConfig {
    /// Environment-independent defaults: enabled, nothing to embed.
    fn default() -> Self {
        Self {
            enabled: true,
            strict: false,
            force_rebuild: false,
            binary_path: None,
            module_paths: Vec::new(),
            invowkfile_path: None,
            binary_mount_path: DEFAULT_BINARY_MOUNT_PATH.to_string(),
            modules_mount_path: DEFAULT_MODULES_MOUNT_PATH.to_string(),
            cache_dir: None,
            context_root: None,
            tag_suffix: None,
        }
    }
}

/// A single field override applied on top of a base config
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProvisionOverride {
    Enabled(bool),
    Strict(bool),
    ForceRebuild(bool),
    BinaryPath(Option<PathBuf>),
    ModulePaths(Vec<PathBuf>),
    AddModulePath(PathBuf),
    InvowkfilePath(Option<PathBuf>),
    BinaryMountPath(String),
    ModulesMountPath(String),
    CacheDir(Option<PathBuf>),
    ContextRoot(Option<PathBuf>),
    TagSuffix(Option<String>),
}

impl ProvisionConfig {
    /// Resolve defaults from the host environment.
    ///
    /// - binary: the currently running executable
    /// - modules: `~/.invowk/cmds` when it exists
    /// - cache dir: `<cache_dir>/invowk/provision`
    /// - tag suffix: `INVOWK_PROVISION_TAG_SUFFIX` when set and non-empty
    pub fn detect() -> Self {
        let binary_path = std::env::current_exe().ok();

        let module_paths = dirs::home_dir()
            .map(|home| home.join(".invowk").join("cmds"))
            .filter(|dir| dir.is_dir())
            .into_iter()
            .collect();

        let cache_dir = dirs::cache_dir().map(|d| d.join("invowk").join("provision"));

        let tag_suffix = std::env::var(TAG_SUFFIX_ENV)
            .ok()
            .filter(|s| !s.trim().is_empty());

        Self {
            binary_path,
            module_paths,
            cache_dir,
            tag_suffix,
            ..Self::default()
        }
    }

    /// Build from the application config, layered over [`Self::detect`].
    pub fn from_app_config(config: &Config) -> Self {
        let auto = &config.container.auto_provision;
        let mut overrides = vec![
            ProvisionOverride::Enabled(auto.enabled),
            ProvisionOverride::Strict(auto.strict),
        ];

        if let Some(ref binary) = auto.binary_path {
            overrides.push(ProvisionOverride::BinaryPath(Some(binary.clone())));
        }
        for include in &auto.includes {
            overrides.push(ProvisionOverride::AddModulePath(include.clone()));
        }
        if auto.inherit_includes {
            for include in &config.includes {
                overrides.push(ProvisionOverride::AddModulePath(include.clone()));
            }
        }
        if let Some(ref dir) = auto.cache_dir {
            overrides.push(ProvisionOverride::CacheDir(Some(dir.clone())));
        }
        if let Some(ref path) = auto.binary_mount_path {
            overrides.push(ProvisionOverride::BinaryMountPath(path.clone()));
        }
        if let Some(ref path) = auto.modules_mount_path {
            overrides.push(ProvisionOverride::ModulesMountPath(path.clone()));
        }

        Self::detect().with_overrides(overrides)
    }

    /// Apply overrides in order; later overrides win. An empty path means unset.
    pub fn with_overrides(mut self, overrides: impl IntoIterator<Item = ProvisionOverride>) -> Self {
        for o in overrides {
            match o {
                ProvisionOverride::Enabled(v) => self.enabled = v,
                ProvisionOverride::Strict(v) => self.strict = v,
                ProvisionOverride::ForceRebuild(v) => self.force_rebuild = v,
                ProvisionOverride::BinaryPath(v) => self.binary_path = non_empty(v),
                ProvisionOverride::ModulePaths(v) => {
                    self.module_paths = v.into_iter().filter(|p| !is_empty_path(p)).collect()
                }
                ProvisionOverride::AddModulePath(v) => {
                    if !is_empty_path(&v) {
                        self.module_paths.push(v)
                    }
                }
                ProvisionOverride::InvowkfilePath(v) => self.invowkfile_path = non_empty(v),
                ProvisionOverride::BinaryMountPath(v) => self.binary_mount_path = v,
                ProvisionOverride::ModulesMountPath(v) => self.modules_mount_path = v,
                ProvisionOverride::CacheDir(v) => self.cache_dir = non_empty(v),
                ProvisionOverride::ContextRoot(v) => self.context_root = non_empty(v),
                ProvisionOverride::TagSuffix(v) => self.tag_suffix = v,
            }
        }
        self
    }

    /// Validate every field, collecting all violations into one error.
    pub fn validate(&self) -> InvowkResult<()> {
        let mut errors = Vec::new();

        check_path(&mut errors, "binary_path", self.binary_path.as_deref());
        check_path(&mut errors, "invowkfile_path", self.invowkfile_path.as_deref());
        check_path(&mut errors, "cache_dir", self.cache_dir.as_deref());
        check_path(&mut errors, "context_root", self.context_root.as_deref());
        for (i, path) in self.module_paths.iter().enumerate() {
            check_path(&mut errors, &format!("module_paths[{}]", i), Some(path));
        }

        check_mount_path(&mut errors, "binary_mount_path", &self.binary_mount_path);
        check_mount_path(&mut errors, "modules_mount_path", &self.modules_mount_path);

        if let Some(ref suffix) = self.tag_suffix {
            if !suffix.is_empty() && !is_valid_tag_suffix(suffix) {
                errors.push(ConfigFieldError::new(
                    "tag_suffix",
                    "may only contain ASCII letters, digits, '.', '_' and '-'",
                ));
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(InvowkError::ProvisionConfigInvalid { errors })
        }
    }

    /// Tag suffix, treating an empty string as unset
    pub fn effective_tag_suffix(&self) -> Option<&str> {
        self.tag_suffix.as_deref().filter(|s| !s.is_empty())
    }
}

fn non_empty(path: Option<PathBuf>) -> Option<PathBuf> {
    path.filter(|p| !is_empty_path(p))
}

fn is_empty_path(path: &Path) -> bool {
    path.as_os_str().is_empty()
}

fn check_path(errors: &mut Vec<ConfigFieldError>, field: &str, path: Option<&Path>) {
    if let Some(path) = path.filter(|p| !is_empty_path(p)) {
        if path.as_os_str().to_string_lossy().trim().is_empty() {
            errors.push(ConfigFieldError::new(field, "must not be blank"));
        }
    }
}

fn check_mount_path(errors: &mut Vec<ConfigFieldError>, field: &str, path: &str) {
    if path.trim().is_empty() {
        errors.push(ConfigFieldError::new(field, "must not be blank"));
    } else if !path.starts_with('/') {
        errors.push(ConfigFieldError::new(
            field,
            format!("must be an absolute container path, got {:?}", path),
        ));
    }
}

fn is_valid_tag_suffix(suffix: &str) -> bool {
    suffix
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'))
}
