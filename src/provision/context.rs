//! Ephemeral build contexts for provisioned images
//!
//! A build context is a uniquely named directory holding a copy of the host
//! binary, a `modules/` tree and a generated Dockerfile.
//!
//! Docker installed via Snap cannot see `/tmp` or hidden directories in
//! `$HOME`, so contexts live under a visible `~/invowk-build/` by default.

use crate::error::{InvowkError, InvowkResult};
use crate::provision::config::ProvisionConfig;
use crate::provision::modules::{copy_dir, copy_file, module_name};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Dockerfile name inside the context
pub const DOCKERFILE_NAME: &str = "Dockerfile";

/// File name of the embedded binary, both in the context and in the image
pub const BINARY_NAME: &str = "invowk";

/// Subdirectory holding copied modules
pub const MODULES_DIR: &str = "modules";

/// Variable pointing nested invocations at the embedded modules
pub const MODULE_PATH_ENV: &str = "INVOWK_MODULE_PATH";

/// Visible directory name used as the parent of all build contexts
const CONTEXT_PARENT_NAME: &str = "invowk-build";

/// A prepared build context directory.
///
/// Dropping the context removes the directory; [`BuildContext::cleanup`]
/// does the same explicitly.
#[derive(Debug)]
pub struct BuildContext {
    dir: PathBuf,
    removed: bool,
}

impl BuildContext {
    /// Context directory
    pub fn path(&self) -> &Path {
        &self.dir
    }

    /// Generated Dockerfile inside the context
    pub fn dockerfile_path(&self) -> PathBuf {
        self.dir.join(DOCKERFILE_NAME)
    }

    /// Check that the directory and Dockerfile are actually on disk
    pub fn verify(&self) -> InvowkResult<()> {
        if !self.dir.is_dir() {
            return Err(InvowkError::BuildContext {
                reason: format!("context directory does not exist: {}", self.dir.display()),
            });
        }
        let dockerfile = self.dockerfile_path();
        if !dockerfile.is_file() {
            return Err(InvowkError::BuildContext {
                reason: format!("Dockerfile not found in context: {}", dockerfile.display()),
            });
        }
        Ok(())
    }

    /// Remove the context directory
    pub fn cleanup(mut self) {
        self.remove();
    }

    fn remove(&mut self) {
        if self.removed {
            return;
        }
        self.removed = true;
        if let Err(e) = fs::remove_dir_all(&self.dir) {
            debug!("Failed to remove build context {}: {}", self.dir.display(), e);
        }
    }
}

impl Drop for BuildContext {
    fn drop(&mut self) {
        self.remove();
    }
}

/// Pick the parent directory for build contexts.
///
/// Order: explicit `context_root`, `~/invowk-build` when home exists,
/// `./invowk-build`, then the system temp directory.
pub fn context_parent(config: &ProvisionConfig) -> PathBuf {
    if let Some(ref root) = config.context_root {
        return root.clone();
    }
    if let Some(home) = dirs::home_dir().filter(|h| h.is_dir()) {
        return home.join(CONTEXT_PARENT_NAME);
    }
    if let Ok(cwd) = std::env::current_dir() {
        return cwd.join(CONTEXT_PARENT_NAME);
    }
    std::env::temp_dir().join(CONTEXT_PARENT_NAME)
}

/// Assemble a build context for `base_image` with the configured binary and
/// the given modules.
///
/// Binary copy and Dockerfile write failures are fatal. A module that fails
/// to copy is logged and left out.
pub fn prepare_build_context(
    config: &ProvisionConfig,
    base_image: &str,
    modules: &[PathBuf],
) -> InvowkResult<BuildContext> {
    let parent = context_parent(config);
    fs::create_dir_all(&parent).map_err(|e| {
        InvowkError::io(
            format!("creating build context parent {}", parent.display()),
            e,
        )
    })?;

    let dir = parent.join(format!("ctx-{}", uuid::Uuid::new_v4()));
    fs::create_dir(&dir)
        .map_err(|e| InvowkError::io(format!("creating build context {}", dir.display()), e))?;

    // From here on the guard removes the directory on every error path
    let context = BuildContext {
        dir,
        removed: false,
    };
    debug!("Preparing build context: {}", context.path().display());

    if let Some(ref binary) = config.binary_path {
        let dst = context.path().join(BINARY_NAME);
        copy_file(binary, &dst)?;
        make_executable(&dst)?;
    }

    let modules_dir = context.path().join(MODULES_DIR);
    fs::create_dir_all(&modules_dir)
        .map_err(|e| InvowkError::io("creating modules directory", e))?;

    for module in modules {
        let name = module_name(module);
        if let Err(e) = copy_dir(module, &modules_dir.join(&name)) {
            warn!("Failed to copy module {}: {}", name, e);
        }
    }

    let dockerfile = generate_dockerfile(
        base_image,
        &config.binary_mount_path,
        &config.modules_mount_path,
        config.binary_path.is_some(),
    );
    fs::write(context.dockerfile_path(), dockerfile)
        .map_err(|e| InvowkError::io("writing Dockerfile", e))?;

    Ok(context)
}

#[cfg(unix)]
fn make_executable(path: &Path) -> InvowkResult<()> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(0o755))
        .map_err(|e| InvowkError::io(format!("making {} executable", path.display()), e))
}

#[cfg(not(unix))]
fn make_executable(_path: &Path) -> InvowkResult<()> {
    Ok(())
}

/// Generate the Dockerfile for a provisioned layer.
///
/// Binary lines are omitted entirely when no binary is embedded.
pub fn generate_dockerfile(
    base_image: &str,
    binary_mount_path: &str,
    modules_mount_path: &str,
    include_binary: bool,
) -> String {
    let bin_dir = binary_mount_path.trim_end_matches('/');
    let mod_dir = modules_mount_path.trim_end_matches('/');

    let mut lines = vec![format!("FROM {}", base_image), String::new()];

    if include_binary {
        lines.push(format!("COPY {} {}/{}", BINARY_NAME, bin_dir, BINARY_NAME));
        lines.push(format!("RUN chmod +x {}/{}", bin_dir, BINARY_NAME));
        lines.push(String::new());
    }

    lines.push(format!("COPY {}/ {}/", MODULES_DIR, mod_dir));
    lines.push(String::new());

    if include_binary {
        lines.push(format!("ENV PATH=\"{}:$PATH\"", bin_dir));
    }
    lines.push(format!("ENV {}=\"{}\"", MODULE_PATH_ENV, mod_dir));
    lines.push(String::new());

    lines.join("\n")
}
