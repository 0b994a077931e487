//! Container engine capability
//!
//! Provides a trait for the container operations invowk needs, implemented
//! by the Podman and Docker CLI backends.

use crate::error::InvowkResult;
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::path::PathBuf;

/// Options for building an image
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildOptions {
    /// Build context directory
    pub context_dir: PathBuf,
    /// Dockerfile name, resolved inside `context_dir` when relative
    pub dockerfile: String,
    /// Tag applied to the built image
    pub tag: String,
    /// Disable the engine's layer cache
    pub no_cache: bool,
}

impl BuildOptions {
    /// Path to the Dockerfile as passed to the engine's `-f` flag
    pub fn dockerfile_path(&self) -> PathBuf {
        let path = PathBuf::from(&self.dockerfile);
        if path.is_absolute() {
            path
        } else {
            self.context_dir.join(path)
        }
    }
}

/// Options for running a container
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunOptions {
    /// Image to run
    pub image: String,
    /// Command and arguments (empty uses the image default)
    pub command: Vec<String>,
    /// Working directory inside the container
    pub workdir: Option<String>,
    /// Environment variables
    pub env: BTreeMap<String, String>,
    /// Volume mounts (host:container format)
    pub volumes: Vec<String>,
    /// Remove the container after exit
    pub remove: bool,
    /// Keep stdin open
    pub interactive: bool,
    /// Allocate a TTY
    pub tty: bool,
    /// Capture stderr into `RunResult::stderr` instead of inheriting it
    pub capture_stderr: bool,
}

/// Result of running a container to completion
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunResult {
    /// Exit code of the container process (-1 when killed by a signal)
    pub exit_code: i32,
    /// Captured stderr (empty unless `capture_stderr` was set)
    pub stderr: String,
}

/// Abstract container engine interface
///
/// Non-zero exit codes from `run` are reported through `RunResult`, not as
/// errors; only failures to drive the engine itself are errors.
#[async_trait]
pub trait ContainerEngine: Send + Sync {
    /// Engine name for display and error messages
    fn name(&self) -> &'static str;

    /// Check if the engine binary is installed and responds
    async fn is_available(&self) -> bool;

    /// Engine version string
    async fn version(&self) -> InvowkResult<String>;

    /// Build an image, streaming each line of build output to `on_output`
    async fn build_image(
        &self,
        opts: &BuildOptions,
        on_output: &(dyn Fn(String) + Send + Sync),
    ) -> InvowkResult<()>;

    /// Check if an image with this tag exists locally
    async fn image_exists(&self, tag: &str) -> InvowkResult<bool>;

    /// Run a command in a new container and wait for it to exit
    async fn run(&self, opts: &RunOptions) -> InvowkResult<RunResult>;

    /// Remove an image (missing images are not an error)
    async fn image_remove(&self, tag: &str) -> InvowkResult<()>;

    /// List local image references starting with `prefix`
    async fn image_list_prefixed(&self, prefix: &str) -> InvowkResult<Vec<String>>;
}
