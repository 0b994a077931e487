//! Podman and Docker engines driven through their command-line clients
//!
//! Both clients accept the same `build`/`run`/`rmi` surface, so one
//! implementation covers both; only image existence checks differ.

use crate::engine::runtime::{BuildOptions, ContainerEngine, RunOptions, RunResult};
use crate::error::{InvowkError, InvowkResult};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::process::Stdio;
use std::str::FromStr;
use tokio::process::Command;
use tracing::debug;

/// Supported container engines
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EngineKind {
    /// Podman (preferred, rootless by default)
    #[default]
    Podman,
    /// Docker
    Docker,
}

impl EngineKind {
    /// Name of the client binary looked up on PATH
    pub fn binary_name(&self) -> &'static str {
        match self {
            Self::Podman => "podman",
            Self::Docker => "docker",
        }
    }

    /// The other engine, used as a fallback
    pub fn fallback(&self) -> Self {
        match self {
            Self::Podman => Self::Docker,
            Self::Docker => Self::Podman,
        }
    }
}

impl fmt::Display for EngineKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.binary_name())
    }
}

impl FromStr for EngineKind {
    type Err = InvowkError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "podman" => Ok(Self::Podman),
            "docker" => Ok(Self::Docker),
            other => Err(InvowkError::UnknownEngine(other.to_string())),
        }
    }
}

/// Container engine backed by the `podman` or `docker` CLI
#[derive(Debug, Clone)]
pub struct CliEngine {
    kind: EngineKind,
}

impl CliEngine {
    /// Create an engine for the given kind
    pub fn new(kind: EngineKind) -> Self {
        Self { kind }
    }

    /// Which engine this is
    pub fn kind(&self) -> EngineKind {
        self.kind
    }

    fn command(&self) -> Command {
        let mut cmd = Command::new(self.kind.binary_name());
        cmd.kill_on_drop(true);
        cmd
    }

    fn describe(&self, args: &[&str]) -> String {
        format!("{} {}", self.kind, args.join(" "))
    }

    /// Execute an engine command and return the output
    async fn exec(&self, args: &[&str]) -> InvowkResult<std::process::Output> {
        debug!("Executing: {} {:?}", self.kind, args);

        self.command()
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(|e| InvowkError::command_failed(self.describe(args), e))
    }

    /// Argument list for `build`
    pub fn build_args(opts: &BuildOptions) -> Vec<String> {
        let mut args = vec![
            "build".to_string(),
            "-f".to_string(),
            opts.dockerfile_path().display().to_string(),
            "-t".to_string(),
            opts.tag.clone(),
        ];
        if opts.no_cache {
            args.push("--no-cache".to_string());
        }
        args.push(opts.context_dir.display().to_string());
        args
    }

    /// Argument list for `run`
    pub fn run_args(opts: &RunOptions) -> Vec<String> {
        let mut args = vec!["run".to_string()];

        if opts.remove {
            args.push("--rm".to_string());
        }
        if opts.interactive {
            args.push("-i".to_string());
        }
        if opts.tty {
            args.push("-t".to_string());
        }

        if let Some(ref workdir) = opts.workdir {
            args.push("-w".to_string());
            args.push(workdir.clone());
        }

        for v in &opts.volumes {
            args.push("-v".to_string());
            args.push(v.clone());
        }

        for (k, v) in &opts.env {
            args.push("-e".to_string());
            args.push(format!("{}={}", k, v));
        }

        args.push(opts.image.clone());
        args.extend(opts.command.iter().cloned());
        args
    }
}

#[async_trait]
impl ContainerEngine for CliEngine {
    fn name(&self) -> &'static str {
        self.kind.binary_name()
    }

    async fn is_available(&self) -> bool {
        self.command()
            .arg("--version")
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await
            .map(|s| s.success())
            .unwrap_or(false)
    }

    async fn version(&self) -> InvowkResult<String> {
        let output = self.exec(&["--version"]).await?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(InvowkError::command_exec(self.describe(&["--version"]), stderr));
        }
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }

    async fn build_image(
        &self,
        opts: &BuildOptions,
        on_output: &(dyn Fn(String) + Send + Sync),
    ) -> InvowkResult<()> {
        let args = Self::build_args(opts);
        debug!("Building image: {} {:?}", self.kind, args);

        let mut child = self
            .command()
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| InvowkError::command_failed(format!("{} build", self.kind), e))?;

        let all_output = super::stream_child_output(&mut child, on_output).await;

        let status = child
            .wait()
            .await
            .map_err(|e| InvowkError::command_failed(format!("{} build", self.kind), e))?;

        if !status.success() {
            let combined = all_output.join("\n");
            return Err(InvowkError::ImageBuild {
                tag: opts.tag.clone(),
                code: status.code(),
                reason: super::build_error_output(&combined, ""),
            });
        }

        Ok(())
    }

    async fn image_exists(&self, tag: &str) -> InvowkResult<bool> {
        let output = match self.kind {
            EngineKind::Podman => self.exec(&["image", "exists", tag]).await?,
            EngineKind::Docker => self.exec(&["image", "inspect", tag]).await?,
        };
        Ok(output.status.success())
    }

    async fn run(&self, opts: &RunOptions) -> InvowkResult<RunResult> {
        let args = Self::run_args(opts);
        debug!("Running container: {} {:?}", self.kind, args);

        let stderr = if opts.capture_stderr {
            Stdio::piped()
        } else {
            Stdio::inherit()
        };

        let child = self
            .command()
            .args(&args)
            .stdin(Stdio::inherit())
            .stdout(Stdio::inherit())
            .stderr(stderr)
            .spawn()
            .map_err(|e| InvowkError::command_failed(format!("{} run", self.kind), e))?;

        let output = child
            .wait_with_output()
            .await
            .map_err(|e| InvowkError::command_failed(format!("{} run", self.kind), e))?;

        Ok(RunResult {
            exit_code: output.status.code().unwrap_or(-1),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
        })
    }

    async fn image_remove(&self, tag: &str) -> InvowkResult<()> {
        let output = self.exec(&["rmi", tag]).await?;

        if output.status.success() {
            return Ok(());
        }

        let stderr = String::from_utf8_lossy(&output.stderr);
        if stderr.contains("image not known") || stderr.contains("No such image") {
            Ok(())
        } else {
            Err(InvowkError::command_exec(self.describe(&["rmi", tag]), stderr))
        }
    }

    async fn image_list_prefixed(&self, prefix: &str) -> InvowkResult<Vec<String>> {
        let filter = format!("reference={}*", prefix);
        let args = [
            "images",
            "--filter",
            filter.as_str(),
            "--format",
            "{{.Repository}}:{{.Tag}}",
        ];
        let output = self.exec(&args).await?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(InvowkError::command_exec(self.describe(&args), stderr));
        }

        Ok(String::from_utf8_lossy(&output.stdout)
            .lines()
            .map(str::trim)
            // Podman prefixes local images with "localhost/"
            .map(|l| l.strip_prefix("localhost/").unwrap_or(l))
            .filter(|l| l.starts_with(prefix))
            .map(String::from)
            .collect())
    }
}
