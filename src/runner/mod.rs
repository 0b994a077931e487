//! Container execution
//!
//! Resolves the image a command runs in (explicit image or one built from a
//! Containerfile), provisions it with invowk resources, then runs the
//! command with retries for transient engine failures.

mod image;

pub use image::{
    generate_image_tag, is_alpine_image, is_windows_image, resolve_containerfile,
    validate_supported_image,
};

use crate::engine::{
    is_transient_exit_code, run_with_backoff, AttemptError, BuildOptions, ContainerEngine,
    RetryPolicy, RunOptions, RunResult,
};
use crate::error::{InvowkError, InvowkResult};
use crate::provision::{
    LayerProvisioner, OutputSink, ProvisionConfig, ProvisionGate, ProvisionOverride,
};
use std::collections::{BTreeMap, HashMap};
use std::io::Write;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Where the base image comes from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImageSource {
    /// Use a registry or local image directly
    Image(String),
    /// Build from a Containerfile/Dockerfile in `context_dir`
    Containerfile {
        context_dir: PathBuf,
        file: Option<String>,
    },
}

/// One command to run in a container
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunRequest {
    pub source: ImageSource,
    pub command: Vec<String>,
    /// Invowkfile being executed; names the Containerfile image and feeds the cache key
    pub invowkfile: Option<PathBuf>,
    pub env: BTreeMap<String, String>,
    pub volumes: Vec<String>,
    pub workdir: Option<String>,
    /// Rebuild both the base image and the provisioned layer
    pub force_rebuild: bool,
    pub interactive: bool,
    pub tty: bool,
}

impl RunRequest {
    pub fn new(source: ImageSource, command: Vec<String>) -> Self {
        Self {
            source,
            command,
            invowkfile: None,
            env: BTreeMap::new(),
            volumes: Vec::new(),
            workdir: None,
            force_rebuild: false,
            interactive: false,
            tty: false,
        }
    }
}

/// Image chosen for a run plus the environment it needs
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedImage {
    pub image: String,
    pub env: HashMap<String, String>,
    pub provisioned: bool,
}

/// Runs commands in containers on top of a [`ContainerEngine`]
pub struct ContainerRunner {
    engine: Arc<dyn ContainerEngine>,
    provision: ProvisionConfig,
    gate: Option<ProvisionGate>,
    on_output: Option<OutputSink>,
    build_retry: RetryPolicy,
    run_retry: RetryPolicy,
}

impl ContainerRunner {
    /// Create a runner. The provision config is validated here so bad
    /// settings are reported before any container work starts.
    pub fn new(engine: Arc<dyn ContainerEngine>, provision: ProvisionConfig) -> InvowkResult<Self> {
        if provision.enabled {
            provision.validate()?;
        }
        Ok(Self {
            engine,
            provision,
            gate: None,
            on_output: None,
            build_retry: RetryPolicy::BUILD,
            run_retry: RetryPolicy::RUN,
        })
    }

    /// Limit concurrent provisioning through a caller-owned gate
    pub fn with_gate(mut self, gate: ProvisionGate) -> Self {
        self.gate = Some(gate);
        self
    }

    pub fn with_build_output(mut self, on_output: OutputSink) -> Self {
        self.on_output = Some(on_output);
        self
    }

    pub fn with_retry_policies(mut self, build: RetryPolicy, run: RetryPolicy) -> Self {
        self.build_retry = build;
        self.run_retry = run;
        self
    }

    pub fn engine(&self) -> &Arc<dyn ContainerEngine> {
        &self.engine
    }

    /// Resolve the base image, building it from a Containerfile when needed.
    pub async fn ensure_image(
        &self,
        cancel: &CancellationToken,
        request: &RunRequest,
    ) -> InvowkResult<String> {
        let (context_dir, file) = match &request.source {
            ImageSource::Image(image) => return Ok(image.clone()),
            ImageSource::Containerfile { context_dir, file } => (context_dir, file),
        };

        let containerfile = resolve_containerfile(context_dir, file.as_deref())?;
        let tag_source = request
            .invowkfile
            .clone()
            .unwrap_or_else(|| context_dir.join(&containerfile));
        let tag = generate_image_tag(&tag_source)?;

        if !request.force_rebuild && self.engine.image_exists(&tag).await? {
            debug!("Image already built: {}", tag);
            return Ok(tag);
        }

        info!(
            "Building container image {} from {}",
            tag,
            context_dir.join(&containerfile).display()
        );

        let opts = BuildOptions {
            context_dir: context_dir.clone(),
            dockerfile: containerfile,
            tag: tag.clone(),
            no_cache: request.force_rebuild,
        };
        let opts = &opts;
        let engine = &self.engine;
        let on_output = self.build_output();
        let on_output = on_output.as_ref();
        let attempts = self.build_retry.max_attempts;

        run_with_backoff(
            cancel,
            attempts,
            self.build_retry.base_delay,
            |attempt| async move {
                if attempt > 0 {
                    info!("Retrying container build (attempt {}/{})", attempt + 1, attempts);
                }
                tokio::select! {
                    _ = cancel.cancelled() => Err(AttemptError::permanent(
                        InvowkError::cancelled("container image build"),
                    )),
                    built = engine.build_image(opts, on_output) => built.map_err(AttemptError::classify),
                }
            },
        )
        .await?;

        Ok(tag)
    }

    /// Provision `base_image` with invowk resources.
    ///
    /// In strict mode a provisioning failure is an error; otherwise it is
    /// logged and the unprovisioned base image is used with no extra env.
    pub async fn ensure_provisioned_image(
        &self,
        cancel: &CancellationToken,
        base_image: &str,
        request: &RunRequest,
    ) -> InvowkResult<ResolvedImage> {
        let unprovisioned = ResolvedImage {
            image: base_image.to_string(),
            env: HashMap::new(),
            provisioned: false,
        };
        if !self.provision.enabled {
            return Ok(unprovisioned);
        }

        let config = self.provision.clone().with_overrides([
            ProvisionOverride::InvowkfilePath(request.invowkfile.clone()),
            ProvisionOverride::ForceRebuild(request.force_rebuild),
        ]);
        let strict = config.strict;

        match self.provision(cancel, config, base_image).await {
            Ok(resolved) => Ok(resolved),
            Err(e) if e.is_cancellation() => Err(e),
            Err(e) if strict => Err(InvowkError::ProvisionStrict(Box::new(e))),
            Err(e) => {
                warn!("Container provisioning failed: {}", e);
                warn!("The container will run WITHOUT invowk resources (binary, modules)");
                warn!("To fail on provisioning errors, set container.auto_provision.strict = true");
                Ok(unprovisioned)
            }
        }
    }

    async fn provision(
        &self,
        cancel: &CancellationToken,
        config: ProvisionConfig,
        base_image: &str,
    ) -> InvowkResult<ResolvedImage> {
        let _permit = match self.gate {
            Some(ref gate) => Some(gate.acquire(cancel).await?),
            None => None,
        };

        let provisioner = LayerProvisioner::new(self.engine.clone(), config)?
            .with_build_output(self.build_output())
            .with_retry_policy(self.build_retry);

        let result = provisioner.provision(cancel, base_image).await?;
        Ok(ResolvedImage {
            image: result.image_tag,
            env: result.env,
            provisioned: true,
        })
    }

    /// Run a container, retrying transient engine failures.
    ///
    /// Errors are classified as usual; a run that exits 125 or 126 is also
    /// retried since those codes come from the engine, not the command.
    /// Stderr is captured per attempt and only the final attempt's output
    /// reaches the terminal. When every attempt ends in a transient exit
    /// code, the last result is returned.
    pub async fn run_with_retry(
        &self,
        cancel: &CancellationToken,
        opts: &RunOptions,
    ) -> InvowkResult<RunResult> {
        let mut opts = opts.clone();
        // A TTY needs the real stderr
        opts.capture_stderr = !opts.tty;

        let opts = &opts;
        let engine = &self.engine;
        let attempts = self.run_retry.max_attempts;
        let last_transient: Mutex<Option<RunResult>> = Mutex::new(None);
        let last_transient = &last_transient;

        let outcome = run_with_backoff(
            cancel,
            attempts,
            self.run_retry.base_delay,
            |attempt| async move {
                if let Ok(mut last) = last_transient.lock() {
                    *last = None;
                }

                let result = tokio::select! {
                    _ = cancel.cancelled() => {
                        return Err(AttemptError::permanent(InvowkError::cancelled("container run")));
                    }
                    result = engine.run(opts) => result,
                };

                match result {
                    Err(e) => {
                        debug!("Container run failed on attempt {}/{}: {}", attempt + 1, attempts, e);
                        Err(AttemptError::classify(e))
                    }
                    Ok(result) if is_transient_exit_code(result.exit_code) => {
                        debug!(
                            "Transient container exit code {} on attempt {}/{}",
                            result.exit_code,
                            attempt + 1,
                            attempts
                        );
                        let err = InvowkError::EngineExit {
                            command: format!("{} run", engine.name()),
                            code: result.exit_code,
                            stderr: result.stderr.trim().to_string(),
                        };
                        if let Ok(mut last) = last_transient.lock() {
                            *last = Some(result);
                        }
                        Err(AttemptError::transient(err))
                    }
                    Ok(result) => Ok(result),
                }
            },
        )
        .await;

        let last = last_transient.lock().ok().and_then(|mut l| l.take());
        match outcome {
            Ok(result) => {
                flush_stderr(&result.stderr);
                Ok(result)
            }
            Err(e) if e.is_cancellation() => Err(e),
            Err(e) => match last {
                Some(result) => {
                    flush_stderr(&result.stderr);
                    Ok(result)
                }
                None => Err(e),
            },
        }
    }

    /// Resolve, validate, provision and run `request`.
    pub async fn execute(
        &self,
        cancel: &CancellationToken,
        request: &RunRequest,
    ) -> InvowkResult<RunResult> {
        if let ImageSource::Image(ref image) = request.source {
            validate_supported_image(image)?;
        }

        let base_image = self.ensure_image(cancel, request).await?;
        let resolved = self
            .ensure_provisioned_image(cancel, &base_image, request)
            .await?;

        // Explicit environment wins over the provisioned defaults
        let mut env: BTreeMap<String, String> = resolved.env.into_iter().collect();
        env.extend(request.env.clone());

        let opts = RunOptions {
            image: resolved.image,
            command: request.command.clone(),
            workdir: request.workdir.clone(),
            env,
            volumes: request.volumes.clone(),
            remove: true,
            interactive: request.interactive,
            tty: request.tty,
            capture_stderr: false,
        };

        self.run_with_retry(cancel, &opts).await
    }

    fn build_output(&self) -> OutputSink {
        self.on_output
            .clone()
            .unwrap_or_else(|| Arc::new(|line: String| debug!("build: {}", line)))
    }
}

fn flush_stderr(stderr: &str) {
    if stderr.is_empty() {
        return;
    }
    let mut out = std::io::stderr().lock();
    if let Err(e) = out.write_all(stderr.as_bytes()).and_then(|_| out.flush()) {
        debug!("Failed to flush container stderr: {}", e);
    }
}
