//! Provisioned image layers
//!
//! Builds a derived image on top of a base image that carries the invowk
//! binary and modules, using content-addressed caching. The tag is derived
//! from a SHA256 over the base image, binary and module contents, so an
//! existing tag means the layer is already up to date.

use crate::engine::{
    run_with_backoff, AttemptError, BuildOptions, ContainerEngine, RetryPolicy,
};
use crate::error::{InvowkError, InvowkResult};
use crate::provision::config::ProvisionConfig;
use crate::provision::context::{prepare_build_context, DOCKERFILE_NAME};
use crate::provision::key::{
    is_provisioned_reference, provision_env, tag_for, PROVISIONED_IMAGE_PREFIX,
};
use crate::provision::modules::discover_modules;
use std::collections::HashMap;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Callback receiving each line of build output
pub type OutputSink = Arc<dyn Fn(String) + Send + Sync>;

/// Result of provisioning a base image
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProvisionResult {
    /// Image to run: the provisioned tag, or the base image when disabled
    pub image_tag: String,

    /// Environment the container needs to use the embedded resources
    pub env: HashMap<String, String>,

    /// Whether the image already existed (no build needed)
    pub was_cached: bool,
}

/// Builds and caches provisioned image layers
pub struct LayerProvisioner {
    engine: Arc<dyn ContainerEngine>,
    config: ProvisionConfig,
    on_output: OutputSink,
    retry: RetryPolicy,
}

impl LayerProvisioner {
    /// Create a provisioner; the config is validated up front so errors
    /// surface before any engine interaction.
    pub fn new(engine: Arc<dyn ContainerEngine>, config: ProvisionConfig) -> InvowkResult<Self> {
        config.validate()?;
        Ok(Self {
            engine,
            config,
            on_output: Arc::new(|line: String| debug!("build: {}", line)),
            retry: RetryPolicy::BUILD,
        })
    }

    /// Send build output somewhere other than the debug log
    pub fn with_build_output(mut self, on_output: OutputSink) -> Self {
        self.on_output = on_output;
        self
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn config(&self) -> &ProvisionConfig {
        &self.config
    }

    /// Provision `base_image`, building the layer only on a cache miss.
    pub async fn provision(
        &self,
        cancel: &CancellationToken,
        base_image: &str,
    ) -> InvowkResult<ProvisionResult> {
        if !self.config.enabled {
            debug!("Provisioning disabled, using {} as-is", base_image);
            return Ok(ProvisionResult {
                image_tag: base_image.to_string(),
                env: HashMap::new(),
                was_cached: false,
            });
        }

        if cancel.is_cancelled() {
            return Err(InvowkError::cancelled("provisioning"));
        }

        let tag = self.provisioned_tag(base_image).await?;
        debug!("Provisioned image tag for {}: {}", base_image, tag);

        if !self.config.force_rebuild && self.lookup(&tag).await {
            debug!("Provisioned image already cached: {}", tag);
            return Ok(ProvisionResult {
                image_tag: tag,
                env: provision_env(&self.config),
                was_cached: true,
            });
        }

        info!("Building provisioned image {} from {}", tag, base_image);
        self.build(cancel, base_image, &tag).await?;

        Ok(ProvisionResult {
            image_tag: tag,
            env: provision_env(&self.config),
            was_cached: false,
        })
    }

    /// Tag that provisioning `base_image` would produce. No engine calls.
    pub async fn provisioned_tag(&self, base_image: &str) -> InvowkResult<String> {
        let config = self.config.clone();
        let base = base_image.to_string();
        blocking(move || tag_for(&config, &base)).await
    }

    /// Whether the layer for `base_image` already exists. Never builds.
    pub async fn is_provisioned(&self, base_image: &str) -> InvowkResult<bool> {
        let tag = self.provisioned_tag(base_image).await?;
        self.engine.image_exists(&tag).await
    }

    /// Remove every provisioned image from the engine's store, returning how
    /// many were removed.
    pub async fn remove_provisioned_images(&self) -> InvowkResult<usize> {
        let images: Vec<String> = self
            .engine
            .image_list_prefixed(PROVISIONED_IMAGE_PREFIX)
            .await?
            .into_iter()
            .filter(|image| is_provisioned_reference(image))
            .collect();
        for image in &images {
            debug!("Removing provisioned image {}", image);
            self.engine.image_remove(image).await?;
        }
        Ok(images.len())
    }

    /// Cache lookup; errors count as a miss
    async fn lookup(&self, tag: &str) -> bool {
        match self.engine.image_exists(tag).await {
            Ok(exists) => exists,
            Err(e) => {
                warn!("Could not check for image {}, rebuilding: {}", tag, e);
                false
            }
        }
    }

    async fn build(
        &self,
        cancel: &CancellationToken,
        base_image: &str,
        tag: &str,
    ) -> InvowkResult<()> {
        let config = self.config.clone();
        let base = base_image.to_string();
        let context = blocking(move || {
            let modules = discover_modules(&config.module_paths);
            prepare_build_context(&config, &base, &modules)
        })
        .await?;

        let context_dir = context.path().to_path_buf();
        let wrap = |source: InvowkError| InvowkError::ProvisionBuild {
            tag: tag.to_string(),
            context_dir: context_dir.clone(),
            source: Box::new(source),
        };

        context.verify().map_err(wrap)?;

        let opts = BuildOptions {
            context_dir: context.path().to_path_buf(),
            dockerfile: DOCKERFILE_NAME.to_string(),
            tag: tag.to_string(),
            no_cache: false,
        };

        let opts = &opts;
        let engine = &self.engine;
        let on_output = self.on_output.as_ref();
        let result = run_with_backoff(
            cancel,
            self.retry.max_attempts,
            self.retry.base_delay,
            |attempt| async move {
                if attempt > 0 {
                    info!("Retrying build of {} (attempt {})", opts.tag, attempt + 1);
                }
                tokio::select! {
                    _ = cancel.cancelled() => Err(AttemptError::permanent(
                        InvowkError::cancelled("provisioned image build"),
                    )),
                    built = engine.build_image(opts, on_output) => built.map_err(AttemptError::classify),
                }
            },
        )
        .await;

        context.cleanup();
        result.map_err(wrap)
    }
}

/// Run blocking filesystem work off the async runtime
async fn blocking<T, F>(f: F) -> InvowkResult<T>
where
    F: FnOnce() -> InvowkResult<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| InvowkError::Internal(format!("blocking task failed: {}", e)))?
}
