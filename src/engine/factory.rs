//! Engine factory with fallback detection
//!
//! Prefers the configured engine and falls back to the other one when the
//! preferred client is missing.

use crate::engine::cli::{CliEngine, EngineKind};
use crate::engine::runtime::ContainerEngine;
use crate::error::{InvowkError, InvowkResult};
use std::sync::Arc;
use tracing::{debug, info};

/// Create a container engine, preferring `preferred`
///
/// # Returns
/// * `Ok(Arc<dyn ContainerEngine>)` - the first available engine
/// * `Err(EngineNotAvailable)` - if neither podman nor docker responds
pub async fn create_engine(preferred: EngineKind) -> InvowkResult<Arc<dyn ContainerEngine>> {
    let engine = CliEngine::new(preferred);
    if engine.is_available().await {
        debug!("Using container engine: {}", preferred);
        return Ok(Arc::new(engine));
    }

    let fallback = preferred.fallback();
    let engine = CliEngine::new(fallback);
    if engine.is_available().await {
        info!("{} not available, falling back to {}", preferred, fallback);
        return Ok(Arc::new(engine));
    }

    Err(InvowkError::EngineNotAvailable {
        engine: preferred.to_string(),
        reason: format!(
            "{} is not installed or not accessible, and {} fallback is also not available",
            preferred, fallback
        ),
    })
}
