//! Cache key and provisioned tag derivation
//!
//! Everything here is engine-free: the same inputs always produce the same
//! tag, so callers can ask which tag *would* be used without touching podman
//! or docker.

use crate::error::InvowkResult;
use crate::provision::config::ProvisionConfig;
use crate::provision::context::{context_parent, MODULE_PATH_ENV};
use crate::provision::hash::{hash_directory, hash_directory_excluding, hash_file};
use crate::provision::modules::{discover_modules, module_name};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::path::Path;
use tracing::warn;

/// Repository part of every provisioned tag
pub const PROVISIONED_IMAGE_REPO: &str = "invowk-provisioned";

/// Prefix shared by every provisioned image reference
pub const PROVISIONED_IMAGE_PREFIX: &str = "invowk-provisioned:";

/// Hex characters of the cache key kept in the tag
pub const TAG_KEY_LENGTH: usize = 12;

/// Default directories appended after the embedded binary directory
const DEFAULT_PATH_TAIL: &str = "/usr/local/bin:/usr/bin:/bin";

/// Compute the cache key for provisioning `base_image` under `config`.
///
/// Fragments are fed into one SHA256 in this order: base image, binary hash,
/// one entry per discovered module, then the invowkfile's directory. A
/// binary that cannot be hashed is an error; unreadable modules and
/// invowkfile directories are left out of the key. Build contexts are
/// skipped when their parent sits inside the invowkfile's directory, so
/// concurrent or abandoned builds never move the key.
pub fn calculate_cache_key(config: &ProvisionConfig, base_image: &str) -> InvowkResult<String> {
    let mut hasher = Sha256::new();

    hasher.update(format!("image:{}", base_image).as_bytes());

    if let Some(ref binary) = config.binary_path {
        let digest = hash_file(binary)?;
        hasher.update(format!("binary:{}", digest).as_bytes());
    }

    for module in discover_modules(&config.module_paths) {
        let name = module_name(&module);
        match hash_directory(&module) {
            Ok(digest) => hasher.update(format!("module:{}:{}", name, digest).as_bytes()),
            Err(e) => warn!("Skipping module {} in cache key: {}", name, e),
        }
    }

    if let Some(dir) = config.invowkfile_path.as_deref().and_then(Path::parent) {
        match hash_directory_excluding(dir, &context_parent(config)) {
            Ok(digest) => hasher.update(format!("invowkfile:{}", digest).as_bytes()),
            Err(e) => warn!("Skipping invowkfile directory in cache key: {}", e),
        }
    }

    Ok(hex::encode(hasher.finalize()))
}

/// Build the provisioned tag from a cache key:
/// `invowk-provisioned:<12 hex>` or `invowk-provisioned:<12 hex>-<suffix>`.
pub fn provisioned_tag(config: &ProvisionConfig, cache_key: &str) -> String {
    let short = cache_key.get(..TAG_KEY_LENGTH).unwrap_or(cache_key);
    match config.effective_tag_suffix() {
        Some(suffix) => format!("{}{}-{}", PROVISIONED_IMAGE_PREFIX, short, suffix),
        None => format!("{}{}", PROVISIONED_IMAGE_PREFIX, short),
    }
}

/// Key computation plus tag derivation in one step
pub fn tag_for(config: &ProvisionConfig, base_image: &str) -> InvowkResult<String> {
    let key = calculate_cache_key(config, base_image)?;
    Ok(provisioned_tag(config, &key))
}

/// Whether an image reference names a provisioned image
pub fn is_provisioned_reference(image: &str) -> bool {
    image
        .strip_prefix("localhost/")
        .unwrap_or(image)
        .starts_with(PROVISIONED_IMAGE_PREFIX)
}

/// Environment a container needs to use the embedded resources.
///
/// The module path is always set; `PATH` is only set when a binary is embedded.
pub fn provision_env(config: &ProvisionConfig) -> HashMap<String, String> {
    let mut env = HashMap::new();
    env.insert(
        MODULE_PATH_ENV.to_string(),
        config.modules_mount_path.trim_end_matches('/').to_string(),
    );
    if config.binary_path.is_some() {
        env.insert(
            "PATH".to_string(),
            format!(
                "{}:{}",
                config.binary_mount_path.trim_end_matches('/'),
                DEFAULT_PATH_TAIL
            ),
        );
    }
    env
}
