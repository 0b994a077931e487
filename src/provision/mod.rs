//! Auto-provisioning of invowk resources into container images
//!
//! A provisioned image is the user's base image plus the invowk binary and
//! modules, tagged by a content hash so unchanged inputs reuse the same layer.

pub mod config;
pub mod context;
mod gate;
pub mod hash;
pub mod key;
mod layer;
pub mod modules;

pub use config::{ProvisionConfig, ProvisionOverride};
pub use gate::ProvisionGate;
pub use key::{calculate_cache_key, provision_env, provisioned_tag, PROVISIONED_IMAGE_PREFIX};
pub use layer::{LayerProvisioner, OutputSink, ProvisionResult};
