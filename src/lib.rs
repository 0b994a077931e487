//! invowk-provision - content-addressed container provisioning
//!
//! Layers the invowk binary and modules on top of arbitrary base images so
//! nested invowk invocations work inside containers, caching the result
//! under a tag derived from the content of everything that went into it.

pub mod cli;
pub mod config;
pub mod engine;
pub mod error;
pub mod provision;
pub mod runner;
pub mod ui;

pub use error::{InvowkError, InvowkResult};
