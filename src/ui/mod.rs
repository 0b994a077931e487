//! Terminal output for the CLI
//!
//! Uses `cliclack` for interactive output with automatic fallback to plain
//! lines in CI/non-interactive environments. Build progress goes to stderr so
//! stdout stays usable for tags and JSON.

mod context;
mod output;
mod progress;

pub use context::UiContext;
pub use output::{
    intro, key_value_status, outro_success, outro_warn, step_error_detail, step_ok_detail,
};
pub use progress::{BuildProgress, TaskSpinner};
