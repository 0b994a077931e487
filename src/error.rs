//! Error types for invowk-provision
//!
//! All modules use `InvowkResult<T>` as their return type.

use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for provisioning operations
pub type InvowkResult<T> = Result<T, InvowkError>;

/// A single invalid field found while validating a provision config
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigFieldError {
    /// Field name, with an index for list fields (e.g. `module_paths[2]`)
    pub field: String,
    /// What is wrong with the value
    pub reason: String,
}

impl ConfigFieldError {
    pub fn new(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            reason: reason.into(),
        }
    }
}

impl fmt::Display for ConfigFieldError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.reason)
    }
}

/// All errors that can occur while provisioning or running containers
#[derive(Error, Debug)]
pub enum InvowkError {
    // Engine errors
    #[error("Container engine '{engine}' is not available: {reason}")]
    EngineNotAvailable { engine: String, reason: String },

    #[error("Unknown container engine: {0}")]
    UnknownEngine(String),

    #[error("{command} exited with code {code}: {stderr}")]
    EngineExit {
        command: String,
        code: i32,
        stderr: String,
    },

    #[error("Image build failed: {tag}: {reason}")]
    ImageBuild {
        tag: String,
        code: Option<i32>,
        reason: String,
    },

    #[error("Unsupported container image {image}: {reason}")]
    UnsupportedImage { image: String, reason: String },

    #[error("Containerfile not found at {0}")]
    ContainerfileNotFound(PathBuf),

    // Provisioning errors
    #[error("{}", format_field_errors(.errors))]
    ProvisionConfigInvalid { errors: Vec<ConfigFieldError> },

    #[error("Failed to hash {path}: {source}")]
    Hash {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid build context: {reason}")]
    BuildContext { reason: String },

    #[error("Failed to build provisioned image {tag} (context {context_dir}): {source}")]
    ProvisionBuild {
        tag: String,
        context_dir: PathBuf,
        #[source]
        source: Box<InvowkError>,
    },

    #[error("Container provisioning failed (strict mode enabled): {0}")]
    ProvisionStrict(#[source] Box<InvowkError>),

    // Cancellation
    #[error("Operation cancelled during {context}")]
    Cancelled { context: String },

    #[error("Deadline exceeded during {context}")]
    DeadlineExceeded { context: String },

    // Configuration errors
    #[error("Invalid configuration at {path}: {reason}")]
    ConfigInvalid { path: PathBuf, reason: String },

    #[error("Failed to create config directory {path}: {source}")]
    ConfigDirCreate {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // IO errors
    #[error("IO error: {context}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Path not found: {0}")]
    PathNotFound(PathBuf),

    // Process errors
    #[error("Command failed: {command}")]
    CommandFailed {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Command execution error: {command}, stderr: {stderr}")]
    CommandExecution { command: String, stderr: String },

    // Serialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("TOML serialize error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    // General errors
    #[error("Internal error: {0}")]
    Internal(String),

    #[error("{0}")]
    User(String),
}

fn format_field_errors(errors: &[ConfigFieldError]) -> String {
    match errors {
        [single] => format!("Invalid provision config: {}", single),
        many => {
            let listed: Vec<String> = many.iter().map(ToString::to_string).collect();
            format!(
                "Invalid provision config: {} field errors: {}",
                many.len(),
                listed.join("; ")
            )
        }
    }
}

impl InvowkError {
    /// Create an IO error with context
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }

    /// Create a command failed error
    pub fn command_failed(command: impl Into<String>, source: std::io::Error) -> Self {
        Self::CommandFailed {
            command: command.into(),
            source,
        }
    }

    /// Create a command execution error
    pub fn command_exec(command: impl Into<String>, stderr: impl Into<String>) -> Self {
        Self::CommandExecution {
            command: command.into(),
            stderr: stderr.into(),
        }
    }

    /// Create a cancellation error
    pub fn cancelled(context: impl Into<String>) -> Self {
        Self::Cancelled {
            context: context.into(),
        }
    }

    /// Exit code reported by the container engine process, if this error carries one.
    ///
    /// Looks through provisioning wrappers so a wrapped build failure still
    /// exposes the engine's code.
    pub fn exit_code(&self) -> Option<i32> {
        match self {
            Self::EngineExit { code, .. } => Some(*code),
            Self::ImageBuild { code, .. } => *code,
            Self::ProvisionBuild { source, .. } | Self::ProvisionStrict(source) => {
                source.exit_code()
            }
            _ => None,
        }
    }

    /// Whether this error is (or wraps) an explicit cancellation or deadline
    pub fn is_cancellation(&self) -> bool {
        match self {
            Self::Cancelled { .. } | Self::DeadlineExceeded { .. } => true,
            Self::ProvisionBuild { source, .. } | Self::ProvisionStrict(source) => {
                source.is_cancellation()
            }
            _ => false,
        }
    }

    /// Get actionable hint for the error
    pub fn hint(&self) -> Option<&'static str> {
        match self {
            Self::EngineNotAvailable { .. } => Some("Install podman or docker and make sure it is on PATH"),
            Self::UnsupportedImage { .. } => Some("Use a Debian-based image such as debian:stable-slim"),
            Self::ProvisionStrict(_) => {
                Some("Disable strict mode with container.auto_provision.strict = false to fall back to the base image")
            }
            Self::ProvisionConfigInvalid { .. } => {
                Some("Check the auto_provision paths in your config and command-line flags")
            }
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display() {
        let err = InvowkError::UnknownEngine("containerd".to_string());
        assert!(err.to_string().contains("Unknown container engine"));
    }

    #[test]
    fn error_hint() {
        let err = InvowkError::EngineNotAvailable {
            engine: "podman".to_string(),
            reason: "not installed".to_string(),
        };
        assert!(err.hint().unwrap().contains("podman"));
        assert_eq!(InvowkError::Internal("x".to_string()).hint(), None);
    }

    #[test]
    fn config_errors_list_every_field() {
        let err = InvowkError::ProvisionConfigInvalid {
            errors: vec![
                ConfigFieldError::new("binary_path", "must not be blank"),
                ConfigFieldError::new("module_paths[1]", "must not be blank"),
            ],
        };
        let msg = err.to_string();
        assert!(msg.contains("2 field errors"));
        assert!(msg.contains("binary_path"));
        assert!(msg.contains("module_paths[1]"));
    }

    #[test]
    fn single_config_error_is_inlined() {
        let err = InvowkError::ProvisionConfigInvalid {
            errors: vec![ConfigFieldError::new("cache_dir", "must not be blank")],
        };
        assert_eq!(
            err.to_string(),
            "Invalid provision config: cache_dir: must not be blank"
        );
    }

    #[test]
    fn exit_code_seen_through_wrappers() {
        let inner = InvowkError::ImageBuild {
            tag: "t".to_string(),
            code: Some(125),
            reason: "boom".to_string(),
        };
        let wrapped = InvowkError::ProvisionBuild {
            tag: "t".to_string(),
            context_dir: PathBuf::from("/tmp/ctx"),
            source: Box::new(inner),
        };
        assert_eq!(wrapped.exit_code(), Some(125));
        assert!(wrapped.to_string().contains("Failed to build provisioned image t"));
    }

    #[test]
    fn cancellation_detected() {
        assert!(InvowkError::cancelled("retry").is_cancellation());
        assert!(InvowkError::DeadlineExceeded {
            context: "run".to_string()
        }
        .is_cancellation());
        assert!(!InvowkError::Internal("x".to_string()).is_cancellation());
    }
}
