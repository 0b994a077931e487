//! CLI argument definitions using clap derive

use crate::engine::EngineKind;
use clap::{ArgAction, Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// invowk-provision - cached container layers for nested invowk
///
/// Builds derived images that carry the invowk binary and modules on top of
/// a base image, reusing them for as long as the inputs are unchanged.
#[derive(Parser, Debug)]
#[command(name = "invowk-provision")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,

    /// Increase verbosity (-v info, -vv debug)
    #[arg(short, long, global = true, action = ArgAction::Count)]
    pub verbose: u8,

    /// Configuration file path
    #[arg(short, long, global = true, env = "INVOWK_CONFIG")]
    pub config: Option<PathBuf>,

    /// Container engine to use (podman or docker)
    #[arg(long, global = true)]
    pub engine: Option<EngineKind>,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Build (or reuse) provisioned images for one or more base images
    Provision(ProvisionArgs),

    /// Print the provisioned tag for a base image without contacting the engine
    Tag(TagArgs),

    /// Show whether base images are already provisioned
    Status(StatusArgs),

    /// Run a command in a provisioned container
    Run(RunArgs),

    /// Remove all provisioned images
    Clean,

    /// Show or initialize configuration
    Config(ConfigArgs),
}

/// Inputs that determine the provisioned tag
#[derive(Args, Debug, Clone, Default)]
pub struct ProvisionInputArgs {
    /// Binary to embed (defaults to this executable)
    #[arg(long, value_name = "PATH")]
    pub binary: Option<PathBuf>,

    /// Embed no binary, only modules
    #[arg(long, conflicts_with = "binary")]
    pub no_binary: bool,

    /// Additional directory to search for *.invowkmod modules (repeatable)
    #[arg(long = "module-path", value_name = "DIR")]
    pub module_paths: Vec<PathBuf>,

    /// Invowkfile whose directory contributes to the cache key
    #[arg(long, value_name = "PATH")]
    pub invowkfile: Option<PathBuf>,

    /// Suffix appended to provisioned tags [env: INVOWK_PROVISION_TAG_SUFFIX]
    #[arg(long, value_name = "SUFFIX")]
    pub tag_suffix: Option<String>,
}

/// Arguments for the provision command
#[derive(Parser, Debug)]
pub struct ProvisionArgs {
    /// Base images to provision
    #[arg(required = true, value_name = "IMAGE")]
    pub images: Vec<String>,

    #[command(flatten)]
    pub input: ProvisionInputArgs,

    /// Skip the cache lookup and always build
    #[arg(long)]
    pub force_rebuild: bool,

    /// Maximum concurrent builds
    #[arg(short, long, default_value = "1")]
    pub jobs: usize,

    /// Output format
    #[arg(short, long, default_value = "table")]
    pub format: OutputFormat,
}

/// Arguments for the tag command
#[derive(Parser, Debug)]
pub struct TagArgs {
    /// Base image
    pub image: String,

    #[command(flatten)]
    pub input: ProvisionInputArgs,
}

/// Arguments for the status command
#[derive(Parser, Debug)]
pub struct StatusArgs {
    /// Base images to check
    #[arg(required = true, value_name = "IMAGE")]
    pub images: Vec<String>,

    #[command(flatten)]
    pub input: ProvisionInputArgs,

    /// Output format
    #[arg(short, long, default_value = "table")]
    pub format: OutputFormat,
}

/// Arguments for the run command
#[derive(Parser, Debug)]
pub struct RunArgs {
    /// Base image to run
    #[arg(long, required_unless_present = "containerfile")]
    pub image: Option<String>,

    /// Build the base image from this Containerfile (relative to --context)
    #[arg(long, conflicts_with = "image", num_args = 0..=1, default_missing_value = "")]
    pub containerfile: Option<String>,

    /// Build context for --containerfile (defaults to current directory)
    #[arg(long, value_name = "DIR")]
    pub context: Option<PathBuf>,

    #[command(flatten)]
    pub input: ProvisionInputArgs,

    /// Run the base image without provisioning
    #[arg(long)]
    pub no_provision: bool,

    /// Fail instead of falling back to the base image when provisioning fails
    #[arg(long)]
    pub strict: bool,

    /// Rebuild the base and provisioned images
    #[arg(long)]
    pub force_rebuild: bool,

    /// Environment variables (KEY=VALUE)
    #[arg(short, long, value_parser = parse_env_var)]
    pub env: Vec<(String, String)>,

    /// Volume mounts (host:container)
    #[arg(long)]
    pub volume: Vec<String>,

    /// Working directory inside the container
    #[arg(short, long)]
    pub workdir: Option<String>,

    /// Keep stdin open
    #[arg(short, long)]
    pub interactive: bool,

    /// Allocate a TTY
    #[arg(short, long)]
    pub tty: bool,

    /// Give up after this many seconds
    #[arg(long, value_name = "SECS")]
    pub timeout: Option<u64>,

    /// Command and arguments to run
    #[arg(last = true, required = true)]
    pub command: Vec<String>,
}

/// Arguments for the config command
#[derive(Parser, Debug)]
pub struct ConfigArgs {
    /// Subcommand for config
    #[command(subcommand)]
    pub action: Option<ConfigAction>,
}

/// Config subcommands
#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Show current configuration
    Show,

    /// Show configuration file path
    Path,

    /// Write the default configuration
    Init {
        /// Overwrite existing configuration
        #[arg(short, long)]
        force: bool,
    },
}

/// Output format for reporting commands
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable table
    Table,
    /// JSON output
    Json,
    /// Simple text (one per line)
    Plain,
}

/// Parse environment variable in KEY=VALUE format
fn parse_env_var(s: &str) -> Result<(String, String), String> {
    let (key, value) = s
        .split_once('=')
        .ok_or_else(|| format!("invalid KEY=VALUE format: no '=' found in '{s}'"))?;
    if key.is_empty() {
        return Err(format!("invalid KEY=VALUE format: empty key in '{s}'"));
    }
    Ok((key.to_string(), value.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_env_var_valid() {
        let (k, v) = parse_env_var("FOO=bar=baz").unwrap();
        assert_eq!(k, "FOO");
        assert_eq!(v, "bar=baz");
    }

    #[test]
    fn parse_env_var_invalid() {
        assert!(parse_env_var("FOO").is_err());
        assert!(parse_env_var("=bar").is_err());
    }

    #[test]
    fn cli_parses_provision() {
        let cli = Cli::parse_from([
            "invowk-provision",
            "--engine",
            "docker",
            "provision",
            "debian:stable-slim",
            "ubuntu:24.04",
            "--module-path",
            "/mods/a",
            "--module-path",
            "/mods/b",
            "--jobs",
            "2",
            "--format",
            "json",
        ]);
        assert_eq!(cli.engine, Some(EngineKind::Docker));
        match cli.command {
            Commands::Provision(args) => {
                assert_eq!(args.images, vec!["debian:stable-slim", "ubuntu:24.04"]);
                assert_eq!(args.input.module_paths.len(), 2);
                assert_eq!(args.jobs, 2);
                assert_eq!(args.format, OutputFormat::Json);
            }
            _ => panic!("expected Provision command"),
        }
    }

    #[test]
    fn binary_flags_conflict() {
        let result = Cli::try_parse_from([
            "invowk-provision",
            "tag",
            "debian",
            "--binary",
            "/bin/invowk",
            "--no-binary",
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn cli_parses_run() {
        let cli = Cli::parse_from([
            "invowk-provision",
            "run",
            "--image",
            "debian:stable-slim",
            "-e",
            "FOO=bar",
            "--strict",
            "--",
            "invowk",
            "cmd",
            "list",
        ]);
        match cli.command {
            Commands::Run(args) => {
                assert_eq!(args.image.as_deref(), Some("debian:stable-slim"));
                assert!(args.strict);
                assert_eq!(args.env, vec![("FOO".to_string(), "bar".to_string())]);
                assert_eq!(args.command, vec!["invowk", "cmd", "list"]);
            }
            _ => panic!("expected Run command"),
        }
    }

    #[test]
    fn run_accepts_bare_containerfile_flag() {
        let cli = Cli::parse_from(["invowk-provision", "run", "--containerfile", "--", "true"]);
        match cli.command {
            Commands::Run(args) => {
                assert_eq!(args.containerfile.as_deref(), Some(""));
                assert!(args.image.is_none());
            }
            _ => panic!("expected Run command"),
        }
    }

    #[test]
    fn run_requires_an_image_source() {
        assert!(Cli::try_parse_from(["invowk-provision", "run", "--", "true"]).is_err());
    }

    #[test]
    fn unknown_engine_rejected() {
        assert!(Cli::try_parse_from(["invowk-provision", "--engine", "lxc", "clean"]).is_err());
    }

    #[test]
    fn cli_parses_clean_and_config() {
        let cli = Cli::parse_from(["invowk-provision", "clean"]);
        assert!(matches!(cli.command, Commands::Clean));

        let cli = Cli::parse_from(["invowk-provision", "config", "path"]);
        assert!(matches!(
            cli.command,
            Commands::Config(ConfigArgs {
                action: Some(ConfigAction::Path)
            })
        ));
    }
}
