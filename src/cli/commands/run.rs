//! Run command - execute a command in a provisioned container

use crate::cli::args::RunArgs;
use crate::cli::commands::CommandContext;
use crate::error::{InvowkError, InvowkResult};
use crate::provision::ProvisionOverride;
use crate::runner::{ContainerRunner, ImageSource, RunRequest};
use crate::ui::{BuildProgress, UiContext};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Execute the run command, returning the container's exit code
pub async fn execute(args: RunArgs, ctx: &CommandContext) -> InvowkResult<i32> {
    let ui_ctx = UiContext::detect();
    let request = build_request(&args)?;

    let mut overrides = Vec::new();
    if args.no_provision {
        overrides.push(ProvisionOverride::Enabled(false));
    }
    if args.strict {
        overrides.push(ProvisionOverride::Strict(true));
    }
    let config = ctx.provision_config(&args.input, overrides);

    let engine = ctx.connect_engine(&ui_ctx).await?;

    // Plain step lines: a bar would keep drawing over the container's output
    let progress = Arc::new(BuildProgress::new(&UiContext::non_interactive(), "build"));
    let sink = progress.clone();
    let runner = ContainerRunner::new(engine, config)?
        .with_build_output(Arc::new(move |line: String| sink.on_line(line)));

    let cancel = ctx.cancel.child_token();
    let run = runner.execute(&cancel, &request);
    let outcome = match args.timeout {
        Some(secs) => match tokio::time::timeout(Duration::from_secs(secs), run).await {
            Ok(outcome) => outcome,
            Err(_) => {
                cancel.cancel();
                Err(InvowkError::DeadlineExceeded {
                    context: format!("container run after {}s", secs),
                })
            }
        },
        None => run.await,
    };
    progress.finish();

    let result = outcome?;
    debug!("Container exited with {}", result.exit_code);
    Ok(result.exit_code)
}

fn build_request(args: &RunArgs) -> InvowkResult<RunRequest> {
    let source = match args.image {
        Some(ref image) => ImageSource::Image(image.clone()),
        None => {
            let context_dir = match args.context {
                Some(ref dir) => dir.clone(),
                None => std::env::current_dir()
                    .map_err(|e| InvowkError::io("getting current directory", e))?,
            };
            ImageSource::Containerfile {
                context_dir,
                file: args.containerfile.clone().filter(|f| !f.is_empty()),
            }
        }
    };

    let mut request = RunRequest::new(source, args.command.clone());
    request.invowkfile = args.input.invowkfile.clone();
    request.env = args.env.iter().cloned().collect();
    request.volumes = args.volume.clone();
    request.workdir = args.workdir.clone();
    request.force_rebuild = args.force_rebuild;
    request.interactive = args.interactive;
    request.tty = args.tty;
    Ok(request)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::args::{Cli, Commands};
    use clap::Parser;
    use std::path::PathBuf;

    fn run_args(argv: &[&str]) -> RunArgs {
        let mut full = vec!["invowk-provision", "run"];
        full.extend_from_slice(argv);
        match Cli::parse_from(full).command {
            Commands::Run(args) => args,
            _ => panic!("expected Run command"),
        }
    }

    #[test]
    fn image_request() {
        let args = run_args(&[
            "--image",
            "debian:stable-slim",
            "-e",
            "A=1",
            "-e",
            "A=2",
            "--volume",
            "/src:/src",
            "-w",
            "/src",
            "--force-rebuild",
            "--",
            "invowk",
            "cmd",
        ]);
        let request = build_request(&args).unwrap();

        assert_eq!(
            request.source,
            ImageSource::Image("debian:stable-slim".to_string())
        );
        // Later -e wins
        assert_eq!(request.env.get("A").map(String::as_str), Some("2"));
        assert_eq!(request.volumes, vec!["/src:/src"]);
        assert_eq!(request.workdir.as_deref(), Some("/src"));
        assert!(request.force_rebuild);
        assert_eq!(request.command, vec!["invowk", "cmd"]);
    }

    #[test]
    fn containerfile_request() {
        let args = run_args(&[
            "--containerfile",
            "Containerfile.dev",
            "--context",
            "/work",
            "--invowkfile",
            "/work/invowkfile.cue",
            "--",
            "true",
        ]);
        let request = build_request(&args).unwrap();

        assert_eq!(
            request.source,
            ImageSource::Containerfile {
                context_dir: PathBuf::from("/work"),
                file: Some("Containerfile.dev".to_string()),
            }
        );
        assert_eq!(request.invowkfile, Some(PathBuf::from("/work/invowkfile.cue")));
    }

    #[test]
    fn bare_containerfile_flag_auto_detects() {
        let args = run_args(&["--containerfile", "--context", "/work", "--", "true"]);
        let request = build_request(&args).unwrap();
        assert!(matches!(
            request.source,
            ImageSource::Containerfile { file: None, .. }
        ));
    }
}
