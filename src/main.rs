//! invowk-provision - cached container layers for nested invowk
//!
//! CLI entry point that dispatches to subcommands.

use clap::Parser;
use console::style;
use invowk_provision::cli::commands::{self, CommandContext};
use invowk_provision::cli::{Cli, Commands};
use invowk_provision::config::ConfigManager;
use invowk_provision::error::InvowkResult;
use std::process::ExitCode;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("{} {}", style("Error:").red().bold(), e);
            if let Some(hint) = e.hint() {
                eprintln!("{} {}", style("Hint:").yellow(), hint);
            }
            ExitCode::FAILURE
        }
    }
}

async fn run() -> InvowkResult<ExitCode> {
    let cli = Cli::parse();

    let config_manager = match cli.config {
        Some(ref path) => ConfigManager::with_path(path.clone()),
        None => ConfigManager::new(),
    };
    let config = config_manager.load().await?;

    // Initialize logging: 0 = warn (spinners only), 1 = info, 2+ = debug
    let filter = match cli.verbose {
        0 => EnvFilter::new("invowk_provision=warn"),
        1 => EnvFilter::new("invowk_provision=info"),
        _ => EnvFilter::new("invowk_provision=debug"),
    };
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .without_time();
    if config.general.log_format == "json" {
        subscriber.json().init();
    } else {
        subscriber.init();
    }
    debug!("Loaded configuration from {}", config_manager.path().display());

    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            debug!("Interrupted, cancelling");
            on_interrupt.cancel();
        }
    });

    let ctx = CommandContext {
        config,
        config_path: config_manager.path().to_path_buf(),
        engine: cli.engine,
        cancel,
    };

    match cli.command {
        Commands::Provision(args) => commands::provision(args, &ctx).await?,
        Commands::Tag(args) => commands::tag(args, &ctx).await?,
        Commands::Status(args) => commands::status(args, &ctx).await?,
        Commands::Clean => commands::clean(&ctx).await?,
        Commands::Config(args) => commands::config(args, &ctx).await?,
        Commands::Run(args) => {
            let code = commands::run(args, &ctx).await?;
            return Ok(exit_code(code));
        }
    }

    Ok(ExitCode::SUCCESS)
}

/// Pass the container's exit status through; out-of-range codes become 1
fn exit_code(code: i32) -> ExitCode {
    match u8::try_from(code) {
        Ok(code) => ExitCode::from(code),
        Err(_) => ExitCode::FAILURE,
    }
}
