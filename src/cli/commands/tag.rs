//! Tag command - print the provisioned tag without touching the engine

use crate::cli::args::TagArgs;
use crate::cli::commands::CommandContext;
use crate::error::{InvowkError, InvowkResult};
use crate::provision::key::tag_for;
use crate::provision::ProvisionOverride;

/// Execute the tag command
pub async fn execute(args: TagArgs, ctx: &CommandContext) -> InvowkResult<()> {
    let config = ctx.provision_config(&args.input, [ProvisionOverride::Enabled(true)]);
    config.validate()?;

    let image = args.image;
    let tag = tokio::task::spawn_blocking(move || tag_for(&config, &image))
        .await
        .map_err(|e| InvowkError::Internal(format!("hashing task failed: {}", e)))??;

    println!("{}", tag);
    Ok(())
}
