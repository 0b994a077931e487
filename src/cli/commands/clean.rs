//! Clean command - remove provisioned images

use crate::cli::commands::CommandContext;
use crate::error::InvowkResult;
use crate::provision::{LayerProvisioner, ProvisionConfig};
use crate::ui::{self, TaskSpinner, UiContext};

/// Execute the clean command
pub async fn execute(ctx: &CommandContext) -> InvowkResult<()> {
    let ui_ctx = UiContext::detect();
    ui::intro(&ui_ctx, "Cleaning provisioned images");

    let engine = ctx.connect_engine(&ui_ctx).await?;
    let provisioner = LayerProvisioner::new(engine, ProvisionConfig::default())?;

    let mut spinner = TaskSpinner::new(&ui_ctx);
    spinner.start("Removing provisioned images...");
    match provisioner.remove_provisioned_images().await {
        Ok(0) => {
            spinner.stop("No provisioned images found");
        }
        Ok(count) => {
            spinner.stop(&format!("Removed {} provisioned image(s)", count));
        }
        Err(e) => {
            spinner.stop_error("Failed to remove provisioned images");
            return Err(e);
        }
    }

    ui::outro_success(&ui_ctx, "Done");
    Ok(())
}
