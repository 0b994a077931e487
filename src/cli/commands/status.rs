//! Status command - report which base images are already provisioned

use crate::cli::args::{OutputFormat, StatusArgs};
use crate::cli::commands::CommandContext;
use crate::error::InvowkResult;
use crate::provision::{LayerProvisioner, ProvisionOverride};
use crate::ui::{self, UiContext};
use serde::Serialize;

#[derive(Debug, Serialize)]
struct ImageStatus {
    image: String,
    tag: String,
    provisioned: bool,
}

/// Execute the status command
pub async fn execute(args: StatusArgs, ctx: &CommandContext) -> InvowkResult<()> {
    let ui_ctx = UiContext::detect().with_quiet(args.format != OutputFormat::Table);
    let config = ctx.provision_config(&args.input, [ProvisionOverride::Enabled(true)]);

    let engine = ctx.connect_engine(&ui_ctx).await?;
    let provisioner = LayerProvisioner::new(engine, config)?;

    let mut statuses = Vec::with_capacity(args.images.len());
    for image in args.images {
        let tag = provisioner.provisioned_tag(&image).await?;
        let provisioned = provisioner.is_provisioned(&image).await?;
        statuses.push(ImageStatus {
            image,
            tag,
            provisioned,
        });
    }

    match args.format {
        OutputFormat::Table => {
            for status in &statuses {
                let value = if status.provisioned {
                    format!("{} (present)", status.tag)
                } else {
                    format!("{} (missing)", status.tag)
                };
                ui::key_value_status(&ui_ctx, &status.image, &value, status.provisioned);
            }
        }
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&statuses)?);
        }
        OutputFormat::Plain => {
            for status in &statuses {
                let state = if status.provisioned { "present" } else { "missing" };
                println!("{}\t{}\t{}", status.image, status.tag, state);
            }
        }
    }

    Ok(())
}
