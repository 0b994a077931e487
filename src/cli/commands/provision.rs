//! Provision command - build or reuse provisioned images

use crate::cli::args::{OutputFormat, ProvisionArgs};
use crate::cli::commands::CommandContext;
use crate::engine::ContainerEngine;
use crate::error::{InvowkError, InvowkResult};
use crate::provision::{
    LayerProvisioner, ProvisionConfig, ProvisionGate, ProvisionOverride, ProvisionResult,
};
use crate::ui::{self, BuildProgress, UiContext};
use futures_util::future::join_all;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// One line of the JSON report
#[derive(Debug, Serialize)]
struct ImageReport {
    image: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    tag: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    cached: Option<bool>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    env: BTreeMap<String, String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

struct Outcome {
    image: String,
    result: InvowkResult<ProvisionResult>,
}

/// Execute the provision command
pub async fn execute(args: ProvisionArgs, ctx: &CommandContext) -> InvowkResult<()> {
    let ui_ctx = UiContext::detect().with_quiet(args.format != OutputFormat::Table);
    ui::intro(&ui_ctx, "invowk-provision");

    // Asking for provisioning explicitly overrides `enabled = false`
    let config = ctx.provision_config(
        &args.input,
        [
            ProvisionOverride::Enabled(true),
            ProvisionOverride::ForceRebuild(args.force_rebuild),
        ],
    );
    config.validate()?;

    let engine = ctx.connect_engine(&ui_ctx).await?;
    let gate = ProvisionGate::new(args.jobs);

    // Concurrent bars would draw over each other
    let progress_ctx = if gate.limit() > 1 {
        UiContext::non_interactive().with_quiet(ui_ctx.is_quiet())
    } else {
        ui_ctx.clone()
    };

    let outcomes = join_all(args.images.iter().map(|image| {
        provision_one(&engine, &config, &gate, &progress_ctx, &ctx.cancel, image)
    }))
    .await;

    let failed = outcomes.iter().filter(|o| o.result.is_err()).count();

    match args.format {
        OutputFormat::Table => print_table(&ui_ctx, &outcomes),
        OutputFormat::Json => print_json(&outcomes)?,
        OutputFormat::Plain => print_plain(&outcomes),
    }

    if failed > 0 {
        ui::outro_warn(
            &ui_ctx,
            &format!("{} of {} images failed", failed, outcomes.len()),
        );
        return Err(InvowkError::User(format!(
            "{} of {} images failed to provision",
            failed,
            outcomes.len()
        )));
    }

    ui::outro_success(&ui_ctx, "Provisioned images are ready");
    Ok(())
}

async fn provision_one(
    engine: &Arc<dyn ContainerEngine>,
    config: &ProvisionConfig,
    gate: &ProvisionGate,
    ui_ctx: &UiContext,
    cancel: &CancellationToken,
    image: &str,
) -> Outcome {
    Outcome {
        image: image.to_string(),
        result: provision_image(engine, config, gate, ui_ctx, cancel, image).await,
    }
}

async fn provision_image(
    engine: &Arc<dyn ContainerEngine>,
    config: &ProvisionConfig,
    gate: &ProvisionGate,
    ui_ctx: &UiContext,
    cancel: &CancellationToken,
    image: &str,
) -> InvowkResult<ProvisionResult> {
    let _permit = gate.acquire(cancel).await?;

    let progress = Arc::new(BuildProgress::new(ui_ctx, image));
    let sink = progress.clone();
    let provisioner = LayerProvisioner::new(engine.clone(), config.clone())?
        .with_build_output(Arc::new(move |line: String| sink.on_line(line)));

    let result = provisioner.provision(cancel, image).await;
    progress.finish();
    result
}

fn print_table(ctx: &UiContext, outcomes: &[Outcome]) {
    for outcome in outcomes {
        match outcome.result {
            Ok(ref result) => {
                let how = if result.was_cached { "cached" } else { "built" };
                ui::step_ok_detail(
                    ctx,
                    &outcome.image,
                    &format!("{}, {}", result.image_tag, how),
                );
            }
            Err(ref e) => ui::step_error_detail(ctx, &outcome.image, &e.to_string()),
        }
    }
}

fn print_json(outcomes: &[Outcome]) -> InvowkResult<()> {
    let reports: Vec<ImageReport> = outcomes
        .iter()
        .map(|outcome| match outcome.result {
            Ok(ref result) => ImageReport {
                image: outcome.image.clone(),
                tag: Some(result.image_tag.clone()),
                cached: Some(result.was_cached),
                env: result.env.clone().into_iter().collect(),
                error: None,
            },
            Err(ref e) => ImageReport {
                image: outcome.image.clone(),
                tag: None,
                cached: None,
                env: BTreeMap::new(),
                error: Some(e.to_string()),
            },
        })
        .collect();

    let json = serde_json::to_string_pretty(&reports)?;
    println!("{}", json);
    Ok(())
}

fn print_plain(outcomes: &[Outcome]) {
    for outcome in outcomes {
        match outcome.result {
            Ok(ref result) => println!("{}", result.image_tag),
            Err(ref e) => eprintln!("{}: {}", outcome.image, e),
        }
    }
}
