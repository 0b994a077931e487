//! CLI command implementations

pub mod clean;
pub mod config;
pub mod provision;
pub mod run;
pub mod status;
pub mod tag;

pub use clean::execute as clean;
pub use config::execute as config;
pub use provision::execute as provision;
pub use run::execute as run;
pub use status::execute as status;
pub use tag::execute as tag;

use crate::cli::args::ProvisionInputArgs;
use crate::config::Config;
use crate::engine::{create_engine, ContainerEngine, EngineKind};
use crate::error::InvowkResult;
use crate::provision::{ProvisionConfig, ProvisionOverride};
use crate::ui::{TaskSpinner, UiContext};
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// State shared by every command for one invocation
pub struct CommandContext {
    pub config: Config,
    pub config_path: PathBuf,
    /// `--engine` override; falls back to `container.engine`
    pub engine: Option<EngineKind>,
    /// Fires on Ctrl-C
    pub cancel: CancellationToken,
}

impl CommandContext {
    pub fn engine_kind(&self) -> EngineKind {
        self.engine.unwrap_or(self.config.container.engine)
    }

    /// Detect the container engine behind a spinner
    pub async fn connect_engine(&self, ui: &UiContext) -> InvowkResult<Arc<dyn ContainerEngine>> {
        let mut spinner = TaskSpinner::new(ui);
        spinner.start("Detecting container engine...");

        let engine = match create_engine(self.engine_kind()).await {
            Ok(engine) => engine,
            Err(e) => {
                spinner.stop_error("No container engine available");
                return Err(e);
            }
        };

        match engine.version().await {
            Ok(version) => spinner.stop(&format!("Using {} {}", engine.name(), version)),
            Err(_) => spinner.stop(&format!("Using {}", engine.name())),
        }
        Ok(engine)
    }

    /// Provision config from the app config with command-line inputs on top
    pub fn provision_config(
        &self,
        input: &ProvisionInputArgs,
        extra: impl IntoIterator<Item = ProvisionOverride>,
    ) -> ProvisionConfig {
        ProvisionConfig::from_app_config(&self.config)
            .with_overrides(input_overrides(input))
            .with_overrides(extra)
    }
}

fn input_overrides(input: &ProvisionInputArgs) -> Vec<ProvisionOverride> {
    let mut overrides = Vec::new();

    if let Some(ref binary) = input.binary {
        overrides.push(ProvisionOverride::BinaryPath(Some(binary.clone())));
    }
    if input.no_binary {
        overrides.push(ProvisionOverride::BinaryPath(None));
    }
    for path in &input.module_paths {
        overrides.push(ProvisionOverride::AddModulePath(path.clone()));
    }
    if let Some(ref invowkfile) = input.invowkfile {
        overrides.push(ProvisionOverride::InvowkfilePath(Some(invowkfile.clone())));
    }
    if let Some(ref suffix) = input.tag_suffix {
        overrides.push(ProvisionOverride::TagSuffix(Some(suffix.clone())));
    }

    overrides
}

#[cfg(test)]
mod tests {
    use super::*;

    fn context() -> CommandContext {
        CommandContext {
            config: Config::default(),
            config_path: PathBuf::from("/tmp/config.toml"),
            engine: None,
            cancel: CancellationToken::new(),
        }
    }

    #[test]
    fn engine_override_wins() {
        let mut ctx = context();
        assert_eq!(ctx.engine_kind(), EngineKind::Podman);
        ctx.engine = Some(EngineKind::Docker);
        assert_eq!(ctx.engine_kind(), EngineKind::Docker);
    }

    #[test]
    fn input_flags_become_overrides() {
        let input = ProvisionInputArgs {
            binary: None,
            no_binary: true,
            module_paths: vec![PathBuf::from("/mods")],
            invowkfile: Some(PathBuf::from("/work/invowkfile.cue")),
            tag_suffix: Some("ci".to_string()),
        };

        let config = context().provision_config(&input, [ProvisionOverride::Strict(true)]);
        assert_eq!(config.binary_path, None);
        assert_eq!(config.module_paths.last(), Some(&PathBuf::from("/mods")));
        assert_eq!(
            config.invowkfile_path,
            Some(PathBuf::from("/work/invowkfile.cue"))
        );
        assert_eq!(config.tag_suffix.as_deref(), Some("ci"));
        assert!(config.strict);
    }

    #[test]
    fn explicit_binary_replaces_detected_one() {
        let input = ProvisionInputArgs {
            binary: Some(PathBuf::from("/opt/invowk")),
            ..Default::default()
        };
        let config = context().provision_config(&input, []);
        assert_eq!(config.binary_path, Some(PathBuf::from("/opt/invowk")));
    }
}
