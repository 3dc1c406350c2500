use std::io::{self, IsTerminal, Read};
use std::sync::Arc;

use llmroute::config::Config;
use llmroute::credentials::StaticCredentialStore;
use llmroute::registry::populate::{populated_registry_with, Probe};
use llmroute::router::ModelRouter;

use crate::die;
use crate::utils::errors::error_chain;
use crate::RequestedColorMode;

pub(crate) mod complete;
pub(crate) mod judge;
pub(crate) mod list;
pub(crate) mod resolve;

pub(crate) const DEFAULT_WORKSPACE: &str = "default";

#[derive(Clone, Copy, strum_macros::Display)]
pub(crate) enum ColorMode {
    On,
    Off,
}

impl ColorMode {
    /// Returns whether ANSI color should be used
    /// If the user has specified a preference, this is honored. This preference
    /// can be specified through the command line or the "NO_COLOR" environment
    /// variable. If the user hasn't stated a preference, color is enabled if
    /// diagnostics go to a terminal.
    pub(crate) fn resolve_auto(cm: RequestedColorMode) -> ColorMode {
        match cm {
            RequestedColorMode::Auto => {
                let disable_color =
                    std::env::var_os("NO_COLOR").is_some() || !io::stderr().is_terminal();

                if disable_color {
                    ColorMode::Off
                } else {
                    ColorMode::On
                }
            }
            RequestedColorMode::On => ColorMode::On,
            RequestedColorMode::Off => ColorMode::Off,
        }
    }
}

/// Everything a command needs: the configuration and a router wired to the
/// activated backends.
pub(crate) struct Context {
    config: Config,
    router: ModelRouter,
}

impl Context {
    /// `probe` controls whether `auto` activation contacts the Ollama
    /// endpoint. Commands that never reach a backend pass [`Probe::Skip`].
    pub(crate) async fn load(config: Config, probe: Probe) -> Context {
        let registry = match populated_registry_with(&config, probe).await {
            Ok(registry) => registry,
            Err(err) => die!("{}", error_chain(&err)),
        };

        if registry.is_empty() {
            tracing::warn!("no provider is activated, every model will be rejected");
        }

        let credentials = Arc::new(StaticCredentialStore::from_config(&config));
        let router = ModelRouter::new(registry, credentials);

        if let Err(err) = router.preflight(&config.required_providers()) {
            die!("{}", error_chain(&err));
        }

        Context { config, router }
    }

    pub(crate) fn router(&self) -> &ModelRouter {
        &self.router
    }

    pub(crate) fn workspace(&self, requested: Option<&str>) -> String {
        requested
            .or(self.config.default_workspace.as_deref())
            .unwrap_or(DEFAULT_WORKSPACE)
            .to_string()
    }

    pub(crate) fn model(&self, requested: Option<&str>) -> String {
        match requested.or(self.config.default_model.as_deref()) {
            Some(model) => model.to_string(),
            None => die!(
                "no model was specified, pass --model or set \"default_model\" in the config"
            ),
        }
    }
}

/// The prompt given on the command line, or else all of stdin.
pub(crate) fn read_prompt(prompt: Option<&str>) -> String {
    let prompt = match prompt {
        Some(prompt) => prompt.to_string(),
        None => {
            let mut buf = String::new();

            if let Err(err) = io::stdin().read_to_string(&mut buf) {
                die!("failed to read the prompt from stdin: {}", err);
            }

            buf
        }
    };

    if prompt.trim().is_empty() {
        die!("the prompt is empty");
    }

    prompt
}
