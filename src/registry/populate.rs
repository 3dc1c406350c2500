use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, info};

use super::registry::ProviderRegistry;
use crate::config::{Config, ProviderActivationPolicy, ProviderSettings};
use crate::credentials::ProviderConfig;
use crate::providers::providers::{OllamaServiceProvider, OpenAIServiceProvider};
use crate::providers::{self, ErrorKind, LlmProvider, LlmProviderService, LlmServiceProvider};

#[derive(Error, Debug)]
pub enum Error {
    #[error(
        "the \"{0}\" provider is enabled but no API key is defined, \
         either add it to the config or define OPENAI_API_KEY"
    )]
    MissingApiKey(LlmProvider),
    #[error("the \"{provider}\" provider could not be activated")]
    Backend {
        provider: LlmProvider,
        #[source]
        source: providers::Error,
    },
}

/// How `auto` activation decides whether the Ollama endpoint is up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Probe {
    /// Ask the endpoint for its models
    #[default]
    Network,
    /// Assume the endpoint is up, only its address is checked. Used when
    /// nothing will be sent to a backend.
    Skip,
}

fn provider_config(settings: &ProviderSettings) -> ProviderConfig {
    ProviderConfig {
        api_key: settings.api_key.clone(),
        api_base: settings.api_base.clone(),
    }
}

fn ollama_backend_err(source: providers::Error) -> Error {
    Error::Backend {
        provider: LlmProvider::Ollama,
        source,
    }
}

/// Rejects a malformed endpoint now rather than on the first request.
fn ollama_service(
    factory: &OllamaServiceProvider,
    settings: &ProviderSettings,
) -> Result<Box<dyn LlmProviderService>, Error> {
    factory
        .build_service(&provider_config(settings))
        .map_err(ollama_backend_err)
}

async fn ollama_is_awake(
    factory: &OllamaServiceProvider,
    settings: &ProviderSettings,
) -> Result<bool, Error> {
    let service = ollama_service(factory, settings)?;

    match service.models().await {
        Ok(_) => Ok(true),
        Err(err) if matches!(err.kind(), ErrorKind::Connection | ErrorKind::TimedOut) => {
            debug!(error = %err, "ollama did not answer the probe");
            Ok(false)
        }
        Err(err) => Err(ollama_backend_err(err)),
    }
}

fn activate(
    registry: &mut ProviderRegistry,
    provider: LlmProvider,
    factory: Arc<dyn LlmServiceProvider>,
    priority: Option<u8>,
) {
    registry.register_with_priority(provider, factory, priority);

    info!(
        %provider,
        priority = ?registry.priority(provider),
        "activated provider"
    );
}

/// Populate a registry with the bundled backends the configuration activates
pub async fn populated_registry(config: &Config) -> Result<ProviderRegistry, Error> {
    populated_registry_with(config, Probe::Network).await
}

/// Like [`populated_registry`], with control over how `auto` activation
/// checks the Ollama endpoint.
pub async fn populated_registry_with(
    config: &Config,
    probe: Probe,
) -> Result<ProviderRegistry, Error> {
    let mut registry = ProviderRegistry::new();

    {
        let settings = &config.providers.ollama;
        let factory = OllamaServiceProvider::with_models(settings.models.clone());

        let activated = match settings.activate {
            ProviderActivationPolicy::Auto if probe == Probe::Network => {
                ollama_is_awake(&factory, settings).await?
            }
            ProviderActivationPolicy::Auto | ProviderActivationPolicy::Enabled => {
                ollama_service(&factory, settings)?;

                true
            }
            ProviderActivationPolicy::Disabled => false,
        };

        if activated {
            activate(
                &mut registry,
                LlmProvider::Ollama,
                Arc::new(factory),
                settings.priority,
            );
        }
    }

    {
        let settings = &config.providers.openai;
        let has_api_key = config.has_api_key(LlmProvider::OpenAI);

        let activated = match settings.activate {
            ProviderActivationPolicy::Auto => has_api_key,
            ProviderActivationPolicy::Enabled => {
                if !has_api_key {
                    return Err(Error::MissingApiKey(LlmProvider::OpenAI));
                }

                true
            }
            ProviderActivationPolicy::Disabled => false,
        };

        if activated {
            let factory = OpenAIServiceProvider::with_models(settings.models.clone());

            activate(
                &mut registry,
                LlmProvider::OpenAI,
                Arc::new(factory),
                settings.priority,
            );
        }
    }

    Ok(registry)
}
