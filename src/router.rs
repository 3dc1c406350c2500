//! Routing of model names to workspace-scoped clients.
//!
//! ```no_run
//! # use std::sync::Arc;
//! # use llmroute::credentials::StaticCredentialStore;
//! # use llmroute::registry::ProviderRegistry;
//! # use llmroute::router::ModelRouter;
//! # async fn demo(registry: ProviderRegistry) -> Result<(), llmroute::router::Error> {
//! let router = ModelRouter::new(registry, Arc::new(StaticCredentialStore::new()));
//!
//! let service = router.get_service("acme", "gpt-4o-mini").await?;
//! # Ok(())
//! # }
//! ```

use std::sync::{Arc, PoisonError, RwLock};

use thiserror::Error;
use tracing::debug;

use crate::credentials::{CredentialError, CredentialStore, ProviderConfig};
use crate::providers::{
    self, ChatModel, LlmProvider, LlmProviderService, LlmServiceProvider, ModelParameters,
};
use crate::registry::{self, ProviderRegistry};

#[derive(Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Resolution(#[from] registry::Error),
    #[error(transparent)]
    Credentials(#[from] CredentialError),
    #[error("failed to build a client for provider \"{provider}\"")]
    ClientConstruction {
        provider: LlmProvider,
        #[source]
        source: providers::Error,
    },
}

/// Resolves model names to providers and builds clients for them with the
/// credentials of the calling workspace.
pub struct ModelRouter {
    registry: RwLock<Arc<ProviderRegistry>>,
    credentials: Arc<dyn CredentialStore>,
}

impl ModelRouter {
    pub fn new(registry: ProviderRegistry, credentials: Arc<dyn CredentialStore>) -> ModelRouter {
        ModelRouter {
            registry: RwLock::new(Arc::new(registry)),
            credentials,
        }
    }

    /// The registry as of now. Later registrations do not affect it.
    pub fn snapshot(&self) -> Arc<ProviderRegistry> {
        let guard = self.registry.read().unwrap_or_else(PoisonError::into_inner);

        Arc::clone(&guard)
    }

    /// Registers `factory` while the router is in use. Lookups already in
    /// flight finish against the registry they started with.
    pub fn register(
        &self,
        provider: LlmProvider,
        factory: Arc<dyn LlmServiceProvider>,
        priority: Option<u8>,
    ) {
        let mut guard = self.registry.write().unwrap_or_else(PoisonError::into_inner);

        let mut registry = ProviderRegistry::clone(&guard);
        registry.register_with_priority(provider, factory, priority);

        *guard = Arc::new(registry);
    }

    /// Fails if any of `providers` is missing from the registry.
    pub fn preflight(&self, providers: &[LlmProvider]) -> Result<(), Error> {
        self.snapshot().ensure_registered(providers)?;

        Ok(())
    }

    /// The provider serving `model`. No credentials are read.
    pub fn get_llm_provider(&self, model: &str) -> Result<LlmProvider, Error> {
        Ok(self.snapshot().resolve(model)?)
    }

    async fn resolve_with_config(
        &self,
        workspace_id: &str,
        model: &str,
    ) -> Result<(LlmProvider, Arc<dyn LlmServiceProvider>, ProviderConfig), Error> {
        // The guard is released before the credential lookup is awaited.
        let registry = self.snapshot();

        let provider = registry.resolve(model)?;
        let factory = registry.get_factory(provider)?;

        debug!(workspace_id, model, %provider, "resolved model");

        let config = self.credentials.credentials(workspace_id, provider).await?;

        Ok((provider, factory, config))
    }

    /// A client for the provider serving `model`, configured for `workspace_id`.
    pub async fn get_service(
        &self,
        workspace_id: &str,
        model: &str,
    ) -> Result<Box<dyn LlmProviderService>, Error> {
        let (provider, factory, config) = self.resolve_with_config(workspace_id, model).await?;

        factory
            .build_service(&config)
            .map_err(|source| Error::ClientConstruction { provider, source })
    }

    /// A client bound to `parameters.name` which applies the generation
    /// settings in `parameters` to every call.
    pub async fn get_language_model(
        &self,
        workspace_id: &str,
        parameters: &ModelParameters,
    ) -> Result<Box<dyn ChatModel>, Error> {
        let (provider, factory, config) = self
            .resolve_with_config(workspace_id, &parameters.name)
            .await?;

        factory
            .build_chat_model(&config, parameters)
            .map_err(|source| Error::ClientConstruction { provider, source })
    }

    /// A client for `provider` itself, configured for `workspace_id`.
    pub async fn build_service(
        &self,
        workspace_id: &str,
        provider: LlmProvider,
    ) -> Result<Box<dyn LlmProviderService>, Error> {
        let factory = self.snapshot().get_factory(provider)?;

        let config = self.credentials.credentials(workspace_id, provider).await?;

        factory
            .build_service(&config)
            .map_err(|source| Error::ClientConstruction { provider, source })
    }
}
