//! Workspace-scoped provider configuration.
//!
//! The router never caches credentials: every resolution asks the
//! [`CredentialStore`] for the configuration of the calling workspace, so
//! rotated keys take effect on the next call.

use std::collections::HashMap;
use std::error::Error as StdError;
use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::Config;
use crate::providers::LlmProvider;

/// The settings a backend needs to build a client for one workspace.
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_base: Option<String>,
}

impl ProviderConfig {
    pub fn with_api_key<S: Into<String>>(api_key: S) -> ProviderConfig {
        ProviderConfig {
            api_key: Some(api_key.into()),
            api_base: None,
        }
    }
}

// Keys end up in logs through `{:?}` far too easily.
impl fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("api_base", &self.api_base)
            .finish()
    }
}

#[derive(Error, Debug)]
pub enum CredentialError {
    /// The workspace has no configuration for the provider
    #[error("workspace \"{workspace_id}\" has no credentials for provider \"{provider}\"")]
    NotFound {
        workspace_id: String,
        provider: LlmProvider,
    },
    /// The backing store could not be queried
    #[error("failed to load credentials for workspace \"{workspace_id}\"")]
    Unavailable {
        workspace_id: String,
        #[source]
        source: Box<dyn StdError + Send + Sync>,
    },
}

/// Looks up the configuration a workspace uses for a provider.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    async fn credentials(
        &self,
        workspace_id: &str,
        provider: LlmProvider,
    ) -> Result<ProviderConfig, CredentialError>;
}

/// An in-memory credential store. Workspace entries take precedence over the
/// provider-wide fallback.
#[derive(Debug, Clone, Default)]
pub struct StaticCredentialStore {
    workspaces: HashMap<(String, LlmProvider), ProviderConfig>,
    fallback: HashMap<LlmProvider, ProviderConfig>,
}

impl StaticCredentialStore {
    pub fn new() -> StaticCredentialStore {
        StaticCredentialStore::default()
    }

    pub fn insert<S: Into<String>>(
        &mut self,
        workspace_id: S,
        provider: LlmProvider,
        config: ProviderConfig,
    ) {
        self.workspaces
            .insert((workspace_id.into(), provider), config);
    }

    pub fn with_workspace<S: Into<String>>(
        mut self,
        workspace_id: S,
        provider: LlmProvider,
        config: ProviderConfig,
    ) -> StaticCredentialStore {
        self.insert(workspace_id, provider, config);
        self
    }

    /// Sets the configuration used by workspaces without an entry of their own.
    pub fn with_fallback(
        mut self,
        provider: LlmProvider,
        config: ProviderConfig,
    ) -> StaticCredentialStore {
        self.fallback.insert(provider, config);
        self
    }

    /// Builds a store from the `[workspaces]` tables of the configuration file.
    ///
    /// The provider-level settings act as a fallback: Ollama needs no secret
    /// and always has one, OpenAI only when an API key is known.
    pub fn from_config(config: &Config) -> StaticCredentialStore {
        let mut store = StaticCredentialStore::new();

        for (workspace_id, workspace) in &config.workspaces {
            for (provider, provider_config) in workspace.entries() {
                store.insert(workspace_id.as_str(), provider, provider_config.clone());
            }
        }

        let ollama = &config.providers.ollama;
        store = store.with_fallback(
            LlmProvider::Ollama,
            ProviderConfig {
                api_key: ollama.api_key.clone(),
                api_base: ollama.api_base.clone(),
            },
        );

        let openai = &config.providers.openai;
        if openai.api_key.is_some() {
            store = store.with_fallback(
                LlmProvider::OpenAI,
                ProviderConfig {
                    api_key: openai.api_key.clone(),
                    api_base: openai.api_base.clone(),
                },
            );
        }

        store
    }
}

#[async_trait]
impl CredentialStore for StaticCredentialStore {
    async fn credentials(
        &self,
        workspace_id: &str,
        provider: LlmProvider,
    ) -> Result<ProviderConfig, CredentialError> {
        let key = (workspace_id.to_string(), provider);

        self.workspaces
            .get(&key)
            .or_else(|| self.fallback.get(&provider))
            .cloned()
            .ok_or_else(|| CredentialError::NotFound {
                workspace_id: workspace_id.to_string(),
                provider,
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_debug_redacts_key() {
        let config = ProviderConfig {
            api_key: Some("sk-very-secret".to_string()),
            api_base: Some("https://proxy.internal".to_string()),
        };

        let printed = format!("{:?}", config);

        assert!(!printed.contains("sk-very-secret"));
        assert!(printed.contains("<redacted>"));
        assert!(printed.contains("https://proxy.internal"));
    }

    #[tokio::test]
    async fn test_workspace_entry_wins_over_fallback() {
        let store = StaticCredentialStore::new()
            .with_fallback(LlmProvider::OpenAI, ProviderConfig::with_api_key("sk-shared"))
            .with_workspace("acme", LlmProvider::OpenAI, ProviderConfig::with_api_key("sk-acme"));

        let acme = store.credentials("acme", LlmProvider::OpenAI).await.unwrap();
        assert_eq!(acme.api_key.as_deref(), Some("sk-acme"));

        let other = store.credentials("globex", LlmProvider::OpenAI).await.unwrap();
        assert_eq!(other.api_key.as_deref(), Some("sk-shared"));
    }

    #[tokio::test]
    async fn test_missing_credentials() {
        let store = StaticCredentialStore::new();

        let err = store
            .credentials("acme", LlmProvider::Ollama)
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            CredentialError::NotFound { ref workspace_id, provider: LlmProvider::Ollama }
                if workspace_id == "acme"
        ));
        assert_eq!(
            err.to_string(),
            "workspace \"acme\" has no credentials for provider \"ollama\""
        );
    }

    #[tokio::test]
    async fn test_from_config() {
        let config: Config = toml::from_str(
            r#"
            [providers.ollama]
            api_base = "http://gpu-box:11434"

            [workspaces.acme.openai]
            api_key = "sk-acme"
            "#,
        )
        .unwrap();

        let store = StaticCredentialStore::from_config(&config);

        let acme = store.credentials("acme", LlmProvider::OpenAI).await.unwrap();
        assert_eq!(acme.api_key.as_deref(), Some("sk-acme"));

        // No provider-level OpenAI key, so other workspaces have none.
        assert!(store.credentials("globex", LlmProvider::OpenAI).await.is_err());

        let ollama = store.credentials("globex", LlmProvider::Ollama).await.unwrap();
        assert_eq!(ollama.api_base.as_deref(), Some("http://gpu-box:11434"));
    }
}
