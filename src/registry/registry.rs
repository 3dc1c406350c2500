use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use thiserror::Error;
use tracing::warn;

use super::default_priority::default_priority;
use crate::providers::{LlmProvider, LlmServiceProvider};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// No registered provider serves the model name
    #[error("model not supported {0}")]
    ModelNotSupported(String),
    /// The provider has no factory in the registry
    #[error("provider \"{0}\" is not registered")]
    ProviderNotRegistered(LlmProvider),
}

#[derive(Clone)]
struct Registration {
    factory: Arc<dyn LlmServiceProvider>,
    priority: u8,
}

/// The table of backend factories, filled in once at start-up.
///
/// Registration takes `&mut self`, lookups take `&self`. A registry which
/// must change while it is being read is swapped wholesale instead (see
/// [`ModelRouter::register`](crate::router::ModelRouter::register)).
#[derive(Clone, Default)]
pub struct ProviderRegistry {
    // Keyed in declaration order, which breaks priority ties.
    registrations: BTreeMap<LlmProvider, Registration>,
}

impl fmt::Debug for ProviderRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map()
            .entries(self.registrations.iter().map(|(id, r)| (id, r.priority)))
            .finish()
    }
}

impl ProviderRegistry {
    pub fn new() -> ProviderRegistry {
        ProviderRegistry::default()
    }

    /// Registers `factory` for `provider` with its default priority. A
    /// previous registration of the same provider is replaced.
    pub fn register(&mut self, provider: LlmProvider, factory: Arc<dyn LlmServiceProvider>) {
        self.register_with_priority(provider, factory, None);
    }

    pub fn register_with_priority(
        &mut self,
        provider: LlmProvider,
        factory: Arc<dyn LlmServiceProvider>,
        priority: Option<u8>,
    ) {
        let priority = priority.unwrap_or_else(|| default_priority(provider));

        let previous = self
            .registrations
            .insert(provider, Registration { factory, priority });

        if previous.is_some() {
            warn!(%provider, priority, "replaced an existing provider registration");
        }
    }

    pub fn get_factory(&self, provider: LlmProvider) -> Result<Arc<dyn LlmServiceProvider>, Error> {
        self.registrations
            .get(&provider)
            .map(|r| Arc::clone(&r.factory))
            .ok_or(Error::ProviderNotRegistered(provider))
    }

    /// Finds the provider serving `model`.
    pub fn resolve(&self, model: &str) -> Result<LlmProvider, Error> {
        let mut best: Option<(LlmProvider, u8)> = None;

        for (&id, registration) in &self.registrations {
            if !registration.factory.supports(model) {
                continue;
            }

            match best {
                Some((_, priority)) if priority >= registration.priority => {}
                _ => best = Some((id, registration.priority)),
            }
        }

        match best {
            Some((id, _)) => Ok(id),
            None => Err(Error::ModelNotSupported(model.to_string())),
        }
    }

    /// Checks that every provider in `providers` has been registered.
    pub fn ensure_registered(&self, providers: &[LlmProvider]) -> Result<(), Error> {
        match providers
            .iter()
            .find(|&p| !self.registrations.contains_key(p))
        {
            Some(&missing) => Err(Error::ProviderNotRegistered(missing)),
            None => Ok(()),
        }
    }

    /// The registered providers, in declaration order.
    pub fn providers(&self) -> Vec<LlmProvider> {
        self.registrations.keys().copied().collect()
    }

    pub fn priority(&self, provider: LlmProvider) -> Option<u8> {
        self.registrations.get(&provider).map(|r| r.priority)
    }

    pub fn is_empty(&self) -> bool {
        self.registrations.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::credentials::ProviderConfig;
    use crate::providers::{self, ErrorKind, LlmProviderService};

    struct Claims(&'static [&'static str]);

    impl LlmServiceProvider for Claims {
        fn supports(&self, model: &str) -> bool {
            self.0.iter().any(|m| *m == model)
        }

        fn build_service(
            &self,
            _config: &ProviderConfig,
        ) -> Result<Box<dyn LlmProviderService>, providers::Error> {
            Err(providers::Error::from_kind(ErrorKind::UnspecifiedError))
        }
    }

    fn claims(models: &'static [&'static str]) -> Arc<dyn LlmServiceProvider> {
        Arc::new(Claims(models))
    }

    #[test]
    fn test_resolve_single_owner() {
        let mut registry = ProviderRegistry::new();
        registry.register(LlmProvider::OpenAI, claims(&["alpha-1"]));
        registry.register(LlmProvider::Ollama, claims(&["beta-1"]));

        assert_eq!(registry.resolve("alpha-1"), Ok(LlmProvider::OpenAI));
        assert_eq!(registry.resolve("beta-1"), Ok(LlmProvider::Ollama));

        let err = registry.resolve("gamma-1").unwrap_err();
        assert_eq!(err, Error::ModelNotSupported("gamma-1".to_string()));
        assert_eq!(err.to_string(), "model not supported gamma-1");
    }

    #[test]
    fn test_empty_registry_supports_nothing() {
        let registry = ProviderRegistry::new();

        assert!(registry.is_empty());
        assert_eq!(
            registry.resolve("").unwrap_err().to_string(),
            "model not supported "
        );
    }

    #[test]
    fn test_higher_priority_wins() {
        let mut registry = ProviderRegistry::new();
        registry.register_with_priority(LlmProvider::OpenAI, claims(&["shared"]), Some(50));
        registry.register_with_priority(LlmProvider::Ollama, claims(&["shared"]), Some(5));

        assert_eq!(registry.resolve("shared"), Ok(LlmProvider::OpenAI));

        // Default priorities favor ollama
        let mut registry = ProviderRegistry::new();
        registry.register(LlmProvider::OpenAI, claims(&["shared"]));
        registry.register(LlmProvider::Ollama, claims(&["shared"]));

        assert_eq!(registry.resolve("shared"), Ok(LlmProvider::Ollama));
    }

    #[test]
    fn test_equal_priority_uses_declaration_order() {
        for order in [
            [LlmProvider::Ollama, LlmProvider::OpenAI],
            [LlmProvider::OpenAI, LlmProvider::Ollama],
        ] {
            let mut registry = ProviderRegistry::new();

            for provider in order {
                registry.register_with_priority(provider, claims(&["shared"]), Some(7));
            }

            assert_eq!(registry.resolve("shared"), Ok(LlmProvider::OpenAI));
        }
    }

    #[test]
    fn test_last_registration_wins() {
        let mut registry = ProviderRegistry::new();
        registry.register(LlmProvider::OpenAI, claims(&["alpha-1"]));
        registry.register_with_priority(LlmProvider::OpenAI, claims(&["alpha-2"]), Some(99));

        assert!(registry.resolve("alpha-1").is_err());
        assert_eq!(registry.resolve("alpha-2"), Ok(LlmProvider::OpenAI));
        assert_eq!(registry.priority(LlmProvider::OpenAI), Some(99));
        assert_eq!(registry.providers(), vec![LlmProvider::OpenAI]);
    }

    #[test]
    fn test_factory_lookup() {
        let mut registry = ProviderRegistry::new();
        registry.register(LlmProvider::Ollama, claims(&[]));

        assert!(registry.get_factory(LlmProvider::Ollama).is_ok());
        assert_eq!(
            registry.get_factory(LlmProvider::OpenAI).err(),
            Some(Error::ProviderNotRegistered(LlmProvider::OpenAI))
        );

        assert!(registry.ensure_registered(&[LlmProvider::Ollama]).is_ok());
        assert_eq!(
            registry.ensure_registered(&[LlmProvider::Ollama, LlmProvider::OpenAI]),
            Err(Error::ProviderNotRegistered(LlmProvider::OpenAI))
        );
    }
}
