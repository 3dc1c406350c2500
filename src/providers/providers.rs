//! Provider identifiers, along with the concrete backend factories

use serde::{Deserialize, Serialize};

/// The `LlmProvider` is a unique per-backend identifier. It is used to
/// differentiate providers at runtime in code which is generic over different
/// backends, and to key registrations and workspace credentials.
///
/// The `to_string` and `FromStr` are part of the CLI and the configuration file
/// and should remain stable. Declaration order is the final tie-break when two
/// providers of equal priority serve the same model.
#[derive(
    Debug,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Clone,
    Copy,
    Serialize,
    Deserialize,
    strum_macros::Display,
    strum_macros::EnumString,
    strum_macros::EnumIter,
)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum LlmProvider {
    OpenAI,
    Ollama,
}

pub use super::ollama::OllamaServiceProvider;
pub use super::openai::OpenAIServiceProvider;

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use super::*;
    use strum::IntoEnumIterator;

    #[test]
    fn test_identifier_strings_are_stable() {
        assert_eq!(LlmProvider::OpenAI.to_string(), "openai");
        assert_eq!(LlmProvider::Ollama.to_string(), "ollama");
        assert_eq!(LlmProvider::from_str("openai").unwrap(), LlmProvider::OpenAI);
        assert!(LlmProvider::from_str("anthropic").is_err());
    }

    #[test]
    fn test_declaration_order() {
        let ids: Vec<LlmProvider> = LlmProvider::iter().collect();

        assert_eq!(ids, vec![LlmProvider::OpenAI, LlmProvider::Ollama]);
        assert!(LlmProvider::OpenAI < LlmProvider::Ollama);
    }
}
