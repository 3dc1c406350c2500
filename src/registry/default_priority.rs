use crate::providers::LlmProvider;

/// Local models are preferred over hosted ones.
pub fn default_priority(provider: LlmProvider) -> u8 {
    match provider {
        LlmProvider::Ollama => 20,
        LlmProvider::OpenAI => 10,
    }
}
