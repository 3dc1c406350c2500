use async_trait::async_trait;

use crate::chat::{Message, Role};
use crate::credentials::ProviderConfig;
use crate::providers::openai::api;
use crate::providers::openai::models::{is_catalog_model, OPENAI_MODELS};
use crate::providers::{
    AsyncMessageIterator, ContextManagement, Error, ErrorKind, FinishReason, GenerationOptions,
    LlmProvider, LlmProviderService, LlmServiceProvider, MessageDelta, Model, Usage,
};

impl From<api::Error> for Error {
    fn from(value: api::Error) -> Self {
        let kind = match &value {
            api::Error::RequestFailed(_) | api::Error::StreamParser(_) => None,
            api::Error::MissingApiKey
            | api::Error::InvalidApiBase(_)
            | api::Error::InvalidEndpoint(_) => Some(ErrorKind::InvalidConfiguration),
            api::Error::Authentication(_) | api::Error::PermissionDenied(_) => {
                Some(ErrorKind::Authentication)
            }
            api::Error::BadRequest(_) | api::Error::UnprocessableEntity(_) => {
                Some(ErrorKind::BadRequest)
            }
            // Request invalidated by a race condition
            api::Error::Conflict(_) => Some(ErrorKind::BadRequest),
            api::Error::InternalError(_) => Some(ErrorKind::InternalError),
            api::Error::NotFound(_) => Some(ErrorKind::NotFound),
            api::Error::RateLimit(_) => Some(ErrorKind::ExcessUsage),
            api::Error::ApiOverloaded(_) => Some(ErrorKind::ApiOverloaded),
            api::Error::UnknownStatus(_) => Some(ErrorKind::UnspecifiedError),
        };

        match (value, kind) {
            (api::Error::RequestFailed(err), _) => err.into(),
            (api::Error::StreamParser(err), _) => err.into(),
            (value, Some(kind)) => Error::from_source(kind, Box::new(value)),
            (value, None) => Error::from_source(ErrorKind::UnspecifiedError, Box::new(value)),
        }
    }
}

impl From<api::FinishReason> for FinishReason {
    fn from(value: api::FinishReason) -> Self {
        match value {
            api::FinishReason::Stop | api::FinishReason::ToolCalls => FinishReason::Stop,
            api::FinishReason::ContentFilter => FinishReason::ContentFilter,
            api::FinishReason::Length => FinishReason::Length,
        }
    }
}

impl From<Role> for api::Role {
    fn from(value: Role) -> Self {
        match value {
            Role::Model => api::Role::Assistant,
            Role::System => api::Role::System,
            Role::User => api::Role::User,
        }
    }
}

struct OpenAICompletionResponse {
    inner: api::StreamingChatResponse,
    finish_reason: Option<FinishReason>,
    usage: Option<Usage>,
}

#[async_trait]
impl AsyncMessageIterator for OpenAICompletionResponse {
    async fn next(&mut self) -> Option<Result<MessageDelta, Error>> {
        loop {
            let mut chunk = match self.inner.next().await? {
                Ok(chunk) => chunk,
                Err(err) => return Some(Err(err.into())),
            };

            // The trailing chunk carries usage and no choices
            if let Some(usage) = chunk.usage.take() {
                self.usage = Some(Usage {
                    prompt_tokens: Some(usage.prompt_tokens),
                    completion_tokens: Some(usage.completion_tokens),
                });
            }

            let choice = match chunk.choices.into_iter().next() {
                Some(choice) => choice,
                None => continue,
            };

            if let Some(finish_reason) = choice.finish_reason {
                self.finish_reason = Some(finish_reason.into());
            }

            match choice.delta.content {
                Some(content) if !content.is_empty() => {
                    return Some(Ok(MessageDelta {
                        role: Role::Model,
                        content,
                    }))
                }
                _ => continue,
            }
        }
    }

    fn finish_reason(&self) -> Option<FinishReason> {
        self.finish_reason
    }

    fn usage(&self) -> Option<&Usage> {
        self.usage.as_ref()
    }
}

/// A client for the OpenAI chat completions API, bound to one API key.
pub struct OpenAIService {
    api: api::OpenAIApi,
    extra_models: Vec<String>,
}

#[async_trait]
impl LlmProviderService for OpenAIService {
    fn id(&self) -> LlmProvider {
        LlmProvider::OpenAI
    }

    fn context_management(&self) -> ContextManagement {
        ContextManagement::Explicit
    }

    async fn models(&self) -> Result<Vec<Model>, Error> {
        let mut models = OPENAI_MODELS.to_vec();

        models.extend(self.extra_models.iter().map(|id| Model {
            id: id.clone(),
            context_length: None,
        }));

        Ok(models)
    }

    async fn stream_completion(
        &self,
        model: &str,
        messages: &[Message],
        options: &GenerationOptions,
    ) -> Result<Box<dyn AsyncMessageIterator>, Error> {
        let messages: Vec<api::ChatMessage> = messages
            .iter()
            .map(|m| api::ChatMessage {
                role: m.role.into(),
                content: m.content.clone(),
            })
            .collect();

        let inner = self
            .api
            .streaming_chat_completion(model, &messages, options)
            .await?;

        Ok(Box::new(OpenAICompletionResponse {
            inner,
            finish_reason: None,
            usage: None,
        }))
    }
}

/// Registers the OpenAI backend. It serves the chat models of the built-in
/// catalog and any additional model names (e.g. fine-tunes) it is given.
#[derive(Debug, Clone, Default)]
pub struct OpenAIServiceProvider {
    extra_models: Vec<String>,
}

impl OpenAIServiceProvider {
    pub fn new() -> OpenAIServiceProvider {
        OpenAIServiceProvider::default()
    }

    pub fn with_models(extra_models: Vec<String>) -> OpenAIServiceProvider {
        OpenAIServiceProvider { extra_models }
    }
}

impl LlmServiceProvider for OpenAIServiceProvider {
    fn supports(&self, model: &str) -> bool {
        is_catalog_model(model) || self.extra_models.iter().any(|m| m == model)
    }

    fn build_service(&self, config: &ProviderConfig) -> Result<Box<dyn LlmProviderService>, Error> {
        let api_key = config.api_key.as_deref().ok_or(api::Error::MissingApiKey)?;
        let api_base = config.api_base.as_deref().unwrap_or(api::DEFAULT_API_BASE);

        Ok(Box::new(OpenAIService {
            api: api::OpenAIApi::new(api_key, api_base)?,
            extra_models: self.extra_models.clone(),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_supports_catalog_and_extra_models() {
        let provider = OpenAIServiceProvider::with_models(vec!["ft:gpt-4o-mini:acme".to_string()]);

        assert!(provider.supports("gpt-4o-mini"));
        assert!(provider.supports("ft:gpt-4o-mini:acme"));
        assert!(!provider.supports("llama3"));
        assert!(!provider.supports("GPT-4O"));
    }

    #[test]
    fn test_build_requires_api_key() {
        let provider = OpenAIServiceProvider::new();

        let err = provider.build_service(&ProviderConfig::default()).err().unwrap();
        assert_eq!(err.kind(), ErrorKind::InvalidConfiguration);

        let config = ProviderConfig {
            api_key: Some("sk-test".to_string()),
            api_base: Some("not a url".to_string()),
        };
        let err = provider.build_service(&config).err().unwrap();
        assert_eq!(err.kind(), ErrorKind::InvalidConfiguration);
    }

    #[tokio::test]
    async fn test_service_lists_extra_models() {
        let provider = OpenAIServiceProvider::with_models(vec!["my-finetune".to_string()]);
        let config = ProviderConfig {
            api_key: Some("sk-test".to_string()),
            api_base: None,
        };

        let service = provider.build_service(&config).unwrap();
        let models = service.models().await.unwrap();

        assert_eq!(service.id(), LlmProvider::OpenAI);
        assert!(models.iter().any(|m| m.id == "gpt-4o"));
        assert_eq!(models.last().unwrap().id, "my-finetune");
    }
}
