use async_trait::async_trait;

use super::api;
use crate::chat::{Message, Role};
use crate::credentials::ProviderConfig;
use crate::providers::{
    AsyncMessageIterator, ContextManagement, Error, ErrorKind, FinishReason, GenerationOptions,
    LlmProvider, LlmProviderService, LlmServiceProvider, MessageDelta, Model, Usage,
};

/// Model names carrying this prefix are always routed to Ollama. The prefix is
/// removed before the name is sent to the server.
pub const MODEL_PREFIX: &str = "ollama/";

impl From<api::Role> for Role {
    fn from(value: api::Role) -> Self {
        match value {
            api::Role::User => Role::User,
            api::Role::System => Role::System,
            api::Role::Assistant => Role::Model,
        }
    }
}

impl From<Role> for api::Role {
    fn from(value: Role) -> Self {
        match value {
            Role::User => api::Role::User,
            Role::System => api::Role::System,
            Role::Model => api::Role::Assistant,
        }
    }
}

impl From<api::Error> for Error {
    fn from(value: api::Error) -> Self {
        let kind = match &value {
            api::Error::RequestFailed(_) | api::Error::StreamParser(_) => None,
            api::Error::InvalidApiBase(_) | api::Error::InvalidEndpoint(_) => {
                Some(ErrorKind::InvalidConfiguration)
            }
            api::Error::NotFound(_) => Some(ErrorKind::NotFound),
            api::Error::BadRequest(_) => Some(ErrorKind::BadRequest),
            api::Error::InternalError(_) => Some(ErrorKind::InternalError),
            api::Error::UnspecifiedError(_) => Some(ErrorKind::UnspecifiedError),
        };

        match (value, kind) {
            (api::Error::RequestFailed(err), _) => err.into(),
            (api::Error::StreamParser(err), _) => err.into(),
            (value, kind) => Error::from_source(
                kind.unwrap_or(ErrorKind::UnspecifiedError),
                Box::new(value),
            ),
        }
    }
}

/// Strips the routing prefix, leaving the name Ollama knows the model by.
fn server_model_name(model: &str) -> &str {
    model.strip_prefix(MODEL_PREFIX).unwrap_or(model)
}

struct OllamaCompletionResponse {
    inner: api::StreamingChatResponse,
    usage: Option<Usage>,
    finish_reason: Option<FinishReason>,
}

#[async_trait]
impl AsyncMessageIterator for OllamaCompletionResponse {
    async fn next(&mut self) -> Option<Result<MessageDelta, Error>> {
        loop {
            let msg = match self.inner.next().await? {
                Ok(msg) => msg,
                Err(err) => return Some(Err(err.into())),
            };

            if msg.done {
                self.finish_reason = match msg.done_reason {
                    api::DoneReason::Length => Some(FinishReason::Length),
                    api::DoneReason::Stop | api::DoneReason::None => Some(FinishReason::Stop),
                    api::DoneReason::Load => None,
                };

                // The "prompt eval count" disappears when the prompt is cached.
                self.usage = Some(Usage {
                    prompt_tokens: msg.prompt_eval_count,
                    completion_tokens: msg.eval_count,
                });
            }

            if msg.message.content.is_empty() {
                if msg.done {
                    return None;
                }

                continue;
            }

            return Some(Ok(MessageDelta {
                role: msg.message.role.into(),
                content: msg.message.content,
            }));
        }
    }

    fn finish_reason(&self) -> Option<FinishReason> {
        self.finish_reason
    }

    fn usage(&self) -> Option<&Usage> {
        self.usage.as_ref()
    }
}

/// A client for one Ollama server.
pub struct OllamaService {
    api: api::OllamaApi,
}

#[async_trait]
impl LlmProviderService for OllamaService {
    fn id(&self) -> LlmProvider {
        LlmProvider::Ollama
    }

    fn context_management(&self) -> ContextManagement {
        ContextManagement::Implicit
    }

    async fn models(&self) -> Result<Vec<Model>, Error> {
        let tags = self.api.tags().await?;

        Ok(tags
            .into_iter()
            .map(|tag| Model {
                id: format!("{}{}", MODEL_PREFIX, tag.name),
                context_length: None,
            })
            .collect())
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
            .chat(server_model_name(model), &messages, options)
            .await?;

        Ok(Box::new(OllamaCompletionResponse {
            inner,
            finish_reason: None,
            usage: None,
        }))
    }
}

/// Registers the Ollama backend. It serves every `ollama/`-prefixed model name,
/// plus any bare names it is configured with.
#[derive(Debug, Clone, Default)]
pub struct OllamaServiceProvider {
    bare_models: Vec<String>,
}

impl OllamaServiceProvider {
    pub fn new() -> OllamaServiceProvider {
        OllamaServiceProvider::default()
    }

    pub fn with_models(bare_models: Vec<String>) -> OllamaServiceProvider {
        OllamaServiceProvider { bare_models }
    }
}

impl LlmServiceProvider for OllamaServiceProvider {
    fn supports(&self, model: &str) -> bool {
        match model.strip_prefix(MODEL_PREFIX) {
            Some(name) => !name.is_empty(),
            None => self.bare_models.iter().any(|m| m == model),
        }
    }

    fn build_service(&self, config: &ProviderConfig) -> Result<Box<dyn LlmProviderService>, Error> {
        let api_base = config
            .api_base
            .as_deref()
            .unwrap_or(api::OLLAMA_DEFAULT_ENDPOINT);

        Ok(Box::new(OllamaService {
            api: api::OllamaApi::with_api_base(api_base)?,
        }))
    }
}
