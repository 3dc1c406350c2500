//! A [`ChatModel`] built on top of any streaming [`LlmProviderService`].

use async_trait::async_trait;

use super::{
    ChatModel, Error, FinishReason, LlmProvider, LlmProviderService, ModelParameters, Usage,
};
use crate::chat::{Message, Role};

/// The collected result of a chat call.
#[derive(Debug, Clone)]
pub struct ChatResponse {
    pub message: Message,
    pub finish_reason: Option<FinishReason>,
    pub usage: Usage,
}

/// Drives a streamed completion to the end and concatenates the deltas.
pub struct StreamingChatModel {
    service: Box<dyn LlmProviderService>,
    parameters: ModelParameters,
}

impl StreamingChatModel {
    pub fn new(service: Box<dyn LlmProviderService>, parameters: ModelParameters) -> Self {
        StreamingChatModel {
            service,
            parameters,
        }
    }

    pub fn parameters(&self) -> &ModelParameters {
        &self.parameters
    }
}

#[async_trait]
impl ChatModel for StreamingChatModel {
    fn provider(&self) -> LlmProvider {
        self.service.id()
    }

    fn model_name(&self) -> &str {
        &self.parameters.name
    }

    async fn chat(&self, messages: &[Message]) -> Result<ChatResponse, Error> {
        let mut completion = self
            .service
            .stream_completion(&self.parameters.name, messages, &self.parameters.options)
            .await?;

        let mut content = String::new();

        while let Some(delta) = completion.next().await {
            content.push_str(&delta?.content);
        }

        Ok(ChatResponse {
            message: Message::new(Role::Model, content),
            finish_reason: completion.finish_reason(),
            usage: completion.usage().cloned().unwrap_or_default(),
        })
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::{Arc, Mutex};

    use super::*;
    use crate::providers::{
        AsyncMessageIterator, ContextManagement, ErrorKind, GenerationOptions, MessageDelta, Model,
    };

    struct ScriptedCompletion {
        deltas: VecDeque<Result<MessageDelta, Error>>,
        usage: Usage,
        done: bool,
    }

    #[async_trait]
    impl AsyncMessageIterator for ScriptedCompletion {
        async fn next(&mut self) -> Option<Result<MessageDelta, Error>> {
            let next = self.deltas.pop_front();
            self.done = next.is_none();
            next
        }

        fn finish_reason(&self) -> Option<FinishReason> {
            self.done.then_some(FinishReason::Stop)
        }

        fn usage(&self) -> Option<&Usage> {
            self.done.then_some(&self.usage)
        }
    }

    #[derive(Default)]
    struct ScriptedService {
        chunks: Vec<&'static str>,
        fail_midway: bool,
        seen: Arc<Mutex<Option<(String, GenerationOptions)>>>,
    }

    #[async_trait]
    impl LlmProviderService for ScriptedService {
        fn id(&self) -> LlmProvider {
            LlmProvider::Ollama
        }

        fn context_management(&self) -> ContextManagement {
            ContextManagement::Implicit
        }

        async fn models(&self) -> Result<Vec<Model>, Error> {
            Ok(Vec::new())
        }

        async fn stream_completion(
            &self,
            model: &str,
            _messages: &[Message],
            options: &GenerationOptions,
        ) -> Result<Box<dyn AsyncMessageIterator>, Error> {
            *self.seen.lock().unwrap() = Some((model.to_string(), options.clone()));

            let mut deltas: VecDeque<_> = self
                .chunks
                .iter()
                .map(|c| {
                    Ok(MessageDelta {
                        role: Role::Model,
                        content: c.to_string(),
                    })
                })
                .collect();

            if self.fail_midway {
                deltas.push_back(Err(Error::from_kind(ErrorKind::UnexpectedResponse)));
            }

            Ok(Box::new(ScriptedCompletion {
                deltas,
                usage: Usage {
                    prompt_tokens: Some(3),
                    completion_tokens: Some(self.chunks.len()),
                },
                done: false,
            }))
        }
    }

    #[tokio::test]
    async fn test_chat_collects_stream() {
        let seen = Arc::new(Mutex::new(None));
        let service = ScriptedService {
            chunks: vec!["The answer", " is ", "4."],
            seen: seen.clone(),
            ..Default::default()
        };

        let params = ModelParameters::new("ollama/llama3")
            .with_temperature(0.0)
            .with_max_tokens(16);
        let model = StreamingChatModel::new(Box::new(service), params);

        let response = model.chat(&[Message::user("2 + 2?")]).await.unwrap();

        assert_eq!(response.message.role, Role::Model);
        assert_eq!(response.message.content, "The answer is 4.");
        assert_eq!(response.finish_reason, Some(FinishReason::Stop));
        assert_eq!(response.usage.completion_tokens, Some(3));

        let (model_name, options) = seen.lock().unwrap().clone().unwrap();
        assert_eq!(model_name, "ollama/llama3");
        assert_eq!(options.temperature, Some(0.0));
        assert_eq!(options.max_tokens, Some(16));
    }

    #[tokio::test]
    async fn test_chat_surfaces_stream_errors() {
        let service = ScriptedService {
            chunks: vec!["partial"],
            fail_midway: true,
            ..Default::default()
        };

        let model = StreamingChatModel::new(Box::new(service), ModelParameters::new("m"));

        let err = model.chat(&[Message::user("hi")]).await.unwrap_err();

        assert_eq!(err.kind(), ErrorKind::UnexpectedResponse);
        assert_eq!(model.provider(), LlmProvider::Ollama);
        assert_eq!(model.model_name(), "m");
    }
}
