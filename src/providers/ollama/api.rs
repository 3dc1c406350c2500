use reqwest::{Client, IntoUrl, Response, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

use crate::providers::apireq::{
    self, ByteStream, JsonStreamError, JsonStreamParser, ReqwestResponseStreamExt, Url,
};
use crate::providers::GenerationOptions;

pub(super) const OLLAMA_DEFAULT_ENDPOINT: &str = "http://localhost:11434";

#[derive(Debug, Error)]
pub(super) enum Error {
    #[error("invalid ollama api base: {0}")]
    InvalidApiBase(reqwest::Error),

    #[error("invalid ollama endpoint: {0}")]
    InvalidEndpoint(#[from] url::ParseError),

    #[error("a request to ollama failed: {0}")]
    RequestFailed(#[from] apireq::ReqwestError),

    #[error("failed to query ollama resource: {0}")]
    NotFound(String),

    #[error("request to the ollama api failed: {0}")]
    BadRequest(String),

    #[error("ollama encountered an internal error: {0}")]
    InternalError(String),

    #[error("the ollama API returned an unspecified error: {0}")]
    UnspecifiedError(String),

    #[error("could not parse streamed response: {0}")]
    StreamParser(#[from] JsonStreamError),
}

/* === IO === */

#[derive(Serialize, Deserialize, Debug, Clone, Copy)]
#[serde(rename_all = "snake_case")]
pub(super) enum Role {
    Assistant,
    User,
    System,
}

// Structures to serialize /api/chat
#[derive(Serialize, Debug)]
pub(super) struct ChatMessage {
    pub role: Role,
    pub content: String,
}

#[derive(Serialize, Debug)]
struct ChatOptions<'o> {
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    top_p: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    num_predict: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    seed: Option<i64>,
    #[serde(flatten)]
    custom: Option<&'o Map<String, Value>>,
}

impl<'o> From<&'o GenerationOptions> for ChatOptions<'o> {
    fn from(value: &'o GenerationOptions) -> Self {
        ChatOptions {
            temperature: value.temperature,
            top_p: value.top_p,
            num_predict: value.max_tokens,
            seed: value.seed,
            custom: value.custom_parameters.as_ref(),
        }
    }
}

#[derive(Serialize, Debug)]
struct ChatRequest<'m> {
    model: &'m str,
    messages: &'m [ChatMessage],
    options: ChatOptions<'m>,
    stream: bool,
}

// Structures to deserialize /api/chat
#[derive(Deserialize, Debug)]
pub(super) struct MessageDelta {
    pub role: Role,
    pub content: String,
}

#[derive(Deserialize, Debug, Default, Clone, Copy)]
pub(super) enum DoneReason {
    #[default]
    None,
    #[serde(rename = "stop")]
    Stop,
    #[serde(rename = "length")]
    Length,
    #[serde(rename = "load", alias = "unload")]
    Load,
}

#[derive(Deserialize, Debug)]
pub(super) struct StreamingChatDelta {
    pub message: MessageDelta,
    #[serde(default)]
    pub prompt_eval_count: Option<usize>,
    #[serde(default)]
    pub eval_count: Option<usize>,
    #[serde(default)]
    pub done_reason: DoneReason,
    pub done: bool,
}

#[derive(Deserialize, Debug)]
#[serde(untagged)]
enum StreamChatChunk {
    Delta(StreamingChatDelta),
    Error(ApiError),
}

// Structures to deserialize /api/tags

#[derive(Debug, Deserialize)]
pub(super) struct Tag {
    pub name: String,
}

#[derive(Debug, Deserialize)]
struct TagsList {
    models: Vec<Tag>,
}

// Errors
#[derive(Debug, Deserialize)]
struct ApiError {
    error: String,
}

pub(super) struct StreamingChatResponse {
    stream: JsonStreamParser<ByteStream>,
}

impl StreamingChatResponse {
    pub(super) async fn next(&mut self) -> Option<Result<StreamingChatDelta, Error>> {
        let chunk = self.stream.parse::<StreamChatChunk>().await?;

        Some(
            chunk
                .map_err(Error::StreamParser)
                .and_then(|chunk| match chunk {
                    StreamChatChunk::Delta(d) => Ok(d),
                    StreamChatChunk::Error(e) => Err(Error::UnspecifiedError(e.error)),
                }),
        )
    }
}

pub(super) struct OllamaApi {
    client: Client,
    api_base: Url,
}

impl OllamaApi {
    pub(super) fn with_api_base<U: IntoUrl>(api_base: U) -> Result<OllamaApi, Error> {
        Ok(OllamaApi {
            client: Client::new(),
            api_base: api_base.into_url().map_err(Error::InvalidApiBase)?,
        })
    }

    async fn check_status(res: Response) -> Result<Response, Error> {
        let status = res.status();

        if status.is_success() {
            return Ok(res);
        }

        let body = res.text().await.map_err(|e| Error::RequestFailed(e.into()))?;

        let message = match serde_json::from_str::<ApiError>(&body) {
            Ok(err) => err.error,
            Err(_) => format!("HTTP {}: {}", status.as_u16(), body.trim()),
        };

        match status {
            StatusCode::NOT_FOUND => Err(Error::NotFound(message)),
            code => match code.as_u16() {
                400..=499 => Err(Error::BadRequest(message)),
                500..=599 => Err(Error::InternalError(message)),
                _ => Err(Error::UnspecifiedError(message)),
            },
        }
    }

    pub(super) async fn tags(&self) -> Result<Vec<Tag>, Error> {
        let url = self.api_base.join("/api/tags")?;

        let res = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| Error::RequestFailed(e.into()))?;

        let res = Self::check_status(res).await?;

        let tags: TagsList = res
            .json()
            .await
            .map_err(|e| Error::RequestFailed(e.into()))?;

        Ok(tags.models)
    }

    pub(super) async fn chat(
        &self,
        model: &str,
        messages: &[ChatMessage],
        options: &GenerationOptions,
    ) -> Result<StreamingChatResponse, Error> {
        let url = self.api_base.join("/api/chat")?;

        let res = self
            .client
            .post(url)
            .json(&ChatRequest {
                model,
                messages,
                options: options.into(),
                stream: true,
            })
            .send()
            .await
            .map_err(|e| Error::RequestFailed(e.into()))?;

        let res = Self::check_status(res).await?;

        Ok(StreamingChatResponse {
            stream: res.stream_ndjson(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_max_tokens_becomes_num_predict() {
        let options = GenerationOptions {
            temperature: Some(0.7),
            max_tokens: Some(256),
            ..Default::default()
        };

        let messages = [ChatMessage {
            role: Role::User,
            content: "Hello!".to_string(),
        }];

        let request = ChatRequest {
            model: "llama3",
            messages: &messages,
            options: (&options).into(),
            stream: true,
        };

        assert_eq!(
            serde_json::to_value(&request).unwrap(),
            json!({
                "model": "llama3",
                "messages": [{"role": "user", "content": "Hello!"}],
                "options": {"temperature": 0.7, "num_predict": 256},
                "stream": true,
            })
        );
    }

    #[test]
    fn test_chunk_variants() {
        let delta: StreamChatChunk = serde_json::from_str(
            r#"{"model":"llama3","message":{"role":"assistant","content":"Hi"},"done":false}"#,
        )
        .unwrap();
        assert!(matches!(delta, StreamChatChunk::Delta(ref d) if d.message.content == "Hi"));

        let last: StreamChatChunk = serde_json::from_str(
            r#"{"model":"llama3","message":{"role":"assistant","content":""},"done":true,"done_reason":"stop","prompt_eval_count":12,"eval_count":30}"#,
        )
        .unwrap();
        match last {
            StreamChatChunk::Delta(d) => {
                assert!(d.done);
                assert!(matches!(d.done_reason, DoneReason::Stop));
                assert_eq!(d.eval_count, Some(30));
            }
            StreamChatChunk::Error(_) => panic!("expected a delta"),
        }

        let err: StreamChatChunk =
            serde_json::from_str(r#"{"error":"model 'nope' not found"}"#).unwrap();
        assert!(matches!(err, StreamChatChunk::Error(ref e) if e.error.contains("nope")));
    }
}
