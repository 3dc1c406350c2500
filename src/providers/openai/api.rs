use std::fmt;

use reqwest::{Client, IntoUrl, Response};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::providers::apireq::{self, ByteStream, JsonStreamParser, ReqwestResponseStreamExt, Url};
use crate::providers::GenerationOptions;

pub(super) const DEFAULT_API_BASE: &str = "https://api.openai.com";

#[derive(thiserror::Error, Debug)]
pub(super) enum Error {
    /// No API key was configured for the workspace
    #[error("no API key is configured")]
    MissingApiKey,

    /// The API Base is not a URL that can be used in a network request
    #[error("invalid api base")]
    InvalidApiBase(#[source] reqwest::Error),

    /// Endpoint URL is invalid
    #[error("invalid endpoint")]
    InvalidEndpoint(
        #[from]
        #[source]
        url::ParseError,
    ),

    /// A bad response: the parser failed to parse the
    /// response stream
    #[error("failed to parse streamed response")]
    StreamParser(
        #[from]
        #[source]
        apireq::JsonStreamError,
    ),

    /// Some issue with the request
    #[error("{}", .0)]
    RequestFailed(
        #[from]
        #[source]
        apireq::ReqwestError,
    ),

    /// HTTP 400
    #[error("{}", .0)]
    BadRequest(ApiErrorPayload),

    /// HTTP 401: the key is invalid or does not belong to an organization
    #[error("{}", .0)]
    Authentication(ApiErrorPayload),

    /// HTTP 403
    #[error("{}", .0)]
    PermissionDenied(ApiErrorPayload),

    /// HTTP 404, usually an unknown model
    #[error("{}", .0)]
    NotFound(ApiErrorPayload),

    /// HTTP 409
    #[error("{}", .0)]
    Conflict(ApiErrorPayload),

    /// HTTP 422
    #[error("{}", .0)]
    UnprocessableEntity(ApiErrorPayload),

    /// HTTP 429: rate limit or quota
    #[error("{}", .0)]
    RateLimit(ApiErrorPayload),

    /// HTTP 500
    #[error("{}", .0)]
    InternalError(ApiErrorPayload),

    /// HTTP 503
    #[error("{}", .0)]
    ApiOverloaded(ApiErrorPayload),

    #[error("{}", .0)]
    UnknownStatus(ApiErrorPayload),
}

impl Error {
    fn from_status(status: u16, payload: ApiErrorPayload) -> Error {
        match status {
            400 => Error::BadRequest(payload),
            401 => Error::Authentication(payload),
            403 => Error::PermissionDenied(payload),
            404 => Error::NotFound(payload),
            409 => Error::Conflict(payload),
            422 => Error::UnprocessableEntity(payload),
            429 => Error::RateLimit(payload),
            500 => Error::InternalError(payload),
            503 => Error::ApiOverloaded(payload),
            _ => Error::UnknownStatus(payload),
        }
    }

    async fn from_response(res: Response) -> Error {
        let status = res.status().as_u16();

        let body = match res.text().await {
            Ok(body) => body,
            Err(err) => return Error::RequestFailed(err.into()),
        };

        // Proxies in front of the API do not always answer with the documented shape.
        let payload = match serde_json::from_str::<ApiErrorResponse>(&body) {
            Ok(res) => res.error,
            Err(_) => ApiErrorPayload {
                message: format!("HTTP {}: {}", status, body.trim()),
                typ: None,
            },
        };

        Error::from_status(status, payload)
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy)]
#[serde(rename_all = "snake_case")]
pub(super) enum Role {
    System,
    User,
    Assistant,
    Tool,
}

#[derive(Serialize, Deserialize, Debug)]
pub(super) struct ChatMessage {
    pub content: String,
    pub role: Role,
}

/* Structures to serialize /chat/completions */

#[derive(Serialize, Debug)]
struct ChatCompletionOptions<'o> {
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    top_p: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    seed: Option<i64>,
    #[serde(flatten)]
    custom: Option<&'o Map<String, Value>>,
}

impl<'o> From<&'o GenerationOptions> for ChatCompletionOptions<'o> {
    fn from(value: &'o GenerationOptions) -> Self {
        ChatCompletionOptions {
            temperature: value.temperature,
            top_p: value.top_p,
            max_tokens: value.max_tokens,
            seed: value.seed,
            custom: value.custom_parameters.as_ref(),
        }
    }
}

#[derive(Serialize, Debug)]
struct StreamOptions {
    include_usage: bool,
}

#[derive(Serialize, Debug)]
struct ChatCompletionRequest<'o> {
    model: &'o str,
    messages: &'o [ChatMessage],
    #[serde(flatten)]
    options: ChatCompletionOptions<'o>,
    stream: bool,
    stream_options: StreamOptions,
}

/* Structures to deserialize /chat/completions */

#[derive(Serialize, Deserialize, Debug, Clone, Copy)]
pub(super) enum FinishReason {
    #[serde(rename = "stop")]
    Stop,
    #[serde(rename = "length")]
    Length,
    #[serde(rename = "content_filter")]
    ContentFilter,
    #[serde(rename = "tool_calls")]
    ToolCalls,
}

#[derive(Serialize, Deserialize, Debug, Default)]
pub(super) struct Delta {
    pub role: Option<Role>,
    #[serde(default)]
    pub content: Option<String>,
}

#[derive(Serialize, Deserialize, Debug, Default)]
pub(super) struct Choice {
    pub index: u32,
    pub delta: Delta,
    pub finish_reason: Option<FinishReason>,
}

#[derive(Serialize, Deserialize, Debug)]
pub(super) struct Usage {
    pub completion_tokens: usize,
    pub prompt_tokens: usize,
    pub total_tokens: usize,
}

#[derive(Serialize, Deserialize, Debug)]
pub(super) struct ChatCompletionChunk {
    pub id: String,
    pub model: String,
    #[serde(default)]
    pub choices: Vec<Choice>,
    pub usage: Option<Usage>,
}

/* API Errors */

#[derive(Deserialize, Debug)]
pub(super) struct ApiErrorPayload {
    message: String,
    #[serde(rename = "type")]
    typ: Option<String>,
}

impl fmt::Display for ApiErrorPayload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.typ {
            Some(typ) => write!(f, "{} ({})", self.message, typ),
            None => f.write_str(&self.message),
        }
    }
}

#[derive(Deserialize, Debug)]
struct ApiErrorResponse {
    error: ApiErrorPayload,
}

pub(super) struct StreamingChatResponse {
    stream: JsonStreamParser<ByteStream>,
}

impl StreamingChatResponse {
    pub(super) async fn next(&mut self) -> Option<Result<ChatCompletionChunk, Error>> {
        let chunk = self.stream.parse::<ChatCompletionChunk>().await;

        chunk.map(|r| r.map_err(Error::from))
    }
}

pub(super) struct OpenAIApi {
    client: Client,
    api_base: Url,
    api_key: String,
}

impl OpenAIApi {
    pub(super) fn new<U: IntoUrl>(api_key: &str, api_base: U) -> Result<OpenAIApi, Error> {
        let api_base = api_base.into_url().map_err(Error::InvalidApiBase)?;

        Ok(OpenAIApi {
            client: Client::new(),
            api_base,
            api_key: api_key.to_string(),
        })
    }

    pub(super) async fn streaming_chat_completion(
        &self,
        model: &str,
        messages: &[ChatMessage],
        options: &GenerationOptions,
    ) -> Result<StreamingChatResponse, Error> {
        let url = self.api_base.join("/v1/chat/completions")?;

        let res = self
            .client
            .post(url)
            .bearer_auth(&self.api_key)
            .json(&ChatCompletionRequest {
                model,
                messages,
                options: options.into(),
                stream: true,
                stream_options: StreamOptions {
                    include_usage: true,
                },
            })
            .send()
            .await
            .map_err(|e| Error::RequestFailed(e.into()))?;

        if res.status().is_success() {
            Ok(StreamingChatResponse {
                stream: res.stream_sse(),
            })
        } else {
            Err(Error::from_response(res).await)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_request_threads_generation_options() {
        let mut custom = Map::new();
        custom.insert("presence_penalty".to_string(), json!(0.5));

        let options = GenerationOptions {
            temperature: Some(0.0),
            max_tokens: Some(128),
            seed: Some(42),
            top_p: None,
            custom_parameters: Some(custom),
        };

        let messages = [ChatMessage {
            content: "Rate this answer".to_string(),
            role: Role::User,
        }];

        let request = ChatCompletionRequest {
            model: "gpt-4o-mini",
            messages: &messages,
            options: (&options).into(),
            stream: true,
            stream_options: StreamOptions {
                include_usage: true,
            },
        };

        let value = serde_json::to_value(&request).unwrap();

        assert_eq!(
            value,
            json!({
                "model": "gpt-4o-mini",
                "messages": [{"content": "Rate this answer", "role": "user"}],
                "temperature": 0.0,
                "max_tokens": 128,
                "seed": 42,
                "presence_penalty": 0.5,
                "stream": true,
                "stream_options": {"include_usage": true},
            })
        );
    }

    #[test]
    fn test_status_mapping() {
        let payload = |m: &str| ApiErrorPayload {
            message: m.to_string(),
            typ: None,
        };

        assert!(matches!(
            Error::from_status(401, payload("bad key")),
            Error::Authentication(_)
        ));
        assert!(matches!(Error::from_status(429, payload("slow down")), Error::RateLimit(_)));
        assert!(matches!(Error::from_status(502, payload("bad gateway")), Error::UnknownStatus(_)));
        assert_eq!(Error::from_status(404, payload("no such model")).to_string(), "no such model");

        let typed = ApiErrorPayload {
            message: "quota exceeded".to_string(),
            typ: Some("insufficient_quota".to_string()),
        };
        assert_eq!(
            Error::from_status(429, typed).to_string(),
            "quota exceeded (insufficient_quota)"
        );
    }

    #[test]
    fn test_usage_chunk_without_choices() {
        let chunk: ChatCompletionChunk = serde_json::from_str(
            r#"{"id":"c1","object":"chat.completion.chunk","created":1,"model":"gpt-4o","choices":[],"usage":{"completion_tokens":5,"prompt_tokens":9,"total_tokens":14}}"#,
        )
        .unwrap();

        assert!(chunk.choices.is_empty());
        assert_eq!(chunk.usage.unwrap().total_tokens, 14);
    }
}
