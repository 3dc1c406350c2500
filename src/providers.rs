//! Traits and type definitions for provider backends and the clients they build.
//!
//! A backend integration is described by three traits:
//!
//! - [`LlmServiceProvider`] is the factory registered with the
//!   [`ProviderRegistry`](crate::registry::ProviderRegistry). It declares which model
//!   names the backend serves and builds clients from workspace-scoped
//!   [`ProviderConfig`].
//! - [`LlmProviderService`] is the generic client for a backend: it lists models and
//!   streams chat completions for any model the backend serves.
//! - [`ChatModel`] is a client bound to one model and one set of generation
//!   parameters. It is what evaluation jobs use when a model acts as a judge.
//!
//! The router only ever sees these traits. Concrete backends live in the
//! [`openai`] and [`ollama`] modules and are wired in by
//! [`populated_registry`](crate::registry::populate::populated_registry).
//!
//! ## Error Handling
//!
//! Each API has its own bespoke error systems with varying levels of rigor. For example, the
//! Ollama API documentation does not describe any errors that can be raised by the API, while
//! the OpenAI API is very explicit. In general, backends each have their own error types. These
//! are encapsulated in [`Error`], and the [`ErrorKind`] enum provides an indication of the
//! category of error that was raised.

mod apireq;
mod chat_model;
mod parameters;

pub mod ollama;
pub mod openai;
pub mod providers;

use async_trait::async_trait;
use std::error::Error as StdError;
use std::fmt;

pub use self::chat_model::{ChatResponse, StreamingChatModel};
pub use self::parameters::{GenerationOptions, ModelParameters};
pub use self::providers::LlmProvider;
use crate::chat::{Message, Role};
use crate::credentials::ProviderConfig;

/// This is a list specifying general categories of errors that
/// can be returned by a backend. This list may be updated
/// as backends are added.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Failed to connect to the underlying API service.
    /// This could be due to network issues like DNS
    /// resolution, connectivity issues, or routing problems.
    Connection,
    /// A request timed out.
    TimedOut,
    /// An API key was not provided or service-specific
    /// permissions are needed.
    Authentication,
    /// A rate limit was reached or a quota was exceeded.
    ExcessUsage,
    /// The servers are overloaded. This is non-fatal
    /// and indicates that a retry may be needed later.
    ApiOverloaded,
    /// The requested resource was not found. This likely means that
    /// the requested model does not exist on the backend.
    NotFound,
    /// The request was malformed or is otherwise improper. This
    /// often corresponds to errors with HTTP status codes in
    /// the 400s.
    BadRequest,
    /// The server encountered an error. This often corresponds to
    /// errors with HTTP status codes in the 500s.
    InternalError,
    /// An API response was unable to be deserialized, malformed,
    /// or otherwise violated the assumptions of the client.
    UnexpectedResponse,
    /// The number of tokens in the request exceeds the maximum limit
    /// imposed on the model.
    ContextExceeded,
    /// The client could not be built from the supplied configuration,
    /// e.g. the API base is not a URL or a required key is missing.
    InvalidConfiguration,
    /// An error that does not fit into any of the other categories.
    UnspecifiedError,
}

#[derive(Debug)]
pub struct Error {
    kind: ErrorKind,
    source: Option<Box<dyn StdError + Send + Sync>>,
}

impl Error {
    pub fn from_kind(kind: ErrorKind) -> Error {
        Error { kind, source: None }
    }

    pub fn from_source(kind: ErrorKind, source: Box<dyn StdError + Send + Sync>) -> Error {
        Error {
            kind,
            source: Some(source),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    fn message(&self) -> &'static str {
        match self.kind {
            ErrorKind::Connection => "failed to connect to the API service",
            ErrorKind::TimedOut => "request timed out",
            ErrorKind::Authentication => "authentication failed or not provided",
            ErrorKind::ExcessUsage => "rate limit exceeded or quota crossed",
            ErrorKind::ApiOverloaded => "API server(s) are currently overloaded",
            ErrorKind::NotFound => "the requested resource was not found",
            ErrorKind::BadRequest => "the request was bad or malformed",
            ErrorKind::InternalError => "the server encountered an internal error",
            ErrorKind::UnexpectedResponse => "API response was unexpected or malformed",
            ErrorKind::ContextExceeded => "the model context was exceeded",
            ErrorKind::InvalidConfiguration => "the provider configuration is invalid",
            ErrorKind::UnspecifiedError => "an unspecified error occurred",
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message())
    }
}

impl StdError for Error {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        self.source.as_ref().map(|e| &**e as _)
    }
}

/// The reason why the model stopped generating.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FinishReason {
    /// The model generated a stop token, terminating
    /// its response.
    Stop,
    /// An API content filter was triggered.
    ContentFilter,
    /// The requested message length was reached.
    Length,
}

/// A message delta represents a "chunk" of a streamed message.
/// Usually, this consists of a single token.
#[derive(Debug, Clone)]
pub struct MessageDelta {
    /// The role of the message.
    pub role: Role,
    /// The content of the message.
    pub content: String,
}

/// The context usage metadata.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Usage {
    /// The number of tokens in the prompt.
    pub prompt_tokens: Option<usize>,
    /// The number of tokens in the response.
    pub completion_tokens: Option<usize>,
}

/// A streamed response from a completion.
#[async_trait]
pub trait AsyncMessageIterator: Send {
    /// The next chunk of the message.
    async fn next(&mut self) -> Option<Result<MessageDelta, Error>>;

    /// The reason the model stopped generating. This is only known
    /// once the iterator is exhausted.
    fn finish_reason(&self) -> Option<FinishReason>;

    /// The usage for this request. This is only known once the
    /// iterator is exhausted.
    fn usage(&self) -> Option<&Usage>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Model {
    /// The name of the model as it is passed to the router.
    pub id: String,
    /// The context length of the model, if known.
    pub context_length: Option<u64>,
}

/// Provides instructions on how the context should be managed between API
/// calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContextManagement {
    /// Implicit management implies that the API automatically manages
    /// the information available to the model. All messages in the conversation
    /// should be fed to the model, and there are no guarantees regarding what messages
    /// are included in the completion.
    Implicit,
    /// The API user must manage the context explicitly. If the token context is exceeded,
    /// the API returns an error of type [`ErrorKind::ContextExceeded`].
    Explicit,
}

/// The generic client of one backend, scoped to the credentials it was built with.
#[async_trait]
pub trait LlmProviderService: Send + Sync {
    /// Returns the provider identifier.
    fn id(&self) -> LlmProvider;

    /// Returns the context management strategy.
    fn context_management(&self) -> ContextManagement;

    /// Returns a list of models the backend serves.
    async fn models(&self) -> Result<Vec<Model>, Error>;

    /// Takes a series of messages that are part of a chat conversation
    /// and produces a new message generated by the model in response.
    ///
    /// `model`: The model name, exactly as it was routed.
    /// `messages`: A series of messages in the conversation.
    /// `options`: Per-call generation settings.
    async fn stream_completion(
        &self,
        model: &str,
        messages: &[Message],
        options: &GenerationOptions,
    ) -> Result<Box<dyn AsyncMessageIterator>, Error>;
}

/// A client bound to a single model and a fixed set of generation parameters.
#[async_trait]
pub trait ChatModel: Send + Sync {
    fn provider(&self) -> LlmProvider;

    fn model_name(&self) -> &str;

    /// Generates the next message of the conversation and returns it once
    /// the model has finished.
    async fn chat(&self, messages: &[Message]) -> Result<ChatResponse, Error>;
}

/// The contract each backend integration registers with the registry.
pub trait LlmServiceProvider: Send + Sync {
    /// Whether the backend serves `model`. This must be cheap and must not
    /// perform I/O, since it is consulted on every resolution.
    fn supports(&self, model: &str) -> bool;

    /// Builds a client using workspace-scoped configuration.
    fn build_service(&self, config: &ProviderConfig) -> Result<Box<dyn LlmProviderService>, Error>;

    /// Builds a client bound to `parameters.name` which applies the
    /// generation settings in `parameters` to every call.
    fn build_chat_model(
        &self,
        config: &ProviderConfig,
        parameters: &ModelParameters,
    ) -> Result<Box<dyn ChatModel>, Error> {
        let service = self.build_service(config)?;

        Ok(Box::new(StreamingChatModel::new(service, parameters.clone())))
    }
}
