//! An umbrella module for the Ollama backend

mod api;
mod provider;

pub use self::provider::{OllamaService, OllamaServiceProvider, MODEL_PREFIX};
