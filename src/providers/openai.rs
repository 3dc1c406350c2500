//! An umbrella module for the OpenAI backend

mod api;
mod models;
mod provider;

pub use self::provider::{OpenAIService, OpenAIServiceProvider};
