//! Workspace-aware routing of chat-model requests to LLM providers.
//!
//! The crate has two halves. The first resolves an opaque model name to the
//! provider that serves it and builds a client for that provider using the
//! credentials of the calling workspace (see [`router::ModelRouter`]). The
//! second is [`criteria::DatasetItemSearchCriteria`], the immutable query
//! descriptor handed to a dataset retrieval backend.

pub mod chat;
pub mod config;
pub mod credentials;
pub mod criteria;
pub mod providers;
pub mod registry;
pub mod router;
