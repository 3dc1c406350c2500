//! The registry maps each [`LlmProvider`] to the backend factory registered for
//! it. Model names are opaque: a model belongs to whichever registered factory
//! claims it through [`LlmServiceProvider::supports`].
//!
//! Each registration is assigned a "priority", which is an eight bit unsigned number (e.g., a
//! value between 0 and 255), where 0 is the lowest priority (meaning it is a provider of last
//! resort) and 255 is the highest priority. When several registered providers claim a model, the
//! highest priority provider is chosen. If they share the same priority, the provider declared
//! first in [`LlmProvider`] wins, so resolution never depends on registration order.
//!
//! [`LlmProvider`]: crate::providers::LlmProvider
//! [`LlmServiceProvider::supports`]: crate::providers::LlmServiceProvider::supports

pub mod populate;
pub mod registry;

mod default_priority;

pub use self::default_priority::default_priority;
pub use self::registry::{Error, ProviderRegistry};
