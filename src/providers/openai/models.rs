use lazy_static::lazy_static;

use crate::providers::Model;

lazy_static! {
    // The OpenAI API does not say which of the listed models accept chat
    // completions, so the catalog is maintained by hand. It needs to be updated
    // whenever chat models are added or retired, or a context length changes.
    pub(super) static ref OPENAI_MODELS: Vec<Model> = [
        ("gpt-4o-mini", 128_000),
        ("gpt-4o", 128_000),
        ("gpt-4.1", 1_047_576),
        ("gpt-4.1-mini", 1_047_576),
        ("gpt-4.1-nano", 1_047_576),
        ("o1", 200_000),
        ("o3-mini", 200_000),
        ("gpt-4-turbo", 128_000),
        ("gpt-4", 8_192),
        ("gpt-3.5-turbo", 16_385),
    ]
    .into_iter()
    .map(|(id, context_length)| Model {
        id: id.to_string(),
        context_length: Some(context_length),
    })
    .collect();
}

pub(super) fn is_catalog_model(model: &str) -> bool {
    OPENAI_MODELS.iter().any(|m| m.id == model)
}
