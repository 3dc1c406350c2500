//! Per-call generation settings

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Generation settings threaded into a single completion request. Fields left
/// as `None` are not sent, so the backend's own default applies.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GenerationOptions {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    /// Upper bound on the number of generated tokens.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seed: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f64>,
    /// Backend-specific parameters, merged verbatim into the request options.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub custom_parameters: Option<Map<String, Value>>,
}

/// The parameters of a model acting as a judge: which model, and how it
/// should generate.
///
/// ```json
/// {"name": "gpt-4o-mini", "temperature": 0.0, "seed": 42}
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ModelParameters {
    pub name: String,
    #[serde(flatten)]
    pub options: GenerationOptions,
}

impl ModelParameters {
    pub fn new<S: Into<String>>(name: S) -> ModelParameters {
        ModelParameters {
            name: name.into(),
            options: GenerationOptions::default(),
        }
    }

    pub fn with_temperature(mut self, temperature: f64) -> ModelParameters {
        self.options.temperature = Some(temperature);
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> ModelParameters {
        self.options.max_tokens = Some(max_tokens);
        self
    }

    pub fn with_seed(mut self, seed: i64) -> ModelParameters {
        self.options.seed = Some(seed);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parameters_from_flat_json() {
        let params: ModelParameters = serde_json::from_str(
            r#"{"name":"gpt-4o","temperature":0.2,"max_tokens":64,"custom_parameters":{"top_k":5}}"#,
        )
        .unwrap();

        assert_eq!(params.name, "gpt-4o");
        assert_eq!(params.options.temperature, Some(0.2));
        assert_eq!(params.options.max_tokens, Some(64));
        assert_eq!(params.options.seed, None);

        let custom = params.options.custom_parameters.unwrap();
        assert_eq!(custom["top_k"], 5);
    }

    #[test]
    fn test_unset_options_are_omitted() {
        let params = ModelParameters::new("llama3").with_seed(7);

        let json = serde_json::to_value(&params).unwrap();

        assert_eq!(json, serde_json::json!({"name": "llama3", "seed": 7}));
    }
}
