#![warn(missing_docs)]
//! A Rust library providing a unified interface for Large Language Model (LLM) vendor APIs.
//!
//! Each vendor is wrapped by a [`Provider`] that turns a prompt plus free-form options
//! into the vendor's JSON request body and turns the vendor's JSON reply back into
//! text. [`Config`] collects generation and retry settings through functional options,
//! and [`Client`] performs the HTTP exchange.

pub mod client;
pub mod config;
pub mod llm;
pub mod logging;
pub mod providers;
pub mod traits;

pub use client::{new_llm, Client, Llm, LlmError};
pub use config::{Config, ConfigError, ConfigOption, LogLevel, MemoryOption};
pub use logging::{Logger, TracingLogger};
pub use providers::MistralProvider;
pub use traits::{FunctionCall, Provider, ProviderError, RequestOptions};

/// Creates a provider instance from the internal configuration.
///
/// The provider is looked up by name (case-insensitive) and receives the standard
/// generation parameters of `config` as default options.
///
/// # Errors
///
/// Returns [`ConfigError::UnsupportedProvider`] if no adapter exists for the name and
/// [`ConfigError::MissingApiKey`] if the provider has no non-empty API key.
///
/// # Examples
///
/// ```
/// use llmgate::config::{set_api_key, set_model, set_provider};
/// use llmgate::{get_provider, Config, Provider};
///
/// let config = Config::with_options([
///     set_provider("mistral"),
///     set_model("mistral-small-latest"),
///     set_api_key("my-key"),
/// ]);
///
/// let provider = get_provider(&config.to_internal_config()).expect("Failed to get provider");
/// assert_eq!(provider.name(), "mistral");
/// ```
pub fn get_provider(config: &llm::Config) -> Result<Box<dyn Provider>, ConfigError> {
    let name = config.provider.to_ascii_lowercase();

    let mut provider: Box<dyn Provider> = match name.as_str() {
        "mistral" => {
            let api_key = config
                .api_key(&config.provider)
                .or_else(|| config.api_key(&name))
                .filter(|key| !key.is_empty())
                .ok_or_else(|| ConfigError::MissingApiKey(name.clone()))?;
            Box::new(MistralProvider::new(api_key, config.model.clone(), None))
        }
        _ => return Err(ConfigError::UnsupportedProvider(config.provider.clone())),
    };

    provider.set_default_options(config);
    Ok(provider)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::collections::HashMap;

    fn config(provider: &str, keys: &[(&str, &str)]) -> llm::Config {
        llm::Config {
            provider: provider.to_string(),
            model: "mistral-small-latest".to_string(),
            temperature: 0.3,
            max_tokens: 42,
            seed: Some(7),
            api_keys: keys
                .iter()
                .map(|(p, k)| (p.to_string(), k.to_string()))
                .collect::<HashMap<_, _>>(),
            ..llm::Config::default()
        }
    }

    #[test]
    fn test_get_provider_applies_default_options() {
        let provider = get_provider(&config("mistral", &[("mistral", "mk")])).unwrap();
        let body: serde_json::Value =
            serde_json::from_slice(&provider.prepare_request("hi", &RequestOptions::new()).unwrap())
                .unwrap();

        assert_eq!(body["model"], json!("mistral-small-latest"));
        assert_eq!(body["temperature"], json!(0.3));
        assert_eq!(body["max_tokens"], json!(42));
        assert_eq!(body["seed"], json!(7));
        assert_eq!(provider.headers()["Authorization"], "Bearer mk");
    }

    #[test]
    fn test_get_provider_is_case_insensitive() {
        let provider = get_provider(&config("Mistral", &[("Mistral", "mk")])).unwrap();
        assert_eq!(provider.name(), "mistral");
    }

    #[test]
    fn test_get_provider_errors() {
        let err = get_provider(&config("mistral", &[])).unwrap_err();
        assert_eq!(err, ConfigError::MissingApiKey("mistral".to_string()));

        let err = get_provider(&config("mistral", &[("mistral", "")])).unwrap_err();
        assert_eq!(err, ConfigError::MissingApiKey("mistral".to_string()));

        let err = get_provider(&config("openai", &[("openai", "sk")])).unwrap_err();
        assert_eq!(err, ConfigError::UnsupportedProvider("openai".to_string()));
    }
}
