//!
//! HTTP Client
//!
//! Sends the bodies prepared by a [`Provider`] to its endpoint and hands the
//! response back for parsing. Timeouts and retries come from the configuration.

use crate::config::{self, Config, ConfigError, ConfigOption};
use crate::get_provider;
use crate::llm;
use crate::logging::TracingLogger;
use crate::traits::{FunctionCall, Provider, ProviderError, RequestOptions};
use async_trait::async_trait;
use bytes::Bytes;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::StatusCode;
use serde_json::Value as JsonValue;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Errors returned by [`Client`].
#[derive(Error, Debug)]
pub enum LlmError {
    /// Building or parsing the vendor payload failed.
    #[error(transparent)]
    Provider(#[from] ProviderError),
    /// The configuration could not be resolved into a provider.
    #[error(transparent)]
    Config(#[from] ConfigError),
    /// An error occurred during the underlying HTTP request.
    #[error("API request failed: {0}")]
    Transport(#[from] reqwest::Error),
    /// The API returned a non-success status.
    #[error("API response error: {status}: {message}")]
    Api {
        /// HTTP status code of the response.
        status: u16,
        /// Vendor error message, or the raw body when it has none.
        message: String,
    },
    /// The provider produced a header that is not valid HTTP.
    #[error("Invalid header: {0}")]
    InvalidHeader(String),
}

/// High-level text generation interface.
#[async_trait]
pub trait Llm: Send + Sync {
    /// Generates a reply to `prompt`.
    async fn generate(&self, prompt: &str, options: &RequestOptions) -> Result<String, LlmError>;

    /// Generates a reply constrained to `schema`.
    async fn generate_with_schema(
        &self,
        prompt: &str,
        options: &RequestOptions,
        schema: &JsonValue,
    ) -> Result<String, LlmError>;

    /// Returns the first function call the model requested, if any.
    async fn function_call(
        &self,
        prompt: &str,
        options: &RequestOptions,
    ) -> Result<Option<FunctionCall>, LlmError>;
}

/// Executes provider requests over HTTP.
#[derive(Debug)]
pub struct Client {
    provider: Box<dyn Provider>,
    http: reqwest::Client,
    max_retries: u32,
    retry_delay: Duration,
}

impl Client {
    /// Creates a client for the provider selected by `config`.
    ///
    /// # Errors
    ///
    /// Returns [`LlmError::Config`] if the provider is unknown or has no API key.
    pub fn new(config: &llm::Config) -> Result<Self, LlmError> {
        let provider = get_provider(config)?;
        Self::with_provider(provider, config)
    }

    /// Creates a client from the public configuration.
    pub fn from_config(config: &Config) -> Result<Self, LlmError> {
        Self::new(&config.to_internal_config())
    }

    /// Wraps an already configured provider.
    ///
    /// Only the timeout, retry and log settings of `config` are used; the
    /// provider's default options are left as they are.
    pub fn with_provider(
        mut provider: Box<dyn Provider>,
        config: &llm::Config,
    ) -> Result<Self, LlmError> {
        provider.set_logger(Arc::new(TracingLogger::new(config.log_level)));

        let mut builder = reqwest::Client::builder();
        if !config.timeout.is_zero() {
            builder = builder.timeout(config.timeout);
        }

        Ok(Self {
            provider,
            http: builder.build()?,
            max_retries: config.max_retries,
            retry_delay: config.retry_delay,
        })
    }

    /// The provider requests are prepared with.
    pub fn provider(&self) -> &dyn Provider {
        self.provider.as_ref()
    }

    /// Mutable access to the provider, e.g. to change its options or headers.
    pub fn provider_mut(&mut self) -> &mut dyn Provider {
        self.provider.as_mut()
    }

    fn header_map(&self) -> Result<HeaderMap, LlmError> {
        let mut headers = HeaderMap::new();
        for (name, value) in self.provider.headers() {
            let header_name = HeaderName::from_bytes(name.as_bytes())
                .map_err(|_| LlmError::InvalidHeader(name.clone()))?;
            let header_value =
                HeaderValue::from_str(&value).map_err(|_| LlmError::InvalidHeader(name.clone()))?;
            headers.insert(header_name, header_value);
        }
        Ok(headers)
    }

    /// Posts `body`, retrying transport failures, 429 and 5xx responses.
    async fn execute(&self, body: Vec<u8>) -> Result<Bytes, LlmError> {
        let headers = self.header_map()?;
        let body = Bytes::from(body);
        let mut attempt: u32 = 0;

        loop {
            attempt += 1;
            tracing::debug!(
                provider = self.provider.name(),
                attempt,
                "sending request to {}",
                self.provider.endpoint()
            );

            let result = self
                .http
                .post(self.provider.endpoint())
                .headers(headers.clone())
                .body(body.clone())
                .send()
                .await;

            let error = match result {
                Ok(res) if res.status().is_success() => return Ok(res.bytes().await?),
                Ok(res) => {
                    let status = res.status();
                    let error_body = res
                        .text()
                        .await
                        .unwrap_or_else(|_| "Failed to read error body".to_string());
                    let error = LlmError::Api {
                        status: status.as_u16(),
                        message: api_error_message(&error_body),
                    };
                    if !is_retryable(status) {
                        return Err(error);
                    }
                    error
                }
                Err(e) => LlmError::Transport(e),
            };

            if attempt > self.max_retries {
                tracing::error!(
                    provider = self.provider.name(),
                    attempts = attempt,
                    "giving up: {error}"
                );
                return Err(error);
            }
            tracing::warn!(
                provider = self.provider.name(),
                attempt,
                max_retries = self.max_retries,
                "request failed, retrying in {:?}: {error}",
                self.retry_delay
            );
            tokio::time::sleep(self.retry_delay).await;
        }
    }
}

#[async_trait]
impl Llm for Client {
    async fn generate(&self, prompt: &str, options: &RequestOptions) -> Result<String, LlmError> {
        let body = self.provider.prepare_request(prompt, options)?;
        let response = self.execute(body).await?;
        Ok(self.provider.parse_response(&response)?)
    }

    async fn generate_with_schema(
        &self,
        prompt: &str,
        options: &RequestOptions,
        schema: &JsonValue,
    ) -> Result<String, LlmError> {
        let body = if self.provider.supports_json_schema() {
            self.provider.prepare_request_with_schema(prompt, options, schema)?
        } else {
            tracing::warn!(
                provider = self.provider.name(),
                "structured output not supported, sending plain request"
            );
            self.provider.prepare_request(prompt, options)?
        };
        let response = self.execute(body).await?;
        Ok(self.provider.parse_response(&response)?)
    }

    async fn function_call(
        &self,
        prompt: &str,
        options: &RequestOptions,
    ) -> Result<Option<FunctionCall>, LlmError> {
        let body = self.provider.prepare_request(prompt, options)?;
        let response = self.execute(body).await?;
        match self.provider.handle_function_calls(&response)? {
            Some(encoded) => serde_json::from_slice(&encoded)
                .map(Some)
                .map_err(|e| ProviderError::Parse(e).into()),
            None => Ok(None),
        }
    }
}

/// Loads the environment configuration, applies `options` and builds a client.
///
/// # Errors
///
/// Fails if the environment is malformed or the resulting provider cannot be built.
pub fn new_llm<I>(options: I) -> Result<Client, LlmError>
where
    I: IntoIterator<Item = ConfigOption>,
{
    let mut config = config::load_config()?;
    config.apply(options);
    Client::from_config(&config)
}

fn is_retryable(status: StatusCode) -> bool {
    status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
}

// Mistral reports `{"message": ...}`, validation errors use `{"detail": ...}`,
// OpenAI-style proxies use `{"error": {"message": ...}}`.
fn api_error_message(body: &str) -> String {
    let parsed: Option<JsonValue> = serde_json::from_str(body).ok();
    parsed
        .as_ref()
        .and_then(|v| {
            v.get("message")
                .or_else(|| v.pointer("/error/message"))
                .or_else(|| v.get("detail"))
        })
        .map(|m| match m {
            JsonValue::String(s) => s.clone(),
            other => other.to_string(),
        })
        .unwrap_or_else(|| body.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{set_api_key, set_max_retries, set_model, set_provider};

    #[test]
    fn test_api_error_message() {
        assert_eq!(
            api_error_message(r#"{"object":"error","message":"Unauthorized","type":"invalid_request"}"#),
            "Unauthorized"
        );
        assert_eq!(
            api_error_message(r#"{"error":{"message":"rate limited"}}"#),
            "rate limited"
        );
        assert_eq!(
            api_error_message(r#"{"detail":[{"msg":"field required"}]}"#),
            r#"[{"msg":"field required"}]"#
        );
        assert_eq!(api_error_message("Bad Gateway"), "Bad Gateway");
    }

    #[test]
    fn test_retryable_statuses() {
        assert!(is_retryable(StatusCode::TOO_MANY_REQUESTS));
        assert!(is_retryable(StatusCode::INTERNAL_SERVER_ERROR));
        assert!(is_retryable(StatusCode::SERVICE_UNAVAILABLE));
        assert!(!is_retryable(StatusCode::BAD_REQUEST));
        assert!(!is_retryable(StatusCode::UNAUTHORIZED));
    }

    #[test]
    fn test_from_config_builds_mistral_client() {
        let config = Config::with_options([
            set_provider("mistral"),
            set_model("mistral-small-latest"),
            set_api_key("mk-test"),
            set_max_retries(2),
        ]);
        let client = Client::from_config(&config).unwrap();

        assert_eq!(client.provider().name(), "mistral");
        assert_eq!(client.max_retries, 2);
        assert_eq!(
            client.provider().headers()["Authorization"],
            "Bearer mk-test"
        );
    }

    #[test]
    fn test_from_config_rejects_unknown_provider() {
        let config = Config::with_options([set_provider("acme"), set_api_key("k")]);
        let err = Client::from_config(&config).unwrap_err();
        assert!(matches!(
            err,
            LlmError::Config(ConfigError::UnsupportedProvider(ref p)) if p == "acme"
        ));
    }

    #[test]
    fn test_from_config_requires_api_key() {
        let config = Config::with_options([set_provider("mistral")]);
        let err = Client::from_config(&config).unwrap_err();
        assert!(matches!(err, LlmError::Config(ConfigError::MissingApiKey(_))));
    }

    #[test]
    fn test_invalid_header_is_reported() {
        let mut client = Client::from_config(&Config::with_options([
            set_provider("mistral"),
            set_api_key("k"),
        ]))
        .unwrap();
        client.provider_mut().set_extra_headers(std::collections::HashMap::from([(
            "X-Bad".to_string(),
            "line\nbreak".to_string(),
        )]));

        let err = client.header_map().unwrap_err();
        assert!(matches!(err, LlmError::InvalidHeader(ref h) if h == "X-Bad"));
    }
}
