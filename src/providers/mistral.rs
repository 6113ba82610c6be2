//!
//! Mistral Provider Implementation
//!
//! Provides the `MistralProvider` adapter for Mistral AI's chat completions API:
//! request bodies, auth headers and response parsing, including tool calls and
//! structured output via `response_format`.

use crate::llm;
use crate::logging::{Logger, TracingLogger};
use crate::traits::{Provider, ProviderError, RequestOptions};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use serde_json::value::RawValue;
use serde_json::{json, Map, Value as JsonValue};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Chat completions endpoint of the Mistral API.
pub const MISTRAL_ENDPOINT: &str = "https://api.mistral.ai/v1/chat/completions";

// --- Mistral Specific API Structures ---

#[derive(Deserialize, Debug)]
struct MistralChatResponse {
    #[serde(default)]
    choices: Vec<MistralChoice>,
}

#[derive(Deserialize, Debug)]
struct MistralChoice {
    message: MistralMessage,
}

#[derive(Deserialize, Debug)]
struct MistralMessage {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    tool_calls: Option<Vec<MistralToolCall>>,
}

#[derive(Deserialize, Debug)]
struct MistralToolCall {
    function: MistralFunctionCall,
}

// Arguments are kept verbatim so they can be echoed back unchanged.
#[derive(Deserialize, Serialize, Debug)]
struct MistralFunctionCall {
    name: String,
    arguments: Box<RawValue>,
}

// --- Provider Implementation ---

/// Adapter for Mistral AI's language models.
#[derive(Clone)]
pub struct MistralProvider {
    api_key: SecretString,
    model: String,
    endpoint: String,
    extra_headers: HashMap<String, String>,
    options: RequestOptions,
    logger: Arc<dyn Logger>,
}

impl fmt::Debug for MistralProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MistralProvider")
            .field("model", &self.model)
            .field("endpoint", &self.endpoint)
            .field("extra_headers", &self.extra_headers)
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

impl MistralProvider {
    /// Creates a provider for `model`, authenticating with `api_key`.
    pub fn new(
        api_key: impl Into<String>,
        model: impl Into<String>,
        extra_headers: Option<HashMap<String, String>>,
    ) -> Self {
        Self {
            api_key: SecretString::from(api_key.into()),
            model: model.into(),
            endpoint: MISTRAL_ENDPOINT.to_string(),
            extra_headers: extra_headers.unwrap_or_default(),
            options: RequestOptions::new(),
            logger: Arc::new(TracingLogger::default()),
        }
    }

    /// Overrides the endpoint URL, e.g. for a proxy.
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    /// Model identifier sent with every request.
    pub fn model(&self) -> &str {
        &self.model
    }

    /// Default options applied to every request.
    pub fn options(&self) -> &RequestOptions {
        &self.options
    }

    fn base_body(&self, prompt: &str) -> Map<String, JsonValue> {
        let mut body = Map::new();
        body.insert("model".to_string(), json!(self.model));
        body.insert(
            "messages".to_string(),
            json!([{ "role": "user", "content": prompt }]),
        );
        body
    }

    fn encode(&self, body: Map<String, JsonValue>) -> Result<Vec<u8>, ProviderError> {
        serde_json::to_vec(&body).map_err(ProviderError::Serialize)
    }

    fn decode(&self, body: &[u8]) -> Result<MistralChatResponse, ProviderError> {
        serde_json::from_slice(body).map_err(|e| {
            self.logger.error(&format!("failed to parse Mistral response: {e}"));
            ProviderError::Parse(e)
        })
    }
}

impl Provider for MistralProvider {
    fn name(&self) -> &str {
        "mistral"
    }

    fn endpoint(&self) -> &str {
        &self.endpoint
    }

    fn supports_json_schema(&self) -> bool {
        true
    }

    fn headers(&self) -> HashMap<String, String> {
        let mut headers = HashMap::from([
            ("Content-Type".to_string(), "application/json".to_string()),
            (
                "Authorization".to_string(),
                format!("Bearer {}", self.api_key.expose_secret()),
            ),
        ]);
        headers.extend(self.extra_headers.clone());
        headers
    }

    fn set_option(&mut self, key: &str, value: JsonValue) {
        self.options.insert(key.to_string(), value);
    }

    fn set_default_options(&mut self, config: &llm::Config) {
        self.set_option("temperature", json!(config.temperature));
        self.set_option("max_tokens", json!(config.max_tokens));
        if let Some(seed) = config.seed {
            self.set_option("seed", json!(seed));
        }
    }

    fn set_extra_headers(&mut self, extra_headers: HashMap<String, String>) {
        self.extra_headers = extra_headers;
    }

    fn set_logger(&mut self, logger: Arc<dyn Logger>) {
        self.logger = logger;
    }

    fn prepare_request(
        &self,
        prompt: &str,
        options: &RequestOptions,
    ) -> Result<Vec<u8>, ProviderError> {
        let mut body = self.base_body(prompt);
        body.extend(self.options.clone());
        body.extend(options.clone());

        self.logger.debug(&format!(
            "prepared Mistral request for model {} with {} default and {} call option(s)",
            self.model,
            self.options.len(),
            options.len()
        ));
        self.encode(body)
    }

    /// Default options are merged before call options, as in
    /// [`Provider::prepare_request`]; `strict: true` in `options` marks the
    /// `response_format` as strict.
    fn prepare_request_with_schema(
        &self,
        prompt: &str,
        options: &RequestOptions,
        schema: &JsonValue,
    ) -> Result<Vec<u8>, ProviderError> {
        let mut body = self.base_body(prompt);
        body.insert(
            "response_format".to_string(),
            json!({ "type": "json_schema", "schema": schema }),
        );
        body.extend(self.options.clone());
        body.extend(options.clone());

        let strict = matches!(options.get("strict"), Some(JsonValue::Bool(true)));
        if strict {
            if let Some(JsonValue::Object(format)) = body.get_mut("response_format") {
                format.insert("strict".to_string(), JsonValue::Bool(true));
            }
        }

        self.logger.debug(&format!(
            "prepared Mistral structured-output request for model {} (strict: {strict})",
            self.model
        ));
        self.encode(body)
    }

    fn parse_response(&self, body: &[u8]) -> Result<String, ProviderError> {
        let response = self.decode(body)?;
        let message = match response.choices.into_iter().next() {
            Some(choice) => choice.message,
            None => return Err(ProviderError::EmptyResponse),
        };

        let content = message.content.unwrap_or_default();
        let tool_calls = message.tool_calls.unwrap_or_default();
        if content.is_empty() {
            self.logger.warn("Mistral returned an empty response");
            return Err(ProviderError::EmptyResponse);
        }

        let mut result = content;
        for call in &tool_calls {
            let name = serde_json::to_string(&call.function.name).map_err(ProviderError::Serialize)?;
            result.push_str(&format!(
                "<function_call>{{\"name\": {}, \"arguments\": {}}}</function_call>",
                name,
                call.function.arguments.get()
            ));
        }
        Ok(result)
    }

    fn handle_function_calls(&self, body: &[u8]) -> Result<Option<Vec<u8>>, ProviderError> {
        let response = self.decode(body)?;
        let first_call = response
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.tool_calls)
            .and_then(|calls| calls.into_iter().next());

        match first_call {
            Some(call) => serde_json::to_vec(&call.function)
                .map(Some)
                .map_err(ProviderError::Serialize),
            None => Ok(None),
        }
    }
}
