//!
//! Provider Traits
//!
//! The [`Provider`] trait every vendor adapter implements, with the request
//! option and error types shared between providers and the client.

use crate::llm;
use crate::logging::Logger;
use serde::Serialize;
use serde_json::{Map, Value as JsonValue};
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;

/// Free-form request options, merged into the request body as top-level keys.
pub type RequestOptions = Map<String, JsonValue>;

/// Errors raised while translating requests and responses.
#[derive(Error, Debug)]
pub enum ProviderError {
    /// The response body was not valid JSON of the expected shape.
    #[error("error parsing response: {0}")]
    Parse(#[source] serde_json::Error),
    /// The response carried no choices, or the first choice had no text content.
    #[error("empty response from API")]
    EmptyResponse,
    /// The request body could not be serialized.
    #[error("failed to serialize request: {0}")]
    Serialize(#[source] serde_json::Error),
    /// The structured-output schema could not be serialized.
    #[error("failed to marshal schema: {0}")]
    Schema(#[source] serde_json::Error),
}

/// Translates between a uniform prompt/option interface and one vendor's JSON API.
///
/// Implementations hold no connection state; the HTTP exchange happens in
/// [`crate::client::Client`], which calls [`Provider::prepare_request`] before
/// sending and [`Provider::parse_response`] on the body it gets back.
pub trait Provider: Send + Sync + std::fmt::Debug {
    /// Short provider identifier, e.g. `"mistral"`.
    fn name(&self) -> &str;

    /// URL the prepared body is posted to.
    fn endpoint(&self) -> &str;

    /// Whether [`Provider::prepare_request_with_schema`] is honoured by the vendor.
    fn supports_json_schema(&self) -> bool;

    /// Headers to send with every request, extra headers included.
    fn headers(&self) -> HashMap<String, String>;

    /// Stores a default option applied to every request.
    fn set_option(&mut self, key: &str, value: JsonValue);

    /// Copies the standard generation parameters from `config` into the default options.
    fn set_default_options(&mut self, config: &llm::Config);

    /// Replaces the extra headers.
    fn set_extra_headers(&mut self, extra_headers: HashMap<String, String>);

    /// Replaces the logger.
    fn set_logger(&mut self, logger: Arc<dyn Logger>);

    /// Builds the request body for a single user prompt.
    ///
    /// Default options are merged first, then `options`; on a key collision the
    /// later value wins.
    fn prepare_request(&self, prompt: &str, options: &RequestOptions)
        -> Result<Vec<u8>, ProviderError>;

    /// Builds a request body asking for output matching `schema`.
    fn prepare_request_with_schema(
        &self,
        prompt: &str,
        options: &RequestOptions,
        schema: &JsonValue,
    ) -> Result<Vec<u8>, ProviderError>;

    /// Extracts the generated text, with any tool calls appended as
    /// `<function_call>` blocks. Empty content is [`ProviderError::EmptyResponse`]
    /// even when tool calls are present.
    fn parse_response(&self, body: &[u8]) -> Result<String, ProviderError>;

    /// Returns the JSON-encoded first function call, or `None` if the response has none.
    fn handle_function_calls(&self, body: &[u8]) -> Result<Option<Vec<u8>>, ProviderError>;

    /// Like [`Provider::prepare_request_with_schema`], for any serializable schema.
    fn prepare_request_with_typed_schema<S>(
        &self,
        prompt: &str,
        options: &RequestOptions,
        schema: &S,
    ) -> Result<Vec<u8>, ProviderError>
    where
        Self: Sized,
        S: Serialize + ?Sized,
    {
        let schema = serde_json::to_value(schema).map_err(ProviderError::Schema)?;
        self.prepare_request_with_schema(prompt, options, &schema)
    }
}

/// A function call requested by the model.
#[derive(Debug, Clone, PartialEq, Serialize, serde::Deserialize)]
pub struct FunctionCall {
    /// Name of the function to call.
    pub name: String,
    /// Arguments as sent by the vendor, usually a JSON-encoded string.
    pub arguments: JsonValue,
}
