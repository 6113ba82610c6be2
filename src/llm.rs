//!
//! Internal Configuration
//!
//! The representation consumed by the provider factory and the HTTP client.
//! The public [`crate::config::Config`] converts into this type; it can also be
//! loaded directly from environment variables.

use crate::config::ConfigError;
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// Environment variable selecting the provider.
pub const ENV_PROVIDER: &str = "LLM_PROVIDER";
/// Environment variable selecting the model.
pub const ENV_MODEL: &str = "LLM_MODEL";
/// Environment variable for the sampling temperature.
pub const ENV_TEMPERATURE: &str = "LLM_TEMPERATURE";
/// Environment variable for the completion token limit.
pub const ENV_MAX_TOKENS: &str = "LLM_MAX_TOKENS";
/// Environment variable for the request timeout (e.g. `30s`, `500ms`).
pub const ENV_TIMEOUT: &str = "LLM_TIMEOUT";
/// Environment variable for the number of retries after a failed attempt.
pub const ENV_MAX_RETRIES: &str = "LLM_MAX_RETRIES";
/// Environment variable for the delay between retries.
pub const ENV_RETRY_DELAY: &str = "LLM_RETRY_DELAY";
/// Environment variable for the log level (`off`, `error`, `warn`, `info`, `debug`).
pub const ENV_LOG_LEVEL: &str = "LLM_LOG_LEVEL";
/// Environment variable for the Ollama base URL.
pub const ENV_OLLAMA_ENDPOINT: &str = "OLLAMA_ENDPOINT";

/// Providers whose `<NAME>_API_KEY` variable is picked up by [`Config::from_lookup`].
pub const KNOWN_PROVIDERS: &[&str] = &["mistral", "openai", "anthropic", "groq", "ollama"];

const DEFAULT_PROVIDER: &str = "mistral";
const DEFAULT_MODEL: &str = "mistral-small-latest";
const DEFAULT_OLLAMA_ENDPOINT: &str = "http://localhost:11434";
const DEFAULT_TEMPERATURE: f64 = 0.7;
const DEFAULT_MAX_TOKENS: u32 = 100;
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);
const DEFAULT_MAX_RETRIES: u32 = 3;
const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(2);

/// Verbosity of the library logger, from quietest to noisiest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub enum LogLevel {
    /// Nothing is logged.
    Off,
    /// Errors only.
    Error,
    /// Errors and warnings.
    #[default]
    Warn,
    /// Informational messages and above.
    Info,
    /// Everything, including request/response details.
    Debug,
}

impl FromStr for LogLevel {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "off" | "none" => Ok(LogLevel::Off),
            "error" => Ok(LogLevel::Error),
            "warn" | "warning" => Ok(LogLevel::Warn),
            "info" => Ok(LogLevel::Info),
            "debug" => Ok(LogLevel::Debug),
            _ => Err(()),
        }
    }
}

/// Resolved settings for talking to a provider.
#[derive(Clone, PartialEq)]
pub struct Config {
    /// Provider name, e.g. `"mistral"`.
    pub provider: String,
    /// Model identifier sent with every request.
    pub model: String,
    /// Base URL of a local Ollama instance.
    pub ollama_endpoint: String,
    /// Sampling temperature.
    pub temperature: f64,
    /// Maximum number of tokens to generate.
    pub max_tokens: u32,
    /// Nucleus sampling cutoff.
    pub top_p: f64,
    /// Penalty for frequent tokens.
    pub frequency_penalty: f64,
    /// Penalty for tokens already present.
    pub presence_penalty: f64,
    /// Per-request timeout.
    pub timeout: Duration,
    /// Retries after the first failed attempt.
    pub max_retries: u32,
    /// Pause between attempts.
    pub retry_delay: Duration,
    /// API keys by provider name.
    pub api_keys: HashMap<String, String>,
    /// Logger verbosity.
    pub log_level: LogLevel,
    /// Sampling seed.
    pub seed: Option<i64>,
    /// Minimum probability threshold.
    pub min_p: Option<f64>,
    /// Penalty applied to repeated tokens.
    pub repeat_penalty: Option<f64>,
    /// Window used by the repeat penalty.
    pub repeat_last_n: Option<i32>,
    /// Mirostat mode.
    pub mirostat: Option<i32>,
    /// Mirostat learning rate.
    pub mirostat_eta: Option<f64>,
    /// Mirostat target entropy.
    pub mirostat_tau: Option<f64>,
    /// Tail-free sampling parameter.
    pub tfs_z: Option<f64>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            provider: DEFAULT_PROVIDER.to_string(),
            model: DEFAULT_MODEL.to_string(),
            ollama_endpoint: DEFAULT_OLLAMA_ENDPOINT.to_string(),
            temperature: DEFAULT_TEMPERATURE,
            max_tokens: DEFAULT_MAX_TOKENS,
            top_p: 0.0,
            frequency_penalty: 0.0,
            presence_penalty: 0.0,
            timeout: DEFAULT_TIMEOUT,
            max_retries: DEFAULT_MAX_RETRIES,
            retry_delay: DEFAULT_RETRY_DELAY,
            api_keys: HashMap::new(),
            log_level: LogLevel::default(),
            seed: None,
            min_p: None,
            repeat_penalty: None,
            repeat_last_n: None,
            mirostat: None,
            mirostat_eta: None,
            mirostat_tau: None,
            tfs_z: None,
        }
    }
}

// API keys are printed by provider name only.
impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut providers: Vec<&String> = self.api_keys.keys().collect();
        providers.sort();
        f.debug_struct("Config")
            .field("provider", &self.provider)
            .field("model", &self.model)
            .field("ollama_endpoint", &self.ollama_endpoint)
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .field("top_p", &self.top_p)
            .field("frequency_penalty", &self.frequency_penalty)
            .field("presence_penalty", &self.presence_penalty)
            .field("timeout", &self.timeout)
            .field("max_retries", &self.max_retries)
            .field("retry_delay", &self.retry_delay)
            .field("api_keys", &providers)
            .field("log_level", &self.log_level)
            .field("seed", &self.seed)
            .field("min_p", &self.min_p)
            .field("repeat_penalty", &self.repeat_penalty)
            .field("repeat_last_n", &self.repeat_last_n)
            .field("mirostat", &self.mirostat)
            .field("mirostat_eta", &self.mirostat_eta)
            .field("mirostat_tau", &self.mirostat_tau)
            .field("tfs_z", &self.tfs_z)
            .finish()
    }
}

impl Config {
    /// Loads the configuration from the process environment.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidValue`] when a variable is set but malformed.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Loads the configuration through an arbitrary variable lookup.
    ///
    /// Unset or blank variables fall back to the defaults. API keys are read from
    /// `<PROVIDER>_API_KEY` for every name in [`KNOWN_PROVIDERS`] and for the
    /// selected provider.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidValue`] when a variable is set but malformed.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| {
            lookup(name)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };
        let mut config = Self::default();

        if let Some(provider) = var(ENV_PROVIDER) {
            config.provider = provider.to_ascii_lowercase();
        }
        if let Some(model) = var(ENV_MODEL) {
            config.model = model;
        }
        if let Some(endpoint) = var(ENV_OLLAMA_ENDPOINT) {
            config.ollama_endpoint = endpoint;
        }
        if let Some(temperature) = parse_var(ENV_TEMPERATURE, var(ENV_TEMPERATURE))? {
            config.temperature = temperature;
        }
        if let Some(max_tokens) = parse_var(ENV_MAX_TOKENS, var(ENV_MAX_TOKENS))? {
            config.max_tokens = max_tokens;
        }
        if let Some(timeout) = duration_var(ENV_TIMEOUT, var(ENV_TIMEOUT))? {
            config.timeout = timeout;
        }
        if let Some(max_retries) = parse_var(ENV_MAX_RETRIES, var(ENV_MAX_RETRIES))? {
            config.max_retries = max_retries;
        }
        if let Some(retry_delay) = duration_var(ENV_RETRY_DELAY, var(ENV_RETRY_DELAY))? {
            config.retry_delay = retry_delay;
        }
        if let Some(raw) = var(ENV_LOG_LEVEL) {
            config.log_level = match raw.parse() {
                Ok(level) => level,
                Err(()) => {
                    return Err(ConfigError::InvalidValue {
                        var: ENV_LOG_LEVEL,
                        value: raw,
                    })
                }
            };
        }

        let key_names = KNOWN_PROVIDERS
            .iter()
            .copied()
            .chain(std::iter::once(config.provider.as_str()));
        for name in key_names {
            if let Some(key) = var(&api_key_var(name)) {
                config.api_keys.insert(name.to_string(), key);
            }
        }

        Ok(config)
    }

    /// Returns the API key configured for `provider`, if any.
    pub fn api_key(&self, provider: &str) -> Option<&str> {
        self.api_keys.get(provider).map(String::as_str)
    }
}

/// Name of the environment variable holding the API key for `provider`.
pub fn api_key_var(provider: &str) -> String {
    format!("{}_API_KEY", provider.to_ascii_uppercase())
}

fn parse_var<T: FromStr>(name: &'static str, raw: Option<String>) -> Result<Option<T>, ConfigError> {
    raw.map(|value| {
        value
            .parse::<T>()
            .map_err(|_| ConfigError::InvalidValue { var: name, value })
    })
    .transpose()
}

fn duration_var(name: &'static str, raw: Option<String>) -> Result<Option<Duration>, ConfigError> {
    raw.map(|value| parse_duration(&value).ok_or(ConfigError::InvalidValue { var: name, value }))
        .transpose()
}

/// Parses `500ms`, `30s`, `2m`, `1h` or a bare number of seconds.
pub(crate) fn parse_duration(value: &str) -> Option<Duration> {
    let value = value.trim();
    let split = value
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(value.len());
    let (digits, unit) = value.split_at(split);
    let amount: u64 = digits.parse().ok()?;
    match unit {
        "" | "s" => Some(Duration::from_secs(amount)),
        "ms" => Some(Duration::from_millis(amount)),
        "m" => amount.checked_mul(60).map(Duration::from_secs),
        "h" => amount.checked_mul(3600).map(Duration::from_secs),
        _ => None,
    }
}
