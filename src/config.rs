//!
//! Configuration
//!
//! Public [`Config`] built from environment defaults and [`ConfigOption`] closures,
//! and its conversion into the internal [`llm::Config`].

use crate::llm;
use std::collections::HashMap;
use std::time::Duration;
use thiserror::Error;

/// Logging verbosity exposed to library users.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub enum LogLevel {
    /// Nothing is logged.
    #[default]
    Off,
    /// Errors only.
    Error,
    /// Errors and warnings.
    Warn,
    /// Informational messages and above.
    Info,
    /// Everything.
    Debug,
}

impl From<LogLevel> for llm::LogLevel {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Off => llm::LogLevel::Off,
            LogLevel::Error => llm::LogLevel::Error,
            LogLevel::Warn => llm::LogLevel::Warn,
            LogLevel::Info => llm::LogLevel::Info,
            LogLevel::Debug => llm::LogLevel::Debug,
        }
    }
}

/// Converts the internal log level back into the public one.
pub fn convert_log_level(level: llm::LogLevel) -> LogLevel {
    match level {
        llm::LogLevel::Off => LogLevel::Off,
        llm::LogLevel::Error => LogLevel::Error,
        llm::LogLevel::Warn => LogLevel::Warn,
        llm::LogLevel::Info => LogLevel::Info,
        llm::LogLevel::Debug => LogLevel::Debug,
    }
}

/// Conversation memory settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemoryOption {
    /// Token budget kept in memory.
    pub max_tokens: i64,
}

/// Configuration for an LLM client.
///
/// Fields may be set directly or through the `set_*` functional options:
///
/// ```
/// use llmgate::config::{set_model, set_provider, set_temperature, Config};
///
/// let config = Config::with_options([
///     set_provider("mistral"),
///     set_model("mistral-large-latest"),
///     set_temperature(0.3),
/// ]);
/// assert_eq!(config.model, "mistral-large-latest");
/// ```
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Config {
    /// Provider name, e.g. `"mistral"`.
    pub provider: String,
    /// Model identifier.
    pub model: String,
    /// Base URL of a local Ollama instance.
    pub ollama_endpoint: String,
    /// Sampling temperature. Not range-checked.
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
    /// API key for [`Config::provider`].
    pub api_key: String,
    /// Logger verbosity.
    pub debug_level: LogLevel,
    /// Conversation memory, if enabled.
    pub memory_option: Option<MemoryOption>,
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

/// Errors raised while loading or resolving configuration.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    /// An environment variable was set to a value that could not be parsed.
    #[error("Invalid value for {var}: {value:?}")]
    InvalidValue {
        /// Variable name.
        var: &'static str,
        /// Raw value as found.
        value: String,
    },
    /// No provider implementation exists for the configured name.
    #[error("Unsupported provider: {0}")]
    UnsupportedProvider(String),
    /// The selected provider has no API key.
    #[error("Missing API key for provider: {0}")]
    MissingApiKey(String),
}

/// A deferred mutation of a [`Config`].
pub type ConfigOption = Box<dyn Fn(&mut Config) + Send + Sync>;

impl Config {
    /// Builds a zero-valued config and applies `options` in order.
    pub fn with_options<I>(options: I) -> Self
    where
        I: IntoIterator<Item = ConfigOption>,
    {
        let mut config = Self::default();
        config.apply(options);
        config
    }

    /// Applies `options` in order; later options overwrite earlier ones.
    pub fn apply<I>(&mut self, options: I)
    where
        I: IntoIterator<Item = ConfigOption>,
    {
        for option in options {
            option(self);
        }
    }

    /// Converts into the internal representation.
    ///
    /// The single API key becomes a one-entry map keyed by the provider.
    pub fn to_internal_config(&self) -> llm::Config {
        llm::Config {
            provider: self.provider.clone(),
            model: self.model.clone(),
            ollama_endpoint: self.ollama_endpoint.clone(),
            temperature: self.temperature,
            max_tokens: self.max_tokens,
            top_p: self.top_p,
            frequency_penalty: self.frequency_penalty,
            presence_penalty: self.presence_penalty,
            timeout: self.timeout,
            max_retries: self.max_retries,
            retry_delay: self.retry_delay,
            api_keys: HashMap::from([(self.provider.clone(), self.api_key.clone())]),
            log_level: self.debug_level.into(),
            seed: self.seed,
            min_p: self.min_p,
            repeat_penalty: self.repeat_penalty,
            repeat_last_n: self.repeat_last_n,
            mirostat: self.mirostat,
            mirostat_eta: self.mirostat_eta,
            mirostat_tau: self.mirostat_tau,
            tfs_z: self.tfs_z,
        }
    }
}

/// Loads the configuration from environment variables.
///
/// See [`llm::Config::from_env`] for the variables read.
pub fn load_config() -> Result<Config, ConfigError> {
    load_config_from(|name| std::env::var(name).ok())
}

/// Loads the configuration through an arbitrary variable lookup.
pub fn load_config_from<F>(lookup: F) -> Result<Config, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let internal = llm::Config::from_lookup(lookup)?;
    let api_key = internal
        .api_key(&internal.provider)
        .map(str::to_string)
        .unwrap_or_default();

    Ok(Config {
        api_key,
        provider: internal.provider,
        model: internal.model,
        ollama_endpoint: internal.ollama_endpoint,
        temperature: internal.temperature,
        max_tokens: internal.max_tokens,
        timeout: internal.timeout,
        max_retries: internal.max_retries,
        retry_delay: internal.retry_delay,
        debug_level: convert_log_level(internal.log_level),
        ..Config::default()
    })
}

/// Sets the provider name.
pub fn set_provider(provider: impl Into<String>) -> ConfigOption {
    let provider = provider.into();
    Box::new(move |c| c.provider = provider.clone())
}

/// Sets the model identifier.
pub fn set_model(model: impl Into<String>) -> ConfigOption {
    let model = model.into();
    Box::new(move |c| c.model = model.clone())
}

/// Sets the Ollama base URL.
pub fn set_ollama_endpoint(endpoint: impl Into<String>) -> ConfigOption {
    let endpoint = endpoint.into();
    Box::new(move |c| c.ollama_endpoint = endpoint.clone())
}

/// Sets the sampling temperature.
pub fn set_temperature(temperature: f64) -> ConfigOption {
    Box::new(move |c| c.temperature = temperature)
}

/// Sets the token limit. Values below 1 are raised to 1.
pub fn set_max_tokens(max_tokens: i64) -> ConfigOption {
    let max_tokens = max_tokens.clamp(1, i64::from(u32::MAX)) as u32;
    Box::new(move |c| c.max_tokens = max_tokens)
}

/// Sets the per-request timeout.
pub fn set_timeout(timeout: Duration) -> ConfigOption {
    Box::new(move |c| c.timeout = timeout)
}

/// Sets the API key for the current provider.
pub fn set_api_key(api_key: impl Into<String>) -> ConfigOption {
    let api_key = api_key.into();
    Box::new(move |c| c.api_key = api_key.clone())
}

/// Sets the number of retries after a failed attempt.
pub fn set_max_retries(max_retries: u32) -> ConfigOption {
    Box::new(move |c| c.max_retries = max_retries)
}

/// Sets the pause between attempts.
pub fn set_retry_delay(retry_delay: Duration) -> ConfigOption {
    Box::new(move |c| c.retry_delay = retry_delay)
}

/// Sets the logger verbosity.
pub fn set_debug_level(level: LogLevel) -> ConfigOption {
    Box::new(move |c| c.debug_level = level)
}

/// Enables conversation memory with the given token budget.
pub fn set_memory(max_tokens: i64) -> ConfigOption {
    Box::new(move |c| c.memory_option = Some(MemoryOption { max_tokens }))
}

/// Sets nucleus sampling probability mass.
pub fn set_top_p(top_p: f64) -> ConfigOption {
    Box::new(move |c| c.top_p = top_p)
}

/// Sets the penalty for frequently repeated tokens.
pub fn set_frequency_penalty(penalty: f64) -> ConfigOption {
    Box::new(move |c| c.frequency_penalty = penalty)
}

/// Sets the penalty for tokens already present in the text.
pub fn set_presence_penalty(penalty: f64) -> ConfigOption {
    Box::new(move |c| c.presence_penalty = penalty)
}

/// Sets the sampling seed.
pub fn set_seed(seed: i64) -> ConfigOption {
    Box::new(move |c| c.seed = Some(seed))
}

/// Sets the minimum token probability relative to the most likely token.
pub fn set_min_p(min_p: f64) -> ConfigOption {
    Box::new(move |c| c.min_p = Some(min_p))
}

/// Sets the repetition penalty.
pub fn set_repeat_penalty(penalty: f64) -> ConfigOption {
    Box::new(move |c| c.repeat_penalty = Some(penalty))
}

/// Sets how many recent tokens the repetition penalty looks back over.
pub fn set_repeat_last_n(n: i32) -> ConfigOption {
    Box::new(move |c| c.repeat_last_n = Some(n))
}

/// Sets the Mirostat sampling mode (0 disables it).
pub fn set_mirostat(mode: i32) -> ConfigOption {
    Box::new(move |c| c.mirostat = Some(mode))
}

/// Sets the Mirostat learning rate.
pub fn set_mirostat_eta(eta: f64) -> ConfigOption {
    Box::new(move |c| c.mirostat_eta = Some(eta))
}

/// Sets the Mirostat target entropy.
pub fn set_mirostat_tau(tau: f64) -> ConfigOption {
    Box::new(move |c| c.mirostat_tau = Some(tau))
}

/// Sets the tail-free sampling parameter.
pub fn set_tfs_z(z: f64) -> ConfigOption {
    Box::new(move |c| c.tfs_z = Some(z))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scalar_setters() {
        let config = Config::with_options([
            set_provider("mistral"),
            set_model("mistral-small-latest"),
            set_ollama_endpoint("http://localhost:11434"),
            set_temperature(0.4),
            set_max_tokens(256),
            set_timeout(Duration::from_secs(10)),
            set_api_key("mk-test"),
            set_max_retries(4),
            set_retry_delay(Duration::from_millis(500)),
            set_debug_level(LogLevel::Info),
            set_top_p(0.9),
            set_frequency_penalty(0.1),
            set_presence_penalty(-0.2),
        ]);

        assert_eq!(config.provider, "mistral");
        assert_eq!(config.model, "mistral-small-latest");
        assert_eq!(config.ollama_endpoint, "http://localhost:11434");
        assert_eq!(config.temperature, 0.4);
        assert_eq!(config.max_tokens, 256);
        assert_eq!(config.timeout, Duration::from_secs(10));
        assert_eq!(config.api_key, "mk-test");
        assert_eq!(config.max_retries, 4);
        assert_eq!(config.retry_delay, Duration::from_millis(500));
        assert_eq!(config.debug_level, LogLevel::Info);
        assert_eq!(config.top_p, 0.9);
        assert_eq!(config.frequency_penalty, 0.1);
        assert_eq!(config.presence_penalty, -0.2);
    }

    #[test]
    fn test_optional_setters() {
        let config = Config::with_options([
            set_memory(4096),
            set_seed(42),
            set_min_p(0.05),
            set_repeat_penalty(1.1),
            set_repeat_last_n(64),
            set_mirostat(2),
            set_mirostat_eta(0.1),
            set_mirostat_tau(5.0),
            set_tfs_z(1.0),
        ]);

        assert_eq!(config.memory_option, Some(MemoryOption { max_tokens: 4096 }));
        assert_eq!(config.seed, Some(42));
        assert_eq!(config.min_p, Some(0.05));
        assert_eq!(config.repeat_penalty, Some(1.1));
        assert_eq!(config.repeat_last_n, Some(64));
        assert_eq!(config.mirostat, Some(2));
        assert_eq!(config.mirostat_eta, Some(0.1));
        assert_eq!(config.mirostat_tau, Some(5.0));
        assert_eq!(config.tfs_z, Some(1.0));

        let untouched = Config::default();
        assert!(untouched.seed.is_none());
        assert!(untouched.memory_option.is_none());
    }

    #[test]
    fn test_max_tokens_is_clamped_to_one() {
        assert_eq!(Config::with_options([set_max_tokens(0)]).max_tokens, 1);
        assert_eq!(Config::with_options([set_max_tokens(-50)]).max_tokens, 1);
        assert_eq!(Config::with_options([set_max_tokens(1)]).max_tokens, 1);
    }

    #[test]
    fn test_temperature_is_not_validated() {
        assert_eq!(Config::with_options([set_temperature(7.5)]).temperature, 7.5);
        assert_eq!(Config::with_options([set_temperature(-1.0)]).temperature, -1.0);
    }

    #[test]
    fn test_later_options_win() {
        let mut config = Config::with_options([set_model("a"), set_model("b")]);
        assert_eq!(config.model, "b");

        config.apply([set_model("c")]);
        assert_eq!(config.model, "c");
    }

    #[test]
    fn test_option_can_be_reused() {
        let option = set_seed(7);
        let mut first = Config::default();
        let mut second = Config::default();
        option(&mut first);
        option(&mut second);
        assert_eq!(first.seed, second.seed);
    }

    #[test]
    fn test_to_internal_config_copies_fields() {
        let config = Config::with_options([
            set_provider("mistral"),
            set_model("open-mistral-nemo"),
            set_temperature(0.3),
            set_max_tokens(64),
            set_top_p(0.8),
            set_timeout(Duration::from_secs(5)),
            set_max_retries(2),
            set_retry_delay(Duration::from_millis(100)),
            set_api_key("mk-1"),
            set_debug_level(LogLevel::Debug),
            set_seed(9),
            set_tfs_z(0.5),
        ]);

        let internal = config.to_internal_config();
        assert_eq!(internal.provider, "mistral");
        assert_eq!(internal.model, "open-mistral-nemo");
        assert_eq!(internal.temperature, 0.3);
        assert_eq!(internal.max_tokens, 64);
        assert_eq!(internal.top_p, 0.8);
        assert_eq!(internal.timeout, Duration::from_secs(5));
        assert_eq!(internal.max_retries, 2);
        assert_eq!(internal.retry_delay, Duration::from_millis(100));
        assert_eq!(internal.log_level, llm::LogLevel::Debug);
        assert_eq!(internal.seed, Some(9));
        assert_eq!(internal.tfs_z, Some(0.5));
        assert_eq!(internal.min_p, None);

        assert_eq!(internal.api_keys.len(), 1);
        assert_eq!(internal.api_key("mistral"), Some("mk-1"));
    }

    #[test]
    fn test_log_level_conversion_round_trips() {
        for level in [
            LogLevel::Off,
            LogLevel::Error,
            LogLevel::Warn,
            LogLevel::Info,
            LogLevel::Debug,
        ] {
            assert_eq!(convert_log_level(level.into()), level);
        }
    }

    #[test]
    fn test_load_config_from_lookup() {
        let vars = HashMap::from([
            ("LLM_PROVIDER", "mistral"),
            ("LLM_MODEL", "codestral-latest"),
            ("LLM_LOG_LEVEL", "info"),
            ("MISTRAL_API_KEY", "mk-env"),
            ("OPENAI_API_KEY", "sk-other"),
        ]);
        let config = load_config_from(|name| vars.get(name).map(|v| v.to_string())).unwrap();

        assert_eq!(config.provider, "mistral");
        assert_eq!(config.model, "codestral-latest");
        assert_eq!(config.api_key, "mk-env");
        assert_eq!(config.debug_level, LogLevel::Info);
        assert_eq!(config.max_tokens, 100);
        assert!(config.seed.is_none());
    }

    #[test]
    fn test_load_config_without_key() {
        let config = load_config_from(|_| None).unwrap();
        assert_eq!(config.api_key, "");
        assert_eq!(config.debug_level, LogLevel::Warn);
    }

    #[test]
    fn test_load_config_propagates_errors() {
        let err = load_config_from(|name| (name == "LLM_MAX_RETRIES").then(|| "-1".to_string()))
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { var: "LLM_MAX_RETRIES", .. }));
    }
}
