//! Runtime configuration loaded from environment variables.
//!
//! `.env` files are honoured through `dotenvy` (loaded by the binary before
//! [`Config::from_env`] runs). Every setting has a default except the bot
//! token, which only the `run` command needs.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use secrecy::SecretString;
use url::Url;

use crate::channels::RestartPolicy;
use crate::error::ConfigError;
use crate::media::{CharPolicy, SweepConfig, TranslateTtsProvider, Voice};

pub const DEFAULT_TELEGRAM_API_URL: &str = "https://api.telegram.org";
pub const DEFAULT_TTS_API_URL: &str = "https://translate.google.com/translate_tts";
pub const DEFAULT_MAX_FILE_SIZE: u64 = 10 * 1024 * 1024;
pub const DEFAULT_MAX_TEXT_LENGTH: usize = 5000;
pub const DEFAULT_SUPPORTED_FILE_TYPES: [&str; 3] = [".txt", ".md", ".rtf"];

/// Chat transport settings.
#[derive(Debug, Clone)]
pub struct TelegramConfig {
    /// Bot token. Redacted in `Debug` output.
    pub bot_token: Option<SecretString>,
    pub api_url: Url,
    /// Long-poll timeout passed to `getUpdates`.
    pub poll_timeout: Duration,
}

/// Speech provider implementations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TtsBackend {
    /// Google Translate `translate_tts` endpoint.
    #[default]
    Translate,
}

impl FromStr for TtsBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "translate" | "google" | "translate_tts" => Ok(Self::Translate),
            other => Err(format!("unknown TTS provider '{}'", other)),
        }
    }
}

/// Speech provider settings.
#[derive(Debug, Clone)]
pub struct TtsConfig {
    pub backend: TtsBackend,
    pub api_url: Url,
    pub timeout: Duration,
    pub client_id: String,
    /// Per-request character cap; longer text is truncated with a warning.
    /// Unset means "whatever the normalizer can produce".
    pub max_request_chars: Option<usize>,
}

impl Default for TtsConfig {
    fn default() -> Self {
        Self {
            backend: TtsBackend::Translate,
            api_url: default_url(DEFAULT_TTS_API_URL),
            timeout: Duration::from_secs(30),
            client_id: TranslateTtsProvider::DEFAULT_CLIENT_ID.to_string(),
            max_request_chars: None,
        }
    }
}

/// Upload and text limits.
#[derive(Debug, Clone)]
pub struct LimitsConfig {
    pub max_file_size: u64,
    pub max_text_length: usize,
    pub supported_file_types: Vec<String>,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_file_size: DEFAULT_MAX_FILE_SIZE,
            max_text_length: DEFAULT_MAX_TEXT_LENGTH,
            supported_file_types: DEFAULT_SUPPORTED_FILE_TYPES
                .iter()
                .map(|s| s.to_string())
                .collect(),
        }
    }
}

/// Staging directory settings.
#[derive(Debug, Clone)]
pub struct StorageConfig {
    pub temp_dir: PathBuf,
    pub sweep: SweepConfig,
}

/// Full application configuration.
#[derive(Debug, Clone)]
pub struct Config {
    pub telegram: TelegramConfig,
    pub tts: TtsConfig,
    pub limits: LimitsConfig,
    pub char_policy: CharPolicy,
    pub default_voice: Voice,
    pub storage: StorageConfig,
    /// Health endpoint port.
    pub port: u16,
    pub restart: RestartPolicy,
}

impl Config {
    /// Load configuration from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration through an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let env = Env(&lookup);

        let telegram = TelegramConfig {
            bot_token: env.get("TELEGRAM_BOT_TOKEN").map(SecretString::from),
            api_url: env.parse_url("TELEGRAM_API_URL", DEFAULT_TELEGRAM_API_URL)?,
            poll_timeout: Duration::from_secs(env.parse("POLL_TIMEOUT_SECS", 60u64)?),
        };

        let limits = LimitsConfig {
            max_file_size: env.parse("MAX_FILE_SIZE", DEFAULT_MAX_FILE_SIZE)?,
            max_text_length: env.parse("MAX_TEXT_LENGTH", DEFAULT_MAX_TEXT_LENGTH)?,
            supported_file_types: match env.get("SUPPORTED_FILE_TYPES") {
                Some(raw) => parse_list(&raw),
                None => LimitsConfig::default().supported_file_types,
            },
        };
        if limits.max_text_length == 0 {
            return Err(invalid("MAX_TEXT_LENGTH", "must be greater than zero"));
        }
        if limits.supported_file_types.is_empty() {
            return Err(invalid("SUPPORTED_FILE_TYPES", "must list at least one type"));
        }

        let tts = TtsConfig {
            backend: env.parse("TTS_PROVIDER", TtsBackend::default())?,
            api_url: env.parse_url("TTS_API_URL", DEFAULT_TTS_API_URL)?,
            timeout: Duration::from_secs(env.parse("TTS_TIMEOUT_SECS", 30u64)?),
            client_id: env
                .get("TTS_CLIENT_ID")
                .unwrap_or_else(|| TranslateTtsProvider::DEFAULT_CLIENT_ID.to_string()),
            max_request_chars: env
                .get("TTS_MAX_REQUEST_CHARS")
                .map(|raw| {
                    raw.parse::<usize>()
                        .map_err(|e| invalid("TTS_MAX_REQUEST_CHARS", format!("'{}': {}", raw, e)))
                })
                .transpose()?,
        };
        if tts.timeout.is_zero() {
            return Err(invalid("TTS_TIMEOUT_SECS", "must be greater than zero"));
        }
        if tts.max_request_chars == Some(0) {
            return Err(invalid("TTS_MAX_REQUEST_CHARS", "must be greater than zero"));
        }

        let char_policy = match env.get("TTS_EXTRA_CHAR_RANGES") {
            Some(raw) => CharPolicy::default().with_ranges(
                CharPolicy::parse_ranges(&raw)
                    .map_err(|message| invalid("TTS_EXTRA_CHAR_RANGES", message))?,
            ),
            None => CharPolicy::default(),
        };

        let default_voice = match env.get("DEFAULT_VOICE") {
            Some(code) => Voice::from_code(&code).ok_or_else(|| {
                invalid("DEFAULT_VOICE", format!("unknown voice '{}'", code))
            })?,
            None => Voice::default(),
        };

        let sweep_defaults = SweepConfig::default();
        let storage = StorageConfig {
            temp_dir: env
                .get("TEMP_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("./temp")),
            sweep: SweepConfig {
                interval: Duration::from_secs(
                    env.parse("SWEEP_INTERVAL_SECS", sweep_defaults.interval.as_secs())?,
                ),
                min_age: Duration::from_secs(
                    env.parse("SWEEP_MIN_AGE_SECS", sweep_defaults.min_age.as_secs())?,
                ),
                enabled: env.parse("SWEEP_ENABLED", true)?,
            },
        };
        if storage.sweep.interval.is_zero() {
            return Err(invalid("SWEEP_INTERVAL_SECS", "must be greater than zero"));
        }

        let restart_defaults = RestartPolicy::default();
        let restart = RestartPolicy {
            base_delay_ms: env.parse("RESTART_BASE_DELAY_MS", restart_defaults.base_delay_ms)?,
            max_delay_ms: env.parse("RESTART_MAX_DELAY_MS", restart_defaults.max_delay_ms)?,
            max_attempts: env.parse("RESTART_MAX_ATTEMPTS", restart_defaults.max_attempts)?,
            ..restart_defaults
        };

        Ok(Self {
            telegram,
            tts,
            limits,
            char_policy,
            default_voice,
            storage,
            port: env.parse("PORT", 3000u16)?,
            restart,
        })
    }

    /// The bot token, or an error naming the missing variable.
    pub fn require_bot_token(&self) -> Result<&SecretString, ConfigError> {
        self.telegram
            .bot_token
            .as_ref()
            .ok_or_else(|| ConfigError::MissingEnvVar("TELEGRAM_BOT_TOKEN".to_string()))
    }
}

struct Env<'a, F>(&'a F);

impl<F> Env<'_, F>
where
    F: Fn(&str) -> Option<String>,
{
    /// Non-empty value of `key`.
    fn get(&self, key: &str) -> Option<String> {
        (self.0)(key)
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    }

    fn parse<T>(&self, key: &str, default: T) -> Result<T, ConfigError>
    where
        T: FromStr,
        T::Err: std::fmt::Display,
    {
        match self.get(key) {
            Some(raw) => raw
                .parse()
                .map_err(|e: T::Err| invalid(key, format!("'{}': {}", raw, e))),
            None => Ok(default),
        }
    }

    fn parse_url(&self, key: &str, default: &str) -> Result<Url, ConfigError> {
        let raw = self.get(key).unwrap_or_else(|| default.to_string());
        Url::parse(&raw).map_err(|e| invalid(key, format!("'{}': {}", raw, e)))
    }
}

fn invalid(key: &str, message: impl Into<String>) -> ConfigError {
    ConfigError::InvalidValue {
        key: key.to_string(),
        message: message.into(),
    }
}

fn parse_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| s.to_string())
        .collect()
}

fn default_url(raw: &str) -> Url {
    Url::parse(raw).expect("built-in URL is valid")
}
