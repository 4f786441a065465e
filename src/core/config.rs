use crate::core::errors::ConfigError;
use std::env;
use std::fmt::Display;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;
use tokio::sync::Semaphore;
use tracing::Level;

/// Server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub port: u16,
    pub host: String,
    pub log_level: Level,
    /// Maximum accepted request body (uploads and base64 reference images)
    pub max_upload_bytes: usize,
}

/// Multimodal provider (Gemini) configuration
#[derive(Debug, Clone)]
pub struct GeminiConfig {
    pub api_keys: Vec<String>,
    pub base_url: String,
    pub image_model: String,
    /// Empty string disables the fallback attempt
    pub image_fallback_model: String,
    pub vision_model: String,
}

/// Text-completion provider (OpenAI-compatible) configuration
#[derive(Debug, Clone)]
pub struct TextProviderConfig {
    pub api_key: Option<String>,
    pub base_url: String,
    pub model: String,
}

/// Concurrency and timeout limits
#[derive(Debug, Clone)]
pub struct LimitsConfig {
    pub max_concurrent_requests: usize,
    pub api_timeout: Duration,
    pub optimize_timeout: Duration,
    pub error_translation_timeout: Duration,
    pub http_max_idle_per_host: usize,
    pub http_pool_idle_timeout: Duration,
    pub reference_analysis_enabled: bool,
}

/// Request log storage configuration
#[derive(Debug, Clone)]
pub struct StorageConfig {
    pub db_path: String,
    pub images_dir: String,
}

/// Main application configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub gemini: GeminiConfig,
    pub text: TextProviderConfig,
    pub limits: LimitsConfig,
    pub storage: StorageConfig,
}

impl Config {
    pub fn new() -> Result<Self, ConfigError> {
        // Load .env file if it exists
        let _ = dotenvy::dotenv();

        let config = Self::load_with(|name| env::var(name).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Build a configuration from an arbitrary variable lookup.
    ///
    /// `Config::new` passes the process environment; tests pass a map.
    pub fn load_with<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let parsed = |name: &str| lookup(name).map(|s| s.trim().to_string()).filter(|s| !s.is_empty());

        // Comma-separated key pool
        let api_keys = parsed("GOOGLE_API_KEY")
            .map(|keys| split_keys(&keys))
            .unwrap_or_default();

        // Parse log level
        let log_level = parsed("LOG_LEVEL")
            .and_then(|s| match s.to_lowercase().as_str() {
                "trace" => Some(Level::TRACE),
                "debug" => Some(Level::DEBUG),
                "info" => Some(Level::INFO),
                "warn" | "warning" => Some(Level::WARN),
                "error" => Some(Level::ERROR),
                _ => None,
            })
            .unwrap_or(Level::INFO);

        // Set-but-unparseable values are errors, unset ones take the default
        let seconds = |name: &str, default: u64| -> Result<Duration, ConfigError> {
            parse_var(name, parsed(name), default).map(Duration::from_secs)
        };

        let image_model = parsed("GEMINI_IMAGE_MODEL")
            .unwrap_or_else(|| "gemini-3-pro-image-preview".to_string());

        Ok(Self {
            server: ServerConfig {
                port: parse_var("SERVER_PORT", parsed("SERVER_PORT"), 8000)?,
                host: parsed("SERVER_HOST").unwrap_or_else(|| "0.0.0.0".to_string()),
                log_level,
                max_upload_bytes: parse_var(
                    "MAX_UPLOAD_BYTES",
                    parsed("MAX_UPLOAD_BYTES"),
                    50 * 1024 * 1024,
                )?,
            },
            gemini: GeminiConfig {
                api_keys,
                base_url: parsed("GOOGLE_API_BASE_URL")
                    .unwrap_or_else(|| "https://generativelanguage.googleapis.com".to_string()),
                vision_model: parsed("GEMINI_VISION_MODEL").unwrap_or_else(|| image_model.clone()),
                image_fallback_model: parsed("GEMINI_IMAGE_FALLBACK_MODEL").unwrap_or_default(),
                image_model,
            },
            text: TextProviderConfig {
                api_key: parsed("QWEN_API_KEY"),
                base_url: parsed("QWEN_API_BASE_URL").unwrap_or_else(|| {
                    "https://dashscope.aliyuncs.com/compatible-mode/v1".to_string()
                }),
                model: parsed("QWEN_MODEL").unwrap_or_else(|| "qwen-plus".to_string()),
            },
            limits: LimitsConfig {
                max_concurrent_requests: parse_var(
                    "MAX_CONCURRENT_REQUESTS",
                    parsed("MAX_CONCURRENT_REQUESTS"),
                    10,
                )?,
                api_timeout: seconds("API_TIMEOUT_SECONDS", 60)?,
                optimize_timeout: seconds("OPTIMIZE_TIMEOUT_SECONDS", 30)?,
                error_translation_timeout: seconds("ERROR_TRANSLATION_TIMEOUT_SECONDS", 5)?,
                http_max_idle_per_host: parse_var(
                    "HTTP_MAX_IDLE_PER_HOST",
                    parsed("HTTP_MAX_IDLE_PER_HOST"),
                    20,
                )?,
                http_pool_idle_timeout: seconds("HTTP_POOL_IDLE_TIMEOUT_SECONDS", 90)?,
                reference_analysis_enabled: parse_var(
                    "REFERENCE_ANALYSIS_ENABLED",
                    parsed("REFERENCE_ANALYSIS_ENABLED").map(|s| s.to_lowercase()),
                    true,
                )?,
            },
            storage: StorageConfig {
                db_path: parsed("HISTORY_DB_PATH").unwrap_or_else(|| "history.db".to_string()),
                images_dir: parsed("HISTORY_IMAGES_DIR")
                    .unwrap_or_else(|| "history_images".to_string()),
            },
        })
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        // Missing credentials are not fatal: the affected endpoints fail per request

        if self.server.port == 0 {
            return Err(ConfigError::InvalidServerConfig(
                "SERVER_PORT must be > 0".to_string(),
            ));
        }

        // Semaphore::new panics above MAX_PERMITS
        if self.limits.max_concurrent_requests == 0
            || self.limits.max_concurrent_requests > Semaphore::MAX_PERMITS
        {
            return Err(ConfigError::InvalidConcurrency(
                self.limits.max_concurrent_requests,
            ));
        }

        for (name, value) in [
            ("API_TIMEOUT_SECONDS", self.limits.api_timeout),
            ("OPTIMIZE_TIMEOUT_SECONDS", self.limits.optimize_timeout),
            (
                "ERROR_TRANSLATION_TIMEOUT_SECONDS",
                self.limits.error_translation_timeout,
            ),
        ] {
            if value.is_zero() {
                return Err(ConfigError::InvalidTimeout(name));
            }
        }

        for (name, url) in [
            ("GOOGLE_API_BASE_URL", &self.gemini.base_url),
            ("QWEN_API_BASE_URL", &self.text.base_url),
        ] {
            if !(url.starts_with("http://") || url.starts_with("https://")) {
                return Err(ConfigError::InvalidProviderConfig(format!(
                    "{} must be an http(s) URL, got {}",
                    name, url
                )));
            }
        }

        // Validate storage parents exist
        for path in [&self.storage.db_path, &self.storage.images_dir] {
            if let Some(parent) = Path::new(path).parent() {
                if !parent.as_os_str().is_empty() && !parent.exists() {
                    return Err(ConfigError::InvalidStoragePath(format!(
                        "Parent directory does not exist: {}",
                        parent.display()
                    )));
                }
            }
        }

        Ok(())
    }

    pub fn server_port(&self) -> u16 {
        self.server.port
    }

    pub fn server_host(&self) -> &str {
        &self.server.host
    }

    pub fn log_level(&self) -> Level {
        self.server.log_level
    }

    pub fn api_keys(&self) -> &[String] {
        &self.gemini.api_keys
    }

    /// Gemini base URL without a trailing slash
    pub fn gemini_base_url(&self) -> &str {
        self.gemini.base_url.trim_end_matches('/')
    }

    /// Text provider base URL without a trailing slash
    pub fn text_base_url(&self) -> &str {
        self.text.base_url.trim_end_matches('/')
    }

    /// Fallback model, if one is configured and differs from the primary
    pub fn image_fallback_model(&self) -> Option<&str> {
        let fallback = self.gemini.image_fallback_model.as_str();
        (!fallback.is_empty() && fallback != self.gemini.image_model).then_some(fallback)
    }

    pub fn max_concurrent_requests(&self) -> usize {
        self.limits.max_concurrent_requests
    }
}

fn parse_var<T>(name: &str, raw: Option<String>, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: Display,
{
    match raw {
        Some(raw) => raw
            .parse()
            .map_err(|e| ConfigError::EnvVarError(format!("{}={}: {}", name, raw, e))),
        None => Ok(default),
    }
}

fn split_keys(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

/// Last four characters of a credential; `None` for keys of four or fewer
pub fn key_tail(key: &str) -> Option<String> {
    let chars: Vec<char> = key.chars().collect();
    (chars.len() > 4).then(|| chars[chars.len() - 4..].iter().collect())
}

/// `...` plus the key tail, or `****` for short ones.
///
/// Used in startup logs and health output so secrets never leave the process.
pub fn mask_key(key: &str) -> String {
    match key_tail(key) {
        Some(tail) => format!("...{}", tail),
        None => "****".to_string(),
    }
}
