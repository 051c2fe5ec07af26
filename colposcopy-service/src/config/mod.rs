use crate::services::prompt::ReportLanguage;
use secrecy::Secret;
use service_core::config as core_config;
use service_core::error::AppError;
use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

/// Gemini API base URL.
pub const DEFAULT_GEMINI_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";

/// Vision-capable model used when `GEMINI_MODEL` is unset.
pub const DEFAULT_GEMINI_MODEL: &str = "gemini-1.5-flash-latest";

const DEFAULT_TIMEOUT_SECS: u64 = 120;

/// Default request body limit (20MB). Base64 inflates images by a third.
const DEFAULT_MAX_BODY_BYTES: usize = 20 * 1024 * 1024;

#[derive(Debug, Clone)]
pub struct ColposcopyConfig {
    pub common: core_config::Config,
    pub gemini: GeminiSettings,
    pub report: ReportSettings,
    pub http: HttpSettings,
    pub otlp_endpoint: Option<String>,
}

#[derive(Debug, Clone)]
pub struct GeminiSettings {
    /// Provider credential. `None` keeps the service up but every analysis
    /// fails with a configuration error.
    pub api_key: Option<Secret<String>>,
    pub model: String,
    pub api_base: String,
    pub timeout: Duration,
    pub temperature: Option<f32>,
    pub max_output_tokens: Option<u32>,
    /// Serve canned reports instead of calling Gemini.
    pub mock: bool,
}

#[derive(Debug, Clone)]
pub struct ReportSettings {
    pub language: ReportLanguage,
}

#[derive(Debug, Clone)]
pub struct HttpSettings {
    pub static_dir: PathBuf,
    pub max_body_bytes: usize,
}

impl ColposcopyConfig {
    pub fn load() -> Result<Self, AppError> {
        let common = core_config::Config::load()?;

        Ok(ColposcopyConfig {
            common,
            gemini: GeminiSettings {
                api_key: get_optional_env("GEMINI_API_KEY").map(Secret::new),
                model: get_env("GEMINI_MODEL", DEFAULT_GEMINI_MODEL),
                api_base: get_env("GEMINI_API_BASE", DEFAULT_GEMINI_API_BASE)
                    .trim_end_matches('/')
                    .to_string(),
                timeout: parse_timeout_secs("GEMINI_TIMEOUT_SECS", DEFAULT_TIMEOUT_SECS)?,
                temperature: parse_optional_env("GEMINI_TEMPERATURE")?,
                max_output_tokens: parse_optional_env("GEMINI_MAX_OUTPUT_TOKENS")?,
                mock: parse_env("GEMINI_MOCK", false)?,
            },
            report: ReportSettings {
                language: parse_env("REPORT_LANGUAGE", ReportLanguage::default())?,
            },
            http: HttpSettings {
                static_dir: PathBuf::from(get_env("STATIC_DIR", "static")),
                max_body_bytes: parse_env("MAX_BODY_BYTES", DEFAULT_MAX_BODY_BYTES)?,
            },
            otlp_endpoint: get_optional_env("OTLP_ENDPOINT"),
        })
    }
}

fn get_env(key: &str, default: &str) -> String {
    get_optional_env(key).unwrap_or_else(|| default.to_string())
}

/// Unset and blank variables are both treated as absent.
fn get_optional_env(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Whole seconds, at least one.
fn parse_timeout_secs(key: &str, default: u64) -> Result<Duration, AppError> {
    let secs: u64 = parse_env(key, default)?;
    if secs == 0 {
        return Err(AppError::ConfigError(anyhow::anyhow!(
            "{} must be at least 1 second",
            key
        )));
    }
    Ok(Duration::from_secs(secs))
}

fn parse_env<T>(key: &str, default: T) -> Result<T, AppError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    Ok(parse_optional_env(key)?.unwrap_or(default))
}

fn parse_optional_env<T>(key: &str) -> Result<Option<T>, AppError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    get_optional_env(key)
        .map(|raw| {
            raw.parse::<T>().map_err(|e| {
                AppError::ConfigError(anyhow::anyhow!("{} has invalid value '{}': {}", key, raw, e))
            })
        })
        .transpose()
}
