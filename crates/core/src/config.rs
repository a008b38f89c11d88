//! Settings read once from the environment at startup.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use secrecy::SecretString;

use crate::error::ConfigError;
use crate::retry::RetryConfig;

pub const DEFAULT_SOURCE_BASE_URL: &str = "https://www.idx.co.id";
pub const DEFAULT_LONG_SUSPENSION_PATH: &str = "/id/perusahaan-tercatat/suspensi-6-bulan/";
pub const DEFAULT_FALLBACK_PATH: &str = "data_incomplete/idx_suspension_missing_data.csv";
pub const SUSPENSION_TABLE: &str = "idx_suspension";

#[derive(Debug)]
pub struct Settings {
    /// Outbound proxy applied to every HTTP client.
    pub proxy: Option<String>,
    pub store: StoreSettings,
    pub source: SourceSettings,
    pub http_timeout: Duration,
    pub retry: RetryConfig,
    pub fallback_path: PathBuf,
    pub parser: ParserSettings,
    /// Leave records as parsed instead of checking the six-month list.
    pub skip_long_suspensions: bool,
}

#[derive(Debug)]
pub struct StoreSettings {
    pub url: String,
    pub api_key: SecretString,
    pub table: String,
}

#[derive(Debug, Clone)]
pub struct SourceSettings {
    pub base_url: String,
    /// Days per listing window, inclusive.
    pub window_days: u32,
    pub page_size: u32,
    /// Page linking the spreadsheet of companies suspended for over six months.
    pub long_suspension_path: String,
}

impl Default for SourceSettings {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_SOURCE_BASE_URL.to_string(),
            window_days: 7,
            page_size: 100,
            long_suspension_path: DEFAULT_LONG_SUSPENSION_PATH.to_string(),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ParserSettings {
    /// Appended to every ticker, e.g. `.JK`.
    pub symbol_suffix: String,
    /// Treat a missing reason as incomplete.
    pub require_reason: bool,
}

impl Settings {
    /// Loads `.env` if present, then reads the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let read = |key: &str| {
            lookup(key)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };

        let store_url = read("SUPABASE_URL").ok_or(ConfigError::Missing("SUPABASE_URL"))?;
        let api_key = read("SUPABASE_KEY").ok_or(ConfigError::Missing("SUPABASE_KEY"))?;

        let source_defaults = SourceSettings::default();
        let window_days = parse_or("IDX_WINDOW_DAYS", read("IDX_WINDOW_DAYS"), source_defaults.window_days)?;
        if window_days == 0 {
            return Err(ConfigError::Invalid {
                key: "IDX_WINDOW_DAYS",
                details: "must be at least 1".to_string(),
            });
        }
        let page_size = parse_or("IDX_PAGE_SIZE", read("IDX_PAGE_SIZE"), source_defaults.page_size)?;
        if page_size == 0 {
            return Err(ConfigError::Invalid {
                key: "IDX_PAGE_SIZE",
                details: "must be at least 1".to_string(),
            });
        }

        let retry_defaults = RetryConfig::default();
        let retry = RetryConfig {
            max_retries: parse_or("RETRY_MAX_ATTEMPTS", read("RETRY_MAX_ATTEMPTS"), retry_defaults.max_retries)?,
            base_delay: Duration::from_millis(parse_or(
                "RETRY_BASE_DELAY_MS",
                read("RETRY_BASE_DELAY_MS"),
                retry_defaults.base_delay.as_millis() as u64,
            )?),
            ..retry_defaults
        };

        Ok(Self {
            proxy: read("PROXY"),
            store: StoreSettings {
                url: store_url.trim_end_matches('/').to_string(),
                api_key: SecretString::from(api_key),
                table: SUSPENSION_TABLE.to_string(),
            },
            source: SourceSettings {
                base_url: read("IDX_BASE_URL")
                    .map(|url| url.trim_end_matches('/').to_string())
                    .unwrap_or(source_defaults.base_url),
                window_days,
                page_size,
                long_suspension_path: read("IDX_LONG_SUSPENSION_PATH")
                    .unwrap_or(source_defaults.long_suspension_path),
            },
            http_timeout: Duration::from_secs(parse_or("HTTP_TIMEOUT_SECS", read("HTTP_TIMEOUT_SECS"), 30u64)?),
            retry,
            fallback_path: read("FALLBACK_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_FALLBACK_PATH)),
            parser: ParserSettings {
                symbol_suffix: read("SYMBOL_SUFFIX").unwrap_or_default(),
                require_reason: parse_bool("REQUIRE_REASON", read("REQUIRE_REASON"))?,
            },
            skip_long_suspensions: parse_bool("SKIP_LONG_SUSPENSION_CHECK", read("SKIP_LONG_SUSPENSION_CHECK"))?,
        })
    }
}

fn parse_or<T>(key: &'static str, raw: Option<String>, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match raw {
        None => Ok(default),
        Some(value) => value.parse().map_err(|error: T::Err| ConfigError::Invalid {
            key,
            details: format!("{value:?}: {error}"),
        }),
    }
}

fn parse_bool(key: &'static str, raw: Option<String>) -> Result<bool, ConfigError> {
    match raw.as_deref().map(str::to_ascii_lowercase).as_deref() {
        None => Ok(false),
        Some("1" | "true" | "yes") => Ok(true),
        Some("0" | "false" | "no") => Ok(false),
        Some(other) => Err(ConfigError::Invalid {
            key,
            details: format!("{other:?} is not a boolean"),
        }),
    }
}
