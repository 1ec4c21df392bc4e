//! # Configuration Module
//!
//! Environment-driven settings for the bot, its store, and the optional
//! external gateways.

use anyhow::{anyhow, Context, Result};
use std::path::PathBuf;

pub const DEFAULT_ANALYSIS_BASE_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_ANALYSIS_MODEL: &str = "gpt-4o-mini";
pub const DEFAULT_ANALYSIS_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_DIARY_BASE_URL: &str = "https://platform.fatsecret.com/rest/server.api";
pub const DEFAULT_DIARY_TIMEOUT_SECS: u64 = 15;
pub const DEFAULT_MAX_DB_CONNECTIONS: u32 = 5;

/// Circuit breaker settings for a best-effort gateway
#[derive(Debug, Clone, PartialEq)]
pub struct BreakerConfig {
    /// Consecutive failures before calls are skipped
    pub failure_threshold: u32,
    /// Seconds to wait before trying again once open
    pub reset_secs: u64,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            reset_secs: 300, // 5 minutes
        }
    }
}

/// AI analysis endpoint settings
#[derive(Debug, Clone, PartialEq)]
pub struct AnalysisConfig {
    pub base_url: String,
    pub api_key: String,
    pub model: String,
    pub timeout_secs: u64,
    pub breaker: BreakerConfig,
}

impl AnalysisConfig {
    pub fn new(base_url: &str, api_key: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            model: DEFAULT_ANALYSIS_MODEL.to_string(),
            timeout_secs: DEFAULT_ANALYSIS_TIMEOUT_SECS,
            breaker: BreakerConfig::default(),
        }
    }
}

/// Nutrition diary endpoint settings
#[derive(Debug, Clone, PartialEq)]
pub struct DiaryConfig {
    pub base_url: String,
    pub access_token: String,
    pub timeout_secs: u64,
}

/// Complete bot configuration
#[derive(Debug, Clone)]
pub struct BotConfig {
    pub telegram_token: String,
    pub database_url: String,
    pub max_db_connections: u32,
    /// `None` disables the AI feedback step
    pub analysis: Option<AnalysisConfig>,
    /// `None` disables diary import
    pub diary: Option<DiaryConfig>,
    /// Extra keyword locale merged over the built-in tables
    pub keywords_path: Option<PathBuf>,
}

fn parse_number<T: std::str::FromStr>(name: &str, value: Option<String>, default: T) -> Result<T>
where
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match value {
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .with_context(|| format!("{name} must be a number, got {raw:?}")),
        None => Ok(default),
    }
}

impl BotConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_env_with(|k| std::env::var(k).ok())
    }

    /// Read configuration through `get`, so tests don't touch the process env
    pub fn from_env_with<F>(mut get: F) -> Result<Self>
    where
        F: FnMut(&str) -> Option<String>,
    {
        let telegram_token =
            get("TELEGRAM_BOT_TOKEN").ok_or_else(|| anyhow!("TELEGRAM_BOT_TOKEN must be set"))?;
        let database_url =
            get("DATABASE_URL").ok_or_else(|| anyhow!("DATABASE_URL must be set"))?;
        let max_db_connections = parse_number(
            "DATABASE_MAX_CONNECTIONS",
            get("DATABASE_MAX_CONNECTIONS"),
            DEFAULT_MAX_DB_CONNECTIONS,
        )?;

        let analysis = match get("ANALYSIS_API_KEY").filter(|k| !k.trim().is_empty()) {
            Some(api_key) => {
                let base_url = get("ANALYSIS_BASE_URL")
                    .unwrap_or_else(|| DEFAULT_ANALYSIS_BASE_URL.to_string());
                let mut config = AnalysisConfig::new(&base_url, &api_key);
                if let Some(model) = get("ANALYSIS_MODEL") {
                    config.model = model;
                }
                config.timeout_secs = parse_number(
                    "ANALYSIS_TIMEOUT_SECS",
                    get("ANALYSIS_TIMEOUT_SECS"),
                    DEFAULT_ANALYSIS_TIMEOUT_SECS,
                )?;
                let defaults = BreakerConfig::default();
                config.breaker = BreakerConfig {
                    failure_threshold: parse_number(
                        "ANALYSIS_BREAKER_THRESHOLD",
                        get("ANALYSIS_BREAKER_THRESHOLD"),
                        defaults.failure_threshold,
                    )?,
                    reset_secs: parse_number(
                        "ANALYSIS_BREAKER_RESET_SECS",
                        get("ANALYSIS_BREAKER_RESET_SECS"),
                        defaults.reset_secs,
                    )?,
                };
                Some(config)
            }
            None => None,
        };

        let diary = get("DIARY_ACCESS_TOKEN")
            .filter(|t| !t.trim().is_empty())
            .map(|access_token| DiaryConfig {
                base_url: get("DIARY_BASE_URL")
                    .unwrap_or_else(|| DEFAULT_DIARY_BASE_URL.to_string()),
                access_token,
                timeout_secs: DEFAULT_DIARY_TIMEOUT_SECS,
            });

        Ok(Self {
            telegram_token,
            database_url,
            max_db_connections,
            analysis,
            diary,
            keywords_path: get("KEYWORDS_PATH").map(PathBuf::from),
        })
    }
}
