use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use clap::{Args, ValueEnum};

use crate::error::{Error, Result};

pub const DEFAULT_BASE_URL: &str = "https://vnexpress.net/tin-tuc-24h";
pub const DEFAULT_SUMMARY_MODEL: &str = "gemini-1.5-flash";
pub const DEFAULT_DATABASE_PATH: &str = "articles.db";
pub const DEFAULT_RATE_LIMIT_DELAY: f64 = 3.0;
pub const DEFAULT_REQUEST_TIMEOUT: u64 = 15;
pub const DEFAULT_MAX_API_RETRIES: u32 = 3;
pub const DEFAULT_BATCH_SIZE: usize = 5;
pub const DEFAULT_BATCH_DELAY: u64 = 10;
pub const DEFAULT_BUDGET_CEILING: u32 = 50;
pub const DEFAULT_BUDGET_WINDOW: u64 = 3600;
pub const DEFAULT_SUMMARY_MAX_INPUT_CHARS: usize = 4000;
pub const DEFAULT_INTERVAL_MINUTES: u64 = 30;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum SummaryProvider {
    Gemini,
    Openai,
    None,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum StorageKind {
    Memory,
    Sqlite,
}

/// Runtime settings. Every field can come from a flag or from the
/// environment (after `.env` has been loaded by the binary).
#[derive(Args, Clone)]
pub struct Settings {
    #[arg(long, env = "GEMINI_API_KEY", hide_env_values = true)]
    pub api_key: Option<String>,

    #[arg(long, env = "SUMMARY_PROVIDER", value_enum, default_value = "gemini")]
    pub summary_provider: SummaryProvider,

    #[arg(long, env = "SUMMARY_MODEL", default_value = DEFAULT_SUMMARY_MODEL)]
    pub summary_model: String,

    /// Overrides the provider's default endpoint.
    #[arg(long, env = "SUMMARY_API_BASE")]
    pub summary_api_base: Option<String>,

    #[arg(long, env = "MAX_API_RETRIES", default_value_t = DEFAULT_MAX_API_RETRIES)]
    pub max_api_retries: u32,

    /// Seconds between two page fetches.
    #[arg(long, env = "RATE_LIMIT_DELAY", default_value_t = DEFAULT_RATE_LIMIT_DELAY)]
    pub rate_limit_delay: f64,

    #[arg(long, env = "MAX_ARTICLES_PER_BATCH", default_value_t = DEFAULT_BATCH_SIZE)]
    pub max_articles_per_batch: usize,

    #[arg(long, env = "BATCH_DELAY_SECOND", default_value_t = DEFAULT_BATCH_DELAY)]
    pub batch_delay_seconds: u64,

    #[arg(long, env = "USE_FALLBACK_SUMMARY", default_value_t = true, action = clap::ArgAction::Set)]
    pub use_fallback_summary: bool,

    #[arg(long, env = "BASE_URL", default_value = DEFAULT_BASE_URL)]
    pub base_url: String,

    #[arg(long, env = "REQUEST_TIMEOUT", default_value_t = DEFAULT_REQUEST_TIMEOUT)]
    pub request_timeout: u64,

    #[arg(long, env = "SUMMARY_BUDGET_CEILING", default_value_t = DEFAULT_BUDGET_CEILING)]
    pub summary_budget_ceiling: u32,

    #[arg(long, env = "SUMMARY_BUDGET_WINDOW_SECS", default_value_t = DEFAULT_BUDGET_WINDOW)]
    pub summary_budget_window_secs: u64,

    #[arg(long, env = "SUMMARY_MAX_INPUT_CHARS", default_value_t = DEFAULT_SUMMARY_MAX_INPUT_CHARS)]
    pub summary_max_input_chars: usize,

    #[arg(long, env = "STORAGE", value_enum, default_value = "memory")]
    pub storage: StorageKind,

    #[arg(long, env = "DATABASE_PATH", default_value = DEFAULT_DATABASE_PATH)]
    pub database_path: PathBuf,

    #[arg(long, env = "SCHEDULER_INTERVAL_MINUTES", default_value_t = DEFAULT_INTERVAL_MINUTES)]
    pub scheduler_interval_minutes: u64,
}

impl Settings {
    /// Rejects values that cannot be turned into timers.
    pub fn validate(&self) -> Result<()> {
        self.summary_min_delay().map(|_| ())
    }

    pub fn rate_limit_delay(&self) -> Result<Duration> {
        Duration::try_from_secs_f64(self.rate_limit_delay.max(0.0)).map_err(|e| {
            Error::Config(format!("RATE_LIMIT_DELAY={}: {}", self.rate_limit_delay, e))
        })
    }

    /// The summarizer paces itself at twice the page-fetch delay.
    pub fn summary_min_delay(&self) -> Result<Duration> {
        self.rate_limit_delay()?.checked_mul(2).ok_or_else(|| {
            Error::Config(format!("RATE_LIMIT_DELAY={} is too large", self.rate_limit_delay))
        })
    }

    pub fn batch_delay(&self) -> Duration {
        Duration::from_secs(self.batch_delay_seconds)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout)
    }

    pub fn summary_budget_window(&self) -> Duration {
        Duration::from_secs(self.summary_budget_window_secs)
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            api_key: None,
            summary_provider: SummaryProvider::Gemini,
            summary_model: DEFAULT_SUMMARY_MODEL.to_string(),
            summary_api_base: None,
            max_api_retries: DEFAULT_MAX_API_RETRIES,
            rate_limit_delay: DEFAULT_RATE_LIMIT_DELAY,
            max_articles_per_batch: DEFAULT_BATCH_SIZE,
            batch_delay_seconds: DEFAULT_BATCH_DELAY,
            use_fallback_summary: true,
            base_url: DEFAULT_BASE_URL.to_string(),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            summary_budget_ceiling: DEFAULT_BUDGET_CEILING,
            summary_budget_window_secs: DEFAULT_BUDGET_WINDOW,
            summary_max_input_chars: DEFAULT_SUMMARY_MAX_INPUT_CHARS,
            storage: StorageKind::Memory,
            database_path: PathBuf::from(DEFAULT_DATABASE_PATH),
            scheduler_interval_minutes: DEFAULT_INTERVAL_MINUTES,
        }
    }
}

impl fmt::Debug for Settings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Settings")
            .field("api_key", &self.api_key.as_deref().map(|_| "<redacted>"))
            .field("summary_provider", &self.summary_provider)
            .field("summary_model", &self.summary_model)
            .field("summary_api_base", &self.summary_api_base)
            .field("max_api_retries", &self.max_api_retries)
            .field("rate_limit_delay", &self.rate_limit_delay)
            .field("max_articles_per_batch", &self.max_articles_per_batch)
            .field("batch_delay_seconds", &self.batch_delay_seconds)
            .field("use_fallback_summary", &self.use_fallback_summary)
            .field("base_url", &self.base_url)
            .field("request_timeout", &self.request_timeout)
            .field("summary_budget_ceiling", &self.summary_budget_ceiling)
            .field("summary_budget_window_secs", &self.summary_budget_window_secs)
            .field("summary_max_input_chars", &self.summary_max_input_chars)
            .field("storage", &self.storage)
            .field("database_path", &self.database_path)
            .field("scheduler_interval_minutes", &self.scheduler_interval_minutes)
            .finish()
    }
}
