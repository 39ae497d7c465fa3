use nd_core::config::{
    DEFAULT_MAX_API_RETRIES, DEFAULT_RATE_LIMIT_DELAY, DEFAULT_SUMMARY_MAX_INPUT_CHARS,
};
use nd_core::logging::short;
use nd_core::{compute_backoff, RateLimiter, Result, Settings};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

use crate::budget::{UsageBudget, RATE_LIMIT_PENALTY, SUCCESS_COST};
use crate::classify::ProviderFailure;
use crate::models::{create_generator, GenerationOutcome, TextGenerator};

/// Content shorter than this is not worth summarizing.
pub const MIN_CONTENT_CHARS: usize = 100;
/// Below this the extractive fallback gives a placeholder instead.
pub const MIN_FALLBACK_CHARS: usize = 50;
const FALLBACK_SENTENCES: usize = 3;
const BACKOFF_FACTOR: f64 = 2.0;

#[derive(Debug, Clone)]
pub struct SummarizerConfig {
    pub max_retries: u32,
    pub min_delay: Duration,
    pub backoff_factor: f64,
    pub max_input_chars: usize,
    pub use_fallback: bool,
}

impl SummarizerConfig {
    pub fn from_settings(settings: &Settings) -> Result<Self> {
        Ok(Self {
            max_retries: settings.max_api_retries,
            min_delay: settings.summary_min_delay()?,
            backoff_factor: BACKOFF_FACTOR,
            max_input_chars: settings.summary_max_input_chars,
            use_fallback: settings.use_fallback_summary,
        })
    }
}

impl Default for SummarizerConfig {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_API_RETRIES,
            min_delay: Duration::from_secs_f64(DEFAULT_RATE_LIMIT_DELAY * 2.0),
            backoff_factor: BACKOFF_FACTOR,
            max_input_chars: DEFAULT_SUMMARY_MAX_INPUT_CHARS,
            use_fallback: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SummaryOutcome {
    /// Content was missing or below [`MIN_CONTENT_CHARS`]; nothing was attempted.
    TooShort,
    Generated(String),
    Fallback(String),
    /// The API could not be used and the local fallback is disabled.
    Unavailable,
}

impl SummaryOutcome {
    pub fn into_text(self) -> Option<String> {
        match self {
            SummaryOutcome::Generated(text) | SummaryOutcome::Fallback(text) => Some(text),
            SummaryOutcome::TooShort | SummaryOutcome::Unavailable => None,
        }
    }
}

/// Summaries via an external generator, paced by its own rate limiter and
/// gated by a shared [`UsageBudget`], with a local extractive fallback.
#[derive(Debug)]
pub struct Summarizer {
    generator: Option<Arc<dyn TextGenerator>>,
    limiter: RateLimiter,
    budget: Arc<UsageBudget>,
    config: SummarizerConfig,
}

impl Summarizer {
    pub fn new(
        generator: Option<Arc<dyn TextGenerator>>,
        budget: Arc<UsageBudget>,
        config: SummarizerConfig,
    ) -> Self {
        Self {
            generator,
            limiter: RateLimiter::new(config.min_delay),
            budget,
            config,
        }
    }

    pub fn from_settings(settings: &Settings, budget: Arc<UsageBudget>) -> Result<Self> {
        Ok(Self::new(
            create_generator(settings)?,
            budget,
            SummarizerConfig::from_settings(settings)?,
        ))
    }

    pub fn budget(&self) -> &Arc<UsageBudget> {
        &self.budget
    }

    pub async fn summarize(&self, content: &str, title: &str) -> SummaryOutcome {
        if content.chars().count() < MIN_CONTENT_CHARS {
            warn!(title = %short(title, 80), "Article content is too short to summarize");
            return SummaryOutcome::TooShort;
        }

        let api_summary = match &self.generator {
            Some(generator) if self.budget.is_exhausted() => {
                warn!(
                    provider = generator.name(),
                    used = self.budget.used(),
                    ceiling = self.budget.ceiling(),
                    "Summary budget exhausted for this window, skipping API"
                );
                None
            }
            Some(generator) => self.summarize_with_retry(generator.as_ref(), content, title).await,
            None => None,
        };

        if let Some(summary) = api_summary {
            return SummaryOutcome::Generated(summary);
        }
        if !self.config.use_fallback {
            return SummaryOutcome::Unavailable;
        }
        info!(title = %short(title, 80), "Using fallback summarization");
        SummaryOutcome::Fallback(fallback_summary(content, title))
    }

    async fn summarize_with_retry(
        &self,
        generator: &dyn TextGenerator,
        content: &str,
        title: &str,
    ) -> Option<String> {
        let prompt = build_prompt(content, title, self.config.max_input_chars);
        let max = self.config.max_retries;

        for attempt in 0..max {
            self.limiter.await_slot().await;

            let failure = match generator.generate(&prompt).await {
                GenerationOutcome::Text(text) if !text.trim().is_empty() => {
                    self.budget.charge(SUCCESS_COST);
                    info!(title = %short(title, 80), provider = generator.name(), "✨ Generated summary");
                    return Some(text.trim().to_string());
                }
                GenerationOutcome::Text(_) => ProviderFailure::from_raw("empty response"),
                GenerationOutcome::Failed(failure) => failure,
            };

            if failure.rate_limited {
                self.budget.charge(RATE_LIMIT_PENALTY);
            }
            let delay = failure.retry_after.unwrap_or_else(|| {
                compute_backoff(attempt, self.config.min_delay, self.config.backoff_factor)
            });

            warn!(
                attempt = attempt + 1,
                max,
                title = %short(title, 80),
                rate_limited = failure.rate_limited,
                retry_in_ms = delay.as_millis() as u64,
                error = %short(&failure.message, 300),
                "Summary attempt failed"
            );

            if attempt + 1 < max {
                tokio::time::sleep(delay).await;
            } else {
                error!(title = %short(title, 80), "All {} attempts to generate summary failed", max);
            }
        }
        None
    }
}

fn build_prompt(content: &str, title: &str, max_input_chars: usize) -> String {
    let truncated: String = content.chars().take(max_input_chars).collect();
    debug!(
        original_chars = content.chars().count(),
        sent_chars = truncated.chars().count(),
        "Building summary prompt"
    );
    format!(
        "Summarize the main points of the following news article in 3-5 lines, \
         written in the same language as the article.\n\nTitle: {}\n\n{}",
        title, truncated
    )
}

/// Extractive summary: the first three sentences, or a placeholder when the
/// content is too short for that.
pub fn fallback_summary(content: &str, title: &str) -> String {
    if content.trim().chars().count() < MIN_FALLBACK_CHARS {
        return format!("{}: summary not available, see the full article.", title.trim());
    }
    let sentences: Vec<&str> = content
        .split('.')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .take(FALLBACK_SENTENCES)
        .collect();
    format!("{}.", sentences.join(". "))
}
