//! Provider error classification.
//!
//! Providers report rate limits and retry hints only inside free-form error
//! text. Everything that sniffs those strings lives here; the retry loop only
//! sees [`ProviderFailure`].

use lazy_static::lazy_static;
use regex::Regex;
use std::time::Duration;

lazy_static! {
    static ref RETRY_DELAY_JSON: Regex =
        Regex::new(r#""retryDelay"\s*:\s*"(\d+(?:\.\d+)?)s""#).unwrap();
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ErrorClass {
    pub rate_limited: bool,
    pub retry_after: Option<Duration>,
}

/// Classifies a raw provider error message. Unrecognised retry hints are
/// ignored, leaving the caller to its own backoff.
pub fn classify_error(raw: &str) -> ErrorClass {
    let lowered = raw.to_lowercase();
    let rate_limited = raw.contains("429")
        || lowered.contains("quota")
        || lowered.contains("resource_exhausted")
        || lowered.contains("rate limit");

    ErrorClass {
        rate_limited,
        retry_after: retry_delay_hint(raw),
    }
}

fn retry_delay_hint(raw: &str) -> Option<Duration> {
    // gRPC-style: `retry_delay { seconds: 17 }`
    if raw.contains("retry_delay") {
        if let Some((_, rest)) = raw.split_once("seconds:") {
            let seconds = rest.split('}').next().unwrap_or("").trim();
            if let Ok(seconds) = seconds.parse::<u64>() {
                if seconds > 0 {
                    return Some(Duration::from_secs(seconds));
                }
            }
        }
    }

    // REST JSON: `"retryDelay": "17s"`
    RETRY_DELAY_JSON
        .captures(raw)
        .and_then(|caps| caps.get(1))
        .and_then(|m| m.as_str().parse::<f64>().ok())
        .filter(|secs| *secs > 0.0 && secs.is_finite())
        .map(Duration::from_secs_f64)
}

/// A failed generation attempt, already classified.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderFailure {
    pub message: String,
    pub rate_limited: bool,
    pub retry_after: Option<Duration>,
}

impl ProviderFailure {
    pub fn from_raw(message: impl Into<String>) -> Self {
        let message = message.into();
        let class = classify_error(&message);
        Self {
            message,
            rate_limited: class.rate_limited,
            retry_after: class.retry_after,
        }
    }
}
