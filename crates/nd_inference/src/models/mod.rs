use async_trait::async_trait;
use nd_core::config::SummaryProvider;
use nd_core::{Error, Result, Settings};
use reqwest::{RequestBuilder, Response};
use std::fmt;
use std::sync::Arc;
use tracing::{info, warn};

use crate::classify::ProviderFailure;

pub mod gemini;
pub mod openai;

pub use gemini::GeminiModel;
pub use openai::OpenAiModel;

/// Outcome of one text-generation request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GenerationOutcome {
    Text(String),
    Failed(ProviderFailure),
}

impl GenerationOutcome {
    pub fn failed(message: impl Into<String>) -> Self {
        Self::Failed(ProviderFailure::from_raw(message))
    }
}

/// Black-box text-in/text-out generative API.
#[async_trait]
pub trait TextGenerator: Send + Sync + fmt::Debug {
    fn name(&self) -> &str;

    async fn generate(&self, prompt: &str) -> GenerationOutcome;
}

/// Sends `request` and returns the response body on success. Transport and
/// HTTP failures come back as raw text for [`ProviderFailure::from_raw`].
pub(crate) async fn send(request: RequestBuilder) -> std::result::Result<Response, GenerationOutcome> {
    let response = request
        .send()
        .await
        .map_err(|e| GenerationOutcome::failed(format!("request failed: {}", e)))?;

    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(GenerationOutcome::failed(format!("HTTP {}: {}", status.as_u16(), body)))
}

pub(crate) fn http_client(settings: &Settings) -> Result<reqwest::Client> {
    Ok(reqwest::Client::builder()
        .timeout(settings.request_timeout().saturating_mul(4))
        .build()?)
}

/// Builds the configured generator. Returns `None` when summaries should only
/// come from the local fallback.
pub fn create_generator(settings: &Settings) -> Result<Option<Arc<dyn TextGenerator>>> {
    let api_key = match (settings.summary_provider, settings.api_key.clone()) {
        (SummaryProvider::None, _) => {
            info!("🧠 No summary provider configured, using local summaries only");
            return Ok(None);
        }
        (provider, None) => {
            warn!(?provider, "No API key configured, using local summaries only");
            return Ok(None);
        }
        (_, Some(api_key)) => api_key,
    };
    if settings.summary_model.trim().is_empty() {
        return Err(Error::Summarization(format!(
            "{:?} provider configured without a model name",
            settings.summary_provider
        )));
    }

    let generator: Arc<dyn TextGenerator> = match settings.summary_provider {
        SummaryProvider::Openai => Arc::new(OpenAiModel::new(settings, api_key)?),
        SummaryProvider::Gemini | SummaryProvider::None => Arc::new(GeminiModel::new(settings, api_key)?),
    };
    info!("🧠 Summary provider initialized (using {})", generator.name());
    Ok(Some(generator))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_generator_without_api_key() {
        let settings = Settings::default();
        assert!(create_generator(&settings).unwrap().is_none());
    }

    #[test]
    fn test_no_generator_for_none_provider() {
        let settings = Settings {
            api_key: Some("key".to_string()),
            summary_provider: SummaryProvider::None,
            ..Default::default()
        };
        assert!(create_generator(&settings).unwrap().is_none());
    }

    #[test]
    fn test_blank_model_is_summarization_error() {
        let settings = Settings {
            api_key: Some("key".to_string()),
            summary_model: "  ".to_string(),
            ..Default::default()
        };
        assert!(matches!(create_generator(&settings), Err(Error::Summarization(_))));
    }

    #[test]
    fn test_generator_selected_by_provider() {
        let settings = Settings {
            api_key: Some("key".to_string()),
            ..Default::default()
        };
        assert_eq!(create_generator(&settings).unwrap().unwrap().name(), "Gemini");

        let settings = Settings {
            api_key: Some("key".to_string()),
            summary_provider: SummaryProvider::Openai,
            ..Default::default()
        };
        assert_eq!(create_generator(&settings).unwrap().unwrap().name(), "OpenAI-compatible");
    }
}
