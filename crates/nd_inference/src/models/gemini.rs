use async_trait::async_trait;
use nd_core::{Result, Settings};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::fmt;

use super::{send, GenerationOutcome, TextGenerator};

const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

#[derive(Serialize)]
struct Part {
    text: String,
}

#[derive(Serialize)]
struct Content {
    parts: Vec<Part>,
}

#[derive(Serialize)]
struct GenerateRequest {
    contents: Vec<Content>,
}

#[derive(Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Deserialize)]
struct CandidatePart {
    #[serde(default)]
    text: String,
}

impl GenerateResponse {
    fn text(self) -> String {
        self.candidates
            .into_iter()
            .next()
            .and_then(|candidate| candidate.content)
            .map(|content| {
                content
                    .parts
                    .into_iter()
                    .map(|part| part.text)
                    .collect::<String>()
            })
            .unwrap_or_default()
    }
}

/// Google Gemini `generateContent` REST client.
pub struct GeminiModel {
    client: Client,
    api_key: String,
    base_url: String,
    model: String,
}

impl GeminiModel {
    pub fn new(settings: &Settings, api_key: String) -> Result<Self> {
        Ok(Self {
            client: super::http_client(settings)?,
            api_key,
            base_url: settings
                .summary_api_base
                .clone()
                .unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            model: settings.summary_model.clone(),
        })
    }
}

impl fmt::Debug for GeminiModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GeminiModel")
            .field("client", &"<reqwest::Client>")
            .field("api_key", &"<redacted>")
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .finish()
    }
}

#[async_trait]
impl TextGenerator for GeminiModel {
    fn name(&self) -> &str {
        "Gemini"
    }

    async fn generate(&self, prompt: &str) -> GenerationOutcome {
        let request = GenerateRequest {
            contents: vec![Content {
                parts: vec![Part {
                    text: prompt.to_string(),
                }],
            }],
        };

        let response = match send(
            self.client
                .post(format!("{}/models/{}:generateContent", self.base_url, self.model))
                .query(&[("key", self.api_key.as_str())])
                .json(&request),
        )
        .await
        {
            Ok(response) => response,
            Err(failure) => return failure,
        };

        match response.json::<GenerateResponse>().await {
            Ok(body) => GenerationOutcome::Text(body.text()),
            Err(e) => GenerationOutcome::failed(format!("invalid Gemini response: {}", e)),
        }
    }
}
