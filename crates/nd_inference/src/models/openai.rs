use async_trait::async_trait;
use nd_core::{Result, Settings};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::fmt;

use super::{send, GenerationOutcome, TextGenerator};

const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

#[derive(Serialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: Message,
}

#[derive(Deserialize)]
struct Message {
    #[serde(default)]
    content: Option<String>,
}

/// Any OpenAI-compatible chat-completions endpoint (OpenAI, DeepSeek, Ollama, ...).
pub struct OpenAiModel {
    client: Client,
    api_key: String,
    base_url: String,
    model: String,
}

impl OpenAiModel {
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

impl fmt::Debug for OpenAiModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OpenAiModel")
            .field("client", &"<reqwest::Client>")
            .field("api_key", &"<redacted>")
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .finish()
    }
}

#[async_trait]
impl TextGenerator for OpenAiModel {
    fn name(&self) -> &str {
        "OpenAI-compatible"
    }

    async fn generate(&self, prompt: &str) -> GenerationOutcome {
        let request = ChatRequest {
            model: self.model.clone(),
            messages: vec![ChatMessage {
                role: "user".to_string(),
                content: prompt.to_string(),
            }],
        };

        let response = match send(
            self.client
                .post(format!("{}/chat/completions", self.base_url))
                .header("Authorization", format!("Bearer {}", self.api_key))
                .json(&request),
        )
        .await
        {
            Ok(response) => response,
            Err(failure) => return failure,
        };

        match response.json::<ChatResponse>().await {
            Ok(body) => GenerationOutcome::Text(
                body.choices
                    .into_iter()
                    .next()
                    .and_then(|choice| choice.message.content)
                    .unwrap_or_default(),
            ),
            Err(e) => GenerationOutcome::failed(format!("invalid chat response: {}", e)),
        }
    }
}
