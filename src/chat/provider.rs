use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, error};

use crate::config::CohereConfig;

/// Failure talking to the language-model provider. Never shown to clients.
#[derive(Debug, Error)]
pub enum ChatError {
    #[error("chat provider is not configured")]
    NotConfigured,
    #[error("provider request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("provider returned status {status}: {body}")]
    Status { status: u16, body: String },
    #[error("provider returned no text")]
    Empty,
}

#[async_trait]
pub trait ChatProvider: Send + Sync {
    async fn complete(&self, instructions: &str, input: &str) -> Result<String, ChatError>;
}

/// Cohere `generate` endpoint.
pub struct CohereProvider {
    client: Client,
    api_key: Option<String>,
    base_url: String,
    model: Option<String>,
    max_tokens: u32,
}

#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    prompt: String,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    model: Option<&'a str>,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    generations: Vec<Generation>,
}

#[derive(Debug, Deserialize)]
struct Generation {
    text: String,
}

impl CohereProvider {
    pub fn new(cfg: &CohereConfig) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .unwrap_or_else(|e| {
                error!(error = %e, "failed to build HTTP client with timeout, using default client");
                Client::new()
            });

        Self {
            client,
            api_key: cfg.api_key.clone(),
            base_url: cfg.base_url.trim_end_matches('/').to_string(),
            model: cfg.model.clone(),
            max_tokens: cfg.max_tokens,
        }
    }
}

#[async_trait]
impl ChatProvider for CohereProvider {
    async fn complete(&self, instructions: &str, input: &str) -> Result<String, ChatError> {
        let api_key = self.api_key.as_deref().ok_or(ChatError::NotConfigured)?;
        let body = GenerateRequest {
            prompt: format!("{instructions}\n\nUser: {input}\nAssistant:"),
            max_tokens: self.max_tokens,
            model: self.model.as_deref(),
        };

        let res = self
            .client
            .post(format!("{}/generate", self.base_url))
            .bearer_auth(api_key)
            .json(&body)
            .send()
            .await?;

        let status = res.status();
        if !status.is_success() {
            let body = res.text().await.unwrap_or_default();
            return Err(ChatError::Status {
                status: status.as_u16(),
                body: body.chars().take(200).collect(),
            });
        }

        let parsed: GenerateResponse = res.json().await?;
        let text = parsed
            .generations
            .into_iter()
            .next()
            .map(|g| g.text.trim().to_string())
            .filter(|t| !t.is_empty())
            .ok_or(ChatError::Empty)?;
        debug!(chars = text.len(), "cohere generation received");
        Ok(text)
    }
}
