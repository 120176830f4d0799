use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::AiSettings;

#[derive(Error, Debug)]
pub enum GenerateError {
    #[error("model request timed out")]
    Timeout,

    #[error("model endpoint returned HTTP {0}")]
    Status(u16),

    #[error("network error: {0}")]
    Network(String),
}

/// Seam over the text-generation backend. The production impl talks to a
/// local Ollama server; tests script responses.
#[async_trait]
pub trait TextGenerator: Send + Sync {
    async fn generate(&self, model: &str, prompt: &str) -> Result<String, GenerateError>;
}

#[derive(Serialize)]
struct OllamaRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
    /// Asks the server for JSON-mode output.
    format: &'a str,
}

#[derive(Deserialize, Default)]
#[serde(default)]
struct OllamaResponse {
    response: String,
}

/// Client for the Ollama `/api/generate` endpoint, non-streaming.
pub struct OllamaGenerator {
    client: reqwest::Client,
    endpoint: String,
    timeout: Duration,
}

impl OllamaGenerator {
    pub fn new(endpoint: impl Into<String>, timeout: Duration) -> Self {
        let endpoint = endpoint.into();
        OllamaGenerator {
            client: reqwest::Client::new(),
            endpoint: endpoint.trim_end_matches('/').to_string(),
            timeout,
        }
    }

    /// Builds the generator from the configured endpoint and per-call
    /// timeout.
    pub fn from_settings(settings: &AiSettings) -> Self {
        Self::new(
            settings.endpoint.clone(),
            Duration::from_secs(settings.timeout_secs),
        )
    }
}

#[async_trait]
impl TextGenerator for OllamaGenerator {
    async fn generate(&self, model: &str, prompt: &str) -> Result<String, GenerateError> {
        let url = format!("{}/api/generate", self.endpoint);
        let request = OllamaRequest {
            model,
            prompt,
            stream: false,
            format: "json",
        };

        let response = self
            .client
            .post(&url)
            .timeout(self.timeout)
            .json(&request)
            .send()
            .await
            .map_err(map_reqwest_error)?;

        let status = response.status();
        if !status.is_success() {
            return Err(GenerateError::Status(status.as_u16()));
        }

        let parsed: OllamaResponse = response.json().await.map_err(map_reqwest_error)?;
        Ok(parsed.response)
    }
}

fn map_reqwest_error(e: reqwest::Error) -> GenerateError {
    if e.is_timeout() {
        GenerateError::Timeout
    } else {
        GenerateError::Network(e.to_string())
    }
}
