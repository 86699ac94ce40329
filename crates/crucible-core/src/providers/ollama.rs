//! Ollama collaborator.
//!
//! Calls `POST {host}/api/generate` with a single prompt and
//! `stream: false`, which returns the whole completion in one response
//! body. Temperature is chosen per role.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::CollaboratorConfig;
use crate::error::CollaboratorError;
use crate::prompts;

use super::types::{CodeWriter, PromptRole};

const DEFAULT_OLLAMA_HOST: &str = "http://localhost:11434";

#[derive(Debug, Serialize)]
struct GenerateRequest {
    model: String,
    prompt: String,
    stream: bool,
    options: GenerateOptions,
}

#[derive(Debug, Serialize)]
struct GenerateOptions {
    temperature: f32,
    num_predict: u32,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    response: String,
}

/// Client for a local Ollama server.
pub struct OllamaWriter {
    client: Client,
    config: CollaboratorConfig,
    host: String,
}

impl OllamaWriter {
    pub fn new(config: CollaboratorConfig) -> Self {
        let host = config
            .host
            .clone()
            .unwrap_or_else(|| DEFAULT_OLLAMA_HOST.to_string());
        let host = host.trim_end_matches('/').to_string();
        Self {
            client: Client::new(),
            config,
            host,
        }
    }

    /// Probes the server's tag listing, the cheapest liveness check it
    /// offers.
    pub async fn is_available(&self) -> bool {
        self.client
            .get(format!("{}/api/tags", self.host))
            .timeout(Duration::from_secs(5))
            .send()
            .await
            .map(|resp| resp.status().is_success())
            .unwrap_or(false)
    }
}

#[async_trait]
impl CodeWriter for OllamaWriter {
    fn provider_name(&self) -> &str {
        "ollama"
    }

    fn model(&self) -> &str {
        &self.config.model
    }

    async fn write_code(
        &self,
        role: PromptRole,
        context: &str,
    ) -> Result<String, CollaboratorError> {
        let request = GenerateRequest {
            model: self.config.model.clone(),
            prompt: prompts::prompt_for(role, context),
            stream: false,
            options: GenerateOptions {
                temperature: prompts::temperature_for(role),
                num_predict: self.config.max_tokens,
            },
        };

        debug!(
            "ollama: {} call to {} (model={})",
            role, self.host, self.config.model,
        );

        let response = self
            .client
            .post(format!("{}/api/generate", self.host))
            .timeout(Duration::from_secs(self.config.request_timeout_secs))
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(CollaboratorError::Status {
                status: status.as_u16(),
                detail: response.text().await.unwrap_or_default(),
            });
        }

        let parsed: GenerateResponse = response.json().await?;
        Ok(parsed.response)
    }
}
