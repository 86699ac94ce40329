//! Anthropic collaborator, via the Messages API.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::CollaboratorConfig;
use crate::error::CollaboratorError;
use crate::prompts;

use super::types::{CodeWriter, PromptRole};

const MESSAGES_URL: &str = "https://api.anthropic.com/v1/messages";
const API_VERSION: &str = "2023-06-01";

#[derive(Debug, Serialize)]
struct MessagesRequest {
    model: String,
    max_tokens: u32,
    temperature: f32,
    messages: Vec<Message>,
}

#[derive(Debug, Serialize)]
struct Message {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    content: Vec<ContentBlock>,
}

#[derive(Debug, Deserialize)]
struct ContentBlock {
    #[serde(rename = "type")]
    block_type: String,
    text: Option<String>,
}

/// Client for the Anthropic Messages API.
pub struct AnthropicWriter {
    client: Client,
    config: CollaboratorConfig,
    api_key: String,
}

impl AnthropicWriter {
    pub fn new(config: CollaboratorConfig, api_key: String) -> Self {
        Self {
            client: Client::new(),
            config,
            api_key,
        }
    }
}

#[async_trait]
impl CodeWriter for AnthropicWriter {
    fn provider_name(&self) -> &str {
        "anthropic"
    }

    fn model(&self) -> &str {
        &self.config.model
    }

    async fn write_code(
        &self,
        role: PromptRole,
        context: &str,
    ) -> Result<String, CollaboratorError> {
        let request = MessagesRequest {
            model: self.config.model.clone(),
            max_tokens: self.config.max_tokens,
            temperature: prompts::temperature_for(role),
            messages: vec![Message {
                role: "user".to_string(),
                content: prompts::prompt_for(role, context),
            }],
        };

        debug!("anthropic: {} call (model={})", role, self.config.model);

        let response = self
            .client
            .post(MESSAGES_URL)
            .timeout(Duration::from_secs(self.config.request_timeout_secs))
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", API_VERSION)
            .header("content-type", "application/json")
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

        let parsed: MessagesResponse = response.json().await?;
        let text = parsed
            .content
            .iter()
            .filter_map(|block| {
                if block.block_type == "text" {
                    block.text.clone()
                } else {
                    None
                }
            })
            .collect::<Vec<_>>()
            .join("\n");
        Ok(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_response_text_blocks_joined() {
        let raw = r#"{"content":[
            {"type":"text","text":"```python"},
            {"type":"tool_use"},
            {"type":"text","text":"```"}
        ]}"#;
        let parsed: MessagesResponse = serde_json::from_str(raw).unwrap();
        let text = parsed
            .content
            .iter()
            .filter_map(|b| {
                if b.block_type == "text" {
                    b.text.clone()
                } else {
                    None
                }
            })
            .collect::<Vec<_>>()
            .join("\n");
        assert_eq!(text, "```python\n```");
    }

    #[test]
    fn test_request_shape() {
        let request = MessagesRequest {
            model: "claude-sonnet-4-5".to_string(),
            max_tokens: 1024,
            temperature: 0.3,
            messages: vec![Message {
                role: "user".to_string(),
                content: "rewrite this".to_string(),
            }],
        };
        let json = serde_json::to_string(&request).unwrap();
        assert!(json.contains("\"max_tokens\":1024"));
        assert!(json.contains("\"role\":\"user\""));
    }
}
