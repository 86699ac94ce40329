//! Collaborator providers.
//!
//! Generation and sanitization are external calls to an LLM backend.
//! Providers implement the [`CodeWriter`] trait; the pipeline treats them
//! as opaque text sources.

pub mod anthropic;
pub mod ollama;
pub mod types;

use std::sync::Arc;

use anyhow::{Context, Result, bail};

use crate::config::CollaboratorConfig;

pub use anthropic::AnthropicWriter;
pub use ollama::OllamaWriter;
pub use types::{CodeWriter, PromptRole};

/// Builds the configured collaborator.
pub fn create_writer(config: &CollaboratorConfig) -> Result<Arc<dyn CodeWriter>> {
    match config.provider.as_str() {
        "ollama" => Ok(Arc::new(OllamaWriter::new(config.clone()))),
        "anthropic" => {
            let api_key = std::env::var(&config.api_key_env)
                .with_context(|| format!("missing API key in ${}", config.api_key_env))?;
            Ok(Arc::new(AnthropicWriter::new(config.clone(), api_key)))
        }
        other => bail!("unknown collaborator provider '{other}'"),
    }
}
