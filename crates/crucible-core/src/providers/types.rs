//! Provider-agnostic collaborator types.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::CollaboratorError;

/// Which fixed prompt a collaborator call runs under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PromptRole {
    /// Produce a fresh candidate sample.
    Generator,
    /// Rewrite an existing sample.
    Sanitizer,
}

impl std::fmt::Display for PromptRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Generator => write!(f, "generator"),
            Self::Sanitizer => write!(f, "sanitizer"),
        }
    }
}

/// Trait all code-writing collaborators implement.
///
/// The pipeline neither knows nor cares how the text is produced. A
/// provider turns a role plus code context into raw model output;
/// code-fence extraction happens downstream.
#[async_trait]
pub trait CodeWriter: Send + Sync {
    /// Provider name for logs, e.g. "ollama".
    fn provider_name(&self) -> &str;

    /// Model identifier, e.g. "llama3:8b".
    fn model(&self) -> &str;

    /// Raw model output for the given role. `context` carries the code
    /// being rewritten on sanitizer calls and is empty for generator
    /// calls.
    async fn write_code(
        &self,
        role: PromptRole,
        context: &str,
    ) -> Result<String, CollaboratorError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Compile-time verification that `CodeWriter` is object-safe.
    #[test]
    fn test_code_writer_is_object_safe() {
        fn _assert_object_safe(_: &dyn CodeWriter) {}
    }

    #[test]
    fn test_prompt_role_display() {
        assert_eq!(PromptRole::Generator.to_string(), "generator");
        assert_eq!(PromptRole::Sanitizer.to_string(), "sanitizer");
    }

    #[test]
    fn test_prompt_role_serde() {
        assert_eq!(
            serde_json::to_string(&PromptRole::Sanitizer).unwrap(),
            "\"sanitizer\""
        );
    }
}
