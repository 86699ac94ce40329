//! Code samples flowing through the pipeline.

use serde::{Deserialize, Serialize};

/// Which side of the sanitization boundary a sample sits on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SampleRole {
    Original,
    Sanitized,
}

/// An opaque piece of code under test, tagged with its role and the
/// sequence id of the iteration that produced it. Immutable once built.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CodeSample {
    pub id: u64,
    pub role: SampleRole,
    pub text: String,
}

impl CodeSample {
    pub fn original(id: u64, text: impl Into<String>) -> Self {
        Self {
            id,
            role: SampleRole::Original,
            text: text.into(),
        }
    }

    pub fn sanitized(id: u64, text: impl Into<String>) -> Self {
        Self {
            id,
            role: SampleRole::Sanitized,
            text: text.into(),
        }
    }

    /// Sample size in characters, the unit the reduction ratio is
    /// computed over.
    pub fn len_chars(&self) -> usize {
        self.text.chars().count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_constructors_set_role() {
        let orig = CodeSample::original(3, "print('hi')");
        assert_eq!(orig.role, SampleRole::Original);
        assert_eq!(orig.id, 3);

        let san = CodeSample::sanitized(3, "print('hi')");
        assert_eq!(san.role, SampleRole::Sanitized);
    }

    #[test]
    fn test_len_chars_counts_chars_not_bytes() {
        let s = CodeSample::original(1, "é=1");
        assert_eq!(s.len_chars(), 3);
        assert_eq!(s.text.len(), 4);
    }

    #[test]
    fn test_serde_roundtrip() {
        let s = CodeSample::original(7, "import os");
        let json = serde_json::to_string(&s).unwrap();
        assert!(json.contains("\"original\""));
        let parsed: CodeSample = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, s);
    }
}
