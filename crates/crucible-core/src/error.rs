//! Error taxonomy for the detonation pipeline.
//!
//! Two kinds of faults cross component boundaries: harness faults
//! ([`ProvisioningError`]) and collaborator faults ([`CollaboratorError`]).
//! Everything the sandbox observes about a sample is data, never an error:
//! a kernel kill or a blocked connection classifies into a
//! [`Verdict`](crate::sandbox::Verdict) and is recorded, not thrown.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Pipeline stages, used to name where an iteration stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Generate,
    SandboxRun,
    ScanOriginal,
    Sanitize,
    ScanSanitized,
    Record,
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Generate => "generate",
            Self::SandboxRun => "sandbox_run",
            Self::ScanOriginal => "scan_original",
            Self::Sanitize => "sanitize",
            Self::ScanSanitized => "scan_sanitized",
            Self::Record => "record",
        };
        write!(f, "{name}")
    }
}

/// The isolation environment failed to start.
///
/// A harness-level fault, not a statement about the sample under test.
/// Never recorded as a verdict.
#[derive(Debug, Error)]
pub enum ProvisioningError {
    #[error("docker is not available: {0}")]
    DockerUnavailable(String),

    #[error("sandbox image '{0}' not found")]
    ImageMissing(String),

    #[error("failed to stage sample file: {0}")]
    Staging(#[source] std::io::Error),

    #[error("failed to render seccomp profile: {0}")]
    SeccompProfile(#[source] serde_json::Error),

    #[error("failed to launch container: {0}")]
    Launch(#[source] std::io::Error),

    #[error("container failed to start (docker exit {code}): {detail}")]
    ContainerStart { code: i32, detail: String },
}

/// A generation or sanitization call failed or returned unusable text.
#[derive(Debug, Error)]
pub enum CollaboratorError {
    #[error("provider request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("provider returned HTTP {status}: {detail}")]
    Status { status: u16, detail: String },

    #[error("no code block found in model response")]
    NoCode,

    #[error("retry budget exhausted after {attempts} attempts: {last}")]
    RetriesExhausted { attempts: u32, last: String },

    #[error("call cancelled")]
    Cancelled,
}

impl CollaboratorError {
    /// Transport-level faults are worth retrying; unusable text and
    /// cancellation are not.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Request(_) | Self::Status { .. })
    }
}
