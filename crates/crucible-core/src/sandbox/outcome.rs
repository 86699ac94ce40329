//! Execution outcomes and verdict classification.
//!
//! An [`ExecutionOutcome`] is the raw observation of one sandboxed run,
//! produced exactly once and never mutated. The [`Verdict`] is derived
//! from it deterministically; classification relies on observable
//! termination signals and output signatures, never on whether the sample
//! appeared to handle its own errors.

use serde::{Deserialize, Serialize};

/// 128 + SIGKILL, reported when the kernel kills the process outright
/// (seccomp kill rule or the OOM killer).
pub const EXIT_CODE_SIGKILL: i32 = 137;
/// 128 + SIGSYS, reported for seccomp kills on kernels that deliver the
/// signal instead of SIGKILL.
pub const EXIT_CODE_SIGSYS: i32 = 159;

/// Output fragments that identify a transport-layer network failure
/// surfacing through the language runtime.
const CONNECTIVITY_FAILURE_SIGNATURES: &[&str] = &[
    "network is unreachable",
    "connection refused",
    "name or service not known",
    "temporary failure in name resolution",
    "oserror",
    "socket",
];

/// Why the kernel or the harness terminated a run early.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum KillReason {
    SeccompKill,
    OomKill,
    Timeout,
    Cancelled,
    #[default]
    None,
}

/// Raw observation of one sandboxed execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionOutcome {
    pub exit_code: Option<i32>,
    pub kill_reason: KillReason,
    pub stdout: String,
    pub stderr: String,
    pub duration_ms: u64,
}

/// Classified outcome of one sandboxed execution.
///
/// Ordered by classification precedence: when several violations are
/// observable at once, the smallest variant wins.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    SeccompViolation,
    ResourceViolation,
    Timeout,
    Cancelled,
    NetworkBlocked,
    NormalExit,
    Crashed,
}

impl Verdict {
    /// Anything other than a clean exit counts as a violation for exit-code
    /// purposes.
    pub fn is_violation(&self) -> bool {
        !matches!(self, Self::NormalExit)
    }
}

impl std::fmt::Display for Verdict {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::SeccompViolation => "seccomp_violation",
            Self::ResourceViolation => "resource_violation",
            Self::Timeout => "timeout",
            Self::Cancelled => "cancelled",
            Self::NetworkBlocked => "network_blocked",
            Self::NormalExit => "normal_exit",
            Self::Crashed => "crashed",
        };
        write!(f, "{name}")
    }
}

impl ExecutionOutcome {
    /// Derives the verdict. First match wins: a run killed by seccomp is a
    /// seccomp violation even when the exit code would also read as a
    /// crash or a network failure.
    pub fn verdict(&self) -> Verdict {
        match self.kill_reason {
            KillReason::SeccompKill => return Verdict::SeccompViolation,
            KillReason::OomKill => return Verdict::ResourceViolation,
            KillReason::Timeout => return Verdict::Timeout,
            KillReason::Cancelled => return Verdict::Cancelled,
            KillReason::None => {}
        }
        match self.exit_code {
            Some(0) => Verdict::NormalExit,
            Some(_) if self.network_failure_signature() => Verdict::NetworkBlocked,
            _ => Verdict::Crashed,
        }
    }

    /// Adversarial samples catch their own exceptions and print them
    /// wherever they like, so both streams are searched.
    fn network_failure_signature(&self) -> bool {
        let combined = format!("{}\n{}", self.stdout, self.stderr).to_lowercase();
        CONNECTIVITY_FAILURE_SIGNATURES
            .iter()
            .any(|sig| combined.contains(sig))
    }
}
