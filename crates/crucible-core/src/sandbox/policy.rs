//! Isolation policy — containment rules for one sandbox.
//!
//! An [`IsolationPolicy`] is immutable once constructed and may be reused
//! across any number of runs. It describes resource ceilings, the network
//! mode, and the syscall policy; the runner translates it into container
//! flags and a seccomp profile document.

use serde::{Deserialize, Serialize};

/// Network attachment of the container.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum NetworkMode {
    /// Fully detached network namespace. Socket syscalls still succeed at
    /// the language-runtime level; packet delivery fails at the transport
    /// layer.
    #[default]
    None,
    /// Default bridge network, packets flow.
    Bridge,
}

impl NetworkMode {
    pub fn as_docker_arg(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Bridge => "bridge",
        }
    }
}

/// Action taken when a listed syscall fires.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyscallAction {
    Allow,
    Kill,
    Trap,
}

/// Action applied to syscalls absent from the rule list.
///
/// Always explicit: a policy either allows what it does not name or kills
/// it. The shipped default profile is allow-by-default with kill rules on
/// the socket-family syscalls, so benign interpreters run while raw
/// exfiltration attempts die kernel-side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SyscallDefault {
    #[default]
    Allow,
    Deny,
}

/// One syscall rule. Rules are evaluated in order; the first name match
/// wins.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyscallRule {
    pub name: String,
    pub action: SyscallAction,
}

impl SyscallRule {
    pub fn kill(name: &str) -> Self {
        Self {
            name: name.to_string(),
            action: SyscallAction::Kill,
        }
    }
}

/// Ordered syscall policy with an explicit default for unlisted syscalls.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyscallPolicy {
    #[serde(default)]
    pub default: SyscallDefault,
    #[serde(default)]
    pub rules: Vec<SyscallRule>,
}

impl SyscallPolicy {
    /// The tripwire profile: everything runs, but syscalls that move bytes
    /// onto a socket kill the process. Containment itself comes from the
    /// detached network namespace; this profile exists so a raw attempt is
    /// observable as a kernel kill rather than a library error.
    pub fn exfiltration_tripwire() -> Self {
        Self {
            default: SyscallDefault::Allow,
            rules: [
                "connect", "sendto", "sendmsg", "sendmmsg", "bind", "listen", "accept", "accept4",
            ]
            .iter()
            .map(|name| SyscallRule::kill(name))
            .collect(),
        }
    }

    /// Resolves the action for a syscall: first matching rule, else the
    /// default (deny resolves to kill).
    pub fn action_for(&self, syscall: &str) -> SyscallAction {
        self.rules
            .iter()
            .find(|rule| rule.name == syscall)
            .map(|rule| rule.action)
            .unwrap_or(match self.default {
                SyscallDefault::Allow => SyscallAction::Allow,
                SyscallDefault::Deny => SyscallAction::Kill,
            })
    }
}

impl Default for SyscallPolicy {
    fn default() -> Self {
        Self::exfiltration_tripwire()
    }
}

/// Immutable containment rules for one sandbox run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IsolationPolicy {
    #[serde(default)]
    pub network_mode: NetworkMode,
    #[serde(default = "default_memory_limit_bytes")]
    pub memory_limit_bytes: u64,
    #[serde(default = "default_cpu_share_fraction")]
    pub cpu_share_fraction: f64,
    #[serde(default)]
    pub syscall_policy: SyscallPolicy,
    #[serde(default = "default_process_timeout_secs")]
    pub process_timeout_secs: u64,
    #[serde(default = "default_max_output_bytes")]
    pub max_output_bytes: usize,
    #[serde(default = "default_pids_limit")]
    pub pids_limit: u64,
    #[serde(default = "default_read_only_root")]
    pub read_only_root: bool,
}

fn default_memory_limit_bytes() -> u64 {
    128 * 1024 * 1024
}
fn default_cpu_share_fraction() -> f64 {
    0.5
}
fn default_process_timeout_secs() -> u64 {
    30
}
fn default_max_output_bytes() -> usize {
    1024 * 1024
}
fn default_pids_limit() -> u64 {
    64
}
fn default_read_only_root() -> bool {
    true
}

impl Default for IsolationPolicy {
    fn default() -> Self {
        Self {
            network_mode: NetworkMode::None,
            memory_limit_bytes: default_memory_limit_bytes(),
            cpu_share_fraction: default_cpu_share_fraction(),
            syscall_policy: SyscallPolicy::default(),
            process_timeout_secs: default_process_timeout_secs(),
            max_output_bytes: default_max_output_bytes(),
            pids_limit: default_pids_limit(),
            read_only_root: default_read_only_root(),
        }
    }
}
