//! Seccomp profile document for the container runtime.
//!
//! Renders a [`SyscallPolicy`] into the JSON profile format Docker accepts
//! via `--security-opt seccomp=<file>`: an explicit `defaultAction` plus
//! one entry per rule, in rule order.

use serde::{Deserialize, Serialize};

use super::policy::{SyscallAction, SyscallDefault, SyscallPolicy};

const ACT_ALLOW: &str = "SCMP_ACT_ALLOW";
const ACT_KILL: &str = "SCMP_ACT_KILL_PROCESS";
const ACT_TRAP: &str = "SCMP_ACT_TRAP";

/// A Docker seccomp profile document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeccompProfile {
    #[serde(rename = "defaultAction")]
    pub default_action: String,
    pub syscalls: Vec<SeccompEntry>,
}

/// One syscall entry in the profile.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeccompEntry {
    pub names: Vec<String>,
    pub action: String,
}

impl SeccompProfile {
    /// Builds the profile document from a syscall policy, preserving rule
    /// order.
    pub fn from_policy(policy: &SyscallPolicy) -> Self {
        let default_action = match policy.default {
            SyscallDefault::Allow => ACT_ALLOW,
            SyscallDefault::Deny => ACT_KILL,
        };
        let syscalls = policy
            .rules
            .iter()
            .map(|rule| SeccompEntry {
                names: vec![rule.name.clone()],
                action: match rule.action {
                    SyscallAction::Allow => ACT_ALLOW,
                    SyscallAction::Kill => ACT_KILL,
                    SyscallAction::Trap => ACT_TRAP,
                }
                .to_string(),
            })
            .collect();
        Self {
            default_action: default_action.to_string(),
            syscalls,
        }
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sandbox::policy::SyscallRule;

    #[test]
    fn test_tripwire_profile_defaults_allow() {
        let profile = SeccompProfile::from_policy(&SyscallPolicy::exfiltration_tripwire());
        assert_eq!(profile.default_action, "SCMP_ACT_ALLOW");
        assert!(
            profile
                .syscalls
                .iter()
                .any(|entry| entry.names == ["connect"] && entry.action == "SCMP_ACT_KILL_PROCESS")
        );
    }

    #[test]
    fn test_default_deny_renders_kill_default() {
        let policy = SyscallPolicy {
            default: SyscallDefault::Deny,
            rules: vec![SyscallRule {
                name: "read".to_string(),
                action: SyscallAction::Allow,
            }],
        };
        let profile = SeccompProfile::from_policy(&policy);
        assert_eq!(profile.default_action, "SCMP_ACT_KILL_PROCESS");
        assert_eq!(profile.syscalls[0].action, "SCMP_ACT_ALLOW");
    }

    #[test]
    fn test_rule_order_preserved() {
        let policy = SyscallPolicy {
            default: SyscallDefault::Allow,
            rules: vec![SyscallRule::kill("connect"), SyscallRule::kill("sendto")],
        };
        let profile = SeccompProfile::from_policy(&policy);
        assert_eq!(profile.syscalls[0].names, ["connect"]);
        assert_eq!(profile.syscalls[1].names, ["sendto"]);
    }

    #[test]
    fn test_json_document_shape() {
        let json = SeccompProfile::from_policy(&SyscallPolicy::default())
            .to_json()
            .unwrap();
        assert!(json.contains("\"defaultAction\""));
        assert!(json.contains("\"syscalls\""));
        let parsed: SeccompProfile = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.default_action, "SCMP_ACT_ALLOW");
    }
}
