//! Docker sandbox — one fresh container per detonation.
//!
//! Every run gets its own named container, its own read-only copy of the
//! sample, and its own seccomp profile file; nothing is shared between
//! runs and nothing survives them. The runner only observes how the
//! container terminated; policy enforcement happens kernel-side.

use std::path::PathBuf;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tokio::process::Command;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::ProvisioningError;
use crate::sample::CodeSample;

use super::outcome::{EXIT_CODE_SIGKILL, EXIT_CODE_SIGSYS, ExecutionOutcome, KillReason};
use super::policy::IsolationPolicy;
use super::seccomp::SeccompProfile;

/// Where the staged sample appears inside the container.
pub const SAMPLE_MOUNT_PATH: &str = "/sandbox/sample.py";

/// Configuration for the Docker sandbox.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SandboxConfig {
    /// Pre-built sandbox image. Building it is out of scope here.
    #[serde(default = "default_image")]
    pub image: String,
    /// Command run inside the container against the mounted sample.
    #[serde(default = "default_run_command")]
    pub run_command: Vec<String>,
    #[serde(default)]
    pub policy: IsolationPolicy,
}

fn default_image() -> String {
    "crucible-sandbox".to_string()
}

fn default_run_command() -> Vec<String> {
    vec!["python3".to_string(), SAMPLE_MOUNT_PATH.to_string()]
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            image: default_image(),
            run_command: default_run_command(),
            policy: IsolationPolicy::default(),
        }
    }
}

/// On-disk state for one run: staged sample, rendered seccomp profile,
/// and the container name. Cleaned up on every exit path.
struct StagedRun {
    sample_path: PathBuf,
    seccomp_path: PathBuf,
    container: String,
}

impl StagedRun {
    async fn cleanup(&self) {
        let _ = tokio::fs::remove_file(&self.sample_path).await;
        let _ = tokio::fs::remove_file(&self.seccomp_path).await;
    }
}

/// Docker-backed sandbox runner.
pub struct DockerSandbox {
    config: SandboxConfig,
}

impl DockerSandbox {
    pub fn new(config: SandboxConfig) -> Self {
        Self { config }
    }

    pub fn policy(&self) -> &IsolationPolicy {
        &self.config.policy
    }

    pub fn image(&self) -> &str {
        &self.config.image
    }

    /// Check if Docker is available on the system.
    pub async fn is_available(&self) -> bool {
        Command::new("docker")
            .arg("info")
            .stdout(std::process::Stdio::null())
            .stderr(std::process::Stdio::null())
            .status()
            .await
            .map(|s| s.success())
            .unwrap_or(false)
    }

    /// Check that the configured sandbox image exists locally.
    pub async fn image_present(&self) -> bool {
        Command::new("docker")
            .args(["image", "inspect", &self.config.image])
            .stdout(std::process::Stdio::null())
            .stderr(std::process::Stdio::null())
            .status()
            .await
            .map(|s| s.success())
            .unwrap_or(false)
    }

    /// Fails early with a harness fault when the environment cannot host
    /// a run at all.
    pub async fn ensure_ready(&self) -> Result<(), ProvisioningError> {
        if !self.is_available().await {
            return Err(ProvisioningError::DockerUnavailable(
                "`docker info` did not succeed".to_string(),
            ));
        }
        if !self.image_present().await {
            return Err(ProvisioningError::ImageMissing(self.config.image.clone()));
        }
        Ok(())
    }

    /// Detonates one sample in a fresh container and reports how it
    /// terminated.
    ///
    /// Exactly one [`ExecutionOutcome`] is produced per call; harness
    /// faults surface as [`ProvisioningError`] instead, never as an
    /// outcome. The container is torn down on every exit path, including
    /// deadline expiry and cancellation.
    pub async fn run(
        &self,
        sample: &CodeSample,
        cancel: &CancellationToken,
    ) -> Result<ExecutionOutcome, ProvisioningError> {
        let staged = self.stage(sample).await?;
        let result = self.run_staged(&staged, cancel).await;
        staged.cleanup().await;
        result
    }

    async fn stage(&self, sample: &CodeSample) -> Result<StagedRun, ProvisioningError> {
        let run_id = Uuid::new_v4();
        let temp_dir = std::env::temp_dir();

        let sample_path = temp_dir.join(format!("crucible_sample_{run_id}.py"));
        tokio::fs::write(&sample_path, &sample.text)
            .await
            .map_err(ProvisioningError::Staging)?;

        let profile = SeccompProfile::from_policy(&self.config.policy.syscall_policy)
            .to_json()
            .map_err(ProvisioningError::SeccompProfile)?;
        let seccomp_path = temp_dir.join(format!("crucible_seccomp_{run_id}.json"));
        if let Err(e) = tokio::fs::write(&seccomp_path, profile).await {
            let _ = tokio::fs::remove_file(&sample_path).await;
            return Err(ProvisioningError::Staging(e));
        }

        Ok(StagedRun {
            sample_path,
            seccomp_path,
            container: format!("crucible-run-{run_id}"),
        })
    }

    async fn run_staged(
        &self,
        staged: &StagedRun,
        cancel: &CancellationToken,
    ) -> Result<ExecutionOutcome, ProvisioningError> {
        let policy = &self.config.policy;
        let args = self.container_args(staged);
        let deadline = Duration::from_secs(policy.process_timeout_secs);

        debug!(
            "sandbox: launching container {} (image={}, network={}, deadline={}s)",
            staged.container,
            self.config.image,
            policy.network_mode.as_docker_arg(),
            policy.process_timeout_secs,
        );

        let start = Instant::now();
        let result = tokio::select! {
            res = tokio::time::timeout(deadline, Command::new("docker").args(&args).output()) => res,
            _ = cancel.cancelled() => {
                warn!("sandbox: run cancelled, tearing down {}", staged.container);
                remove_container(&staged.container).await;
                return Ok(ExecutionOutcome {
                    exit_code: None,
                    kill_reason: KillReason::Cancelled,
                    stdout: String::new(),
                    stderr: "run cancelled by orchestrator".to_string(),
                    duration_ms: start.elapsed().as_millis() as u64,
                });
            }
        };
        let duration_ms = start.elapsed().as_millis() as u64;

        match result {
            Ok(Ok(output)) => {
                let exit_code = output.status.code();
                let stderr_raw = String::from_utf8_lossy(&output.stderr).to_string();

                // Exit 125/126/127 with daemon chatter on stderr means the
                // container never ran the sample: a harness fault, not a
                // verdict. A sample exiting with those codes prints no
                // daemon chatter and still classifies normally.
                if let Some(code) = exit_code {
                    if matches!(code, 125 | 126 | 127)
                        && stderr_raw.to_lowercase().contains("docker:")
                    {
                        remove_container(&staged.container).await;
                        return Err(ProvisioningError::ContainerStart {
                            code,
                            detail: stderr_raw.trim().to_string(),
                        });
                    }
                }

                let kill_reason = match exit_code {
                    Some(EXIT_CODE_SIGKILL) => {
                        if self.was_oom_killed(&staged.container).await {
                            KillReason::OomKill
                        } else {
                            KillReason::SeccompKill
                        }
                    }
                    Some(EXIT_CODE_SIGSYS) => KillReason::SeccompKill,
                    _ => KillReason::None,
                };
                remove_container(&staged.container).await;

                let outcome = ExecutionOutcome {
                    exit_code,
                    kill_reason,
                    stdout: truncate_utf8(
                        String::from_utf8_lossy(&output.stdout).to_string(),
                        policy.max_output_bytes,
                    ),
                    stderr: truncate_utf8(stderr_raw, policy.max_output_bytes),
                    duration_ms,
                };
                info!(
                    "sandbox: {} finished (exit={:?}, kill_reason={:?}, {}ms)",
                    staged.container, outcome.exit_code, outcome.kill_reason, duration_ms,
                );
                Ok(outcome)
            }
            Ok(Err(e)) => {
                remove_container(&staged.container).await;
                Err(ProvisioningError::Launch(e))
            }
            Err(_) => {
                warn!(
                    "sandbox: {} exceeded {}s deadline, killing",
                    staged.container, policy.process_timeout_secs,
                );
                remove_container(&staged.container).await;
                Ok(ExecutionOutcome {
                    exit_code: None,
                    kill_reason: KillReason::Timeout,
                    stdout: String::new(),
                    stderr: format!(
                        "process exceeded the {}s deadline and was terminated",
                        policy.process_timeout_secs,
                    ),
                    duration_ms,
                })
            }
        }
    }

    /// The kernel reports SIGKILL for both seccomp kills and the OOM
    /// killer; the container state flag is the only way to tell them
    /// apart after the fact.
    async fn was_oom_killed(&self, container: &str) -> bool {
        match Command::new("docker")
            .args(["inspect", "-f", "{{.State.OOMKilled}}", container])
            .output()
            .await
        {
            Ok(output) => String::from_utf8_lossy(&output.stdout).trim() == "true",
            Err(e) => {
                warn!("sandbox: could not inspect {container} for OOM state: {e}");
                false
            }
        }
    }

    fn container_args(&self, staged: &StagedRun) -> Vec<String> {
        let policy = &self.config.policy;
        let mut args = vec![
            "run".to_string(),
            "--name".to_string(),
            staged.container.clone(),
            "--network".to_string(),
            policy.network_mode.as_docker_arg().to_string(),
            "--memory".to_string(),
            policy.memory_limit_bytes.to_string(),
            "--cpus".to_string(),
            policy.cpu_share_fraction.to_string(),
            "--pids-limit".to_string(),
            policy.pids_limit.to_string(),
            "--cap-drop".to_string(),
            "ALL".to_string(),
            "--security-opt".to_string(),
            "no-new-privileges".to_string(),
            "--security-opt".to_string(),
            format!("seccomp={}", staged.seccomp_path.display()),
        ];

        if policy.read_only_root {
            args.push("--read-only".to_string());
            args.push("--tmpfs".to_string());
            args.push("/tmp:rw,noexec,nosuid,size=64m".to_string());
        }

        args.push("-v".to_string());
        args.push(format!(
            "{}:{}:ro",
            staged.sample_path.display(),
            SAMPLE_MOUNT_PATH,
        ));
        args.push(self.config.image.clone());
        args.extend(self.config.run_command.iter().cloned());
        args
    }
}

async fn remove_container(name: &str) {
    let _ = Command::new("docker")
        .args(["rm", "-f", name])
        .stdout(std::process::Stdio::null())
        .stderr(std::process::Stdio::null())
        .output()
        .await;
}

/// Truncates to at most `cap` bytes on a char boundary, marking the cut.
fn truncate_utf8(mut s: String, cap: usize) -> String {
    if s.len() > cap {
        let mut cut = cap;
        while !s.is_char_boundary(cut) {
            cut -= 1;
        }
        s.truncate(cut);
        s.push_str("\n... [output truncated]");
    }
    s
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sandbox::policy::NetworkMode;

    fn staged() -> StagedRun {
        StagedRun {
            sample_path: PathBuf::from("/tmp/crucible_sample_x.py"),
            seccomp_path: PathBuf::from("/tmp/crucible_seccomp_x.json"),
            container: "crucible-run-x".to_string(),
        }
    }

    #[test]
    fn test_sandbox_config_default() {
        let config = SandboxConfig::default();
        assert_eq!(config.image, "crucible-sandbox");
        assert_eq!(config.run_command[0], "python3");
        assert_eq!(config.policy.network_mode, NetworkMode::None);
    }

    #[test]
    fn test_container_args_isolation_flags() {
        let sandbox = DockerSandbox::new(SandboxConfig::default());
        let args = sandbox.container_args(&staged());

        let has_pair = |flag: &str, value: &str| {
            args.windows(2)
                .any(|pair| pair[0] == flag && pair[1] == value)
        };
        assert!(has_pair("--network", "none"));
        assert!(has_pair("--memory", "134217728"));
        assert!(has_pair("--cpus", "0.5"));
        assert!(has_pair("--cap-drop", "ALL"));
        assert!(has_pair("--security-opt", "no-new-privileges"));
        assert!(args.iter().any(|a| a.starts_with("seccomp=")));
        // The container is inspected after exit, so it must not reap itself.
        assert!(!args.iter().any(|a| a == "--rm"));
    }

    #[test]
    fn test_container_args_read_only_mount() {
        let sandbox = DockerSandbox::new(SandboxConfig::default());
        let args = sandbox.container_args(&staged());
        assert!(args.iter().any(|a| a.ends_with(":/sandbox/sample.py:ro")));
        assert!(args.iter().any(|a| a == "--read-only"));
    }

    #[test]
    fn test_container_args_bridge_mode() {
        let mut config = SandboxConfig::default();
        config.policy.network_mode = NetworkMode::Bridge;
        config.policy.read_only_root = false;
        let sandbox = DockerSandbox::new(config);
        let args = sandbox.container_args(&staged());
        assert!(args.contains(&"bridge".to_string()));
        assert!(!args.iter().any(|a| a == "--read-only"));
    }

    #[test]
    fn test_truncate_utf8_marks_cut() {
        let out = truncate_utf8("abcdef".to_string(), 4);
        assert!(out.starts_with("abcd"));
        assert!(out.ends_with("[output truncated]"));
    }

    #[test]
    fn test_truncate_utf8_respects_char_boundary() {
        // 'é' is two bytes; a cap in the middle must back off, not panic.
        let out = truncate_utf8("aé".to_string(), 2);
        assert!(out.starts_with('a'));
        assert!(out.ends_with("[output truncated]"));
    }

    #[test]
    fn test_truncate_utf8_short_output_untouched() {
        assert_eq!(truncate_utf8("ok".to_string(), 10), "ok");
    }
}
