//! Layered containment for detonating untrusted code.
//!
//! One fresh Docker container per run, with a detached network namespace,
//! resource ceilings, and a seccomp syscall policy. The runner classifies
//! how each run terminated into a [`Verdict`].

pub mod docker;
pub mod outcome;
pub mod policy;
pub mod seccomp;

pub use docker::{DockerSandbox, SAMPLE_MOUNT_PATH, SandboxConfig};
pub use outcome::{ExecutionOutcome, KillReason, Verdict};
pub use policy::{
    IsolationPolicy, NetworkMode, SyscallAction, SyscallDefault, SyscallPolicy, SyscallRule,
};
pub use seccomp::SeccompProfile;
