//! Execution configuration with conservative, documented defaults
//!
//! A config is a value object: callers construct one (usually from
//! `ExecutionConfig::default()` plus a couple of field overrides), hand it to
//! the engine, and never see it mutated. Replacing the whole value is the
//! only supported way to change a knob between runs.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;

/// Resource and policy limits applied to a single execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionConfig {
    /// Wall-clock budget for the child process or container, in seconds. Must be > 0.
    pub timeout_secs: u64,
    /// Memory ceiling for the sandbox, in megabytes. Must be > 0.
    pub max_memory_mb: u64,
    /// Maximum bytes of stdout (and, separately, stderr) retained in the result.
    pub max_output_bytes: usize,
    /// Whether the sandbox may reach the network. Off by default.
    pub allow_network: bool,
    /// Whether the sandbox may write outside its workspace. Off by default;
    /// when off the container root filesystem is mounted read-only with a
    /// writable tmpfs at /tmp.
    pub allow_file_write: bool,
    /// Override for the in-sandbox working directory. Defaults to the
    /// workspace mount point.
    pub working_dir: Option<PathBuf>,
    /// Environment variables injected into the executed process.
    pub environment: HashMap<String, String>,
    /// Whether a project run should attempt dependency installation.
    /// Currently an extension point; see `project::execute_project`.
    pub install_dependencies: bool,
}

impl Default for ExecutionConfig {
    /// 30 second timeout, 512 MB memory, 1 MiB captured output per stream,
    /// no network, no writes outside the workspace, empty environment.
    fn default() -> Self {
        Self {
            timeout_secs: 30,
            max_memory_mb: 512,
            max_output_bytes: 1024 * 1024,
            allow_network: false,
            allow_file_write: false,
            working_dir: None,
            environment: HashMap::new(),
            install_dependencies: false,
        }
    }
}

impl ExecutionConfig {
    /// Checks the numeric invariants. The engine calls this before spawning
    /// anything so a zero timeout becomes an `Error` result, not a hung wait.
    pub fn validate(&self) -> Result<(), String> {
        if self.timeout_secs == 0 {
            return Err("timeout_secs must be greater than zero".to_string());
        }
        if self.max_memory_mb == 0 {
            return Err("max_memory_mb must be greater than zero".to_string());
        }
        if self.max_output_bytes == 0 {
            return Err("max_output_bytes must be greater than zero".to_string());
        }
        Ok(())
    }
}
