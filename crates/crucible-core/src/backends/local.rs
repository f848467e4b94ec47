use async_trait::async_trait;
use std::path::Path;
use std::process::Stdio;
use std::sync::Once;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;

use super::{truncate_output, ExecutionBackend, RawOutput};
use crate::config::ExecutionConfig;
use crate::errors::SandboxError;
use crate::languages::ExecutionLanguage;

static FALLBACK_WARNING: Once = Once::new();

/// Fallback backend used when no Docker daemon is reachable: spawns the
/// language command directly as a child process with the workspace as its
/// working directory. No memory, network or filesystem isolation is applied,
/// which is why selecting it warns once per process lifetime.
pub struct LocalBackend;

impl LocalBackend {
    pub fn new() -> Self {
        FALLBACK_WARNING.call_once(|| {
            log::warn!(
                "Docker unavailable, falling back to unisolated local execution; \
                 resource and network limits will not be enforced"
            );
        });
        Self
    }
}

impl Default for LocalBackend {
    fn default() -> Self {
        Self::new()
    }
}

/// Kills the child's entire process group, so grandchildren (a bash
/// subshell, the binary `go run` launched, a Python subprocess) die with it.
/// Falls back to killing the direct child where process groups are
/// unavailable.
fn kill_process_tree(child: &mut tokio::process::Child) {
    #[cfg(unix)]
    if let Some(pid) = child.id() {
        // The child was spawned as its own group leader, so -pid addresses
        // the whole tree.
        unsafe {
            libc::kill(-(pid as i32), libc::SIGKILL);
        }
        return;
    }
    let _ = child.start_kill();
}

/// Reads a stream to EOF, retaining at most `max_bytes`. Bytes past the
/// limit are still consumed so the child never blocks on a full pipe.
async fn read_bounded<R: AsyncRead + Unpin>(mut reader: R, max_bytes: usize) -> Vec<u8> {
    let mut retained = Vec::new();
    let mut chunk = [0u8; 8192];
    loop {
        match reader.read(&mut chunk).await {
            Ok(0) => break,
            Ok(n) => {
                if retained.len() < max_bytes {
                    let room = max_bytes - retained.len();
                    retained.extend_from_slice(&chunk[..n.min(room)]);
                }
            }
            Err(_) => break,
        }
    }
    retained
}

#[async_trait]
impl ExecutionBackend for LocalBackend {
    async fn run(
        &self,
        workspace: &Path,
        language: ExecutionLanguage,
        config: &ExecutionConfig,
    ) -> Result<RawOutput, SandboxError> {
        let argv = language.command(workspace);
        let working_dir = config
            .working_dir
            .clone()
            .unwrap_or_else(|| workspace.to_path_buf());

        let mut command = Command::new(&argv[0]);
        command
            .args(&argv[1..])
            .current_dir(&working_dir)
            .envs(&config.environment)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        // Own process group, so a timeout kill reaches everything the
        // interpreter forked, not just the interpreter itself.
        #[cfg(unix)]
        command.process_group(0);

        let mut child = command.spawn()?;

        let stdout_pipe = child.stdout.take();
        let stderr_pipe = child.stderr.take();
        let max_bytes = config.max_output_bytes;
        let stdout_task = tokio::spawn(async move {
            match stdout_pipe {
                Some(pipe) => read_bounded(pipe, max_bytes).await,
                None => Vec::new(),
            }
        });
        let stderr_task = tokio::spawn(async move {
            match stderr_pipe {
                Some(pipe) => read_bounded(pipe, max_bytes).await,
                None => Vec::new(),
            }
        });

        let timeout = Duration::from_secs(config.timeout_secs);
        let status = match tokio::time::timeout(timeout, child.wait()).await {
            Ok(status) => status?,
            Err(_) => {
                log::warn!(
                    "Local {} process exceeded {}s budget, killing",
                    language,
                    config.timeout_secs
                );
                kill_process_tree(&mut child);
                // Reap before returning so no zombie outlives the call.
                let _ = child.wait().await;
                stdout_task.abort();
                stderr_task.abort();
                return Err(SandboxError::Timeout);
            }
        };

        let stdout_bytes = stdout_task.await.unwrap_or_default();
        let stderr_bytes = stderr_task.await.unwrap_or_default();

        Ok(RawOutput {
            exit_code: status.code().map(i64::from),
            stdout: truncate_output(&String::from_utf8_lossy(&stdout_bytes), max_bytes),
            stderr: truncate_output(&String::from_utf8_lossy(&stderr_bytes), max_bytes),
        })
    }

    fn name(&self) -> &'static str {
        "local"
    }
}
