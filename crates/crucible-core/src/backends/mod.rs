//! Execution backends for sandboxed runtime evaluation.
//!
//! Provides the seam between the engine and whatever actually spawns the
//! code: a Docker container when the daemon is reachable, a bare child
//! process as a degraded fallback. Both implementations share the same
//! contract: run the language's command inside the workspace, capture
//! bounded output, and do not return from a timeout until the child is
//! confirmed dead.

use async_trait::async_trait;
use std::path::Path;

use crate::config::ExecutionConfig;
use crate::errors::SandboxError;
use crate::languages::ExecutionLanguage;

pub mod docker;
pub mod local;

pub use docker::DockerBackend;
pub use local::LocalBackend;

/// Raw process outcome before classification. Output strings are already
/// truncated to the config's ceiling by the backend that produced them.
#[derive(Debug, Clone)]
pub struct RawOutput {
    /// Real exit code; `None` when the process was killed without reporting.
    pub exit_code: Option<i64>,
    pub stdout: String,
    pub stderr: String,
}

#[async_trait]
pub trait ExecutionBackend: Send + Sync {
    /// Runs the language's main-file command with `workspace` as the working
    /// directory. Returns `Err(SandboxError::Timeout)` when the budget is
    /// exceeded, and only after the child process or container has been
    /// terminated and reaped.
    async fn run(
        &self,
        workspace: &Path,
        language: ExecutionLanguage,
        config: &ExecutionConfig,
    ) -> Result<RawOutput, SandboxError>;

    /// Short name for logs.
    fn name(&self) -> &'static str;
}

/// Truncates to at most `max_bytes`, backing off to a char boundary so the
/// result stays valid UTF-8. May therefore return up to 3 bytes fewer.
pub(crate) fn truncate_output(text: &str, max_bytes: usize) -> String {
    if text.len() <= max_bytes {
        return text.to_string();
    }
    let mut end = max_bytes;
    while end > 0 && !text.is_char_boundary(end) {
        end -= 1;
    }
    text[..end].to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_output_exact_on_ascii() {
        let long = "x".repeat(10_000);
        let truncated = truncate_output(&long, 100);
        assert_eq!(truncated.len(), 100);
    }

    #[test]
    fn test_truncate_output_respects_char_boundaries() {
        // Each snowman is 3 bytes; a 4-byte budget must not split one.
        let text = "\u{2603}\u{2603}";
        let truncated = truncate_output(text, 4);
        assert_eq!(truncated, "\u{2603}");
    }

    #[test]
    fn test_truncate_output_noop_when_under_limit() {
        assert_eq!(truncate_output("short", 100), "short");
    }
}
