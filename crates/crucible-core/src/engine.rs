//! Execution engine: workspace lifecycle, backend dispatch, classification
//!
//! The engine is the public entry point for running one self-contained unit
//! of code. It owns three guarantees the rest of the system leans on:
//!
//! - backend selection is probed once at construction and cached, never
//!   re-probed per call;
//! - the workspace directory is removed on every exit path, including
//!   timeout and internal failure, via `TempDir` drop semantics;
//! - `execute` never returns an error. Every failure, engine-level ones
//!   included, is folded into a typed `ExecutionResult`.

use async_trait::async_trait;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tempfile::{Builder, TempDir};
use tokio::fs;
use tokio::io::AsyncWriteExt;

use crate::backends::{DockerBackend, ExecutionBackend, LocalBackend};
use crate::classifier::classify;
use crate::config::ExecutionConfig;
use crate::core_types::{ErrorDetail, ExecutionRequest, ExecutionResult, ExecutionStatus};
use crate::errors::SandboxError;
use crate::languages::ExecutionLanguage;

/// How long the one-shot Docker liveness probe may take.
const PROBE_TIMEOUT: Duration = Duration::from_secs(2);

/// Seam between the engine and the components layered on top of it (retry
/// controller, project runner, test harness), so those can be exercised
/// against scripted executors in tests.
#[async_trait]
pub trait Executor: Send + Sync {
    async fn execute(&self, request: ExecutionRequest) -> ExecutionResult;
}

pub struct ExecutionEngine {
    backend: Arc<dyn ExecutionBackend>,
}

impl ExecutionEngine {
    /// Probes for a reachable Docker daemon once and selects the isolated
    /// backend when found, the unisolated local fallback otherwise. The
    /// selection is cached for the lifetime of the instance.
    pub async fn new() -> Self {
        let backend: Arc<dyn ExecutionBackend> = match DockerBackend::detect(PROBE_TIMEOUT).await {
            Ok(docker) => {
                log::info!("Docker daemon reachable, using isolated backend");
                Arc::new(docker)
            }
            Err(e) => {
                log::debug!("Docker probe failed: {}", e);
                Arc::new(LocalBackend::new())
            }
        };
        Self { backend }
    }

    /// Builds an engine around an already-selected backend. Used by tests
    /// and by callers that manage backend lifecycle themselves.
    pub fn with_backend(backend: Arc<dyn ExecutionBackend>) -> Self {
        Self { backend }
    }

    pub fn backend_name(&self) -> &'static str {
        self.backend.name()
    }

    /// Convenience wrapper over [`Executor::execute`] for the common
    /// single-file case.
    pub async fn execute_code(
        &self,
        code: &str,
        language: ExecutionLanguage,
        config: ExecutionConfig,
    ) -> ExecutionResult {
        self.execute(
            ExecutionRequest::new(code, language).with_config(config),
        )
        .await
    }

    async fn prepare_workspace(&self, request: &ExecutionRequest) -> Result<TempDir, SandboxError> {
        let workspace = Builder::new()
            .prefix("crucible-")
            .tempdir()
            .map_err(|e| SandboxError::Workspace(e.to_string()))?;

        write_file(
            workspace.path(),
            &request.language.main_file(),
            &request.code,
        )
        .await?;
        for (name, content) in &request.files {
            write_file(workspace.path(), name, content).await?;
        }

        Ok(workspace)
    }
}

/// Writes one file at a relative path inside the workspace, creating parent
/// directories as needed. Paths that escape the workspace are rejected.
async fn write_file(workspace: &Path, name: &str, content: &str) -> Result<(), SandboxError> {
    let relative = Path::new(name);
    let escapes = relative.is_absolute()
        || relative
            .components()
            .any(|c| matches!(c, std::path::Component::ParentDir));
    if escapes {
        return Err(SandboxError::InvalidRequest(format!(
            "auxiliary file path escapes the workspace: {}",
            name
        )));
    }

    let target = workspace.join(relative);
    if let Some(parent) = target.parent() {
        fs::create_dir_all(parent).await?;
    }
    let mut file = fs::File::create(&target).await?;
    file.write_all(content.as_bytes()).await?;
    file.flush().await?;
    Ok(())
}

#[async_trait]
impl Executor for ExecutionEngine {
    async fn execute(&self, request: ExecutionRequest) -> ExecutionResult {
        let started = Instant::now();

        if let Err(reason) = request.config.validate() {
            return ExecutionResult::engine_error(reason);
        }

        let workspace = match self.prepare_workspace(&request).await {
            Ok(workspace) => workspace,
            Err(e) => return ExecutionResult::engine_error(e.to_string()),
        };

        log::debug!(
            "Executing {} via {} backend in {}",
            request.language,
            self.backend.name(),
            workspace.path().display()
        );

        let outcome = self
            .backend
            .run(workspace.path(), request.language, &request.config)
            .await;
        let duration_ms = started.elapsed().as_millis() as u64;

        // `workspace` drops here on every branch below, removing the
        // directory tree.
        match outcome {
            Ok(raw) => {
                let mut result = classify(request.language, &raw);
                result.duration_ms = duration_ms;
                result
            }
            Err(SandboxError::Timeout) => ExecutionResult {
                status: ExecutionStatus::Timeout,
                stdout: String::new(),
                stderr: String::new(),
                exit_code: None,
                duration_ms,
                error: Some(ErrorDetail {
                    message: Some(format!(
                        "execution exceeded the {}s budget and was killed",
                        request.config.timeout_secs
                    )),
                    ..Default::default()
                }),
                test_summary: None,
            },
            Err(e) => {
                log::warn!("Backend failure: {}", e);
                let mut result = ExecutionResult::engine_error(e.to_string());
                result.duration_ms = duration_ms;
                result
            }
        }
    }
}
