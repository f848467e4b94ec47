use async_trait::async_trait;
use bollard::container::LogOutput;
use bollard::models::{ContainerCreateBody, HostConfig};
use bollard::query_parameters::{
    CreateContainerOptions as BollardCreateContainerOptionsQuery,
    KillContainerOptions as BollardKillContainerOptionsQuery,
    LogsOptions as BollardLogsOptionsQuery,
    RemoveContainerOptions as BollardRemoveContainerOptionsQuery,
    StartContainerOptions as BollardStartContainerOptionsQuery,
    WaitContainerOptions as BollardWaitContainerOptionsQuery,
};
use bollard::Docker;
use futures_util::stream::StreamExt;
use std::collections::HashMap;
use std::default::Default;
use std::path::Path;
use std::time::Duration;
use uuid::Uuid;

use super::{truncate_output, ExecutionBackend, RawOutput};
use crate::config::ExecutionConfig;
use crate::errors::SandboxError;
use crate::languages::ExecutionLanguage;

/// Mount point for the workspace inside every container.
const CONTAINER_WORK_DIR: &str = "/work";

/// Removes the container if the owning `run()` future is dropped before its
/// own cleanup ran, so caller-level cancellation cannot leak a container.
/// Normal paths remove explicitly (and awaited) and then disarm the guard.
struct ContainerGuard {
    docker: Docker,
    id: String,
    armed: bool,
}

impl ContainerGuard {
    fn disarm(&mut self) {
        self.armed = false;
    }
}

impl Drop for ContainerGuard {
    fn drop(&mut self) {
        if self.armed {
            let docker = self.docker.clone();
            let id = self.id.clone();
            tokio::spawn(async move {
                let _ = docker
                    .remove_container(&id, DockerBackend::remove_options())
                    .await;
            });
        }
    }
}

/// Isolated backend: one ephemeral container per run, resource-capped and
/// network-isolated. The container is created without auto-remove so logs
/// can be collected reliably after the wait, then force-removed on every
/// path, timeout included.
pub struct DockerBackend {
    docker: Docker,
}

impl DockerBackend {
    pub fn new(docker: Docker) -> Self {
        Self { docker }
    }

    /// Liveness probe used once at engine construction: connects with local
    /// defaults and pings the daemon under `probe_timeout`. A slow or absent
    /// daemon is reported as an error so the engine can fall back.
    pub async fn detect(probe_timeout: Duration) -> Result<Self, SandboxError> {
        let docker = Docker::connect_with_local_defaults()?;
        tokio::time::timeout(probe_timeout, docker.ping())
            .await
            .map_err(|_| SandboxError::Timeout)??;
        Ok(Self { docker })
    }

    fn host_config(&self, workspace: &Path, config: &ExecutionConfig) -> HostConfig {
        let memory_bytes = (config.max_memory_mb as i64) * 1024 * 1024;
        let mut tmpfs = HashMap::new();
        if !config.allow_file_write {
            tmpfs.insert("/tmp".to_string(), "rw,size=64m".to_string());
        }
        HostConfig {
            binds: Some(vec![format!(
                "{}:{}",
                workspace.display(),
                CONTAINER_WORK_DIR
            )]),
            // Swap pinned to the memory limit so the ceiling is real.
            memory: Some(memory_bytes),
            memory_swap: Some(memory_bytes),
            nano_cpus: Some(1_000_000_000),
            network_mode: if config.allow_network {
                None
            } else {
                Some("none".to_string())
            },
            readonly_rootfs: Some(!config.allow_file_write),
            tmpfs: if tmpfs.is_empty() { None } else { Some(tmpfs) },
            ..Default::default()
        }
    }

    fn remove_options() -> Option<BollardRemoveContainerOptionsQuery> {
        Some(BollardRemoveContainerOptionsQuery {
            force: true,
            ..Default::default()
        })
    }

    async fn remove_container(&self, id: &str) {
        if let Err(e) = self.docker.remove_container(id, Self::remove_options()).await {
            log::warn!("Failed to remove container {}: {}", id, e);
        }
    }

    async fn collect_logs(&self, id: &str, max_bytes: usize) -> (String, String) {
        let mut output_stream = self.docker.logs(
            id,
            Some(BollardLogsOptionsQuery {
                stdout: true,
                stderr: true,
                ..Default::default()
            }),
        );

        let mut stdout = String::new();
        let mut stderr = String::new();
        while let Some(log_result) = output_stream.next().await {
            match log_result {
                Ok(LogOutput::StdOut { message }) => {
                    if stdout.len() < max_bytes {
                        stdout.push_str(&String::from_utf8_lossy(&message));
                    }
                }
                Ok(LogOutput::StdErr { message }) => {
                    if stderr.len() < max_bytes {
                        stderr.push_str(&String::from_utf8_lossy(&message));
                    }
                }
                Ok(_) => {}
                Err(e) => {
                    log::warn!("Log stream error for container {}: {}", id, e);
                    break;
                }
            }
        }

        (
            truncate_output(&stdout, max_bytes),
            truncate_output(&stderr, max_bytes),
        )
    }
}

#[async_trait]
impl ExecutionBackend for DockerBackend {
    async fn run(
        &self,
        workspace: &Path,
        language: ExecutionLanguage,
        config: &ExecutionConfig,
    ) -> Result<RawOutput, SandboxError> {
        let working_dir = config
            .working_dir
            .as_ref()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| CONTAINER_WORK_DIR.to_string());

        let env: Vec<String> = config
            .environment
            .iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect();

        let options = Some(BollardCreateContainerOptionsQuery {
            name: Some(format!("crucible-{}", Uuid::new_v4())),
            ..Default::default()
        });

        let body = ContainerCreateBody {
            image: Some(language.image().to_string()),
            cmd: Some(language.command(Path::new(CONTAINER_WORK_DIR))),
            working_dir: Some(working_dir),
            env: if env.is_empty() { None } else { Some(env) },
            host_config: Some(self.host_config(workspace, config)),
            attach_stdout: Some(true),
            attach_stderr: Some(true),
            ..Default::default()
        };

        let container = self.docker.create_container(options, body).await?;
        let container_id = container.id.clone();
        let mut guard = ContainerGuard {
            docker: self.docker.clone(),
            id: container_id.clone(),
            armed: true,
        };

        if let Err(e) = self
            .docker
            .start_container(&container_id, None::<BollardStartContainerOptionsQuery>)
            .await
        {
            self.remove_container(&container_id).await;
            guard.disarm();
            return Err(e.into());
        }

        let mut wait_stream = self
            .docker
            .wait_container(&container_id, None::<BollardWaitContainerOptionsQuery>);
        let timeout_future = tokio::time::sleep(Duration::from_secs(config.timeout_secs));

        let wait_outcome = tokio::select! {
            res = wait_stream.next() => res,
            _ = timeout_future => {
                log::warn!(
                    "Container {} exceeded {}s budget, killing",
                    container_id, config.timeout_secs
                );
                let _ = self
                    .docker
                    .kill_container(&container_id, None::<BollardKillContainerOptionsQuery>)
                    .await;
                // run() must not return until the container is gone.
                self.remove_container(&container_id).await;
                guard.disarm();
                return Err(SandboxError::Timeout);
            }
        };

        // The daemon reports non-zero exits as stream errors carrying the
        // status code; fold both shapes into one exit code.
        let exit_code = match wait_outcome {
            Some(Ok(response)) => Some(response.status_code),
            Some(Err(bollard::errors::Error::DockerContainerWaitError { code, .. })) => Some(code),
            Some(Err(e)) => {
                self.remove_container(&container_id).await;
                guard.disarm();
                return Err(e.into());
            }
            None => None,
        };

        let (stdout, stderr) = self
            .collect_logs(&container_id, config.max_output_bytes)
            .await;
        self.remove_container(&container_id).await;
        guard.disarm();

        Ok(RawOutput {
            exit_code,
            stdout,
            stderr,
        })
    }

    fn name(&self) -> &'static str {
        "docker"
    }
}
