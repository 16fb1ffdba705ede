use super::{Layer, Service, Startup, Workload};
use crate::error::WorkloadError;
use crate::render::BASE_CONFIG_PATH;
use async_trait::async_trait;
use bollard::exec::{CreateExecOptions, StartExecOptions, StartExecResults};
use bollard::Docker;
use futures_util::stream::StreamExt;
use log::{debug, error, info, warn};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::time::timeout;

/// Workload running as a Docker container.
///
/// Files are pushed through a host directory bind-mounted at
/// [`BASE_CONFIG_PATH`].  The container itself only keeps an idle
/// entrypoint alive; services are started inside it with `docker exec`,
/// so replanning stops the previous process and execs the new command.
pub struct DockerWorkload {
    container_name: String,
    config_dir: PathBuf,
    restart_timeout: Duration,
}

/// Command that stops every process started from `service`'s program.
fn stop_command(service: &Service) -> Option<Vec<String>> {
    let program = service.command.first()?;
    Some(vec!["pkill".to_string(), "-f".to_string(), program.clone()])
}

fn exec_options(cmd: Vec<String>, attach: bool) -> CreateExecOptions<String> {
    CreateExecOptions {
        cmd: Some(cmd),
        attach_stdout: Some(attach),
        attach_stderr: Some(attach),
        ..Default::default()
    }
}

impl DockerWorkload {
    pub fn new(container_name: String, config_dir: PathBuf, restart_timeout: Duration) -> Self {
        Self {
            container_name,
            config_dir,
            restart_timeout,
        }
    }

    fn connect() -> Result<Docker, WorkloadError> {
        // Unix socket on Linux, named pipe on Windows.
        Docker::connect_with_local_defaults().map_err(Into::into)
    }

    /// Map a path inside the container onto the bind-mounted host directory.
    fn host_path(&self, path: &str) -> Result<PathBuf, WorkloadError> {
        let relative = Path::new(path)
            .strip_prefix(BASE_CONFIG_PATH)
            .map_err(|_| WorkloadError::InvalidPath(path.to_string()))?;
        if relative.as_os_str().is_empty()
            || relative
                .components()
                .any(|c| matches!(c, std::path::Component::ParentDir))
        {
            return Err(WorkloadError::InvalidPath(path.to_string()));
        }
        Ok(self.config_dir.join(relative))
    }

    async fn is_running(docker: &Docker, container_name: &str) -> Result<bool, WorkloadError> {
        let detail = docker.inspect_container(container_name, None).await?;
        Ok(detail
            .state
            .and_then(|s| s.running)
            .unwrap_or(false))
    }

    /// Run `cmd` in the container and wait for it to exit.
    async fn exec_and_wait(&self, docker: &Docker, cmd: Vec<String>) -> Result<(), WorkloadError> {
        let exec = docker
            .create_exec(&self.container_name, exec_options(cmd, true))
            .await?;
        if let StartExecResults::Attached { mut output, .. } =
            docker.start_exec(&exec.id, None).await?
        {
            while let Some(msg) = output.next().await {
                match msg {
                    Ok(line) => debug!("{}: {}", self.container_name, line),
                    Err(e) => {
                        error!("Error reading exec output: {}", e);
                        return Err(e.into());
                    }
                }
            }
        }
        Ok(())
    }

    /// Start `cmd` in the container without waiting for it.
    async fn exec_detached(&self, docker: &Docker, cmd: Vec<String>) -> Result<(), WorkloadError> {
        let exec = docker
            .create_exec(&self.container_name, exec_options(cmd, false))
            .await?;
        let opts = StartExecOptions {
            detach: true,
            ..Default::default()
        };
        docker.start_exec(&exec.id, Some(opts)).await?;
        Ok(())
    }

    async fn restart_service(
        &self,
        docker: &Docker,
        name: &str,
        service: &Service,
    ) -> Result<(), WorkloadError> {
        if let Some(stop) = stop_command(service) {
            // pkill exits non-zero when nothing matched, which is fine here.
            self.exec_and_wait(docker, stop).await?;
        }
        match service.startup {
            Startup::Enabled => {
                info!(
                    "Starting service {} in {}: {}",
                    name,
                    self.container_name,
                    service.command.join(" ")
                );
                self.exec_detached(docker, service.command.clone()).await
            }
            Startup::Disabled => {
                info!("Service {} in {} left stopped", name, self.container_name);
                Ok(())
            }
        }
    }
}

#[async_trait]
impl Workload for DockerWorkload {
    async fn can_connect(&self) -> bool {
        let docker = match Self::connect() {
            Ok(d) => d,
            Err(e) => {
                warn!("Failed to connect to Docker: {}", e);
                return false;
            }
        };
        match Self::is_running(&docker, &self.container_name).await {
            Ok(running) => running,
            Err(e) => {
                warn!("Failed to inspect container {}: {}", self.container_name, e);
                false
            }
        }
    }

    async fn push(&self, path: &str, content: &str) -> Result<(), WorkloadError> {
        let target = self.host_path(path)?;
        if let Some(parent) = target.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&target, content).await?;
        info!("Wrote file to container {}: {}", self.container_name, path);
        Ok(())
    }

    async fn replan(&self, layer: &Layer) -> Result<(), WorkloadError> {
        let docker = Self::connect()?;
        let restart_all = async {
            for (name, service) in &layer.services {
                self.restart_service(&docker, name, service).await?;
            }
            Ok::<(), WorkloadError>(())
        };
        timeout(self.restart_timeout, restart_all)
            .await
            .map_err(|_| WorkloadError::RestartTimeout {
                container: self.container_name.clone(),
                secs: self.restart_timeout.as_secs(),
            })??;
        Ok(())
    }
}
