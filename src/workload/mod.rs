use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::error::WorkloadError;

pub mod docker;
pub use docker::DockerWorkload;

/// Services the workload should run, keyed by service name.  Applying a
/// layer replaces any previous definition of the services it names.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Layer {
    pub services: HashMap<String, Service>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Startup {
    Enabled,
    Disabled,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Service {
    /// Program and arguments.
    pub command: Vec<String>,
    pub startup: Startup,
}

impl Layer {
    pub fn single(service_name: &str, command: Vec<String>) -> Self {
        let service = Service {
            command,
            startup: Startup::Enabled,
        };
        Self {
            services: HashMap::from([(service_name.to_string(), service)]),
        }
    }
}

#[async_trait]
pub trait Workload: Send + Sync {
    async fn can_connect(&self) -> bool;

    /// Write `content` to `path` inside the workload container.
    async fn push(&self, path: &str, content: &str) -> Result<(), WorkloadError>;

    /// Apply `layer` and restart the services it names.
    async fn replan(&self, layer: &Layer) -> Result<(), WorkloadError>;
}

/// In-process workload that records what it was asked to do.
#[derive(Debug, Clone, Default)]
pub struct MemoryWorkload {
    inner: Arc<Mutex<MemoryState>>,
}

#[derive(Debug, Default)]
struct MemoryState {
    reachable: bool,
    fail_pushes: bool,
    files: HashMap<String, String>,
    plan: Option<Layer>,
    replans: usize,
}

impl MemoryWorkload {
    pub fn new(reachable: bool) -> Self {
        Self {
            inner: Arc::new(Mutex::new(MemoryState {
                reachable,
                ..Default::default()
            })),
        }
    }

    pub async fn set_reachable(&self, reachable: bool) {
        self.inner.lock().await.reachable = reachable;
    }

    /// Make every later `push` fail with an I/O error.
    pub async fn set_fail_pushes(&self, fail: bool) {
        self.inner.lock().await.fail_pushes = fail;
    }

    pub async fn file(&self, path: &str) -> Option<String> {
        self.inner.lock().await.files.get(path).cloned()
    }

    pub async fn plan(&self) -> Option<Layer> {
        self.inner.lock().await.plan.clone()
    }

    pub async fn replans(&self) -> usize {
        self.inner.lock().await.replans
    }
}

#[async_trait]
impl Workload for MemoryWorkload {
    async fn can_connect(&self) -> bool {
        self.inner.lock().await.reachable
    }

    async fn push(&self, path: &str, content: &str) -> Result<(), WorkloadError> {
        let mut state = self.inner.lock().await;
        if !state.reachable {
            return Err(WorkloadError::Unreachable("memory".into()));
        }
        if state.fail_pushes {
            return Err(WorkloadError::Io(std::io::Error::other("disk full")));
        }
        state.files.insert(path.to_string(), content.to_string());
        Ok(())
    }

    async fn replan(&self, layer: &Layer) -> Result<(), WorkloadError> {
        let mut state = self.inner.lock().await;
        if !state.reachable {
            return Err(WorkloadError::Unreachable("memory".into()));
        }
        state.plan = Some(layer.clone());
        state.replans += 1;
        Ok(())
    }
}
