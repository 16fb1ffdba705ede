use thiserror::Error;

use crate::types::RelationId;

/// Errors raised by the relation library.
///
/// Missing peer data is never an error.  These variants only cover
/// sequencing mistakes by the caller.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RelationError {
    #[error("relation {name} not created yet (id: {id:?})")]
    RelationNotFound {
        name: String,
        id: Option<RelationId>,
    },
    #[error("relation {0} does not exist")]
    UnknownRelation(RelationId),
    #[error("no watcher registered for relation {0}")]
    UnregisteredRelation(String),
}

#[derive(Debug, Error)]
pub enum WorkloadError {
    #[error("cannot connect to workload container {0}")]
    Unreachable(String),
    #[error("docker error: {0}")]
    Docker(#[from] bollard::errors::Error),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid config path {0}")]
    InvalidPath(String),
    #[error("services in {container} did not restart within {secs}s")]
    RestartTimeout { container: String, secs: u64 },
}

/// Failure while handling one hook.
#[derive(Debug, Error)]
pub enum OperatorError {
    #[error(transparent)]
    Relation(#[from] RelationError),
    #[error(transparent)]
    Workload(#[from] WorkloadError),
}
