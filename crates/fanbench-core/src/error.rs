use std::path::PathBuf;

use fanbench_exec::ExecError;
use fanbench_model::RunState;
use thiserror::Error;

/// Failure before any run starts. Aborts the whole batch.
#[derive(Debug, Error)]
pub enum SetupError {
    #[error("invalid sandbox name prefix {0:?}")]
    InvalidPrefix(String),
    #[error("unable to build the image: {0}")]
    ImageBuild(#[source] ExecError),
    #[error("unable to create workspace {path}: {source}")]
    Workspace {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Fatal failure of a single run. Cancels the rest of the batch.
#[derive(Debug, Error)]
pub enum LifecycleError {
    #[error("sandbox create failed: {0}")]
    Create(#[source] ExecError),
    #[error("cancelled while {phase}")]
    Cancelled { phase: RunState },
    #[error("workload exec failed to start: {0}")]
    ExecStart(#[source] ExecError),
    #[error("workload exec failed: {0}")]
    ExecExit(#[source] ExecError),
    #[error("run task aborted: {0}")]
    Aborted(String),
}

impl LifecycleError {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, LifecycleError::Cancelled { .. })
    }
}

/// Failure that is recorded on a run but never becomes its result.
#[derive(Debug, Error)]
pub enum SecondaryFailure {
    #[error("log follow failed: {0}")]
    LogFollow(#[source] ExecError),
    #[error("sandbox destroy failed: {0}")]
    Destroy(#[source] ExecError),
    #[error("reaping attached process failed: {0}")]
    Reap(#[source] ExecError),
}

#[derive(Debug, Error)]
pub enum ReadinessError {
    #[error("readiness wait cancelled after {attempts} probe(s)")]
    Cancelled { attempts: u64 },
}

/// What a batch run reports to its caller.
#[derive(Debug, Error)]
pub enum BatchError {
    #[error(transparent)]
    Setup(#[from] SetupError),
    #[error("run {name} failed: {source}")]
    Run {
        name: String,
        #[source]
        source: LifecycleError,
    },
}
