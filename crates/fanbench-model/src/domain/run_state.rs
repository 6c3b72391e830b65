use std::fmt;

use serde::{Deserialize, Serialize};

/// Phase of a single sandbox run.
///
/// ```text
/// Created -> SandboxStarting -> WaitingReady -> WorkloadRunning -> Completed | Failed
/// ```
/// `TornDown` is entered last from every state, including after cancellation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum RunState {
    /// Request accepted, nothing issued yet.
    Created,
    /// Create command submitted to the runtime.
    SandboxStarting,
    /// Polling the runtime until the sandbox reports running.
    WaitingReady,
    /// Workload generator executing inside the sandbox.
    WorkloadRunning,
    /// Workload exited successfully.
    Completed,
    /// A fatal phase failed or the run was cancelled.
    Failed,
    /// Destroy command issued and attached processes reaped.
    TornDown,
}

impl RunState {
    /// Returns `true` once the run has stopped making forward progress.
    pub fn is_terminal(&self) -> bool {
        matches!(self, RunState::Completed | RunState::Failed | RunState::TornDown)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RunState::Created => "created",
            RunState::SandboxStarting => "sandbox-starting",
            RunState::WaitingReady => "waiting-ready",
            RunState::WorkloadRunning => "workload-running",
            RunState::Completed => "completed",
            RunState::Failed => "failed",
            RunState::TornDown => "torn-down",
        }
    }
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
