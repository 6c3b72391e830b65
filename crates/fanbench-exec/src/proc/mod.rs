use std::{
    process::{ExitStatus, Stdio},
    time::Duration,
};

use tokio::process::{Child, Command};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use crate::{
    error::{ExecError, ExecResult},
    spec::{CommandSpec, OutputMode},
    util::{exit_signal, terminate_group},
};

/// Starts external commands and hands back handles that observe a cancellation token.
///
/// Every child is spawned as the leader of its own process group. Terminal interrupts
/// therefore reach only this process, and stopping a command stops whatever it spawned.
#[derive(Clone, Debug)]
pub struct ProcSupervisor {
    grace: Duration,
}

impl ProcSupervisor {
    /// `grace` is how long a cancelled command may take to exit after SIGTERM.
    pub fn new(grace: Duration) -> Self {
        Self { grace }
    }

    #[inline]
    pub fn grace(&self) -> Duration {
        self.grace
    }

    /// Spawn `spec` without waiting for it.
    ///
    /// The returned handle stops the command's process group when `cancel` fires while it is being waited on.
    pub fn start(&self, spec: &CommandSpec, cancel: &CancellationToken) -> ExecResult<ProcHandle> {
        if spec.program.trim().is_empty() {
            return Err(ExecError::MissingProgram);
        }

        let mut cmd = Command::new(&spec.program);
        cmd.args(&spec.args);
        if let Some(cwd) = &spec.cwd {
            cmd.current_dir(cwd);
        }
        for (k, v) in &spec.env {
            cmd.env(k, v);
        }
        match spec.output {
            OutputMode::Inherit => {
                cmd.stdout(Stdio::inherit()).stderr(Stdio::inherit());
            }
            OutputMode::Null => {
                cmd.stdout(Stdio::null()).stderr(Stdio::null());
            }
        }
        cmd.stdin(Stdio::null());
        cmd.kill_on_drop(spec.kill_on_drop);
        #[cfg(target_family = "unix")]
        cmd.process_group(0);

        let label = spec.label();
        trace!(target: "fanbench.exec", command = %spec, "spawn");
        let child = cmd.spawn().map_err(|source| ExecError::Spawn {
            command: label.clone(),
            source,
        })?;
        debug!(target: "fanbench.exec", command = %label, pid = ?child.id(), "started");

        Ok(ProcHandle {
            child,
            label,
            cancel: cancel.clone(),
            grace: self.grace,
            status: None,
            stopped: false,
        })
    }

    /// Start `spec` and wait for it to exit successfully.
    pub async fn run(&self, spec: &CommandSpec, cancel: &CancellationToken) -> ExecResult<()> {
        self.start(spec, cancel)?.wait_success().await
    }

    /// Start `spec` and report only whether it exited zero. Spawn failures count as `false`.
    pub async fn probe(&self, spec: &CommandSpec, cancel: &CancellationToken) -> bool {
        match self.start(spec, cancel) {
            Ok(mut handle) => matches!(handle.wait().await, Ok(status) if status.success()),
            Err(e) => {
                trace!(target: "fanbench.exec", error = %e, "probe spawn failed");
                false
            }
        }
    }
}

/// A running (or finished) supervised command.
pub struct ProcHandle {
    child: Child,
    label: String,
    cancel: CancellationToken,
    grace: Duration,
    status: Option<ExitStatus>,
    /// The process group was signalled by this handle.
    stopped: bool,
}

impl ProcHandle {
    #[inline]
    pub fn label(&self) -> &str {
        &self.label
    }

    #[inline]
    pub fn id(&self) -> Option<u32> {
        self.child.id()
    }

    /// Exit status, if the command has already been observed to exit.
    #[inline]
    pub fn status(&self) -> Option<ExitStatus> {
        self.status
    }

    /// Wait for the command to exit.
    ///
    /// If the token fires first, the process group gets SIGTERM (SIGKILL after the grace period)
    /// and the result is [`ExecError::Cancelled`]. Cancel-safe: dropping the future leaves the child running.
    pub async fn wait(&mut self) -> ExecResult<ExitStatus> {
        if let Some(status) = self.status {
            return Ok(status);
        }

        tokio::select! {
            status = self.child.wait() => {
                let status = status.map_err(|source| ExecError::Wait {
                    command: self.label.clone(),
                    source,
                })?;
                self.status = Some(status);
                trace!(target: "fanbench.exec", command = %self.label, %status, "exited");
                Ok(status)
            }
            _ = self.cancel.cancelled() => {
                debug!(target: "fanbench.exec", command = %self.label, "cancelled; stopping process group");
                self.stopped = true;
                if let Ok(status) = terminate_group(&mut self.child, self.grace).await {
                    self.status = Some(status);
                }
                Err(ExecError::Cancelled { command: self.label.clone() })
            }
        }
    }

    /// Error for a command that ended unsuccessfully on its own.
    ///
    /// A group this handle had to stop does not count as failed.
    pub fn failure(&self) -> Option<ExecError> {
        let status = self.status?;
        if self.stopped {
            return None;
        }
        check_status(&self.label, status).err()
    }

    /// Wait for the command and turn a non-success exit into an error.
    pub async fn wait_success(&mut self) -> ExecResult<()> {
        let status = self.wait().await?;
        check_status(&self.label, status)
    }

    /// Give the command `grace` to exit on its own, then stop its process group.
    ///
    /// Ignores the cancellation token: used during teardown, after the token has usually fired.
    pub async fn shutdown(&mut self, grace: Duration) -> ExecResult<ExitStatus> {
        if let Some(status) = self.status {
            return Ok(status);
        }

        let status = match tokio::time::timeout(grace, self.child.wait()).await {
            Ok(status) => status,
            Err(_) => {
                debug!(target: "fanbench.exec", command = %self.label, "still running after grace; stopping process group");
                self.stopped = true;
                terminate_group(&mut self.child, self.grace).await
            }
        }
        .map_err(|source| ExecError::Wait {
            command: self.label.clone(),
            source,
        })?;

        self.status = Some(status);
        Ok(status)
    }
}

fn check_status(label: &str, status: ExitStatus) -> ExecResult<()> {
    if status.success() {
        return Ok(());
    }
    match status.code() {
        Some(code) => Err(ExecError::NonZeroExit {
            command: label.to_string(),
            code,
        }),
        None => Err(ExecError::KilledBySignal {
            command: label.to_string(),
            signal: exit_signal(&status),
        }),
    }
}
