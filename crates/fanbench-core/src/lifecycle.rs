use std::{sync::Arc, time::Instant};

use fanbench_exec::{ExecError, ProcHandle, ProcSupervisor};
use fanbench_model::{RunRequest, RunState, SandboxConfig, WorkloadConfig};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::{
    error::{LifecycleError, SecondaryFailure},
    readiness::ReadinessPoller,
    runtime::{Mount, SandboxRuntime},
};

/// Drives one sandbox from creation to teardown.
///
/// ```text
/// Created -> SandboxStarting -> WaitingReady -> WorkloadRunning -> Completed | Failed -> TornDown
/// ```
/// Teardown runs on every path, including cancellation. A fatal failure cancels the
/// failure signal (if set) before teardown so that sibling runs can unwind while this one cleans up.
pub struct SandboxLifecycle {
    runtime: Arc<dyn SandboxRuntime>,
    poller: Arc<ReadinessPoller>,
    supervisor: ProcSupervisor,
    image: String,
    sandbox: SandboxConfig,
    workload: WorkloadConfig,
    failure_signal: Option<CancellationToken>,
}

impl SandboxLifecycle {
    pub fn new(
        runtime: Arc<dyn SandboxRuntime>,
        poller: Arc<ReadinessPoller>,
        supervisor: ProcSupervisor,
        image: impl Into<String>,
        sandbox: SandboxConfig,
        workload: WorkloadConfig,
    ) -> Self {
        Self {
            runtime,
            poller,
            supervisor,
            image: image.into(),
            sandbox,
            workload,
            failure_signal: None,
        }
    }

    /// Token cancelled when this lifecycle hits a fatal, non-cancellation error.
    pub fn with_failure_signal(mut self, token: CancellationToken) -> Self {
        self.failure_signal = Some(token);
        self
    }

    /// Run `request` to completion. Always returns after teardown.
    pub async fn run(&self, request: &RunRequest, cancel: &CancellationToken) -> RunReport {
        let mut handle = RunHandle::new(request);

        match self.drive(request, &mut handle, cancel).await {
            Ok(()) => handle.transition(RunState::Completed),
            Err(e) => {
                if !e.is_cancelled()
                    && let Some(signal) = &self.failure_signal
                {
                    signal.cancel();
                }
                handle.fail(e);
            }
        }

        self.teardown(&mut handle).await;
        handle.into_report()
    }

    async fn drive(
        &self,
        request: &RunRequest,
        handle: &mut RunHandle,
        cancel: &CancellationToken,
    ) -> Result<(), LifecycleError> {
        if cancel.is_cancelled() {
            return Err(LifecycleError::Cancelled {
                phase: RunState::Created,
            });
        }

        handle.transition(RunState::SandboxStarting);
        handle.sandbox_requested = true;
        let mount = Mount {
            host: request.workspace().to_path_buf(),
            target: self.sandbox.mount_target.clone(),
        };
        let keepalive = [
            "sh".to_string(),
            "-c".to_string(),
            self.sandbox.keepalive_script(),
        ];
        let create = self
            .runtime
            .create(request.name(), &self.image, &mount, &keepalive);
        handle.create = Some(
            self.supervisor
                .start(&create, cancel)
                .map_err(LifecycleError::Create)?,
        );

        handle.transition(RunState::WaitingReady);
        self.wait_ready(handle, cancel).await?;

        handle.transition(RunState::WorkloadRunning);
        match self.supervisor.start(&self.runtime.logs(request.name()), cancel) {
            Ok(logs) => handle.logs = Some(logs),
            Err(e) => handle.secondary(SecondaryFailure::LogFollow(e)),
        }

        let argv = self
            .workload
            .command_line(request.name(), &self.sandbox.mount_target);
        let exec = self.runtime.exec(request.name(), &argv);
        let exec = handle.exec.insert(
            self.supervisor
                .start(&exec, cancel)
                .map_err(LifecycleError::ExecStart)?,
        );
        exec.wait_success()
            .await
            .map_err(|e| fatal(e, RunState::WorkloadRunning, LifecycleError::ExecExit))
    }

    /// Poll until ready, failing early if the create command dies first.
    async fn wait_ready(
        &self,
        handle: &mut RunHandle,
        cancel: &CancellationToken,
    ) -> Result<(), LifecycleError> {
        let cancelled = |_| LifecycleError::Cancelled {
            phase: RunState::WaitingReady,
        };
        let ready = self.poller.wait_until_ready(&handle.name, cancel);
        tokio::pin!(ready);

        if let Some(create) = handle.create.as_mut() {
            tokio::select! {
                attempts = &mut ready => {
                    let attempts = attempts.map_err(cancelled)?;
                    debug!(target: "fanbench.lifecycle", sandbox = %handle.name, attempts, "ready");
                    return Ok(());
                }
                exited = create.wait_success() => {
                    exited.map_err(|e| fatal(e, RunState::WaitingReady, LifecycleError::Create))?;
                    debug!(target: "fanbench.lifecycle", sandbox = %handle.name, "create command exited before ready; still polling");
                }
            }
        }

        let attempts = ready.await.map_err(cancelled)?;
        debug!(target: "fanbench.lifecycle", sandbox = %handle.name, attempts, "ready");
        Ok(())
    }

    async fn teardown(&self, handle: &mut RunHandle) {
        if handle.sandbox_requested {
            // The run's token may already be cancelled; destroy must still run to completion.
            let detached = CancellationToken::new();
            let destroy = self.runtime.destroy(&handle.name);
            match self.supervisor.run(&destroy, &detached).await {
                Ok(()) => handle.destroy_issued = true,
                Err(e) => {
                    handle.destroy_issued = !matches!(e, ExecError::Spawn { .. });
                    handle.secondary(SecondaryFailure::Destroy(e));
                }
            }
        }

        // Followers and the sandbox main process end once the sandbox is gone.
        let grace = self.supervisor.grace();
        let mut reap_errors = Vec::new();
        for attached in [&mut handle.logs, &mut handle.create, &mut handle.exec]
            .into_iter()
            .flatten()
        {
            if let Err(e) = attached.shutdown(grace).await {
                reap_errors.push(e);
            }
        }
        for e in reap_errors {
            handle.secondary(SecondaryFailure::Reap(e));
        }
        if let Some(e) = handle.logs.as_ref().and_then(ProcHandle::failure) {
            handle.secondary(SecondaryFailure::LogFollow(e));
        }

        handle.transition(RunState::TornDown);
    }
}

/// Cancellation of a command is cancellation of the run, whatever phase issued it.
fn fatal(
    e: ExecError,
    phase: RunState,
    wrap: impl FnOnce(ExecError) -> LifecycleError,
) -> LifecycleError {
    if e.is_cancelled() {
        LifecycleError::Cancelled { phase }
    } else {
        wrap(e)
    }
}

/// Live state of one run, owned by its lifecycle.
struct RunHandle {
    index: usize,
    name: String,
    state: RunState,
    history: Vec<RunState>,
    sandbox_requested: bool,
    destroy_issued: bool,
    create: Option<ProcHandle>,
    logs: Option<ProcHandle>,
    exec: Option<ProcHandle>,
    error: Option<(LifecycleError, Instant)>,
    secondary: Vec<SecondaryFailure>,
}

impl RunHandle {
    fn new(request: &RunRequest) -> Self {
        Self {
            index: request.index(),
            name: request.name().to_string(),
            state: RunState::Created,
            history: vec![RunState::Created],
            sandbox_requested: false,
            destroy_issued: false,
            create: None,
            logs: None,
            exec: None,
            error: None,
            secondary: Vec::new(),
        }
    }

    fn transition(&mut self, next: RunState) {
        info!(target: "fanbench.lifecycle", sandbox = %self.name, from = %self.state, to = %next, "state");
        self.state = next;
        self.history.push(next);
    }

    fn fail(&mut self, error: LifecycleError) {
        if self.error.is_some() {
            return;
        }
        if error.is_cancelled() {
            info!(target: "fanbench.lifecycle", sandbox = %self.name, %error, "run cancelled");
        } else {
            warn!(target: "fanbench.lifecycle", sandbox = %self.name, %error, "run failed");
        }
        self.error = Some((error, Instant::now()));
        self.transition(RunState::Failed);
    }

    fn secondary(&mut self, failure: SecondaryFailure) {
        warn!(target: "fanbench.lifecycle", sandbox = %self.name, error = %failure, "secondary failure");
        self.secondary.push(failure);
    }

    fn into_report(self) -> RunReport {
        let (error, failed_at) = match self.error {
            Some((e, at)) => (Some(e), Some(at)),
            None => (None, None),
        };
        RunReport {
            index: self.index,
            name: self.name,
            history: self.history,
            destroy_issued: self.destroy_issued,
            error,
            failed_at,
            secondary: self.secondary,
        }
    }
}

/// Terminal view of one run.
#[derive(Debug)]
pub struct RunReport {
    pub index: usize,
    pub name: String,
    /// Every state the run went through, `Created` first and `TornDown` last.
    pub history: Vec<RunState>,
    /// A destroy command was started for the sandbox.
    pub destroy_issued: bool,
    pub error: Option<LifecycleError>,
    pub failed_at: Option<Instant>,
    pub secondary: Vec<SecondaryFailure>,
}

impl RunReport {
    pub(crate) fn aborted(request: &RunRequest, reason: String) -> Self {
        Self {
            index: request.index(),
            name: request.name().to_string(),
            history: vec![RunState::Created, RunState::Failed],
            destroy_issued: false,
            error: Some(LifecycleError::Aborted(reason)),
            failed_at: Some(Instant::now()),
            secondary: Vec::new(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }

    /// `Completed` or `Failed`.
    pub fn outcome(&self) -> RunState {
        if self.is_success() {
            RunState::Completed
        } else {
            RunState::Failed
        }
    }

    pub fn reached(&self, state: RunState) -> bool {
        self.history.contains(&state)
    }
}

#[cfg(all(test, target_family = "unix"))]
mod tests {
    use std::{num::NonZeroUsize, time::Duration};

    use super::*;
    use crate::{
        readiness::{Probe, RuntimeProbe},
        testing::{Journal, NeverReady, ScriptedRuntime},
    };

    struct Fixture {
        _dir: tempfile::TempDir,
        journal: Journal,
        request: RunRequest,
    }

    fn fixture() -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let journal = Journal::new(dir.path());
        let request = RunRequest::batch("t", NonZeroUsize::MIN, dir.path())
            .pop()
            .unwrap();
        Fixture {
            _dir: dir,
            journal,
            request,
        }
    }

    fn lifecycle(runtime: ScriptedRuntime, check: Option<Arc<dyn Probe>>) -> SandboxLifecycle {
        let runtime: Arc<dyn SandboxRuntime> = Arc::new(runtime);
        let supervisor = ProcSupervisor::new(Duration::from_millis(500));
        let check = check
            .unwrap_or_else(|| Arc::new(RuntimeProbe::new(runtime.clone(), supervisor.clone())));
        let poller = Arc::new(ReadinessPoller::new(check, Duration::from_millis(10)));
        SandboxLifecycle::new(
            runtime,
            poller,
            supervisor,
            "fio",
            SandboxConfig::default(),
            WorkloadConfig::default(),
        )
    }

    #[tokio::test]
    async fn successful_run_issues_create_exec_destroy_in_order() {
        let fx = fixture();
        let lc = lifecycle(ScriptedRuntime::new(&fx.journal), None);

        let report = lc.run(&fx.request, &CancellationToken::new()).await;

        assert!(report.is_success(), "{:?}", report.error);
        assert_eq!(
            report.history,
            [
                RunState::Created,
                RunState::SandboxStarting,
                RunState::WaitingReady,
                RunState::WorkloadRunning,
                RunState::Completed,
                RunState::TornDown,
            ]
        );
        assert!(report.destroy_issued);
        assert_eq!(fx.journal.verbs_for("t-0"), ["create", "exec", "destroy"]);
    }

    #[tokio::test]
    async fn cancel_while_waiting_ready_skips_exec_and_tears_down() {
        let fx = fixture();
        let never = Arc::new(NeverReady::default());
        let lc = lifecycle(ScriptedRuntime::new(&fx.journal), Some(never.clone()));
        let cancel = CancellationToken::new();

        let trigger = cancel.clone();
        let watched = never.clone();
        let journal = fx.journal.clone();
        tokio::spawn(async move {
            while watched.calls("t-0") < 3 || !journal.has("create", "t-0") {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
            trigger.cancel();
        });

        let report = tokio::time::timeout(Duration::from_secs(10), lc.run(&fx.request, &cancel))
            .await
            .expect("lifecycle did not unwind after cancellation");

        assert!(matches!(
            report.error,
            Some(LifecycleError::Cancelled {
                phase: RunState::WaitingReady
            })
        ));
        assert!(!report.reached(RunState::WorkloadRunning));
        assert!(report.reached(RunState::TornDown));
        assert!(report.destroy_issued);
        assert_eq!(fx.journal.verbs_for("t-0"), ["create", "destroy"]);
    }

    #[tokio::test]
    async fn already_cancelled_run_creates_nothing() {
        let fx = fixture();
        let lc = lifecycle(ScriptedRuntime::new(&fx.journal), None);
        let cancel = CancellationToken::new();
        cancel.cancel();

        let report = lc.run(&fx.request, &cancel).await;

        assert!(matches!(
            report.error,
            Some(LifecycleError::Cancelled {
                phase: RunState::Created
            })
        ));
        assert!(!report.reached(RunState::SandboxStarting));
        assert!(report.reached(RunState::TornDown));
        assert!(fx.journal.verbs_for("t-0").is_empty());
    }

    #[tokio::test]
    async fn failing_create_command_fails_the_run_and_still_tears_down() {
        let fx = fixture();
        let runtime = ScriptedRuntime::new(&fx.journal).create_exit(125);
        let lc = lifecycle(runtime, Some(Arc::new(NeverReady::default())));

        let report = tokio::time::timeout(
            Duration::from_secs(10),
            lc.run(&fx.request, &CancellationToken::new()),
        )
        .await
        .expect("create failure was not noticed while waiting for readiness");

        assert!(matches!(
            report.error,
            Some(LifecycleError::Create(ExecError::NonZeroExit { code: 125, .. }))
        ));
        assert_eq!(fx.journal.verbs_for("t-0"), ["create", "destroy"]);
    }

    #[tokio::test]
    async fn unstartable_create_command_still_tears_down() {
        let fx = fixture();
        let runtime = ScriptedRuntime::new(&fx.journal).missing_create_binary();
        let lc = lifecycle(runtime, None);

        let report = lc.run(&fx.request, &CancellationToken::new()).await;

        assert!(matches!(
            report.error,
            Some(LifecycleError::Create(ExecError::Spawn { .. }))
        ));
        assert!(report.reached(RunState::SandboxStarting));
        assert!(!report.reached(RunState::WaitingReady));
        assert!(report.destroy_issued);
        assert_eq!(fx.journal.verbs_for("t-0"), ["destroy"]);
    }

    #[tokio::test]
    async fn destroy_failure_does_not_mask_exec_failure() {
        let fx = fixture();
        let runtime = ScriptedRuntime::new(&fx.journal)
            .exec_exit("t-0", 4)
            .destroy_exit(1);
        let lc = lifecycle(runtime, None);

        let report = lc.run(&fx.request, &CancellationToken::new()).await;

        assert!(matches!(
            report.error,
            Some(LifecycleError::ExecExit(ExecError::NonZeroExit { code: 4, .. }))
        ));
        assert!(
            report
                .secondary
                .iter()
                .any(|f| matches!(f, SecondaryFailure::Destroy(_)))
        );
        assert!(report.destroy_issued);
    }

    #[tokio::test]
    async fn destroy_failure_alone_keeps_run_successful() {
        let fx = fixture();
        let runtime = ScriptedRuntime::new(&fx.journal).destroy_exit(1);
        let report = lifecycle(runtime, None)
            .run(&fx.request, &CancellationToken::new())
            .await;

        assert!(report.is_success());
        assert_eq!(report.secondary.len(), 1);
    }

    #[tokio::test]
    async fn log_follow_failure_is_secondary() {
        let fx = fixture();
        let runtime = ScriptedRuntime::new(&fx.journal).missing_logs_binary();
        let report = lifecycle(runtime, None)
            .run(&fx.request, &CancellationToken::new())
            .await;

        assert!(report.is_success(), "{:?}", report.error);
        assert!(matches!(
            report.secondary.as_slice(),
            [SecondaryFailure::LogFollow(ExecError::Spawn { .. })]
        ));
        assert_eq!(fx.journal.verbs_for("t-0"), ["create", "exec", "destroy"]);
    }

    #[tokio::test]
    async fn log_follower_exiting_non_zero_is_secondary() {
        let fx = fixture();
        let runtime = ScriptedRuntime::new(&fx.journal).logs_exit(3);
        let report = lifecycle(runtime, None)
            .run(&fx.request, &CancellationToken::new())
            .await;

        assert!(report.is_success(), "{:?}", report.error);
        assert!(matches!(
            report.secondary.as_slice(),
            [SecondaryFailure::LogFollow(ExecError::NonZeroExit { code: 3, .. })]
        ));
    }

    #[tokio::test]
    async fn fatal_failure_fires_failure_signal() {
        let fx = fixture();
        let signal = CancellationToken::new();
        let runtime = ScriptedRuntime::new(&fx.journal).exec_exit("t-0", 1);
        let lc = lifecycle(runtime, None).with_failure_signal(signal.clone());

        let report = lc.run(&fx.request, &CancellationToken::new()).await;

        assert!(!report.is_success());
        assert!(signal.is_cancelled());
    }

    #[tokio::test]
    async fn success_and_cancellation_leave_failure_signal_alone() {
        let fx = fixture();
        let signal = CancellationToken::new();
        let lc = lifecycle(ScriptedRuntime::new(&fx.journal), None)
            .with_failure_signal(signal.clone());

        lc.run(&fx.request, &CancellationToken::new()).await;
        assert!(!signal.is_cancelled());

        let cancelled = CancellationToken::new();
        cancelled.cancel();
        lc.run(&fx.request, &cancelled).await;
        assert!(!signal.is_cancelled());
    }

    #[tokio::test]
    async fn cancel_during_workload_stops_exec_and_tears_down() {
        let fx = fixture();
        let runtime = ScriptedRuntime::new(&fx.journal).exec_sleep("t-0", 30);
        let lc = lifecycle(runtime, None);
        let cancel = CancellationToken::new();

        let trigger = cancel.clone();
        let journal = fx.journal.clone();
        tokio::spawn(async move {
            while !journal.has("exec", "t-0") {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
            trigger.cancel();
        });

        let report = tokio::time::timeout(Duration::from_secs(10), lc.run(&fx.request, &cancel))
            .await
            .expect("exec was not stopped on cancellation");

        assert!(matches!(
            report.error,
            Some(LifecycleError::Cancelled {
                phase: RunState::WorkloadRunning
            })
        ));
        assert_eq!(fx.journal.verbs_for("t-0").last().unwrap(), "destroy");
    }
}
