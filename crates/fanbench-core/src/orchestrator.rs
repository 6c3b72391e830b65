use std::{
    collections::HashMap, num::NonZeroUsize, path::PathBuf, sync::Arc, time::Duration,
};

use fanbench_exec::ProcSupervisor;
use fanbench_model::{BenchConfig, RunRequest, RunState};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, instrument};

use crate::{
    error::{BatchError, LifecycleError, SetupError},
    lifecycle::{RunReport, SandboxLifecycle},
    readiness::{Probe, ReadinessPoller, RuntimeProbe},
    runtime::SandboxRuntime,
};

/// Runs a batch of sandboxed benchmark runs concurrently.
pub struct Orchestrator {
    config: BenchConfig,
    runtime: Arc<dyn SandboxRuntime>,
    probe: Arc<dyn Probe>,
    supervisor: ProcSupervisor,
}

impl Orchestrator {
    /// Readiness is probed with the runtime's inspect command unless [`Orchestrator::with_probe`] replaces it.
    pub fn new(config: BenchConfig, runtime: Arc<dyn SandboxRuntime>) -> Self {
        let supervisor = ProcSupervisor::new(Duration::from_millis(config.runtime.stop_grace_ms));
        let probe = Arc::new(RuntimeProbe::new(Arc::clone(&runtime), supervisor.clone()));
        Self {
            config,
            runtime,
            probe,
            supervisor,
        }
    }

    pub fn with_probe(mut self, probe: Arc<dyn Probe>) -> Self {
        self.probe = probe;
        self
    }

    /// Prepare the image, create one workspace per run, run every lifecycle concurrently
    /// and wait for all of them.
    ///
    /// Setup failures return before any run starts. Run failures are in the
    /// [`BatchOutcome`]; the first one cancels the rest of the batch (not `cancel` itself).
    #[instrument(level = "debug", skip(self, cancel), fields(prefix = %self.config.name_prefix))]
    pub async fn run_batch(
        &self,
        count: NonZeroUsize,
        cancel: &CancellationToken,
    ) -> Result<BatchOutcome, SetupError> {
        let prefix = self.config.name_prefix.as_str();
        if !RunRequest::is_valid_prefix(prefix) {
            return Err(SetupError::InvalidPrefix(prefix.to_string()));
        }

        info!(target: "fanbench.orchestrator", count = count.get(), runtime = self.runtime.name(), "running {count} run(s) concurrently");
        self.prepare_image(cancel).await?;

        let root = self.prepare_root().await?;
        let requests = RunRequest::batch(prefix, count, &root);
        for request in &requests {
            create_dir(request.workspace().to_path_buf()).await?;
        }

        let batch = cancel.child_token();
        let poller = Arc::new(ReadinessPoller::new(
            Arc::clone(&self.probe),
            Duration::from_millis(self.config.readiness.interval_ms),
        ));
        let lifecycle = Arc::new(
            SandboxLifecycle::new(
                Arc::clone(&self.runtime),
                poller,
                self.supervisor.clone(),
                self.config.image.tag.clone(),
                self.config.sandbox.clone(),
                self.config.workload.clone(),
            )
            .with_failure_signal(batch.clone()),
        );

        let mut set = JoinSet::new();
        let mut pending = HashMap::with_capacity(requests.len());
        for request in requests {
            let lifecycle = Arc::clone(&lifecycle);
            let token = batch.clone();
            let task_request = request.clone();
            let handle = set.spawn(async move { lifecycle.run(&task_request, &token).await });
            pending.insert(handle.id(), request);
        }

        let mut runs = Vec::with_capacity(count.get());
        while let Some(joined) = set.join_next_with_id().await {
            match joined {
                Ok((id, report)) => {
                    pending.remove(&id);
                    runs.push(report);
                }
                Err(e) => {
                    batch.cancel();
                    let Some(request) = pending.remove(&e.id()) else {
                        error!(target: "fanbench.orchestrator", error = %e, "unknown run task failed");
                        continue;
                    };
                    error!(target: "fanbench.orchestrator", sandbox = request.name(), error = %e, "run task aborted; destroying its sandbox");
                    let mut report = RunReport::aborted(&request, e.to_string());
                    let destroy = self.runtime.destroy(request.name());
                    report.destroy_issued = self
                        .supervisor
                        .run(&destroy, &CancellationToken::new())
                        .await
                        .is_ok();
                    report.history.push(RunState::TornDown);
                    runs.push(report);
                }
            }
        }

        runs.sort_by_key(|r| r.index);
        Ok(BatchOutcome { runs })
    }

    async fn prepare_image(&self, cancel: &CancellationToken) -> Result<(), SetupError> {
        let image = &self.config.image;
        if !image.build {
            info!(target: "fanbench.orchestrator", image = %image.tag, "image build disabled; using existing image");
            return Ok(());
        }

        info!(target: "fanbench.orchestrator", image = %image.tag, context = %image.context.display(), "building image");
        let build = self.runtime.build_image(&image.tag, &image.context);
        self.supervisor
            .run(&build, cancel)
            .await
            .map_err(SetupError::ImageBuild)
    }

    /// Create the workspace root and resolve it to an absolute path for volume mounts.
    async fn prepare_root(&self) -> Result<PathBuf, SetupError> {
        let root = self.config.workspace_root.clone();
        create_dir(root.clone()).await?;
        tokio::fs::canonicalize(&root)
            .await
            .map_err(|source| SetupError::Workspace { path: root, source })
    }
}

async fn create_dir(path: PathBuf) -> Result<(), SetupError> {
    tokio::fs::create_dir_all(&path)
        .await
        .map_err(|source| SetupError::Workspace { path, source })
}

/// Results of every run of a batch, in index order.
#[derive(Debug)]
pub struct BatchOutcome {
    runs: Vec<RunReport>,
}

impl BatchOutcome {
    pub fn runs(&self) -> &[RunReport] {
        &self.runs
    }

    pub fn is_success(&self) -> bool {
        self.runs.iter().all(RunReport::is_success)
    }

    /// The run that failed first.
    ///
    /// Real failures win over cancellations: when one run fails and cancels its siblings,
    /// the siblings' cancellations must not hide the failure that caused them.
    pub fn first_failure(&self) -> Option<&RunReport> {
        self.first_failure_index().map(|i| &self.runs[i])
    }

    fn first_failure_index(&self) -> Option<usize> {
        self.runs
            .iter()
            .enumerate()
            .filter_map(|(i, run)| {
                let error = run.error.as_ref()?;
                Some((error.is_cancelled(), run.failed_at, i))
            })
            .min()
            .map(|(_, _, i)| i)
    }

    /// Collapse the batch into its first failure.
    pub fn into_result(mut self) -> Result<Self, BatchError> {
        match self.take_first_failure() {
            Some((name, source)) => Err(BatchError::Run { name, source }),
            None => Ok(self),
        }
    }

    fn take_first_failure(&mut self) -> Option<(String, LifecycleError)> {
        let index = self.first_failure_index()?;
        let run = &mut self.runs[index];
        Some((run.name.clone(), run.error.take()?))
    }
}
