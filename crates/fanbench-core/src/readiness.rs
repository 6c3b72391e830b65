use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use fanbench_exec::ProcSupervisor;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use crate::{error::ReadinessError, runtime::SandboxRuntime};

/// One readiness check of a sandbox.
#[async_trait]
pub trait Probe: Send + Sync + 'static {
    async fn is_ready(&self, sandbox: &str, cancel: &CancellationToken) -> bool;
}

/// Probe backed by the runtime's inspect command: ready iff it exits zero.
pub struct RuntimeProbe {
    runtime: Arc<dyn SandboxRuntime>,
    supervisor: ProcSupervisor,
}

impl RuntimeProbe {
    pub fn new(runtime: Arc<dyn SandboxRuntime>, supervisor: ProcSupervisor) -> Self {
        Self {
            runtime,
            supervisor,
        }
    }
}

#[async_trait]
impl Probe for RuntimeProbe {
    async fn is_ready(&self, sandbox: &str, cancel: &CancellationToken) -> bool {
        let spec = self.runtime.inspect(sandbox).quiet().kill_on_drop(true);
        self.supervisor.probe(&spec, cancel).await
    }
}

/// Re-probes a sandbox until it is ready or the token fires.
///
/// There is no attempt or time limit: a sandbox that never becomes ready is polled
/// until cancellation.
pub struct ReadinessPoller {
    probe: Arc<dyn Probe>,
    interval: Duration,
}

impl ReadinessPoller {
    /// `interval` is the pause between failed probes; zero polls back to back.
    pub fn new(probe: Arc<dyn Probe>, interval: Duration) -> Self {
        Self { probe, interval }
    }

    /// Returns the number of probes it took.
    pub async fn wait_until_ready(
        &self,
        sandbox: &str,
        cancel: &CancellationToken,
    ) -> Result<u64, ReadinessError> {
        let mut attempts = 0u64;
        loop {
            if cancel.is_cancelled() {
                return Err(ReadinessError::Cancelled { attempts });
            }

            attempts += 1;
            let ready = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(ReadinessError::Cancelled { attempts }),
                ready = self.probe.is_ready(sandbox, cancel) => ready,
            };
            if ready {
                debug!(target: "fanbench.readiness", %sandbox, attempts, "sandbox ready");
                return Ok(attempts);
            }
            trace!(target: "fanbench.readiness", %sandbox, attempts, "not ready yet");

            if self.interval.is_zero() {
                tokio::task::yield_now().await;
                continue;
            }
            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(ReadinessError::Cancelled { attempts }),
                _ = tokio::time::sleep(self.interval) => {}
            }
        }
    }
}
