mod error;
pub use error::{BatchError, LifecycleError, ReadinessError, SecondaryFailure, SetupError};

pub mod runtime;
pub use runtime::{DockerRuntime, Mount, SandboxRuntime};

pub mod readiness;
pub use readiness::{Probe, ReadinessPoller, RuntimeProbe};

pub mod lifecycle;
pub use lifecycle::{RunReport, SandboxLifecycle};

pub mod orchestrator;
pub use orchestrator::{BatchOutcome, Orchestrator};

pub mod signal;
pub use signal::CancellationBridge;

#[cfg(test)]
mod testing;
