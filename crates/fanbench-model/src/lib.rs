mod config;
pub use config::{
    BenchConfig, ImageConfig, ReadinessConfig, RuntimeConfig, SandboxConfig, WorkloadConfig,
    WorkloadPattern,
};

mod domain;
pub use domain::{RunRequest, RunState};

mod error;
pub use error::ConfigError;
