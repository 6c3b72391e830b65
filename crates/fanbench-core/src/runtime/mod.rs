//! Command contract with the sandbox runtime.
//!
//! A [`SandboxRuntime`] only describes commands; running them is the job of
//! [`fanbench_exec::ProcSupervisor`]. Keeping the two apart lets tests swap the runtime
//! for scripted commands while exercising the real process handling.
mod docker;
pub use docker::DockerRuntime;

use std::path::{Path, PathBuf};

use fanbench_exec::CommandSpec;

/// Host directory bound into a sandbox.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mount {
    pub host: PathBuf,
    pub target: String,
}

impl Mount {
    /// `host:target`, the volume syntax of docker-compatible CLIs.
    pub fn as_volume_arg(&self) -> String {
        format!("{}:{}", self.host.display(), self.target)
    }
}

pub trait SandboxRuntime: Send + Sync + 'static {
    /// Short runtime name used in logs.
    fn name(&self) -> &'static str;

    /// Build `tag` from the context directory. Runs to completion before any sandbox starts.
    fn build_image(&self, tag: &str, context: &Path) -> CommandSpec;

    /// Start sandbox `name` from `image` with `mount`, running `command` as its main process.
    /// Stays in the foreground for the lifetime of the sandbox.
    fn create(&self, name: &str, image: &str, mount: &Mount, command: &[String]) -> CommandSpec;

    /// Exits zero iff sandbox `name` exists and is running.
    fn inspect(&self, name: &str) -> CommandSpec;

    /// Follow the sandbox's output until it is destroyed.
    fn logs(&self, name: &str) -> CommandSpec;

    /// Run `argv` inside sandbox `name`.
    fn exec(&self, name: &str, argv: &[String]) -> CommandSpec;

    /// Force-remove sandbox `name`.
    fn destroy(&self, name: &str) -> CommandSpec;
}
