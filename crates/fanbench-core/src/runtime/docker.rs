use std::path::Path;

use fanbench_exec::CommandSpec;
use fanbench_model::RuntimeConfig;

use super::{Mount, SandboxRuntime};

/// Docker-compatible CLI (`docker`, `podman`, ...).
#[derive(Debug, Clone)]
pub struct DockerRuntime {
    program: String,
}

impl DockerRuntime {
    pub fn new(cfg: &RuntimeConfig) -> Self {
        Self {
            program: cfg.program.clone(),
        }
    }

    fn command(&self) -> CommandSpec {
        CommandSpec::new(&self.program)
    }
}

impl SandboxRuntime for DockerRuntime {
    fn name(&self) -> &'static str {
        "docker"
    }

    fn build_image(&self, tag: &str, context: &Path) -> CommandSpec {
        self.command()
            .args(["build", "-t", tag])
            .arg(context.display().to_string())
    }

    fn create(&self, name: &str, image: &str, mount: &Mount, command: &[String]) -> CommandSpec {
        self.command()
            .args(["run", "--rm", "--init", "--name", name])
            .args(["-v".to_string(), mount.as_volume_arg()])
            .arg(image)
            .args(command.iter().cloned())
    }

    fn inspect(&self, name: &str) -> CommandSpec {
        self.command()
            .args(["inspect", name])
            .quiet()
            .kill_on_drop(true)
    }

    fn logs(&self, name: &str) -> CommandSpec {
        self.command().args(["logs", "-f", name])
    }

    fn exec(&self, name: &str, argv: &[String]) -> CommandSpec {
        self.command().args(["exec", name]).args(argv.iter().cloned())
    }

    fn destroy(&self, name: &str) -> CommandSpec {
        self.command().args(["rm", "-f", name])
    }
}
