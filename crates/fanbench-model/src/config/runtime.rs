use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Container runtime CLI used for every sandbox command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RuntimeConfig {
    /// Docker-compatible CLI binary. Default `"docker"`.
    pub program: String,
    /// How long an interrupted runtime command may take to exit after SIGTERM
    /// before its process group is killed. Default 10 s.
    pub stop_grace_ms: u64,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            program: "docker".to_string(),
            stop_grace_ms: 10_000,
        }
    }
}

/// Image shared by every run of a batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ImageConfig {
    /// Image tag. Default `"fio"`.
    pub tag: String,
    /// Build context directory. Default `"build"`.
    pub context: PathBuf,
    /// Build the image before the batch. Disable for images that already exist.
    pub build: bool,
}

impl Default for ImageConfig {
    fn default() -> Self {
        Self {
            tag: "fio".to_string(),
            context: PathBuf::from("build"),
            build: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SandboxConfig {
    /// Where the run workspace is mounted inside the sandbox. Default `"/datavolume"`.
    pub mount_target: String,
    /// Iterations of the one-second keepalive loop the sandbox runs as its main process.
    /// Bounds the sandbox lifetime if teardown never happens. Default 14400.
    pub keepalive_ticks: u64,
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            mount_target: "/datavolume".to_string(),
            keepalive_ticks: 14_400,
        }
    }
}

impl SandboxConfig {
    /// Shell loop used as the sandbox main process: prints a tick, lists the mount, sleeps.
    pub fn keepalive_script(&self) -> String {
        format!(
            "i=0; while [ $i -lt {ticks} ]; do i=$((i+1)); echo $i; ls {target}; sleep 1; done",
            ticks = self.keepalive_ticks,
            target = sh_quote(&self.mount_target),
        )
    }
}

/// Single-quote `s` for a POSIX shell.
fn sh_quote(s: &str) -> String {
    format!("'{}'", s.replace('\'', r"'\''"))
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ReadinessConfig {
    /// Pause between readiness probes. `0` probes back to back. Default 100 ms.
    pub interval_ms: u64,
}

impl Default for ReadinessConfig {
    fn default() -> Self {
        Self { interval_ms: 100 }
    }
}
