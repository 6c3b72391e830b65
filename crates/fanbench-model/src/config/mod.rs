mod runtime;
pub use runtime::{ImageConfig, ReadinessConfig, RuntimeConfig, SandboxConfig};

mod workload;
pub use workload::{WorkloadConfig, WorkloadPattern};

use std::{
    fs,
    path::{Path, PathBuf},
};

use serde::{Deserialize, Serialize};

use crate::{domain::RunRequest, error::ConfigError};

/// Complete configuration of a benchmark batch.
///
/// Every field has a default, so a config file only needs the values it changes:
/// ```json
/// { "namePrefix": "nvme", "workload": { "pattern": "randread", "ioDepth": 32 } }
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct BenchConfig {
    /// Prefix of every sandbox name. Default `"test-fio"`.
    pub name_prefix: String,
    /// Host directory holding one subdirectory per run. Default `"docker_host_volume"`.
    pub workspace_root: PathBuf,
    pub runtime: RuntimeConfig,
    pub image: ImageConfig,
    pub sandbox: SandboxConfig,
    pub readiness: ReadinessConfig,
    pub workload: WorkloadConfig,
}

impl Default for BenchConfig {
    fn default() -> Self {
        Self {
            name_prefix: "test-fio".to_string(),
            workspace_root: PathBuf::from("docker_host_volume"),
            runtime: RuntimeConfig::default(),
            image: ImageConfig::default(),
            sandbox: SandboxConfig::default(),
            readiness: ReadinessConfig::default(),
            workload: WorkloadConfig::default(),
        }
    }
}

impl BenchConfig {
    /// Read a JSON config file. Missing fields take their defaults.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&raw).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let checks = [
            ("namePrefix", self.name_prefix.as_str()),
            ("runtime.program", self.runtime.program.as_str()),
            ("image.tag", self.image.tag.as_str()),
            ("sandbox.mountTarget", self.sandbox.mount_target.as_str()),
        ];
        if let Some((field, _)) = checks.iter().find(|(_, v)| v.trim().is_empty()) {
            return Err(ConfigError::Invalid(format!("{field} is empty")));
        }
        if !RunRequest::is_valid_prefix(&self.name_prefix) {
            return Err(ConfigError::Invalid(format!(
                "namePrefix {:?} must match [A-Za-z0-9][A-Za-z0-9_.-]*",
                self.name_prefix
            )));
        }
        if self.workspace_root.as_os_str().is_empty() {
            return Err(ConfigError::Invalid("workspaceRoot is empty".into()));
        }
        if !self.sandbox.mount_target.starts_with('/') {
            return Err(ConfigError::Invalid(format!(
                "sandbox.mountTarget must be absolute, got {:?}",
                self.sandbox.mount_target
            )));
        }
        self.workload.validate().map_err(ConfigError::Invalid)
    }
}
