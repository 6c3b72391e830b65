use std::fmt;

use serde::{Deserialize, Serialize};

/// I/O access pattern passed to fio as `--rw`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkloadPattern {
    Read,
    Write,
    RandRead,
    RandWrite,
    #[serde(rename = "rw")]
    ReadWrite,
    RandRw,
}

impl WorkloadPattern {
    pub fn as_fio(&self) -> &'static str {
        match self {
            WorkloadPattern::Read => "read",
            WorkloadPattern::Write => "write",
            WorkloadPattern::RandRead => "randread",
            WorkloadPattern::RandWrite => "randwrite",
            WorkloadPattern::ReadWrite => "rw",
            WorkloadPattern::RandRw => "randrw",
        }
    }
}

impl fmt::Display for WorkloadPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_fio())
    }
}

/// Parameters of the fio job executed inside every sandbox.
///
/// The defaults describe a long sequential-read soak: three jobs reading an 8 MiB file
/// with 4 KiB direct I/O at queue depth 256 for four hours.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct WorkloadConfig {
    /// Workload generator binary inside the image. Default `"fio"`.
    pub program: String,
    /// `--numjobs`. Default 3.
    pub jobs: u32,
    /// `--size` in bytes. Default 8 MiB.
    pub size_bytes: u64,
    /// `--time_based`: keep running for `runtime_secs` even after `size_bytes` is consumed. Default on.
    pub time_based: bool,
    /// `--runtime` in seconds. Default 14400 (4h).
    pub runtime_secs: u64,
    /// `--ramp_time` in seconds, excluded from results. Default 2.
    pub ramp_time_secs: u64,
    /// `--ioengine`. Default `"libaio"`.
    pub io_engine: String,
    /// `--direct`: bypass the page cache. Default on.
    pub direct: bool,
    /// `--verify`. Default off.
    pub verify: bool,
    /// `--bs` in bytes. Default 4096.
    pub block_size: u32,
    /// `--iodepth`. Default 256.
    pub io_depth: u32,
    /// `--rw`. Default sequential read.
    pub pattern: WorkloadPattern,
    /// `--group_reporting`: one aggregated report for all jobs. Default on.
    pub group_reporting: bool,
    /// `--kb_base`. Default 1024.
    pub kb_base: u32,
    /// `--unit_base`: 8 reports bits, 1 reports bytes. Default 8.
    pub unit_base: u32,
}

impl Default for WorkloadConfig {
    fn default() -> Self {
        Self {
            program: "fio".to_string(),
            jobs: 3,
            size_bytes: 8 * 1024 * 1024,
            time_based: true,
            runtime_secs: 14_400,
            ramp_time_secs: 2,
            io_engine: "libaio".to_string(),
            direct: true,
            verify: false,
            block_size: 4096,
            io_depth: 256,
            pattern: WorkloadPattern::Read,
            group_reporting: true,
            kb_base: 1024,
            unit_base: 8,
        }
    }
}

impl WorkloadConfig {
    /// Full command line (program first) for one job writing into `directory`.
    pub fn command_line(&self, job_name: &str, directory: &str) -> Vec<String> {
        let mut argv = Vec::with_capacity(20);
        argv.push(self.program.clone());
        argv.extend(["--name".to_string(), job_name.to_string()]);
        argv.extend(["--directory".to_string(), directory.to_string()]);
        argv.push(format!("--numjobs={}", self.jobs));
        argv.push(format!("--size={}", self.size_bytes));
        if self.time_based {
            argv.push("--time_based".to_string());
        }
        argv.push(format!("--runtime={}s", self.runtime_secs));
        argv.push(format!("--ramp_time={}s", self.ramp_time_secs));
        argv.push(format!("--ioengine={}", self.io_engine));
        argv.push(format!("--direct={}", u8::from(self.direct)));
        argv.push(format!("--verify={}", u8::from(self.verify)));
        argv.push(format!("--bs={}", self.block_size));
        argv.push(format!("--iodepth={}", self.io_depth));
        argv.push(format!("--rw={}", self.pattern));
        argv.push(format!("--group_reporting={}", u8::from(self.group_reporting)));
        argv.push(format!("--kb_base={}", self.kb_base));
        argv.push(format!("--unit_base={}", self.unit_base));
        argv
    }

    pub(crate) fn validate(&self) -> Result<(), String> {
        if self.program.trim().is_empty() {
            return Err("workload.program is empty".into());
        }
        if self.io_engine.trim().is_empty() {
            return Err("workload.ioEngine is empty".into());
        }
        let positive = [
            ("workload.jobs", u64::from(self.jobs)),
            ("workload.sizeBytes", self.size_bytes),
            ("workload.blockSize", u64::from(self.block_size)),
            ("workload.ioDepth", u64::from(self.io_depth)),
        ];
        if let Some((field, _)) = positive.iter().find(|(_, v)| *v == 0) {
            return Err(format!("{field} must be greater than zero"));
        }
        if self.time_based && self.runtime_secs == 0 {
            return Err("workload.runtimeSecs must be greater than zero for a time based job".into());
        }
        Ok(())
    }
}
