//! Command-line interface of the `fanbench` binary.

use std::{num::NonZeroUsize, path::PathBuf};

use anyhow::{Context, Result};
use clap::Parser;
use fanbench_model::BenchConfig;
use fanbench_observe::{LoggerConfig, LoggerFormat};

/// Run COUNT fio benchmarks concurrently, each in its own container with its own volume.
#[derive(Parser, Debug)]
#[command(name = "fanbench")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Number of concurrent runs.
    #[arg(value_name = "COUNT", default_value = "1")]
    pub count: NonZeroUsize,

    /// JSON config file. Flags below override its values.
    #[arg(short = 'c', long, env = "FANBENCH_CONFIG")]
    pub config: Option<PathBuf>,

    /// Sandbox name prefix; runs are named `<prefix>-<index>`.
    #[arg(long, env = "FANBENCH_PREFIX")]
    pub prefix: Option<String>,

    /// Image tag to build and run.
    #[arg(long, env = "FANBENCH_IMAGE")]
    pub image: Option<String>,

    /// Build context directory for the image.
    #[arg(long, env = "FANBENCH_BUILD_CONTEXT")]
    pub build_context: Option<PathBuf>,

    /// Use an existing image instead of building it.
    #[arg(long, env = "FANBENCH_NO_BUILD")]
    pub no_build: bool,

    /// Directory holding one workspace per run.
    #[arg(long, env = "FANBENCH_WORKSPACE_ROOT")]
    pub workspace_root: Option<PathBuf>,

    /// Container runtime program (docker-compatible CLI).
    #[arg(long, env = "FANBENCH_RUNTIME")]
    pub runtime: Option<String>,

    /// Interval between readiness probes, in milliseconds.
    #[arg(long, env = "FANBENCH_PROBE_INTERVAL_MS")]
    pub probe_interval_ms: Option<u64>,

    /// Log format: text, json or journald.
    #[arg(long, env = "FANBENCH_LOG_FORMAT", default_value = "text")]
    pub log_format: LoggerFormat,

    /// Log filter directive, e.g. `info` or `fanbench=debug`.
    #[arg(long, env = "FANBENCH_LOG", default_value = "info")]
    pub log_level: String,
}

impl Cli {
    pub fn logger_config(&self) -> LoggerConfig {
        LoggerConfig {
            format: self.log_format,
            directive: self.log_level.clone(),
            ..Default::default()
        }
    }

    /// Load the config file (or defaults), apply flag overrides and validate the result.
    pub fn bench_config(&self) -> Result<BenchConfig> {
        let mut cfg = match &self.config {
            Some(path) => BenchConfig::load(path)?,
            None => BenchConfig::default(),
        };

        if let Some(prefix) = &self.prefix {
            cfg.name_prefix = prefix.clone();
        }
        if let Some(image) = &self.image {
            cfg.image.tag = image.clone();
        }
        if let Some(context) = &self.build_context {
            cfg.image.context = context.clone();
        }
        if self.no_build {
            cfg.image.build = false;
        }
        if let Some(root) = &self.workspace_root {
            cfg.workspace_root = root.clone();
        }
        if let Some(runtime) = &self.runtime {
            cfg.runtime.program = runtime.clone();
        }
        if let Some(ms) = self.probe_interval_ms {
            cfg.readiness.interval_ms = ms;
        }

        cfg.validate().context("invalid configuration")?;
        Ok(cfg)
    }
}
