use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use fanbench_core::{BatchOutcome, CancellationBridge, DockerRuntime, Orchestrator};
use fanbench_observe::logger_init;

mod cli;
use cli::Cli;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    logger_init(&cli.logger_config())?;
    let config = cli.bench_config()?;
    info!(
        target: "fanbench",
        prefix = %config.name_prefix,
        image = %config.image.tag,
        runtime = %config.runtime.program,
        workspace_root = %config.workspace_root.display(),
        "configuration loaded"
    );

    let cancel = CancellationToken::new();
    let bridge = CancellationBridge::spawn(cancel.clone())
        .context("unable to subscribe to termination signals")?;

    let runtime = Arc::new(DockerRuntime::new(&config.runtime));
    let orchestrator = Orchestrator::new(config, runtime);
    let result = orchestrator.run_batch(cli.count, &cancel).await;
    bridge.abort();

    let outcome = result?;
    summarize(&outcome);
    outcome.into_result()?;
    info!(target: "fanbench", "all runs completed");
    Ok(())
}

fn summarize(outcome: &BatchOutcome) {
    for run in outcome.runs() {
        for failure in &run.secondary {
            warn!(target: "fanbench", sandbox = %run.name, error = %failure, "secondary failure");
        }
        match &run.error {
            None => info!(
                target: "fanbench",
                sandbox = %run.name,
                outcome = %run.outcome(),
                destroyed = run.destroy_issued,
                "run summary"
            ),
            Some(e) => error!(
                target: "fanbench",
                sandbox = %run.name,
                outcome = %run.outcome(),
                destroyed = run.destroy_issued,
                error = %e,
                "run summary"
            ),
        }
    }
}
