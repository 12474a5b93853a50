// prog_sim/src/main.rs

use anyhow::{ensure, Context, Result};
use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use prog_sim::cli::Cli;
use prog_sim::{run, ScenarioConfig};

fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,prog_core=debug"));
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();

    // A missing file would otherwise load as an empty scenario.
    ensure!(
        cli.scenario.is_file(),
        "scenario file not found: {}",
        cli.scenario.display()
    );
    let mut config = ScenarioConfig::load(&cli.scenario)
        .with_context(|| format!("loading scenario {}", cli.scenario.display()))?;
    if let Some(seed) = cli.seed {
        config.simulation.seed = seed;
    }
    tracing::info!(scenario = %cli.scenario.display(), seed = config.simulation.seed, "Starting run");

    let report = run(&config)?;
    report.log_summary();
    Ok(())
}
