// prog_sim/src/cli.rs

use clap::Parser;
use std::path::PathBuf;

/// Runs an estimate-then-predict prognostics scenario against a simulated
/// ground truth and reports how well the predictions did.
#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// The path to the scenario TOML file to run.
    #[arg(short, long, default_value = "scenarios/thrown_object.toml")]
    pub scenario: PathBuf,

    /// Overrides the scenario's random seed.
    #[arg(long)]
    pub seed: Option<u64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parses_scenario_and_seed() {
        let cli = Cli::parse_from(["prog_sim", "--scenario", "a.toml", "--seed", "7"]);
        assert_eq!(cli.scenario, PathBuf::from("a.toml"));
        assert_eq!(cli.seed, Some(7));

        let defaults = Cli::parse_from(["prog_sim"]);
        assert_eq!(defaults.scenario, PathBuf::from("scenarios/thrown_object.toml"));
        assert_eq!(defaults.seed, None);
    }
}
