// prog_sim/src/lib.rs

//! Scenario runner for the prognostics engine: loads a scenario, simulates the
//! ground truth, and scores estimation plus prediction against it.

pub mod cli;
pub mod config;
pub mod runner;

pub use config::ScenarioConfig;
pub use runner::{run, RunReport};
