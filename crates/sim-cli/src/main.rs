// Copyright (c) reifydb.com 2025
// This file is licensed under the AGPL-3.0-or-later, see license.md file

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use sim_core::{ScenarioConfig, Simulation};
use tracing::{error, info};

#[derive(Parser)]
#[command(name = "radio-sim")]
#[command(about = "Downlink radio-resource-allocation discrete-event simulator", long_about = None)]
#[command(version)]
struct Cli {
	/// Path to a scenario description (JSON)
	scenario: PathBuf,

	/// Overrides the scenario's RNG seed
	#[arg(long)]
	seed: Option<u64>,

	/// Overrides the scenario's trace output directory
	#[arg(short = 'o', long)]
	output_dir: Option<PathBuf>,

	/// Overrides the scenario's simulated run length, in milliseconds
	#[arg(long)]
	stop_time_ms: Option<u64>,
}

fn main() -> ExitCode {
	tracing_subscriber::fmt().with_env_filter(tracing_subscriber::EnvFilter::from_default_env()).init();

	let cli = Cli::parse();
	match run(cli) {
		Ok(()) => ExitCode::SUCCESS,
		Err(err) => {
			error!(%err, "simulation aborted");
			ExitCode::FAILURE
		}
	}
}

fn run(cli: Cli) -> sim_core::SimResult<()> {
	let mut config = ScenarioConfig::from_path(&cli.scenario)?;
	if let Some(seed) = cli.seed {
		config.seed = seed;
	}
	if let Some(dir) = cli.output_dir {
		config.output_dir = dir;
	}
	if let Some(stop_time_ms) = cli.stop_time_ms {
		config.stop_time_ms = stop_time_ms;
	}

	info!(scenario = %cli.scenario.display(), seed = config.seed, num_rbs = config.num_rbs, "starting simulation");
	let mut simulation = Simulation::build(config)?;
	let summary = simulation.run()?;
	info!(dispatched = summary.dispatched, final_time = %summary.final_time, "simulation complete");
	Ok(())
}
