// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Au-Zone Technologies

mod board;
mod capture;
mod configure;
mod error;
mod metrics;
mod probe;
mod sensors;
mod utils;

use clap::{Parser, Subcommand};
use error::result_to_exit_code;
use std::process::ExitCode;

/// xisp CLI - Xilinx ISP pipeline discovery, configuration and capture tool
#[derive(Parser)]
#[command(name = "xisp")]
#[command(version)]
#[command(about = "xisp CLI - Xilinx ISP pipeline discovery, configuration and capture tool")]
#[command(long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Enable verbose logging (use RUST_LOG=debug for more)
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Suppress non-error output
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Output results in JSON format
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List the sensor capability table
    Sensors(sensors::Args),

    /// Discover camera pipelines and show their entities
    Probe(probe::Args),

    /// Apply a stream configuration and show the per-stage formats
    Configure(configure::Args),

    /// Capture frames and measure performance
    Capture(capture::Args),
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    init_logging(cli.verbose, cli.quiet);

    let result = match cli.command {
        Commands::Sensors(args) => sensors::execute(args, cli.json),
        Commands::Probe(args) => probe::execute(args, cli.json),
        Commands::Configure(args) => configure::execute(args, cli.json),
        Commands::Capture(args) => capture::execute(args, cli.json),
    };

    result_to_exit_code(result)
}

/// Initialize env_logger based on verbosity flags
fn init_logging(verbose: bool, quiet: bool) {
    let env = env_logger::Env::default();

    let env = if quiet {
        env.default_filter_or("error")
    } else if verbose {
        env.default_filter_or("debug")
    } else {
        env.default_filter_or("info")
    };

    env_logger::Builder::from_env(env)
        .format_timestamp(None)
        .format_target(false)
        .init();

    log::debug!("Logging initialized, xisp {}", xisp::version());
}
