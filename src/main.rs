mod cli;
mod copy_number_distribution;
mod copy_number_model;
mod errors;
mod expected_ploidy;
mod genotypes;
mod germline;
mod globals;
mod logger;
mod parameters;
mod pedigree;
mod prob_utils;
mod run_germline;
mod run_somatic;
mod run_stats;
mod sample_io;
mod sample_metrics;
mod segment;
mod segment_merger;
mod somatic;

use std::{error, process};

use hhmmss::Hhmmss;
use log::info;

use crate::cli::Commands;
use crate::globals::{PROGRAM_NAME, PROGRAM_VERSION};
use crate::logger::setup_output_dir_and_logger;
use crate::run_germline::run_germline;
use crate::run_somatic::run_somatic;

fn run(settings: &cli::Settings) -> Result<(), Box<dyn error::Error>> {
    info!("Starting {PROGRAM_NAME} {PROGRAM_VERSION}");
    info!(
        "cmdline: {}",
        std::env::args().collect::<Vec<_>>().join(" ")
    );
    info!("Running on {} threads", settings.shared.thread_count);

    let start = std::time::Instant::now();

    match &settings.command {
        Commands::Germline(x) => {
            run_germline(&settings.shared, x)?;
        }
        Commands::Somatic(x) => {
            run_somatic(&settings.shared, x)?;
        }
    }

    info!(
        "{PROGRAM_NAME} completed. Total Runtime: {}",
        start.elapsed().hhmmssxxx()
    );
    Ok(())
}

fn main() {
    let settings = cli::validate_and_fix_settings(cli::parse_settings());

    // Setup logger, including creation of the output directory for the log file:
    setup_output_dir_and_logger(
        settings.get_output_dir(),
        settings.shared.clobber,
        settings.shared.debug,
    );

    if let Err(err) = run(&settings) {
        eprintln!("{err}");
        process::exit(2);
    }
}
