//! convbench CLI
//!
//! # Modes
//!
//! - default: compile and benchmark a convolution sweep, write a CSV
//! - `--roofline a.csv,b.csv`: analyze result tables against device ceilings

use clap::Parser;
use convbench::cli::{entrypoint, Cli};
use convbench::logging::init_logging;

fn main() {
    let cli = Cli::parse();

    if let Err(e) = init_logging(cli.log_level) {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }

    if let Err(e) = entrypoint(&cli) {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}
