//! argo Command Line Interface
//!
//! This crate contains the `argo` binary that loads a snapshot of an abstract
//! reachability graph, consolidates the counterexamples found during
//! exploration and splits the graph into partitions whose residual conditions
//! can be verified independently.

use clap::Parser;
use cli::{Cli, initialize_logger, read_config, run_split, run_witnesses};
use human_panic::setup_panic;
use log::{debug, info};

mod argo_config;
mod cli;
mod snapshot;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    setup_panic!();

    // parse the cli arguments
    let cli = Cli::parse();
    initialize_logger(cli.log_config)?;
    info!("Welcome to argo!");

    match cli.command {
        cli::Commands::Split {
            input,
            splits,
            output,
            no_compress,
            waitlist_policy,
            no_consolidation,
        } => {
            let mut config = read_config(&input)?;

            // Options given on the command line override the configuration
            if let Some(splits) = splits {
                config.set_splits(splits);
            }
            if let Some(output) = output {
                config.set_output_template(output);
            }
            if no_compress {
                config.set_compress(false);
            }
            if let Some(policy) = waitlist_policy {
                config.set_waitlist_policy(policy.into());
            }
            if no_consolidation {
                config.set_consolidate_counterexamples(false);
            }
            debug!("Using configuration: {config:?}");

            run_split(input, config)?;
            info!("Finished splitting. Goodbye!");
            Ok(())
        }
        cli::Commands::Witnesses { input } => {
            run_witnesses(input)?;
            info!("Finished counterexample consolidation. Goodbye!");
            Ok(())
        }
    }
}
