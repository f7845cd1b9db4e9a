//! Command Line Interface for argo
//!
//! argo uses the `clap` crate to parse command line arguments. This module
//! defines all available commands and options (and their documentation) as
//! well as the functions that assemble and run the pipeline.

use std::{fs, num::NonZeroUsize, path::PathBuf, thread, time::Duration};

use anyhow::{Context, anyhow};
use clap::{Args, Parser, Subcommand, ValueEnum};
use config::Config;
use log::{LevelFilter, error, info, warn};
use log4rs::{
    append::console::ConsoleAppender,
    config::{Appender, Root},
    encode::pattern::PatternEncoder,
};

use argo_algorithm::{
    Algorithm, FixedStatusAlgorithm, ReportingAlgorithm, ShutdownNotifier, Statistics,
    StatisticsProvider,
    condition::ConditionExporter,
    consolidation::{CounterexampleConsolidator, PathWitnessOracle},
    partitioning::{GraphPartitioner, WaitlistPolicy},
};
use argo_reachability_graph::ReachabilityGraph;

use crate::{argo_config::ArgoConfig, snapshot::GraphSnapshot};

/// argo - partitioning of abstract reachability graphs
///
/// argo reads a snapshot of an abstract reachability graph, attaches
/// witnesses to the reached target nodes and splits the graph into disjoint
/// partitions. For every partition a residual condition is written, which can
/// be verified independently of the other partitions.
///
/// You can use the --help / -h flag to get all available commands and
/// options.
#[derive(Parser, Debug)]
#[command(version, name = "argo", about, long_about)]
pub(crate) struct Cli {
    #[command(flatten)]
    pub(crate) log_config: LoggerConfig,
    #[command(subcommand)]
    pub(crate) command: Commands,
}

#[derive(Subcommand, Debug)]
pub(crate) enum Commands {
    /// Split the graph into partitions and export their residual conditions
    Split {
        #[command(flatten)]
        input: SnapshotInput,

        /// Number of partitions
        #[arg(short = 'n', long, value_name = "SPLITS")]
        splits: Option<NonZeroUsize>,

        /// Output path template, must contain `%d` exactly once
        #[arg(short, long, value_name = "TEMPLATE")]
        output: Option<String>,

        /// Write the residual conditions without gzip compression
        #[arg(long, default_value_t = false)]
        no_compress: bool,

        /// Behaviour if the exploration did not terminate
        #[arg(long, value_enum, value_name = "POLICY")]
        waitlist_policy: Option<WaitlistPolicyOption>,

        /// Do not attach witnesses to target nodes before splitting
        #[arg(long, default_value_t = false)]
        no_consolidation: bool,
    },
    /// Attach witnesses to all target nodes and report them
    Witnesses {
        #[command(flatten)]
        input: SnapshotInput,
    },
}

#[derive(Args, Debug)]
pub(crate) struct SnapshotInput {
    /// Location of the JSON snapshot of the reachability graph
    snapshot_file: PathBuf,

    /// Configuration file for the pipeline
    #[arg(short, long, value_name = "CONFIG_FILE")]
    config_file: Option<PathBuf>,

    /// Cancel the run after the given number of seconds
    #[arg(short, long, value_name = "SECONDS")]
    timeout: Option<u64>,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, ValueEnum)]
pub(crate) enum WaitlistPolicyOption {
    /// Log a warning and split the explored part of the graph (default)
    Warn,
    /// Fail if nodes are left on the waitlist
    Fail,
}

impl From<WaitlistPolicyOption> for WaitlistPolicy {
    fn from(value: WaitlistPolicyOption) -> Self {
        match value {
            WaitlistPolicyOption::Warn => WaitlistPolicy::Warn,
            WaitlistPolicyOption::Fail => WaitlistPolicy::Fail,
        }
    }
}

#[derive(Args, Debug)]
pub(crate) struct LoggerConfig {
    /// Read the logger configuration from file.
    /// Logger configuration can be provided in the log4rs specification format.
    #[arg(long)]
    logger_config_file: Option<String>,

    /// Enable debug output.
    /// **Note**: This flag must be passed first, before any command.
    #[arg(short, long, default_value_t = false)]
    debug: bool,
}

/// Initialize the logger as specified in `cfg`
///
/// By default the logger is configured to log to stdout. If a log4rs
/// configuration file is given in `cfg`, the configuration from that file will
/// be used instead
pub(crate) fn initialize_logger(cfg: LoggerConfig) -> Result<(), anyhow::Error> {
    if let Some(f) = cfg.logger_config_file {
        log4rs::init_file(f, Default::default())
            .with_context(|| "Failed to read logger config file")?;
        return Ok(());
    }

    let p_encoder = match cfg.debug {
        true => PatternEncoder::new("{d(%Y-%m-%d %H:%M:%S)} - {h({l})} - [{f}:{L} - {M}] - {m}{n}"),
        false => PatternEncoder::new("{d(%H:%M:%S)} - {h({l})} - {m}{n}"),
    };

    let stdout = ConsoleAppender::builder()
        .encoder(Box::new(p_encoder))
        .build();

    let mut level = LevelFilter::Info;
    if cfg.debug {
        level = LevelFilter::Debug;
    }

    let log_config = log4rs::Config::builder()
        .appender(Appender::builder().build("stdout", Box::new(stdout)))
        .build(Root::builder().appender("stdout").build(level))
        .with_context(|| "Failed to build logger configuration")?;

    log4rs::init_config(log_config).with_context(|| "Failed to initialize console logger")?;
    Ok(())
}

/// Read the configuration file (if any) and the `ARGO_` environment
pub(crate) fn read_config(input: &SnapshotInput) -> Result<ArgoConfig, anyhow::Error> {
    let mut settings = Config::builder();

    if let Some(config_file) = &input.config_file {
        if !config_file.exists() {
            return Err(anyhow!(
                "Specified configuration file '{}' does not exist.",
                config_file.display()
            ));
        }

        settings = settings.add_source(config::File::from(config_file.as_path()));
    }

    settings = settings.add_source(
        config::Environment::with_prefix("ARGO")
            .prefix_separator("_")
            .separator("__"),
    );

    settings
        .build()?
        .try_deserialize::<ArgoConfig>()
        .with_context(|| "Invalid configuration")
}

/// Read and parse the snapshot file
pub(crate) fn load_snapshot(input: &SnapshotInput) -> Result<GraphSnapshot, anyhow::Error> {
    let json = fs::read_to_string(&input.snapshot_file).with_context(|| {
        format!(
            "Unable to read snapshot file '{}'",
            input.snapshot_file.display()
        )
    })?;

    let snapshot = GraphSnapshot::from_json(&json)?;
    info!(
        "Loaded reachability graph with {} node(s) from '{}'",
        snapshot.graph().node_count(),
        input.snapshot_file.display()
    );
    Ok(snapshot)
}

/// Request a shutdown through `notifier` once `timeout` seconds have passed
fn arm_timeout(notifier: &ShutdownNotifier, timeout: Option<u64>) {
    let Some(secs) = timeout else {
        return;
    };

    let notifier = notifier.clone();
    thread::spawn(move || {
        thread::sleep(Duration::from_secs(secs));
        notifier.request_shutdown(format!("timeout of {secs}s reached"));
    });
}

/// Build the algorithm that replays the snapshot, optionally followed by
/// counterexample consolidation
fn build_exploration(
    snapshot: GraphSnapshot,
    consolidate: bool,
    notifier: &ShutdownNotifier,
) -> (ReachabilityGraph, Box<dyn ReportingAlgorithm>) {
    let (graph, status, feasibility) = snapshot.into_parts();
    let replay = FixedStatusAlgorithm::new(status);

    if !consolidate {
        return (graph, Box::new(replay));
    }

    let consolidator =
        CounterexampleConsolidator::new(replay, PathWitnessOracle::new(feasibility))
            .with_cancellation(notifier.clone());
    (graph, Box::new(consolidator))
}

fn log_statistics(stats: &Statistics) {
    for line in stats.to_string().lines() {
        info!("{line}");
    }
}

/// Run the `split` command
pub(crate) fn run_split(input: SnapshotInput, config: ArgoConfig) -> Result<(), anyhow::Error> {
    let snapshot = load_snapshot(&input)?;

    let Some(options) = config.get_partitioner_options() else {
        return Err(anyhow!(
            "The number of splits must be given, either with --splits or in the configuration"
        ));
    };
    let template = config
        .get_output_template()
        .with_context(|| "Invalid output configuration")?;

    let notifier = ShutdownNotifier::new();
    arm_timeout(&notifier, input.timeout);

    let (mut graph, exploration) =
        build_exploration(snapshot, config.consolidate_counterexamples(), &notifier);
    let mut partitioner =
        GraphPartitioner::new(exploration, options).with_cancellation(notifier.clone());

    let status = partitioner
        .run(&mut graph)
        .with_context(|| "Partitioning the reachability graph failed")?;
    info!("Partitioning finished with status {status}");

    let mut exporter = ConditionExporter::new(template);
    let report = partitioner.export_partitions(&graph, &mut exporter);

    for (index, path) in report.written.iter() {
        info!(
            "Residual condition of partition {index} written to '{}'",
            path.display()
        );
    }

    let mut stats = Statistics::new();
    partitioner.collect_statistics(&mut stats);
    report.collect_statistics(&mut stats);
    log_statistics(&stats);

    if !report.is_success() {
        for (index, err) in report.failures.iter() {
            error!("Partition {index}: {err}");
        }
        return Err(anyhow!(
            "Failed to export {} residual condition(s)",
            report.failures.len()
        ));
    }

    Ok(())
}

/// Run the `witnesses` command
pub(crate) fn run_witnesses(input: SnapshotInput) -> Result<(), anyhow::Error> {
    let snapshot = load_snapshot(&input)?;

    let notifier = ShutdownNotifier::new();
    arm_timeout(&notifier, input.timeout);

    let (mut graph, mut exploration) = build_exploration(snapshot, true, &notifier);

    let status = exploration
        .run(&mut graph)
        .with_context(|| "Counterexample consolidation failed")?;

    if !graph.target_reached() {
        info!("No target node has been reached. Status: {status}");
        return Ok(());
    }

    for target in graph.target_nodes() {
        match target.witness() {
            Some(witness) => info!("Target node {}: {witness}", target.id()),
            None => warn!("Target node {} has no witness", target.id()),
        }
    }
    info!("Status: {status}");

    let mut stats = Statistics::new();
    exploration.collect_statistics(&mut stats);
    log_statistics(&stats);

    Ok(())
}
