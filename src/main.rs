mod config;

use std::path::PathBuf;

use anyhow::{Result, bail};
use clap::{Parser, Subcommand};
use tracing::{error, info};

use cbeventlog_logs::{
    EventFilter, PipelineOptions, SourceDescriptor, UsageError, default_registry, run_nodes,
    validate_nodes,
};
use cbeventlog_types::Credentials;
use config::Settings;

/// cbeventlog - Builds a chronological event log for Couchbase nodes
#[derive(Parser, Debug)]
#[command(name = "cbeventlog")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Settings file (TOML)
    #[arg(long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Parser units run concurrently per node (overrides the settings file)
    #[arg(long, global = true)]
    workers: Option<usize>,

    /// Log progress to stderr; repeat for more detail
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Pull logs from a running node
    Node {
        /// Administrator user name
        #[arg(short, long)]
        username: String,

        /// Administrator password
        #[arg(short, long)]
        password: String,

        /// Node address, e.g. 10.0.0.1 or http://10.0.0.1:8091
        #[arg(short = 'n', long = "node", value_name = "ADDR")]
        node: String,

        /// Name the event log is written under
        #[arg(long)]
        node_name: String,

        #[command(flatten)]
        output: OutputArgs,
    },

    /// Read logs from one or more cbcollect_info bundles
    Cbcollect {
        /// Bundle zip or extracted directory; repeat for several nodes
        #[arg(long = "path", required = true, value_name = "ZIP")]
        paths: Vec<PathBuf>,

        /// Node name for each --path, in the same order
        #[arg(long = "node-name", required = true, value_name = "NAME")]
        node_names: Vec<String>,

        #[command(flatten)]
        output: OutputArgs,
    },
}

#[derive(clap::Args, Debug)]
struct OutputArgs {
    /// Keep only these event types (comma separated)
    #[arg(long, value_name = "LIST")]
    include_events: Option<String>,

    /// Drop these event types (comma separated)
    #[arg(long, value_name = "LIST")]
    exclude_events: Option<String>,

    /// Directory the event logs are written to
    #[arg(long, default_value = ".", value_name = "DIR")]
    log_path: PathBuf,
}

/// Everything one invocation will do, checked before any stage runs
#[derive(Debug)]
struct Plan {
    descriptors: Vec<SourceDescriptor>,
    filter: Option<EventFilter>,
    output_dir: PathBuf,
}

impl Command {
    fn plan(self) -> Result<Plan, UsageError> {
        let (descriptors, output) = match self {
            Command::Node {
                username,
                password,
                node,
                node_name,
                output,
            } => {
                let descriptor = SourceDescriptor::LiveNode {
                    address: node,
                    node_name,
                    credentials: Credentials::new(username, password),
                };
                (vec![descriptor], output)
            }
            Command::Cbcollect {
                paths,
                node_names,
                output,
            } => {
                if paths.len() != node_names.len() {
                    return Err(UsageError::MismatchedBundles {
                        paths: paths.len(),
                        names: node_names.len(),
                    });
                }
                let descriptors = paths
                    .into_iter()
                    .zip(node_names)
                    .map(|(archive_path, node_name)| SourceDescriptor::Bundle {
                        archive_path,
                        node_name,
                    })
                    .collect();
                (descriptors, output)
            }
        };

        let filter = EventFilter::from_lists(
            output.include_events.as_deref(),
            output.exclude_events.as_deref(),
        )?;
        validate_nodes(&descriptors)?;

        Ok(Plan {
            descriptors,
            filter,
            output_dir: output.log_path,
        })
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let level = match args.verbose {
        0 => tracing::Level::WARN,
        1 => tracing::Level::INFO,
        _ => tracing::Level::DEBUG,
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive(level.into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let result = run(args).await;

    if let Err(e) = &result {
        eprintln!("Error: {:#}", e);
    }

    result
}

async fn run(args: Args) -> Result<()> {
    let plan = args.command.plan()?;
    let settings = Settings::load(args.config.as_deref())?;

    let options = PipelineOptions {
        output_dir: plan.output_dir,
        workers: args.workers.unwrap_or(settings.workers),
        timeouts: settings.timeouts(),
        filter: plan.filter,
    };

    let registry = default_registry();
    let results = run_nodes(&plan.descriptors, &registry, &options).await?;

    let total = results.len();
    let mut failed = 0;
    for (descriptor, result) in plan.descriptors.iter().zip(results) {
        match result {
            Ok(report) => {
                info!(
                    node = %report.node_name,
                    events = report.events(),
                    failed_units = report.failures.len(),
                    skipped_units = report.skipped.len(),
                    "Node done"
                );
                if let Some(e) = &report.filter_error {
                    error!(node = %report.node_name, error = %e, "Event log left unfiltered");
                    failed += 1;
                }
                println!("{}", report.log_path.display());
            }
            Err(e) => {
                error!(node = %descriptor.node_name(), error = %e, "No event log produced");
                failed += 1;
            }
        }
    }

    if failed > 0 {
        bail!("{failed} of {total} nodes did not get a complete event log");
    }
    Ok(())
}
