use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use clap::{Args, Parser, Subcommand};
use tracing::{info, warn};
use wpsprobe_engine::{
    Downloader, HostSelector, HttpTransportProvider, MatrixEntry, MatrixRunner, PollPolicy, RunOutcome, RunnerOptions, TestMatrix,
    TransportProvider, parse_process_description,
};
use wpsprobe_registry::{ConfigStore, JobCatalog, default_config_path};
use wpsprobe_types::ParamSource;
use wpsprobe_util::expand_tilde;

/// Per-request HTTP timeout for WPS calls; for downloads, the longest pause between two reads.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);
const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Parser)]
#[command(name = "wpsprobe", version, about = "Run a catalog of WPS jobs against every configured host")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run the host × job matrix and download every produced artifact
    Run(RunArgs),
    /// Print the matrix without contacting any server
    Plan(MatrixArgs),
    /// List the job catalog
    Jobs,
    /// Print the inputs and outputs a host declares for a process
    Describe(DescribeArgs),
}

#[derive(Debug, Args)]
struct ConfigArgs {
    /// Configuration file (defaults to $WPSPROBE_CONFIG_PATH, then the user config directory)
    #[arg(long, value_name = "PATH")]
    config: Option<String>,
}

#[derive(Debug, Args)]
struct MatrixArgs {
    #[command(flatten)]
    config: ConfigArgs,
    /// `all` or a comma-separated list of host layers
    #[arg(long, default_value = "all")]
    hosts: HostSelector,
}

#[derive(Debug, Args)]
struct RunArgs {
    #[command(flatten)]
    matrix: MatrixArgs,
    #[arg(long, default_value = "outputs")]
    output_dir: PathBuf,
    #[arg(long, default_value_t = wpsprobe_engine::runner::DEFAULT_WORKERS)]
    workers: usize,
    /// Seconds between two status polls
    #[arg(long, default_value_t = 1.0)]
    poll_interval: f64,
    /// Seconds one run may take, from submission to download
    #[arg(long, default_value_t = 900)]
    timeout: u64,
    #[arg(long, default_value_t = wpsprobe_engine::executor::DEFAULT_MAX_POLL_ATTEMPTS)]
    max_attempts: u32,
    /// Skip the DescribeProcess check before submitting
    #[arg(long)]
    no_preflight: bool,
    /// Print the report as JSON
    #[arg(long)]
    json: bool,
}

#[derive(Debug, Args)]
struct DescribeArgs {
    #[command(flatten)]
    config: ConfigArgs,
    #[arg(long)]
    host: String,
    #[arg(long)]
    process: String,
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    init_tracing();
    let cli = Cli::parse();

    match cli.command {
        Command::Run(args) => run(args).await,
        Command::Plan(args) => plan(args).map(|_| ExitCode::SUCCESS),
        Command::Jobs => {
            list_jobs(&JobCatalog::builtin());
            Ok(ExitCode::SUCCESS)
        }
        Command::Describe(args) => describe(args).await.map(|_| ExitCode::SUCCESS),
    }
}

fn init_tracing() {
    let filter = std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into());
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

fn config_path(args: &ConfigArgs) -> PathBuf {
    match &args.config {
        Some(path) => expand_tilde(path),
        None => default_config_path(),
    }
}

fn load_store(args: &ConfigArgs) -> Result<Arc<ConfigStore>> {
    let path = config_path(args);
    let store = ConfigStore::load_from_path(&path).with_context(|| format!("load configuration from {}", path.display()))?;
    Ok(Arc::new(store))
}

fn build_matrix(args: &MatrixArgs) -> Result<TestMatrix> {
    let store = load_store(&args.config)?;
    TestMatrix::build(Arc::new(JobCatalog::builtin()), store, &args.hosts).context("build test matrix")
}

fn runner_options(args: &RunArgs) -> Result<RunnerOptions> {
    if !args.poll_interval.is_finite() || args.poll_interval <= 0.0 {
        bail!("--poll-interval must be a positive number of seconds");
    }
    let options = RunnerOptions {
        workers: args.workers.max(1),
        output_dir: args.output_dir.clone(),
        poll: PollPolicy {
            interval: Duration::from_secs_f64(args.poll_interval),
            max_attempts: args.max_attempts,
            ..PollPolicy::default()
        },
        preflight: !args.no_preflight,
        ..RunnerOptions::default()
    };
    Ok(options.with_run_timeout(Duration::from_secs(args.timeout)))
}

async fn run(args: RunArgs) -> Result<ExitCode> {
    let options = runner_options(&args)?;
    let matrix = build_matrix(&args.matrix)?;
    info!(hosts = matrix.hosts().len(), jobs = matrix.catalog().len(), workers = options.workers, "starting matrix run");

    let downloader = Arc::new(Downloader::with_timeouts(CONNECT_TIMEOUT, REQUEST_TIMEOUT).context("create downloader")?);
    let runner = MatrixRunner::new(Arc::new(HttpTransportProvider::new(REQUEST_TIMEOUT)), downloader, options);

    let report = tokio::select! {
        report = runner.run(&matrix) => report,
        signal = tokio::signal::ctrl_c() => {
            signal.context("listen for ctrl-c")?;
            warn!("interrupted; abandoning in-flight runs");
            return Ok(ExitCode::from(130));
        }
    };

    if args.json {
        println!("{}", report.to_json()?);
    } else {
        for record in &report.records {
            let detail = match &record.outcome {
                RunOutcome::Passed { artifact } => artifact.to_string(),
                RunOutcome::Failed { error } => format!("[{}] {error}", error.kind()),
                RunOutcome::Skipped { reason } => reason.clone(),
            };
            println!(
                "{:<8} {}/{} ({:.1}s) {}",
                record.outcome.label().to_uppercase(),
                record.host,
                record.job,
                record.elapsed.as_secs_f64(),
                detail
            );
        }
        println!(
            "\n{} passed, {} failed, {} skipped",
            report.passed(),
            report.failed(),
            report.skipped()
        );
    }

    Ok(if report.all_passed() { ExitCode::SUCCESS } else { ExitCode::FAILURE })
}

fn plan(args: MatrixArgs) -> Result<()> {
    let matrix = build_matrix(&args)?;
    for entry in matrix.entries() {
        match entry {
            MatrixEntry::Runnable(run) => {
                let inputs = run
                    .to_request()
                    .inputs
                    .iter()
                    .map(|(name, value)| format!("{name}={value}"))
                    .collect::<Vec<_>>()
                    .join(" ");
                println!("RUN      {} {inputs}", run.label());
            }
            MatrixEntry::Skipped { job, host, reason } => println!("SKIP     {host}/{job} {reason}"),
        }
    }
    Ok(())
}

fn list_jobs(catalog: &JobCatalog) {
    for job in catalog.iter() {
        let params = job
            .params
            .iter()
            .map(|(name, spec)| {
                let source = match &spec.source {
                    ParamSource::Literal(value) => format!("={value}"),
                    ParamSource::FromConfig => format!(" <- {}", job.config_key(name)),
                };
                match spec.preprocess {
                    Some(preprocessor) => format!("{name}{source} ({preprocessor})"),
                    None => format!("{name}{source}"),
                }
            })
            .collect::<Vec<_>>();
        println!("{}  {}", job.identifier, job.description.as_deref().unwrap_or(""));
        for param in params {
            println!("    {param}");
        }
    }
}

async fn describe(args: DescribeArgs) -> Result<()> {
    let store = load_store(&args.config)?;
    let host = store.host_profile(&args.host)?;
    let transport = HttpTransportProvider::new(REQUEST_TIMEOUT).transport_for(&host)?;
    let body = transport
        .describe_process(&args.process)
        .await
        .with_context(|| format!("DescribeProcess {} on {}", args.process, host.name))?;
    let descriptor = parse_process_description(&body, &args.process)?;
    println!("{}", serde_json::to_string_pretty(&descriptor)?);
    Ok(())
}
