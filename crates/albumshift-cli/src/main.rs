//! Albumshift - resumable migration of a photo export into a photo library.
//!
//! Thin front end over `albumshift-core`: argument parsing, logging setup,
//! Ctrl-C handling and reports. Logs go to stderr; stdout carries the reports.

mod report;

use albumshift_core::execution::open_existing;
use albumshift_core::{
    create_plan, request_retry, CatalogBuilder, CommandDestination, Destination, DryRunDestination,
    ExecutionConfig, ExecutionDefaults, ExiftoolCaptureTime, ExportLayout, MigrateError,
    ResumeController, RetryPolicy, StopSignal,
};
use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{error, info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

#[derive(Parser, Debug)]
#[command(name = "albumshift")]
#[command(version, about = "Resumable migration of a photo export into a photo library")]
struct Args {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    debug: bool,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Scan an export directory and write a new plan
    Plan(PlanArgs),
    /// Import the plan's open units into the destination
    Execute(ExecuteArgs),
    /// Show the plan's progress
    Status(StatusArgs),
    /// Move failed units back to pending without running
    Retry(RetryArgs),
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum LayoutArg {
    Auto,
    Tree,
    Flickr,
}

#[derive(clap::Args, Debug)]
struct PlanArgs {
    /// Export directory to scan
    export_root: PathBuf,

    /// Where to write the plan
    plan: PathBuf,

    /// Replace an existing plan
    #[arg(long)]
    force: bool,

    /// Export layout
    #[arg(long, value_enum, default_value = "auto")]
    layout: LayoutArg,

    /// Read capture times with exiftool
    #[arg(long, env = "ALBUMSHIFT_EXIFTOOL")]
    exiftool: bool,
}

#[derive(clap::Args, Debug)]
struct ExecuteArgs {
    /// Plan written by `albumshift plan`
    plan: PathBuf,

    /// Give failed units a fresh attempt budget
    #[arg(long)]
    retry_failed: bool,

    /// Attempts per unit and run
    #[arg(long, env = "ALBUMSHIFT_MAX_ATTEMPTS", default_value_t = ExecutionDefaults::MAX_ATTEMPTS)]
    max_attempts: u32,

    /// Time budget for one import attempt, in seconds
    #[arg(long, env = "ALBUMSHIFT_ATTEMPT_TIMEOUT", default_value_t = ExecutionDefaults::ATTEMPT_TIMEOUT.as_secs())]
    attempt_timeout: u64,

    /// Base delay between attempts, in seconds
    #[arg(long, env = "ALBUMSHIFT_BACKOFF", default_value_t = ExecutionDefaults::BASE_BACKOFF.as_secs())]
    backoff: u64,

    /// Pause after the destination stops responding, in seconds
    #[arg(long, env = "ALBUMSHIFT_COOLDOWN", default_value_t = ExecutionDefaults::COOLDOWN.as_secs())]
    cooldown: u64,

    /// Failed units in a row that also trigger a cooldown (0 disables)
    #[arg(long, env = "ALBUMSHIFT_FAILURE_STREAK", default_value_t = ExecutionDefaults::FAILURE_STREAK_THRESHOLD)]
    failure_streak: u32,

    /// Stop after this many units
    #[arg(long)]
    limit: Option<usize>,

    /// Helper program that imports one asset per call
    #[arg(long, env = "ALBUMSHIFT_IMPORTER", required_unless_present = "dry_run", conflicts_with = "dry_run")]
    importer: Option<String>,

    /// Extra argument for the importer (repeatable)
    #[arg(long = "importer-arg", allow_hyphen_values = true)]
    importer_args: Vec<String>,

    /// Program run during a cooldown to restart the destination
    #[arg(long, env = "ALBUMSHIFT_RECOVER_COMMAND")]
    recover_command: Option<String>,

    /// Walk the plan without touching a library or saving any status
    #[arg(long)]
    dry_run: bool,
}

impl ExecuteArgs {
    fn execution_config(&self) -> ExecutionConfig {
        let base_delay = Duration::from_secs(self.backoff);
        let retry = RetryPolicy::new()
            .with_max_attempts(self.max_attempts)
            .with_base_delay(base_delay)
            .with_max_delay(ExecutionDefaults::MAX_BACKOFF.max(base_delay));

        ExecutionConfig {
            retry,
            attempt_timeout: Duration::from_secs(self.attempt_timeout),
            cooldown: Duration::from_secs(self.cooldown),
            failure_streak_threshold: self.failure_streak,
            retry_failed: self.retry_failed,
            max_units: self.limit,
            dry_run: self.dry_run,
        }
    }

    fn destination(&self) -> Result<Arc<dyn Destination>> {
        if self.dry_run {
            return Ok(Arc::new(DryRunDestination::new()));
        }
        let program = self
            .importer
            .clone()
            .context("either --importer or --dry-run is required")?;
        let mut destination = CommandDestination::new(program).with_args(self.importer_args.clone());
        if let Some(recover) = &self.recover_command {
            destination = destination.with_recover_program(recover.clone());
        }
        Ok(Arc::new(destination))
    }
}

#[derive(clap::Args, Debug)]
struct StatusArgs {
    plan: PathBuf,

    /// List every failed unit with its last error
    #[arg(long)]
    failed: bool,
}

#[derive(clap::Args, Debug)]
struct RetryArgs {
    plan: PathBuf,

    /// Only reset these units (default: every failed unit)
    unit_ids: Vec<String>,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let args = Args::parse();
    init_logging(args.debug, args.log_json);

    match run(args.command).await {
        Ok(code) => ExitCode::from(code),
        Err(e) => {
            error!("{:#}", e);
            eprintln!("error: {:#}", e);
            ExitCode::from(exit_code_for(&e))
        }
    }
}

fn init_logging(debug: bool, json: bool) {
    let default_level = if debug { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    if json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    } else {
        FmtSubscriber::builder()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .with_target(false)
            .with_thread_ids(false)
            .compact()
            .init();
    }
}

fn exit_code_for(err: &anyhow::Error) -> u8 {
    err.downcast_ref::<MigrateError>()
        .map(MigrateError::exit_code)
        .unwrap_or(1)
}

async fn run(command: Command) -> Result<u8> {
    match command {
        Command::Plan(args) => plan(args),
        Command::Execute(args) => execute(args).await,
        Command::Status(args) => status(args),
        Command::Retry(args) => retry(args),
    }
}

fn plan(args: PlanArgs) -> Result<u8> {
    let mut builder = CatalogBuilder::new();
    match args.layout {
        LayoutArg::Auto => {}
        LayoutArg::Tree => builder = builder.with_layout(ExportLayout::Tree),
        LayoutArg::Flickr => builder = builder.with_layout(ExportLayout::Flickr),
    }
    if args.exiftool {
        builder = builder.with_capture_source(ExiftoolCaptureTime::new());
    }

    let created = create_plan(&args.export_root, &args.plan, &builder, args.force)?;
    report::print_plan_created(&created);
    Ok(0)
}

async fn execute(args: ExecuteArgs) -> Result<u8> {
    let config = args.execution_config();
    config.validate()?;
    let destination = args.destination()?;

    let stop = StopSignal::new();
    let watcher = {
        let stop = stop.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("Interrupt received; stopping after the current attempt");
                stop.request_stop();
            }
        })
    };

    let (tx, mut rx) = mpsc::channel(ExecutionDefaults::PROGRESS_CHANNEL_CAPACITY);
    let printer = tokio::spawn(async move {
        while let Some(progress) = rx.recv().await {
            report::print_progress(&progress);
        }
    });

    info!("Executing plan {}", args.plan.display());
    let mut controller = ResumeController::new(&args.plan, config, destination)
        .with_stop_signal(stop)
        .with_progress(tx);
    let result = controller.run().await;
    drop(controller);

    watcher.abort();
    if let Err(e) = printer.await {
        warn!("Progress printer ended abnormally: {}", e);
    }

    let report = result?;
    report::print_run_report(&report);
    Ok(report.outcome.exit_code())
}

fn status(args: StatusArgs) -> Result<u8> {
    let store = open_existing(&args.plan)?;
    report::print_status(store.plan());
    if args.failed {
        report::print_failed(store.plan());
    }
    Ok(0)
}

fn retry(args: RetryArgs) -> Result<u8> {
    let reset = request_retry(&args.plan, &args.unit_ids)?;
    report::print_retry(reset, &args.plan);
    Ok(0)
}
