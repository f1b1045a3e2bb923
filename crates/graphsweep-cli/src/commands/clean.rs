//! Clean command: a full backed-up cleanup run against a snapshot directory

use std::error::Error;
use std::fs;
use std::path::PathBuf;
use std::thread;
use std::time::Duration;

use clap::Args;
use graphsweep_engine::{CleanupContext, CleanupOrchestrator, MessageLevel, ProgressSink};
use graphsweep_store::FsSnapshotService;

use super::input::{default_registry, Format, InputArgs, Inputs};

const TICK: Duration = Duration::from_millis(10);

#[derive(Debug, Args)]
pub struct CleanArgs {
    #[command(flatten)]
    pub input: InputArgs,

    /// Directory holding backup and result snapshots
    #[arg(long, default_value = ".graphsweep/snapshots")]
    pub snapshots: PathBuf,

    /// Write the cleaned world here
    #[arg(long)]
    pub output: Option<PathBuf>,

    #[arg(long, value_enum, default_value_t = Format::Text)]
    pub format: Format,
}

/// Progress printed to stderr so stdout carries only the report
struct ConsoleProgress;

impl ProgressSink for ConsoleProgress {
    fn set_active(&mut self, _active: bool) {}

    fn set_status(&mut self, status: &str) {
        eprintln!("[{}]", status);
    }

    fn message(&mut self, level: MessageLevel, text: &str) {
        match level {
            MessageLevel::Info => eprintln!("{}", text),
            MessageLevel::Warning => eprintln!("warning: {}", text),
            MessageLevel::Error => eprintln!("error: {}", text),
        }
    }
}

pub fn execute(args: CleanArgs) -> Result<(), Box<dyn Error>> {
    let Inputs {
        mut heap,
        descriptors,
        config,
    } = args.input.load()?;
    let registry = default_registry(&config);

    let context =
        CleanupContext::new(registry, descriptors, FsSnapshotService::new(&args.snapshots))
            .with_config(config)
            .with_progress(ConsoleProgress);
    let mut orchestrator = CleanupOrchestrator::launch(context)?;

    while !orchestrator.completed() {
        orchestrator.tick(&mut heap);
        if !orchestrator.completed() {
            thread::sleep(TICK);
        }
    }
    orchestrator.snapshot_service_mut().wait_idle();

    let report = orchestrator.report().ok_or("Run ended without a report")?;
    if let Some(path) = &args.output {
        if !report.outcome.is_failure() {
            fs::write(path, serde_json::to_vec_pretty(&heap)?)?;
        }
    }

    match args.format {
        Format::Text => println!("{}", report),
        Format::Json => println!("{}", serde_json::to_string_pretty(report)?),
    }

    if report.outcome.is_failure() {
        return Err("Cleanup run failed".into());
    }
    Ok(())
}
