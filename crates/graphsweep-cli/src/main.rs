//! graphsweep CLI
//!
//! Analyze or clean a world file from the command line

use clap::{Parser, Subcommand};
use graphsweep_core::logging_facility::{init, Profile};

mod commands;

#[derive(Debug, Parser)]
#[command(name = "graphsweep")]
#[command(about = "graphsweep - Reachability analysis and controlled removal for object graphs", long_about = None)]
struct Cli {
    /// Log run phases to stdout
    #[arg(long, short, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Collect and resolve without touching anything
    Analyze(commands::analyze::AnalyzeArgs),
    /// Run a full cleanup with backup and closing snapshots
    Clean(commands::clean::CleanArgs),
    /// Snapshot directory operations
    Snapshots(commands::snapshots::SnapshotsArgs),
}

fn main() {
    let cli = Cli::parse();
    if cli.verbose {
        init(Profile::Development);
    }

    let result = match cli.command {
        Commands::Analyze(args) => commands::analyze::execute(args),
        Commands::Clean(args) => commands::clean::execute(args),
        Commands::Snapshots(args) => commands::snapshots::execute(args),
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}
