//! Snapshots command: inspect and restore saved worlds

use std::error::Error;
use std::fs;
use std::path::PathBuf;

use clap::{Args, Subcommand};
use graphsweep_store::FsSnapshotService;

#[derive(Debug, Args)]
pub struct SnapshotsArgs {
    /// Snapshot directory
    #[arg(long, default_value = ".graphsweep/snapshots")]
    pub snapshots: PathBuf,

    #[command(subcommand)]
    pub command: SnapshotsCommand,
}

#[derive(Debug, Subcommand)]
pub enum SnapshotsCommand {
    /// List saved snapshots
    List,

    /// Write a snapshot's world out as a plain world file
    Restore {
        /// Snapshot name, e.g. before_cleaning_world_0
        name: String,

        /// Destination world file
        #[arg(long)]
        output: PathBuf,
    },
}

pub fn execute(args: SnapshotsArgs) -> Result<(), Box<dyn Error>> {
    let service = FsSnapshotService::new(&args.snapshots);
    match args.command {
        SnapshotsCommand::List => {
            let names = service.list_snapshots()?;
            if names.is_empty() {
                println!("No snapshots in {}", args.snapshots.display());
            }
            for name in names {
                match service.read_document(&name) {
                    Ok(document) => println!(
                        "{}  {} objects  {}  {}",
                        name,
                        document.reachable_count,
                        document.created_at.format("%Y-%m-%d %H:%M:%S"),
                        &document.digest[..document.digest.len().min(12)]
                    ),
                    Err(err) => println!("{}  unreadable: {}", name, err),
                }
            }
        }
        SnapshotsCommand::Restore { name, output } => {
            let heap = service.read_snapshot(&name)?;
            fs::write(&output, serde_json::to_vec_pretty(&heap)?)?;
            println!("Restored {} to {}", name, output.display());
        }
    }
    Ok(())
}
