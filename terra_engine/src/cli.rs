use std::path::PathBuf;

use clap::Parser;

#[derive(Parser, Debug)]
#[command(
    about = "Load a territory's zones from an extracted archive directory",
    version
)]
pub struct Args {
    /// Directory containing the extracted zone and asset files
    #[arg(long)]
    pub archive: PathBuf,

    /// Re-export every loaded zone into this directory
    #[arg(long)]
    pub export: Option<PathBuf>,

    /// Path to write a JSON summary of the loaded territory
    #[arg(long)]
    pub summary_json: Option<PathBuf>,

    /// Worker thread count (default: hardware concurrency minus two)
    #[arg(long)]
    pub workers: Option<usize>,

    /// Log per-zone progress
    #[arg(long)]
    pub verbose: bool,
}

pub fn parse() -> Args {
    Args::parse()
}
