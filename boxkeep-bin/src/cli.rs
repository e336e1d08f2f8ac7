use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Back up a container workload to a snapshot directory and restore it elsewhere
#[derive(Parser, Debug)]
#[clap(name = "boxkeep", version)]
pub struct Cli {
    #[clap(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    Backup(Backup),
    Restore(Restore),
    Show(Show),
}

/// Snapshot a workload's image, configuration and named volumes
#[derive(Parser, Debug)]
pub struct Backup {
    /// Directory the snapshot directory is created in [env: BOXKEEP_OUTPUT_DIR]
    #[clap(long)]
    pub output_dir: Option<PathBuf>,
    /// Image used to archive volume contents [env: BOXKEEP_HELPER_IMAGE]
    #[clap(long)]
    pub helper_image: Option<String>,

    #[clap(value_parser = clap::builder::NonEmptyStringValueParser::new(), required = true)]
    pub workload_id: String,
}

/// Recreate a workload from a snapshot directory
#[derive(Parser, Debug)]
pub struct Restore {
    /// Image used to extract volume contents [env: BOXKEEP_HELPER_IMAGE]
    #[clap(long)]
    pub helper_image: Option<String>,

    #[clap(required = true)]
    pub backup_dir: PathBuf,
}

/// Print what restoring a snapshot directory would run, without running it
#[derive(Parser, Debug)]
pub struct Show {
    #[clap(required = true)]
    pub backup_dir: PathBuf,
}
