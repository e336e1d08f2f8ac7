use std::path::Path;
use std::sync::Arc;

use boxkeep_engine::DockerEngine;
use boxkeep_lib::common::{BoxkeepError, ContainerEngine};
use boxkeep_lib::{RestoreManager, RestorePlan, Settings, SnapshotWriter};
use clap::Parser;
use color_eyre::eyre;
use tracing::info;
use tracing_subscriber::EnvFilter;

mod cli;

use cli::{Cli, Command};

const DEFAULT_LOG_FILTER: &str = "boxkeep=info";

#[tokio::main]
async fn main() -> eyre::Result<()> {
    // Usage errors exit 1 like every other failure; help and version exit 0
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) => {
            let code = if err.use_stderr() { 1 } else { 0 };
            let _ = err.print();
            std::process::exit(code);
        }
    };

    dotenvy::dotenv().ok();
    color_eyre::install()?;
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER)),
        )
        .with_writer(std::io::stderr)
        .init();

    let settings = Settings::from_env();

    match cli.command {
        Command::Backup(args) => {
            let settings = settings
                .with_output_dir(args.output_dir)
                .with_helper_image(args.helper_image);
            let layout = SnapshotWriter::new(connect()?, settings)
                .write(&args.workload_id)
                .await?;
            println!("{}", layout.root().display());
        }
        Command::Restore(args) => {
            let settings = settings.with_helper_image(args.helper_image);
            let outcome = RestoreManager::new(connect()?, settings)
                .restore(&args.backup_dir)
                .await?;
            info!(
                steps = outcome.journal.entries().len(),
                "Restored workload {}", outcome.spec.name
            );
            println!("{}", outcome.container_id);
        }
        Command::Show(args) => show(&args.backup_dir)?,
    }

    Ok(())
}

fn connect() -> Result<Arc<dyn ContainerEngine>, BoxkeepError> {
    let engine = DockerEngine::connect().map_err(BoxkeepError::from)?;
    Ok(Arc::new(engine))
}

fn show(dir: &Path) -> Result<(), BoxkeepError> {
    let plan = RestorePlan::from_dir(dir)?;
    println!("snapshot: {}", plan.layout.root().display());
    println!(
        "image:    {} ({})",
        plan.image_ref,
        plan.layout.image_archive().display()
    );
    if plan.volumes.is_empty() {
        println!("volumes:  none");
    }
    for volume in &plan.volumes {
        println!("volume:   {} ({})", volume.name, volume.archive_path.display());
    }
    println!("command:  {}", plan.spec);
    Ok(())
}
