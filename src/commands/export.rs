//! # Export Command Implementation
//!
//! Copies a path out of an existing data container into a host directory.
//! The host directory is created when missing; entries already there are
//! replaced by exported entries of the same name and kept otherwise.

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Args;

use datavol::config::Settings;
use datavol::manager::DataManager;
use datavol::operations::Request;
use datavol::output::{OutputConfig, Status};

/// Copy a path out of a data container into a host directory
#[derive(Args, Debug)]
pub struct ExportArgs {
    /// Service name the data container belongs to
    pub name: String,

    /// Path inside the data container to copy out
    pub source: PathBuf,

    /// Host directory to merge the exported contents into
    pub destination: PathBuf,

    /// Instance number of the data container
    #[arg(short = 'n', long, default_value_t = 1, value_name = "N")]
    pub instance: u32,
}

/// Execute the `export` command.
pub fn execute(args: ExportArgs, settings: Settings, color_flag: &str) -> Result<ExitCode> {
    let out = OutputConfig::from_env_and_flag(color_flag);
    let manager = DataManager::new(settings);

    let mut request = Request::new(&args.name)
        .with_instance(args.instance)
        .with_paths(&args.source, &args.destination);
    manager
        .export(&mut request)
        .with_context(|| format!("Failed to export {} from data container for {}", args.source.display(), args.name))?;

    let container = request.operations.data_container_name.unwrap_or_default();
    println!(
        "{}",
        out.status(
            Status::Done,
            &format!(
                "Exported {}:{} to {}",
                container,
                args.source.display(),
                args.destination.display()
            )
        )
    );
    Ok(ExitCode::SUCCESS)
}
