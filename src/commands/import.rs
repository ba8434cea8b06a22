//! # Import Command Implementation
//!
//! Copies a host directory into a data container. The container is created
//! from its stored definition when it does not exist yet, and ownership of
//! the destination is handed to the configured owner afterwards.

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Args;

use datavol::config::Settings;
use datavol::manager::DataManager;
use datavol::operations::Request;
use datavol::output::{OutputConfig, Status};

/// Copy a host directory into a data container
#[derive(Args, Debug)]
pub struct ImportArgs {
    /// Service name the data container belongs to
    pub name: String,

    /// Host directory whose contents are copied
    pub source: PathBuf,

    /// Path inside the data container to copy into
    pub destination: PathBuf,

    /// Instance number of the data container
    #[arg(short = 'n', long, default_value_t = 1, value_name = "N")]
    pub instance: u32,
}

/// Execute the `import` command.
pub fn execute(args: ImportArgs, settings: Settings, color_flag: &str) -> Result<ExitCode> {
    let out = OutputConfig::from_env_and_flag(color_flag);
    let manager = DataManager::new(settings);

    let mut request = Request::new(&args.name)
        .with_instance(args.instance)
        .with_paths(&args.source, &args.destination);
    manager.import(&mut request).with_context(|| {
        format!(
            "Failed to import {} into data container for {}",
            args.source.display(),
            args.name
        )
    })?;

    let container = request.operations.data_container_name.unwrap_or_default();
    println!(
        "{}",
        out.status(
            Status::Done,
            &format!(
                "Imported {} into {}:{}",
                args.source.display(),
                container,
                args.destination.display()
            )
        )
    );
    Ok(ExitCode::SUCCESS)
}
