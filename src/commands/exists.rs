//! # Exists Command Implementation
//!
//! Reports whether a data container exists. The exit status is 0 when it
//! does and 1 when it does not, so the command can drive shell conditionals.
//! Failing to ask the engine is an error, never "absent".

use std::process::ExitCode;

use anyhow::Result;
use clap::Args;
use serde::Serialize;

use datavol::config::Settings;
use datavol::manager::DataManager;

/// Check whether a data container exists
#[derive(Args, Debug)]
pub struct ExistsArgs {
    /// Service name the data container belongs to
    pub name: String,

    /// Instance number of the data container
    #[arg(short = 'n', long, default_value_t = 1, value_name = "N")]
    pub instance: u32,

    /// Print the result as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Debug, Serialize)]
struct ExistsReport<'a> {
    name: &'a str,
    instance: u32,
    container: &'a str,
    exists: bool,
}

/// Execute the `exists` command.
pub fn execute(args: ExistsArgs, settings: Settings) -> Result<ExitCode> {
    let manager = DataManager::new(settings);
    let container = manager.container_name(&args.name, args.instance)?;
    let exists = manager.exists(&args.name, args.instance)?;

    if args.json {
        let report = ExistsReport {
            name: &args.name,
            instance: args.instance,
            container: &container,
            exists,
        };
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("{}", if exists { "true" } else { "false" });
    }

    Ok(if exists { ExitCode::SUCCESS } else { ExitCode::FAILURE })
}
