//! # Datavol CLI
//!
//! Binary entry point for the `datavol` command-line tool.
//!
//! It parses arguments with `clap`, runs the selected command, and turns
//! errors into a non-zero exit status. The data-container logic itself lives
//! in the `datavol` library crate.

mod cli;
mod commands;

use std::process::ExitCode;

use anyhow::Result;
use clap::Parser;

fn main() -> Result<ExitCode> {
    let cli = cli::Cli::parse();
    cli.execute()
}
