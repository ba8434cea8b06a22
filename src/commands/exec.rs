//! # Exec Command Implementation
//!
//! Runs a command against an existing data container. The stored definition
//! supplies the image and defaults; flags given here override it.

use std::process::ExitCode;

use anyhow::{bail, Result};
use clap::Args;
use log::debug;

use datavol::config::Settings;
use datavol::error::Error;
use datavol::manager::DataManager;
use datavol::operations::{Operations, Request};
use datavol::output::{OutputConfig, Status};

/// Run a command against a data container
#[derive(Args, Debug)]
pub struct ExecArgs {
    /// Service name the data container belongs to
    pub name: String,

    /// Instance number of the data container
    #[arg(short = 'n', long, default_value_t = 1, value_name = "N")]
    pub instance: u32,

    /// Image to run the command in (overrides the definition)
    #[arg(long, value_name = "IMAGE")]
    pub image: Option<String>,

    /// User to run the command as
    #[arg(short, long, value_name = "USER")]
    pub user: Option<String>,

    /// Environment variables, may be repeated
    #[arg(short, long = "env", value_name = "KEY=VALUE")]
    pub env: Vec<String>,

    /// Attach stdin and a terminal
    #[arg(short, long)]
    pub interactive: bool,

    /// Command and arguments to run
    #[arg(last = true, required = true, value_name = "ARGS")]
    pub args: Vec<String>,
}

impl ExecArgs {
    fn operations(&self) -> Operations {
        Operations {
            args: self.args.clone(),
            image: self.image.clone(),
            user: self.user.clone(),
            env: self.env.clone(),
            interactive: self.interactive.then_some(true),
            ..Default::default()
        }
    }
}

/// Execute the `exec` command.
///
/// A non-zero exit status of the command becomes the exit status of
/// `datavol`, clamped to 1..=255.
pub fn execute(args: ExecArgs, settings: Settings, color_flag: &str) -> Result<ExitCode> {
    let out = OutputConfig::from_env_and_flag(color_flag);
    for pair in &args.env {
        if !pair.contains('=') {
            bail!("Invalid environment variable '{}', expected KEY=VALUE", pair);
        }
    }

    let manager = DataManager::new(settings);
    let mut request = Request::new(&args.name)
        .with_instance(args.instance)
        .with_operations(args.operations());

    match manager.exec(&mut request) {
        Ok(()) => {
            debug!("Command finished in {}", request.operations.data_container_name.unwrap_or_default());
            Ok(ExitCode::SUCCESS)
        }
        Err(Error::Exec { container, code }) => {
            eprintln!(
                "{}",
                out.status(Status::Failed, &format!("Command in {} exited with status {}", container, code))
            );
            Ok(ExitCode::from(exit_status(code)))
        }
        Err(e) => Err(e.into()),
    }
}

fn exit_status(code: i64) -> u8 {
    u8::try_from(code).ok().filter(|c| *c != 0).unwrap_or(1)
}
