//! CLI argument parsing and command dispatch

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use datavol::config::Settings;
use datavol::defaults::default_config_file;

use crate::commands;

/// Datavol - Move data in and out of per-service data containers
#[derive(Parser, Debug)]
#[command(name = "datavol")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    command: Commands,

    /// Path to the settings file.
    ///
    /// Defaults to `datavol/config.yaml` under the system configuration
    /// directory. A missing file means built-in defaults.
    #[arg(long, global = true, value_name = "FILE", env = "DATAVOL_CONFIG")]
    config: Option<PathBuf>,

    /// Container engine binary to drive (overrides the settings file)
    #[arg(long, global = true, value_name = "BIN", env = "DATAVOL_ENGINE")]
    engine: Option<String>,

    /// Abort transfers that run longer than this many seconds
    #[arg(long, global = true, value_name = "SECONDS")]
    timeout: Option<u64>,

    /// Colorize output (always, never, auto)
    #[arg(long, global = true, value_name = "WHEN", default_value = "auto")]
    color: String,

    /// Set log level (error, warn, info, debug, trace)
    #[arg(long, global = true, value_name = "LEVEL", default_value = "warn")]
    log_level: String,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Copy a host directory into a data container, creating it if needed
    Import(commands::import::ImportArgs),
    /// Copy a path out of a data container into a host directory
    Export(commands::export::ExportArgs),
    /// Run a command against a data container
    Exec(commands::exec::ExecArgs),
    /// Check whether a data container exists
    Exists(commands::exists::ExistsArgs),
    /// Generate shell completion scripts
    Completions(commands::completions::CompletionsArgs),
}

impl Cli {
    /// Execute the CLI command
    pub fn execute(self) -> Result<ExitCode> {
        init_logging(&self.log_level);

        match self.command {
            Commands::Completions(args) => {
                commands::completions::execute(args)?;
                Ok(ExitCode::SUCCESS)
            }
            command => {
                let settings =
                    load_settings(self.config.as_deref(), self.engine.as_deref(), self.timeout)?;
                match command {
                    Commands::Import(args) => commands::import::execute(args, settings, &self.color),
                    Commands::Export(args) => commands::export::execute(args, settings, &self.color),
                    Commands::Exec(args) => commands::exec::execute(args, settings, &self.color),
                    Commands::Exists(args) => commands::exists::execute(args, settings),
                    Commands::Completions(_) => Ok(ExitCode::SUCCESS),
                }
            }
        }
    }
}

/// Settings from the settings file with command-line overrides applied
fn load_settings(config: Option<&Path>, engine: Option<&str>, timeout: Option<u64>) -> Result<Settings> {
    let path = config.map(Path::to_path_buf).unwrap_or_else(default_config_file);
    let mut settings = Settings::load(&path)
        .with_context(|| format!("Failed to load settings from {}", path.display()))?;

    if let Some(engine) = engine {
        settings.engine = engine.to_string();
    }
    if let Some(timeout) = timeout {
        settings.timeout_secs = Some(timeout);
    }
    settings.validate()?;
    Ok(settings)
}

fn init_logging(level: &str) {
    // RUST_LOG still wins so module-level filters keep working
    let env = env_logger::Env::default().default_filter_or(level);
    let _ = env_logger::Builder::from_env(env)
        .format_timestamp(None)
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_import() {
        let cli = Cli::try_parse_from(["datavol", "import", "ipfs", "./src", "/data"]).unwrap();
        match cli.command {
            Commands::Import(args) => {
                assert_eq!(args.name, "ipfs");
                assert_eq!(args.instance, 1);
            }
            other => panic!("unexpected command {:?}", other),
        }
        assert_eq!(cli.log_level, "warn");
    }

    #[test]
    fn test_parse_exec_trailing_args() {
        let cli = Cli::try_parse_from([
            "datavol", "exec", "ipfs", "--instance", "2", "-e", "A=1", "--", "ls", "-la",
        ])
        .unwrap();
        match cli.command {
            Commands::Exec(args) => {
                assert_eq!(args.instance, 2);
                assert_eq!(args.env, vec!["A=1"]);
                assert_eq!(args.args, vec!["ls", "-la"]);
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_engine_flag_overrides_settings_file() {
        let temp_dir = tempfile::TempDir::new().unwrap();
        let path = temp_dir.path().join("config.yaml");
        std::fs::write(&path, "engine: podman\nowner: ops\n").unwrap();

        let cli = Cli::try_parse_from([
            "datavol",
            "--config",
            path.to_str().unwrap(),
            "--engine",
            "/usr/local/bin/docker",
            "--timeout",
            "30",
            "exists",
            "ipfs",
        ])
        .unwrap();
        let settings =
            load_settings(cli.config.as_deref(), cli.engine.as_deref(), cli.timeout).unwrap();

        assert_eq!(settings.engine, "/usr/local/bin/docker");
        assert_eq!(settings.owner, "ops");
        assert_eq!(settings.timeout_secs, Some(30));
    }

    #[test]
    fn test_invalid_settings_file_is_reported() {
        let temp_dir = tempfile::TempDir::new().unwrap();
        let path = temp_dir.path().join("config.yaml");
        std::fs::write(&path, "compression: 42\n").unwrap();

        let cli = Cli::try_parse_from(["datavol", "--config", path.to_str().unwrap(), "exists", "ipfs"])
            .unwrap();
        let err = load_settings(cli.config.as_deref(), None, None).unwrap_err();
        assert!(format!("{:#}", err).contains("compression"));
    }
}
