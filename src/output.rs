//! # Output Configuration
//!
//! Controls how `datavol` prints status lines: whether to use color and
//! emoji, based on the terminal and user preferences.
//!
//! The following flags and environment variables are honored:
//! - `--color=never|always|auto`
//! - `NO_COLOR` disables colors when set (https://no-color.org/)
//! - `CLICOLOR=0` disables colors
//! - `CLICOLOR_FORCE=1` forces colors even without a TTY
//! - `TERM=dumb` disables colors
//!
//! ```rust,ignore
//! use datavol::output::{OutputConfig, Status};
//!
//! let out = OutputConfig::from_env_and_flag("auto");
//! println!("{}", out.status(Status::Done, "Imported ./src into eris_data_ipfs_1:/data"));
//! ```

use std::env;

use console::style;

/// Output configuration for controlling colors and emojis.
#[derive(Debug, Clone)]
pub struct OutputConfig {
    /// Whether colors and emojis should be used in output.
    pub use_color: bool,
}

/// Kind of status line
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    /// A step finished successfully
    Done,
    /// A step failed
    Failed,
}

impl OutputConfig {
    /// Create an output configuration from environment and the `--color` flag.
    ///
    /// `always` and `never` win over the environment. Anything else detects
    /// support from the environment and the terminal.
    pub fn from_env_and_flag(color_flag: &str) -> Self {
        let use_color = match color_flag.to_lowercase().as_str() {
            "always" => true,
            "never" => false,
            _ => Self::detect_color_support(),
        };

        Self { use_color }
    }

    fn detect_color_support() -> bool {
        // Presence alone disables colors, even when empty
        if env::var_os("NO_COLOR").is_some() {
            return false;
        }
        if env::var("CLICOLOR").is_ok_and(|v| v == "0") {
            return false;
        }
        if env::var("CLICOLOR_FORCE").is_ok_and(|v| v != "0" && !v.is_empty()) {
            return true;
        }
        if env::var("TERM").is_ok_and(|v| v == "dumb") {
            return false;
        }

        console::Term::stdout().features().colors_supported()
    }

    /// Render a status line with its marker
    pub fn status(&self, kind: Status, message: &str) -> String {
        let (emoji_str, plain) = match kind {
            Status::Done => ("✅", "[OK]"),
            Status::Failed => ("❌", "[FAILED]"),
        };
        let marker = emoji(self, emoji_str, plain);
        if !self.use_color {
            return format!("{} {}", marker, message);
        }
        let message = match kind {
            Status::Done => style(message).green(),
            Status::Failed => style(message).red(),
        };
        format!("{} {}", marker, message.force_styling(true))
    }

    #[cfg(test)]
    pub fn with_color() -> Self {
        Self { use_color: true }
    }

    #[cfg(test)]
    pub fn without_color() -> Self {
        Self { use_color: false }
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self::from_env_and_flag("auto")
    }
}

/// Returns the emoji when colors are enabled, the plain text otherwise.
pub fn emoji<'a>(config: &OutputConfig, emoji_str: &'a str, plain: &'a str) -> &'a str {
    if config.use_color {
        emoji_str
    } else {
        plain
    }
}
