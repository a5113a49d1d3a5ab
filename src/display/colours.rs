//! Colour management for CLI output
//!
//! Honours `--no-color`, the `NO_COLOR` environment variable and whether
//! stdout is a terminal.

use std::io::IsTerminal;
use colored::{ColoredString, Colorize};
use crate::modules::{HealthStatus, ModuleState};

#[derive(Debug, Clone)]
pub struct ColourManager {
    enabled: bool,
}

impl ColourManager {
    /// Detect colour support from the environment
    pub fn new() -> Self {
        let enabled = std::env::var_os("NO_COLOR").is_none() && std::io::stdout().is_terminal();
        Self { enabled }
    }

    pub fn with_colours(enabled: bool) -> Self {
        Self { enabled }
    }

    /// `--no-color` and a config file `no-color = true` both disable colour
    pub fn from_args_and_config(no_color_flag: bool, config_no_color: Option<bool>) -> Self {
        if no_color_flag || config_no_color.unwrap_or(false) {
            Self::with_colours(false)
        } else {
            Self::new()
        }
    }

    pub fn colours_enabled(&self) -> bool {
        self.enabled
    }

    pub fn error(&self, text: &str) -> ColoredString {
        self.paint(text, |t| t.bright_red())
    }

    pub fn warning(&self, text: &str) -> ColoredString {
        self.paint(text, |t| t.bright_yellow())
    }

    pub fn info(&self, text: &str) -> ColoredString {
        self.paint(text, |t| t.bright_blue())
    }

    pub fn success(&self, text: &str) -> ColoredString {
        self.paint(text, |t| t.bright_green())
    }

    pub fn highlight(&self, text: &str) -> ColoredString {
        self.paint(text, |t| t.bright_cyan().bold())
    }

    pub fn dimmed(&self, text: &str) -> ColoredString {
        self.paint(text, |t| t.bright_black())
    }

    /// Status label in the colour of its severity
    pub fn status(&self, status: HealthStatus) -> ColoredString {
        let label = status.as_str();
        match status {
            HealthStatus::Active => self.success(label),
            HealthStatus::Degraded => self.warning(label),
            HealthStatus::Error => self.error(label),
            HealthStatus::Inactive => self.dimmed(label),
        }
    }

    pub fn state(&self, state: ModuleState) -> ColoredString {
        match state {
            ModuleState::Active => self.success(state.as_str()),
            ModuleState::Inactive => self.dimmed(state.as_str()),
        }
    }

    fn paint(&self, text: &str, style: impl FnOnce(&str) -> ColoredString) -> ColoredString {
        if self.enabled {
            style(text)
        } else {
            text.normal()
        }
    }
}

impl Default for ColourManager {
    fn default() -> Self {
        Self::new()
    }
}
