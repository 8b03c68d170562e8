//! Command-line parsing and validation helpers.

mod defaults;
mod validation;

use clap::Parser;
use std::time::Duration;

pub use defaults::{
    DEFAULT_BAUD, DEFAULT_HANDSHAKE_TIMEOUT_MS, DEFAULT_PORT, DEFAULT_RESET_PULSE_MS,
    DEFAULT_SCROLLBACK_LINES, DEFAULT_TICK_MS,
};

/// CLI options for the uLisp serial console.
#[derive(Debug, Parser, Clone)]
#[command(name = "ulterm", about = "Terminal console for uLisp over a serial port", author, version)]
pub struct AppConfig {
    /// Serial device the board is attached to
    #[arg(short = 'p', long, env = "ULTERM_PORT", default_value = DEFAULT_PORT)]
    pub port: String,

    /// Line speed in baud
    #[arg(short = 'b', long, env = "ULTERM_BAUD", default_value_t = DEFAULT_BAUD)]
    pub baud: u32,

    /// Longest wait for operator input between device polls (milliseconds)
    #[arg(long = "tick-ms", default_value_t = DEFAULT_TICK_MS)]
    pub tick_ms: u64,

    /// How long to wait for the first prompt after a reset (milliseconds, 0 = forever)
    #[arg(long = "handshake-timeout-ms", default_value_t = DEFAULT_HANDSHAKE_TIMEOUT_MS)]
    pub handshake_timeout_ms: u64,

    /// How long the reset line is held low (milliseconds)
    #[arg(long = "reset-pulse-ms", default_value_t = DEFAULT_RESET_PULSE_MS)]
    pub reset_pulse_ms: u64,

    /// Lines of device output kept in the pane
    #[arg(long = "scrollback-lines", default_value_t = DEFAULT_SCROLLBACK_LINES)]
    pub scrollback_lines: usize,

    /// Enable file logging (debug)
    #[arg(long = "logs", env = "ULTERM_LOGS", default_value_t = false)]
    pub logs: bool,

    /// Disable all file logging (overrides --logs and log env vars)
    #[arg(long = "no-logs", env = "ULTERM_NO_LOGS", default_value_t = false)]
    pub no_logs: bool,

    /// Allow logging device output and commands (debug log only)
    #[arg(
        long = "log-content",
        env = "ULTERM_LOG_CONTENT",
        default_value_t = false
    )]
    pub log_content: bool,
}

impl AppConfig {
    pub fn tick(&self) -> Duration {
        Duration::from_millis(self.tick_ms)
    }

    /// `None` when the handshake should wait forever.
    pub fn handshake_timeout(&self) -> Option<Duration> {
        (self.handshake_timeout_ms > 0).then(|| Duration::from_millis(self.handshake_timeout_ms))
    }

    pub fn reset_pulse(&self) -> Duration {
        Duration::from_millis(self.reset_pulse_ms)
    }

    pub fn logging_enabled(&self) -> bool {
        self.logs && !self.no_logs
    }
}
