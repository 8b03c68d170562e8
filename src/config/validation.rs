use super::defaults::{
    MAX_HANDSHAKE_TIMEOUT_MS, MAX_RESET_PULSE_MS, MAX_SCROLLBACK_LINES, MAX_TICK_MS,
    MIN_SCROLLBACK_LINES, MIN_TICK_MS,
};
use super::AppConfig;
use crate::transport::is_supported_baud;
use anyhow::{bail, Result};
use clap::Parser;

impl AppConfig {
    /// Parse CLI arguments and validate them right away.
    pub fn parse_args() -> Result<Self> {
        let mut config = Self::parse();
        config.validate()?;
        Ok(config)
    }

    /// Check CLI values and normalize the port path.
    pub fn validate(&mut self) -> Result<()> {
        let port = self.port.trim();
        if port.is_empty() {
            bail!("--port cannot be empty");
        }
        if port.contains('\0') {
            bail!("--port cannot contain NUL bytes");
        }
        self.port = port.to_string();

        if !is_supported_baud(self.baud) {
            bail!("--baud {} is not a supported line speed", self.baud);
        }
        if !(MIN_TICK_MS..=MAX_TICK_MS).contains(&self.tick_ms) {
            bail!(
                "--tick-ms must be between {MIN_TICK_MS} and {MAX_TICK_MS}, got {}",
                self.tick_ms
            );
        }
        if self.handshake_timeout_ms > MAX_HANDSHAKE_TIMEOUT_MS {
            bail!(
                "--handshake-timeout-ms must be at most {MAX_HANDSHAKE_TIMEOUT_MS} (0 waits forever), got {}",
                self.handshake_timeout_ms
            );
        }
        if self.reset_pulse_ms > MAX_RESET_PULSE_MS {
            bail!(
                "--reset-pulse-ms must be between 0 and {MAX_RESET_PULSE_MS}, got {}",
                self.reset_pulse_ms
            );
        }
        if !(MIN_SCROLLBACK_LINES..=MAX_SCROLLBACK_LINES).contains(&self.scrollback_lines) {
            bail!(
                "--scrollback-lines must be between {MIN_SCROLLBACK_LINES} and {MAX_SCROLLBACK_LINES}, got {}",
                self.scrollback_lines
            );
        }
        Ok(())
    }
}
