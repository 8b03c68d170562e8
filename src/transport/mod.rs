//! Device link: the byte-level [`Transport`] seam plus the session logic that
//! resets the board, waits for the first prompt, and moves text in both directions.

mod decode;
mod serial;

#[cfg(test)]
pub(crate) mod scripted;
#[cfg(test)]
mod tests;

use anyhow::{Context, Result};
use regex::Regex;
use std::io;
use std::thread;
use std::time::{Duration, Instant};
use thiserror::Error;

use crate::log_debug;
use crate::scraper::{FatalMarker, MarkerRegistry, PROMPT_PATTERN};
use crate::session::SessionState;

pub use decode::Utf8Decoder;
pub use serial::{is_supported_baud, SerialPort};

/// Echoed locally before every reset so the pane shows where the device restarted.
pub const RESET_BANNER: &str = "\n---MCU RESET---\n";

const READ_CHUNK_BYTES: usize = 4096;
const POLL_MAX_CHUNKS: usize = 16;
const HANDSHAKE_READ_SLICE: Duration = Duration::from_millis(50);

/// Byte stream to a device with a controllable reset line.
pub trait Transport: Send {
    /// Drive the reset line. `false` holds the device in reset.
    fn set_reset_line(&mut self, asserted: bool) -> io::Result<()>;

    /// Drop any bytes received but not yet read.
    fn clear_input(&mut self) -> io::Result<()>;

    /// Read whatever is available, waiting at most `timeout`. `Ok(0)` means nothing arrived.
    fn read_timeout(&mut self, buf: &mut [u8], timeout: Duration) -> io::Result<usize>;

    fn write_all(&mut self, data: &[u8]) -> io::Result<()>;

    fn flush(&mut self) -> io::Result<()>;

    /// Human-readable name, e.g. the device path.
    fn label(&self) -> String;
}

/// The device never printed a prompt within the configured window.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("no prompt from device after {} ms", .waited.as_millis())]
pub struct HandshakeTimeout {
    pub waited: Duration,
}

/// Result of a successful reset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Handshake {
    /// Free cells reported by the first prompt.
    pub free_cells: Option<u64>,
    /// The prompt text itself, e.g. `"9044> "`.
    pub prompt: String,
    /// Text that followed the prompt in the same read; not yet shown anywhere.
    pub trailing: String,
}

/// Owns the transport and the decoding state that spans reads.
pub struct TransportSession<T: Transport> {
    transport: T,
    decoder: Utf8Decoder,
    prompt: Regex,
    reset_pulse: Duration,
}

impl<T: Transport> TransportSession<T> {
    pub fn new(transport: T, reset_pulse: Duration) -> Self {
        Self {
            transport,
            decoder: Utf8Decoder::new(),
            prompt: Regex::new(PROMPT_PATTERN).expect("prompt regex"),
            reset_pulse,
        }
    }

    pub fn label(&self) -> String {
        self.transport.label()
    }

    /// Reset the device and block until its first prompt.
    ///
    /// Complete lines seen before the prompt are handed to `sink` (already
    /// decoded, markers untouched). A fatal marker in any of them aborts with
    /// [`FatalMarker`]; running past `deadline` aborts with [`HandshakeTimeout`].
    pub fn startup(
        &mut self,
        registry: &MarkerRegistry,
        state: &SessionState,
        sink: &mut dyn FnMut(&str),
        deadline: Option<Duration>,
    ) -> Result<Handshake> {
        sink(RESET_BANNER);
        self.transport
            .set_reset_line(false)
            .context("failed to hold device in reset")?;
        if !self.reset_pulse.is_zero() {
            thread::sleep(self.reset_pulse);
        }
        self.transport
            .set_reset_line(true)
            .context("failed to release device reset")?;
        self.transport
            .clear_input()
            .context("failed to discard stale input")?;
        self.decoder.reset();
        log_debug(&format!("reset issued on {}", self.transport.label()));

        let started = Instant::now();
        let mut pending = String::new();
        let mut buf = [0u8; READ_CHUNK_BYTES];
        loop {
            let n = self
                .transport
                .read_timeout(&mut buf, HANDSHAKE_READ_SLICE)
                .context("serial read failed while waiting for prompt")?;
            if n > 0 {
                pending.push_str(&self.decoder.decode(&buf[..n]));
                if let Some(handshake) = self.drain_lines(&mut pending, registry, state, sink)? {
                    log_debug(&format!(
                        "prompt seen after {} ms",
                        started.elapsed().as_millis()
                    ));
                    return Ok(handshake);
                }
            }
            if let Some(limit) = deadline {
                if started.elapsed() >= limit {
                    return Err(HandshakeTimeout { waited: limit }.into());
                }
            }
        }
    }

    fn drain_lines(
        &self,
        pending: &mut String,
        registry: &MarkerRegistry,
        state: &SessionState,
        sink: &mut dyn FnMut(&str),
    ) -> Result<Option<Handshake>> {
        loop {
            let line_end = pending.find('\n');
            let first_line = &pending[..line_end.map_or(pending.len(), |idx| idx + 1)];
            if let Some(captures) = self.prompt.captures(first_line) {
                let whole = captures.get(0).map_or(0..0, |m| m.range());
                let free_cells = captures.get(1).and_then(|m| m.as_str().parse().ok());
                if whole.start > 0 {
                    sink(&pending[..whole.start]);
                }
                let prompt = pending[whole.clone()].to_string();
                let trailing = pending.split_off(whole.end);
                return Ok(Some(Handshake {
                    free_cells,
                    prompt,
                    trailing,
                }));
            }
            let Some(idx) = line_end else {
                return Ok(None);
            };
            let line: String = pending.drain(..=idx).collect();
            if let Some((watcher, reason)) = registry.fatal_in(&line, state) {
                return Err(FatalMarker { watcher, reason }.into());
            }
            sink(&line);
        }
    }

    /// Everything currently available, or `None` when the device is quiet.
    pub fn poll(&mut self) -> Result<Option<String>> {
        let mut text = String::new();
        let mut buf = [0u8; READ_CHUNK_BYTES];
        for _ in 0..POLL_MAX_CHUNKS {
            let n = self
                .transport
                .read_timeout(&mut buf, Duration::ZERO)
                .context("serial read failed")?;
            if n == 0 {
                break;
            }
            text.push_str(&self.decoder.decode(&buf[..n]));
        }
        Ok((!text.is_empty()).then_some(text))
    }

    /// Write `text` plus a newline and wait for it to leave the port.
    pub fn send_command(&mut self, text: &str) -> Result<()> {
        self.transport
            .write_all(text.as_bytes())
            .and_then(|()| self.transport.write_all(b"\n"))
            .and_then(|()| self.transport.flush())
            .context("failed to write command to device")
    }
}
