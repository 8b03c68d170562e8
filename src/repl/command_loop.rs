//! Cooperative loop that interleaves operator commands with device output.

use anyhow::Result;
use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, TryRecvError};
use std::time::Duration;

use super::command::{classify, Command, QUIT_COMMAND};
use super::composer::Composer;
use crate::scraper::{FatalMarker, ScrapeReport, StreamScraper};
use crate::session::{SessionState, SharedState, StateUpdate};
use crate::transport::{HandshakeTimeout, Transport, TransportSession};
use crate::{log_debug, log_debug_content};

pub const RUNNING_STATUS: &str = "Running...";
pub const NO_PROMPT_STATUS: &str = "No prompt from device";

/// Consecutive quiet polls before a held tail is released.
const IDLE_POLLS_BEFORE_FLUSH: u32 = 2;

/// Sent from the loop thread to whoever draws the screen.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoopEvent {
    /// Scraped device text for the output pane.
    Display(String),
    /// New window title.
    Title(String),
    /// The loop has stopped; no further events follow.
    Terminated(LoopExit),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoopExit {
    Quit,
    ProtocolFatal(String),
    Disconnected(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoopSettings {
    /// Longest wait for a command between transport polls.
    pub tick: Duration,
    /// `None` waits for the first prompt forever.
    pub handshake_timeout: Option<Duration>,
}

/// Forwards scrape results to the UI and commits state.
struct Outputs {
    events: Sender<LoopEvent>,
    state: SharedState,
    label: String,
    announced_version: Option<String>,
}

impl Outputs {
    fn display(&self, text: &str) {
        if text.is_empty() {
            return;
        }
        log_debug_content(&format!("device: {text:?}"));
        let _ = self.events.send(LoopEvent::Display(text.to_string()));
    }

    fn publish(&mut self, report: ScrapeReport) {
        self.display(&report.display);
        for consumption in &report.consumed {
            log_debug_content(&format!(
                "marker {}: {:?}",
                consumption.watcher, consumption.text
            ));
        }
        if report.changed {
            self.commit(report.state);
        }
    }

    fn commit(&mut self, state: SessionState) {
        match serde_json::to_string(&state) {
            Ok(snapshot) => tracing::debug!(target: "ulterm::session", %snapshot, "session state changed"),
            Err(err) => log_debug(&format!("failed to serialize session state: {err}")),
        }
        let version = state.device_version.clone();
        self.state.replace(state);
        if let Some(version) = version {
            if self.announced_version.as_deref() != Some(version.as_str()) {
                let _ = self
                    .events
                    .send(LoopEvent::Title(format!("uLisp {version} on {}", self.label)));
                self.announced_version = Some(version);
            }
        }
    }

    fn set_status(&mut self, status: &str) {
        let next = self
            .state
            .snapshot()
            .with(&StateUpdate::Status(status.to_string()));
        self.commit(next);
    }
}

/// Owns the transport for its whole life; see [`CommandLoop::tick`].
pub struct CommandLoop<T: Transport> {
    session: TransportSession<T>,
    scraper: StreamScraper,
    outputs: Outputs,
    composer: Composer,
    commands: Receiver<String>,
    settings: LoopSettings,
    slot: Option<String>,
    idle_polls: u32,
}

impl<T: Transport> CommandLoop<T> {
    pub fn new(
        session: TransportSession<T>,
        scraper: StreamScraper,
        state: SharedState,
        composer: Composer,
        commands: Receiver<String>,
        events: Sender<LoopEvent>,
        settings: LoopSettings,
    ) -> Self {
        let label = session.label();
        Self {
            session,
            scraper,
            outputs: Outputs {
                events,
                state,
                label,
                announced_version: None,
            },
            composer,
            commands,
            settings,
            slot: None,
            idle_polls: 0,
        }
    }

    /// Reset the device, then tick until something ends the loop.
    pub fn run(mut self) -> LoopExit {
        tracing::info!(port = %self.outputs.label, "command loop started");
        let _ = self
            .outputs
            .events
            .send(LoopEvent::Title(format!("uLisp on {}", self.outputs.label)));
        let exit = match self.reset() {
            Ok(()) => loop {
                if let Some(exit) = self.tick() {
                    break exit;
                }
            },
            Err(err) => self.exit_for(err),
        };
        self.finish(exit)
    }

    /// One step: handle at most one command, drain the transport, then wait up to
    /// one tick for the next command. Returns the exit reason once the loop is done.
    pub fn tick(&mut self) -> Option<LoopExit> {
        match self.step() {
            Ok(flow) => flow,
            Err(err) => Some(self.exit_for(err)),
        }
    }

    fn step(&mut self) -> Result<Option<LoopExit>> {
        if let Some(entry) = self.next_entry() {
            match classify(&entry) {
                Command::Quit => return Ok(Some(LoopExit::Quit)),
                Command::Reset => self.reset()?,
                Command::Run => {
                    let text = self.composer.take();
                    self.send(&text)?;
                }
                Command::Send(text) => self.send(&text)?,
            }
        }
        self.drain()?;
        self.wait_for_command();
        Ok(None)
    }

    fn next_entry(&mut self) -> Option<String> {
        if let Some(entry) = self.slot.take() {
            return Some(entry);
        }
        match self.commands.try_recv() {
            Ok(entry) => Some(entry),
            Err(TryRecvError::Empty) => None,
            Err(TryRecvError::Disconnected) => Some(QUIT_COMMAND.to_string()),
        }
    }

    fn wait_for_command(&mut self) {
        if self.slot.is_some() {
            return;
        }
        match self.commands.recv_timeout(self.settings.tick) {
            Ok(entry) => self.slot = Some(entry),
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => self.slot = Some(QUIT_COMMAND.to_string()),
        }
    }

    fn send(&mut self, text: &str) -> Result<()> {
        if text.trim().is_empty() {
            log_debug("empty command discarded");
            return Ok(());
        }
        self.outputs.set_status(RUNNING_STATUS);
        log_debug_content(&format!("command: {text:?}"));
        self.session.send_command(text)
    }

    fn drain(&mut self) -> Result<()> {
        let state = self.outputs.state.snapshot();
        let report = match self.session.poll()? {
            Some(text) => {
                self.idle_polls = 0;
                self.scraper.feed(&text, &state)?
            }
            None => {
                if !self.scraper.has_pending() {
                    return Ok(());
                }
                self.idle_polls += 1;
                if self.idle_polls < IDLE_POLLS_BEFORE_FLUSH {
                    return Ok(());
                }
                self.idle_polls = 0;
                self.scraper.flush(&state)?
            }
        };
        self.outputs.publish(report);
        Ok(())
    }

    fn reset(&mut self) -> Result<()> {
        tracing::info!(port = %self.outputs.label, "resetting device");
        let before = self.outputs.state.snapshot();
        let tail = self.scraper.flush(&before)?;
        self.outputs.publish(tail);
        self.idle_polls = 0;

        let registry = self.scraper.registry().clone();
        let state = self.outputs.state.snapshot();
        let scraper = &mut self.scraper;
        let outputs = &mut self.outputs;
        let mut fatal: Option<FatalMarker> = None;
        let mut forward = |text: &str| {
            if fatal.is_some() {
                return;
            }
            let current = outputs.state.snapshot();
            match scraper.feed(text, &current) {
                Ok(report) => outputs.publish(report),
                Err(err) => fatal = Some(err),
            }
        };
        let result = self.session.startup(
            &registry,
            &state,
            &mut forward,
            self.settings.handshake_timeout,
        );
        if let Some(err) = fatal {
            return Err(err.into());
        }

        match result {
            Ok(handshake) => {
                tracing::info!(free_cells = ?handshake.free_cells, "device prompt received");
                if let Some(free) = handshake.free_cells {
                    let next = self
                        .outputs
                        .state
                        .snapshot()
                        .with(&StateUpdate::FreeCells(free));
                    self.outputs.commit(next);
                }
                let text = format!("{}{}", handshake.prompt, handshake.trailing);
                let current = self.outputs.state.snapshot();
                let report = self.scraper.feed(&text, &current)?;
                self.outputs.publish(report);
                Ok(())
            }
            Err(err) if err.downcast_ref::<HandshakeTimeout>().is_some() => {
                tracing::warn!(error = %err, "handshake timed out");
                log_debug(&format!("handshake timed out: {err}"));
                self.outputs.set_status(NO_PROMPT_STATUS);
                Ok(())
            }
            Err(err) => Err(err),
        }
    }

    fn exit_for(&mut self, err: anyhow::Error) -> LoopExit {
        if let Some(fatal) = err.downcast_ref::<FatalMarker>() {
            let reason = fatal.reason.clone();
            self.outputs.set_status(&format!("Fatal: {reason}"));
            self.outputs
                .display(&format!("\n*** {fatal}; closing connection ***\n"));
            return LoopExit::ProtocolFatal(reason);
        }
        log_debug(&format!("transport failure: {err:#}"));
        LoopExit::Disconnected(format!("{err:#}"))
    }

    fn finish(self, exit: LoopExit) -> LoopExit {
        tracing::info!(port = %self.outputs.label, exit = ?exit, "command loop stopped");
        log_debug(&format!("command loop stopped: {exit:?}"));
        let _ = self
            .outputs
            .events
            .send(LoopEvent::Terminated(exit.clone()));
        exit
    }
}
