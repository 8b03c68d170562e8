mod app;
mod ui;

use anyhow::{bail, Context, Result};
use crossbeam_channel::unbounded;
use std::thread;
use ulterm::config::AppConfig;
use ulterm::repl::{CommandLoop, Composer, LoopExit, LoopSettings};
use ulterm::scraper::{MarkerRegistry, StreamScraper};
use ulterm::session::SharedState;
use ulterm::transport::{SerialPort, TransportSession};
use ulterm::{init_logging, init_tracing, log_debug, log_file_path};

use crate::app::App;

fn main() -> Result<()> {
    let config = AppConfig::parse_args()?;
    init_logging(&config);
    init_tracing(&config);
    log_debug("=== ulterm started ===");
    log_debug(&format!("Log file: {:?}", log_file_path()));

    let port = SerialPort::open(&config.port, config.baud)
        .with_context(|| format!("cannot open {}", config.port))?;
    tracing::info!(port = %port.path(), baud = port.baud(), "serial port opened");

    let state = SharedState::default();
    let composer = Composer::new();
    let (command_tx, command_rx) = unbounded();
    let (event_tx, event_rx) = unbounded();

    let command_loop = CommandLoop::new(
        TransportSession::new(port, config.reset_pulse()),
        StreamScraper::new(MarkerRegistry::standard()),
        state.clone(),
        composer.clone(),
        command_rx,
        event_tx,
        LoopSettings {
            tick: config.tick(),
            handshake_timeout: config.handshake_timeout(),
        },
    );
    let loop_handle = thread::Builder::new()
        .name("ulterm-loop".to_string())
        .spawn(move || command_loop.run())
        .context("failed to start command loop thread")?;

    let mut app = App::new(
        &config.port,
        config.scrollback_lines,
        state,
        composer,
        command_tx,
        event_rx,
    );
    let ui_result = ui::run_app(&mut app);
    let exit = app.take_exit();
    drop(app);

    if let Err(err) = ui_result {
        log_debug(&format!("UI failed: {err:#}"));
        return Err(err);
    }
    if exit.is_some() {
        let _ = loop_handle.join();
    }

    log_debug("=== ulterm exiting ===");
    match exit {
        Some(LoopExit::ProtocolFatal(reason)) => {
            bail!("device on {} stopped the session: {reason}", config.port)
        }
        Some(LoopExit::Disconnected(reason)) => {
            bail!("lost connection to {}: {reason}", config.port)
        }
        Some(LoopExit::Quit) | None => Ok(()),
    }
}
