//! Serial console for uLisp boards.
//!
//! Device output is scraped for protocol markers (memory reports, status lines,
//! fatal bootloader notices) before it reaches the operator, and the scraped facts
//! are kept as [`session::SessionState`] for the status bar.

pub mod config;
mod lock;
mod logging;
pub mod repl;
pub mod scraper;
pub mod session;
mod telemetry;
pub mod terminal_restore;
pub mod transport;

pub(crate) use lock::lock_or_recover;
pub use logging::{
    crash_log_path, init_logging, log_debug, log_debug_content, log_file_path, log_panic,
};
pub use telemetry::{init_tracing, tracing_log_path};
