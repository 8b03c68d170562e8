//! Session state derived from device markers, plus readouts for the UI.

mod display;
pub mod readout;
mod state;

pub use display::{clean_display_text, normalize_newlines};
pub use state::{SessionState, SharedState, StateUpdate, INITIAL_STATUS};
