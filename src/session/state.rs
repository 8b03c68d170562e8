//! Session facts scraped from device output.

use serde::Serialize;
use std::sync::{Arc, Mutex};

use crate::lock_or_recover;

/// Status shown before the device has reported anything.
pub const INITIAL_STATUS: &str = "Loading...";

/// Structured, continuously-updated view of the device session.
///
/// Memory fields stay `None` until the device reports them so the UI can tell
/// "unknown" apart from a real zero.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionState {
    pub workspace_size: Option<u64>,
    pub free_cells: Option<u64>,
    pub last_gc_freed: Option<u64>,
    pub gc_count: Option<u64>,
    pub device_version: Option<String>,
    pub status_text: String,
    pub right_status_text: String,
}

impl Default for SessionState {
    fn default() -> Self {
        Self {
            workspace_size: None,
            free_cells: None,
            last_gc_freed: None,
            gc_count: None,
            device_version: None,
            status_text: INITIAL_STATUS.to_string(),
            right_status_text: String::new(),
        }
    }
}

/// One field-level change produced by a marker effect.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StateUpdate {
    Memory {
        gc_count: u64,
        last_gc_freed: u64,
        free_cells: u64,
        workspace_size: u64,
    },
    /// Free-cell count learned from a prompt during the reset handshake.
    FreeCells(u64),
    Status(String),
    RightStatus(String),
    DeviceVersion(String),
}

impl SessionState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return a copy of `self` with `update` applied.
    pub fn with(&self, update: &StateUpdate) -> Self {
        let mut next = self.clone();
        next.apply(update);
        next
    }

    pub fn apply(&mut self, update: &StateUpdate) {
        match update {
            StateUpdate::Memory {
                gc_count,
                last_gc_freed,
                free_cells,
                workspace_size,
            } => {
                self.gc_count = Some(*gc_count);
                self.last_gc_freed = Some(*last_gc_freed);
                self.free_cells = Some(*free_cells);
                self.workspace_size = Some(*workspace_size);
            }
            StateUpdate::FreeCells(free) => {
                // A prompt can't raise free space past a known workspace size.
                if self.workspace_size.is_none_or(|size| *free <= size) {
                    self.free_cells = Some(*free);
                }
            }
            StateUpdate::Status(text) => self.status_text = text.clone(),
            StateUpdate::RightStatus(text) => self.right_status_text = text.clone(),
            StateUpdate::DeviceVersion(version) => self.device_version = Some(version.clone()),
        }
    }

    /// True when the left status currently reports an error.
    pub fn status_is_error(&self) -> bool {
        self.status_text.to_lowercase().contains("error")
    }

    /// Fraction of the workspace in use, once both sides are known.
    pub fn usage_fraction(&self) -> Option<f64> {
        let size = self.workspace_size.filter(|size| *size > 0)?;
        let free = self.free_cells?;
        Some(1.0 - (free.min(size) as f64 / size as f64))
    }
}

/// Session state shared between the command loop (sole writer) and the UI.
#[derive(Debug, Clone, Default)]
pub struct SharedState {
    inner: Arc<Mutex<SessionState>>,
}

impl SharedState {
    pub fn new(state: SessionState) -> Self {
        Self {
            inner: Arc::new(Mutex::new(state)),
        }
    }

    /// Consistent copy of the current state.
    pub fn snapshot(&self) -> SessionState {
        lock_or_recover(&self.inner, "SharedState::snapshot").clone()
    }

    pub(crate) fn replace(&self, state: SessionState) {
        *lock_or_recover(&self.inner, "SharedState::replace") = state;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_state_uses_placeholders() {
        let state = SessionState::new();
        assert_eq!(state.free_cells, None);
        assert_eq!(state.workspace_size, None);
        assert_eq!(state.status_text, INITIAL_STATUS);
        assert!(state.usage_fraction().is_none());
    }

    #[test]
    fn memory_update_overwrites_all_fields() {
        let state = SessionState::new().with(&StateUpdate::Memory {
            gc_count: 3,
            last_gc_freed: 12,
            free_cells: 450,
            workspace_size: 9044,
        });
        assert_eq!(state.gc_count, Some(3));
        assert_eq!(state.last_gc_freed, Some(12));
        assert_eq!(state.free_cells, Some(450));
        assert_eq!(state.workspace_size, Some(9044));
    }

    #[test]
    fn prompt_free_cells_respect_known_workspace() {
        let mut state = SessionState::new();
        state.apply(&StateUpdate::FreeCells(700));
        assert_eq!(state.free_cells, Some(700));

        state.workspace_size = Some(500);
        state.apply(&StateUpdate::FreeCells(900));
        assert_eq!(state.free_cells, Some(700));
        state.apply(&StateUpdate::FreeCells(400));
        assert_eq!(state.free_cells, Some(400));
    }

    #[test]
    fn status_error_check_is_case_insensitive() {
        let mut state = SessionState::new();
        state.status_text = "ERROR: too many args".to_string();
        assert!(state.status_is_error());
        state.status_text = "Ready.".to_string();
        assert!(!state.status_is_error());
    }

    #[test]
    fn usage_fraction_handles_zero_workspace() {
        let mut state = SessionState::new();
        state.free_cells = Some(0);
        state.workspace_size = Some(0);
        assert!(state.usage_fraction().is_none());
        state.workspace_size = Some(100);
        state.free_cells = Some(25);
        assert_eq!(state.usage_fraction(), Some(0.75));
    }

    #[test]
    fn shared_state_snapshot_reflects_updates() {
        let shared = SharedState::default();
        shared.replace(shared.snapshot().with(&StateUpdate::RightStatus("wifi".to_string())));
        assert_eq!(shared.snapshot().right_status_text, "wifi");
        let mut next = shared.snapshot();
        next.status_text = "Ready.".to_string();
        shared.replace(next);
        assert_eq!(shared.snapshot().status_text, "Ready.");
    }
}
