use std::mem;
use std::sync::{Arc, Mutex};

use crate::lock_or_recover;

/// Multi-line composition buffer shared by the editor and the command loop.
///
/// The UI edits it in place; the loop drains it when `.run` is handled.
#[derive(Debug, Clone, Default)]
pub struct Composer {
    inner: Arc<Mutex<String>>,
}

impl Composer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn text(&self) -> String {
        lock_or_recover(&self.inner, "composer text").clone()
    }

    pub fn set(&self, text: &str) {
        let mut buffer = lock_or_recover(&self.inner, "composer set");
        buffer.clear();
        buffer.push_str(text);
    }

    /// Run `f` with exclusive access to the buffer.
    pub fn edit<R>(&self, f: impl FnOnce(&mut String) -> R) -> R {
        let mut buffer = lock_or_recover(&self.inner, "composer edit");
        f(&mut buffer)
    }

    /// Return the contents and leave the buffer empty.
    pub fn take(&self) -> String {
        mem::take(&mut *lock_or_recover(&self.inner, "composer take"))
    }
}
