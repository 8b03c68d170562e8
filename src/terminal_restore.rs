//! Puts the operator's terminal back the way we found it, on drop and on panic.
//!
//! Each mode switched on by [`TerminalRestoreGuard::enter`] sets a bit in a global
//! mask; [`restore_terminal`] clears the mask and undoes exactly those modes, so the
//! drop path and the panic hook can both run without doing anything twice.

use crossterm::{
    cursor::Show,
    execute, queue,
    terminal::{
        disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen, SetTitle,
    },
};
use std::{
    io::{self, Write},
    panic,
    sync::{
        atomic::{AtomicU8, Ordering},
        OnceLock,
    },
};

const RAW_MODE: u8 = 1 << 0;
const ALT_SCREEN: u8 = 1 << 1;
const TITLE_PUSHED: u8 = 1 << 2;

/// xterm window-title stack (XTWINOPS 22/23). Terminals without it ignore both.
const PUSH_TITLE: &str = "\x1b[22;0t";
const POP_TITLE: &str = "\x1b[23;0t";

static ACTIVE_MODES: AtomicU8 = AtomicU8::new(0);
static PANIC_HOOK_INSTALLED: OnceLock<()> = OnceLock::new();

fn mark(mode: u8) {
    ACTIVE_MODES.fetch_or(mode, Ordering::SeqCst);
}

/// Owns the full-screen session; dropping it hands the terminal back.
pub struct TerminalRestoreGuard;

impl TerminalRestoreGuard {
    pub fn new() -> Self {
        install_terminal_panic_hook();
        TerminalRestoreGuard
    }

    /// Save the window title, show `title`, then switch to raw mode on the
    /// alternate screen.
    pub fn enter(&self, stdout: &mut impl Write, title: &str) -> io::Result<()> {
        stdout.write_all(PUSH_TITLE.as_bytes())?;
        mark(TITLE_PUSHED);
        queue!(stdout, SetTitle(title))?;
        enable_raw_mode()?;
        mark(RAW_MODE);
        execute!(stdout, EnterAlternateScreen)?;
        mark(ALT_SCREEN);
        Ok(())
    }

    pub fn restore(&self) {
        restore_terminal();
    }
}

impl Default for TerminalRestoreGuard {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for TerminalRestoreGuard {
    fn drop(&mut self) {
        restore_terminal();
    }
}

pub fn restore_terminal() {
    let modes = ACTIVE_MODES.swap(0, Ordering::SeqCst);
    if modes == 0 {
        return;
    }
    let _ = undo_modes(&mut io::stdout(), modes);
}

/// Reverse of `enter`, limited to the bits in `modes`.
fn undo_modes(out: &mut impl Write, modes: u8) -> io::Result<()> {
    if modes & RAW_MODE != 0 {
        let _ = disable_raw_mode();
    }
    if modes & ALT_SCREEN != 0 {
        queue!(out, LeaveAlternateScreen)?;
    }
    queue!(out, Show)?;
    if modes & TITLE_PUSHED != 0 {
        out.write_all(POP_TITLE.as_bytes())?;
    }
    out.flush()
}

pub fn install_terminal_panic_hook() {
    PANIC_HOOK_INSTALLED.get_or_init(|| {
        let previous = panic::take_hook();
        panic::set_hook(Box::new(move |info| {
            restore_terminal();
            crate::log_panic(info);
            crate::log_debug_content(&format!("panic: {info}"));
            previous(info);
        }));
    });
}
