//! UI-side state: the output pane, the command line with history, and the editor
//! focus. Everything here runs on the UI thread.

use std::collections::VecDeque;

use crossbeam_channel::{Receiver, Sender};
use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};
use ulterm::repl::{
    classify, lisp, Command, Composer, LoopEvent, LoopExit, QUIT_COMMAND, RUN_COMMAND,
};
use ulterm::session::{clean_display_text, SessionState, SharedState};
use ulterm::{log_debug, log_debug_content};

const PAGE_LINES: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Focus {
    CommandLine,
    Editor,
}

/// Bounded scrollback of device output.
#[derive(Debug)]
pub(crate) struct OutputPane {
    lines: VecDeque<String>,
    max_lines: usize,
    /// Lines scrolled up from the bottom; 0 follows new output.
    scroll: usize,
}

impl OutputPane {
    pub(crate) fn new(max_lines: usize) -> Self {
        let mut lines = VecDeque::new();
        lines.push_back(String::new());
        Self {
            lines,
            max_lines: max_lines.max(1),
            scroll: 0,
        }
    }

    pub(crate) fn push(&mut self, text: &str) {
        let cleaned = clean_display_text(text);
        let mut pieces = cleaned.split('\n');
        if let Some(first) = pieces.next() {
            if let Some(last) = self.lines.back_mut() {
                last.push_str(first);
            }
        }
        for piece in pieces {
            self.lines.push_back(piece.to_string());
        }
        while self.lines.len() > self.max_lines {
            self.lines.pop_front();
        }
        self.scroll = self.scroll.min(self.lines.len().saturating_sub(1));
    }

    pub(crate) fn lines(&self) -> &VecDeque<String> {
        &self.lines
    }

    pub(crate) fn scroll(&self) -> usize {
        self.scroll
    }

    /// The `height` lines to show, honouring the scroll position.
    pub(crate) fn visible(&self, height: usize) -> impl Iterator<Item = &String> {
        let end = self.lines.len().saturating_sub(self.scroll);
        let start = end.saturating_sub(height);
        self.lines.range(start..end)
    }

    fn scroll_up(&mut self, amount: usize) {
        self.scroll = (self.scroll + amount).min(self.lines.len().saturating_sub(1));
    }

    fn scroll_down(&mut self, amount: usize) {
        self.scroll = self.scroll.saturating_sub(amount);
    }
}

pub(crate) struct App {
    port: String,
    state: SharedState,
    composer: Composer,
    commands: Sender<String>,
    events: Receiver<LoopEvent>,
    pane: OutputPane,
    input: String,
    history: Vec<String>,
    history_index: Option<usize>,
    focus: Focus,
    notice: Option<String>,
    pending_title: Option<String>,
    exit: Option<LoopExit>,
    should_close: bool,
}

impl App {
    pub(crate) fn new(
        port: &str,
        scrollback_lines: usize,
        state: SharedState,
        composer: Composer,
        commands: Sender<String>,
        events: Receiver<LoopEvent>,
    ) -> Self {
        Self {
            port: port.to_string(),
            state,
            composer,
            commands,
            events,
            pane: OutputPane::new(scrollback_lines),
            input: String::new(),
            history: Vec::new(),
            history_index: None,
            focus: Focus::CommandLine,
            notice: None,
            pending_title: None,
            exit: None,
            should_close: false,
        }
    }

    pub(crate) fn port(&self) -> &str {
        &self.port
    }

    pub(crate) fn pane(&self) -> &OutputPane {
        &self.pane
    }

    pub(crate) fn input(&self) -> &str {
        &self.input
    }

    pub(crate) fn composition(&self) -> String {
        self.composer.text()
    }

    pub(crate) fn focus(&self) -> Focus {
        self.focus
    }

    pub(crate) fn session(&self) -> SessionState {
        self.state.snapshot()
    }

    /// Validation problem or connection notice shown instead of the device status.
    pub(crate) fn notice(&self) -> Option<&str> {
        self.notice.as_deref()
    }

    pub(crate) fn take_title(&mut self) -> Option<String> {
        self.pending_title.take()
    }

    pub(crate) fn should_close(&self) -> bool {
        self.should_close
    }

    pub(crate) fn take_exit(&mut self) -> Option<LoopExit> {
        self.exit.take()
    }

    /// Apply everything the loop has sent since the last frame. Returns true if
    /// anything changed.
    pub(crate) fn drain_events(&mut self) -> bool {
        let mut changed = false;
        while let Ok(event) = self.events.try_recv() {
            changed = true;
            match event {
                LoopEvent::Display(text) => self.pane.push(&text),
                LoopEvent::Title(title) => self.pending_title = Some(title),
                LoopEvent::Terminated(exit) => self.on_terminated(exit),
            }
        }
        changed
    }

    fn on_terminated(&mut self, exit: LoopExit) {
        log_debug(&format!("loop terminated: {exit:?}"));
        match &exit {
            LoopExit::Quit => self.should_close = true,
            LoopExit::ProtocolFatal(reason) => {
                self.notice = Some(format!("Fatal: {reason}. Press any key to exit."));
            }
            LoopExit::Disconnected(reason) => {
                self.pane
                    .push(&format!("\n*** connection to {} lost: {reason} ***\n", self.port));
                self.notice = Some("Disconnected. Press any key to exit.".to_string());
            }
        }
        self.exit = Some(exit);
    }

    fn loop_stopped(&self) -> bool {
        self.exit.is_some()
    }

    fn enqueue(&mut self, entry: &str) {
        log_debug_content(&format!("enqueue: {entry:?}"));
        if self.commands.send(entry.to_string()).is_err() {
            self.notice = Some("Command loop is not running".to_string());
        }
    }

    pub(crate) fn handle_key(&mut self, key: KeyEvent) {
        if self.loop_stopped() {
            self.should_close = true;
            return;
        }
        let ctrl = key.modifiers.contains(KeyModifiers::CONTROL);
        match key.code {
            KeyCode::Char('q') | KeyCode::Char('c') if ctrl => self.enqueue(QUIT_COMMAND),
            KeyCode::Char('r') if ctrl => {
                self.run_composition();
            }
            KeyCode::Tab => {
                self.focus = match self.focus {
                    Focus::CommandLine => Focus::Editor,
                    Focus::Editor => Focus::CommandLine,
                };
            }
            KeyCode::PageUp => self.pane.scroll_up(PAGE_LINES),
            KeyCode::PageDown => self.pane.scroll_down(PAGE_LINES),
            _ => match self.focus {
                Focus::CommandLine => self.handle_command_line_key(key.code, ctrl),
                Focus::Editor => self.handle_editor_key(key.code, ctrl),
            },
        }
    }

    fn handle_command_line_key(&mut self, code: KeyCode, ctrl: bool) {
        match code {
            KeyCode::Enter => self.submit_command_line(),
            KeyCode::Backspace => {
                self.input.pop();
            }
            KeyCode::Esc => {
                self.input.clear();
                self.notice = None;
            }
            KeyCode::Up => self.history_prev(),
            KeyCode::Down => self.history_next(),
            KeyCode::Char(c) if !ctrl => {
                self.input.push(c);
                self.history_index = None;
            }
            _ => {}
        }
    }

    fn handle_editor_key(&mut self, code: KeyCode, ctrl: bool) {
        match code {
            KeyCode::Enter => self.composer.edit(|text| text.push('\n')),
            KeyCode::Backspace => {
                self.composer.edit(|text| {
                    text.pop();
                });
            }
            KeyCode::Char(c) if !ctrl => self.composer.edit(|text| text.push(c)),
            _ => {}
        }
    }

    fn submit_command_line(&mut self) {
        let entry = self.input.trim_end().to_string();
        match classify(&entry) {
            Command::Run => {
                if !self.run_composition() {
                    return;
                }
            }
            Command::Reset | Command::Quit => {
                self.notice = None;
                self.enqueue(&entry);
            }
            Command::Send(_) => {
                if let Err(err) = lisp::check_balance(&entry) {
                    self.notice = Some(format!("Not sent: {err}"));
                    return;
                }
                self.notice = None;
                self.enqueue(&entry);
            }
        }
        if !entry.trim().is_empty() && self.history.last() != Some(&entry) {
            self.history.push(entry);
        }
        self.history_index = None;
        self.input.clear();
    }

    /// Queue `.run` if the editor text is well formed; false leaves it unsent.
    fn run_composition(&mut self) -> bool {
        if let Err(err) = lisp::check_balance(&self.composer.text()) {
            self.notice = Some(format!("Editor not sent: {err}"));
            return false;
        }
        self.notice = None;
        self.enqueue(RUN_COMMAND);
        true
    }

    fn history_prev(&mut self) {
        if self.history.is_empty() {
            return;
        }
        let index = match self.history_index {
            Some(0) => 0,
            Some(index) => index - 1,
            None => self.history.len() - 1,
        };
        self.history_index = Some(index);
        self.input = self.history[index].clone();
    }

    fn history_next(&mut self) {
        let Some(index) = self.history_index else {
            return;
        };
        if index + 1 < self.history.len() {
            self.history_index = Some(index + 1);
            self.input = self.history[index + 1].clone();
        } else {
            self.history_index = None;
            self.input.clear();
        }
    }
}
