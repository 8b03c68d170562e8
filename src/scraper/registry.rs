//! Marker watchers and their effects.

use anyhow::{Context, Result};
use regex::{Captures, Regex};
use std::fmt;

use crate::session::{SessionState, StateUpdate};

/// Prompt printed by the device when it is ready for a line: `<free-cells>> `.
pub const PROMPT_PATTERN: &str = r"(\d+)> ";

pub const BOOTLOADER_REASON: &str = "Device is in bootloader mode";

/// What a watcher wants done with the text it matched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    /// Delete the matched text, applying the update if one is given.
    Consume(Option<StateUpdate>),
    /// Leave the text in place, applying the update if one is given.
    Ignore(Option<StateUpdate>),
    /// Abort the session.
    Fatal(String),
}

/// Pure effect: reads the captures and current state, never mutates anything.
pub type EffectFn = fn(&Captures<'_>, &SessionState) -> Effect;

/// How long a match stays provisional while more bytes may still arrive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tail {
    /// Acted on as soon as it matches.
    Closed,
    /// Provisional while the match reaches the end of the buffer.
    AtEnd,
    /// Provisional until the line holding the match is terminated.
    ToLineEnd,
}

/// One pattern and the effect applied to its first match.
#[derive(Clone)]
pub struct Watcher {
    name: &'static str,
    pattern: Regex,
    lead: &'static str,
    tail: Tail,
    effect: EffectFn,
}

impl fmt::Debug for Watcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Watcher")
            .field("name", &self.name)
            .field("pattern", &self.pattern.as_str())
            .field("tail", &self.tail)
            .finish()
    }
}

impl Watcher {
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Literal text every match of this watcher starts with.
    pub fn lead(&self) -> &'static str {
        self.lead
    }

    pub fn tail(&self) -> Tail {
        self.tail
    }

    pub fn pattern(&self) -> &Regex {
        &self.pattern
    }

    pub(crate) fn evaluate(&self, captures: &Captures<'_>, state: &SessionState) -> Effect {
        (self.effect)(captures, state)
    }

    fn may_grow(&self, found: &regex::Match<'_>, text: &str) -> bool {
        if found.as_str().ends_with('\n') {
            return false;
        }
        match self.tail {
            Tail::Closed => false,
            Tail::AtEnd => found.end() == text.len(),
            Tail::ToLineEnd => !text[found.end()..].contains('\n'),
        }
    }

    /// First match in `text` that is safe to act on. With `final_text` set, no more
    /// bytes are expected and open-tail matches at the end are accepted.
    pub(crate) fn find<'t>(&self, text: &'t str, final_text: bool) -> Option<Captures<'t>> {
        let captures = self.pattern.captures(text)?;
        let whole = captures.get(0)?;
        if !final_text && self.may_grow(&whole, text) {
            return None;
        }
        Some(captures)
    }

    /// True once `rest` (text starting at a candidate marker) can no longer change
    /// what this watcher would do with it.
    pub(crate) fn settled(&self, rest: &str) -> bool {
        match self.pattern.find(rest) {
            Some(found) if found.start() == 0 => !self.may_grow(&found, rest),
            _ => false,
        }
    }
}

/// Ordered set of watchers. Earlier registrations win overlapping matches.
#[derive(Debug, Clone, Default)]
pub struct MarkerRegistry {
    watchers: Vec<Watcher>,
}

impl MarkerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a watcher. Patterns are compiled multiline so `^`/`$` work per line.
    pub fn register(
        &mut self,
        name: &'static str,
        pattern: &str,
        lead: &'static str,
        effect: EffectFn,
    ) -> Result<&mut Self> {
        self.push(name, pattern, lead, Tail::Closed, effect)
    }

    /// Like [`register`](Self::register) for patterns whose match can keep growing
    /// while bytes arrive (optional or open-ended tails).
    pub fn register_deferred(
        &mut self,
        name: &'static str,
        pattern: &str,
        lead: &'static str,
        tail: Tail,
        effect: EffectFn,
    ) -> Result<&mut Self> {
        self.push(name, pattern, lead, tail, effect)
    }

    fn push(
        &mut self,
        name: &'static str,
        pattern: &str,
        lead: &'static str,
        tail: Tail,
        effect: EffectFn,
    ) -> Result<&mut Self> {
        let pattern = Regex::new(&format!("(?m){pattern}"))
            .with_context(|| format!("invalid marker pattern for {name}: {pattern}"))?;
        self.watchers.push(Watcher {
            name,
            pattern,
            lead,
            tail,
            effect,
        });
        Ok(self)
    }

    /// Watchers for the uLisp serial protocol.
    pub fn standard() -> Self {
        let mut registry = Self::new();
        registry
            .register("gc", r"\{GC#(\d+):(\d+),(\d+)/(\d+)\}", "{GC#", gc_effect)
            .and_then(|r| r.register("ready", r"\[Ready\.\]\r?\n", "[Ready.]", ready_effect))
            .and_then(|r| {
                r.register_deferred(
                    "right_status",
                    r"\$!rs=(.*)!\$(?:\r?\n)?",
                    "$!rs=",
                    Tail::ToLineEnd,
                    right_status_effect,
                )
            })
            .and_then(|r| {
                r.register(
                    "bootloader",
                    r"waiting for download",
                    "waiting for download",
                    bootloader_effect,
                )
            })
            .and_then(|r| r.register("error", r"Error: ([^\r\n]+)\r?\n", "Error: ", error_effect))
            .and_then(|r| {
                r.register_deferred(
                    "version",
                    r"uLisp ([\d.a-z]+)",
                    "uLisp ",
                    Tail::AtEnd,
                    version_effect,
                )
            })
            .expect("built-in marker patterns should compile");
        registry
    }

    pub fn watchers(&self) -> &[Watcher] {
        &self.watchers
    }

    pub fn is_empty(&self) -> bool {
        self.watchers.is_empty()
    }

    /// Reason for the first fatal marker found in `text`, if any.
    pub fn fatal_in(&self, text: &str, state: &SessionState) -> Option<(&'static str, String)> {
        self.watchers.iter().find_map(|watcher| {
            let captures = watcher.pattern.captures(text)?;
            match watcher.evaluate(&captures, state) {
                Effect::Fatal(reason) => Some((watcher.name, reason)),
                _ => None,
            }
        })
    }
}

fn capture_u64(captures: &Captures<'_>, index: usize) -> Option<u64> {
    captures.get(index)?.as_str().parse().ok()
}

fn capture_text(captures: &Captures<'_>, index: usize) -> String {
    captures
        .get(index)
        .map(|m| m.as_str().to_string())
        .unwrap_or_default()
}

fn memory_update(captures: &Captures<'_>) -> Option<StateUpdate> {
    Some(StateUpdate::Memory {
        gc_count: capture_u64(captures, 1)?,
        last_gc_freed: capture_u64(captures, 2)?,
        free_cells: capture_u64(captures, 3)?,
        workspace_size: capture_u64(captures, 4)?,
    })
}

fn gc_effect(captures: &Captures<'_>, _state: &SessionState) -> Effect {
    match memory_update(captures) {
        Some(StateUpdate::Memory {
            free_cells,
            workspace_size,
            ..
        }) if free_cells > workspace_size => Effect::Consume(None),
        other => Effect::Consume(other),
    }
}

fn ready_effect(_captures: &Captures<'_>, state: &SessionState) -> Effect {
    if state.status_is_error() {
        Effect::Consume(None)
    } else {
        Effect::Consume(Some(StateUpdate::Status("Ready.".to_string())))
    }
}

fn right_status_effect(captures: &Captures<'_>, _state: &SessionState) -> Effect {
    Effect::Consume(Some(StateUpdate::RightStatus(capture_text(captures, 1))))
}

fn bootloader_effect(_captures: &Captures<'_>, _state: &SessionState) -> Effect {
    Effect::Fatal(BOOTLOADER_REASON.to_string())
}

fn error_effect(captures: &Captures<'_>, _state: &SessionState) -> Effect {
    Effect::Consume(Some(StateUpdate::Status(format!(
        "Error: {}",
        capture_text(captures, 1)
    ))))
}

fn version_effect(captures: &Captures<'_>, state: &SessionState) -> Effect {
    let version = capture_text(captures, 1);
    if state.device_version.as_deref() == Some(version.as_str()) {
        Effect::Ignore(None)
    } else {
        Effect::Ignore(Some(StateUpdate::DeviceVersion(version)))
    }
}
