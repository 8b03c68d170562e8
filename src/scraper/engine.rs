//! Fixed-point marker removal over a text buffer.

use thiserror::Error;

use super::registry::{Effect, MarkerRegistry};
use crate::session::SessionState;

/// Fatal marker seen in the stream; the session can't continue.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{reason} ({watcher} marker)")]
pub struct FatalMarker {
    pub watcher: &'static str,
    pub reason: String,
}

/// Marker text removed during a scrape. `start` is the byte offset in the buffer as
/// it was when the deletion happened.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Consumption {
    pub watcher: &'static str,
    pub start: usize,
    pub text: String,
}

/// Result of scraping a buffer to a fixed point.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Scrape {
    pub text: String,
    pub state: SessionState,
    pub consumed: Vec<Consumption>,
    pub changed: bool,
}

/// Scrape `buffer` while more bytes may still arrive.
pub fn scrape(
    registry: &MarkerRegistry,
    buffer: &str,
    state: &SessionState,
) -> Result<Scrape, FatalMarker> {
    scrape_with(registry, buffer, state, false)
}

/// Scrape `buffer` knowing nothing more will be appended to it.
pub fn scrape_final(
    registry: &MarkerRegistry,
    buffer: &str,
    state: &SessionState,
) -> Result<Scrape, FatalMarker> {
    scrape_with(registry, buffer, state, true)
}

fn scrape_with(
    registry: &MarkerRegistry,
    buffer: &str,
    state: &SessionState,
    final_text: bool,
) -> Result<Scrape, FatalMarker> {
    let mut text = buffer.to_string();
    let mut state = state.clone();
    let mut consumed = Vec::new();
    let mut changed = false;

    // Each deletion restarts the pass: removing one marker can join text that forms
    // (or moves) another.
    'pass: loop {
        for watcher in registry.watchers() {
            let Some(captures) = watcher.find(&text, final_text) else {
                continue;
            };
            let Some(whole) = captures.get(0) else {
                continue;
            };
            let range = whole.range();
            if range.is_empty() {
                continue;
            }
            match watcher.evaluate(&captures, &state) {
                Effect::Fatal(reason) => {
                    return Err(FatalMarker {
                        watcher: watcher.name(),
                        reason,
                    });
                }
                Effect::Ignore(update) => {
                    if let Some(update) = update {
                        state.apply(&update);
                        changed = true;
                    }
                }
                Effect::Consume(update) => {
                    if let Some(update) = update {
                        state.apply(&update);
                    }
                    consumed.push(Consumption {
                        watcher: watcher.name(),
                        start: range.start,
                        text: whole.as_str().to_string(),
                    });
                    drop(captures);
                    text.replace_range(range, "");
                    changed = true;
                    continue 'pass;
                }
            }
        }
        break;
    }

    Ok(Scrape {
        text,
        state,
        consumed,
        changed,
    })
}
