//! Incremental scraping over bytes that arrive in arbitrary chunks.

use std::mem;

use super::engine::{scrape, scrape_final, Consumption, FatalMarker, Scrape};
use super::registry::{MarkerRegistry, Watcher};
use crate::session::{normalize_newlines, SessionState};

/// Longest tail held back while waiting for a marker to complete.
pub const MAX_PENDING_BYTES: usize = 512;

/// Outcome of one feed: text ready for the output pane plus the new state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScrapeReport {
    pub display: String,
    pub state: SessionState,
    pub consumed: Vec<Consumption>,
    pub changed: bool,
}

/// Raw buffer plus the registry applied to it.
///
/// Text that could still turn into a marker stays in the buffer between feeds;
/// everything else is handed back as display text exactly once.
#[derive(Debug, Clone)]
pub struct StreamScraper {
    registry: MarkerRegistry,
    pending: String,
}

impl StreamScraper {
    pub fn new(registry: MarkerRegistry) -> Self {
        Self {
            registry,
            pending: String::new(),
        }
    }

    pub fn registry(&self) -> &MarkerRegistry {
        &self.registry
    }

    /// Text received but not yet released to the display.
    pub fn pending(&self) -> &str {
        &self.pending
    }

    pub fn has_pending(&self) -> bool {
        !self.pending.is_empty()
    }

    /// Append `chunk` and scrape the buffer to a fixed point.
    pub fn feed(&mut self, chunk: &str, state: &SessionState) -> Result<ScrapeReport, FatalMarker> {
        self.pending.push_str(chunk);
        if self.pending.contains("\r\n") {
            self.pending = normalize_newlines(&self.pending);
        }
        let scraped = scrape(&self.registry, &self.pending, state)?;
        let split = holdback_start(&self.registry, &scraped.text);
        Ok(self.release(scraped, split))
    }

    /// Treat the buffer as complete: resolve deferred markers and release the held tail.
    pub fn flush(&mut self, state: &SessionState) -> Result<ScrapeReport, FatalMarker> {
        let scraped = scrape_final(&self.registry, &self.pending, state)?;
        let split = scraped.text.len();
        Ok(self.release(scraped, split))
    }

    fn release(&mut self, scraped: Scrape, split: usize) -> ScrapeReport {
        let Scrape {
            mut text,
            state,
            consumed,
            changed,
        } = scraped;
        self.pending = text.split_off(split);
        ScrapeReport {
            display: mem::take(&mut text),
            state,
            consumed,
            changed,
        }
    }
}

fn could_grow(watcher: &Watcher, rest: &str) -> bool {
    let lead = watcher.lead();
    if rest.len() < lead.len() {
        return lead.starts_with(rest);
    }
    rest.starts_with(lead) && !watcher.settled(rest)
}

/// Byte offset where the undecided tail of `text` begins (`text.len()` if none).
///
/// Only the last, unterminated line is considered; every marker either ends
/// before a newline or with one.
fn holdback_start(registry: &MarkerRegistry, text: &str) -> usize {
    let line_start = text.rfind('\n').map_or(0, |idx| idx + 1);
    let tail = &text[line_start..];
    for (offset, _) in tail.char_indices() {
        let rest = &tail[offset..];
        if rest.len() > MAX_PENDING_BYTES {
            continue;
        }
        if rest == "\r" || registry.watchers().iter().any(|w| could_grow(w, rest)) {
            return line_start + offset;
        }
    }
    text.len()
}
