//! Protocol scraping: watchers that recognize device markers, strip them from the
//! output stream, and turn them into session state.
//!
//! Device output mixes echoed text with markers such as `{GC#3:12,450/9044}` or
//! `[Ready.]`. [`scrape`] removes recognized markers from a buffer until no watcher
//! matches; [`StreamScraper`] runs the same pass over bytes that arrive in pieces.

mod engine;
mod registry;
mod stream;


pub use engine::{scrape, scrape_final, Consumption, FatalMarker, Scrape};
pub use registry::{
    Effect, EffectFn, MarkerRegistry, Tail, Watcher, BOOTLOADER_REASON, PROMPT_PATTERN,
};
pub use stream::{ScrapeReport, StreamScraper, MAX_PENDING_BYTES};
