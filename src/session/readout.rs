//! Text readouts for the status line and memory usage bar.

use unicode_width::{UnicodeWidthChar, UnicodeWidthStr};

use super::SessionState;

const USAGE_MEDIUM_THRESHOLD: f64 = 0.5;
const USAGE_HIGH_THRESHOLD: f64 = 0.75;
const BAR_FILL: char = '#';

/// Colour band for the usage bar.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UsageLevel {
    #[default]
    Low,
    Medium,
    High,
}

impl UsageLevel {
    pub fn from_fraction(fraction: f64) -> Self {
        if fraction > USAGE_HIGH_THRESHOLD {
            Self::High
        } else if fraction > USAGE_MEDIUM_THRESHOLD {
            Self::Medium
        } else {
            Self::Low
        }
    }
}

/// Rendered memory usage bar, split so the UI can style the pieces.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UsageLine {
    pub prefix: String,
    pub bar: String,
    pub suffix: String,
    pub level: UsageLevel,
}

impl UsageLine {
    pub fn text(&self) -> String {
        format!("{}{}{}", self.prefix, self.bar, self.suffix)
    }
}

fn known(value: Option<u64>) -> String {
    value.map_or_else(|| "?".to_string(), |v| v.to_string())
}

/// Build `"<free>/<size> free (<pct>%) [####    ] (GC #<n> freed <k>)"` for `width` columns.
pub fn usage_line(state: &SessionState, width: usize) -> UsageLine {
    let fraction = state.usage_fraction();
    let percent = fraction
        .map(|f| format!("{}%", (f * 10_000.0).round() / 100.0))
        .unwrap_or_else(|| "?%".to_string());
    let prefix = format!(
        "{}/{} free ({percent}) [",
        known(state.free_cells),
        known(state.workspace_size)
    );
    let suffix = format!(
        "] (GC #{} freed {})",
        known(state.gc_count),
        known(state.last_gc_freed)
    );
    let bar_width = width.saturating_sub(prefix.width() + suffix.width());
    let filled = fraction
        .map(|f| ((bar_width as f64) * f).round() as usize)
        .unwrap_or(0)
        .min(bar_width);
    let mut bar = String::with_capacity(bar_width);
    bar.extend(std::iter::repeat(BAR_FILL).take(filled));
    bar.extend(std::iter::repeat(' ').take(bar_width - filled));
    UsageLine {
        prefix,
        bar,
        suffix,
        level: fraction.map(UsageLevel::from_fraction).unwrap_or_default(),
    }
}

/// Strip escape sequences and line breaks from device-provided status text.
pub fn clean_status_text(raw: &str) -> String {
    let stripped = strip_ansi_escapes::strip_str(raw);
    stripped
        .trim_end_matches(['\r', '\n'])
        .chars()
        .map(|c| if c.is_control() { ' ' } else { c })
        .collect()
}

fn truncate_to_width(text: &str, width: usize) -> &str {
    let mut used = 0usize;
    for (idx, ch) in text.char_indices() {
        let w = ch.width().unwrap_or(0);
        if used + w > width {
            return &text[..idx];
        }
        used += w;
    }
    text
}

/// Left-align `left` and right-align `right` in exactly `width` columns.
///
/// When both don't fit, the right side is kept whole (if it fits at all) and the
/// left side is truncated.
pub fn status_line(left: &str, right: &str, width: usize) -> String {
    let left = clean_status_text(left);
    let right = clean_status_text(right);
    let right = truncate_to_width(&right, width);
    let right_width = right.width();
    let gap = usize::from(!right.is_empty() && !left.is_empty());
    let left = truncate_to_width(&left, width.saturating_sub(right_width + gap));
    let padding = width - right_width - left.width();
    format!("{left}{}{right}", " ".repeat(padding))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state(free: u64, size: u64) -> SessionState {
        SessionState {
            free_cells: Some(free),
            workspace_size: Some(size),
            gc_count: Some(3),
            last_gc_freed: Some(12),
            ..SessionState::default()
        }
    }

    #[test]
    fn usage_line_fills_exact_width() {
        let line = usage_line(&state(250, 1000), 80);
        assert_eq!(line.text().width(), 80);
        assert!(line.prefix.starts_with("250/1000 free (75%) ["));
        assert_eq!(line.suffix, "] (GC #3 freed 12)");
        assert_eq!(line.level, UsageLevel::Medium);
        let filled = line.bar.chars().filter(|c| *c == '#').count();
        assert_eq!(filled, ((line.bar.len() as f64) * 0.75).round() as usize);
    }

    #[test]
    fn usage_line_marks_unknown_values() {
        let line = usage_line(&SessionState::default(), 60);
        assert!(line.prefix.starts_with("?/? free (?%)"));
        assert!(line.bar.chars().all(|c| c == ' '));
        assert_eq!(line.level, UsageLevel::Low);
    }

    #[test]
    fn usage_line_survives_narrow_terminals() {
        let line = usage_line(&state(10, 1000), 5);
        assert!(line.bar.is_empty());
        assert_eq!(line.level, UsageLevel::High);
    }

    #[test]
    fn usage_levels_follow_thresholds() {
        assert_eq!(UsageLevel::from_fraction(0.5), UsageLevel::Low);
        assert_eq!(UsageLevel::from_fraction(0.51), UsageLevel::Medium);
        assert_eq!(UsageLevel::from_fraction(0.75), UsageLevel::Medium);
        assert_eq!(UsageLevel::from_fraction(0.9), UsageLevel::High);
    }

    #[test]
    fn status_line_pads_between_sides() {
        let line = status_line("Ready.", "wifi ok", 20);
        assert_eq!(line, "Ready.       wifi ok");
    }

    #[test]
    fn status_line_truncates_left_first() {
        let line = status_line("Error: something long happened", "net", 12);
        assert_eq!(line, "Error: s net");
        assert_eq!(line.width(), 12);
    }

    #[test]
    fn status_line_strips_escapes_and_newlines() {
        let line = status_line("Ready.\r\n", "\x1b[31mhot\x1b[0m", 10);
        assert_eq!(line, "Ready. hot");
    }

    #[test]
    fn status_line_handles_wide_characters() {
        let line = status_line("状态", "", 3);
        assert_eq!(line, "状 ");
    }
}
