use crate::domain::models::TimeWindow;
use regex::{Captures, Regex};
use std::sync::OnceLock;

const TIME_TOKEN: &str = r"\b(\d{1,2})(?:[:.](\d{1,2}))?(?:\s*(?:a\.m\.|p\.m\.|am\b|pm\b))?";

fn between_regex() -> &'static Regex {
    static BETWEEN_RE: OnceLock<Regex> = OnceLock::new();
    BETWEEN_RE.get_or_init(|| {
        Regex::new(&format!(r"\bbetween\s+{TIME_TOKEN}\s+and\s+{TIME_TOKEN}"))
            .expect("between-range regex must compile")
    })
}

fn separator_regex() -> &'static Regex {
    static SEPARATOR_RE: OnceLock<Regex> = OnceLock::new();
    SEPARATOR_RE.get_or_init(|| {
        Regex::new(&format!(r"{TIME_TOKEN}\s*(?:-|–|—|\bto\b)\s*{TIME_TOKEN}"))
            .expect("separator-range regex must compile")
    })
}

/// Extracts forbidden time-of-day windows from free-text feedback.
///
/// Two pattern families are matched on the lower-cased text: `between <t1> and <t2>`
/// and `<t1> - <t2>` (also `–`, `—` and `to`). Tokens accept `H`, `HH`, `H:MM`
/// and `H.MM`; `am`/`pm` markers are stripped without shifting the hour, hours
/// clamp to 0..=23 and minutes to 0..=59. Pairs whose end is not after their start
/// are discarded. Results are unique, in discovery order. Never fails: text
/// without a recognizable range yields an empty list, meaning "no constraint".
pub fn extract_time_windows(text: &str) -> Vec<TimeWindow> {
    let lowered = text.to_lowercase();
    let mut windows = Vec::new();

    for regex in [between_regex(), separator_regex()] {
        for captures in regex.captures_iter(&lowered) {
            let Some(whole) = captures.get(0) else {
                continue;
            };
            if is_embedded_in_date(&lowered, whole.start(), whole.end()) {
                continue;
            }
            let Some(window) = window_from_captures(&captures) else {
                continue;
            };
            if !windows.contains(&window) {
                windows.push(window);
            }
        }
    }

    if !windows.is_empty() {
        tracing::debug!(count = windows.len(), "extracted forbidden time windows");
    }
    windows
}

fn window_from_captures(captures: &Captures<'_>) -> Option<TimeWindow> {
    let start = normalize_token(
        captures.get(1)?.as_str(),
        captures.get(2).map(|value| value.as_str()),
    )?;
    let end = normalize_token(
        captures.get(3)?.as_str(),
        captures.get(4).map(|value| value.as_str()),
    )?;
    TimeWindow::new(start, end)
}

fn normalize_token(hour: &str, minute: Option<&str>) -> Option<u16> {
    let hour = hour.parse::<u16>().ok()?.min(23);
    let minute = match minute {
        Some(raw) => raw.parse::<u16>().ok()?.min(59),
        None => 0,
    };
    Some(hour * 60 + minute)
}

// Rejects pieces of dates such as `2026-10-12` or `10/12-14`.
fn is_embedded_in_date(text: &str, start: usize, end: usize) -> bool {
    let before = text[..start].chars().next_back();
    let after = text[end..].chars().next();
    let is_date_char = |value: char| value.is_ascii_digit() || value == '-' || value == '/';
    before.is_some_and(is_date_char) || after.is_some_and(|value| is_date_char(value) || value == ':')
}
