//! Crawl trap detection
//!
//! Flags discovered links whose shape suggests an unbounded URL space:
//! very deep or very long URLs, repeating path cycles, calendar paging and
//! query-parameter explosions. Article date paths such as
//! `/blog/2024/03/15/my-post` are not traps.

use serde::{Deserialize, Serialize};
use std::fmt;
use url::Url;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TrapDetectorConfig {
    /// Maximum path segments
    pub max_path_depth: usize,
    /// Maximum URL length in characters
    pub max_url_length: usize,
    /// Repeats of one segment cycle before a path counts as looping
    pub max_repeated_segments: usize,
    pub max_query_params: usize,
}

impl Default for TrapDetectorConfig {
    fn default() -> Self {
        Self {
            max_path_depth: 15,
            max_url_length: 2048,
            max_repeated_segments: 3,
            max_query_params: 8,
        }
    }
}

/// Why a URL was flagged
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrapKind {
    TooLong,
    TooDeep,
    RepeatingPath,
    Calendar,
    QueryExplosion,
}

impl fmt::Display for TrapKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::TooLong => "url_too_long",
            Self::TooDeep => "path_too_deep",
            Self::RepeatingPath => "repeating_path",
            Self::Calendar => "calendar_trap",
            Self::QueryExplosion => "too_many_query_params",
        })
    }
}

const CALENDAR_SEGMENTS: &[&str] = &["calendar", "events", "event", "agenda", "schedule"];
const CALENDAR_PARAMS: &[&str] = &["date", "day", "month", "year", "week", "cal", "ical"];

pub fn detect_trap(url: &Url, config: &TrapDetectorConfig) -> Option<TrapKind> {
    if url.as_str().len() > config.max_url_length {
        return Some(TrapKind::TooLong);
    }

    let segments: Vec<&str> = url.path().split('/').filter(|s| !s.is_empty()).collect();
    if segments.len() > config.max_path_depth {
        return Some(TrapKind::TooDeep);
    }
    if has_repeating_cycle(&segments, config.max_repeated_segments) {
        return Some(TrapKind::RepeatingPath);
    }
    if is_calendar_path(&segments) || has_calendar_query(url) {
        return Some(TrapKind::Calendar);
    }
    if url.query_pairs().count() > config.max_query_params {
        return Some(TrapKind::QueryExplosion);
    }
    None
}

pub fn is_crawl_trap(url: &Url, config: &TrapDetectorConfig) -> bool {
    detect_trap(url, config).is_some()
}

/// A cycle of `window` segments repeated `max_repeats` times in a row
fn has_repeating_cycle(segments: &[&str], max_repeats: usize) -> bool {
    let max_repeats = max_repeats.max(2);
    for window in 1..=segments.len() / max_repeats {
        for start in 0..=segments.len() - window * max_repeats {
            let cycle = &segments[start..start + window];
            let repeats = segments[start..]
                .chunks(window)
                .take_while(|chunk| *chunk == cycle)
                .count();
            if repeats >= max_repeats {
                return true;
            }
        }
    }
    false
}

/// A calendar segment followed by nothing but numbers, e.g. `/events/2031/07`
fn is_calendar_path(segments: &[&str]) -> bool {
    segments.iter().enumerate().any(|(i, seg)| {
        let rest = &segments[i + 1..];
        CALENDAR_SEGMENTS.contains(&seg.to_ascii_lowercase().as_str())
            && !rest.is_empty()
            && rest.iter().all(|s| s.chars().all(|c| c.is_ascii_digit() || c == '-'))
    })
}

fn has_calendar_query(url: &Url) -> bool {
    url.query_pairs().any(|(key, value)| {
        CALENDAR_PARAMS.contains(&key.to_ascii_lowercase().as_str())
            && !value.is_empty()
            && value.chars().all(|c| c.is_ascii_digit() || c == '-')
    })
}
