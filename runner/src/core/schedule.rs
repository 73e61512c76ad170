//! Hour-range windows ("9-12,14-18", "22-2") and the mode they select.

use thiserror::Error;
use tracing::warn;

use crate::core::types::ScheduleMode;

/// Half-open hour range `[start, end)` with `start` in 0..24 and `end` in 0..=24.
/// Wraps past midnight when `start > end`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HourRange {
    pub start: u32,
    pub end: u32,
}

impl HourRange {
    pub fn contains(self, hour: u32) -> bool {
        if self.start <= self.end {
            self.start <= hour && hour < self.end
        } else {
            hour >= self.start || hour < self.end
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ScheduleError {
    #[error("malformed hour range `{part}` in `{input}`")]
    MalformedRange { input: String, part: String },
    #[error("hour {hour} out of range 0-24 in `{input}`")]
    HourOutOfRange { input: String, hour: u32 },
    #[error("zero-width hour range `{part}` in `{input}`")]
    ZeroWidth { input: String, part: String },
}

/// Parse a comma-separated list of `start-end` ranges. Empty input is no ranges.
pub fn parse_ranges(input: &str) -> Result<Vec<HourRange>, ScheduleError> {
    let mut ranges = Vec::new();
    for part in input.split(',').map(str::trim).filter(|p| !p.is_empty()) {
        let malformed = || ScheduleError::MalformedRange {
            input: input.to_string(),
            part: part.to_string(),
        };
        let (start, end) = part.split_once('-').ok_or_else(malformed)?;
        let start: u32 = start.trim().parse().map_err(|_| malformed())?;
        let end: u32 = end.trim().parse().map_err(|_| malformed())?;
        if start > 23 || end > 24 {
            return Err(ScheduleError::HourOutOfRange {
                input: input.to_string(),
                hour: start.max(end),
            });
        }
        if start == end {
            return Err(ScheduleError::ZeroWidth {
                input: input.to_string(),
                part: part.to_string(),
            });
        }
        ranges.push(HourRange { start, end });
    }
    Ok(ranges)
}

/// Like [`parse_ranges`], but a malformed string degrades to "no ranges".
pub fn parse_ranges_lenient(input: &str) -> Vec<HourRange> {
    parse_ranges(input).unwrap_or_else(|err| {
        warn!(error = %err, "ignoring schedule window");
        Vec::new()
    })
}

/// Which windows `hour` falls in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct WindowState {
    pub in_deep: bool,
    pub in_work: bool,
}

impl WindowState {
    /// Deep wins over Work; neither is Normal.
    pub fn mode(self) -> ScheduleMode {
        if self.in_deep {
            ScheduleMode::Deep
        } else if self.in_work {
            ScheduleMode::Work
        } else {
            ScheduleMode::Normal
        }
    }
}

pub fn evaluate(deep: &[HourRange], work: &[HourRange], hour: u32) -> WindowState {
    let in_deep = deep.iter().any(|range| range.contains(hour));
    WindowState {
        in_deep,
        in_work: !in_deep && work.iter().any(|range| range.contains(hour)),
    }
}
