//! Parse free-text "resets at <time>" signals into absolute instants.
//!
//! Recognized shapes, tried in this order:
//!
//! - `in 3h`, `in 2 hours 30 min`, `in 45 minutes`
//! - `tomorrow at 9am`
//! - `Feb 5 at 10am` (this year, or next year once passed)
//! - `10am`, `4:30pm` (today if still ahead, else tomorrow)
//!
//! Wall-clock shapes are evaluated in the zone named in parentheses
//! (`resets 10am (Europe/Paris)`), falling back to the configured zone.

use std::sync::LazyLock;

use chrono::{DateTime, Datelike, Duration, NaiveDate, NaiveTime, TimeZone, Utc};
use chrono_tz::Tz;
use regex::Regex;

static ZONE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\(\s*([A-Za-z_]+(?:/[A-Za-z0-9_+\-]+)+|UTC|GMT)\s*\)").unwrap()
});

static IN_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\bin\s+(?:(\d+)\s*(?:h|hr|hrs|hours?)\b)?\s*(?:(\d+)\s*(?:m|min|mins|minutes?)\b)?",
    )
    .unwrap()
});

static TOMORROW_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\btomorrow\s+(?:at\s+)?(\d{1,2})(?::(\d{2}))?\s*(am|pm)\b").unwrap()
});

static MONTH_DAY_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\b(jan|feb|mar|apr|may|jun|jul|aug|sep|oct|nov|dec)[a-z]*\.?\s+(\d{1,2})(?:st|nd|rd|th)?,?\s+(?:at\s+)?(\d{1,2})(?::(\d{2}))?\s*(am|pm)\b",
    )
    .unwrap()
});

static BARE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\b(\d{1,2})(?::(\d{2}))?\s*(am|pm)\b").unwrap());

const MONTHS: [&str; 12] = [
    "jan", "feb", "mar", "apr", "may", "jun", "jul", "aug", "sep", "oct", "nov", "dec",
];

/// A parsed reset signal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResetTime {
    /// Absolute instant, or `None` when the text was not understood.
    pub at: Option<DateTime<Utc>>,
    /// Human string: the formatted local time, or the original text verbatim.
    pub display: String,
    /// Zone the wall-clock shapes were evaluated in.
    pub zone: Tz,
    /// False when the text named a zone that is not a known IANA name.
    pub zone_recognized: bool,
}

/// Parse `text` relative to `now`. Never fails; unknown input yields `at: None`.
pub fn parse_reset_time(text: &str, now: DateTime<Utc>, fallback_zone: Tz) -> ResetTime {
    let (zone, zone_recognized) = match ZONE_RE.captures(text) {
        Some(caps) => match caps[1].parse::<Tz>() {
            Ok(zone) => (zone, true),
            Err(_) => (fallback_zone, false),
        },
        None => (fallback_zone, true),
    };

    let at = parse_relative(text, now)
        .or_else(|| parse_tomorrow(text, now, zone))
        .or_else(|| parse_month_day(text, now, zone))
        .or_else(|| parse_bare(text, now, zone));

    let display = match at {
        Some(at) => format!(
            "{} ({})",
            at.with_timezone(&zone).format("%a %b %-d %H:%M"),
            zone.name()
        ),
        None => text.trim().to_string(),
    };

    ResetTime {
        at,
        display,
        zone,
        zone_recognized,
    }
}

fn parse_relative(text: &str, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
    IN_RE.captures_iter(text).find_map(|caps| {
        let hours = caps.get(1).map(|m| m.as_str().parse::<i64>()).transpose().ok()?;
        let minutes = caps.get(2).map(|m| m.as_str().parse::<i64>()).transpose().ok()?;
        if hours.is_none() && minutes.is_none() {
            return None;
        }
        let offset = Duration::try_hours(hours.unwrap_or(0))?
            .checked_add(&Duration::try_minutes(minutes.unwrap_or(0))?)?;
        now.checked_add_signed(offset)
    })
}

fn parse_tomorrow(text: &str, now: DateTime<Utc>, zone: Tz) -> Option<DateTime<Utc>> {
    let caps = TOMORROW_RE.captures(text)?;
    let time = clock_time(&caps[1], caps.get(2).map(|m| m.as_str()), &caps[3])?;
    let today = now.with_timezone(&zone).date_naive();
    localize(zone, today.succ_opt()?, time)
}

fn parse_month_day(text: &str, now: DateTime<Utc>, zone: Tz) -> Option<DateTime<Utc>> {
    let caps = MONTH_DAY_RE.captures(text)?;
    let month_key = caps[1].to_ascii_lowercase();
    let month = MONTHS.iter().position(|m| *m == month_key)? as u32 + 1;
    let day: u32 = caps[2].parse().ok()?;
    let time = clock_time(&caps[3], caps.get(4).map(|m| m.as_str()), &caps[5])?;

    let year = now.with_timezone(&zone).year();
    let this_year = NaiveDate::from_ymd_opt(year, month, day).and_then(|d| localize(zone, d, time));
    match this_year {
        Some(at) if at > now => Some(at),
        _ => NaiveDate::from_ymd_opt(year + 1, month, day).and_then(|d| localize(zone, d, time)),
    }
}

fn parse_bare(text: &str, now: DateTime<Utc>, zone: Tz) -> Option<DateTime<Utc>> {
    let caps = BARE_RE.captures(text)?;
    let time = clock_time(&caps[1], caps.get(2).map(|m| m.as_str()), &caps[3])?;
    let today = now.with_timezone(&zone).date_naive();
    match localize(zone, today, time) {
        Some(at) if at > now => Some(at),
        _ => localize(zone, today.succ_opt()?, time),
    }
}

/// 12-hour clock to `NaiveTime`. `12am` is midnight, `12pm` is noon.
fn clock_time(hour: &str, minute: Option<&str>, meridiem: &str) -> Option<NaiveTime> {
    let hour: u32 = hour.parse().ok()?;
    let minute: u32 = minute.map(str::parse).transpose().ok()?.unwrap_or(0);
    if !(1..=12).contains(&hour) {
        return None;
    }
    let hour = match (meridiem.to_ascii_lowercase().as_str(), hour) {
        ("am", 12) => 0,
        ("am", h) => h,
        ("pm", 12) => 12,
        (_, h) => h + 12,
    };
    NaiveTime::from_hms_opt(hour, minute, 0)
}

/// Resolve a local wall-clock time to an instant. Times inside a DST gap move forward an hour.
fn localize(zone: Tz, date: NaiveDate, time: NaiveTime) -> Option<DateTime<Utc>> {
    let naive = date.and_time(time);
    zone.from_local_datetime(&naive)
        .earliest()
        .or_else(|| {
            zone.from_local_datetime(&(naive + Duration::hours(1)))
                .earliest()
        })
        .map(|local| local.with_timezone(&Utc))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono_tz::Europe::Paris;
    use chrono_tz::UTC;

    fn paris(y: i32, mo: u32, d: u32, h: u32, mi: u32) -> DateTime<Utc> {
        Paris
            .with_ymd_and_hms(y, mo, d, h, mi, 0)
            .single()
            .expect("valid paris time")
            .with_timezone(&Utc)
    }

    #[test]
    fn bare_hour_later_today() {
        let parsed = parse_reset_time("resets 10am (Europe/Paris)", paris(2026, 2, 4, 8, 0), UTC);
        assert_eq!(parsed.at, Some(paris(2026, 2, 4, 10, 0)));
        assert_eq!(parsed.display, "Wed Feb 4 10:00 (Europe/Paris)");
        assert!(parsed.zone_recognized);
    }

    #[test]
    fn bare_hour_already_passed_rolls_to_tomorrow() {
        let parsed = parse_reset_time("resets 10am (Europe/Paris)", paris(2026, 2, 4, 15, 0), UTC);
        assert_eq!(parsed.at, Some(paris(2026, 2, 5, 10, 0)));
    }

    #[test]
    fn bare_hour_with_minutes_and_noon_midnight() {
        let now = paris(2026, 2, 4, 8, 0);
        let half = parse_reset_time("back at 4:30pm", now, Paris);
        assert_eq!(half.at, Some(paris(2026, 2, 4, 16, 30)));
        let noon = parse_reset_time("12pm", now, Paris);
        assert_eq!(noon.at, Some(paris(2026, 2, 4, 12, 0)));
        let midnight = parse_reset_time("12am", now, Paris);
        assert_eq!(midnight.at, Some(paris(2026, 2, 5, 0, 0)));
    }

    #[test]
    fn tomorrow_at_hour() {
        let parsed = parse_reset_time(
            "limit resets tomorrow at 9am (Europe/Paris)",
            paris(2026, 2, 4, 8, 0),
            UTC,
        );
        assert_eq!(parsed.at, Some(paris(2026, 2, 5, 9, 0)));
    }

    #[test]
    fn month_day_this_year_or_next() {
        let now = paris(2026, 2, 4, 8, 0);
        let ahead = parse_reset_time("resets Feb 10 at 3pm (Europe/Paris)", now, UTC);
        assert_eq!(ahead.at, Some(paris(2026, 2, 10, 15, 0)));

        let passed = parse_reset_time("resets January 3rd, 3pm (Europe/Paris)", now, UTC);
        assert_eq!(passed.at, Some(paris(2027, 1, 3, 15, 0)));
    }

    #[test]
    fn relative_hours_and_minutes() {
        let now = paris(2026, 2, 4, 8, 0);
        let parsed = parse_reset_time("try again in 2h", now, UTC);
        assert_eq!(parsed.at, Some(now + Duration::hours(2)));

        let mixed = parse_reset_time("in 1 hour 30 min", now, UTC);
        assert_eq!(mixed.at, Some(now + Duration::minutes(90)));

        let minutes = parse_reset_time("in 45 minutes", now, UTC);
        assert_eq!(minutes.at, Some(now + Duration::minutes(45)));
    }

    #[test]
    fn unknown_zone_uses_fallback() {
        let now = paris(2026, 2, 4, 8, 0);
        let parsed = parse_reset_time("resets 10am (Mars/Olympus)", now, Paris);
        assert!(!parsed.zone_recognized);
        assert_eq!(parsed.zone, Paris);
        assert_eq!(parsed.at, Some(paris(2026, 2, 4, 10, 0)));
    }

    #[test]
    fn unparseable_text_is_preserved() {
        let parsed = parse_reset_time("  resets whenever  ", Utc::now(), UTC);
        assert_eq!(parsed.at, None);
        assert_eq!(parsed.display, "resets whenever");
    }

    #[test]
    fn invalid_clock_values_are_rejected() {
        let parsed = parse_reset_time("resets 13pm", Utc::now(), UTC);
        assert_eq!(parsed.at, None);
    }

    #[test]
    fn dst_gap_moves_forward() {
        // 2026-03-29 02:30 does not exist in Paris.
        let now = paris(2026, 3, 28, 12, 0);
        let parsed = parse_reset_time("resets Mar 29 at 2:30am (Europe/Paris)", now, UTC);
        assert_eq!(parsed.at, Some(paris(2026, 3, 29, 3, 30)));
    }
}
