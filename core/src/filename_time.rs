//! Filename timestamp parser (§4.B step 5 of the shooting-time chain).
//!
//! The original extractor left this step as commented-out pseudocode; this
//! module implements the patterns it was meant to recognize. Patterns are
//! tried in order against the file's basename and the first that both
//! matches and clears the [`crate::MIN_VALID_TIME`] floor wins.

use once_cell::sync::Lazy;
use regex::Regex;
use time::{Date, Month, OffsetDateTime, PrimitiveDateTime, Time, UtcOffset};

use crate::MIN_VALID_TIME;

static EXIF_STYLE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(\d{4}):(\d{2}):(\d{2}) (\d{2}):(\d{2}):(\d{2})").unwrap());

static RFC3339_MILLIS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(\d{4})-(\d{2})-(\d{2})T(\d{2}):(\d{2}):(\d{2})\.\d{3}([+-]\d{2}:\d{2})")
        .unwrap()
});

static RFC3339: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(\d{4})-(\d{2})-(\d{2})T(\d{2}):(\d{2}):(\d{2})([+-]\d{2}:\d{2})").unwrap()
});

static COMPACT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(\d{4})(\d{2})(\d{2})_(\d{2})(\d{2})(\d{2})").unwrap());

/// Attempts to recover a shooting time from `basename`. Returns the epoch
/// seconds of the first matching, floor-passing pattern, or `None` if no
/// recognized pattern yields a valid timestamp.
pub fn parse_filename_time(basename: &str) -> Option<i64> {
    try_exif_style(basename)
        .or_else(|| try_rfc3339(basename, &RFC3339_MILLIS))
        .or_else(|| try_rfc3339(basename, &RFC3339))
        .or_else(|| try_compact(basename))
}

fn build_date(year: i32, month: u32, day: u32) -> Option<Date> {
    let month = Month::try_from(month as u8).ok()?;
    Date::from_calendar_date(year, month, day as u8).ok()
}

fn valid_floor(epoch: i64) -> Option<i64> {
    if epoch > MIN_VALID_TIME {
        Some(epoch)
    } else {
        None
    }
}

fn try_exif_style(basename: &str) -> Option<i64> {
    let caps = EXIF_STYLE.captures(basename)?;
    let (year, month, day, hour, min, sec) = six_u32(&caps)?;
    let date = build_date(year as i32, month, day)?;
    let time = Time::from_hms(hour as u8, min as u8, sec as u8).ok()?;
    let epoch = PrimitiveDateTime::new(date, time).assume_utc().unix_timestamp();
    valid_floor(epoch)
}

fn try_rfc3339(basename: &str, re: &Regex) -> Option<i64> {
    let caps = re.captures(basename)?;
    let (year, month, day, hour, min, sec) = six_u32(&caps)?;
    let offset_str = caps.get(7)?.as_str();
    let date = build_date(year as i32, month, day)?;
    let time = Time::from_hms(hour as u8, min as u8, sec as u8).ok()?;
    let offset = parse_offset(offset_str)?;
    let epoch = OffsetDateTime::new_in_offset(date, time, offset).unix_timestamp();
    valid_floor(epoch)
}

fn try_compact(basename: &str) -> Option<i64> {
    let caps = COMPACT.captures(basename)?;
    let (year, month, day, hour, min, sec) = six_u32(&caps)?;
    let date = build_date(year as i32, month, day)?;
    let time = Time::from_hms(hour as u8, min as u8, sec as u8).ok()?;
    let epoch = PrimitiveDateTime::new(date, time).assume_utc().unix_timestamp();
    valid_floor(epoch)
}

fn six_u32(caps: &regex::Captures) -> Option<(u32, u32, u32, u32, u32, u32)> {
    let get = |i: usize| caps.get(i)?.as_str().parse::<u32>().ok();
    Some((get(1)?, get(2)?, get(3)?, get(4)?, get(5)?, get(6)?))
}

fn parse_offset(s: &str) -> Option<UtcOffset> {
    let sign = match s.as_bytes().first()? {
        b'+' => 1,
        b'-' => -1,
        _ => return None,
    };
    let hh: i8 = s[1..3].parse().ok()?;
    let mm: i8 = s[4..6].parse().ok()?;
    UtcOffset::from_hms(sign * hh, sign * mm, 0).ok()
}
