//! SMIL clock values.
//!
//! DAISY 2.02 SMIL files express clip positions as Normal Play Time
//! (`npt=12.345s`), and the NCC/SMIL heads carry elapsed times as
//! `hh:mm:ss` clock values. Parsing is exact: decimal digits are converted to
//! nanoseconds without going through floating point, so adjacent clips that
//! touch in the source still touch after parsing.

use std::time::Duration;

use crate::error::{Error, Result};

/// Parse a clip value such as `npt=12.345s`, `12.345s`, `12.345`,
/// `npt=1:02:03.5` or `02:03.5`.
pub fn parse_clock_value(value: &str) -> Result<Duration> {
    let raw = value.trim();
    let body = raw.strip_prefix("npt=").unwrap_or(raw).trim();

    if body.contains(':') {
        return parse_colon_clock(body).ok_or_else(|| malformed(value));
    }

    let (number, scale) = if let Some(n) = body.strip_suffix("ms") {
        (n, 1_000_000u128)
    } else if let Some(n) = body.strip_suffix('s') {
        (n, 1_000_000_000u128)
    } else {
        (body, 1_000_000_000u128)
    };

    let nanos = parse_decimal_nanos(number.trim(), scale).ok_or_else(|| malformed(value))?;
    Ok(nanos_to_duration(nanos))
}

fn malformed(value: &str) -> Error {
    Error::format(format!("malformed clock value: {value:?}"))
}

/// `[[h:]m:]s[.fff]`
fn parse_colon_clock(body: &str) -> Option<Duration> {
    let parts: Vec<&str> = body.split(':').collect();
    if parts.len() > 3 {
        return None;
    }
    let (last, leading) = parts.split_last()?;
    let mut nanos = parse_decimal_nanos(last, 1_000_000_000)?;
    let mut unit: u128 = 60;
    for part in leading.iter().rev() {
        if part.is_empty() || !part.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        let whole: u128 = part.parse().ok()?;
        nanos += whole * unit * 1_000_000_000;
        unit *= 60;
    }
    Some(nanos_to_duration(nanos))
}

/// Parse an unsigned decimal number into nanoseconds, where one unit of the
/// number is `scale` nanoseconds. Digits beyond nanosecond precision are
/// truncated.
fn parse_decimal_nanos(number: &str, scale: u128) -> Option<u128> {
    let (whole, frac) = number.split_once('.').unwrap_or((number, ""));
    if whole.is_empty() && frac.is_empty() {
        return None;
    }
    if !whole.bytes().all(|b| b.is_ascii_digit()) || !frac.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let whole: u128 = if whole.is_empty() { 0 } else { whole.parse().ok()? };
    let mut nanos = whole.checked_mul(scale)?;

    let mut place = scale;
    for digit in frac.bytes() {
        place /= 10;
        if place == 0 {
            break;
        }
        nanos += u128::from(digit - b'0') * place;
    }
    Some(nanos)
}

fn nanos_to_duration(nanos: u128) -> Duration {
    Duration::new(
        (nanos / 1_000_000_000) as u64,
        (nanos % 1_000_000_000) as u32,
    )
}

/// Milliseconds rounded to nearest.
fn rounded_millis(d: Duration) -> u128 {
    (d.as_nanos() + 500_000) / 1_000_000
}

/// `12.345s`, as used by `<seq dur>`.
pub fn format_seconds(d: Duration) -> String {
    let ms = rounded_millis(d);
    format!("{}.{:03}s", ms / 1000, ms % 1000)
}

/// `npt=12.345s`, as used by `clip-begin` / `clip-end`.
pub fn format_npt(d: Duration) -> String {
    format!("npt={}", format_seconds(d))
}

/// `hh:mm:ss`, as used by `ncc:totalTime`.
pub fn format_hms(d: Duration) -> String {
    let secs = (rounded_millis(d) + 500) / 1000;
    format!("{:02}:{:02}:{:02}", secs / 3600, (secs / 60) % 60, secs % 60)
}

/// `hh:mm:ss.fff`, as used by `ncc:totalElapsedTime` / `ncc:timeInThisSmil`.
pub fn format_hms_millis(d: Duration) -> String {
    let ms = rounded_millis(d);
    let secs = ms / 1000;
    format!(
        "{:02}:{:02}:{:02}.{:03}",
        secs / 3600,
        (secs / 60) % 60,
        secs % 60,
        ms % 1000
    )
}
