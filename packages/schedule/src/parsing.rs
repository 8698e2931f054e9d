//! Shared value parsing for schedule dialects.
//!
//! Clock times, ISO 8601 durations, and coordinate pairs appear in every
//! dialect in the same textual forms.

use chrono::{NaiveTime, Timelike as _, Weekday};
use transit_equity_geography_models::LatLng;
use transit_equity_schedule_models::{DaysOfWeek, ScheduledTime};

/// Parses a clock time (`HH:MM:SS` or `HH:MM`) into a [`ScheduledTime`].
#[must_use]
pub fn parse_clock_time(s: &str) -> Option<ScheduledTime> {
    let s = s.trim();
    let time = NaiveTime::parse_from_str(s, "%H:%M:%S")
        .or_else(|_| NaiveTime::parse_from_str(s, "%H:%M"))
        .ok()?;
    Some(ScheduledTime::from_seconds(time.num_seconds_from_midnight()))
}

/// Parses an ISO 8601 duration (`PT2M`, `PT1H30M`, `P0DT0H5M30S`,
/// `PT45.5S`) into whole seconds. Year and month designators are rejected
/// because their length in seconds is ambiguous.
#[must_use]
pub fn parse_iso_duration(s: &str) -> Option<u32> {
    let rest = s.trim().strip_prefix('P')?;
    let (date_part, time_part) = match rest.split_once('T') {
        Some((d, t)) => (d, Some(t)),
        None => (rest, None),
    };
    if date_part.is_empty() && time_part.is_none_or(str::is_empty) {
        return None;
    }

    let mut total = 0.0f64;
    total += sum_designators(date_part, &[('D', 86_400.0), ('W', 604_800.0)])?;
    if let Some(t) = time_part {
        if t.is_empty() {
            return None;
        }
        total += sum_designators(t, &[('H', 3600.0), ('M', 60.0), ('S', 1.0)])?;
    }

    if !total.is_finite() || total < 0.0 || total > f64::from(u32::MAX) {
        return None;
    }
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    Some(total.round() as u32)
}

/// Sums `<number><designator>` pairs, rejecting unknown designators.
fn sum_designators(part: &str, units: &[(char, f64)]) -> Option<f64> {
    let mut total = 0.0;
    let mut number = String::new();
    for c in part.chars() {
        if c.is_ascii_digit() || c == '.' {
            number.push(c);
            continue;
        }
        let (_, factor) = units.iter().find(|(d, _)| *d == c)?;
        let value: f64 = number.parse().ok()?;
        total += value * factor;
        number.clear();
    }
    if number.is_empty() { Some(total) } else { None }
}

/// Parses an optional latitude/longitude text pair.
///
/// Returns `Ok(None)` when either side is absent or both are zero (a common
/// placeholder for "unknown"), and `Err` with the offending text when a
/// value is present but unparseable or out of range.
///
/// # Errors
///
/// Returns the raw `"lat,lng"` text when the pair cannot be interpreted.
pub fn parse_lat_lng(lat: Option<&str>, lng: Option<&str>) -> Result<Option<LatLng>, String> {
    let (Some(lat), Some(lng)) = (lat, lng) else {
        return Ok(None);
    };
    let raw = || format!("{lat},{lng}");
    let latitude = lat.trim().parse::<f64>().map_err(|_| raw())?;
    let longitude = lng.trim().parse::<f64>().map_err(|_| raw())?;
    if latitude == 0.0 && longitude == 0.0 {
        return Ok(None);
    }
    LatLng::new(latitude, longitude).map(Some).ok_or_else(raw)
}

/// Maps a weekday or weekday-group name to the days it covers.
///
/// Accepts the TransXChange element names (`Monday`, `MondayToFriday`,
/// `NotSaturday`, ...) and the NeTEx `DaysOfWeek` tokens (`Weekdays`,
/// `Everyday`, ...).
#[must_use]
pub fn day_set(name: &str) -> Option<DaysOfWeek> {
    let days = match name {
        "Monday" => DaysOfWeek::only(Weekday::Mon),
        "Tuesday" => DaysOfWeek::only(Weekday::Tue),
        "Wednesday" => DaysOfWeek::only(Weekday::Wed),
        "Thursday" => DaysOfWeek::only(Weekday::Thu),
        "Friday" => DaysOfWeek::only(Weekday::Fri),
        "Saturday" => DaysOfWeek::only(Weekday::Sat),
        "Sunday" => DaysOfWeek::only(Weekday::Sun),
        "MondayToFriday" | "Weekdays" => DaysOfWeek::WEEKDAYS,
        "MondayToSaturday" => DaysOfWeek::WEEKDAYS.with(Weekday::Sat),
        "MondayToSunday" | "Everyday" => DaysOfWeek::EVERY_DAY,
        "Weekend" => DaysOfWeek::WEEKEND,
        "NotSaturday" => DaysOfWeek::EVERY_DAY.without(Weekday::Sat),
        _ => return None,
    };
    Some(days)
}
