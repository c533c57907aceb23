//! Scheduling and time parsing utilities
//!
//! Parses human-readable schedule strings and clock times, and resolves a
//! platform's best times against a calendar day.

use crate::{DeckError, Result};
use chrono::{DateTime, Duration, FixedOffset, NaiveDate, NaiveTime, TimeZone, Timelike, Utc};
use rand::Rng;

const MIN_RANDOM_SECONDS: i64 = 30;
const MAX_RANDOM_SECONDS: i64 = 30 * 24 * 3600; // 30 days

/// Parse a schedule string into a DateTime
///
/// Supports multiple formats:
/// - RFC 3339 timestamps: "2026-11-20T15:00:00Z"
/// - Relative durations: "1h", "30m", "2d"
/// - Natural language: "tomorrow", "next monday 10am"
/// - Random intervals: "random:10m-20m", "random:1h-2h"
///
/// # Errors
///
/// Returns an error if the time format is invalid or cannot be parsed.
pub fn parse_schedule(input: &str, last_scheduled: Option<DateTime<Utc>>) -> Result<DateTime<Utc>> {
    let input = input.trim();
    if input.is_empty() {
        return Err(DeckError::InvalidInput(
            "Schedule string cannot be empty".to_string(),
        ));
    }

    if let Some(range) = input.strip_prefix("random:") {
        return parse_random_schedule(range, last_scheduled);
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(input) {
        return Ok(dt.with_timezone(&Utc));
    }

    if let Ok(duration) = parse_duration(input.trim_start_matches('+')) {
        return Ok(Utc::now() + duration);
    }

    chrono_english::parse_date_string(input, Utc::now(), chrono_english::Dialect::Us).map_err(|e| {
        DeckError::InvalidInput(format!("Could not parse schedule string '{}': {}", input, e))
    })
}

/// Parse a campaign date
///
/// A bare "YYYY-MM-DD" means local midnight in `offset`; anything else is
/// read like a schedule string.
pub fn parse_date(input: &str, offset: FixedOffset) -> Result<DateTime<Utc>> {
    if let Ok(day) = NaiveDate::parse_from_str(input.trim(), "%Y-%m-%d") {
        return at_local_time(day, NaiveTime::MIN, offset)
            .ok_or_else(|| DeckError::InvalidInput(format!("Invalid date '{}'", input)));
    }
    parse_schedule(input, None)
}

/// Parse a clock time such as "09:00" or "17:30"
pub fn parse_best_time(input: &str) -> Result<NaiveTime> {
    NaiveTime::parse_from_str(input.trim(), "%H:%M")
        .or_else(|_| NaiveTime::parse_from_str(input.trim(), "%H:%M:%S"))
        .map_err(|_| {
            DeckError::InvalidInput(format!(
                "Invalid clock time '{}'. Expected HH:MM (24-hour)",
                input
            ))
        })
}

/// Parse a UTC offset such as "+02:00", "-05:30" or "Z"
pub fn parse_utc_offset(input: &str) -> Result<FixedOffset> {
    let input = input.trim();
    if input.eq_ignore_ascii_case("z") || input.eq_ignore_ascii_case("utc") {
        return FixedOffset::east_opt(0)
            .ok_or_else(|| DeckError::InvalidInput("Invalid UTC offset".to_string()));
    }

    let invalid = || {
        DeckError::InvalidInput(format!(
            "Invalid UTC offset '{}'. Expected +HH:MM or -HH:MM",
            input
        ))
    };

    let (sign, rest) = if let Some(rest) = input.strip_prefix('+') {
        (1, rest)
    } else if let Some(rest) = input.strip_prefix('-') {
        (-1, rest)
    } else {
        return Err(invalid());
    };

    let time = NaiveTime::parse_from_str(rest, "%H:%M").map_err(|_| invalid())?;
    let seconds = sign * (time.hour() * 3600 + time.minute() * 60) as i32;

    FixedOffset::east_opt(seconds)
        .ok_or_else(|| DeckError::InvalidInput(format!("UTC offset out of range: {}", input)))
}

/// Resolve a clock time on a given local day into a UTC instant
pub fn at_local_time(day: NaiveDate, time: NaiveTime, offset: FixedOffset) -> Option<DateTime<Utc>> {
    offset
        .from_local_datetime(&day.and_time(time))
        .single()
        .map(|dt| dt.with_timezone(&Utc))
}

/// Today's best times that are still ahead of `now`, in ascending order
pub fn upcoming_slots_today(
    best_times: &[NaiveTime],
    now: DateTime<Utc>,
    offset: FixedOffset,
) -> Vec<DateTime<Utc>> {
    let today = now.with_timezone(&offset).date_naive();
    let mut slots: Vec<DateTime<Utc>> = best_times
        .iter()
        .filter_map(|t| at_local_time(today, *t, offset))
        .filter(|slot| *slot > now)
        .collect();
    slots.sort();
    slots.dedup();
    slots
}

/// The first best-time slot after `now`, looking ahead up to a week
pub fn next_best_slot(
    best_times: &[NaiveTime],
    now: DateTime<Utc>,
    offset: FixedOffset,
) -> Option<DateTime<Utc>> {
    let today = now.with_timezone(&offset).date_naive();
    let mut times = best_times.to_vec();
    times.sort();

    (0..7).find_map(|days_ahead| {
        let day = today + Duration::days(days_ahead);
        times
            .iter()
            .filter_map(|t| at_local_time(day, *t, offset))
            .find(|slot| *slot > now)
    })
}

/// Calendar date string ("YYYY-MM-DD") of `now` in the given offset
pub fn local_date_string(now: DateTime<Utc>, offset: FixedOffset) -> String {
    now.with_timezone(&offset).date_naive().format("%Y-%m-%d").to_string()
}

/// The next local midnight strictly after `now`
pub fn next_local_midnight(now: DateTime<Utc>, offset: FixedOffset) -> DateTime<Utc> {
    let tomorrow = now.with_timezone(&offset).date_naive() + Duration::days(1);
    at_local_time(tomorrow, NaiveTime::MIN, offset).unwrap_or(now + Duration::days(1))
}

/// Parse a duration string into a chrono::Duration
fn parse_duration(input: &str) -> Result<Duration> {
    let std_duration = humantime::parse_duration(input)
        .map_err(|_| DeckError::InvalidInput(format!("Could not parse duration: {}", input)))?;

    Duration::try_seconds(std_duration.as_secs() as i64)
        .ok_or_else(|| DeckError::InvalidInput("Duration out of range".to_string()))
}

/// Parse random schedule range: "MIN-MAX"
fn parse_random_schedule(range: &str, last_scheduled: Option<DateTime<Utc>>) -> Result<DateTime<Utc>> {
    let (min_str, max_str) = range.split_once('-').ok_or_else(|| {
        DeckError::InvalidInput("Random format must be random:MIN-MAX".to_string())
    })?;
    let min = parse_duration(min_str)?;
    let max = parse_duration(max_str)?;

    let min_secs = min.num_seconds();
    let max_secs = max.num_seconds();

    if min_secs < MIN_RANDOM_SECONDS {
        return Err(DeckError::InvalidInput(format!(
            "Minimum random interval must be at least {} seconds",
            MIN_RANDOM_SECONDS
        )));
    }
    if max_secs > MAX_RANDOM_SECONDS {
        return Err(DeckError::InvalidInput(format!(
            "Maximum random interval must be less than {} days",
            MAX_RANDOM_SECONDS / (24 * 3600)
        )));
    }
    if min_secs >= max_secs {
        return Err(DeckError::InvalidInput(
            "Minimum must be less than maximum".to_string(),
        ));
    }

    let base = last_scheduled.unwrap_or_else(Utc::now);
    let random_secs = rand::thread_rng().gen_range(min_secs..=max_secs);

    Ok(base + Duration::try_seconds(random_secs).unwrap_or(min))
}
