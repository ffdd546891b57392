// ABOUTME: Time expression parsing for reminders - relative, absolute and natural language.
// ABOUTME: Wall-clock inputs are read in the configured timezone; results are UTC and in the future.

use anyhow::Result;
use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use chrono_tz::Tz;
use once_cell::sync::Lazy;
use regex::Regex;

/// Wall-clock format used in reminder files and listings
pub const LOCAL_FORMAT: &str = "%Y-%m-%d %H:%M";

static RELATIVE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(concat!(
        r"^in\s+(\d+)\s+",
        r"(minute|minutes|min|mins|hour|hours|hr|hrs|day|days|second|seconds|sec|secs)$"
    ))
    .expect("valid relative time regex")
});

/// Parse relative time expressions like "in 5 minutes", "in 2 hours"
fn parse_relative_time(input: &str, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
    let caps = RELATIVE_RE.captures(input)?;
    let amount: i64 = caps.get(1)?.as_str().parse().ok()?;
    let unit = caps.get(2)?.as_str();

    let duration = match unit {
        "second" | "seconds" | "sec" | "secs" => chrono::Duration::try_seconds(amount)?,
        "minute" | "minutes" | "min" | "mins" => chrono::Duration::try_minutes(amount)?,
        "hour" | "hours" | "hr" | "hrs" => chrono::Duration::try_hours(amount)?,
        "day" | "days" => chrono::Duration::try_days(amount)?,
        _ => return None,
    };

    now.checked_add_signed(duration)
}

/// Interpret a naive wall-clock time in `tz`
pub fn local_to_utc(naive: &NaiveDateTime, tz: Tz) -> Result<DateTime<Utc>> {
    match tz.from_local_datetime(naive).single() {
        Some(dt) => Ok(dt.with_timezone(&Utc)),
        None => anyhow::bail!("Ambiguous or nonexistent local time {} in {}", naive, tz),
    }
}

/// Render `dt` as `YYYY-MM-DD HH:MM` in `tz`
pub fn format_local(dt: DateTime<Utc>, tz: Tz) -> String {
    dt.with_timezone(&tz).format(LOCAL_FORMAT).to_string()
}

/// Parse `YYYY-MM-DD HH:MM` (seconds optional) as a naive wall-clock time
pub fn parse_local(input: &str) -> Option<NaiveDateTime> {
    let input = input.trim();
    NaiveDateTime::parse_from_str(input, LOCAL_FORMAT)
        .or_else(|_| NaiveDateTime::parse_from_str(input, "%Y-%m-%d %H:%M:%S"))
        .ok()
}

/// Parse a reminder due time relative to the current instant
pub fn parse_due(input: &str, tz: Tz) -> Result<DateTime<Utc>> {
    parse_due_at(input, tz, Utc::now())
}

/// Parse a reminder due time relative to `now`. The result must lie after `now`.
pub fn parse_due_at(input: &str, tz: Tz, now: DateTime<Utc>) -> Result<DateTime<Utc>> {
    let input_lower = input.trim().to_lowercase();
    tracing::debug!(input = %input_lower, timezone = %tz, "Attempting to parse time expression");

    let due = if let Some(dt) = parse_relative_time(&input_lower, now) {
        dt
    } else if let Ok(dt) = DateTime::parse_from_rfc3339(input.trim()) {
        dt.with_timezone(&Utc)
    } else if let Some(naive) = parse_local(&input_lower) {
        local_to_utc(&naive, tz)?
    } else {
        // Natural language, resolved against the wall clock in `tz`
        let config = two_timer::Config::new().now(now.with_timezone(&tz).naive_local());
        match two_timer::parse(&input_lower, Some(config)) {
            Ok((start, _end, _)) => {
                tracing::debug!(start = ?start, "two_timer parsed successfully");
                local_to_utc(&start, tz)?
            }
            Err(e) => {
                tracing::debug!(error = ?e, input = %input_lower, "two_timer failed to parse");
                anyhow::bail!(
                    "Could not parse time expression '{}'. \
                     Try: 'in 10 minutes', '2030-01-31 09:00', 'tomorrow 9am'",
                    input.trim()
                )
            }
        }
    };

    if due <= now {
        tracing::debug!(due = %due, "Parsed time is in the past");
        anyhow::bail!("Reminder time must be in the future");
    }
    Ok(due)
}
