//! Date, time and duration helpers shared by the store and the scheduler.
//!
//! Everything here is pure: callers pass `now` explicitly so countdowns and
//! reminder instants are deterministic in tests.

use crate::error::AppError;
use time::format_description::FormatItem;
use time::format_description::well_known::Rfc3339;
use time::macros::format_description;
use time::{Date, Duration, OffsetDateTime, PrimitiveDateTime, Time, UtcOffset};

const DATE_FORMAT: &[FormatItem<'static>] = format_description!("[year]-[month]-[day]");
const TIME_FORMAT: &[FormatItem<'static>] = format_description!("[hour]:[minute]");
const TIME_WITH_SECONDS_FORMAT: &[FormatItem<'static>] =
    format_description!("[hour]:[minute]:[second]");
const EXPORT_FILE_FORMAT: &[FormatItem<'static>] =
    format_description!("tasks_export_[year][month][day]_[hour][minute][second].json");

const SECONDS_PER_MINUTE: u64 = 60;
const SECONDS_PER_HOUR: u64 = 60 * SECONDS_PER_MINUTE;
const SECONDS_PER_DAY: u64 = 24 * SECONDS_PER_HOUR;

/// Local UTC offset, or UTC when the platform cannot report one.
pub fn local_offset() -> UtcOffset {
    UtcOffset::current_local_offset().unwrap_or(UtcOffset::UTC)
}

/// Parses `YYYY-MM-DD` plus `HH:MM` (or `HH:MM:SS`) in the local offset.
///
/// An empty `time_text` means midnight.
pub fn parse_datetime(date_text: &str, time_text: &str) -> Result<OffsetDateTime, AppError> {
    parse_datetime_in(date_text, time_text, local_offset())
}

pub fn parse_datetime_in(
    date_text: &str,
    time_text: &str,
    offset: UtcOffset,
) -> Result<OffsetDateTime, AppError> {
    let date_text = date_text.trim();
    let date = Date::parse(date_text, DATE_FORMAT)
        .map_err(|_| AppError::format(format!("date must be YYYY-MM-DD, got `{date_text}`")))?;

    let time_text = time_text.trim();
    let time = if time_text.is_empty() {
        Time::MIDNIGHT
    } else {
        Time::parse(time_text, TIME_FORMAT)
            .or_else(|_| Time::parse(time_text, TIME_WITH_SECONDS_FORMAT))
            .map_err(|_| AppError::format(format!("time must be HH:MM, got `{time_text}`")))?
    };

    Ok(PrimitiveDateTime::new(date, time).assume_offset(offset))
}

/// Parses a due timestamp as typed by a user or found in an import file.
///
/// RFC 3339 is taken as-is; `YYYY-MM-DD[ HH:MM[:SS]]` (space or `T`
/// separated) is read in the local offset.
pub fn parse_timestamp(text: &str) -> Result<OffsetDateTime, AppError> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Err(AppError::format("timestamp is required"));
    }

    if let Ok(parsed) = OffsetDateTime::parse(trimmed, &Rfc3339) {
        return Ok(parsed);
    }

    let (date_text, time_text) = trimmed
        .split_once(['T', ' '])
        .unwrap_or((trimmed, ""));
    parse_datetime(date_text, time_text).map_err(|_| {
        AppError::format(format!(
            "timestamp must be RFC 3339 or YYYY-MM-DD HH:MM, got `{trimmed}`"
        ))
    })
}

pub fn format_timestamp(value: OffsetDateTime) -> Result<String, AppError> {
    value
        .format(&Rfc3339)
        .map_err(|err| AppError::format(err.to_string()))
}

/// Parses reminder offsets such as `48 hours`, `30 minutes`, `2d` or `1 week`.
pub fn parse_duration(text: &str) -> Result<Duration, AppError> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Err(AppError::format("duration is required"));
    }

    let split = trimmed
        .find(|ch: char| !(ch.is_ascii_digit() || ch == '-' || ch == '+'))
        .unwrap_or(trimmed.len());
    let (magnitude_text, unit_text) = trimmed.split_at(split);
    let magnitude_text = magnitude_text.trim();
    let unit = unit_text.trim().to_ascii_lowercase();

    if magnitude_text.is_empty() {
        return Err(AppError::format(format!(
            "duration must start with a number, got `{trimmed}`"
        )));
    }

    let magnitude: i64 = magnitude_text
        .parse()
        .map_err(|_| AppError::format(format!("invalid duration magnitude `{magnitude_text}`")))?;
    if magnitude < 0 {
        return Err(AppError::format(format!(
            "duration must not be negative, got `{trimmed}`"
        )));
    }

    let unit_seconds: i64 = match unit.as_str() {
        "s" | "sec" | "secs" | "second" | "seconds" => 1,
        "m" | "min" | "mins" | "minute" | "minutes" => 60,
        "h" | "hr" | "hrs" | "hour" | "hours" => 3_600,
        "d" | "day" | "days" => 86_400,
        "w" | "wk" | "wks" | "week" | "weeks" => 604_800,
        "" => {
            return Err(AppError::format(format!(
                "duration unit is required, got `{trimmed}`"
            )));
        }
        other => {
            return Err(AppError::format(format!("unknown duration unit `{other}`")));
        }
    };

    let seconds = magnitude
        .checked_mul(unit_seconds)
        .ok_or_else(|| AppError::format(format!("duration `{trimmed}` is too large")))?;
    Ok(Duration::seconds(seconds))
}

/// Renders an offset the way `parse_duration` would accept it back.
pub fn format_duration(duration: Duration) -> String {
    let seconds = duration.whole_seconds().unsigned_abs();
    if seconds == 0 {
        return plural(0, "minute");
    }

    if seconds % SECONDS_PER_DAY == 0 {
        plural(seconds / SECONDS_PER_DAY, "day")
    } else if seconds % SECONDS_PER_HOUR == 0 {
        plural(seconds / SECONDS_PER_HOUR, "hour")
    } else if seconds % SECONDS_PER_MINUTE == 0 {
        plural(seconds / SECONDS_PER_MINUTE, "minute")
    } else {
        plural(seconds, "second")
    }
}

/// Human countdown from `now` to `due_at`, e.g. `in 3 days` or
/// `overdue by 2 hours`.
pub fn format_countdown(now: OffsetDateTime, due_at: OffsetDateTime) -> String {
    let delta = due_at - now;
    let total = delta.whole_seconds().unsigned_abs();

    let days = total / SECONDS_PER_DAY;
    let hours = (total % SECONDS_PER_DAY) / SECONDS_PER_HOUR;
    let minutes = (total % SECONDS_PER_HOUR) / SECONDS_PER_MINUTE;

    let phrase = if days > 0 {
        plural(days, "day")
    } else if hours > 0 {
        plural(hours, "hour")
    } else if minutes > 0 {
        plural(minutes, "minute")
    } else {
        return "due now".to_string();
    };

    if delta.is_negative() {
        format!("overdue by {phrase}")
    } else {
        format!("in {phrase}")
    }
}

/// `due_at - offset`, or a format error when the result leaves the range
/// `time` can represent.
pub fn reminder_at(due_at: OffsetDateTime, offset: Duration) -> Result<OffsetDateTime, AppError> {
    due_at.checked_sub(offset).ok_or_else(|| {
        AppError::format(format!(
            "{} before the deadline is out of range",
            format_duration(offset)
        ))
    })
}

/// Default file name offered when exporting, e.g.
/// `tasks_export_20250310_090000.json`.
pub fn export_file_name(now: OffsetDateTime) -> Result<String, AppError> {
    now.format(EXPORT_FILE_FORMAT)
        .map_err(|err| AppError::format(err.to_string()))
}

fn plural(count: u64, unit: &str) -> String {
    if count == 1 {
        format!("{count} {unit}")
    } else {
        format!("{count} {unit}s")
    }
}
