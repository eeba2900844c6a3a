use crate::error::AppError;
use crate::time_math;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use time::{Duration, OffsetDateTime};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    pub id: u64,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub course: String,
    #[serde(default)]
    pub priority: Priority,
    #[serde(with = "time::serde::rfc3339")]
    pub due_at: OffsetDateTime,
    #[serde(
        default,
        rename = "reminder_offset_seconds",
        with = "offset_seconds"
    )]
    pub reminder_offset: Option<Duration>,
    #[serde(default)]
    pub completed: bool,
    #[serde(default)]
    pub notified: bool,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

impl Task {
    /// Instant the reminder fires, if the task has one that fits the
    /// calendar.
    pub fn reminder_at(&self) -> Option<OffsetDateTime> {
        self.reminder_offset
            .and_then(|offset| time_math::reminder_at(self.due_at, offset).ok())
    }

    pub fn is_overdue(&self, now: OffsetDateTime) -> bool {
        !self.completed && self.due_at < now
    }

    pub fn reminder_state(&self, now: OffsetDateTime) -> ReminderState {
        if self.notified {
            return ReminderState::Dispatched;
        }

        match self.reminder_at() {
            Some(reminder_at) if !self.completed && now >= reminder_at => ReminderState::Due,
            _ => ReminderState::Idle,
        }
    }
}

/// Where a task sits in its reminder cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReminderState {
    Idle,
    Due,
    Dispatched,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Low,
    #[default]
    Medium,
    High,
}

impl Priority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Priority {
    type Err = AppError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "low" => Ok(Self::Low),
            "medium" => Ok(Self::Medium),
            "high" => Ok(Self::High),
            other => Err(AppError::validation([format!(
                "expected low, medium or high, got `{other}`"
            )])),
        }
    }
}

/// Stores a reminder offset as whole seconds, the unit used on disk and in
/// exports.
mod offset_seconds {
    use serde::{Deserialize, Deserializer, Serializer};
    use time::Duration;

    pub fn serialize<S: Serializer>(
        value: &Option<Duration>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        match value {
            Some(duration) => serializer.serialize_some(&duration.whole_seconds()),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<Duration>, D::Error> {
        Ok(Option::<i64>::deserialize(deserializer)?.map(Duration::seconds))
    }
}
