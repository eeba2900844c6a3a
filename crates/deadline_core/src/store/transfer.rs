//! JSON export/import file format.
//!
//! The exchange format is a bare array of task objects. Internal bookkeeping
//! (`notified`, `created_at`, `updated_at`) never leaves the store.

use crate::error::AppError;
use crate::model::{Priority, Task};
use crate::store::json_store;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use time::OffsetDateTime;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExportedTask {
    pub id: u64,
    pub title: String,
    pub description: String,
    pub course: String,
    pub priority: Priority,
    #[serde(with = "time::serde::rfc3339")]
    pub due_at: OffsetDateTime,
    pub reminder_offset_seconds: Option<i64>,
    pub completed: bool,
}

impl From<&Task> for ExportedTask {
    fn from(task: &Task) -> Self {
        Self {
            id: task.id,
            title: task.title.clone(),
            description: task.description.clone(),
            course: task.course.clone(),
            priority: task.priority,
            due_at: task.due_at,
            reminder_offset_seconds: task.reminder_offset.map(|offset| offset.whole_seconds()),
            completed: task.completed,
        }
    }
}

/// One element of an import file before validation. Fields are loose on
/// purpose so that bad values surface as validation messages.
#[derive(Debug, Clone, Default, Deserialize)]
pub(crate) struct ImportRecord {
    #[serde(default)]
    pub id: Option<u64>,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub course: String,
    #[serde(default)]
    pub priority: String,
    #[serde(default)]
    pub due_at: String,
    #[serde(default)]
    pub reminder_offset_seconds: Option<i64>,
    #[serde(default)]
    pub completed: bool,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ConflictPolicy {
    #[default]
    Skip,
    Overwrite,
    DuplicateAsNew,
}

impl ConflictPolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Skip => "skip",
            Self::Overwrite => "overwrite",
            Self::DuplicateAsNew => "duplicate-as-new",
        }
    }
}

impl fmt::Display for ConflictPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ConflictPolicy {
    type Err = AppError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().replace('_', "-").as_str() {
            "skip" => Ok(Self::Skip),
            "overwrite" => Ok(Self::Overwrite),
            "duplicate-as-new" | "duplicate" => Ok(Self::DuplicateAsNew),
            other => Err(AppError::validation([format!(
                "conflict policy must be skip, overwrite or duplicate-as-new, got `{other}`"
            )])),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImportSummary {
    pub imported: usize,
    pub skipped: usize,
    pub failed: Vec<ImportFailure>,
}

/// A record that was rejected; `index` is its position in the file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportFailure {
    pub index: usize,
    pub id: Option<u64>,
    pub error: AppError,
}

pub(crate) fn write_export(path: &Path, tasks: &[Task]) -> Result<(), AppError> {
    let mut exported: Vec<ExportedTask> = tasks.iter().map(ExportedTask::from).collect();
    exported.sort_by_key(|task| task.id);

    let content = serde_json::to_string_pretty(&exported)
        .map_err(|err| AppError::invalid_data(err.to_string()))?;
    json_store::write_atomic(path, content.as_bytes())
}

/// Reads the raw array; a file that is unreadable or not a JSON array fails
/// as a whole, individual elements are decoded later.
pub(crate) fn read_records(path: &Path) -> Result<Vec<serde_json::Value>, AppError> {
    let content = std::fs::read_to_string(path)
        .map_err(|err| AppError::io(format!("{}: {}", path.display(), err)))?;
    let value: serde_json::Value = serde_json::from_str(&content).map_err(|err| {
        AppError::invalid_data(format!("invalid JSON in {}: {}", path.display(), err))
    })?;

    match value {
        serde_json::Value::Array(records) => Ok(records),
        _ => Err(AppError::invalid_data(format!(
            "{} must contain a JSON array of tasks",
            path.display()
        ))),
    }
}

pub(crate) fn decode_record(value: serde_json::Value) -> Result<ImportRecord, AppError> {
    serde_json::from_value(value).map_err(|err| AppError::invalid_data(err.to_string()))
}
