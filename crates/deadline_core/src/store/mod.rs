//! Durable task records.
//!
//! A `TaskStore` owns one JSON file. Every operation takes the store lock,
//! loads the file, applies its change to that copy and persists it with an
//! atomic rename, so a failed write leaves the last good state on disk.

pub mod json_store;
mod transfer;

pub use transfer::{ConflictPolicy, ExportedTask, ImportFailure, ImportSummary};

use crate::error::AppError;
use crate::model::{Priority, ReminderState, Task};
use crate::time_math;
use json_store::StoreState;
use log::{debug, info};
use std::collections::BTreeSet;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::{Mutex, MutexGuard, PoisonError};
use time::{Duration, OffsetDateTime};
use transfer::ImportRecord;

/// User-supplied fields for a new task, as text straight from a form.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NewTask {
    pub title: String,
    pub description: String,
    pub course: String,
    /// `low`, `medium` or `high`; blank means medium.
    pub priority: String,
    /// RFC 3339 or `YYYY-MM-DD HH:MM` in local time.
    pub due_at: String,
    /// e.g. `48 hours`; `None` means no reminder.
    pub reminder_offset: Option<String>,
}

impl NewTask {
    pub fn new(title: impl Into<String>, due_at: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            due_at: due_at.into(),
            ..Self::default()
        }
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn course(mut self, course: impl Into<String>) -> Self {
        self.course = course.into();
        self
    }

    pub fn priority(mut self, priority: impl Into<String>) -> Self {
        self.priority = priority.into();
        self
    }

    pub fn reminder(mut self, offset: impl Into<String>) -> Self {
        self.reminder_offset = Some(offset.into());
        self
    }
}

/// Partial update; `None` leaves a field untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TaskUpdate {
    pub title: Option<String>,
    pub description: Option<String>,
    pub course: Option<String>,
    pub priority: Option<String>,
    pub due_at: Option<String>,
    /// `Some(None)` removes the reminder.
    pub reminder_offset: Option<Option<String>>,
    pub completed: Option<bool>,
}

impl TaskUpdate {
    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum StatusFilter {
    #[default]
    Pending,
    Completed,
    All,
}

impl StatusFilter {
    fn matches(&self, task: &Task) -> bool {
        match self {
            Self::Pending => !task.completed,
            Self::Completed => task.completed,
            Self::All => true,
        }
    }
}

impl FromStr for StatusFilter {
    type Err = AppError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "pending" => Ok(Self::Pending),
            "completed" | "archive" | "archived" => Ok(Self::Completed),
            "all" => Ok(Self::All),
            other => Err(AppError::validation([format!(
                "status must be pending, completed or all, got `{other}`"
            )])),
        }
    }
}

impl fmt::Display for StatusFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Pending => "pending",
            Self::Completed => "completed",
            Self::All => "all",
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListFilter {
    pub course: Option<String>,
    pub priority: Option<Priority>,
    pub status: StatusFilter,
}

impl ListFilter {
    fn matches(&self, task: &Task) -> bool {
        self.status.matches(task)
            && self
                .course
                .as_deref()
                .is_none_or(|course| task.course == course)
            && self.priority.is_none_or(|priority| task.priority == priority)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SortOrder {
    #[default]
    Ascending,
    Descending,
}

pub struct TaskStore {
    path: PathBuf,
    lock: Mutex<()>,
}

impl fmt::Debug for TaskStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskStore").field("path", &self.path).finish()
    }
}

impl TaskStore {
    /// Opens the store at `path`, failing early if an existing file is
    /// unreadable or corrupt. A missing file is created on first write.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, AppError> {
        let store = Self {
            path: path.into(),
            lock: Mutex::new(()),
        };
        let state = store.read()?;
        info!(
            "event=store_open module=store status=ok path={} tasks={}",
            store.path.display(),
            state.tasks.len()
        );
        Ok(store)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn create(&self, input: NewTask) -> Result<Task, AppError> {
        let mut violations = Violations::default();
        let title = violations.check("title", validate_title(&input.title));
        let priority = violations.check("priority", parse_priority(&input.priority));
        let due_at = violations.check("due_at", time_math::parse_timestamp(&input.due_at));
        let reminder_offset = match input.reminder_offset.as_deref() {
            Some(text) => violations
                .check("reminder_offset", time_math::parse_duration(text))
                .map(Some),
            None => Some(None),
        };
        if let (Some(due_at), Some(Some(offset))) = (due_at, reminder_offset) {
            violations.check("reminder_offset", time_math::reminder_at(due_at, offset));
        }
        violations.finish()?;

        let (Some(title), Some(priority), Some(due_at), Some(reminder_offset)) =
            (title, priority, due_at, reminder_offset)
        else {
            return Err(AppError::validation(["invalid task fields"]));
        };

        let now = OffsetDateTime::now_utc();
        let task = self.mutate(|state| {
            let task = Task {
                id: state.allocate_id()?,
                title,
                description: input.description,
                course: input.course.trim().to_string(),
                priority,
                due_at,
                reminder_offset,
                completed: false,
                notified: false,
                created_at: now,
                updated_at: now,
            };
            state.tasks.push(task.clone());
            Ok(task)
        })?;

        info!(
            "event=task_create module=store status=ok id={} reminder={}",
            task.id,
            task.reminder_offset.is_some()
        );
        Ok(task)
    }

    pub fn get(&self, id: u64) -> Result<Task, AppError> {
        let state = self.read()?;
        state
            .tasks
            .into_iter()
            .find(|task| task.id == id)
            .ok_or_else(|| not_found(id))
    }

    /// Applies the changed fields. Moving `due_at` or the reminder offset
    /// re-arms the reminder.
    pub fn update(&self, id: u64, changes: TaskUpdate) -> Result<Task, AppError> {
        let mut violations = Violations::default();
        let title = changes
            .title
            .as_deref()
            .and_then(|title| violations.check("title", validate_title(title)));
        let priority = changes
            .priority
            .as_deref()
            .and_then(|priority| violations.check("priority", parse_priority(priority)));
        let due_at = changes
            .due_at
            .as_deref()
            .and_then(|due_at| violations.check("due_at", time_math::parse_timestamp(due_at)));
        let reminder_offset = match changes.reminder_offset.as_ref() {
            Some(Some(text)) => violations
                .check("reminder_offset", time_math::parse_duration(text))
                .map(Some),
            Some(None) => Some(None),
            None => None,
        };
        violations.finish()?;

        let now = OffsetDateTime::now_utc();
        let (task, rearmed) = self.mutate(|state| {
            let index = state.position(id).ok_or_else(|| not_found(id))?;
            let task = &mut state.tasks[index];
            check_reminder_fits(
                due_at.unwrap_or(task.due_at),
                reminder_offset.unwrap_or(task.reminder_offset),
            )?;

            let schedule_changed = due_at.is_some_and(|due_at| due_at != task.due_at)
                || reminder_offset
                    .is_some_and(|reminder_offset| reminder_offset != task.reminder_offset);

            if let Some(title) = title {
                task.title = title;
            }
            if let Some(description) = changes.description {
                task.description = description;
            }
            if let Some(course) = changes.course {
                task.course = course.trim().to_string();
            }
            if let Some(priority) = priority {
                task.priority = priority;
            }
            if let Some(due_at) = due_at {
                task.due_at = due_at;
            }
            if let Some(reminder_offset) = reminder_offset {
                task.reminder_offset = reminder_offset;
            }
            if let Some(completed) = changes.completed {
                task.completed = completed;
            }
            if schedule_changed {
                task.notified = false;
            }
            task.updated_at = now;

            Ok((task.clone(), schedule_changed))
        })?;

        info!(
            "event=task_update module=store status=ok id={} rearmed={}",
            task.id, rearmed
        );
        Ok(task)
    }

    pub fn complete(&self, id: u64) -> Result<Task, AppError> {
        self.update(
            id,
            TaskUpdate {
                completed: Some(true),
                ..TaskUpdate::default()
            },
        )
    }

    /// Removes the task for good and returns what was removed.
    pub fn delete(&self, id: u64) -> Result<Task, AppError> {
        let removed = self.mutate(|state| {
            let index = state.position(id).ok_or_else(|| not_found(id))?;
            Ok(state.tasks.remove(index))
        })?;

        info!("event=task_delete module=store status=ok id={}", removed.id);
        Ok(removed)
    }

    /// Tasks matching `filter`, ordered by due date with ties broken by id.
    pub fn list(&self, filter: &ListFilter, order: SortOrder) -> Result<Vec<Task>, AppError> {
        let mut tasks: Vec<Task> = self
            .read()?
            .tasks
            .into_iter()
            .filter(|task| filter.matches(task))
            .collect();

        tasks.sort_by(|left, right| {
            left.due_at
                .cmp(&right.due_at)
                .then(left.id.cmp(&right.id))
        });
        if order == SortOrder::Descending {
            tasks.reverse();
        }

        Ok(tasks)
    }

    /// Distinct non-empty course labels, sorted.
    pub fn courses(&self) -> Result<Vec<String>, AppError> {
        let courses: BTreeSet<String> = self
            .read()?
            .tasks
            .into_iter()
            .map(|task| task.course)
            .filter(|course| !course.is_empty())
            .collect();
        Ok(courses.into_iter().collect())
    }

    /// Writes every task, completed ones included, to `path`.
    pub fn export(&self, path: &Path) -> Result<usize, AppError> {
        let state = self.read()?;
        transfer::write_export(path, &state.tasks)?;

        info!(
            "event=export module=store status=ok tasks={} path={}",
            state.tasks.len(),
            path.display()
        );
        Ok(state.tasks.len())
    }

    /// Imports a JSON array of tasks. Bad records are reported in the
    /// summary; only an unreadable file or non-array content fails outright.
    pub fn import(&self, path: &Path, policy: ConflictPolicy) -> Result<ImportSummary, AppError> {
        let records = transfer::read_records(path)?;
        let now = OffsetDateTime::now_utc();

        let summary = self.mutate(|state| {
            let mut summary = ImportSummary::default();
            for (index, value) in records.into_iter().enumerate() {
                let id = value.get("id").and_then(serde_json::Value::as_u64);
                match transfer::decode_record(value)
                    .and_then(|record| import_record(state, record, policy, now))
                {
                    Ok(ImportOutcome::Imported) => summary.imported += 1,
                    Ok(ImportOutcome::Skipped) => summary.skipped += 1,
                    Err(error) => {
                        debug!(
                            "event=import_record module=store status=failed index={} code={}",
                            index,
                            error.code()
                        );
                        summary.failed.push(ImportFailure { index, id, error });
                    }
                }
            }
            Ok(summary)
        })?;

        info!(
            "event=import module=store status=ok policy={} imported={} skipped={} failed={}",
            policy,
            summary.imported,
            summary.skipped,
            summary.failed.len()
        );
        Ok(summary)
    }

    /// Marks every task whose reminder is due as notified and returns them.
    /// The flag is persisted before anything is sent, so a crash or a failed
    /// delivery never produces a second reminder.
    pub(crate) fn claim_due_reminders(&self, now: OffsetDateTime) -> Result<Vec<Task>, AppError> {
        self.mutate(|state| {
            let mut claimed = Vec::new();
            for task in &mut state.tasks {
                if task.reminder_state(now) == ReminderState::Due {
                    task.notified = true;
                    claimed.push(task.clone());
                }
            }
            Ok(claimed)
        })
    }

    fn guard(&self) -> MutexGuard<'_, ()> {
        // The guarded data lives on disk; a panic mid-operation cannot leave
        // it half-written, so a poisoned lock is still usable.
        self.lock.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn read(&self) -> Result<StoreState, AppError> {
        let _guard = self.guard();
        json_store::load_state(&self.path)
    }

    fn mutate<T>(
        &self,
        apply: impl FnOnce(&mut StoreState) -> Result<T, AppError>,
    ) -> Result<T, AppError> {
        let _guard = self.guard();
        let before = json_store::load_state(&self.path)?;
        let mut state = before.clone();
        let output = apply(&mut state)?;
        if state != before {
            json_store::save_state(&self.path, &state)?;
        }
        Ok(output)
    }
}

enum ImportOutcome {
    Imported,
    Skipped,
}

fn import_record(
    state: &mut StoreState,
    record: ImportRecord,
    policy: ConflictPolicy,
    now: OffsetDateTime,
) -> Result<ImportOutcome, AppError> {
    let mut violations = Violations::default();
    let title = violations.check("title", validate_title(&record.title));
    let priority = violations.check("priority", parse_priority(&record.priority));
    let due_at = violations.check("due_at", time_math::parse_timestamp(&record.due_at));
    let reminder_offset = match record.reminder_offset_seconds {
        Some(seconds) => violations
            .check("reminder_offset_seconds", offset_from_seconds(seconds))
            .map(Some),
        None => Some(None),
    };
    if let (Some(due_at), Some(Some(offset))) = (due_at, reminder_offset) {
        violations.check(
            "reminder_offset_seconds",
            time_math::reminder_at(due_at, offset),
        );
    }
    violations.finish()?;

    let (Some(title), Some(priority), Some(due_at), Some(reminder_offset)) =
        (title, priority, due_at, reminder_offset)
    else {
        return Err(AppError::validation(["invalid task fields"]));
    };

    let existing = record.id.and_then(|id| state.position(id));
    match (existing, policy) {
        (Some(_), ConflictPolicy::Skip) => Ok(ImportOutcome::Skipped),
        (Some(index), ConflictPolicy::Overwrite) => {
            let task = &mut state.tasks[index];
            let schedule_unchanged =
                task.due_at == due_at && task.reminder_offset == reminder_offset;
            task.title = title;
            task.description = record.description;
            task.course = record.course.trim().to_string();
            task.priority = priority;
            task.due_at = due_at;
            task.reminder_offset = reminder_offset;
            task.completed = record.completed;
            task.notified = task.notified && schedule_unchanged;
            task.updated_at = now;
            Ok(ImportOutcome::Imported)
        }
        (existing, _) => {
            // Ids of deleted tasks stay retired; such records get a fresh one.
            let id = match (existing, record.id) {
                (None, Some(id)) if !state.was_issued(id) => {
                    state.reserve_id(id)?;
                    id
                }
                _ => state.allocate_id()?,
            };
            state.tasks.push(Task {
                id,
                title,
                description: record.description,
                course: record.course.trim().to_string(),
                priority,
                due_at,
                reminder_offset,
                completed: record.completed,
                notified: false,
                created_at: now,
                updated_at: now,
            });
            Ok(ImportOutcome::Imported)
        }
    }
}

/// Collects every field problem before failing.
#[derive(Default)]
struct Violations(Vec<String>);

impl Violations {
    fn check<T>(&mut self, field: &str, result: Result<T, AppError>) -> Option<T> {
        match result {
            Ok(value) => Some(value),
            Err(AppError::Validation(messages)) => {
                self.0
                    .extend(messages.into_iter().map(|message| format!("{field}: {message}")));
                None
            }
            Err(err) => {
                self.0.push(format!("{field}: {}", err.message()));
                None
            }
        }
    }

    fn finish(self) -> Result<(), AppError> {
        if self.0.is_empty() {
            Ok(())
        } else {
            Err(AppError::Validation(self.0))
        }
    }
}

fn validate_title(title: &str) -> Result<String, AppError> {
    let trimmed = title.trim();
    if trimmed.is_empty() {
        return Err(AppError::validation(["must not be empty"]));
    }
    Ok(trimmed.to_string())
}

fn parse_priority(priority: &str) -> Result<Priority, AppError> {
    if priority.trim().is_empty() {
        return Ok(Priority::default());
    }
    priority.parse()
}

/// Rejects a reminder that would fire before the calendar `time` supports.
fn check_reminder_fits(due_at: OffsetDateTime, offset: Option<Duration>) -> Result<(), AppError> {
    match offset {
        Some(offset) => time_math::reminder_at(due_at, offset)
            .map(|_| ())
            .map_err(|err| AppError::validation([format!("reminder_offset: {}", err.message())])),
        None => Ok(()),
    }
}

fn offset_from_seconds(seconds: i64) -> Result<Duration, AppError> {
    if seconds < 0 {
        return Err(AppError::validation([format!(
            "must not be negative, got {seconds}"
        )]));
    }
    Ok(Duration::seconds(seconds))
}

fn not_found(id: u64) -> AppError {
    AppError::not_found(format!("task {id} not found"))
}
