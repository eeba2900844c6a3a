pub mod config;
pub mod error;
pub mod logging;
pub mod model;
pub mod notify;
pub mod scheduler;
pub mod store;
pub mod time_math;

pub use error::AppError;
pub use model::{Priority, Task};
pub use store::TaskStore;

#[cfg(test)]
mod tests {
    use crate::model::{Priority, ReminderState, Task};
    use crate::{AppError, time_math};
    use time::Duration;
    use time::macros::datetime;

    #[test]
    fn task_serializes_offset_as_seconds() {
        let task = Task {
            id: 1,
            title: "Lab report".to_string(),
            description: String::new(),
            course: "CHEM 110".to_string(),
            priority: Priority::Low,
            due_at: datetime!(2025-03-10 09:00 UTC),
            reminder_offset: Some(Duration::hours(2)),
            completed: false,
            notified: false,
            created_at: datetime!(2025-03-01 12:00 UTC),
            updated_at: datetime!(2025-03-01 12:00 UTC),
        };

        let value = serde_json::to_value(&task).unwrap();
        assert_eq!(value["reminder_offset_seconds"], 7200);
        assert_eq!(value["priority"], "low");
        assert_eq!(
            task.reminder_state(datetime!(2025-03-10 07:00 UTC)),
            ReminderState::Due
        );
        assert_eq!(
            task.reminder_at(),
            time_math::reminder_at(task.due_at, Duration::hours(2)).ok()
        );
    }

    #[test]
    fn app_error_exposes_code() {
        let err = AppError::not_found("task 7 not found");
        assert_eq!(err.code(), "not_found");
        assert_eq!(err.to_string(), "not_found - task 7 not found");
    }
}
