mod task;

pub use task::{Priority, ReminderState, Task};
