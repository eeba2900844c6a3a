use crate::error::AppError;
use crate::notify::{Notifier, ReminderPayload};
use notify_rust::{Notification, Timeout};

const APP_NAME: &str = "Deadline Tracker";
const DISPLAY_MILLIS: u32 = 10_000;

pub struct LinuxNotifier;

impl Notifier for LinuxNotifier {
    fn notify(&self, payload: &ReminderPayload) -> Result<(), AppError> {
        Notification::new()
            .appname(APP_NAME)
            .summary(&payload.title)
            .body(&payload.body)
            .timeout(Timeout::Milliseconds(DISPLAY_MILLIS))
            .show()
            .map_err(|err| AppError::delivery(err.to_string()))?;
        Ok(())
    }
}
