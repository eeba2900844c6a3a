use crate::error::AppError;
use crate::notify::{Notifier, ReminderPayload};
use tauri_winrt_notification::{Duration, Toast};

pub struct WindowsNotifier;

impl Notifier for WindowsNotifier {
    fn notify(&self, payload: &ReminderPayload) -> Result<(), AppError> {
        Toast::new(Toast::POWERSHELL_APP_ID)
            .title(&payload.title)
            .text1(&payload.body)
            .text2(&format!("task {}", payload.task_id))
            .duration(Duration::Short)
            .show()
            .map_err(|err| AppError::delivery(err.to_string()))
    }
}
