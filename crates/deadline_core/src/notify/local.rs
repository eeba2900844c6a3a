use crate::error::AppError;
use crate::notify::{ChannelKind, DeliveryChannel, ReminderPayload};

const DISABLE_ENV_VAR: &str = "DEADLINE_DISABLE_NOTIFICATIONS";

/// Desktop notification backend.
pub trait Notifier: Send + Sync {
    fn notify(&self, payload: &ReminderPayload) -> Result<(), AppError>;
}

pub struct NoopNotifier;

impl Notifier for NoopNotifier {
    fn notify(&self, _payload: &ReminderPayload) -> Result<(), AppError> {
        Ok(())
    }
}

#[cfg_attr(any(target_os = "linux", windows), allow(dead_code))]
struct UnsupportedNotifier;

impl Notifier for UnsupportedNotifier {
    fn notify(&self, _payload: &ReminderPayload) -> Result<(), AppError> {
        Err(AppError::delivery(
            "notifications are not supported on this platform",
        ))
    }
}

/// The platform notifier, or a no-op one when
/// `DEADLINE_DISABLE_NOTIFICATIONS` is set.
pub fn notifier_from_env() -> Box<dyn Notifier> {
    if std::env::var(DISABLE_ENV_VAR).is_ok() {
        return Box::new(NoopNotifier);
    }
    platform_notifier()
}

#[cfg(target_os = "linux")]
pub fn platform_notifier() -> Box<dyn Notifier> {
    Box::new(crate::notify::LinuxNotifier)
}

#[cfg(windows)]
pub fn platform_notifier() -> Box<dyn Notifier> {
    Box::new(crate::notify::WindowsNotifier)
}

#[cfg(not(any(target_os = "linux", windows)))]
pub fn platform_notifier() -> Box<dyn Notifier> {
    Box::new(UnsupportedNotifier)
}

/// Local alert channel; the fallback when remote push is unavailable.
pub struct LocalChannel {
    notifier: Box<dyn Notifier>,
}

impl LocalChannel {
    pub fn new(notifier: Box<dyn Notifier>) -> Self {
        Self { notifier }
    }
}

impl DeliveryChannel for LocalChannel {
    fn kind(&self) -> ChannelKind {
        ChannelKind::Local
    }

    fn deliver(&self, payload: &ReminderPayload) -> Result<(), AppError> {
        self.notifier.notify(payload).map_err(|err| match err {
            AppError::Delivery(_) => err,
            other => AppError::delivery(other.message()),
        })
    }
}
