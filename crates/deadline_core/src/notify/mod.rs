//! Reminder delivery.
//!
//! A `NotificationDispatcher` holds an ordered list of delivery channels and
//! hands each payload to the first one that accepts it. Failures never
//! escape `dispatch`; they are recorded in the returned `DeliveryResult`.

use crate::config::Config;
use crate::error::AppError;
use crate::model::Task;
use crate::time_math;
use log::{debug, warn};
use std::fmt;
use std::sync::Arc;
use time::OffsetDateTime;
use time::format_description::FormatItem;
use time::macros::format_description;

mod local;
mod remote;

#[cfg(target_os = "linux")]
mod linux;
#[cfg(target_os = "linux")]
pub use linux::LinuxNotifier;

#[cfg(windows)]
mod windows;
#[cfg(windows)]
pub use windows::WindowsNotifier;

pub use local::{LocalChannel, NoopNotifier, Notifier, notifier_from_env, platform_notifier};
pub use remote::{PushTransport, RemoteChannel};

const DUE_FORMAT: &[FormatItem<'static>] =
    format_description!("[year]-[month]-[day] [hour]:[minute]");

/// What gets shown to the user for one reminder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReminderPayload {
    pub task_id: u64,
    pub title: String,
    pub body: String,
}

impl ReminderPayload {
    pub fn for_task(task: &Task, now: OffsetDateTime) -> Self {
        let due_local = task.due_at.to_offset(time_math::local_offset());
        let due_text = due_local
            .format(DUE_FORMAT)
            .unwrap_or_else(|_| due_local.to_string());
        let countdown = time_math::format_countdown(now, task.due_at);

        let body = if task.course.is_empty() {
            format!("Due {due_text} ({countdown})")
        } else {
            format!("{}: due {due_text} ({countdown})", task.course)
        };

        Self {
            task_id: task.id,
            title: format!("Reminder: {}", task.title),
            body,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChannelKind {
    Remote,
    Local,
}

impl fmt::Display for ChannelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Remote => "remote",
            Self::Local => "local",
        })
    }
}

/// One way of getting a reminder in front of the user.
pub trait DeliveryChannel: Send + Sync {
    fn kind(&self) -> ChannelKind;

    fn deliver(&self, payload: &ReminderPayload) -> Result<(), AppError>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelFailure {
    pub channel: ChannelKind,
    pub error: AppError,
}

/// Which channel took the payload, and what failed on the way there.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeliveryResult {
    pub delivered_via: Option<ChannelKind>,
    pub failures: Vec<ChannelFailure>,
}

impl DeliveryResult {
    pub fn is_delivered(&self) -> bool {
        self.delivered_via.is_some()
    }
}

pub struct NotificationDispatcher {
    channels: Vec<Box<dyn DeliveryChannel>>,
}

impl fmt::Debug for NotificationDispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NotificationDispatcher")
            .field("channels", &self.channel_kinds())
            .finish()
    }
}

impl NotificationDispatcher {
    /// Channels are tried in the given order.
    pub fn new(channels: Vec<Box<dyn DeliveryChannel>>) -> Self {
        Self { channels }
    }

    /// Remote push first when enabled, then the desktop notifier when
    /// enabled. `transport` is the host's push implementation, if any.
    pub fn from_config(config: &Config, transport: Option<Arc<dyn PushTransport>>) -> Self {
        let mut channels: Vec<Box<dyn DeliveryChannel>> = Vec::new();
        if config.remote_push.enabled {
            channels.push(Box::new(RemoteChannel::from_config(
                &config.remote_push,
                transport,
            )));
        }
        if config.local_notifications {
            channels.push(Box::new(LocalChannel::new(notifier_from_env())));
        }
        Self::new(channels)
    }

    pub fn channel_kinds(&self) -> Vec<ChannelKind> {
        self.channels.iter().map(|channel| channel.kind()).collect()
    }

    pub fn dispatch(&self, payload: &ReminderPayload) -> DeliveryResult {
        let mut result = DeliveryResult::default();

        if self.channels.is_empty() {
            warn!(
                "event=dispatch module=notify status=skipped task_id={} reason=no_channels",
                payload.task_id
            );
            return result;
        }

        for channel in &self.channels {
            let kind = channel.kind();
            match channel.deliver(payload) {
                Ok(()) => {
                    debug!(
                        "event=dispatch module=notify status=ok task_id={} channel={}",
                        payload.task_id, kind
                    );
                    result.delivered_via = Some(kind);
                    return result;
                }
                Err(error) => {
                    warn!(
                        "event=dispatch module=notify status=failed task_id={} channel={} code={}",
                        payload.task_id,
                        kind,
                        error.code()
                    );
                    result.failures.push(ChannelFailure {
                        channel: kind,
                        error,
                    });
                }
            }
        }

        result
    }
}
