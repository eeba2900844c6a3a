//! Periodic reminder scans.
//!
//! A scan claims every task whose reminder is due (persisting `notified`
//! first) and hands each one to the dispatcher. The background loop runs on
//! one dedicated thread and reports through a channel; it never touches
//! caller state directly.

use crate::error::AppError;
use crate::notify::{DeliveryResult, NotificationDispatcher, ReminderPayload};
use crate::store::TaskStore;
use log::{debug, error, info, warn};
use std::sync::Arc;
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::thread::JoinHandle;
use std::time::Duration;
use time::OffsetDateTime;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchedReminder {
    pub task_id: u64,
    pub title: String,
    pub result: DeliveryResult,
}

/// Outcome of one scan. `error` is set when the store could not be read or
/// written; nothing was dispatched in that case.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScanReport {
    pub reminders: Vec<DispatchedReminder>,
    pub error: Option<AppError>,
}

impl ScanReport {
    pub fn delivered(&self) -> usize {
        self.reminders
            .iter()
            .filter(|reminder| reminder.result.is_delivered())
            .count()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReminderEvent {
    Reminder(DispatchedReminder),
    ScanFailed(AppError),
}

#[derive(Debug)]
pub struct ReminderScheduler {
    store: Arc<TaskStore>,
    dispatcher: NotificationDispatcher,
    interval: Duration,
}

impl ReminderScheduler {
    pub fn new(
        store: Arc<TaskStore>,
        dispatcher: NotificationDispatcher,
        interval: Duration,
    ) -> Self {
        Self {
            store,
            dispatcher,
            interval,
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn scan(&self, now: OffsetDateTime) -> ScanReport {
        let claimed = match self.store.claim_due_reminders(now) {
            Ok(claimed) => claimed,
            Err(err) => {
                error!(
                    "event=scan module=scheduler status=error code={}",
                    err.code()
                );
                return ScanReport {
                    reminders: Vec::new(),
                    error: Some(err),
                };
            }
        };

        let reminders: Vec<DispatchedReminder> = claimed
            .into_iter()
            .map(|task| {
                let payload = ReminderPayload::for_task(&task, now);
                let result = self.dispatcher.dispatch(&payload);
                if result.is_delivered() {
                    debug!(
                        "event=reminder module=scheduler status=ok task_id={}",
                        task.id
                    );
                } else {
                    warn!(
                        "event=reminder module=scheduler status=undelivered task_id={} failures={}",
                        task.id,
                        result.failures.len()
                    );
                }
                DispatchedReminder {
                    task_id: task.id,
                    title: task.title,
                    result,
                }
            })
            .collect();

        let report = ScanReport {
            reminders,
            error: None,
        };
        if !report.reminders.is_empty() {
            info!(
                "event=scan module=scheduler status=ok claimed={} delivered={}",
                report.reminders.len(),
                report.delivered()
            );
        }
        report
    }

    /// Starts the background loop: one scan right away, then one per
    /// interval until the handle is stopped or dropped.
    pub fn spawn(self) -> Result<SchedulerHandle, AppError> {
        let (event_tx, event_rx) = mpsc::channel();
        let (stop_tx, stop_rx) = mpsc::channel();

        let thread = std::thread::Builder::new()
            .name("reminder-scheduler".to_string())
            .spawn(move || self.run(&event_tx, &stop_rx))
            .map_err(|err| AppError::io(format!("failed to start scheduler: {err}")))?;

        info!("event=scheduler_start module=scheduler status=ok");
        Ok(SchedulerHandle {
            events: event_rx,
            stop: Some(stop_tx),
            thread: Some(thread),
        })
    }

    fn run(&self, events: &Sender<ReminderEvent>, stop: &Receiver<()>) {
        loop {
            let report = self.scan(OffsetDateTime::now_utc());
            if let Some(err) = report.error {
                let _ = events.send(ReminderEvent::ScanFailed(err));
            }
            for reminder in report.reminders {
                let _ = events.send(ReminderEvent::Reminder(reminder));
            }

            match stop.recv_timeout(self.interval) {
                Err(RecvTimeoutError::Timeout) => continue,
                Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
            }
        }
        info!("event=scheduler_stop module=scheduler status=ok");
    }
}

/// Owns the background scan thread. Dropping the handle stops it.
#[derive(Debug)]
pub struct SchedulerHandle {
    events: Receiver<ReminderEvent>,
    stop: Option<Sender<()>>,
    thread: Option<JoinHandle<()>>,
}

impl SchedulerHandle {
    pub fn events(&self) -> &Receiver<ReminderEvent> {
        &self.events
    }

    /// Waits for an in-flight scan to finish, then hands back the events
    /// nobody has received yet.
    pub fn stop(mut self) -> Vec<ReminderEvent> {
        self.shutdown();
        self.events.try_iter().collect()
    }

    fn shutdown(&mut self) {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
        if let Some(thread) = self.thread.take()
            && thread.join().is_err()
        {
            error!("event=scheduler_stop module=scheduler status=panicked");
        }
    }
}

impl Drop for SchedulerHandle {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::{ReminderEvent, ReminderScheduler};
    use crate::error::AppError;
    use crate::notify::{ChannelKind, DeliveryChannel, NotificationDispatcher, ReminderPayload};
    use crate::store::{NewTask, TaskStore, TaskUpdate};
    use std::sync::{Arc, Mutex};
    use std::time::Duration;
    use tempfile::TempDir;
    use time::macros::datetime;

    struct RecordingChannel {
        fail: bool,
        delivered: Arc<Mutex<Vec<u64>>>,
    }

    impl DeliveryChannel for RecordingChannel {
        fn kind(&self) -> ChannelKind {
            ChannelKind::Local
        }

        fn deliver(&self, payload: &ReminderPayload) -> Result<(), AppError> {
            if self.fail {
                return Err(AppError::delivery("notifier unavailable"));
            }
            self.delivered.lock().unwrap().push(payload.task_id);
            Ok(())
        }
    }

    type Fixture = (ReminderScheduler, Arc<TaskStore>, Arc<Mutex<Vec<u64>>>);

    fn scheduler(dir: &TempDir, fail: bool) -> Fixture {
        let store = Arc::new(TaskStore::open(dir.path().join("tasks.json")).unwrap());
        let delivered = Arc::new(Mutex::new(Vec::new()));
        let dispatcher = NotificationDispatcher::new(vec![Box::new(RecordingChannel {
            fail,
            delivered: Arc::clone(&delivered),
        })]);
        let scheduler = ReminderScheduler::new(
            Arc::clone(&store),
            dispatcher,
            Duration::from_millis(20),
        );
        (scheduler, store, delivered)
    }

    fn quiz() -> NewTask {
        NewTask::new("Quiz 3", "2025-03-10T09:00:00Z")
            .course("MATH 201")
            .reminder("24 hours")
    }

    #[test]
    fn reminder_fires_after_offset_point() {
        let dir = TempDir::new().unwrap();
        let (scheduler, store, delivered) = scheduler(&dir, false);
        let task = store.create(quiz()).unwrap();

        let early = scheduler.scan(datetime!(2025-03-09 08:59 UTC));
        assert!(early.reminders.is_empty());

        let report = scheduler.scan(datetime!(2025-03-09 09:05 UTC));
        assert_eq!(report.reminders.len(), 1);
        assert_eq!(report.reminders[0].task_id, task.id);
        assert_eq!(report.reminders[0].result.delivered_via, Some(ChannelKind::Local));
        assert_eq!(*delivered.lock().unwrap(), vec![task.id]);
        assert!(store.get(task.id).unwrap().notified);
    }

    #[test]
    fn rescans_do_not_repeat_a_reminder() {
        let dir = TempDir::new().unwrap();
        let (scheduler, store, delivered) = scheduler(&dir, false);
        store.create(quiz()).unwrap();

        scheduler.scan(datetime!(2025-03-09 09:05 UTC));
        let second = scheduler.scan(datetime!(2025-03-09 09:06 UTC));
        let third = scheduler.scan(datetime!(2025-03-11 00:00 UTC));

        assert!(second.reminders.is_empty());
        assert!(third.reminders.is_empty());
        assert_eq!(delivered.lock().unwrap().len(), 1);
    }

    #[test]
    fn missed_reminder_is_delivered_once_on_first_scan() {
        let dir = TempDir::new().unwrap();
        let (scheduler, store, delivered) = scheduler(&dir, false);
        let task = store.create(quiz()).unwrap();

        let report = scheduler.scan(datetime!(2025-03-12 10:00 UTC));
        scheduler.scan(datetime!(2025-03-12 10:01 UTC));

        assert_eq!(report.reminders.len(), 1);
        assert_eq!(*delivered.lock().unwrap(), vec![task.id]);
    }

    #[test]
    fn rescheduling_rearms_the_reminder() {
        let dir = TempDir::new().unwrap();
        let (scheduler, store, delivered) = scheduler(&dir, false);
        let task = store.create(quiz()).unwrap();
        scheduler.scan(datetime!(2025-03-09 09:05 UTC));

        store
            .update(
                task.id,
                TaskUpdate {
                    due_at: Some("2025-03-17T09:00:00Z".to_string()),
                    ..TaskUpdate::default()
                },
            )
            .unwrap();

        assert!(scheduler.scan(datetime!(2025-03-10 09:00 UTC)).reminders.is_empty());
        assert_eq!(scheduler.scan(datetime!(2025-03-16 09:00 UTC)).reminders.len(), 1);
        assert_eq!(*delivered.lock().unwrap(), vec![task.id, task.id]);
    }

    #[test]
    fn failed_delivery_still_counts_as_dispatched() {
        let dir = TempDir::new().unwrap();
        let (scheduler, store, _) = scheduler(&dir, true);
        let task = store.create(quiz()).unwrap();

        let report = scheduler.scan(datetime!(2025-03-09 09:05 UTC));

        assert_eq!(report.reminders.len(), 1);
        assert!(!report.reminders[0].result.is_delivered());
        assert_eq!(report.delivered(), 0);
        assert!(store.get(task.id).unwrap().notified);
        assert!(scheduler.scan(datetime!(2025-03-09 09:06 UTC)).reminders.is_empty());
    }

    #[test]
    fn completed_and_reminderless_tasks_are_ignored() {
        let dir = TempDir::new().unwrap();
        let (scheduler, store, delivered) = scheduler(&dir, false);
        let done = store.create(quiz()).unwrap();
        store.complete(done.id).unwrap();
        store
            .create(NewTask::new("Reading", "2025-03-10T09:00:00Z"))
            .unwrap();

        let report = scheduler.scan(datetime!(2025-03-12 00:00 UTC));

        assert!(report.reminders.is_empty());
        assert!(report.error.is_none());
        assert!(delivered.lock().unwrap().is_empty());
    }

    #[test]
    fn store_failure_is_reported_not_raised() {
        let dir = TempDir::new().unwrap();
        let (scheduler, store, delivered) = scheduler(&dir, false);
        store.create(quiz()).unwrap();
        std::fs::write(store.path(), "not json").unwrap();

        let report = scheduler.scan(datetime!(2025-03-09 09:05 UTC));

        assert!(report.reminders.is_empty());
        assert_eq!(report.error.unwrap().code(), "invalid_data");
        assert!(delivered.lock().unwrap().is_empty());
    }

    #[test]
    fn background_loop_publishes_events_and_stops() {
        let dir = TempDir::new().unwrap();
        let (scheduler, store, delivered) = scheduler(&dir, false);
        let task = store
            .create(
                NewTask::new("Overdue lab", "2020-01-01T00:00:00Z")
                    .reminder("1 hour"),
            )
            .unwrap();

        let handle = scheduler.spawn().unwrap();
        let event = handle
            .events()
            .recv_timeout(Duration::from_secs(5))
            .unwrap();
        handle.stop();

        match event {
            ReminderEvent::Reminder(reminder) => assert_eq!(reminder.task_id, task.id),
            other => panic!("unexpected event: {other:?}"),
        }
        assert_eq!(*delivered.lock().unwrap(), vec![task.id]);
    }
}
