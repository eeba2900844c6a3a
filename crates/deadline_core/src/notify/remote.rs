use crate::config::RemotePushConfig;
use crate::error::AppError;
use crate::notify::{ChannelKind, DeliveryChannel, ReminderPayload};
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::mpsc::{self, RecvTimeoutError};
use std::time::Duration;

/// Host-provided push transport (a cloud messaging client, for example).
pub trait PushTransport: Send + Sync {
    fn send(&self, target: &str, title: &str, body: &str) -> Result<(), AppError>;
}

/// Remote push channel. Any missing piece of configuration is reported as a
/// delivery failure so the dispatcher moves on to the next channel.
pub struct RemoteChannel {
    transport: Option<Arc<dyn PushTransport>>,
    target: Option<String>,
    credentials_path: Option<PathBuf>,
    timeout: Duration,
}

impl RemoteChannel {
    pub fn new(transport: Arc<dyn PushTransport>, target: impl Into<String>) -> Self {
        Self {
            transport: Some(transport),
            target: Some(target.into()),
            credentials_path: None,
            timeout: Duration::from_millis(RemotePushConfig::DEFAULT_TIMEOUT_MS),
        }
    }

    pub fn from_config(
        config: &RemotePushConfig,
        transport: Option<Arc<dyn PushTransport>>,
    ) -> Self {
        Self {
            transport,
            target: config.target.clone(),
            credentials_path: config.credentials_path.clone(),
            timeout: Duration::from_millis(config.timeout_ms),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    fn ready(&self) -> Result<(Arc<dyn PushTransport>, String), AppError> {
        let transport = self
            .transport
            .clone()
            .ok_or_else(|| AppError::delivery("remote push transport is not configured"))?;

        let target = self
            .target
            .as_deref()
            .map(str::trim)
            .filter(|target| !target.is_empty())
            .ok_or_else(|| AppError::delivery("remote push target is not configured"))?;

        if let Some(path) = self.credentials_path.as_deref()
            && !path.exists()
        {
            return Err(AppError::delivery(format!(
                "remote push credentials not found at {}",
                path.display()
            )));
        }

        Ok((transport, target.to_string()))
    }
}

impl DeliveryChannel for RemoteChannel {
    fn kind(&self) -> ChannelKind {
        ChannelKind::Remote
    }

    /// Runs the transport on a helper thread and gives up after the
    /// configured timeout. A timed-out send is abandoned, not cancelled.
    fn deliver(&self, payload: &ReminderPayload) -> Result<(), AppError> {
        let (transport, target) = self.ready()?;
        let title = payload.title.clone();
        let body = payload.body.clone();
        let (sender, receiver) = mpsc::channel();

        std::thread::Builder::new()
            .name("remote-push".to_string())
            .spawn(move || {
                let _ = sender.send(transport.send(&target, &title, &body));
            })
            .map_err(|err| AppError::delivery(format!("failed to start remote push: {err}")))?;

        match receiver.recv_timeout(self.timeout) {
            Ok(Ok(())) => Ok(()),
            Ok(Err(err)) => Err(AppError::delivery(err.message())),
            Err(RecvTimeoutError::Timeout) => Err(AppError::delivery(format!(
                "remote push timed out after {} ms",
                self.timeout.as_millis()
            ))),
            Err(RecvTimeoutError::Disconnected) => {
                Err(AppError::delivery("remote push transport stopped unexpectedly"))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{PushTransport, RemoteChannel};
    use crate::config::RemotePushConfig;
    use crate::error::AppError;
    use crate::notify::{DeliveryChannel, ReminderPayload};
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    #[derive(Default)]
    struct RecordingTransport {
        sent: Mutex<Vec<(String, String, String)>>,
    }

    impl PushTransport for RecordingTransport {
        fn send(&self, target: &str, title: &str, body: &str) -> Result<(), AppError> {
            self.sent
                .lock()
                .unwrap()
                .push((target.to_string(), title.to_string(), body.to_string()));
            Ok(())
        }
    }

    struct FailingTransport;

    impl PushTransport for FailingTransport {
        fn send(&self, _target: &str, _title: &str, _body: &str) -> Result<(), AppError> {
            Err(AppError::io("connection refused"))
        }
    }

    struct SlowTransport;

    impl PushTransport for SlowTransport {
        fn send(&self, _target: &str, _title: &str, _body: &str) -> Result<(), AppError> {
            std::thread::sleep(Duration::from_millis(500));
            Ok(())
        }
    }

    fn payload() -> ReminderPayload {
        ReminderPayload {
            task_id: 2,
            title: "Reminder: Midterm".to_string(),
            body: "BIO 110: due 2025-03-20 13:00 (in 2 days)".to_string(),
        }
    }

    #[test]
    fn sends_payload_to_target() {
        let transport = Arc::new(RecordingTransport::default());
        let channel = RemoteChannel::new(transport.clone(), "device-token");

        channel.deliver(&payload()).unwrap();

        let sent = transport.sent.lock().unwrap();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].0, "device-token");
        assert_eq!(sent[0].1, "Reminder: Midterm");
    }

    #[test]
    fn missing_transport_is_a_failure() {
        let config = RemotePushConfig {
            enabled: true,
            target: Some("device-token".to_string()),
            ..RemotePushConfig::default()
        };
        let err = RemoteChannel::from_config(&config, None)
            .deliver(&payload())
            .unwrap_err();

        assert_eq!(err.code(), "delivery_failure");
        assert!(err.message().contains("transport"));
    }

    #[test]
    fn missing_target_or_credentials_is_a_failure() {
        let transport: Arc<dyn PushTransport> = Arc::new(RecordingTransport::default());

        let no_target = RemotePushConfig {
            enabled: true,
            ..RemotePushConfig::default()
        };
        let err = RemoteChannel::from_config(&no_target, Some(transport.clone()))
            .deliver(&payload())
            .unwrap_err();
        assert!(err.message().contains("target"));

        let missing_credentials = RemotePushConfig {
            enabled: true,
            target: Some("device-token".to_string()),
            credentials_path: Some("/nonexistent/push-credentials.json".into()),
            ..RemotePushConfig::default()
        };
        let err = RemoteChannel::from_config(&missing_credentials, Some(transport))
            .deliver(&payload())
            .unwrap_err();
        assert!(err.message().contains("credentials"));
    }

    #[test]
    fn transport_error_is_a_failure() {
        let channel = RemoteChannel::new(Arc::new(FailingTransport), "device-token");
        let err = channel.deliver(&payload()).unwrap_err();

        assert_eq!(err.code(), "delivery_failure");
        assert!(err.message().contains("connection refused"));
    }

    #[test]
    fn slow_transport_times_out() {
        let channel = RemoteChannel::new(Arc::new(SlowTransport), "device-token")
            .with_timeout(Duration::from_millis(20));
        let err = channel.deliver(&payload()).unwrap_err();

        assert!(err.message().contains("timed out"));
    }
}
