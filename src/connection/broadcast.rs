//! Callback registration and status fan-out.

use std::fmt;
use std::sync::Arc;

use tokio::sync::watch;

use crate::envelope::TelemetryReading;
use crate::error::StreamError;

use super::state::ConnectionStatus;

type MessageFn = dyn Fn(TelemetryReading) + Send + Sync;
type StatusFn = dyn Fn(ConnectionStatus) + Send + Sync;
type ErrorFn = dyn Fn(StreamError) + Send + Sync;

/// Callbacks supplied to [`ConnectionManager::connect`](super::ConnectionManager::connect).
///
/// Callbacks run synchronously on the connection's task and should return
/// quickly; hand work off to a channel if it may block.
#[derive(Clone)]
pub struct EventHandlers {
    on_message: Arc<MessageFn>,
    on_status: Option<Arc<StatusFn>>,
    on_error: Option<Arc<ErrorFn>>,
}

impl EventHandlers {
    /// Create handlers with only a message callback.
    pub fn new<F>(on_message: F) -> Self
    where
        F: Fn(TelemetryReading) + Send + Sync + 'static,
    {
        Self {
            on_message: Arc::new(on_message),
            on_status: None,
            on_error: None,
        }
    }

    /// Set the status callback.
    pub fn on_status<F>(mut self, f: F) -> Self
    where
        F: Fn(ConnectionStatus) + Send + Sync + 'static,
    {
        self.on_status = Some(Arc::new(f));
        self
    }

    /// Set the error callback.
    pub fn on_error<F>(mut self, f: F) -> Self
    where
        F: Fn(StreamError) + Send + Sync + 'static,
    {
        self.on_error = Some(Arc::new(f));
        self
    }

    pub(crate) fn message(&self, reading: TelemetryReading) {
        (self.on_message)(reading);
    }

    pub(crate) fn status(&self, status: ConnectionStatus) {
        if let Some(f) = &self.on_status {
            f(status);
        }
    }

    pub(crate) fn error(&self, error: StreamError) {
        if let Some(f) = &self.on_error {
            f(error);
        }
    }
}

impl fmt::Debug for EventHandlers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventHandlers")
            .field("on_status", &self.on_status.is_some())
            .field("on_error", &self.on_error.is_some())
            .finish()
    }
}

/// Holds the current status and tells observers when it changes.
///
/// Identical consecutive values are swallowed, so every notification is a
/// real transition.
#[derive(Debug)]
pub struct StatusBroadcaster {
    tx: watch::Sender<ConnectionStatus>,
}

impl Default for StatusBroadcaster {
    fn default() -> Self {
        Self::new()
    }
}

impl StatusBroadcaster {
    /// Create a broadcaster starting at `Disconnected`.
    pub fn new() -> Self {
        let (tx, _) = watch::channel(ConnectionStatus::Disconnected);
        Self { tx }
    }

    /// The current status.
    pub fn current(&self) -> ConnectionStatus {
        *self.tx.borrow()
    }

    /// Move to `status`. Returns `true` if the value actually changed.
    pub fn transition(&self, status: ConnectionStatus) -> bool {
        self.tx.send_if_modified(|current| {
            if *current == status {
                false
            } else {
                *current = status;
                true
            }
        })
    }

    /// Watch status changes without registering a callback.
    pub fn subscribe(&self) -> watch::Receiver<ConnectionStatus> {
        self.tx.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;

    #[test]
    fn test_transition_dedups() {
        let broadcaster = StatusBroadcaster::new();
        assert_eq!(broadcaster.current(), ConnectionStatus::Disconnected);
        assert!(!broadcaster.transition(ConnectionStatus::Disconnected));
        assert!(broadcaster.transition(ConnectionStatus::Connecting));
        assert!(!broadcaster.transition(ConnectionStatus::Connecting));
        assert!(broadcaster.transition(ConnectionStatus::Connected));
        assert_eq!(broadcaster.current(), ConnectionStatus::Connected);
    }

    #[tokio::test]
    async fn test_subscribe_sees_changes() {
        let broadcaster = StatusBroadcaster::new();
        let mut rx = broadcaster.subscribe();
        broadcaster.transition(ConnectionStatus::Reconnecting);
        rx.changed().await.unwrap();
        assert_eq!(*rx.borrow(), ConnectionStatus::Reconnecting);
    }

    #[test]
    fn test_optional_handlers() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let handlers = EventHandlers::new(|_| {}).on_status(move |s| sink.lock().unwrap().push(s));

        handlers.status(ConnectionStatus::Connected);
        // no error callback registered: silently dropped
        handlers.error(StreamError::Connection("refused".into()));

        assert_eq!(*seen.lock().unwrap(), vec![ConnectionStatus::Connected]);
    }
}
