//! Telemetry stream with automatic reconnect.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use futures_util::StreamExt;
use parking_lot::{Mutex, ReentrantMutex};
use tokio::net::TcpStream;
use tokio::runtime::Handle;
use tokio::sync::watch;
use tokio::time::{sleep, timeout};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::envelope::{Envelope, parse_envelope};
use crate::error::{ConfigError, StreamError, ValidationError};

use super::broadcast::{EventHandlers, StatusBroadcaster};
use super::config::{ReconnectPolicy, StreamConfig};
use super::state::{ConnectionStats, ConnectionStatus, FrameOutcome};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// A telemetry stream client that reconnects with exponential backoff.
///
/// Each `connect()` starts a session: a background task that opens the
/// stream, validates every inbound message and, after a failure, sleeps
/// for the backoff delay before trying again. The task owns the socket and
/// the pending reconnect timer; `disconnect()` cancels both.
///
/// Callbacks are serialized: at most one runs at a time, in the order the
/// underlying events happened. Once `disconnect()` returns, no callback of
/// the ended session will run. If a callback is executing on another thread
/// when `disconnect()` is called, `disconnect()` waits for it to return.
pub struct ConnectionManager {
    /// Connection configuration.
    config: StreamConfig,
    /// Resolved stream URL.
    url: String,
    /// State shared with the session task.
    shared: Arc<Shared>,
}

struct Shared {
    /// Held while callbacks run and while sessions start or stop.
    dispatch: ReentrantMutex<()>,
    inner: Mutex<Inner>,
    status: StatusBroadcaster,
}

struct Inner {
    /// Bumped on every connect/disconnect; events from older sessions are dropped.
    session: u64,
    should_reconnect: bool,
    /// Reconnects scheduled since the last successful open.
    attempts: u32,
    handlers: Option<EventHandlers>,
    /// Cancels the session task, including a pending reconnect sleep.
    cancel: Option<CancellationToken>,
    stats: ConnectionStats,
}

impl Inner {
    /// Handlers of `session`, or `None` if that session has ended.
    fn live_handlers(&self, session: u64) -> Option<EventHandlers> {
        if self.session == session {
            self.handlers.clone()
        } else {
            None
        }
    }

    /// Invalidate the running session and cancel its task.
    fn end_session(&mut self) {
        self.session += 1;
        if let Some(token) = self.cancel.take() {
            token.cancel();
        }
    }
}

/// How a connected session stopped reading.
enum SessionEnd {
    /// The session was cancelled or superseded.
    Stopped,
    /// The server closed with a normal closure code.
    NormalClose,
    /// The stream failed or closed abnormally.
    Abnormal(String),
}

impl ConnectionManager {
    /// Create a manager. Nothing is opened until [`connect`](Self::connect).
    pub fn new(config: StreamConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let url = config.url()?.to_string();

        Ok(Self {
            config,
            url,
            shared: Arc::new(Shared {
                dispatch: ReentrantMutex::new(()),
                inner: Mutex::new(Inner {
                    session: 0,
                    should_reconnect: false,
                    attempts: 0,
                    handlers: None,
                    cancel: None,
                    stats: ConnectionStats::default(),
                }),
                status: StatusBroadcaster::new(),
            }),
        })
    }

    /// Get the connection configuration.
    pub fn config(&self) -> &StreamConfig {
        &self.config
    }

    /// Get the stream URL.
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Get the current connection status.
    pub fn status(&self) -> ConnectionStatus {
        self.shared.status.current()
    }

    /// Check if the stream is open.
    pub fn is_connected(&self) -> bool {
        self.status().is_connected()
    }

    /// Get connection statistics.
    pub fn stats(&self) -> ConnectionStats {
        self.shared.inner.lock().stats.clone()
    }

    /// Reconnects scheduled since the last successful open.
    pub fn reconnect_attempts(&self) -> u32 {
        self.shared.inner.lock().attempts
    }

    /// Watch status changes through a channel instead of a callback.
    pub fn subscribe_status(&self) -> watch::Receiver<ConnectionStatus> {
        self.shared.status.subscribe()
    }

    /// Start a session and open the stream.
    ///
    /// Returns immediately; progress is reported through `handlers`. Calling
    /// this while a session is running replaces it and reopens the stream.
    /// Fails only when called outside a tokio runtime.
    pub fn connect(&self, handlers: EventHandlers) -> Result<(), ConfigError> {
        let runtime = Handle::try_current().map_err(|_| ConfigError::NoRuntime)?;

        let _dispatch = self.shared.dispatch.lock();
        let (session, cancel) = {
            let mut inner = self.shared.inner.lock();
            inner.end_session();
            if self.shared.status.current().is_connected() {
                inner.stats.record_disconnect();
            }
            inner.should_reconnect = true;
            inner.attempts = 0;
            inner.handlers = Some(handlers.clone());
            let cancel = CancellationToken::new();
            inner.cancel = Some(cancel.clone());
            (inner.session, cancel)
        };

        info!(url = %self.url, "connecting telemetry stream");
        self.shared.set_status(ConnectionStatus::Connecting, Some(&handlers));

        runtime.spawn(run_session(
            self.shared.clone(),
            self.config.clone(),
            self.url.clone(),
            session,
            cancel,
        ));
        Ok(())
    }

    /// End the session: cancel any pending reconnect, close the stream with
    /// a normal closure and move to `Disconnected`.
    ///
    /// A new [`connect`](Self::connect) is required to resume.
    pub fn disconnect(&self) {
        let _dispatch = self.shared.dispatch.lock();
        let handlers = {
            let mut inner = self.shared.inner.lock();
            inner.end_session();
            inner.should_reconnect = false;
            inner.attempts = 0;
            if self.shared.status.current().is_connected() {
                inner.stats.record_disconnect();
            }
            inner.handlers.clone()
        };

        info!(url = %self.url, "disconnecting telemetry stream");
        self.shared
            .set_status(ConnectionStatus::Disconnected, handlers.as_ref());
    }
}

impl Drop for ConnectionManager {
    fn drop(&mut self) {
        let mut inner = self.shared.inner.lock();
        inner.should_reconnect = false;
        inner.end_session();
    }
}

impl fmt::Debug for ConnectionManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionManager")
            .field("url", &self.url)
            .field("status", &self.status())
            .finish()
    }
}

impl Shared {
    fn set_status(&self, status: ConnectionStatus, handlers: Option<&EventHandlers>) {
        if self.status.transition(status) {
            debug!(%status, "stream status changed");
            if let Some(handlers) = handlers {
                handlers.status(status);
            }
        }
    }

    /// The stream opened. Returns `false` if the session is over.
    fn opened(&self, session: u64) -> bool {
        let _dispatch = self.dispatch.lock();
        let handlers = {
            let mut inner = self.inner.lock();
            let Some(handlers) = inner.live_handlers(session) else {
                return false;
            };
            inner.attempts = 0;
            inner.stats.record_connect();
            handlers
        };

        info!("telemetry stream connected");
        self.set_status(ConnectionStatus::Connected, Some(&handlers));
        true
    }

    /// Route one inbound message. Returns `false` if the session is over.
    fn deliver(
        &self,
        session: u64,
        bytes: usize,
        parsed: Result<Envelope, ValidationError>,
    ) -> bool {
        let _dispatch = self.dispatch.lock();
        let handlers = {
            let mut inner = self.inner.lock();
            let Some(handlers) = inner.live_handlers(session) else {
                return false;
            };
            let outcome = match &parsed {
                Ok(Envelope::Telemetry(_)) => FrameOutcome::Delivered,
                Ok(Envelope::Error { .. }) => FrameOutcome::RemoteError,
                Ok(_) => FrameOutcome::Ignored,
                Err(_) => FrameOutcome::Rejected,
            };
            inner.stats.record_frame(bytes, outcome);
            handlers
        };

        match parsed {
            Ok(Envelope::Telemetry(reading)) => handlers.message(reading),
            Ok(Envelope::Error { message, data }) => {
                warn!(%message, "server reported an error on the stream");
                handlers.error(StreamError::Remote { message, data });
            }
            Ok(Envelope::Connected(_)) => debug!("server acknowledged the stream"),
            Ok(Envelope::Other { kind, .. }) => debug!(%kind, "ignoring unhandled envelope"),
            Err(e) => {
                warn!(error = %e, "rejected stream message");
                handlers.error(StreamError::Validation(e));
            }
        }
        true
    }

    /// The open failed or the stream broke. Returns `false` if the session is over.
    fn failed(&self, session: u64, reason: String) -> bool {
        let _dispatch = self.dispatch.lock();
        let handlers = {
            let mut inner = self.inner.lock();
            let Some(handlers) = inner.live_handlers(session) else {
                return false;
            };
            inner.stats.record_failure();
            if self.status.current().is_connected() {
                inner.stats.record_disconnect();
            }
            handlers
        };

        warn!(%reason, "telemetry stream failure");
        handlers.error(StreamError::Connection(reason));
        true
    }

    /// The server closed normally; the session ends without reconnecting.
    fn closed_normally(&self, session: u64) {
        let _dispatch = self.dispatch.lock();
        let handlers = {
            let mut inner = self.inner.lock();
            let Some(handlers) = inner.live_handlers(session) else {
                return;
            };
            inner.attempts = 0;
            inner.cancel = None;
            inner.stats.record_disconnect();
            handlers
        };

        info!("telemetry stream closed by server");
        self.set_status(ConnectionStatus::Disconnected, Some(&handlers));
    }

    /// Decide whether to retry. Returns the delay to wait, or `None` when the
    /// session is over or the reconnect budget is spent.
    fn schedule_reconnect(&self, session: u64, policy: &ReconnectPolicy) -> Option<Duration> {
        let _dispatch = self.dispatch.lock();
        let (scheduled, handlers) = {
            let mut inner = self.inner.lock();
            let handlers = inner.live_handlers(session)?;
            if !inner.should_reconnect {
                return None;
            }
            let attempt = inner.attempts;
            if policy.should_retry(attempt) {
                inner.attempts += 1;
                inner.stats.record_reconnect();
                (Some((attempt, policy.delay_for_attempt(attempt))), handlers)
            } else {
                inner.cancel = None;
                (None, handlers)
            }
        };

        match scheduled {
            Some((attempt, delay)) => {
                info!(
                    attempt = attempt + 1,
                    max_attempts = policy.max_attempts,
                    delay_ms = delay.as_millis() as u64,
                    "scheduling reconnect"
                );
                let status = if attempt == 0 {
                    ConnectionStatus::Connecting
                } else {
                    ConnectionStatus::Reconnecting
                };
                self.set_status(status, Some(&handlers));
                Some(delay)
            }
            None => {
                warn!(
                    attempts = policy.max_attempts,
                    "reconnect attempts exhausted, giving up"
                );
                self.set_status(ConnectionStatus::Error, Some(&handlers));
                // the status callback may already have started a new session
                if self.inner.lock().session == session {
                    handlers.error(StreamError::ReconnectExhausted {
                        attempts: policy.max_attempts,
                    });
                }
                None
            }
        }
    }
}

/// Drive one session until it is cancelled, closed normally or gives up.
async fn run_session(
    shared: Arc<Shared>,
    config: StreamConfig,
    url: String,
    session: u64,
    cancel: CancellationToken,
) {
    loop {
        let opened = tokio::select! {
            _ = cancel.cancelled() => return,
            result = timeout(config.connect_timeout, connect_async(url.as_str())) => result,
        };

        let alive = match opened {
            Ok(Ok((mut ws, _response))) => {
                if !shared.opened(session) {
                    close(&mut ws, &config).await;
                    return;
                }
                match read_frames(&shared, session, &mut ws, &cancel, &config).await {
                    SessionEnd::Stopped => return,
                    SessionEnd::NormalClose => {
                        shared.closed_normally(session);
                        return;
                    }
                    SessionEnd::Abnormal(reason) => shared.failed(session, reason),
                }
            }
            Ok(Err(e)) => shared.failed(session, format!("open failed: {e}")),
            Err(_) => shared.failed(
                session,
                format!("open timed out after {:?}", config.connect_timeout),
            ),
        };
        if !alive {
            return;
        }

        let Some(delay) = shared.schedule_reconnect(session, &config.reconnect) else {
            return;
        };
        tokio::select! {
            _ = cancel.cancelled() => return,
            _ = sleep(delay) => {}
        }
    }
}

async fn read_frames(
    shared: &Shared,
    session: u64,
    ws: &mut WsStream,
    cancel: &CancellationToken,
    config: &StreamConfig,
) -> SessionEnd {
    loop {
        let frame = tokio::select! {
            _ = cancel.cancelled() => None,
            frame = ws.next() => Some(frame),
        };
        let Some(frame) = frame else {
            close(ws, config).await;
            return SessionEnd::Stopped;
        };

        let delivered = match frame {
            Some(Ok(Message::Text(text))) => {
                debug!(bytes = text.len(), "stream frame");
                shared.deliver(session, text.len(), parse_envelope(text.as_str()))
            }
            Some(Ok(Message::Binary(data))) => {
                let parsed = std::str::from_utf8(&data)
                    .map_err(|e| {
                        ValidationError::Malformed(format!("binary frame is not UTF-8: {e}"))
                    })
                    .and_then(parse_envelope);
                shared.deliver(session, data.len(), parsed)
            }
            Some(Ok(Message::Close(frame))) => {
                return match frame {
                    Some(frame) if frame.code == CloseCode::Normal => SessionEnd::NormalClose,
                    Some(frame) => SessionEnd::Abnormal(format!(
                        "closed by server with code {}: {}",
                        u16::from(frame.code),
                        frame.reason.as_str()
                    )),
                    None => SessionEnd::Abnormal("closed by server without a status code".into()),
                };
            }
            // ping/pong are answered by the transport
            Some(Ok(_)) => true,
            Some(Err(e)) => return SessionEnd::Abnormal(format!("stream error: {e}")),
            None => return SessionEnd::Abnormal("stream ended without a close frame".into()),
        };

        if !delivered {
            close(ws, config).await;
            return SessionEnd::Stopped;
        }
    }
}

/// Close with a normal closure code, bounded by the close timeout.
async fn close(ws: &mut WsStream, config: &StreamConfig) {
    let frame = CloseFrame {
        code: CloseCode::Normal,
        reason: "client disconnect".into(),
    };
    match timeout(config.close_timeout, ws.close(Some(frame))).await {
        Ok(Ok(())) => debug!("telemetry stream closed"),
        Ok(Err(e)) => debug!(error = %e, "error while closing telemetry stream"),
        Err(_) => debug!("close handshake timed out"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_validates_config() {
        let bad = StreamConfig::new("http://localhost:8000");
        assert!(matches!(
            ConnectionManager::new(bad),
            Err(ConfigError::InvalidUrl { .. })
        ));

        let bad = StreamConfig::default()
            .with_reconnect_policy(ReconnectPolicy::default().with_multiplier(0.5));
        assert!(matches!(
            ConnectionManager::new(bad),
            Err(ConfigError::InvalidPolicy(_))
        ));
    }

    #[test]
    fn test_connect_requires_runtime() {
        let manager = ConnectionManager::new(StreamConfig::default()).unwrap();
        assert_eq!(
            manager.connect(EventHandlers::new(|_| {})),
            Err(ConfigError::NoRuntime)
        );
        assert_eq!(manager.status(), ConnectionStatus::Disconnected);
    }

    #[test]
    fn test_idle_disconnect_is_silent() {
        let manager = ConnectionManager::new(StreamConfig::default()).unwrap();
        manager.disconnect();
        assert_eq!(manager.status(), ConnectionStatus::Disconnected);
        assert!(!manager.is_connected());
        assert_eq!(manager.stats().last_disconnected, None);
        assert_eq!(manager.url(), "ws://localhost:8000/ws/telemetry");
    }
}
