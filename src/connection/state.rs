//! Connection status and statistics.

use std::fmt;
use std::time::{Duration, Instant};

/// Connection status of a stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ConnectionStatus {
    /// Not connected; initial state and the result of `disconnect()`.
    #[default]
    Disconnected,
    /// Opening the stream.
    Connecting,
    /// Stream is open and delivering messages.
    Connected,
    /// Waiting to retry after a failure.
    Reconnecting,
    /// Reconnect budget exhausted; requires a new `connect()`.
    Error,
}

impl ConnectionStatus {
    /// Check if the stream is usable.
    pub fn is_connected(&self) -> bool {
        *self == ConnectionStatus::Connected
    }

    /// Check if a connection attempt is in progress or scheduled.
    pub fn is_connecting(&self) -> bool {
        matches!(
            self,
            ConnectionStatus::Connecting | ConnectionStatus::Reconnecting
        )
    }

    /// Check if the stream has failed terminally.
    pub fn is_failed(&self) -> bool {
        *self == ConnectionStatus::Error
    }

    /// Lower-case name, as shown in a status indicator.
    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectionStatus::Disconnected => "disconnected",
            ConnectionStatus::Connecting => "connecting",
            ConnectionStatus::Connected => "connected",
            ConnectionStatus::Reconnecting => "reconnecting",
            ConnectionStatus::Error => "error",
        }
    }
}

impl fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What became of one inbound frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameOutcome {
    /// A valid reading reached the message callback.
    Delivered,
    /// The frame failed validation.
    Rejected,
    /// The server sent an `error` envelope.
    RemoteError,
    /// A valid envelope with nothing to deliver (`connected`, unknown types).
    Ignored,
}

/// Counters for one [`ConnectionManager`](super::ConnectionManager).
///
/// Counters accumulate across sessions; they are never reset by
/// `connect()` or `disconnect()`.
#[derive(Debug, Clone, Default)]
pub struct ConnectionStats {
    /// Successful stream opens, reopens after a drop included.
    pub connect_count: u64,
    /// Failed opens plus drops of an open stream.
    pub failure_count: u64,
    /// Reconnects scheduled by the backoff policy.
    pub reconnect_count: u64,
    /// Text and binary frames received, whatever their outcome.
    pub frames_received: u64,
    /// Readings that passed validation and reached the message callback.
    pub readings_delivered: u64,
    /// Frames that failed validation.
    pub messages_rejected: u64,
    /// `error` envelopes sent by the server.
    pub remote_errors: u64,
    /// Payload bytes of all received frames, rejected ones included.
    pub bytes_received: u64,
    /// When the stream last opened.
    pub last_connected: Option<Instant>,
    /// When an open stream last closed, for any reason.
    pub last_disconnected: Option<Instant>,
    /// When the last open failure or drop happened.
    pub last_error: Option<Instant>,
}

impl ConnectionStats {
    /// The stream opened.
    pub fn record_connect(&mut self) {
        self.connect_count += 1;
        self.last_connected = Some(Instant::now());
    }

    /// An open stream closed.
    pub fn record_disconnect(&mut self) {
        self.last_disconnected = Some(Instant::now());
    }

    /// An open failed or an open stream dropped.
    pub fn record_failure(&mut self) {
        self.failure_count += 1;
        self.last_error = Some(Instant::now());
    }

    /// A reconnect was scheduled.
    pub fn record_reconnect(&mut self) {
        self.reconnect_count += 1;
    }

    /// A data frame of `bytes` bytes arrived and was handled as `outcome`.
    pub fn record_frame(&mut self, bytes: usize, outcome: FrameOutcome) {
        self.frames_received += 1;
        self.bytes_received += bytes as u64;
        match outcome {
            FrameOutcome::Delivered => self.readings_delivered += 1,
            FrameOutcome::Rejected => self.messages_rejected += 1,
            FrameOutcome::RemoteError => self.remote_errors += 1,
            FrameOutcome::Ignored => {}
        }
    }

    /// Share of received frames that failed validation.
    pub fn rejection_rate(&self) -> Option<f64> {
        (self.frames_received > 0)
            .then(|| self.messages_rejected as f64 / self.frames_received as f64)
    }

    /// How long the current stream has been open, or `None` if it is closed.
    pub fn uptime(&self) -> Option<Duration> {
        let opened = self.last_connected?;
        match self.last_disconnected {
            Some(closed) if closed >= opened => None,
            _ => Some(opened.elapsed()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connection_status() {
        assert!(ConnectionStatus::Connected.is_connected());
        assert!(!ConnectionStatus::Disconnected.is_connected());
        assert!(ConnectionStatus::Connecting.is_connecting());
        assert!(ConnectionStatus::Reconnecting.is_connecting());
        assert!(ConnectionStatus::Error.is_failed());
        assert_eq!(ConnectionStatus::default(), ConnectionStatus::Disconnected);
        assert_eq!(ConnectionStatus::Reconnecting.to_string(), "reconnecting");
    }

    #[test]
    fn test_connection_stats() {
        let mut stats = ConnectionStats::default();
        assert_eq!(stats.uptime(), None);
        assert_eq!(stats.rejection_rate(), None);

        stats.record_connect();
        assert_eq!(stats.connect_count, 1);
        assert!(stats.uptime().is_some());

        stats.record_frame(120, FrameOutcome::Delivered);
        stats.record_frame(80, FrameOutcome::Rejected);
        stats.record_frame(40, FrameOutcome::RemoteError);
        stats.record_frame(20, FrameOutcome::Ignored);
        assert_eq!(stats.frames_received, 4);
        assert_eq!(stats.bytes_received, 260);
        assert_eq!(stats.readings_delivered, 1);
        assert_eq!(stats.messages_rejected, 1);
        assert_eq!(stats.remote_errors, 1);
        assert_eq!(stats.rejection_rate(), Some(0.25));

        stats.record_failure();
        stats.record_disconnect();
        stats.record_reconnect();
        assert_eq!(stats.failure_count, 1);
        assert_eq!(stats.reconnect_count, 1);
        assert!(stats.last_error.is_some());
        // closed streams have no uptime
        assert_eq!(stats.uptime(), None);
    }
}
