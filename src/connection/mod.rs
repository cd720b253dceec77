//! Streaming connection management.
//!
//! This module provides:
//! - A WebSocket telemetry client that reconnects with exponential backoff
//! - A status state machine with deduplicated change notifications
//! - Configuration for the reconnect policy and handshake timeouts
//!
//! # Example
//!
//! ```no_run
//! use telemetry_client::connection::{
//!     ConnectionManager, EventHandlers, ReconnectPolicy, StreamConfig,
//! };
//! use std::time::Duration;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = StreamConfig::new("ws://localhost:8000").with_reconnect_policy(
//!     ReconnectPolicy::default()
//!         .with_max_attempts(5)
//!         .with_initial_delay(Duration::from_millis(500)),
//! );
//!
//! let manager = ConnectionManager::new(config)?;
//! manager.connect(
//!     EventHandlers::new(|reading| println!("{} kW", reading.power_load_kw))
//!         .on_status(|status| println!("stream is {status}"))
//!         .on_error(|err| eprintln!("{err}")),
//! )?;
//!
//! // ... later
//! manager.disconnect();
//! # Ok(())
//! # }
//! ```
//!
//! # Status transitions
//!
//! ```text
//! Disconnected --connect()--> Connecting --open--> Connected
//!      ^                          |                   |
//!      |                      failure            failure
//!      |                          v                   v
//!      +--disconnect()------ Reconnecting <-----------+
//!                                 |
//!                       attempts exhausted
//!                                 v
//!                               Error
//! ```

mod broadcast;
mod config;
mod manager;
mod state;

pub use broadcast::{EventHandlers, StatusBroadcaster};
pub use config::{
    DEFAULT_BACKOFF_MULTIPLIER, DEFAULT_INITIAL_DELAY_MS, DEFAULT_MAX_ATTEMPTS,
    DEFAULT_MAX_DELAY_MS, DEFAULT_STREAM_URL, ReconnectPolicy, StreamConfig, TELEMETRY_PATH,
};
pub use manager::ConnectionManager;
pub use state::{ConnectionStats, ConnectionStatus, FrameOutcome};
