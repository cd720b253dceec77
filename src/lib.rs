//! Client for a real-time generator telemetry backend.
//!
//! This crate provides the client side of a telemetry pipeline: a streaming
//! connection that pushes validated readings to the application, and a
//! request client for historical data and optimization calls.
//!
//! # Features
//!
//! - WebSocket stream with automatic reconnect and exponential backoff
//! - Strict validation of every inbound message before delivery
//! - Deduplicated connection status notifications
//! - Request client with timeouts, classified errors and bounded retry
//!
//! # Example
//!
//! ```no_run
//! use telemetry_client::{ClientConfig, EventHandlers};
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let (stream, api) = ClientConfig::from_env().build()?;
//!
//! stream.connect(
//!     EventHandlers::new(|reading| {
//!         println!("{} {} kW {}", reading.timestamp, reading.power_load_kw, reading.status)
//!     })
//!     .on_status(|status| println!("stream {status}")),
//! )?;
//!
//! let history = api.history(None, None).await?;
//! println!("{} readings in the last day", history.count);
//!
//! stream.disconnect();
//! # Ok(())
//! # }
//! ```
//!
//! # Wire format
//!
//! Every stream message is a JSON envelope:
//!
//! ```text
//! {"type": "telemetry", "data": {"timestamp": "...", "power_load_kw": 150.5,
//!                                "fuel_consumption_lph": 45.2, "status": "ON"}}
//! {"type": "error", "data": {"message": "..."}}
//! {"type": "connected"}
//! ```

pub mod backoff;
pub mod config;
pub mod connection;
pub mod envelope;
pub mod error;
pub mod request;

// Re-export commonly used types at the crate root
pub use backoff::{BackoffStrategy, reconnect_delay};
pub use config::ClientConfig;
pub use connection::{
    ConnectionManager, ConnectionStats, ConnectionStatus, EventHandlers, ReconnectPolicy,
    StreamConfig,
};
pub use envelope::{Envelope, GeneratorStatus, TelemetryReading, parse_envelope, validate_reading};
pub use error::{ConfigError, RequestError, Result, StreamError, ValidationError};
pub use request::{RequestClient, RequestConfig, RetryPolicy};
