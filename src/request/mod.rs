//! Request/response calls against the telemetry backend.
//!
//! [`RequestClient`] wraps each call with a timeout and classifies every
//! failure as a [`RequestError`](crate::error::RequestError). Idempotent
//! `get` calls are retried on network failures and 5xx responses; `post`
//! calls never are.
//!
//! # Example
//!
//! ```no_run
//! use telemetry_client::request::{OptimizationRequest, RequestClient, RequestConfig};
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let client = RequestClient::new(RequestConfig::new("http://localhost:8000"))?;
//!
//! let latest = client.latest().await?;
//! println!("{} kW at {}", latest.power_load_kw, latest.timestamp);
//!
//! let result = client.optimize(&OptimizationRequest::default()).await?;
//! println!("{}", result.recommendation);
//! # Ok(())
//! # }
//! ```

mod api;
mod client;
mod config;

pub use api::{
    BATCH_PATH, BatchReceipt, HEALTH_PATH, HISTORY_PATH, HealthStatus, HistoricalData,
    LATEST_PATH, METRICS_PATH, OPTIMIZE_PATH, OptimizationRequest, OptimizationResult, ROI_PATH,
    RoiCard, Savings, ShutdownWindow,
};
pub use client::RequestClient;
pub use config::{
    DEFAULT_API_URL, DEFAULT_MAX_RETRIES, DEFAULT_REQUEST_TIMEOUT, DEFAULT_RETRY_DELAY_MS,
    RequestConfig, RetryPolicy,
};
