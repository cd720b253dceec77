//! Typed calls for the telemetry backend's endpoints.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::envelope::{TelemetryReading, validate_reading};
use crate::error::{RequestError, Result, ValidationError};

use super::client::{RequestClient, invalid_body};

/// Single reading upload.
pub const METRICS_PATH: &str = "/api/metrics/";
/// Batch reading upload.
pub const BATCH_PATH: &str = "/api/metrics/batch";
/// Backend liveness check.
pub const HEALTH_PATH: &str = "/health";
/// Readings within a time range.
pub const HISTORY_PATH: &str = "/api/metrics/history";
/// Most recent reading.
pub const LATEST_PATH: &str = "/api/metrics/latest";
/// Shutdown-window optimization.
pub const OPTIMIZE_PATH: &str = "/api/insights/optimize";
/// Dashboard ROI summary.
pub const ROI_PATH: &str = "/api/insights/roi";

/// Readings returned for a time range.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoricalData {
    /// Number of readings in `data`.
    pub count: usize,
    /// Start of the range the backend applied.
    pub start: String,
    /// End of the range the backend applied.
    pub end: String,
    /// Readings, oldest first.
    pub data: Vec<TelemetryReading>,
}

const NO_PARAMS: &[(&str, &str)] = &[];

#[derive(Deserialize)]
struct RawHistory {
    count: usize,
    start: String,
    end: String,
    data: Vec<Value>,
}

#[derive(Serialize)]
struct HistoryQuery<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    start: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    end: Option<&'a str>,
}

#[derive(Serialize)]
struct BatchBody<'a> {
    readings: &'a [TelemetryReading],
}

#[derive(Serialize)]
struct RoiQuery {
    hours: u32,
}

/// Parameters for an optimization run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OptimizationRequest {
    /// Hours of history to analyze.
    pub analysis_hours: u32,
    /// Shortest acceptable shutdown window.
    pub min_shutdown_hours: u32,
    /// Longest acceptable shutdown window.
    pub max_shutdown_hours: u32,
}

impl Default for OptimizationRequest {
    fn default() -> Self {
        Self {
            analysis_hours: 24,
            min_shutdown_hours: 2,
            max_shutdown_hours: 8,
        }
    }
}

impl OptimizationRequest {
    /// Set the hours of history to analyze.
    pub fn with_analysis_hours(mut self, hours: u32) -> Self {
        self.analysis_hours = hours;
        self
    }

    /// Set the bounds on the shutdown window.
    pub fn with_shutdown_hours(mut self, min: u32, max: u32) -> Self {
        self.min_shutdown_hours = min;
        self.max_shutdown_hours = max;
        self
    }

    fn validate(&self) -> Result<()> {
        if self.analysis_hours == 0 {
            return Err(RequestError::setup("analysis_hours must be >= 1"));
        }
        if self.min_shutdown_hours == 0 || self.max_shutdown_hours < self.min_shutdown_hours {
            return Err(RequestError::setup(
                "shutdown hours must satisfy 1 <= min_shutdown_hours <= max_shutdown_hours",
            ));
        }
        Ok(())
    }
}

/// Recommended generator shutdown period.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShutdownWindow {
    pub start: String,
    pub end: String,
    pub duration_hours: f64,
}

/// Projected savings from a shutdown window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Savings {
    pub daily_savings_usd: f64,
    pub monthly_savings_usd: f64,
    pub fuel_saved_liters: f64,
}

/// Result of an optimization run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptimizationResult {
    pub shutdown_window: ShutdownWindow,
    pub savings: Savings,
    /// Human-readable summary.
    pub recommendation: String,
}

/// Optimization summary formatted for a dashboard card.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoiCard {
    pub shutdown_window: ShutdownWindow,
    pub savings: Savings,
    pub recommendation: String,
    pub analysis_period_hours: u32,
    pub last_updated: String,
}

/// Acknowledgement of a batch upload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchReceipt {
    pub status: String,
    /// Number of readings stored.
    pub count: usize,
    pub message: String,
}

/// Backend liveness.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthStatus {
    pub status: String,
}

impl HealthStatus {
    /// Check if the backend reports itself healthy.
    pub fn is_healthy(&self) -> bool {
        self.status == "healthy"
    }
}

impl RequestClient {
    /// Fetch readings between `start` and `end` (ISO-8601).
    ///
    /// Either bound may be omitted; the backend then defaults to the last
    /// 24 hours. Every reading is validated like a stream message.
    pub async fn history(&self, start: Option<&str>, end: Option<&str>) -> Result<HistoricalData> {
        let raw: RawHistory = self.get(HISTORY_PATH, &HistoryQuery { start, end }).await?;

        let data = raw
            .data
            .iter()
            .enumerate()
            .map(|(i, value)| {
                reading_from_value(value)
                    .map_err(|e| invalid_body(200, format!("invalid reading at index {i}: {e}")))
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(HistoricalData {
            count: raw.count,
            start: raw.start,
            end: raw.end,
            data,
        })
    }

    /// Fetch the most recent reading.
    ///
    /// An empty backend answers 404, which is not retried.
    pub async fn latest(&self) -> Result<TelemetryReading> {
        let raw: Value = self.get(LATEST_PATH, NO_PARAMS).await?;
        reading_from_value(&raw).map_err(|e| invalid_body(200, format!("invalid reading: {e}")))
    }

    /// Store one reading and return it as persisted, server id included.
    ///
    /// Sent once; a retried upload could store the reading twice.
    pub async fn store_reading(&self, reading: &TelemetryReading) -> Result<TelemetryReading> {
        let stored: Value = self.post(METRICS_PATH, reading).await?;
        reading_from_value(&stored)
            .map_err(|e| invalid_body(201, format!("invalid stored reading: {e}")))
    }

    /// Store several readings in one request. Sent once.
    pub async fn store_batch(&self, readings: &[TelemetryReading]) -> Result<BatchReceipt> {
        if readings.is_empty() {
            return Err(RequestError::setup("batch must contain at least one reading"));
        }
        self.post(BATCH_PATH, &BatchBody { readings }).await
    }

    /// Run an optimization. Sent once; never retried.
    pub async fn optimize(&self, request: &OptimizationRequest) -> Result<OptimizationResult> {
        request.validate()?;
        self.post(OPTIMIZE_PATH, request).await
    }

    /// Fetch the ROI card for the last `hours` of data.
    pub async fn roi_card(&self, hours: u32) -> Result<RoiCard> {
        if hours == 0 {
            return Err(RequestError::setup("hours must be >= 1"));
        }
        self.get(ROI_PATH, &RoiQuery { hours }).await
    }

    /// Check that the backend is up.
    pub async fn health(&self) -> Result<HealthStatus> {
        self.get(HEALTH_PATH, NO_PARAMS).await
    }
}

fn reading_from_value(value: &Value) -> std::result::Result<TelemetryReading, ValidationError> {
    match value {
        Value::Object(fields) => validate_reading(fields),
        _ => Err(ValidationError::DataNotAnObject),
    }
}
