//! Stream envelopes and their validation.
//!
//! Every message on the telemetry stream is a JSON object of the form
//! `{"type": ..., "data": ...}`. Messages come from an untrusted peer, so
//! they are parsed into [`serde_json::Value`] first and checked field by
//! field before anything typed is handed to the application:
//!
//! 1. the text parses as JSON,
//! 2. the value is an object,
//! 3. it carries a non-empty string `type`,
//! 4. for `telemetry`, `data` is an object holding a complete reading.
//!
//! The first failing check is reported; nothing partial is returned.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::ValidationError;

/// Envelope type carrying a [`TelemetryReading`].
pub const TYPE_TELEMETRY: &str = "telemetry";
/// Envelope type carrying a server-side error notice.
pub const TYPE_ERROR: &str = "error";
/// Envelope type sent once the server has accepted the stream.
pub const TYPE_CONNECTED: &str = "connected";

/// Generator run state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum GeneratorStatus {
    /// Generator is running.
    #[serde(rename = "ON")]
    On,
    /// Generator is shut down.
    #[serde(rename = "OFF")]
    Off,
}

impl GeneratorStatus {
    /// Wire representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            GeneratorStatus::On => "ON",
            GeneratorStatus::Off => "OFF",
        }
    }
}

impl fmt::Display for GeneratorStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for GeneratorStatus {
    type Err = ValidationError;

    /// Exact match only: no trimming, no case folding.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ON" => Ok(GeneratorStatus::On),
            "OFF" => Ok(GeneratorStatus::Off),
            other => Err(ValidationError::InvalidStatus(other.to_string())),
        }
    }
}

/// A single generator telemetry sample.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TelemetryReading {
    /// Server-side row id, when the server includes it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    /// ISO-8601 timestamp of the sample.
    pub timestamp: String,
    /// Power load in kilowatts.
    pub power_load_kw: f64,
    /// Fuel consumption in liters per hour.
    pub fuel_consumption_lph: f64,
    /// Generator run state.
    pub status: GeneratorStatus,
}

impl TelemetryReading {
    /// Create a reading without a server id.
    pub fn new(
        timestamp: impl Into<String>,
        power_load_kw: f64,
        fuel_consumption_lph: f64,
        status: GeneratorStatus,
    ) -> Self {
        Self {
            id: None,
            timestamp: timestamp.into(),
            power_load_kw,
            fuel_consumption_lph,
            status,
        }
    }

    /// Check if the generator was running when sampled.
    pub fn is_running(&self) -> bool {
        self.status == GeneratorStatus::On
    }
}

/// A validated stream message.
#[derive(Debug, Clone, PartialEq)]
pub enum Envelope {
    /// A telemetry sample.
    Telemetry(TelemetryReading),
    /// The server reported a problem.
    Error {
        /// Human-readable description.
        message: String,
        /// The raw `data` payload, if any.
        data: Option<Value>,
    },
    /// Stream acknowledgement.
    Connected(Option<Value>),
    /// A well-formed envelope of a type this client does not handle.
    Other {
        /// The envelope `type`.
        kind: String,
        /// The raw `data` payload, if any.
        data: Option<Value>,
    },
}

impl Envelope {
    /// The envelope `type` as it appeared on the wire.
    pub fn kind(&self) -> &str {
        match self {
            Envelope::Telemetry(_) => TYPE_TELEMETRY,
            Envelope::Error { .. } => TYPE_ERROR,
            Envelope::Connected(_) => TYPE_CONNECTED,
            Envelope::Other { kind, .. } => kind,
        }
    }
}

/// Parse and validate one stream message.
pub fn parse_envelope(text: &str) -> Result<Envelope, ValidationError> {
    let value: Value =
        serde_json::from_str(text).map_err(|e| ValidationError::Malformed(e.to_string()))?;

    let Value::Object(mut object) = value else {
        return Err(ValidationError::NotAnObject);
    };

    let kind = match object.get("type") {
        Some(Value::String(kind)) if !kind.is_empty() => kind.clone(),
        _ => return Err(ValidationError::MissingType),
    };

    let data = object.remove("data").filter(|data| !data.is_null());

    match kind.as_str() {
        TYPE_TELEMETRY => {
            let data = data.ok_or(ValidationError::MissingData)?;
            let Value::Object(fields) = data else {
                return Err(ValidationError::DataNotAnObject);
            };
            validate_reading(&fields).map(Envelope::Telemetry)
        }
        TYPE_ERROR => {
            let message = error_message(&object, data.as_ref());
            Ok(Envelope::Error { message, data })
        }
        TYPE_CONNECTED => Ok(Envelope::Connected(data)),
        _ => Ok(Envelope::Other { kind, data }),
    }
}

/// Validate the fields of a telemetry `data` object.
pub fn validate_reading(fields: &Map<String, Value>) -> Result<TelemetryReading, ValidationError> {
    let timestamp = match fields.get("timestamp") {
        None | Some(Value::Null) => return Err(ValidationError::MissingField("timestamp")),
        Some(Value::String(ts)) if !ts.is_empty() => ts.clone(),
        Some(_) => {
            return Err(ValidationError::InvalidField {
                field: "timestamp",
                expected: "a non-empty string",
            });
        }
    };
    let power_load_kw = number_field(fields, "power_load_kw")?;
    let fuel_consumption_lph = number_field(fields, "fuel_consumption_lph")?;
    let status = match fields.get("status") {
        None | Some(Value::Null) => return Err(ValidationError::MissingField("status")),
        Some(Value::String(status)) => status.parse()?,
        Some(other) => return Err(ValidationError::InvalidStatus(other.to_string())),
    };

    Ok(TelemetryReading {
        id: fields.get("id").and_then(Value::as_i64),
        timestamp,
        power_load_kw,
        fuel_consumption_lph,
        status,
    })
}

fn number_field(fields: &Map<String, Value>, name: &'static str) -> Result<f64, ValidationError> {
    match fields.get(name) {
        None | Some(Value::Null) => Err(ValidationError::MissingField(name)),
        Some(Value::Number(n)) => n.as_f64().ok_or(ValidationError::InvalidField {
            field: name,
            expected: "a number",
        }),
        Some(_) => Err(ValidationError::InvalidField {
            field: name,
            expected: "a number",
        }),
    }
}

fn error_message(object: &Map<String, Value>, data: Option<&Value>) -> String {
    let from_data = data.and_then(|data| match data {
        Value::String(s) => Some(s.as_str()),
        Value::Object(fields) => fields.get("message").and_then(Value::as_str),
        _ => None,
    });
    from_data
        .or_else(|| object.get("message").and_then(Value::as_str))
        .unwrap_or("server reported an error")
        .to_string()
}
