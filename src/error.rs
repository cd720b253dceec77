//! Error types for telemetry client operations.

use thiserror::Error;

/// Why an inbound stream message was rejected.
///
/// Variants follow the order in which checks are applied; the first failing
/// check is the one reported.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// Message is not parseable JSON.
    #[error("Malformed message: {0}")]
    Malformed(String),

    /// Message parsed but is not a JSON object.
    #[error("Message is not a JSON object")]
    NotAnObject,

    /// Envelope has no `type`, or an empty one.
    #[error("Envelope is missing a non-empty `type`")]
    MissingType,

    /// Telemetry envelope has no `data`.
    #[error("Telemetry envelope is missing `data`")]
    MissingData,

    /// Telemetry envelope `data` is not an object.
    #[error("Telemetry `data` is not a JSON object")]
    DataNotAnObject,

    /// A required reading field is absent.
    #[error("Telemetry reading is missing `{0}`")]
    MissingField(&'static str),

    /// A reading field has the wrong type or is empty.
    #[error("Telemetry field `{field}` must be {expected}")]
    InvalidField {
        field: &'static str,
        expected: &'static str,
    },

    /// Generator status is not exactly `ON` or `OFF`.
    #[error("Invalid generator status: {0:?} (expected \"ON\" or \"OFF\")")]
    InvalidStatus(String),
}

/// Classified failure of a request/response call.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RequestError {
    /// The backend answered with an error status (or an undecodable body).
    #[error("Server error {status_code}: {message}")]
    Server {
        status_code: u16,
        message: String,
        detail: Option<String>,
    },

    /// No response was received (connect failure, reset, timeout).
    #[error("Network error: {message}")]
    Network { message: String },

    /// The request could not be built or dispatched.
    #[error("Request setup error: {message}")]
    RequestSetup { message: String },
}

impl RequestError {
    /// Create a new network error.
    pub fn network(message: impl Into<String>) -> Self {
        Self::Network {
            message: message.into(),
        }
    }

    /// Create a new request setup error.
    pub fn setup(message: impl Into<String>) -> Self {
        Self::RequestSetup {
            message: message.into(),
        }
    }

    /// Status code of a server error, if any.
    pub fn status_code(&self) -> Option<u16> {
        match self {
            Self::Server { status_code, .. } => Some(*status_code),
            _ => None,
        }
    }

    /// Check if this error is transient and the call may be retried.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Network { .. } => true,
            Self::Server { status_code, .. } => *status_code >= 500,
            Self::RequestSetup { .. } => false,
        }
    }
}

/// Errors reported through a stream's error callback.
///
/// None of these terminate the connection manager; they are informational
/// except for [`StreamError::ReconnectExhausted`], which accompanies the
/// terminal `Error` status.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum StreamError {
    /// The transport could not open or closed abnormally.
    #[error("Connection failure: {0}")]
    Connection(String),

    /// An inbound message failed validation.
    #[error("Invalid message: {0}")]
    Validation(#[from] ValidationError),

    /// The server sent an `error` envelope.
    #[error("Server reported: {message}")]
    Remote {
        message: String,
        data: Option<serde_json::Value>,
    },

    /// The reconnect budget is spent; `connect()` must be called again.
    #[error("Gave up reconnecting after {attempts} attempts")]
    ReconnectExhausted { attempts: u32 },
}

/// Invalid configuration or usage.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// A policy field is out of range.
    #[error("Invalid policy: {0}")]
    InvalidPolicy(String),

    /// A URL did not parse or has the wrong scheme.
    #[error("Invalid URL {url:?}: {reason}")]
    InvalidUrl { url: String, reason: String },

    /// The HTTP client could not be constructed.
    #[error("Failed to build HTTP client: {0}")]
    HttpClient(String),

    /// `connect()` was called outside a tokio runtime.
    #[error("No tokio runtime available to drive the connection")]
    NoRuntime,
}

impl ConfigError {
    /// Create a new invalid policy error.
    pub fn invalid_policy(msg: impl Into<String>) -> Self {
        Self::InvalidPolicy(msg.into())
    }

    pub(crate) fn invalid_url(url: impl Into<String>, reason: impl ToString) -> Self {
        Self::InvalidUrl {
            url: url.into(),
            reason: reason.to_string(),
        }
    }
}

/// Result type alias for request/response calls.
pub type Result<T> = std::result::Result<T, RequestError>;
