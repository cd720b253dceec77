//! HTTP client with error classification and bounded retry.

use reqwest::header::CONTENT_TYPE;
use reqwest::{Response, Url};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio::time::sleep;
use tracing::{debug, warn};

use crate::error::{ConfigError, RequestError, Result};

use super::config::RequestConfig;

/// Client for the telemetry backend's request/response endpoints.
///
/// Holds no state between calls beyond its configuration and the
/// underlying connection pool, so it can be cloned and shared freely.
///
/// `get` calls are retried on [retryable](RequestError::is_retryable)
/// failures with a fixed delay; `post` calls are sent exactly once.
#[derive(Debug, Clone)]
pub struct RequestClient {
    http: reqwest::Client,
    base_url: Url,
    config: RequestConfig,
}

impl RequestClient {
    /// Create a client for the backend described by `config`.
    pub fn new(config: RequestConfig) -> std::result::Result<Self, ConfigError> {
        config.validate()?;
        let base_url = config.url()?;
        let http = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| ConfigError::HttpClient(e.to_string()))?;

        Ok(Self {
            http,
            base_url,
            config,
        })
    }

    /// Get the client configuration.
    pub fn config(&self) -> &RequestConfig {
        &self.config
    }

    /// Get the normalized base URL.
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Send a GET to `path` with `params` as the query string and decode the
    /// JSON response.
    ///
    /// Network failures and 5xx responses are retried up to `max_retries`
    /// times, `retry_delay_ms` apart. The last error is returned once the
    /// budget is spent.
    pub async fn get<T, Q>(&self, path: &str, params: &Q) -> Result<T>
    where
        T: DeserializeOwned,
        Q: Serialize + ?Sized,
    {
        let url = self.endpoint(path)?;
        let policy = &self.config.retry_policy;
        let mut attempt = 0;

        loop {
            debug!(method = "GET", %url, attempt, "sending request");
            let result = match self.http.get(url.clone()).query(params).send().await {
                Ok(response) => decode(response).await,
                Err(e) => Err(classify_transport(e)),
            };

            match result {
                Ok(value) => return Ok(value),
                Err(e) if e.is_retryable() && policy.should_retry(attempt) => {
                    let delay = policy.delay_for_attempt(attempt);
                    attempt += 1;
                    warn!(
                        %url,
                        error = %e,
                        retry = attempt,
                        max_retries = policy.max_retries,
                        delay_ms = delay.as_millis() as u64,
                        "request failed, retrying"
                    );
                    sleep(delay).await;
                }
                Err(e) => {
                    warn!(%url, error = %e, "request failed");
                    return Err(e);
                }
            }
        }
    }

    /// Send a POST to `path` with `body` as JSON and decode the response.
    ///
    /// Never retried.
    pub async fn post<T, B>(&self, path: &str, body: &B) -> Result<T>
    where
        T: DeserializeOwned,
        B: Serialize + ?Sized,
    {
        let url = self.endpoint(path)?;
        let body = serde_json::to_vec(body)
            .map_err(|e| RequestError::setup(format!("failed to encode request body: {e}")))?;

        debug!(method = "POST", %url, bytes = body.len(), "sending request");
        let response = self
            .http
            .post(url.clone())
            .header(CONTENT_TYPE, "application/json")
            .body(body)
            .send()
            .await
            .map_err(classify_transport)?;

        decode(response).await.inspect_err(|e| {
            warn!(%url, error = %e, "request failed");
        })
    }

    /// Resolve `path` below the base URL.
    fn endpoint(&self, path: &str) -> Result<Url> {
        self.base_url
            .join(path.trim_start_matches('/'))
            .map_err(|e| RequestError::setup(format!("invalid request path {path:?}: {e}")))
    }
}

/// Classify a failure that produced no response.
fn classify_transport(e: reqwest::Error) -> RequestError {
    if e.is_builder() {
        RequestError::setup(e.to_string())
    } else if e.is_timeout() {
        RequestError::network(format!("request timed out: {e}"))
    } else {
        RequestError::network(e.to_string())
    }
}

/// Turn a response into a typed value or a [`RequestError::Server`].
async fn decode<T: DeserializeOwned>(response: Response) -> Result<T> {
    let status = response.status();
    let body = response.text().await.map_err(classify_transport)?;

    if !status.is_success() {
        return Err(server_error(status.as_u16(), &body));
    }

    serde_json::from_str(&body).map_err(|e| RequestError::Server {
        status_code: status.as_u16(),
        message: format!("undecodable response body: {e}"),
        detail: None,
    })
}

/// Build a server error from an error response body.
///
/// Understands `{"message": ...}` and `{"detail": ...}` bodies; anything
/// else falls back to generic text with the raw body as detail.
pub(crate) fn server_error(status_code: u16, body: &str) -> RequestError {
    let parsed = serde_json::from_str::<Value>(body).ok();
    let field = |name: &str| parsed.as_ref().and_then(|v| v.get(name));

    let message = field("message")
        .and_then(Value::as_str)
        .or_else(|| field("detail").and_then(Value::as_str))
        .map(str::to_owned)
        .unwrap_or_else(|| format!("request failed with status {status_code}"));

    let detail = match field("detail") {
        Some(Value::String(s)) => Some(s.clone()),
        Some(Value::Null) => None,
        Some(other) => Some(other.to_string()),
        None if parsed.is_none() && !body.trim().is_empty() => Some(body.trim().to_owned()),
        None => None,
    };

    RequestError::Server {
        status_code,
        message,
        detail,
    }
}

/// Fill in a server error for a 2xx body that decoded but failed validation.
pub(crate) fn invalid_body(status_code: u16, message: impl Into<String>) -> RequestError {
    RequestError::Server {
        status_code,
        message: message.into(),
        detail: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::request::RetryPolicy;

    #[test]
    fn test_server_error_detail_body() {
        let err = server_error(404, r#"{"detail":"No telemetry data available"}"#);
        assert_eq!(
            err,
            RequestError::Server {
                status_code: 404,
                message: "No telemetry data available".into(),
                detail: Some("No telemetry data available".into()),
            }
        );
    }

    #[test]
    fn test_server_error_message_body() {
        let err = server_error(503, r#"{"message":"maintenance","detail":{"retry_in":30}}"#);
        let RequestError::Server {
            message, detail, ..
        } = err
        else {
            panic!("expected server error");
        };
        assert_eq!(message, "maintenance");
        assert_eq!(detail.as_deref(), Some(r#"{"retry_in":30}"#));
    }

    #[test]
    fn test_server_error_validation_detail() {
        // 422 bodies carry a list of problems
        let err = server_error(422, r#"{"detail":[{"loc":["query","hours"],"msg":"bad"}]}"#);
        let RequestError::Server {
            message, detail, ..
        } = err
        else {
            panic!("expected server error");
        };
        assert_eq!(message, "request failed with status 422");
        assert!(detail.unwrap().contains("hours"));
    }

    #[test]
    fn test_server_error_plain_body() {
        let err = server_error(502, "Bad Gateway\n");
        assert_eq!(err.status_code(), Some(502));
        assert!(err.is_retryable());
        let RequestError::Server {
            message, detail, ..
        } = err
        else {
            panic!("expected server error");
        };
        assert_eq!(message, "request failed with status 502");
        assert_eq!(detail.as_deref(), Some("Bad Gateway"));

        let RequestError::Server { detail, .. } = server_error(500, "") else {
            panic!("expected server error");
        };
        assert_eq!(detail, None);
    }

    #[test]
    fn test_endpoint_join() {
        let client = RequestClient::new(
            RequestConfig::new("http://localhost:8000/backend")
                .with_retry_policy(RetryPolicy::no_retry()),
        )
        .unwrap();
        assert_eq!(
            client.endpoint("/api/metrics/latest").unwrap().as_str(),
            "http://localhost:8000/backend/api/metrics/latest"
        );
        assert_eq!(
            client.endpoint("health").unwrap().as_str(),
            "http://localhost:8000/backend/health"
        );
    }

    #[test]
    fn test_new_rejects_bad_config() {
        assert!(matches!(
            RequestClient::new(RequestConfig::new("ftp://localhost")),
            Err(ConfigError::InvalidUrl { .. })
        ));
    }
}
