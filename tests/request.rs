//! Request client tests against a fake HTTP backend.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use serde_json::{Value, json};
use telemetry_client::request::{OptimizationRequest, RequestClient, RequestConfig, RetryPolicy};
use telemetry_client::{GeneratorStatus, RequestError, TelemetryReading};
use wiremock::matchers::{body_json, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn reading(timestamp: &str, status: &str) -> Value {
    json!({
        "id": 1,
        "timestamp": timestamp,
        "power_load_kw": 150.5,
        "fuel_consumption_lph": 45.2,
        "status": status
    })
}

fn optimization() -> Value {
    json!({
        "shutdown_window": {"start": "2025-11-14T02:00:00Z", "end": "2025-11-14T06:00:00Z", "duration_hours": 4.0},
        "savings": {"daily_savings_usd": 120.5, "monthly_savings_usd": 3615.0, "fuel_saved_liters": 180.0},
        "recommendation": "Shut down between 2 AM and 6 AM."
    })
}

fn client(server: &MockServer, retry: RetryPolicy) -> RequestClient {
    RequestClient::new(RequestConfig::new(server.uri()).with_retry_policy(retry)).unwrap()
}

#[tokio::test]
async fn test_get_retries_server_errors_then_succeeds() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/health"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(3)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/health"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"status": "healthy"})))
        .mount(&server)
        .await;

    let delay = Duration::from_millis(50);
    let client = client(&server, RetryPolicy::fixed(3, delay));
    let started = Instant::now();
    let health = client.health().await.unwrap();

    assert!(health.is_healthy());
    assert!(started.elapsed() >= delay * 3);
    assert_eq!(server.received_requests().await.unwrap().len(), 4);
}

#[tokio::test]
async fn test_get_gives_up_after_max_retries() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/health"))
        .respond_with(ResponseTemplate::new(503).set_body_json(json!({"detail": "warming up"})))
        .expect(3)
        .mount(&server)
        .await;

    let client = client(&server, RetryPolicy::fixed(2, Duration::from_millis(10)));
    let err = client.health().await.unwrap_err();

    assert_eq!(
        err,
        RequestError::Server {
            status_code: 503,
            message: "warming up".into(),
            detail: Some("warming up".into()),
        }
    );
}

#[tokio::test]
async fn test_client_error_not_retried() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/metrics/latest"))
        .respond_with(
            ResponseTemplate::new(404).set_body_json(json!({"detail": "No telemetry data available"})),
        )
        .expect(1)
        .mount(&server)
        .await;

    let client = client(&server, RetryPolicy::fixed(3, Duration::from_millis(10)));
    let err = client.latest().await.unwrap_err();

    assert_eq!(err.status_code(), Some(404));
    assert!(!err.is_retryable());
    let RequestError::Server { detail, .. } = err else {
        panic!("expected server error, got {err:?}");
    };
    assert_eq!(detail.as_deref(), Some("No telemetry data available"));
}

#[tokio::test]
async fn test_post_never_retried() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/insights/optimize"))
        .and(body_json(json!({
            "analysis_hours": 24,
            "min_shutdown_hours": 2,
            "max_shutdown_hours": 8
        })))
        .respond_with(ResponseTemplate::new(500).set_body_json(
            json!({"detail": "Failed to generate optimization recommendations"}),
        ))
        .expect(1)
        .mount(&server)
        .await;

    let client = client(&server, RetryPolicy::fixed(3, Duration::from_millis(10)));
    let err = client
        .optimize(&OptimizationRequest::default())
        .await
        .unwrap_err();

    assert!(matches!(err, RequestError::Server { status_code: 500, .. }));
}

#[tokio::test]
async fn test_optimize_success() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/insights/optimize"))
        .respond_with(ResponseTemplate::new(200).set_body_json(optimization()))
        .expect(1)
        .mount(&server)
        .await;

    let client = client(&server, RetryPolicy::default());
    let result = client
        .optimize(&OptimizationRequest::default().with_shutdown_hours(3, 6))
        .await
        .unwrap();

    assert_eq!(result.shutdown_window.duration_hours, 4.0);
    assert_eq!(result.savings.monthly_savings_usd, 3615.0);
}

#[tokio::test]
async fn test_history_validates_readings() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/metrics/history"))
        .and(query_param("start", "2025-11-14T00:00:00"))
        .and(query_param("end", "2025-11-14T12:00:00"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "count": 2,
            "start": "2025-11-14T00:00:00",
            "end": "2025-11-14T12:00:00",
            "data": [
                reading("2025-11-14T01:00:00", "ON"),
                reading("2025-11-14T02:00:00", "OFF")
            ]
        })))
        .mount(&server)
        .await;

    let client = client(&server, RetryPolicy::no_retry());
    let history = client
        .history(Some("2025-11-14T00:00:00"), Some("2025-11-14T12:00:00"))
        .await
        .unwrap();

    assert_eq!(history.count, 2);
    assert_eq!(history.data.len(), 2);
    assert_eq!(history.data[1].status, GeneratorStatus::Off);
}

#[tokio::test]
async fn test_history_rejects_invalid_reading() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/metrics/history"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "count": 1,
            "start": "2025-11-14T00:00:00",
            "end": "2025-11-14T12:00:00",
            "data": [reading("2025-11-14T01:00:00", "on")]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let client = client(&server, RetryPolicy::fixed(3, Duration::from_millis(10)));
    let err = client.history(None, None).await.unwrap_err();

    assert!(matches!(err, RequestError::Server { status_code: 200, .. }));
    assert!(!err.is_retryable());
}

#[tokio::test]
async fn test_roi_card_query() {
    let server = MockServer::start().await;
    let mut card = optimization();
    card["analysis_period_hours"] = json!(12);
    card["last_updated"] = json!("2025-11-14T10:30:00");
    Mock::given(method("GET"))
        .and(path("/api/insights/roi"))
        .and(query_param("hours", "12"))
        .respond_with(ResponseTemplate::new(200).set_body_json(card))
        .mount(&server)
        .await;

    let client = client(&server, RetryPolicy::no_retry());
    let card = client.roi_card(12).await.unwrap();
    assert_eq!(card.analysis_period_hours, 12);
    assert_eq!(card.recommendation, "Shut down between 2 AM and 6 AM.");
}

#[tokio::test]
async fn test_connection_refused_is_network_error() {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let url = format!("http://{}", listener.local_addr().unwrap());
    drop(listener);

    let client = RequestClient::new(
        RequestConfig::new(url).with_retry_policy(RetryPolicy::fixed(2, Duration::from_millis(10))),
    )
    .unwrap();
    let err = client.health().await.unwrap_err();

    assert!(matches!(err, RequestError::Network { .. }));
}

#[tokio::test]
async fn test_timeout_is_network_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/health"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"status": "healthy"}))
                .set_delay(Duration::from_millis(500)),
        )
        .expect(1)
        .mount(&server)
        .await;

    let client = RequestClient::new(
        RequestConfig::new(server.uri())
            .with_timeout(Duration::from_millis(100))
            .with_retry_policy(RetryPolicy::no_retry()),
    )
    .unwrap();
    let err = client.health().await.unwrap_err();

    assert!(matches!(err, RequestError::Network { .. }));
}

#[tokio::test]
async fn test_unencodable_body_is_setup_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let client = client(&server, RetryPolicy::default());
    let body = HashMap::from([((1u8, 2u8), 3u8)]);
    let err = client
        .post::<Value, _>("/api/insights/optimize", &body)
        .await
        .unwrap_err();

    assert!(matches!(err, RequestError::RequestSetup { .. }));

    let err = client
        .optimize(&OptimizationRequest::default().with_analysis_hours(0))
        .await
        .unwrap_err();
    assert!(matches!(err, RequestError::RequestSetup { .. }));
}

#[tokio::test]
async fn test_store_reading_not_retried() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/metrics/"))
        .and(body_json(json!({
            "timestamp": "2025-11-14T01:00:00",
            "power_load_kw": 150.5,
            "fuel_consumption_lph": 45.2,
            "status": "ON"
        })))
        .respond_with(ResponseTemplate::new(201).set_body_json(reading("2025-11-14T01:00:00", "ON")))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/metrics/batch"))
        .respond_with(ResponseTemplate::new(503))
        .expect(1)
        .mount(&server)
        .await;

    let client = client(&server, RetryPolicy::fixed(3, Duration::from_millis(10)));
    let sample = TelemetryReading::new("2025-11-14T01:00:00", 150.5, 45.2, GeneratorStatus::On);

    let stored = client.store_reading(&sample).await.unwrap();
    assert_eq!(stored.id, Some(1));
    assert_eq!(stored.power_load_kw, sample.power_load_kw);

    let err = client.store_batch(&[sample.clone(), sample]).await.unwrap_err();
    assert_eq!(err.status_code(), Some(503));
}

#[tokio::test]
async fn test_store_batch() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/metrics/batch"))
        .and(body_json(json!({
            "readings": [
                {"timestamp": "2025-11-14T01:00:00", "power_load_kw": 150.5, "fuel_consumption_lph": 45.2, "status": "ON"},
                {"timestamp": "2025-11-14T01:00:02", "power_load_kw": 0.0, "fuel_consumption_lph": 0.0, "status": "OFF"}
            ]
        })))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({
            "status": "success",
            "count": 2,
            "message": "Successfully stored 2 telemetry readings"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let client = client(&server, RetryPolicy::no_retry());
    let readings = [
        TelemetryReading::new("2025-11-14T01:00:00", 150.5, 45.2, GeneratorStatus::On),
        TelemetryReading::new("2025-11-14T01:00:02", 0.0, 0.0, GeneratorStatus::Off),
    ];
    let receipt = client.store_batch(&readings).await.unwrap();
    assert_eq!(receipt.count, 2);

    let err = client.store_batch(&[]).await.unwrap_err();
    assert!(matches!(err, RequestError::RequestSetup { .. }));
}
