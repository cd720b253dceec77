//! Live telemetry feed.
//!
//! Connects to the telemetry stream, prints every reading and status change,
//! and queries the backend over HTTP for the latest reading and the last
//! day of history. Base URLs come from `TELEMETRY_WS_URL` and
//! `TELEMETRY_API_URL`.
//!
//! Run the server first: cargo run --example mock_server -- --flaky
//! Then run: RUST_LOG=telemetry_client=debug cargo run --example live_feed

use std::time::Duration;

use telemetry_client::request::RetryPolicy;
use telemetry_client::{ClientConfig, EventHandlers, ReconnectPolicy};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env().add_directive("telemetry_client=info".parse()?),
        )
        .init();

    let config = ClientConfig::from_env()
        .with_reconnect_policy(
            ReconnectPolicy::default()
                .with_max_attempts(5)
                .with_initial_delay(Duration::from_millis(500))
                .with_jitter(0.2),
        )
        .with_retry_policy(RetryPolicy::fixed(1, Duration::from_millis(500)));
    let (stream, api) = config.build()?;

    println!("Connecting to {}", stream.url());
    stream.connect(
        EventHandlers::new(|reading| {
            println!(
                "{}  {:>7.2} kW  {:>6.2} L/h  {}",
                reading.timestamp, reading.power_load_kw, reading.fuel_consumption_lph, reading.status
            );
        })
        .on_status(|status| println!("-- stream {status}"))
        .on_error(|err| eprintln!("-- {err}")),
    )?;

    // the HTTP side is optional; the mock server only streams
    match api.health().await {
        Ok(health) => println!("Backend health: {}", health.status),
        Err(e) => println!("Backend health unavailable: {e}"),
    }
    match api.latest().await {
        Ok(reading) => println!("Latest stored reading: {} kW", reading.power_load_kw),
        Err(e) => println!("Latest reading unavailable: {e}"),
    }
    match api.history(None, None).await {
        Ok(history) => println!(
            "History {} .. {}: {} readings",
            history.start, history.end, history.count
        ),
        Err(e) => println!("History unavailable: {e}"),
    }

    println!("Press Ctrl-C to stop");
    tokio::signal::ctrl_c().await?;

    stream.disconnect();
    let stats = stream.stats();
    println!(
        "Received {} readings ({} rejected) over {} connections",
        stats.readings_delivered, stats.messages_rejected, stats.connect_count
    );
    Ok(())
}
