//! Mock telemetry stream server.
//!
//! Serves simulated generator readings on `ws://127.0.0.1:8000/ws/telemetry`
//! following a daily load curve. Every seventh frame is a reading with a null
//! timestamp, which clients must reject. With `--flaky`, every connection is
//! dropped without a close handshake after a few readings so clients have to
//! reconnect.
//!
//! Run: cargo run --example mock_server -- [--port 8000] [--flaky]
//! Then: cargo run --example live_feed

use std::f64::consts::PI;
use std::net::SocketAddr;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use rand::Rng;
use serde_json::json;
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::tungstenite::Message;
use tracing_subscriber::EnvFilter;

const MIN_POWER_LOAD_KW: f64 = 50.0;
const MAX_POWER_LOAD_KW: f64 = 300.0;
const FUEL_EFFICIENCY_FACTOR: f64 = 0.3;
/// Simulated minutes that pass per reading.
const MINUTES_PER_TICK: u64 = 10;
const READINGS_BEFORE_DROP: u64 = 5;
const MALFORMED_EVERY: u64 = 7;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("mock_server=info".parse()?))
        .init();

    let args: Vec<String> = std::env::args().collect();
    let port = args
        .iter()
        .position(|a| a == "--port")
        .and_then(|i| args.get(i + 1))
        .and_then(|p| p.parse().ok())
        .unwrap_or(8000);
    let flaky = args.iter().any(|a| a == "--flaky");

    let addr: SocketAddr = ([127, 0, 0, 1], port).into();
    let listener = TcpListener::bind(addr).await?;
    tracing::info!("Serving telemetry on ws://{}/ws/telemetry", addr);

    loop {
        let (stream, peer) = listener.accept().await?;
        tokio::spawn(async move {
            if let Err(e) = serve(stream, flaky).await {
                tracing::warn!("Connection from {} ended: {}", peer, e);
            } else {
                tracing::info!("Connection from {} closed", peer);
            }
        });
    }
}

async fn serve(stream: TcpStream, flaky: bool) -> anyhow::Result<()> {
    let ws = tokio_tungstenite::accept_async(stream).await?;
    let (mut sink, mut incoming) = ws.split();

    sink.send(Message::text(
        json!({"type": "connected", "data": {"message": "telemetry stream ready"}}).to_string(),
    ))
    .await?;

    let mut ticker = tokio::time::interval(Duration::from_secs(2));
    let mut tick = 0u64;
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                if flaky && tick == READINGS_BEFORE_DROP {
                    tracing::info!("Dropping connection");
                    return Ok(());
                }
                let mut data = reading(tick);
                if tick % MALFORMED_EVERY == MALFORMED_EVERY - 1 {
                    data["timestamp"] = serde_json::Value::Null;
                }
                let envelope = json!({"type": "telemetry", "data": data});
                sink.send(Message::text(envelope.to_string())).await?;
                tick += 1;
            }
            msg = incoming.next() => match msg {
                Some(Ok(Message::Close(_))) | None => return Ok(()),
                Some(Ok(_)) => {}
                Some(Err(e)) => return Err(e.into()),
            },
        }
    }
}

/// A reading on a sine curve peaking at 14:00, with noise.
fn reading(tick: u64) -> serde_json::Value {
    let minutes = (tick * MINUTES_PER_TICK) % (24 * 60);
    let hour_of_day = minutes as f64 / 60.0;

    let phase = (hour_of_day - 14.0) * (2.0 * PI / 24.0);
    let range = MAX_POWER_LOAD_KW - MIN_POWER_LOAD_KW;
    let base = MIN_POWER_LOAD_KW + (range / 2.0) * (1.0 - phase.sin());
    let noise = rand::thread_rng().gen_range(-0.1..=0.1) * range;
    let power = (base + noise).clamp(MIN_POWER_LOAD_KW, MAX_POWER_LOAD_KW);

    json!({
        "id": tick + 1,
        "timestamp": format!("2025-11-14T{:02}:{:02}:00", minutes / 60, minutes % 60),
        "power_load_kw": (power * 100.0).round() / 100.0,
        "fuel_consumption_lph": (power * FUEL_EFFICIENCY_FACTOR * 100.0).round() / 100.0,
        "status": "ON",
    })
}
