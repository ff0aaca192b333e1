mod aio;
mod clock;
mod config;
mod errors;
mod radio;

use std::time::{Duration, Instant};

use serde_json::json;
use tracing::{error, info, warn};

use aio::client::NetworkClient;
use clock::SoftRtc;
use radio::tcp::TcpRadio;

const CLOCK_RESYNC_SECS: u64 = 24 * 60 * 60;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let config = match config::Config::from_env() {
        Ok(c) => c,
        Err(e) => {
            error!("Configuration error: {}", e);
            std::process::exit(1);
        }
    };

    info!(
        "Starting sensor-to-aio uplink (host={}, account={}, feed={}, every {}s)",
        config.aio.host, config.aio.username, config.uplink.feed, config.uplink.interval_secs,
    );

    let feed = config.uplink.feed.clone();
    let interval = Duration::from_secs(config.uplink.interval_secs);
    let policy = aio::RetryPolicy {
        connect_retry_delay: config.uplink.connect_retry,
        ..Default::default()
    };

    let mut client = NetworkClient::with_policy(config, policy, TcpRadio::new(), SoftRtc::new());

    let started = Instant::now();
    let mut ticker = tokio::time::interval(interval);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                // Sync the clock on the first tick and again once a day.
                if client.rtc().seconds_since_sync().is_none_or(|age| age >= CLOCK_RESYNC_SECS) {
                    match client.refresh_local_time().await {
                        Ok(now) => info!("Clock synced: {}", now),
                        Err(e) => warn!("Clock sync failed: {}", e),
                    }
                }

                let payload = json!({ "value": started.elapsed().as_secs() });
                match client.post(&feed, &payload).await {
                    Ok(true) => info!("Reading delivered to feed {}", feed),
                    Ok(false) => warn!("Upload failed, dropping reading"),
                    Err(e) => error!("Upload error: {}", e),
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Received SIGINT, shutting down");
                break;
            }
            _ = async {
                let mut sigterm = tokio::signal::unix::signal(
                    tokio::signal::unix::SignalKind::terminate()
                ).expect("Failed to register SIGTERM handler");
                sigterm.recv().await;
            } => {
                info!("Received SIGTERM, shutting down");
                break;
            }
        }
    }

    if let Some(at) = client.rtc().last_sync() {
        info!("Last clock sync: {}", at);
    }
    info!("sensor-to-aio uplink stopped");
}
