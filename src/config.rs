use std::env;
use std::time::Duration;

use crate::errors::{Error, Result};

/// Fixed strftime layout requested from the time service, URL-encoded:
/// `%Y-%m-%d %H:%M:%S.%L %j %u %z %Z`.
const TIME_SERVICE_FMT: &str = "%25Y-%25m-%25d+%25H%3A%25M%3A%25S.%25L+%25j+%25u+%25z+%25Z";

#[derive(Debug, Clone)]
pub struct Config {
    pub wifi: WifiConfig,
    pub aio: AioConfig,
    pub uplink: UplinkConfig,
}

#[derive(Debug, Clone)]
pub struct WifiConfig {
    pub ssid: String,
    pub password: String,
}

#[derive(Debug, Clone)]
pub struct AioConfig {
    pub username: String,
    pub key: String,
    pub host: String,
    /// IANA location name, e.g. "America/New_York". When unset the time
    /// service falls back to IP geolocation.
    pub timezone: Option<String>,
}

#[derive(Debug, Clone)]
pub struct UplinkConfig {
    pub feed: String,
    pub interval_secs: u64,
    pub connect_retry: Duration,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build from any settings store. `from_env` is the production path;
    /// tests substitute a map.
    pub fn from_lookup<F>(get: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let config = Self {
            wifi: WifiConfig {
                ssid: required(&get, "WIFI_SSID")?,
                password: required(&get, "WIFI_PASSWORD")?,
            },
            aio: AioConfig {
                username: required(&get, "AIO_USERNAME")?,
                key: required(&get, "AIO_KEY")?,
                host: or_default(&get, "AIO_HOST", "io.adafruit.com".to_string()),
                timezone: optional(&get, "TIMEZONE"),
            },
            uplink: UplinkConfig {
                feed: or_default(&get, "UPLINK_FEED", "heartbeat".to_string()),
                interval_secs: or_default(&get, "UPLINK_INTERVAL_SECS", 60),
                connect_retry: Duration::from_millis(or_default(&get, "CONNECT_RETRY_MS", 1000)),
            },
        };
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.aio.host.is_empty() {
            return Err(Error::Config("AIO_HOST must not be empty".into()));
        }
        if self.uplink.feed.is_empty() {
            return Err(Error::Config("UPLINK_FEED must not be empty".into()));
        }
        if self.uplink.interval_secs == 0 {
            return Err(Error::Config("UPLINK_INTERVAL_SECS must be > 0".into()));
        }
        Ok(())
    }

    /// Data endpoint for one feed.
    pub fn feed_data_url(&self, feed: &str) -> String {
        format!(
            "https://{}/api/v2/{}/feeds/{}/data",
            self.aio.host, self.aio.username, feed
        )
    }

    /// Time service endpoint. Carries the account key as a query parameter
    /// and an explicit timezone when one is configured.
    pub fn time_service_url(&self) -> String {
        let mut url = format!(
            "https://{}/api/v2/{}/integrations/time/strftime?x-aio-key={}",
            self.aio.host, self.aio.username, self.aio.key
        );
        if let Some(tz) = &self.aio.timezone {
            url.push_str("&tz=");
            url.push_str(tz);
        }
        url.push_str("&fmt=");
        url.push_str(TIME_SERVICE_FMT);
        url
    }
}

fn required<F>(get: &F, key: &str) -> Result<String>
where
    F: Fn(&str) -> Option<String>,
{
    get(key)
        .filter(|v| !v.is_empty())
        .ok_or_else(|| Error::Config(format!("{key} setting is required")))
}

fn optional<F>(get: &F, key: &str) -> Option<String>
where
    F: Fn(&str) -> Option<String>,
{
    get(key).filter(|v| !v.is_empty())
}

fn or_default<T, F>(get: &F, key: &str, default: T) -> T
where
    T: std::str::FromStr,
    F: Fn(&str) -> Option<String>,
{
    get(key).and_then(|v| v.parse().ok()).unwrap_or(default)
}
