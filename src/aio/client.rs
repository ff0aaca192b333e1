use serde_json::Value;
use tracing::{debug, error, info};

use crate::clock::{self, Rtc, TimeRecord};
use crate::config::Config;
use crate::errors::Result;
use crate::radio::{HttpRequest, Method, Radio};

use super::RetryPolicy;

/// Client for the telemetry service. Owns the radio handle and the RTC
/// sink; every call is awaited to completion before the next one starts.
pub struct NetworkClient<R, C> {
    config: Config,
    policy: RetryPolicy,
    radio: R,
    rtc: C,
}

impl<R: Radio, C: Rtc> NetworkClient<R, C> {
    pub fn new(config: Config, radio: R, rtc: C) -> Self {
        Self::with_policy(config, RetryPolicy::default(), radio, rtc)
    }

    pub fn with_policy(config: Config, policy: RetryPolicy, radio: R, rtc: C) -> Self {
        Self {
            config,
            policy,
            radio,
            rtc,
        }
    }

    pub fn rtc(&self) -> &C {
        &self.rtc
    }

    /// Block until the radio reports association. Failed attempts retry
    /// after `connect_retry_delay`; without an attempt cap the loop only
    /// exits on success.
    pub async fn connect(&mut self) -> Result<()> {
        debug!("Connecting...");
        let mut attempts = 0u32;
        while !self.radio.is_connected() {
            attempts += 1;
            if let Err(e) = self
                .radio
                .join(&self.config.wifi.ssid, &self.config.wifi.password)
                .await
            {
                error!("could not connect to AP, retrying: {}", e);
                if let Some(max) = self.policy.max_connect_attempts {
                    if attempts >= max {
                        return Err(e.into());
                    }
                }
                if !self.policy.connect_retry_delay.is_zero() {
                    tokio::time::sleep(self.policy.connect_retry_delay).await;
                }
            }
        }
        Ok(())
    }

    /// POST one payload to a feed. A transport failure costs one of the
    /// five attempts and triggers a hard radio reset plus reconnect; any
    /// received response, 200 or not, ends the loop. `Ok(false)` means all
    /// five attempts failed or the service answered non-200.
    pub async fn post(&mut self, feed: &str, payload: &Value) -> Result<bool> {
        let url = self.config.feed_data_url(feed);
        let body = serde_json::to_string(payload)?;
        info!("POSTing to {}", url);
        info!("payload: {}", body);

        self.connect().await?;

        let key = self.config.aio.key.clone();
        let headers = [
            ("X-AIO-KEY", key.as_str()),
            ("Content-Type", "application/json"),
        ];
        let mut response = None;
        for attempt in 1..=self.policy.post_attempts {
            let request = HttpRequest {
                method: Method::Post,
                url: &url,
                headers: &headers,
                body: Some(&body),
            };
            match self.radio.send(&request).await {
                Ok(r) => {
                    response = Some(r);
                    break;
                }
                Err(e) => {
                    error!(
                        "Error posting (attempt {}/{}): {}",
                        attempt, self.policy.post_attempts, e
                    );
                    info!("Resetting and reconnecting");
                    self.radio.reset().await;
                    self.connect().await?;
                }
            }
        }

        let Some(response) = response else {
            return Ok(false);
        };
        info!("Status: {}", response.status);
        debug!("Text: {}", response.body);
        Ok(response.status == 200)
    }

    /// Fetch wall-clock time from the service and write it into the RTC.
    /// The GET is not retried; a malformed reply is a time lookup error.
    pub async fn refresh_local_time(&mut self) -> Result<TimeRecord> {
        match &self.config.aio.timezone {
            Some(tz) => debug!("Getting time for timezone {}", tz),
            None => debug!("Getting time from IP address"),
        }
        let url = self.config.time_service_url();
        debug!("Requesting time from {}", url);

        self.connect().await?;
        let request = HttpRequest {
            method: Method::Get,
            url: &url,
            headers: &[],
            body: None,
        };
        let response = self.radio.send(&request).await?;
        debug!("Time reply: {}", response.body);

        let now = clock::parse_strftime(&response.body)?;
        self.rtc.set_datetime(&now);
        debug!("Fetched time: {}", now);
        drop(response);
        Ok(now)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::time::Duration;

    use serde_json::json;

    use super::*;
    use crate::clock::SoftRtc;
    use crate::config::{AioConfig, UplinkConfig, WifiConfig};
    use crate::errors::Error;
    use crate::radio::{HttpResponse, TransportError};

    type RadioResult<T> = std::result::Result<T, TransportError>;

    /// Scripted radio: fails the first `join_failures` association
    /// attempts, then answers requests from the front of `script`.
    struct SimRadio {
        associated: bool,
        join_failures: u32,
        joins: u32,
        resets: u32,
        requests: u32,
        last_url: Option<String>,
        last_auth: Option<String>,
        script: VecDeque<RadioResult<HttpResponse>>,
    }

    impl SimRadio {
        fn new(join_failures: u32, script: Vec<RadioResult<HttpResponse>>) -> Self {
            Self {
                associated: false,
                join_failures,
                joins: 0,
                resets: 0,
                requests: 0,
                last_url: None,
                last_auth: None,
                script: script.into(),
            }
        }

        fn ok(status: u16, body: &str) -> RadioResult<HttpResponse> {
            Ok(HttpResponse {
                status,
                body: body.to_string(),
            })
        }

        fn down() -> RadioResult<HttpResponse> {
            Err(TransportError::Io(std::io::Error::new(
                std::io::ErrorKind::ConnectionReset,
                "socket dropped",
            )))
        }
    }

    impl Radio for SimRadio {
        fn is_connected(&self) -> bool {
            self.associated
        }

        async fn join(&mut self, _ssid: &str, _password: &str) -> RadioResult<()> {
            self.joins += 1;
            if self.joins <= self.join_failures {
                return Err(TransportError::Join("rc=-1".into()));
            }
            self.associated = true;
            Ok(())
        }

        async fn reset(&mut self) {
            self.resets += 1;
            self.associated = false;
        }

        async fn send(&mut self, request: &HttpRequest<'_>) -> RadioResult<HttpResponse> {
            self.requests += 1;
            self.last_url = Some(request.url.to_string());
            self.last_auth = request
                .headers
                .iter()
                .find(|(name, _)| *name == "X-AIO-KEY")
                .map(|(_, value)| value.to_string());
            self.script.pop_front().unwrap_or_else(|| SimRadio::ok(200, "{}"))
        }
    }

    fn test_config(timezone: Option<&str>) -> Config {
        Config {
            wifi: WifiConfig {
                ssid: "shopnet".into(),
                password: "hunter2".into(),
            },
            aio: AioConfig {
                username: "maker".into(),
                key: "aio-key".into(),
                host: "io.adafruit.com".into(),
                timezone: timezone.map(String::from),
            },
            uplink: UplinkConfig {
                feed: "heartbeat".into(),
                interval_secs: 60,
                connect_retry: Duration::ZERO,
            },
        }
    }

    fn fast_policy() -> RetryPolicy {
        RetryPolicy {
            post_attempts: 5,
            connect_retry_delay: Duration::ZERO,
            max_connect_attempts: None,
        }
    }

    fn client(radio: SimRadio) -> NetworkClient<SimRadio, SoftRtc> {
        NetworkClient::with_policy(test_config(None), fast_policy(), radio, SoftRtc::new())
    }

    const TIME_REPLY: &str = "2023-05-01 14:30:00.123 121 1 +0000 UTC";

    #[test]
    fn connect_returns_once_associated() {
        tokio_test::block_on(async {
            let mut client = client(SimRadio::new(3, vec![]));
            client.connect().await.unwrap();
            assert!(client.radio.is_connected());
            assert_eq!(client.radio.joins, 4);
        });
    }

    #[test]
    fn connect_attempt_cap_surfaces_the_error() {
        tokio_test::block_on(async {
            let policy = RetryPolicy {
                max_connect_attempts: Some(2),
                connect_retry_delay: Duration::ZERO,
                ..Default::default()
            };
            let mut client = NetworkClient::with_policy(
                test_config(None),
                policy,
                SimRadio::new(10, vec![]),
                SoftRtc::new(),
            );
            let err = client.connect().await.unwrap_err();
            assert!(matches!(err, Error::Transport(_)));
            assert_eq!(client.radio.joins, 2);
        });
    }

    #[test]
    fn post_succeeds_on_the_first_response() {
        tokio_test::block_on(async {
            let script = vec![SimRadio::ok(200, "{\"id\":\"0EQ\"}")];
            let mut client = client(SimRadio::new(0, script));
            assert!(client.post("office-temp", &json!({"value": 21.5})).await.unwrap());
            assert_eq!(client.radio.requests, 1);
            assert_eq!(client.radio.resets, 0);
            assert_eq!(
                client.radio.last_url.as_deref(),
                Some("https://io.adafruit.com/api/v2/maker/feeds/office-temp/data")
            );
            assert_eq!(client.radio.last_auth.as_deref(), Some("aio-key"));
        });
    }

    #[test]
    fn post_treats_any_response_as_terminal() {
        tokio_test::block_on(async {
            let script = vec![SimRadio::ok(429, "rate limited")];
            let mut client = client(SimRadio::new(0, script));
            assert!(!client.post("office-temp", &json!({"value": 1})).await.unwrap());
            assert_eq!(client.radio.requests, 1);
            assert_eq!(client.radio.resets, 0);
        });
    }

    #[test]
    fn post_resets_and_reconnects_after_each_transport_failure() {
        tokio_test::block_on(async {
            let script = vec![SimRadio::down(), SimRadio::down(), SimRadio::ok(200, "{}")];
            let mut client = client(SimRadio::new(0, script));
            assert!(client.post("office-temp", &json!({"value": 2})).await.unwrap());
            assert_eq!(client.radio.requests, 3);
            assert_eq!(client.radio.resets, 2);
            // initial join plus one rejoin per reset
            assert_eq!(client.radio.joins, 3);
        });
    }

    #[test]
    fn post_gives_up_after_five_attempts() {
        tokio_test::block_on(async {
            let script = (0..5).map(|_| SimRadio::down()).collect();
            let mut client = client(SimRadio::new(0, script));
            assert!(!client.post("office-temp", &json!({"value": 3})).await.unwrap());
            assert_eq!(client.radio.requests, 5);
            assert_eq!(client.radio.resets, 5);
        });
    }

    #[test]
    fn post_caps_transport_attempts_at_five() {
        tokio_test::block_on(async {
            let script = (0..9).map(|_| SimRadio::down()).collect();
            let mut client = client(SimRadio::new(0, script));
            assert!(!client.post("office-temp", &json!({"value": 4})).await.unwrap());
            assert_eq!(client.radio.requests, 5);
        });
    }

    #[test]
    fn refresh_local_time_parses_and_sets_the_rtc() {
        tokio_test::block_on(async {
            let script = vec![SimRadio::ok(200, TIME_REPLY)];
            let mut client = client(SimRadio::new(0, script));
            let now = client.refresh_local_time().await.unwrap();
            assert_eq!(
                (now.year, now.month, now.day),
                (2023, 5, 1)
            );
            assert_eq!((now.hour, now.minute, now.second), (14, 30, 0));
            assert_eq!((now.yearday, now.weekday), (121, 1));
            assert_eq!(client.rtc().last_sync(), Some(&now));
        });
    }

    #[test]
    fn refresh_local_time_requests_the_configured_timezone() {
        tokio_test::block_on(async {
            let script = vec![SimRadio::ok(200, TIME_REPLY)];
            let mut client = NetworkClient::with_policy(
                test_config(Some("Europe/Paris")),
                fast_policy(),
                SimRadio::new(0, script),
                SoftRtc::new(),
            );
            client.refresh_local_time().await.unwrap();
            let url = client.radio.last_url.clone().unwrap();
            assert!(url.contains("/integrations/time/strftime?x-aio-key=aio-key"));
            assert!(url.contains("&tz=Europe/Paris"));
        });
    }

    #[test]
    fn refresh_local_time_flags_malformed_replies() {
        tokio_test::block_on(async {
            let script = vec![SimRadio::ok(200, "")];
            let mut client = client(SimRadio::new(0, script));
            let err = client.refresh_local_time().await.unwrap_err();
            assert!(matches!(err, Error::TimeLookup(_)));
            assert!(err.to_string().contains("TIMEZONE"));
            assert!(client.rtc().last_sync().is_none());
        });
    }

    #[test]
    fn refresh_local_time_does_not_retry_transport_failures() {
        tokio_test::block_on(async {
            let script = vec![SimRadio::down()];
            let mut client = client(SimRadio::new(0, script));
            let err = client.refresh_local_time().await.unwrap_err();
            assert!(matches!(err, Error::Transport(_)));
            assert_eq!(client.radio.requests, 1);
            assert_eq!(client.radio.resets, 0);
        });
    }
}
