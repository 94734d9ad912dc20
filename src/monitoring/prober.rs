use std::time::{Duration, Instant, SystemTime};

use reqwest::header::{
    ACCEPT, ACCEPT_LANGUAGE, CACHE_CONTROL, HeaderMap, HeaderValue, PRAGMA,
};
use reqwest::redirect::Policy;
use tracing::warn;

use crate::config::ProbeConfig;
use crate::database::models::Monitor;
use crate::monitoring::cert::CertInspector;
use crate::monitoring::types::{CheckResult, MonitorStatus};

pub const USER_AGENT: &str = concat!("sitewatch/", env!("CARGO_PKG_VERSION"));

const MAX_REDIRECTS: usize = 5;
const BACKOFF_BASE_MS: u64 = 3000;

/// Certificates expiring within this many seconds annotate the result message
const CERT_NOTE_WINDOW_SECS: i64 = 30 * 86_400;
/// Certificates expiring within this many days downgrade an up result to warning
const CERT_WARNING_DAYS: i64 = 7;

/// Issues the monitored HTTP request with retry and backoff and evaluates
/// the configured success criteria
pub struct Prober {
    client: reqwest::Client,
    max_attempts: u32,
    inspector: CertInspector,
}

struct Attempt {
    http_code: Option<u16>,
    response_time_ms: u64,
    bytes_downloaded: u64,
    body: Option<String>,
    error: Option<String>,
}

impl Prober {
    pub fn new(config: &ProbeConfig) -> Result<Self, reqwest::Error> {
        let mut headers = HeaderMap::new();
        headers.insert(
            ACCEPT,
            HeaderValue::from_static(
                "text/html,application/xhtml+xml,application/xml;q=0.9,image/webp,*/*;q=0.8",
            ),
        );
        headers.insert(ACCEPT_LANGUAGE, HeaderValue::from_static("en-US,en;q=0.5"));
        headers.insert(CACHE_CONTROL, HeaderValue::from_static("no-cache"));
        headers.insert(PRAGMA, HeaderValue::from_static("no-cache"));
        headers.insert("x-uptime-check", HeaderValue::from_static("true"));

        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .default_headers(headers)
            .timeout(Duration::from_secs(config.timeout_seconds))
            .connect_timeout(Duration::from_secs(config.connect_timeout_seconds))
            .redirect(Policy::limited(MAX_REDIRECTS))
            .build()?;

        Ok(Self {
            client,
            max_attempts: config.retry_attempts.max(1),
            inspector: CertInspector::new(Duration::from_secs(config.connect_timeout_seconds)),
        })
    }

    /// Probe the monitor's URL, retrying with exponential backoff.
    ///
    /// Returns immediately on the first successful attempt; after
    /// exhausting the attempt budget the result carries the last failure
    /// reason. HTTPS targets get certificate details merged in.
    pub async fn probe(&self, monitor: &Monitor) -> CheckResult {
        let ssl_info = if monitor.url.starts_with("https://") {
            self.inspector.inspect(&monitor.url).await
        } else {
            None
        };

        let mut attempts = 0;
        loop {
            attempts += 1;
            let attempt = self.attempt(&monitor.url).await;

            let mut result = CheckResult::new(SystemTime::now());
            result.status = MonitorStatus::Up;
            result.message = "Site is up and functioning correctly.".to_string();
            result.http_code = attempt.http_code;
            result.response_time_ms = Some(attempt.response_time_ms);
            result.bytes_downloaded = attempt.bytes_downloaded;
            result.error = attempt.error.clone();
            result.attempts = attempts;
            result.ssl_info = ssl_info.clone();

            match evaluate(monitor, &attempt) {
                Ok(()) => {
                    if attempts > 1 {
                        result
                            .message
                            .push_str(&format!(" (Succeeded after {attempts} attempts)"));
                    }
                    annotate_certificate(&mut result, SystemTime::now());
                    return result;
                }
                Err(reason) => {
                    if attempts >= self.max_attempts {
                        result.status = MonitorStatus::Down;
                        result.message = format!("{reason} (Failed after {attempts} attempts)");
                        return result;
                    }
                    warn!(
                        monitor = %monitor.name,
                        attempt = attempts,
                        max_attempts = self.max_attempts,
                        reason = %reason,
                        "check failed, retrying"
                    );
                    tokio::time::sleep(backoff_delay(attempts)).await;
                }
            }
        }
    }

    async fn attempt(&self, url: &str) -> Attempt {
        let start = Instant::now();
        match self.client.get(url).send().await {
            Ok(response) => {
                let http_code = response.status().as_u16();
                match response.text().await {
                    Ok(body) => Attempt {
                        http_code: Some(http_code),
                        response_time_ms: start.elapsed().as_millis() as u64,
                        bytes_downloaded: body.len() as u64,
                        body: Some(body),
                        error: None,
                    },
                    Err(err) => Attempt {
                        http_code: Some(http_code),
                        response_time_ms: start.elapsed().as_millis() as u64,
                        bytes_downloaded: 0,
                        body: None,
                        error: Some(err.to_string()),
                    },
                }
            }
            Err(err) => Attempt {
                http_code: None,
                response_time_ms: start.elapsed().as_millis() as u64,
                bytes_downloaded: 0,
                body: None,
                error: Some(err.to_string()),
            },
        }
    }
}

/// Check one attempt against the monitor's success criteria
fn evaluate(monitor: &Monitor, attempt: &Attempt) -> Result<(), String> {
    if let Some(error) = &attempt.error {
        return Err(format!("Request error: {error}"));
    }

    if attempt.http_code != Some(monitor.expected_status_code) {
        return Err(format!(
            "Unexpected HTTP status code: expected {}, got {}",
            monitor.expected_status_code,
            attempt
                .http_code
                .map(|c| c.to_string())
                .unwrap_or_else(|| "none".to_string()),
        ));
    }

    if let Some(keyword) = &monitor.expected_keyword {
        let body = attempt.body.as_deref().unwrap_or("");
        if !body.contains(keyword.as_str()) {
            return Err("Expected keyword not found in the response".to_string());
        }
    }

    Ok(())
}

/// Delay before the attempt following `attempt` (1-based)
pub fn backoff_delay(attempt: u32) -> Duration {
    Duration::from_millis(BACKOFF_BASE_MS * 2u64.pow(attempt.saturating_sub(1)))
}

/// Annotate a successful result with certificate expiry information.
///
/// Expiry within 30 days adds a note to the message; within 7 days the
/// status is downgraded to warning even though the request itself passed.
fn annotate_certificate(result: &mut CheckResult, now: SystemTime) {
    let Some(cert) = &result.ssl_info else { return };
    if cert.seconds_until_expiry(now) < CERT_NOTE_WINDOW_SECS {
        let days = cert.days_until_expiry(now);
        result
            .message
            .push_str(&format!(" WARNING: SSL certificate expires in {days} days."));
        if days <= CERT_WARNING_DAYS {
            result.status = MonitorStatus::Warning;
        }
    }
}
