use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};

/// Observed status of a monitored endpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MonitorStatus {
    Up,
    Down,
    Warning,
    Unknown,
}

impl MonitorStatus {
    /// Parse a status stored in the database; anything unrecognized maps to Unknown
    pub fn parse(s: &str) -> Self {
        match s {
            "up" => MonitorStatus::Up,
            "down" => MonitorStatus::Down,
            "warning" => MonitorStatus::Warning,
            _ => MonitorStatus::Unknown,
        }
    }

    /// Whether this status counts toward a downtime streak
    pub fn is_failing(self) -> bool {
        matches!(self, MonitorStatus::Down | MonitorStatus::Warning)
    }

    /// Capitalized label for alert text
    pub fn label(self) -> &'static str {
        match self {
            MonitorStatus::Up => "Up",
            MonitorStatus::Down => "Down",
            MonitorStatus::Warning => "Warning",
            MonitorStatus::Unknown => "Unknown",
        }
    }
}

impl std::fmt::Display for MonitorStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MonitorStatus::Up => write!(f, "up"),
            MonitorStatus::Down => write!(f, "down"),
            MonitorStatus::Warning => write!(f, "warning"),
            MonitorStatus::Unknown => write!(f, "unknown"),
        }
    }
}

/// TLS certificate details captured during inspection
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CertInfo {
    /// Subject common name
    pub subject: String,

    /// Issuer common name
    pub issuer: String,

    /// Start of the validity window
    pub valid_from: SystemTime,

    /// End of the validity window
    pub valid_to: SystemTime,
}

impl CertInfo {
    /// Expiry timestamp as unix seconds
    pub fn valid_to_unix(&self) -> i64 {
        unix_seconds(self.valid_to)
    }

    /// Days until the certificate expires, rounded up; negative once expired
    pub fn days_until_expiry(&self, now: SystemTime) -> i64 {
        let diff = unix_seconds(self.valid_to) - unix_seconds(now);
        if diff >= 0 { (diff + 86_399) / 86_400 } else { -(-diff / 86_400) }
    }

    /// Seconds until the certificate expires; negative once expired
    pub fn seconds_until_expiry(&self, now: SystemTime) -> i64 {
        unix_seconds(self.valid_to) - unix_seconds(now)
    }
}

/// Immutable outcome of one probe
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckResult {
    /// Status classification derived from the probe
    pub status: MonitorStatus,

    /// Human-readable outcome summary
    pub message: String,

    /// HTTP status code of the final response, if one was received
    pub http_code: Option<u16>,

    /// Round-trip time of the deciding attempt in milliseconds
    pub response_time_ms: Option<u64>,

    /// Response body size in bytes
    pub bytes_downloaded: u64,

    /// Transport-level error text, if any
    pub error: Option<String>,

    /// Number of attempts consumed
    pub attempts: u32,

    /// Peer certificate details for HTTPS targets
    pub ssl_info: Option<CertInfo>,

    /// When the probe concluded
    pub checked_at: SystemTime,
}

impl CheckResult {
    pub fn new(checked_at: SystemTime) -> Self {
        Self {
            status: MonitorStatus::Unknown,
            message: String::new(),
            http_code: None,
            response_time_ms: None,
            bytes_downloaded: 0,
            error: None,
            attempts: 0,
            ssl_info: None,
            checked_at,
        }
    }
}

/// Why an alert fires; constructed and consumed within one dispatch
#[derive(Debug, Clone)]
pub enum AlertEvent {
    /// First transition into down/warning
    Down { result: CheckResult },

    /// Ongoing failure past the alert cooldown
    StillDown {
        result: CheckResult,
        consecutive_failures: u32,
    },

    /// Back up after a downtime streak
    Recovery {
        result: CheckResult,
        downtime: Option<String>,
        failed_checks: u32,
    },
}

impl AlertEvent {
    pub fn result(&self) -> &CheckResult {
        match self {
            AlertEvent::Down { result }
            | AlertEvent::StillDown { result, .. }
            | AlertEvent::Recovery { result, .. } => result,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            AlertEvent::Down { .. } => "down",
            AlertEvent::StillDown { .. } => "still_down",
            AlertEvent::Recovery { .. } => "recovery",
        }
    }
}

pub(crate) fn unix_seconds(time: SystemTime) -> i64 {
    match time.duration_since(UNIX_EPOCH) {
        Ok(d) => d.as_secs() as i64,
        Err(e) => -(e.duration().as_secs() as i64),
    }
}
