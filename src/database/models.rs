use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};
use uuid::Uuid;

use crate::monitoring::types::MonitorStatus;

/// Monitor model - a watched target plus its observed state
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Monitor {
    pub id: Option<i64>,
    pub uuid: Uuid,
    pub name: String,
    pub url: String,
    /// Seconds between checks
    pub check_interval: u64,
    pub expected_status_code: u16,
    /// Substring that must appear in a healthy response body
    pub expected_keyword: Option<String>,
    pub notification_emails: Vec<String>,
    pub telegram_chat_ids: Vec<String>,
    pub enabled: bool,
    pub last_status: MonitorStatus,
    pub previous_status: Option<MonitorStatus>,
    pub last_check_time: Option<SystemTime>,
    pub last_response_time_ms: Option<u64>,
    pub last_status_code: Option<u16>,
    pub last_error: Option<String>,
    /// Start of the current non-up streak; present iff status is down/warning
    pub downtime_start: Option<SystemTime>,
    pub consecutive_failures: u32,
    pub last_alert_time: Option<SystemTime>,
    pub ssl_expiry: Option<SystemTime>,
    pub ssl_issuer: Option<String>,
    pub created_at: SystemTime,
    pub updated_at: SystemTime,
}

impl Monitor {
    /// Create a new monitor with default expectations
    pub fn new(name: String, url: String, check_interval: u64) -> Self {
        let now = SystemTime::now();
        Self {
            id: None,
            uuid: Uuid::new_v4(),
            name,
            url,
            check_interval,
            expected_status_code: 200,
            expected_keyword: None,
            notification_emails: Vec::new(),
            telegram_chat_ids: Vec::new(),
            enabled: true,
            last_status: MonitorStatus::Unknown,
            previous_status: None,
            last_check_time: None,
            last_response_time_ms: None,
            last_status_code: None,
            last_error: None,
            downtime_start: None,
            consecutive_failures: 0,
            last_alert_time: None,
            ssl_expiry: None,
            ssl_issuer: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Convert SystemTime to Unix timestamp
    pub fn timestamp_to_i64(time: SystemTime) -> i64 {
        time.duration_since(UNIX_EPOCH).unwrap_or_default().as_secs() as i64
    }

    /// Convert Unix timestamp to SystemTime
    pub fn i64_to_timestamp(timestamp: i64) -> SystemTime {
        UNIX_EPOCH + std::time::Duration::from_secs(timestamp.max(0) as u64)
    }
}

/// Split a stored recipient column into trimmed, non-empty entries.
/// Accepts both space-separated (emails) and comma-separated (chat ids) data.
pub fn split_recipient_list(raw: &str) -> Vec<String> {
    raw.split([' ', ',', '\t', '\n'])
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

/// Join recipients back into a single column value
pub fn join_recipient_list(items: &[String], separator: &str) -> String {
    items.join(separator)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_monitor_starts_unknown_with_zero_failures() {
        let monitor = Monitor::new("api".to_string(), "https://example.com".to_string(), 300);
        assert_eq!(monitor.last_status, MonitorStatus::Unknown);
        assert_eq!(monitor.consecutive_failures, 0);
        assert!(monitor.downtime_start.is_none());
        assert_eq!(monitor.expected_status_code, 200);
    }

    #[test]
    fn recipient_list_roundtrip() {
        let parsed = split_recipient_list("ops@example.com  admin@example.com,");
        assert_eq!(parsed, vec!["ops@example.com", "admin@example.com"]);
        assert_eq!(
            join_recipient_list(&parsed, " "),
            "ops@example.com admin@example.com"
        );
        assert!(split_recipient_list("  ").is_empty());
    }
}
