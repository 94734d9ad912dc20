use std::time::{Duration, SystemTime};

use crate::database::models::Monitor;
use crate::monitoring::types::{AlertEvent, CheckResult, MonitorStatus};

/// Minimum elapsed time between repeated alerts for the same ongoing failure
pub const DEFAULT_ALERT_COOLDOWN: Duration = Duration::from_secs(3600);

/// Columns to write back after a probe, derived from the previous state
/// and the new check result
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StateDelta {
    pub previous_status: MonitorStatus,
    pub status: MonitorStatus,
    pub downtime_start: Option<SystemTime>,
    pub consecutive_failures: u32,
}

/// Derives state transitions from successive probe results.
///
/// The tracker itself is stateless; the monitor row carries the state and
/// the caller persists the returned delta before dispatching the event.
pub struct StateTracker {
    cooldown: Duration,
}

impl StateTracker {
    pub fn new(cooldown: Duration) -> Self {
        Self { cooldown }
    }

    /// Compute the next state and the alert to raise, if any.
    ///
    /// A first transition into down/warning always raises `Down`. While the
    /// failure continues, counters keep updating but `StillDown` is only
    /// raised once the cooldown since the last alert has elapsed. Returning
    /// to up always raises `Recovery`.
    pub fn apply(
        &self,
        monitor: &Monitor,
        result: &CheckResult,
        now: SystemTime,
    ) -> (StateDelta, Option<AlertEvent>) {
        let was_failing = monitor.last_status.is_failing();
        let is_failing = result.status.is_failing();

        let (delta, event) = match (was_failing, is_failing) {
            (false, true) => {
                let delta = StateDelta {
                    previous_status: monitor.last_status,
                    status: result.status,
                    downtime_start: Some(now),
                    consecutive_failures: 1,
                };
                (delta, Some(AlertEvent::Down { result: result.clone() }))
            }
            (true, true) => {
                let failures = monitor.consecutive_failures + 1;
                let delta = StateDelta {
                    previous_status: monitor.last_status,
                    status: result.status,
                    downtime_start: monitor.downtime_start,
                    consecutive_failures: failures,
                };
                let event = self
                    .cooldown_elapsed(monitor.last_alert_time, now)
                    .then(|| AlertEvent::StillDown {
                        result: result.clone(),
                        consecutive_failures: failures,
                    });
                (delta, event)
            }
            (true, false) => {
                let delta = StateDelta {
                    previous_status: monitor.last_status,
                    status: result.status,
                    downtime_start: None,
                    consecutive_failures: 0,
                };
                let downtime = monitor
                    .downtime_start
                    .and_then(|start| now.duration_since(start).ok())
                    .map(format_downtime);
                let event = AlertEvent::Recovery {
                    result: result.clone(),
                    downtime,
                    failed_checks: monitor.consecutive_failures,
                };
                (delta, Some(event))
            }
            (false, false) => {
                let delta = StateDelta {
                    previous_status: monitor.last_status,
                    status: result.status,
                    downtime_start: None,
                    consecutive_failures: 0,
                };
                (delta, None)
            }
        };

        (delta, event)
    }

    fn cooldown_elapsed(&self, last_alert: Option<SystemTime>, now: SystemTime) -> bool {
        match last_alert {
            None => true,
            Some(last) => match now.duration_since(last) {
                Ok(elapsed) => elapsed >= self.cooldown,
                Err(_) => false,
            },
        }
    }
}

/// Render a downtime duration with the largest applicable units.
///
/// Minutes-only or shorter streaks also show seconds, so brief outages
/// never render as an empty string.
pub fn format_downtime(duration: Duration) -> String {
    let total = duration.as_secs();
    let days = total / 86_400;
    let hours = (total % 86_400) / 3_600;
    let minutes = (total % 3_600) / 60;
    let seconds = total % 60;

    let mut parts = Vec::new();
    if days > 0 {
        parts.push(pluralize(days, "day"));
    }
    if hours > 0 {
        parts.push(pluralize(hours, "hour"));
    }
    if minutes > 0 {
        parts.push(pluralize(minutes, "minute"));
    }
    if parts.is_empty() || (days == 0 && hours == 0) {
        parts.push(pluralize(seconds, "second"));
    }

    parts.join(", ")
}

fn pluralize(count: u64, unit: &str) -> String {
    if count == 1 {
        format!("{count} {unit}")
    } else {
        format!("{count} {unit}s")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::UNIX_EPOCH;

    fn monitor_with_status(status: MonitorStatus) -> Monitor {
        let mut monitor =
            Monitor::new("api".to_string(), "https://example.com".to_string(), 300);
        monitor.id = Some(1);
        monitor.last_status = status;
        monitor
    }

    fn result_with_status(status: MonitorStatus, at: SystemTime) -> CheckResult {
        let mut result = CheckResult::new(at);
        result.status = status;
        result
    }

    fn apply_delta(monitor: &mut Monitor, delta: &StateDelta) {
        monitor.previous_status = Some(delta.previous_status);
        monitor.last_status = delta.status;
        monitor.downtime_start = delta.downtime_start;
        monitor.consecutive_failures = delta.consecutive_failures;
    }

    #[test]
    fn transition_to_down_starts_streak_and_alerts() {
        let tracker = StateTracker::new(DEFAULT_ALERT_COOLDOWN);
        let monitor = monitor_with_status(MonitorStatus::Up);
        let now = UNIX_EPOCH + Duration::from_secs(1_000_000);
        let result = result_with_status(MonitorStatus::Down, now);

        let (delta, event) = tracker.apply(&monitor, &result, now);

        assert_eq!(delta.status, MonitorStatus::Down);
        assert_eq!(delta.downtime_start, Some(now));
        assert_eq!(delta.consecutive_failures, 1);
        assert!(matches!(event, Some(AlertEvent::Down { .. })));
    }

    #[test]
    fn first_check_ever_failing_alerts() {
        let tracker = StateTracker::new(DEFAULT_ALERT_COOLDOWN);
        let monitor = monitor_with_status(MonitorStatus::Unknown);
        let now = UNIX_EPOCH + Duration::from_secs(1_000_000);
        let result = result_with_status(MonitorStatus::Warning, now);

        let (delta, event) = tracker.apply(&monitor, &result, now);

        assert_eq!(delta.consecutive_failures, 1);
        assert!(matches!(event, Some(AlertEvent::Down { .. })));
    }

    #[test]
    fn continued_failure_within_cooldown_is_suppressed() {
        let tracker = StateTracker::new(Duration::from_secs(3600));
        let start = UNIX_EPOCH + Duration::from_secs(1_000_000);
        let mut monitor = monitor_with_status(MonitorStatus::Down);
        monitor.downtime_start = Some(start);
        monitor.consecutive_failures = 1;
        monitor.last_alert_time = Some(start);

        let now = start + Duration::from_secs(3599);
        let result = result_with_status(MonitorStatus::Down, now);
        let (delta, event) = tracker.apply(&monitor, &result, now);

        // counters still advance while the alert is suppressed
        assert_eq!(delta.consecutive_failures, 2);
        assert_eq!(delta.downtime_start, Some(start));
        assert!(event.is_none());
    }

    #[test]
    fn continued_failure_fires_at_cooldown_boundary() {
        let tracker = StateTracker::new(Duration::from_secs(3600));
        let start = UNIX_EPOCH + Duration::from_secs(1_000_000);
        let mut monitor = monitor_with_status(MonitorStatus::Down);
        monitor.downtime_start = Some(start);
        monitor.consecutive_failures = 3;
        monitor.last_alert_time = Some(start);

        let now = start + Duration::from_secs(3600);
        let result = result_with_status(MonitorStatus::Down, now);
        let (delta, event) = tracker.apply(&monitor, &result, now);

        assert_eq!(delta.consecutive_failures, 4);
        match event {
            Some(AlertEvent::StillDown { consecutive_failures, .. }) => {
                assert_eq!(consecutive_failures, 4)
            }
            other => panic!("expected StillDown, got {other:?}"),
        }
    }

    #[test]
    fn continued_failure_without_prior_alert_fires() {
        let tracker = StateTracker::new(Duration::from_secs(3600));
        let start = UNIX_EPOCH + Duration::from_secs(1_000_000);
        let mut monitor = monitor_with_status(MonitorStatus::Warning);
        monitor.downtime_start = Some(start);
        monitor.consecutive_failures = 1;
        monitor.last_alert_time = None;

        let now = start + Duration::from_secs(60);
        let result = result_with_status(MonitorStatus::Warning, now);
        let (_, event) = tracker.apply(&monitor, &result, now);

        assert!(matches!(event, Some(AlertEvent::StillDown { .. })));
    }

    #[test]
    fn recovery_clears_streak_and_reports_duration() {
        let tracker = StateTracker::new(DEFAULT_ALERT_COOLDOWN);
        let start = UNIX_EPOCH + Duration::from_secs(1_000_000);
        let mut monitor = monitor_with_status(MonitorStatus::Down);
        monitor.downtime_start = Some(start);
        monitor.consecutive_failures = 5;
        monitor.last_alert_time = Some(start);

        let now = start + Duration::from_secs(25 * 3600);
        let result = result_with_status(MonitorStatus::Up, now);
        let (delta, event) = tracker.apply(&monitor, &result, now);

        assert_eq!(delta.status, MonitorStatus::Up);
        assert_eq!(delta.downtime_start, None);
        assert_eq!(delta.consecutive_failures, 0);
        match event {
            Some(AlertEvent::Recovery { downtime, failed_checks, .. }) => {
                assert_eq!(downtime.as_deref(), Some("1 day, 1 hour"));
                assert_eq!(failed_checks, 5);
            }
            other => panic!("expected Recovery, got {other:?}"),
        }
    }

    #[test]
    fn healthy_checks_produce_no_event() {
        let tracker = StateTracker::new(DEFAULT_ALERT_COOLDOWN);
        let now = UNIX_EPOCH + Duration::from_secs(1_000_000);
        let result = result_with_status(MonitorStatus::Up, now);

        for prior in [MonitorStatus::Up, MonitorStatus::Unknown] {
            let (delta, event) = tracker.apply(&monitor_with_status(prior), &result, now);
            assert_eq!(delta.consecutive_failures, 0);
            assert!(delta.downtime_start.is_none());
            assert!(event.is_none());
        }
    }

    #[test]
    fn downtime_formatting() {
        assert_eq!(format_downtime(Duration::from_secs(45)), "45 seconds");
        assert_eq!(format_downtime(Duration::from_secs(1)), "1 second");
        assert_eq!(format_downtime(Duration::from_secs(25 * 3600)), "1 day, 1 hour");
        assert_eq!(
            format_downtime(Duration::from_secs(3 * 60 + 12)),
            "3 minutes, 12 seconds"
        );
        assert_eq!(
            format_downtime(Duration::from_secs(2 * 86_400 + 5 * 3600 + 30 * 60)),
            "2 days, 5 hours, 30 minutes"
        );
        assert_eq!(format_downtime(Duration::from_secs(0)), "0 seconds");
    }

    // A full outage: down, suppressed continuation, recovery. One Down
    // alert and one Recovery alert in total.
    #[test]
    fn outage_lifecycle_emits_exactly_two_alerts() {
        let tracker = StateTracker::new(Duration::from_secs(3600));
        let mut monitor = monitor_with_status(MonitorStatus::Unknown);
        let t0 = UNIX_EPOCH + Duration::from_secs(1_000_000);
        let tick = Duration::from_secs(300);
        let mut events = Vec::new();

        for (i, status) in [
            MonitorStatus::Down,
            MonitorStatus::Down,
            MonitorStatus::Down,
            MonitorStatus::Up,
        ]
        .into_iter()
        .enumerate()
        {
            let now = t0 + tick * i as u32;
            let result = result_with_status(status, now);
            let (delta, event) = tracker.apply(&monitor, &result, now);
            apply_delta(&mut monitor, &delta);
            if let Some(event) = &event {
                match event {
                    AlertEvent::Recovery { .. } => monitor.last_alert_time = None,
                    _ => monitor.last_alert_time = Some(now),
                }
            }
            // invariant: failures are zero exactly when the monitor is up
            assert_eq!(
                monitor.consecutive_failures == 0,
                !monitor.last_status.is_failing()
            );
            assert_eq!(monitor.downtime_start.is_some(), monitor.last_status.is_failing());
            events.extend(event);
        }

        assert_eq!(events.len(), 2);
        assert!(matches!(events[0], AlertEvent::Down { .. }));
        assert!(matches!(events[1], AlertEvent::Recovery { .. }));
        assert!(monitor.last_alert_time.is_none());
    }
}
