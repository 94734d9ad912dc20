use std::time::SystemTime;

use tracing::{info, warn};

use crate::alerts::email::EmailChannel;
use crate::alerts::telegram::TelegramChannel;
use crate::alerts::{AlertSettings, EmailSender, TelegramSender};
use crate::database::models::Monitor;
use crate::monitoring::types::{AlertEvent, MonitorStatus};

/// Rendered, channel-agnostic alert text
#[derive(Debug, Clone)]
pub struct RenderedAlert {
    pub subject: String,
    pub body: String,
}

/// Fans alert events out to the configured channels.
///
/// Each recipient send is independent; a failure is logged and counted
/// but never aborts the remaining sends. An unconfigured channel is
/// skipped without counting against the result.
pub struct AlertDispatcher {
    email: Option<Box<dyn EmailSender>>,
    telegram: Option<Box<dyn TelegramSender>>,
    admin_email: Option<String>,
    default_chat_id: Option<String>,
}

impl AlertDispatcher {
    pub fn new(
        email: Option<Box<dyn EmailSender>>,
        telegram: Option<Box<dyn TelegramSender>>,
        admin_email: Option<String>,
        default_chat_id: Option<String>,
    ) -> Self {
        Self {
            email,
            telegram,
            admin_email,
            default_chat_id,
        }
    }

    pub fn from_settings(settings: &AlertSettings) -> Self {
        let email = settings
            .smtp
            .clone()
            .map(|smtp| Box::new(EmailChannel::new(smtp)) as Box<dyn EmailSender>);
        let telegram = settings
            .telegram_bot_token
            .clone()
            .map(|token| Box::new(TelegramChannel::new(token)) as Box<dyn TelegramSender>);
        Self::new(
            email,
            telegram,
            settings.admin_email.clone(),
            settings.telegram_default_chat_id.clone(),
        )
    }

    /// Send the alert everywhere it should go. Returns whether every
    /// attempted send succeeded.
    pub async fn dispatch(&self, monitor: &Monitor, event: &AlertEvent) -> bool {
        let alert = render_alert(monitor, event, SystemTime::now());
        let mut all_sent = true;

        let recipients =
            collect_recipients(&monitor.notification_emails, self.admin_email.as_ref());
        if !recipients.is_empty() {
            match &self.email {
                None => {
                    info!(monitor = %monitor.name, "smtp not configured, skipping email alerts")
                }
                Some(channel) => {
                    for to in &recipients {
                        if !is_valid_email(to) {
                            warn!(monitor = %monitor.name, address = %to, "invalid notification address");
                            all_sent = false;
                            continue;
                        }
                        match channel.send(to, &alert.subject, &alert.body).await {
                            Ok(()) => info!(
                                monitor = %monitor.name,
                                address = %to,
                                kind = event.kind(),
                                "email alert sent"
                            ),
                            Err(err) => {
                                warn!(
                                    monitor = %monitor.name,
                                    address = %to,
                                    error = %err,
                                    "email alert failed"
                                );
                                all_sent = false;
                            }
                        }
                    }
                }
            }
        }

        let chats = collect_recipients(&monitor.telegram_chat_ids, self.default_chat_id.as_ref());
        if !chats.is_empty() {
            match &self.telegram {
                None => {
                    info!(monitor = %monitor.name, "telegram bot token not configured, skipping telegram alerts")
                }
                Some(channel) => {
                    for chat_id in &chats {
                        match channel.send(chat_id, &alert.body).await {
                            Ok(()) => info!(
                                monitor = %monitor.name,
                                chat_id = %chat_id,
                                kind = event.kind(),
                                "telegram alert sent"
                            ),
                            Err(err) => {
                                warn!(
                                    monitor = %monitor.name,
                                    chat_id = %chat_id,
                                    error = %err,
                                    "telegram alert failed"
                                );
                                all_sent = false;
                            }
                        }
                    }
                }
            }
        }

        all_sent
    }
}

/// Monitor recipients plus the global one, deduplicated in order
fn collect_recipients(own: &[String], extra: Option<&String>) -> Vec<String> {
    let mut recipients: Vec<String> = Vec::new();
    for candidate in own.iter().chain(extra) {
        let candidate = candidate.trim();
        if !candidate.is_empty() && !recipients.iter().any(|r| r == candidate) {
            recipients.push(candidate.to_string());
        }
    }
    recipients
}

fn is_valid_email(address: &str) -> bool {
    let Some((local, domain)) = address.split_once('@') else {
        return false;
    };
    !local.is_empty()
        && !domain.is_empty()
        && !domain.contains('@')
        && domain.contains('.')
        && !domain.starts_with('.')
        && !domain.ends_with('.')
        && !address.chars().any(char::is_whitespace)
}

/// Compose subject and body for an alert event
pub fn render_alert(monitor: &Monitor, event: &AlertEvent, now: SystemTime) -> RenderedAlert {
    let result = event.result();
    let status_label = result.status.label();

    let (subject, header, status_line) = match event {
        AlertEvent::Down { .. } => {
            let emoji = if result.status == MonitorStatus::Warning {
                "⚠️"
            } else {
                "🔴"
            };
            (
                format!("{emoji} Alert: {} is {}!", monitor.name, result.status),
                format!("{emoji} Alert for {}", monitor.name),
                format!("Status: {status_label}"),
            )
        }
        AlertEvent::StillDown {
            consecutive_failures,
            ..
        } => (
            format!("🔴 STILL DOWN: {} remains offline", monitor.name),
            format!("🔴 Monitor Still Down: {}", monitor.name),
            format!("Status: {status_label} (Ongoing issue, {consecutive_failures} failed checks)"),
        ),
        AlertEvent::Recovery { .. } => (
            format!("✅ RECOVERED: {} is back online!", monitor.name),
            format!("🟢 Monitor Recovered: {}", monitor.name),
            "Status: ONLINE".to_string(),
        ),
    };

    let mut body = format!("{header}\n\n{status_line}\n");
    body.push_str(&format!("URL: {}\n", monitor.url));
    body.push_str(&format!("Time: {}\n", format_timestamp(now)));
    if let Some(code) = result.http_code {
        body.push_str(&format!("HTTP Status: {code}\n"));
    }
    if let Some(ms) = result.response_time_ms {
        body.push_str(&format!("Response Time: {ms}ms\n"));
    }
    if let Some(error) = &result.error {
        if !error.is_empty() {
            body.push_str(&format!("Error: {error}\n"));
        }
    }

    if let AlertEvent::Recovery {
        downtime,
        failed_checks,
        ..
    } = event
    {
        body.push_str("\n📊 Downtime Summary:\n");
        if let Some(duration) = downtime {
            body.push_str(&format!("Duration: {duration}\n"));
        }
        body.push_str(&format!("Failed Checks: {failed_checks}\n"));
        body.push_str(&format!("Recovery Time: {}\n", format_timestamp(now)));
    }

    if let Some(cert) = &result.ssl_info {
        let days = cert.days_until_expiry(now);
        body.push_str("\nSSL Certificate Information:\n");
        body.push_str(&format!("Issuer: {}\n", cert.issuer));
        body.push_str(&format!("Valid From: {}\n", format_timestamp(cert.valid_from)));
        body.push_str(&format!("Valid Until: {}\n", format_timestamp(cert.valid_to)));
        body.push_str(&format!("Days Until Expiry: {days}\n"));
        if days <= 30 {
            body.push_str(&format!(
                "\n⚠️ WARNING: Certificate expires in {days} days!\n"
            ));
        }
    }

    RenderedAlert { subject, body }
}

fn format_timestamp(time: SystemTime) -> String {
    chrono::DateTime::<chrono::Utc>::from(time)
        .format("%Y-%m-%d %H:%M:%S")
        .to_string()
}
