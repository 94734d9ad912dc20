/// Alerting module - renders alert text and fans it out to channels
///
/// Channel configuration lives in the settings table so it can be changed
/// without redeploying; absent configuration means a channel is skipped,
/// never that dispatch fails.
pub mod dispatcher;
pub mod email;
pub mod smtp;
pub mod telegram;

pub use dispatcher::AlertDispatcher;

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tracing::{info, warn};

use crate::alerts::smtp::{SmtpError, SmtpSettings, client_hostname};
use crate::database::repository::{SettingsStore, StoreError};
use crate::monitoring::state::DEFAULT_ALERT_COOLDOWN;

/// SMTP hosts that mark a placeholder, not a real relay
const PLACEHOLDER_SMTP_HOSTS: &[&str] = &["test", "localhost"];

#[derive(Debug, Error)]
pub enum ChannelError {
    #[error("smtp: {0}")]
    Smtp(#[from] SmtpError),
    #[error("telegram api error: {0}")]
    Telegram(String),
    #[error("http: {0}")]
    Http(#[from] reqwest::Error),
}

#[async_trait]
pub trait EmailSender: Send + Sync {
    async fn send(&self, to: &str, subject: &str, body: &str) -> Result<(), ChannelError>;
}

#[async_trait]
pub trait TelegramSender: Send + Sync {
    async fn send(&self, chat_id: &str, text: &str) -> Result<(), ChannelError>;
}

/// Alerting configuration pulled from the settings store at tick start
#[derive(Debug, Clone)]
pub struct AlertSettings {
    /// None when SMTP is unconfigured or points at a placeholder host
    pub smtp: Option<SmtpSettings>,
    pub admin_email: Option<String>,
    pub telegram_bot_token: Option<String>,
    pub telegram_default_chat_id: Option<String>,
    pub cooldown: Duration,
}

impl AlertSettings {
    pub async fn load(store: &dyn SettingsStore) -> Result<Self, StoreError> {
        let cooldown = match setting(store, "alert_cooldown").await? {
            Some(raw) => match raw.parse::<u64>() {
                Ok(secs) => Duration::from_secs(secs),
                Err(_) => {
                    warn!(value = %raw, "unparsable alert_cooldown setting, using default");
                    DEFAULT_ALERT_COOLDOWN
                }
            },
            None => DEFAULT_ALERT_COOLDOWN,
        };

        Ok(Self {
            smtp: load_smtp(store).await?,
            admin_email: setting(store, "admin_email").await?,
            telegram_bot_token: setting(store, "telegram_bot_token").await?,
            telegram_default_chat_id: setting(store, "telegram_default_chat_id").await?,
            cooldown,
        })
    }
}

async fn setting(store: &dyn SettingsStore, key: &str) -> Result<Option<String>, StoreError> {
    Ok(store
        .get_setting(key)
        .await?
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty()))
}

async fn load_smtp(store: &dyn SettingsStore) -> Result<Option<SmtpSettings>, StoreError> {
    let Some(host) = setting(store, "smtp_host").await? else {
        return Ok(None);
    };
    if PLACEHOLDER_SMTP_HOSTS.contains(&host.as_str()) {
        info!(%host, "smtp host is a placeholder, email alerts disabled");
        return Ok(None);
    }
    let (Some(port), Some(username), Some(password)) = (
        setting(store, "smtp_port").await?,
        setting(store, "smtp_user").await?,
        setting(store, "smtp_pass").await?,
    ) else {
        return Ok(None);
    };
    let Ok(port) = port.parse::<u16>() else {
        warn!(value = %port, "unparsable smtp_port setting, email alerts disabled");
        return Ok(None);
    };

    let from_address = match setting(store, "smtp_from").await? {
        Some(from) => from,
        None => format!("noreply@{}", client_hostname()),
    };

    Ok(Some(SmtpSettings {
        host,
        port,
        username,
        password,
        from_address,
    }))
}
