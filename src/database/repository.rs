use std::time::SystemTime;

use async_trait::async_trait;
use libsql::params;
use thiserror::Error;
use uuid::Uuid;

use super::models::{Monitor, join_recipient_list, split_recipient_list};
use crate::monitoring::state::StateDelta;
use crate::monitoring::types::{CheckResult, MonitorStatus};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] libsql::Error),
    #[error("connection pool error: {0}")]
    Pool(#[from] deadpool::managed::PoolError<libsql::Error>),
    #[error("corrupt row: {0}")]
    Corrupt(String),
}

/// Persistence interface for monitors and their observed state
#[async_trait]
pub trait MonitorStore: Send + Sync {
    /// Enabled monitors whose interval has elapsed (or that were never checked)
    async fn list_due_monitors(&self) -> Result<Vec<Monitor>, StoreError>;

    async fn list_monitors(&self) -> Result<Vec<Monitor>, StoreError>;

    async fn get_monitor(&self, id: i64) -> Result<Option<Monitor>, StoreError>;

    async fn insert_monitor(&self, monitor: &Monitor) -> Result<i64, StoreError>;

    async fn update_monitor(&self, monitor: &Monitor) -> Result<(), StoreError>;

    async fn delete_monitor(&self, id: i64) -> Result<(), StoreError>;

    /// Write a probe outcome and the derived state columns back in one update
    async fn persist_check_result(
        &self,
        id: i64,
        result: &CheckResult,
        delta: &StateDelta,
    ) -> Result<(), StoreError>;

    /// Record (or clear) when the monitor last alerted
    async fn persist_alert_time(
        &self,
        id: i64,
        time: Option<SystemTime>,
    ) -> Result<(), StoreError>;
}

/// Runtime-tunable key/value settings (SMTP, Telegram, cooldown override)
#[async_trait]
pub trait SettingsStore: Send + Sync {
    async fn get_setting(&self, key: &str) -> Result<Option<String>, StoreError>;

    async fn set_setting(&self, key: &str, value: &str) -> Result<(), StoreError>;
}

const MONITOR_COLUMNS: &str = "id, uuid, name, url, check_interval, expected_status_code, \
     expected_keyword, notification_emails, telegram_chat_ids, enabled, \
     last_status, previous_status, last_check_time, last_response_time, \
     last_status_code, last_error, downtime_start, consecutive_failures, \
     last_alert_time, ssl_expiry, ssl_issuer, created_at, updated_at";

/// LibSQL-backed store implementation
pub struct LibsqlStore {
    pool: crate::pool::LibsqlPool,
}

impl LibsqlStore {
    pub fn new(pool: crate::pool::LibsqlPool) -> Self {
        Self { pool }
    }

    async fn get_conn(
        &self,
    ) -> Result<deadpool::managed::Object<crate::pool::LibsqlManager>, StoreError> {
        Ok(self.pool.get().await?)
    }
}

fn monitor_from_row(row: &libsql::Row) -> Result<Monitor, StoreError> {
    let uuid_str: String = row.get(1)?;
    let uuid = Uuid::parse_str(&uuid_str)
        .map_err(|e| StoreError::Corrupt(format!("monitor uuid {uuid_str:?}: {e}")))?;

    Ok(Monitor {
        id: Some(row.get(0)?),
        uuid,
        name: row.get(2)?,
        url: row.get(3)?,
        check_interval: row.get::<i64>(4)?.max(0) as u64,
        expected_status_code: row.get::<i64>(5)? as u16,
        expected_keyword: row.get::<Option<String>>(6)?.filter(|k| !k.is_empty()),
        notification_emails: split_recipient_list(&row.get::<String>(7)?),
        telegram_chat_ids: split_recipient_list(&row.get::<String>(8)?),
        enabled: row.get::<i64>(9)? != 0,
        last_status: row
            .get::<Option<String>>(10)?
            .map(|s| MonitorStatus::parse(&s))
            .unwrap_or(MonitorStatus::Unknown),
        previous_status: row
            .get::<Option<String>>(11)?
            .map(|s| MonitorStatus::parse(&s)),
        last_check_time: row.get::<Option<i64>>(12)?.map(Monitor::i64_to_timestamp),
        last_response_time_ms: row.get::<Option<i64>>(13)?.map(|v| v.max(0) as u64),
        last_status_code: row.get::<Option<i64>>(14)?.map(|v| v as u16),
        last_error: row.get(15)?,
        downtime_start: row.get::<Option<i64>>(16)?.map(Monitor::i64_to_timestamp),
        consecutive_failures: row.get::<i64>(17)?.max(0) as u32,
        last_alert_time: row.get::<Option<i64>>(18)?.map(Monitor::i64_to_timestamp),
        ssl_expiry: row.get::<Option<i64>>(19)?.map(Monitor::i64_to_timestamp),
        ssl_issuer: row.get(20)?,
        created_at: Monitor::i64_to_timestamp(row.get(21)?),
        updated_at: Monitor::i64_to_timestamp(row.get(22)?),
    })
}

fn status_column(status: MonitorStatus) -> Option<String> {
    (status != MonitorStatus::Unknown).then(|| status.to_string())
}

#[async_trait]
impl MonitorStore for LibsqlStore {
    async fn list_due_monitors(&self) -> Result<Vec<Monitor>, StoreError> {
        let conn = self.get_conn().await?;
        let now = Monitor::timestamp_to_i64(SystemTime::now());
        let sql = format!(
            "SELECT {MONITOR_COLUMNS} FROM monitors \
             WHERE enabled = 1 AND (last_check_time IS NULL OR last_check_time + check_interval <= ?1) \
             ORDER BY id"
        );
        let mut rows = conn.query(&sql, params![now]).await?;

        let mut monitors = Vec::new();
        while let Some(row) = rows.next().await? {
            monitors.push(monitor_from_row(&row)?);
        }
        Ok(monitors)
    }

    async fn list_monitors(&self) -> Result<Vec<Monitor>, StoreError> {
        let conn = self.get_conn().await?;
        let sql = format!("SELECT {MONITOR_COLUMNS} FROM monitors ORDER BY id");
        let mut rows = conn.query(&sql, ()).await?;

        let mut monitors = Vec::new();
        while let Some(row) = rows.next().await? {
            monitors.push(monitor_from_row(&row)?);
        }
        Ok(monitors)
    }

    async fn get_monitor(&self, id: i64) -> Result<Option<Monitor>, StoreError> {
        let conn = self.get_conn().await?;
        let sql = format!("SELECT {MONITOR_COLUMNS} FROM monitors WHERE id = ?1");
        let mut rows = conn.query(&sql, params![id]).await?;

        match rows.next().await? {
            Some(row) => Ok(Some(monitor_from_row(&row)?)),
            None => Ok(None),
        }
    }

    async fn insert_monitor(&self, monitor: &Monitor) -> Result<i64, StoreError> {
        let conn = self.get_conn().await?;
        conn.execute(
            "INSERT INTO monitors (uuid, name, url, check_interval, expected_status_code, \
             expected_keyword, notification_emails, telegram_chat_ids, enabled, \
             consecutive_failures, created_at, updated_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, 0, ?, ?)",
            params![
                monitor.uuid.to_string(),
                monitor.name.clone(),
                monitor.url.clone(),
                monitor.check_interval as i64,
                monitor.expected_status_code as i64,
                monitor.expected_keyword.clone(),
                join_recipient_list(&monitor.notification_emails, " "),
                join_recipient_list(&monitor.telegram_chat_ids, ","),
                if monitor.enabled { 1 } else { 0 },
                Monitor::timestamp_to_i64(monitor.created_at),
                Monitor::timestamp_to_i64(monitor.updated_at),
            ],
        )
        .await?;

        Ok(conn.last_insert_rowid())
    }

    async fn update_monitor(&self, monitor: &Monitor) -> Result<(), StoreError> {
        let Some(id) = monitor.id else {
            return Err(StoreError::Corrupt("update of unsaved monitor".to_string()));
        };
        let conn = self.get_conn().await?;
        conn.execute(
            "UPDATE monitors SET name = ?, url = ?, check_interval = ?, \
             expected_status_code = ?, expected_keyword = ?, notification_emails = ?, \
             telegram_chat_ids = ?, enabled = ?, updated_at = ? WHERE id = ?",
            params![
                monitor.name.clone(),
                monitor.url.clone(),
                monitor.check_interval as i64,
                monitor.expected_status_code as i64,
                monitor.expected_keyword.clone(),
                join_recipient_list(&monitor.notification_emails, " "),
                join_recipient_list(&monitor.telegram_chat_ids, ","),
                if monitor.enabled { 1 } else { 0 },
                Monitor::timestamp_to_i64(SystemTime::now()),
                id,
            ],
        )
        .await?;
        Ok(())
    }

    async fn delete_monitor(&self, id: i64) -> Result<(), StoreError> {
        let conn = self.get_conn().await?;
        conn.execute("DELETE FROM monitors WHERE id = ?", params![id]).await?;
        Ok(())
    }

    async fn persist_check_result(
        &self,
        id: i64,
        result: &CheckResult,
        delta: &StateDelta,
    ) -> Result<(), StoreError> {
        let conn = self.get_conn().await?;
        let now = Monitor::timestamp_to_i64(SystemTime::now());

        conn.execute(
            "UPDATE monitors SET last_check_time = ?, previous_status = ?, last_status = ?, \
             last_response_time = ?, last_status_code = ?, last_error = ?, \
             ssl_expiry = ?, ssl_issuer = ?, downtime_start = ?, consecutive_failures = ?, \
             updated_at = ? WHERE id = ?",
            params![
                Monitor::timestamp_to_i64(result.checked_at),
                status_column(delta.previous_status),
                delta.status.to_string(),
                result.response_time_ms.map(|v| v as i64),
                result.http_code.map(|v| v as i64),
                result.error.clone(),
                result.ssl_info.as_ref().map(|c| c.valid_to_unix()),
                result.ssl_info.as_ref().map(|c| c.issuer.clone()),
                delta.downtime_start.map(Monitor::timestamp_to_i64),
                delta.consecutive_failures as i64,
                now,
                id,
            ],
        )
        .await?;
        Ok(())
    }

    async fn persist_alert_time(
        &self,
        id: i64,
        time: Option<SystemTime>,
    ) -> Result<(), StoreError> {
        let conn = self.get_conn().await?;
        conn.execute(
            "UPDATE monitors SET last_alert_time = ? WHERE id = ?",
            params![time.map(Monitor::timestamp_to_i64), id],
        )
        .await?;
        Ok(())
    }
}

#[async_trait]
impl SettingsStore for LibsqlStore {
    async fn get_setting(&self, key: &str) -> Result<Option<String>, StoreError> {
        let conn = self.get_conn().await?;
        let mut rows = conn
            .query(
                "SELECT setting_value FROM settings WHERE setting_key = ?1",
                params![key],
            )
            .await?;

        match rows.next().await? {
            Some(row) => Ok(Some(row.get(0)?)),
            None => Ok(None),
        }
    }

    async fn set_setting(&self, key: &str, value: &str) -> Result<(), StoreError> {
        let conn = self.get_conn().await?;
        conn.execute(
            "INSERT INTO settings (setting_key, setting_value) VALUES (?1, ?2) \
             ON CONFLICT(setting_key) DO UPDATE SET setting_value = excluded.setting_value",
            params![key, value],
        )
        .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::monitoring::types::CertInfo;
    use std::time::Duration;
    use tempfile::tempdir;

    async fn create_test_store() -> (LibsqlStore, tempfile::TempDir) {
        let temp_dir = tempdir().unwrap();
        let db_path = temp_dir.path().join("test.db");
        let pool = crate::pool::open_pool(db_path.to_str().unwrap()).await.unwrap();

        let conn = pool.get().await.unwrap();
        crate::database::initialize_database(&conn).await.unwrap();
        drop(conn);

        (LibsqlStore::new(pool), temp_dir)
    }

    fn sample_monitor() -> Monitor {
        let mut monitor =
            Monitor::new("api".to_string(), "https://example.com".to_string(), 300);
        monitor.expected_keyword = Some("ok".to_string());
        monitor.notification_emails = vec!["ops@example.com".to_string()];
        monitor.telegram_chat_ids = vec!["111".to_string(), "222".to_string()];
        monitor
    }

    #[tokio::test]
    async fn migrations_are_idempotent() {
        let (store, _dir) = create_test_store().await;
        let conn = store.pool.get().await.unwrap();
        crate::database::initialize_database(&conn).await.unwrap();

        let mut rows = conn
            .query("SELECT MAX(version) FROM schema_migrations", ())
            .await
            .unwrap();
        let row = rows.next().await.unwrap().unwrap();
        assert_eq!(row.get::<i32>(0).unwrap(), 2);
    }

    #[tokio::test]
    async fn insert_and_get_roundtrip() {
        let (store, _dir) = create_test_store().await;
        let monitor = sample_monitor();
        let id = store.insert_monitor(&monitor).await.unwrap();

        let loaded = store.get_monitor(id).await.unwrap().unwrap();
        assert_eq!(loaded.uuid, monitor.uuid);
        assert_eq!(loaded.name, "api");
        assert_eq!(loaded.expected_status_code, 200);
        assert_eq!(loaded.expected_keyword.as_deref(), Some("ok"));
        assert_eq!(loaded.notification_emails, vec!["ops@example.com"]);
        assert_eq!(loaded.telegram_chat_ids, vec!["111", "222"]);
        assert_eq!(loaded.last_status, MonitorStatus::Unknown);
        assert_eq!(loaded.consecutive_failures, 0);
        assert!(loaded.last_check_time.is_none());
    }

    #[tokio::test]
    async fn new_monitors_are_due_and_recently_checked_ones_are_not() {
        let (store, _dir) = create_test_store().await;
        let id = store.insert_monitor(&sample_monitor()).await.unwrap();

        let due = store.list_due_monitors().await.unwrap();
        assert_eq!(due.len(), 1);
        assert_eq!(due[0].id, Some(id));

        // a check just happened; interval has not elapsed
        let mut result = CheckResult::new(SystemTime::now());
        result.status = MonitorStatus::Up;
        let delta = StateDelta {
            previous_status: MonitorStatus::Unknown,
            status: MonitorStatus::Up,
            downtime_start: None,
            consecutive_failures: 0,
        };
        store.persist_check_result(id, &result, &delta).await.unwrap();

        assert!(store.list_due_monitors().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn overdue_monitors_become_due_again() {
        let (store, _dir) = create_test_store().await;
        let id = store.insert_monitor(&sample_monitor()).await.unwrap();

        let mut result = CheckResult::new(SystemTime::now() - Duration::from_secs(600));
        result.status = MonitorStatus::Up;
        let delta = StateDelta {
            previous_status: MonitorStatus::Unknown,
            status: MonitorStatus::Up,
            downtime_start: None,
            consecutive_failures: 0,
        };
        store.persist_check_result(id, &result, &delta).await.unwrap();

        let due = store.list_due_monitors().await.unwrap();
        assert_eq!(due.len(), 1);
    }

    #[tokio::test]
    async fn check_result_persistence_roundtrip() {
        let (store, _dir) = create_test_store().await;
        let id = store.insert_monitor(&sample_monitor()).await.unwrap();
        let now = SystemTime::now();

        let mut result = CheckResult::new(now);
        result.status = MonitorStatus::Down;
        result.http_code = Some(500);
        result.response_time_ms = Some(321);
        result.error = Some("server exploded".to_string());
        result.ssl_info = Some(CertInfo {
            subject: "example.com".to_string(),
            issuer: "Test CA".to_string(),
            valid_from: now - Duration::from_secs(86_400),
            valid_to: now + Duration::from_secs(60 * 86_400),
        });
        let delta = StateDelta {
            previous_status: MonitorStatus::Up,
            status: MonitorStatus::Down,
            downtime_start: Some(now),
            consecutive_failures: 1,
        };
        store.persist_check_result(id, &result, &delta).await.unwrap();

        let loaded = store.get_monitor(id).await.unwrap().unwrap();
        assert_eq!(loaded.last_status, MonitorStatus::Down);
        assert_eq!(loaded.previous_status, Some(MonitorStatus::Up));
        assert_eq!(loaded.last_status_code, Some(500));
        assert_eq!(loaded.last_response_time_ms, Some(321));
        assert_eq!(loaded.last_error.as_deref(), Some("server exploded"));
        assert_eq!(loaded.consecutive_failures, 1);
        assert!(loaded.downtime_start.is_some());
        assert_eq!(loaded.ssl_issuer.as_deref(), Some("Test CA"));
        assert!(loaded.ssl_expiry.is_some());
    }

    #[tokio::test]
    async fn alert_time_can_be_set_and_cleared() {
        let (store, _dir) = create_test_store().await;
        let id = store.insert_monitor(&sample_monitor()).await.unwrap();
        let now = SystemTime::now();

        store.persist_alert_time(id, Some(now)).await.unwrap();
        let loaded = store.get_monitor(id).await.unwrap().unwrap();
        assert_eq!(
            loaded.last_alert_time.map(Monitor::timestamp_to_i64),
            Some(Monitor::timestamp_to_i64(now))
        );

        store.persist_alert_time(id, None).await.unwrap();
        let loaded = store.get_monitor(id).await.unwrap().unwrap();
        assert!(loaded.last_alert_time.is_none());
    }

    #[tokio::test]
    async fn update_and_delete_monitor() {
        let (store, _dir) = create_test_store().await;
        let id = store.insert_monitor(&sample_monitor()).await.unwrap();

        let mut monitor = store.get_monitor(id).await.unwrap().unwrap();
        monitor.name = "renamed".to_string();
        monitor.enabled = false;
        store.update_monitor(&monitor).await.unwrap();

        let loaded = store.get_monitor(id).await.unwrap().unwrap();
        assert_eq!(loaded.name, "renamed");
        assert!(!loaded.enabled);
        // disabled monitors never come up as due
        assert!(store.list_due_monitors().await.unwrap().is_empty());

        store.delete_monitor(id).await.unwrap();
        assert!(store.get_monitor(id).await.unwrap().is_none());
        assert!(store.list_monitors().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn settings_roundtrip_and_default_cooldown_seed() {
        let (store, _dir) = create_test_store().await;

        assert_eq!(
            store.get_setting("alert_cooldown").await.unwrap().as_deref(),
            Some("3600")
        );
        assert!(store.get_setting("smtp_host").await.unwrap().is_none());

        store.set_setting("smtp_host", "mail.example.com").await.unwrap();
        store.set_setting("smtp_host", "mail2.example.com").await.unwrap();
        assert_eq!(
            store.get_setting("smtp_host").await.unwrap().as_deref(),
            Some("mail2.example.com")
        );
    }
}
