use libsql::Connection;

use super::repository::StoreError;

/// Schema version - increment when making schema changes
const SCHEMA_VERSION: i32 = 2;

/// Run database migrations.
///
/// This is the single source of truth for the schema; it runs once at
/// startup, never during normal operation.
pub async fn run_migrations(conn: &Connection) -> Result<(), StoreError> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS schema_migrations (
            version INTEGER PRIMARY KEY,
            applied_at INTEGER NOT NULL,
            description TEXT
        )",
        (),
    )
    .await?;

    let current_version = get_current_version(conn).await?;
    if current_version >= SCHEMA_VERSION {
        tracing::info!("database schema is up to date (version {})", current_version);
        return Ok(());
    }

    tracing::info!(
        "running migrations from version {} to {}",
        current_version,
        SCHEMA_VERSION
    );

    if current_version < 1 {
        run_migration_v1(conn).await?;
        record_migration(conn, 1, "Initial monitors and settings schema").await?;
    }

    if current_version < 2 {
        run_migration_v2(conn).await?;
        record_migration(conn, 2, "Add SSL, downtime and alert bookkeeping columns").await?;
    }

    tracing::info!(
        "database migrations completed (now at version {})",
        SCHEMA_VERSION
    );
    Ok(())
}

async fn get_current_version(conn: &Connection) -> Result<i32, StoreError> {
    let mut rows = conn
        .query("SELECT MAX(version) FROM schema_migrations", ())
        .await?;

    if let Some(row) = rows.next().await? {
        let version: Option<i32> = row.get(0)?;
        Ok(version.unwrap_or(0))
    } else {
        Ok(0)
    }
}

async fn record_migration(
    conn: &Connection,
    version: i32,
    description: &str,
) -> Result<(), StoreError> {
    let now = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs() as i64;

    conn.execute(
        "INSERT INTO schema_migrations (version, applied_at, description) VALUES (?, ?, ?)",
        libsql::params![version, now, description],
    )
    .await?;

    tracing::info!("applied migration v{}: {}", version, description);
    Ok(())
}

/// Migration v1: monitors and settings tables
async fn run_migration_v1(conn: &Connection) -> Result<(), StoreError> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS monitors (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            uuid TEXT NOT NULL UNIQUE,
            name TEXT NOT NULL,
            url TEXT NOT NULL,
            check_interval INTEGER NOT NULL DEFAULT 300,
            expected_status_code INTEGER NOT NULL DEFAULT 200,
            expected_keyword TEXT,
            notification_emails TEXT NOT NULL DEFAULT '',
            telegram_chat_ids TEXT NOT NULL DEFAULT '',
            enabled INTEGER NOT NULL DEFAULT 1,
            last_status TEXT,
            last_check_time INTEGER,
            last_response_time INTEGER,
            last_status_code INTEGER,
            last_error TEXT,
            created_at INTEGER NOT NULL,
            updated_at INTEGER NOT NULL
        )",
        (),
    )
    .await?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS settings (
            setting_key TEXT PRIMARY KEY,
            setting_value TEXT NOT NULL
        )",
        (),
    )
    .await?;

    conn.execute(
        "INSERT OR IGNORE INTO settings (setting_key, setting_value) VALUES ('alert_cooldown', '3600')",
        (),
    )
    .await?;

    Ok(())
}

/// Migration v2: state-machine bookkeeping that arrived after the initial schema
async fn run_migration_v2(conn: &Connection) -> Result<(), StoreError> {
    let alterations = [
        "ALTER TABLE monitors ADD COLUMN previous_status TEXT",
        "ALTER TABLE monitors ADD COLUMN downtime_start INTEGER",
        "ALTER TABLE monitors ADD COLUMN consecutive_failures INTEGER NOT NULL DEFAULT 0",
        "ALTER TABLE monitors ADD COLUMN last_alert_time INTEGER",
        "ALTER TABLE monitors ADD COLUMN ssl_expiry INTEGER",
        "ALTER TABLE monitors ADD COLUMN ssl_issuer TEXT",
    ];
    for alteration in alterations {
        conn.execute(alteration, ()).await?;
    }

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_monitors_due ON monitors (enabled, last_check_time)",
        (),
    )
    .await?;

    Ok(())
}
