/// Persistence layer
///
/// Monitors, their observed state, and runtime settings live in a local
/// LibSQL (SQLite) database behind a connection pool.
pub mod migrations;
pub mod models;
pub mod repository;

pub use repository::{LibsqlStore, MonitorStore, SettingsStore, StoreError};

/// Initialize database with schema
pub async fn initialize_database(conn: &libsql::Connection) -> Result<(), StoreError> {
    migrations::run_migrations(conn).await
}
