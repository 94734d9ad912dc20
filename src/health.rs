use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::error;

use crate::pool::LibsqlPool;

/// A pre-flight check run before monitoring starts
#[async_trait]
pub trait HealthCheck: Send + Sync {
    fn name(&self) -> &str;

    /// Critical checks block the tick when they fail
    fn critical(&self) -> bool;

    async fn check(&self) -> Result<(), String>;
}

#[derive(Debug)]
pub struct HealthReport {
    pub name: String,
    pub ok: bool,
    pub message: String,
    pub duration_ms: u64,
}

/// Runs registered health checks and collects their outcomes
#[derive(Default)]
pub struct HealthChecker {
    checks: Vec<Box<dyn HealthCheck>>,
}

impl HealthChecker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, check: Box<dyn HealthCheck>) {
        self.checks.push(check);
    }

    /// Run the critical checks; returns whether all of them passed
    pub async fn run_critical(&self) -> (bool, Vec<HealthReport>) {
        let mut all_passed = true;
        let mut reports = Vec::new();

        for check in self.checks.iter().filter(|c| c.critical()) {
            let start = Instant::now();
            let outcome = check.check().await;
            let duration_ms = start.elapsed().as_millis() as u64;

            let (ok, message) = match outcome {
                Ok(()) => (true, "ok".to_string()),
                Err(message) => {
                    all_passed = false;
                    error!(check = check.name(), %message, duration_ms, "critical health check failed");
                    (false, message)
                }
            };
            reports.push(HealthReport {
                name: check.name().to_string(),
                ok,
                message,
                duration_ms,
            });
        }

        (all_passed, reports)
    }
}

/// Verifies the store answers queries and carries the expected tables
pub struct DatabaseHealthCheck {
    pool: LibsqlPool,
}

impl DatabaseHealthCheck {
    pub fn new(pool: LibsqlPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl HealthCheck for DatabaseHealthCheck {
    fn name(&self) -> &str {
        "database connectivity"
    }

    fn critical(&self) -> bool {
        true
    }

    async fn check(&self) -> Result<(), String> {
        let conn = self
            .pool
            .get()
            .await
            .map_err(|e| format!("could not get connection: {e}"))?;

        let mut rows = conn
            .query(
                "SELECT count(*) FROM sqlite_master \
                 WHERE type = 'table' AND name IN ('monitors', 'settings')",
                (),
            )
            .await
            .map_err(|e| format!("test query failed: {e}"))?;

        let row = rows
            .next()
            .await
            .map_err(|e| format!("test query failed: {e}"))?
            .ok_or_else(|| "test query returned no rows".to_string())?;
        let tables: i64 = row.get(0).map_err(|e| format!("test query failed: {e}"))?;

        if tables < 2 {
            return Err("missing critical tables (monitors, settings)".to_string());
        }
        Ok(())
    }
}

/// Verifies outbound connectivity by reaching any of a few well-known hosts
pub struct NetworkHealthCheck {
    endpoints: Vec<(String, u16)>,
    connect_timeout: Duration,
}

impl Default for NetworkHealthCheck {
    fn default() -> Self {
        Self::new(
            vec![
                ("1.1.1.1".to_string(), 443),
                ("8.8.8.8".to_string(), 443),
                ("dns.google".to_string(), 443),
            ],
            Duration::from_secs(3),
        )
    }
}

impl NetworkHealthCheck {
    pub fn new(endpoints: Vec<(String, u16)>, connect_timeout: Duration) -> Self {
        Self { endpoints, connect_timeout }
    }
}

#[async_trait]
impl HealthCheck for NetworkHealthCheck {
    fn name(&self) -> &str {
        "network connectivity"
    }

    fn critical(&self) -> bool {
        true
    }

    async fn check(&self) -> Result<(), String> {
        let mut failures = Vec::new();
        for (host, port) in &self.endpoints {
            match timeout(self.connect_timeout, TcpStream::connect((host.as_str(), *port))).await {
                Ok(Ok(_)) => return Ok(()),
                Ok(Err(err)) => failures.push(format!("{host}:{port} ({err})")),
                Err(_) => failures.push(format!("{host}:{port} (timed out)")),
            }
        }
        Err(format!("cannot reach any test endpoint: {}", failures.join(", ")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn database_check_passes_on_migrated_store() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("health.db");
        let pool = crate::pool::open_pool(path.to_str().unwrap()).await.unwrap();
        let conn = pool.get().await.unwrap();
        crate::database::initialize_database(&conn).await.unwrap();
        drop(conn);

        let check = DatabaseHealthCheck::new(pool);
        assert!(check.check().await.is_ok());
    }

    #[tokio::test]
    async fn database_check_fails_without_schema() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("empty.db");
        let pool = crate::pool::open_pool(path.to_str().unwrap()).await.unwrap();

        let check = DatabaseHealthCheck::new(pool);
        let err = check.check().await.unwrap_err();
        assert!(err.contains("missing critical tables"));
    }

    #[tokio::test]
    async fn network_check_fails_when_nothing_is_reachable() {
        let check = NetworkHealthCheck::new(
            vec![("127.0.0.1".to_string(), 1)],
            Duration::from_secs(1),
        );
        assert!(check.check().await.is_err());
    }

    #[tokio::test]
    async fn network_check_passes_against_local_listener() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let _ = listener.accept().await;
        });

        let check = NetworkHealthCheck::new(
            vec![("127.0.0.1".to_string(), addr.port())],
            Duration::from_secs(1),
        );
        assert!(check.check().await.is_ok());
    }

    #[tokio::test]
    async fn checker_reports_failures_per_check() {
        let mut checker = HealthChecker::new();
        checker.register(Box::new(NetworkHealthCheck::new(
            vec![("127.0.0.1".to_string(), 1)],
            Duration::from_secs(1),
        )));

        let (ok, reports) = checker.run_critical().await;
        assert!(!ok);
        assert_eq!(reports.len(), 1);
        assert!(!reports[0].ok);
        assert_eq!(reports[0].name, "network connectivity");
    }
}
