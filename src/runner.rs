use std::fs;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use anyhow::{Context, bail};
use tracing::{info, warn};

use crate::alerts::{AlertDispatcher, AlertSettings};
use crate::config::Config;
use crate::database::models::Monitor;
use crate::database::repository::StoreError;
use crate::database::{LibsqlStore, MonitorStore};
use crate::health::{DatabaseHealthCheck, HealthChecker, NetworkHealthCheck};
use crate::monitoring::types::AlertEvent;
use crate::monitoring::{Prober, StateTracker};

/// Process-wide exclusive lock preventing overlapping ticks.
///
/// The lock file holds the pid of the run that created it and is removed
/// on drop; a pre-existing file means another tick is still in progress.
pub struct RunLock {
    path: PathBuf,
}

impl RunLock {
    pub fn acquire(path: &Path) -> std::io::Result<Self> {
        let mut options = fs::OpenOptions::new();
        options.write(true).create_new(true);
        let mut file = options.open(path)?;
        use std::io::Write as _;
        let _ = writeln!(file, "{}", std::process::id());
        Ok(Self { path: path.to_path_buf() })
    }
}

impl Drop for RunLock {
    fn drop(&mut self) {
        if let Err(err) = fs::remove_file(&self.path) {
            warn!(path = %self.path.display(), error = %err, "could not remove run lock");
        }
    }
}

/// Run one monitoring tick: health checks, then probe every due monitor,
/// persist its new state and dispatch any alert.
///
/// Per-monitor probe and alert failures are logged and absorbed; only
/// infrastructure failures (lock held, store unreachable, failed health
/// checks) surface as errors.
pub async fn run(config: &Config) -> anyhow::Result<()> {
    let _lock = RunLock::acquire(Path::new(&config.runner.lock_path))
        .context("another monitoring run appears to be in progress")?;

    let pool = crate::pool::open_pool(&config.database.path)
        .await
        .context("opening database")?;
    {
        let conn = pool.get().await.context("connecting to database")?;
        crate::database::initialize_database(&conn)
            .await
            .context("running migrations")?;
    }

    let mut checker = HealthChecker::new();
    checker.register(Box::new(DatabaseHealthCheck::new(pool.clone())));
    checker.register(Box::new(NetworkHealthCheck::default()));
    let (healthy, reports) = checker.run_critical().await;
    if !healthy {
        let failed: Vec<String> = reports
            .iter()
            .filter(|r| !r.ok)
            .map(|r| format!("{}: {} (took {}ms)", r.name, r.message, r.duration_ms))
            .collect();
        bail!("critical health checks failed: {}", failed.join("; "));
    }
    info!(checks = reports.len(), "health checks passed");

    let store = LibsqlStore::new(pool);
    let alert_settings = AlertSettings::load(&store).await.context("loading alert settings")?;
    let prober = Prober::new(&config.probe).context("building http client")?;
    let tracker = StateTracker::new(alert_settings.cooldown);
    let dispatcher = AlertDispatcher::from_settings(&alert_settings);

    run_tick(&store, &prober, &tracker, &dispatcher).await?;
    Ok(())
}

/// Probe all due monitors sequentially
pub async fn run_tick(
    store: &dyn MonitorStore,
    prober: &Prober,
    tracker: &StateTracker,
    dispatcher: &AlertDispatcher,
) -> Result<(), StoreError> {
    let due = store.list_due_monitors().await?;
    info!(count = due.len(), "processing due monitors");

    for monitor in &due {
        process_monitor(store, prober, tracker, dispatcher, monitor).await?;
    }
    Ok(())
}

async fn process_monitor(
    store: &dyn MonitorStore,
    prober: &Prober,
    tracker: &StateTracker,
    dispatcher: &AlertDispatcher,
    monitor: &Monitor,
) -> Result<(), StoreError> {
    let Some(id) = monitor.id else {
        return Ok(());
    };

    let result = prober.probe(monitor).await;
    info!(
        monitor = %monitor.name,
        status = %result.status,
        was = %monitor.last_status,
        http_code = result.http_code,
        duration_ms = result.response_time_ms,
        message = %result.message,
        "checked"
    );

    let now = SystemTime::now();
    let (delta, event) = tracker.apply(monitor, &result, now);

    // state goes to disk before any alert leaves the process
    store.persist_check_result(id, &result, &delta).await?;

    if let Some(event) = event {
        let all_sent = dispatcher.dispatch(monitor, &event).await;
        if !all_sent {
            warn!(monitor = %monitor.name, kind = event.kind(), "one or more alert sends failed");
        }
        match event {
            AlertEvent::Recovery { .. } => store.persist_alert_time(id, None).await?,
            _ => store.persist_alert_time(id, Some(now)).await?,
        }
    }

    Ok(())
}
