//! Reminder daemon binary.
//!
//! Loads configuration, opens the store, and runs the scheduler loops
//! until interrupted. The config path can be overridden with the
//! `REMINDD_CONFIG` environment variable.

use std::path::PathBuf;
use std::sync::Arc;

use remindd::AppConfig;
use remindd::clock::{Clock, SystemClock};
use remindd::notify::Dispatcher;
use remindd::scheduler::{AlertCycle, RetentionJob, Scheduler};
use remindd::store::ReminderStore;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let config_path = std::env::var_os("REMINDD_CONFIG")
        .map(PathBuf::from)
        .unwrap_or_else(AppConfig::default_config_path);
    let config = AppConfig::load(&config_path)?;
    tracing::info!(config = %config_path.display(), "remindd starting");

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let db_path = config.storage.resolved_db_path();
    let store = Arc::new(ReminderStore::open(&db_path)?.with_clock(Arc::clone(&clock)));
    tracing::info!(db = %db_path.display(), "store opened");

    let dispatcher = Arc::new(Dispatcher::new(&config.webhooks)?);
    let alerts = Arc::new(AlertCycle::new(
        Arc::clone(&store),
        dispatcher,
        config.webhooks.clone(),
        config.base_url.0.clone(),
        Arc::clone(&clock),
    ));
    let retention = Arc::new(RetentionJob::new(
        Arc::clone(&store),
        config.retention.default_window.clone(),
        Arc::clone(&clock),
    ));

    let handles = Scheduler::new(alerts, retention, config.scheduler.clone(), clock).spawn();

    tokio::signal::ctrl_c().await?;
    tracing::info!("shutdown signal received");
    for handle in handles {
        handle.abort();
    }

    tracing::info!("remindd shut down cleanly");
    Ok(())
}
