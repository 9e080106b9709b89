//! Scheduler background loops.
//!
//! Spawns three tokio tasks: the alert tick, the hourly auto-archive
//! sweep, and the daily history purge. The alert and sweep loops wait a
//! short startup delay and then run immediately, so a daemon restart
//! catches up on anything that came due while it was down.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, NaiveTime, TimeZone, Utc};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info};

use crate::clock::Clock;
use crate::config::SchedulerConfig;
use crate::scheduler::alert::AlertCycle;
use crate::scheduler::retention::RetentionJob;

/// Owns the periodic jobs and their cadences.
pub struct Scheduler {
    alerts: Arc<AlertCycle>,
    retention: Arc<RetentionJob>,
    config: SchedulerConfig,
    clock: Arc<dyn Clock>,
}

impl Scheduler {
    pub fn new(
        alerts: Arc<AlertCycle>,
        retention: Arc<RetentionJob>,
        config: SchedulerConfig,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            alerts,
            retention,
            config,
            clock,
        }
    }

    /// Spawn all three loops. The handles never resolve in normal
    /// operation; the daemon aborts them on shutdown.
    pub fn spawn(self) -> Vec<JoinHandle<()>> {
        let startup = Duration::from_secs(self.config.startup_delay_secs);
        info!(
            alert_tick_secs = self.config.alert_tick_secs,
            archive_sweep_secs = self.config.archive_sweep_secs,
            purge_hour_utc = self.config.purge_hour_utc,
            "starting scheduler loops"
        );

        vec![
            self.spawn_alert_loop(startup),
            self.spawn_sweep_loop(startup),
            self.spawn_purge_loop(),
        ]
    }

    fn spawn_alert_loop(&self, startup: Duration) -> JoinHandle<()> {
        let alerts = Arc::clone(&self.alerts);
        let tick = Duration::from_secs(self.config.alert_tick_secs.max(1));
        tokio::spawn(async move {
            tokio::time::sleep(startup).await;
            // The first tick fires immediately; a tick that overruns its
            // slot skips the missed ones instead of bursting.
            let mut interval = tokio::time::interval(tick);
            interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                interval.tick().await;
                match alerts.run_tick().await {
                    Ok(0) => {}
                    Ok(n) => debug!(processed = n, "alert tick done"),
                    Err(e) => error!("alert tick failed: {e}"),
                }
            }
        })
    }

    fn spawn_sweep_loop(&self, startup: Duration) -> JoinHandle<()> {
        let retention = Arc::clone(&self.retention);
        let cadence = Duration::from_secs(self.config.archive_sweep_secs.max(1));
        tokio::spawn(async move {
            tokio::time::sleep(startup).await;
            let mut interval = tokio::time::interval(cadence);
            interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                interval.tick().await;
                match retention.run_sweep() {
                    Ok(0) => {}
                    Ok(n) => info!(archived = n, "auto-archive sweep done"),
                    Err(e) => error!("auto-archive sweep failed: {e}"),
                }
            }
        })
    }

    fn spawn_purge_loop(&self) -> JoinHandle<()> {
        let retention = Arc::clone(&self.retention);
        let clock = Arc::clone(&self.clock);
        let hour = self.config.purge_hour_utc;
        tokio::spawn(async move {
            loop {
                let wait = until_next_hour(clock.now(), hour);
                tokio::time::sleep(wait).await;
                match retention.run_purge() {
                    Ok(n) => debug!(deleted = n, "history purge done"),
                    Err(e) => error!("history purge failed: {e}"),
                }
            }
        })
    }
}

/// Duration from `now` until the next occurrence of `hour:00:00` UTC.
fn until_next_hour(now: DateTime<Utc>, hour: u8) -> Duration {
    let hour = u32::from(hour.min(23));
    let at = NaiveTime::from_hms_opt(hour, 0, 0).unwrap_or(NaiveTime::MIN);
    let mut next = Utc.from_utc_datetime(&now.date_naive().and_time(at));
    if next <= now {
        next += chrono::Duration::days(1);
    }
    (next - now).to_std().unwrap_or(Duration::from_secs(1))
}
