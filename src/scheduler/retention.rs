//! Auto-archive sweep and archived-history purge.
//!
//! The sweep is a safety net behind the alert tick: reminders that look
//! finished but were never archived (a crash between the final alert and
//! its completion, or rows edited underneath a running cycle) get archived
//! on an hourly cadence. The purge runs daily and deletes archived
//! reminders older than the retention window.

use std::sync::Arc;

use chrono::{DateTime, Months, Utc};
use tracing::{debug, info, warn};

use crate::clock::Clock;
use crate::error::Result;
use crate::store::ReminderStore;

/// Settings-store key holding the user-set retention window. Overrides the
/// configured default when present.
pub const CLEANUP_INTERVAL_SETTING: &str = "history_cleanup_interval";

/// Window applied when neither the setting nor the config parses.
const FALLBACK_WINDOW: RetentionWindow = RetentionWindow::Months(6);

/// How long archived reminders are kept.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetentionWindow {
    /// Never purge.
    Off,
    Months(u32),
    Years(u32),
}

impl RetentionWindow {
    /// Parse `"<n>m"`, `"<n>y"` or `"off"` (case-insensitive).
    pub fn parse(raw: &str) -> Option<Self> {
        let raw = raw.trim().to_ascii_lowercase();
        if raw == "off" {
            return Some(Self::Off);
        }
        if let Some(n) = raw.strip_suffix('m') {
            return n.parse().ok().filter(|n| *n > 0).map(Self::Months);
        }
        if let Some(n) = raw.strip_suffix('y') {
            return n.parse().ok().filter(|n| *n > 0).map(Self::Years);
        }
        None
    }

    /// Purge threshold for this window at `now`, `None` when purging is
    /// off.
    fn threshold(self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        let months = match self {
            Self::Off => return None,
            Self::Months(n) => n,
            Self::Years(n) => n.saturating_mul(12),
        };
        now.checked_sub_months(Months::new(months))
    }
}

/// Runs the sweep and purge against the store.
pub struct RetentionJob {
    store: Arc<ReminderStore>,
    default_window: String,
    clock: Arc<dyn Clock>,
}

impl RetentionJob {
    pub fn new(store: Arc<ReminderStore>, default_window: String, clock: Arc<dyn Clock>) -> Self {
        Self {
            store,
            default_window,
            clock,
        }
    }

    /// Archive finished-looking reminders the alert tick missed. Returns
    /// how many were archived.
    pub fn run_sweep(&self) -> Result<usize> {
        let now = self.clock.now();
        let candidates = self.store.auto_archive_candidates(now)?;
        for reminder in &candidates {
            self.store.set_archived(reminder.id, true)?;
            info!(id = reminder.id, "auto-archived finished reminder");
        }
        Ok(candidates.len())
    }

    /// Delete archived reminders older than the retention window. Returns
    /// how many were deleted.
    pub fn run_purge(&self) -> Result<usize> {
        let window = self.resolve_window()?;
        let Some(threshold) = window.threshold(self.clock.now()) else {
            debug!("history purge disabled");
            return Ok(0);
        };

        let deleted = self.store.delete_archived_older_than(threshold)?;
        if deleted > 0 {
            info!(deleted, threshold = %threshold, "purged archived reminders");
        }
        Ok(deleted)
    }

    /// Effective window: the stored setting wins over the configured
    /// default; an unparseable value in both places falls back to six
    /// months.
    fn resolve_window(&self) -> Result<RetentionWindow> {
        if let Some(raw) = self.store.get_setting(CLEANUP_INTERVAL_SETTING)? {
            if let Some(window) = RetentionWindow::parse(&raw) {
                return Ok(window);
            }
            warn!(value = %raw, "ignoring unparseable retention setting");
        }
        Ok(RetentionWindow::parse(&self.default_window).unwrap_or(FALLBACK_WINDOW))
    }
}
