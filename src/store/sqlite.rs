//! SQLite-backed reminder store.
//!
//! Owns every read and write the scheduling core performs. Thread-safe via
//! an internal `Mutex<Connection>`; all statements are short, so writes
//! are simply serialized.
//!
//! Datetimes are persisted as second-precision RFC 3339 TEXT in UTC, which
//! keeps SQL `<`/`<=` comparisons correct as plain string comparisons.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use rusqlite::{Connection, Row, params};
use uuid::Uuid;

use super::schema::{apply_schema, read_schema_version};
use crate::clock::{Clock, SystemClock};
use crate::error::{ReminderError, Result};
use crate::model::{
    AlertPolicy, NewReminder, NotifyTargets, Priority, Recurrence, Reminder, compute_next_alert,
};

/// Column list shared by every `SELECT *`-shaped query, so the row mapper
/// has one fixed index layout.
const REMINDER_COLUMNS: &str = "id, text, priority, due_datetime, recipient, \
     alert_lead_time_value, alert_lead_time_unit, alert_repeat_additional_count, \
     alert_repeat_interval_minutes, recurrence_rule, recurrence_dtstart, \
     recurrence_end_date, is_relentless, relentless_confirm_token, snooze_count, \
     nudge_token, notify_home_assistant_url, notify_ntfy_url, notify_gotify_url, \
     next_alert_datetime, alerts_sent_count, is_archived, created_at, updated_at";

/// SQLite-backed reminder repository.
pub struct ReminderStore {
    path: PathBuf,
    conn: Mutex<Connection>,
    clock: Arc<dyn Clock>,
}

impl ReminderStore {
    /// Open (or create) the database at `path` and apply the schema.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        apply_schema(&conn)?;
        Ok(Self {
            path: path.to_path_buf(),
            conn: Mutex::new(conn),
            clock: Arc::new(SystemClock),
        })
    }

    /// Replace the store's time source (used to stamp `updated_at`).
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Returns the database file path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the schema version stamp.
    pub fn schema_version(&self) -> Result<Option<u32>> {
        let conn = self.lock()?;
        Ok(read_schema_version(&conn)?)
    }

    // -----------------------------------------------------------------------
    // CRUD surface (consumed by the external API layer)
    // -----------------------------------------------------------------------

    /// Insert a new reminder.
    ///
    /// Derives the recurrence anchor (= due when a rule is present) and the
    /// initial `next_alert` from the lead settings.
    pub fn add(&self, new: &NewReminder) -> Result<Reminder> {
        let now = ts(self.clock.now());
        let rule = new.effective_rule().map(str::to_owned);
        let dtstart = rule.as_ref().map(|_| ts(new.due));
        let end_date = rule
            .as_ref()
            .and_then(|_| new.recurrence_end_date)
            .map(|d| d.to_string());
        let next_alert = ts(compute_next_alert(new.due, new.lead_value, &new.lead_unit));
        let (is_relentless, extra, interval) = policy_columns(&new.policy);

        let id = {
            let conn = self.lock()?;
            conn.execute(
                "INSERT INTO reminders (
                    text, priority, due_datetime, recipient,
                    alert_lead_time_value, alert_lead_time_unit,
                    alert_repeat_additional_count, alert_repeat_interval_minutes,
                    recurrence_rule, recurrence_dtstart, recurrence_end_date,
                    is_relentless, snooze_count,
                    notify_home_assistant_url, notify_ntfy_url, notify_gotify_url,
                    next_alert_datetime, alerts_sent_count, is_archived,
                    created_at, updated_at
                 ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, 0, \
                           ?13, ?14, ?15, ?16, 0, 0, ?17, ?17)",
                params![
                    new.text,
                    new.priority.as_u8(),
                    ts(new.due),
                    new.recipient,
                    new.lead_value,
                    new.lead_unit,
                    extra,
                    interval,
                    rule,
                    dtstart,
                    end_date,
                    is_relentless,
                    new.notify.home_assistant,
                    new.notify.ntfy,
                    new.notify.gotify,
                    next_alert,
                    now,
                ],
            )?;
            conn.last_insert_rowid()
        };

        self.get(id)?.ok_or(ReminderError::NotFound(id))
    }

    /// Rewrite a reminder from edit-form input.
    ///
    /// Editing restarts the alert cycle: counters, snooze state and both
    /// tokens reset, and the reminder is unarchived.
    pub fn update(&self, id: i64, new: &NewReminder) -> Result<()> {
        let now = ts(self.clock.now());
        let rule = new.effective_rule().map(str::to_owned);
        let dtstart = rule.as_ref().map(|_| ts(new.due));
        let end_date = rule
            .as_ref()
            .and_then(|_| new.recurrence_end_date)
            .map(|d| d.to_string());
        let next_alert = ts(compute_next_alert(new.due, new.lead_value, &new.lead_unit));
        let (is_relentless, extra, interval) = policy_columns(&new.policy);

        let conn = self.lock()?;
        let rows = conn.execute(
            "UPDATE reminders SET
                text = ?1, priority = ?2, due_datetime = ?3, recipient = ?4,
                alert_lead_time_value = ?5, alert_lead_time_unit = ?6,
                alert_repeat_additional_count = ?7, alert_repeat_interval_minutes = ?8,
                recurrence_rule = ?9, recurrence_dtstart = ?10, recurrence_end_date = ?11,
                is_relentless = ?12,
                notify_home_assistant_url = ?13, notify_ntfy_url = ?14, notify_gotify_url = ?15,
                next_alert_datetime = ?16,
                alerts_sent_count = 0, snooze_count = 0, is_archived = 0,
                relentless_confirm_token = NULL, nudge_token = NULL,
                updated_at = ?17
             WHERE id = ?18",
            params![
                new.text,
                new.priority.as_u8(),
                ts(new.due),
                new.recipient,
                new.lead_value,
                new.lead_unit,
                extra,
                interval,
                rule,
                dtstart,
                end_date,
                is_relentless,
                new.notify.home_assistant,
                new.notify.ntfy,
                new.notify.gotify,
                next_alert,
                now,
                id,
            ],
        )?;

        if rows == 0 {
            return Err(ReminderError::NotFound(id));
        }
        Ok(())
    }

    /// Fetch a reminder by id.
    pub fn get(&self, id: i64) -> Result<Option<Reminder>> {
        let conn = self.lock()?;
        let sql = format!("SELECT {REMINDER_COLUMNS} FROM reminders WHERE id = ?1");
        let mut stmt = conn.prepare(&sql)?;
        let mut rows = stmt.query_map(params![id], row_to_reminder)?;
        rows.next().transpose().map_err(Into::into)
    }

    /// List reminders by archive state, soonest due first.
    pub fn list(&self, archived: bool) -> Result<Vec<Reminder>> {
        let conn = self.lock()?;
        let sql = format!(
            "SELECT {REMINDER_COLUMNS} FROM reminders WHERE is_archived = ?1 \
             ORDER BY due_datetime ASC"
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(params![archived], row_to_reminder)?;
        collect(rows)
    }

    /// Delete a reminder outright. Returns the number of rows removed.
    pub fn delete(&self, id: i64) -> Result<usize> {
        let conn = self.lock()?;
        Ok(conn.execute("DELETE FROM reminders WHERE id = ?1", params![id])?)
    }

    /// Delete several reminders at once.
    pub fn bulk_delete(&self, ids: &[i64]) -> Result<usize> {
        if ids.is_empty() {
            return Ok(0);
        }
        let conn = self.lock()?;
        let placeholders = vec!["?"; ids.len()].join(", ");
        let sql = format!("DELETE FROM reminders WHERE id IN ({placeholders})");
        let mut stmt = conn.prepare(&sql)?;
        Ok(stmt.execute(rusqlite::params_from_iter(ids.iter()))?)
    }

    /// Delete every archived reminder.
    pub fn clear_archived(&self) -> Result<usize> {
        let conn = self.lock()?;
        Ok(conn.execute("DELETE FROM reminders WHERE is_archived = 1", [])?)
    }

    // -----------------------------------------------------------------------
    // Token lookup
    // -----------------------------------------------------------------------

    /// Fetch the reminder holding an outstanding nudge token.
    pub fn find_by_nudge_token(&self, token: &str) -> Result<Option<Reminder>> {
        self.find_by_column("nudge_token", token)
    }

    /// Fetch the reminder holding an outstanding confirm token.
    pub fn find_by_confirm_token(&self, token: &str) -> Result<Option<Reminder>> {
        self.find_by_column("relentless_confirm_token", token)
    }

    fn find_by_column(&self, column: &str, token: &str) -> Result<Option<Reminder>> {
        let conn = self.lock()?;
        let sql = format!("SELECT {REMINDER_COLUMNS} FROM reminders WHERE {column} = ?1");
        let mut stmt = conn.prepare(&sql)?;
        let mut rows = stmt.query_map(params![token], row_to_reminder)?;
        rows.next().transpose().map_err(Into::into)
    }

    // -----------------------------------------------------------------------
    // Scheduling queries
    // -----------------------------------------------------------------------

    /// Active reminders whose next alert is due at or before `now`, in due
    /// order.
    pub fn due_reminders(&self, now: DateTime<Utc>) -> Result<Vec<Reminder>> {
        let conn = self.lock()?;
        let sql = format!(
            "SELECT {REMINDER_COLUMNS} FROM reminders \
             WHERE is_archived = 0 AND next_alert_datetime IS NOT NULL \
               AND next_alert_datetime <= ?1 \
             ORDER BY next_alert_datetime ASC"
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(params![ts(now)], row_to_reminder)?;
        collect(rows)
    }

    /// Finished-looking reminders the per-minute tick may have missed.
    ///
    /// Scope: active, non-recurring, non-relentless, past due, and either
    /// over their alert budget or stranded with no next alert after at
    /// least one alert went out.
    pub fn auto_archive_candidates(&self, now: DateTime<Utc>) -> Result<Vec<Reminder>> {
        let conn = self.lock()?;
        let sql = format!(
            "SELECT {REMINDER_COLUMNS} FROM reminders \
             WHERE is_archived = 0 \
               AND is_relentless = 0 \
               AND (recurrence_rule IS NULL OR recurrence_rule = 'none') \
               AND due_datetime < ?1 \
               AND (alerts_sent_count > alert_repeat_additional_count \
                    OR (next_alert_datetime IS NULL AND alerts_sent_count > 0))"
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(params![ts(now)], row_to_reminder)?;
        collect(rows)
    }

    // -----------------------------------------------------------------------
    // State transitions driven by the scheduler
    // -----------------------------------------------------------------------

    /// Archive or un-archive a reminder.
    ///
    /// Archiving clears the next alert, the confirm token and the snooze
    /// count; un-archiving restores nothing (see [`Self::reactivate`]).
    pub fn set_archived(&self, id: i64, archived: bool) -> Result<()> {
        let now = ts(self.clock.now());
        let conn = self.lock()?;
        let rows = conn.execute(
            "UPDATE reminders SET
                is_archived = ?1,
                snooze_count = 0,
                relentless_confirm_token = NULL,
                next_alert_datetime = CASE WHEN ?1 THEN NULL ELSE next_alert_datetime END,
                updated_at = ?2
             WHERE id = ?3",
            params![archived, now, id],
        )?;
        if rows == 0 {
            return Err(ReminderError::NotFound(id));
        }
        Ok(())
    }

    /// Un-archive a reminder and set its next alert explicitly.
    ///
    /// The caller computes `next_alert` with [`compute_next_alert`]; `None`
    /// reactivates into history-visible form without scheduling anything
    /// (alert budget already spent).
    pub fn reactivate(&self, id: i64, next_alert: Option<DateTime<Utc>>) -> Result<()> {
        let now = ts(self.clock.now());
        let conn = self.lock()?;
        let rows = conn.execute(
            "UPDATE reminders SET
                is_archived = 0,
                next_alert_datetime = ?1,
                updated_at = ?2
             WHERE id = ?3",
            params![next_alert.map(ts), now, id],
        )?;
        if rows == 0 {
            return Err(ReminderError::NotFound(id));
        }
        Ok(())
    }

    /// Move a recurring reminder onto its next occurrence: new due and next
    /// alert, counters and tokens reset, un-archived.
    pub fn reschedule_recurrence(
        &self,
        id: i64,
        new_due: DateTime<Utc>,
        new_next_alert: DateTime<Utc>,
    ) -> Result<()> {
        let now = ts(self.clock.now());
        let conn = self.lock()?;
        let rows = conn.execute(
            "UPDATE reminders SET
                due_datetime = ?1,
                next_alert_datetime = ?2,
                alerts_sent_count = 0,
                snooze_count = 0,
                relentless_confirm_token = NULL,
                nudge_token = NULL,
                is_archived = 0,
                updated_at = ?3
             WHERE id = ?4",
            params![ts(new_due), ts(new_next_alert), now, id],
        )?;
        if rows == 0 {
            return Err(ReminderError::NotFound(id));
        }
        Ok(())
    }

    /// Record one alert sent: bump the count and move the next alert.
    pub fn record_alert_sent(
        &self,
        id: i64,
        next_alert: DateTime<Utc>,
        new_count: u32,
    ) -> Result<()> {
        let now = ts(self.clock.now());
        let conn = self.lock()?;
        let rows = conn.execute(
            "UPDATE reminders SET
                next_alert_datetime = ?1,
                alerts_sent_count = ?2,
                updated_at = ?3
             WHERE id = ?4",
            params![ts(next_alert), new_count, now, id],
        )?;
        if rows == 0 {
            return Err(ReminderError::NotFound(id));
        }
        Ok(())
    }

    /// Escalate a reminder to High priority. No-op if already High.
    pub fn escalate_priority(&self, id: i64) -> Result<()> {
        let now = ts(self.clock.now());
        let conn = self.lock()?;
        conn.execute(
            "UPDATE reminders SET priority = 1, updated_at = ?1 \
             WHERE id = ?2 AND priority > 1",
            params![now, id],
        )?;
        Ok(())
    }

    /// Apply a snooze: shift due and next alert, force High priority, burn
    /// the nudge token, un-archive. Returns rows changed.
    pub fn snooze(
        &self,
        id: i64,
        new_due: DateTime<Utc>,
        new_next_alert: DateTime<Utc>,
    ) -> Result<usize> {
        let now = ts(self.clock.now());
        let conn = self.lock()?;
        Ok(conn.execute(
            "UPDATE reminders SET
                due_datetime = ?1,
                next_alert_datetime = ?2,
                priority = 1,
                snooze_count = snooze_count + 1,
                nudge_token = NULL,
                is_archived = 0,
                updated_at = ?3
             WHERE id = ?4",
            params![ts(new_due), ts(new_next_alert), now, id],
        )?)
    }

    // -----------------------------------------------------------------------
    // Token issuing / consumption
    // -----------------------------------------------------------------------

    /// Mint and persist a fresh single-use nudge token.
    pub fn issue_nudge_token(&self, id: i64) -> Result<String> {
        self.issue_token(id, "nudge_token")
    }

    /// Mint and persist a fresh relentless confirm token.
    pub fn issue_confirm_token(&self, id: i64) -> Result<String> {
        self.issue_token(id, "relentless_confirm_token")
    }

    fn issue_token(&self, id: i64, column: &str) -> Result<String> {
        let token = Uuid::new_v4().to_string();
        let now = ts(self.clock.now());
        let conn = self.lock()?;
        let sql = format!("UPDATE reminders SET {column} = ?1, updated_at = ?2 WHERE id = ?3");
        let rows = conn.execute(&sql, params![token, now, id])?;
        if rows == 0 {
            return Err(ReminderError::NotFound(id));
        }
        Ok(token)
    }

    /// Consume a confirm token. Returns the number of rows changed; 0 means
    /// the token matched nothing (already confirmed, or never issued).
    pub fn clear_confirm_token(&self, token: &str) -> Result<usize> {
        let now = ts(self.clock.now());
        let conn = self.lock()?;
        Ok(conn.execute(
            "UPDATE reminders SET relentless_confirm_token = NULL, updated_at = ?1 \
             WHERE relentless_confirm_token = ?2",
            params![now, token],
        )?)
    }

    // -----------------------------------------------------------------------
    // Settings + retention
    // -----------------------------------------------------------------------

    /// Read a named setting.
    pub fn get_setting(&self, key: &str) -> Result<Option<String>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare("SELECT value FROM settings WHERE key = ?1")?;
        let mut rows = stmt.query_map(params![key], |row| row.get::<_, String>(0))?;
        rows.next().transpose().map_err(Into::into)
    }

    /// Write a named setting.
    pub fn set_setting(&self, key: &str, value: &str) -> Result<()> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT OR REPLACE INTO settings (key, value) VALUES (?1, ?2)",
            params![key, value],
        )?;
        Ok(())
    }

    /// Purge archived reminders last touched before `threshold`. Returns
    /// the number deleted.
    pub fn delete_archived_older_than(&self, threshold: DateTime<Utc>) -> Result<usize> {
        let conn = self.lock()?;
        Ok(conn.execute(
            "DELETE FROM reminders WHERE is_archived = 1 AND updated_at < ?1",
            params![ts(threshold)],
        )?)
    }

    // -----------------------------------------------------------------------
    // Private helpers
    // -----------------------------------------------------------------------

    fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| ReminderError::Lock(e.to_string()))
    }
}

/// RFC 3339 at second precision, `Z` suffix. Fixed-width within a century,
/// so SQL string comparison orders correctly.
fn ts(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Secs, true)
}

fn policy_columns(policy: &AlertPolicy) -> (bool, u32, i64) {
    match policy {
        AlertPolicy::Standard {
            extra_alerts,
            repeat_interval_minutes,
        } => (false, *extra_alerts, *repeat_interval_minutes),
        AlertPolicy::Relentless { .. } => (true, 0, 5),
    }
}

fn collect(
    rows: impl Iterator<Item = rusqlite::Result<Reminder>>,
) -> Result<Vec<Reminder>> {
    let mut reminders = Vec::new();
    for r in rows {
        reminders.push(r?);
    }
    Ok(reminders)
}

// ---------------------------------------------------------------------------
// Row conversion
// ---------------------------------------------------------------------------

fn row_to_reminder(row: &Row<'_>) -> rusqlite::Result<Reminder> {
    let is_relentless: bool = row.get(12)?;
    let policy = if is_relentless {
        AlertPolicy::Relentless {
            confirm_token: row.get(13)?,
        }
    } else {
        AlertPolicy::Standard {
            extra_alerts: row.get(7)?,
            repeat_interval_minutes: row.get(8)?,
        }
    };

    let rule: Option<String> = row.get(9)?;
    let dtstart = opt_ts_col(row, 10)?;
    let end_raw: Option<String> = row.get(11)?;
    let recurrence = match (rule, dtstart) {
        (Some(rule), Some(dtstart)) if rule != "none" && !rule.is_empty() => Some(Recurrence {
            rule,
            dtstart,
            end_date: end_raw.as_deref().and_then(parse_end_date),
        }),
        _ => None,
    };

    Ok(Reminder {
        id: row.get(0)?,
        text: row.get(1)?,
        priority: Priority::from_i64(row.get(2)?),
        due: ts_col(row, 3)?,
        recipient: row.get(4)?,
        lead_value: row.get(5)?,
        lead_unit: row.get(6)?,
        policy,
        recurrence,
        snooze_count: row.get(14)?,
        nudge_token: row.get(15)?,
        notify: NotifyTargets {
            home_assistant: row.get(16)?,
            ntfy: row.get(17)?,
            gotify: row.get(18)?,
        },
        next_alert: opt_ts_col(row, 19)?,
        alerts_sent: row.get(20)?,
        archived: row.get(21)?,
        created_at: ts_col(row, 22)?,
        updated_at: ts_col(row, 23)?,
    })
}

fn ts_col(row: &Row<'_>, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let raw: String = row.get(idx)?;
    parse_ts(&raw).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            idx,
            rusqlite::types::Type::Text,
            format!("bad RFC 3339 datetime: {raw}").into(),
        )
    })
}

fn opt_ts_col(row: &Row<'_>, idx: usize) -> rusqlite::Result<Option<DateTime<Utc>>> {
    let raw: Option<String> = row.get(idx)?;
    match raw {
        None => Ok(None),
        Some(raw) => {
            let parsed = parse_ts(&raw).ok_or_else(|| {
                rusqlite::Error::FromSqlConversionFailure(
                    idx,
                    rusqlite::types::Type::Text,
                    format!("bad RFC 3339 datetime: {raw}").into(),
                )
            })?;
            Ok(Some(parsed))
        }
    }
}

fn parse_ts(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

/// End dates may arrive as a bare ISO date or a full datetime.
fn parse_end_date(raw: &str) -> Option<NaiveDate> {
    if let Ok(date) = raw.parse::<NaiveDate>() {
        return Some(date);
    }
    parse_ts(raw).map(|dt| dt.date_naive())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::*;
    use crate::clock::ManualClock;
    use chrono::Duration;

    fn dt(s: &str) -> DateTime<Utc> {
        s.parse().unwrap()
    }

    fn test_store(now: &str) -> (tempfile::TempDir, ReminderStore, Arc<ManualClock>) {
        let dir = tempfile::TempDir::new().expect("create temp dir");
        let clock = Arc::new(ManualClock::new(dt(now)));
        let store = ReminderStore::open(&dir.path().join("reminders.db"))
            .expect("open store")
            .with_clock(Arc::clone(&clock) as Arc<dyn Clock>);
        (dir, store, clock)
    }

    fn basic_reminder(due: &str) -> NewReminder {
        NewReminder {
            text: "water the plants".to_owned(),
            priority: Priority::Medium,
            due: dt(due),
            recipient: Some("alice".to_owned()),
            lead_value: 15,
            lead_unit: "minutes".to_owned(),
            policy: AlertPolicy::standard(2, 10),
            recurrence_rule: None,
            recurrence_end_date: None,
            notify: NotifyTargets::default(),
        }
    }

    #[test]
    fn add_computes_initial_next_alert() {
        let (_dir, store, _clock) = test_store("2026-05-01T00:00:00Z");
        let reminder = store.add(&basic_reminder("2026-05-20T18:00:00Z")).unwrap();

        assert_eq!(reminder.next_alert, Some(dt("2026-05-20T17:45:00Z")));
        assert_eq!(reminder.alerts_sent, 0);
        assert!(!reminder.archived);
        assert!(reminder.recurrence.is_none());
        assert_eq!(reminder.policy, AlertPolicy::standard(2, 10));
    }

    #[test]
    fn add_recurring_sets_dtstart_to_due() {
        let (_dir, store, _clock) = test_store("2026-05-01T00:00:00Z");
        let mut new = basic_reminder("2026-05-20T18:00:00Z");
        new.recurrence_rule = Some("FREQ=WEEKLY".to_owned());
        new.recurrence_end_date = Some("2026-12-31".parse().unwrap());

        let reminder = store.add(&new).unwrap();
        let recurrence = reminder.recurrence.expect("recurrence present");
        assert_eq!(recurrence.rule, "FREQ=WEEKLY");
        assert_eq!(recurrence.dtstart, dt("2026-05-20T18:00:00Z"));
        assert_eq!(recurrence.end_date, Some("2026-12-31".parse().unwrap()));
    }

    #[test]
    fn add_rule_none_means_no_recurrence() {
        let (_dir, store, _clock) = test_store("2026-05-01T00:00:00Z");
        let mut new = basic_reminder("2026-05-20T18:00:00Z");
        new.recurrence_rule = Some("none".to_owned());
        let reminder = store.add(&new).unwrap();
        assert!(reminder.recurrence.is_none());
    }

    #[test]
    fn relentless_round_trips_through_policy() {
        let (_dir, store, _clock) = test_store("2026-05-01T00:00:00Z");
        let mut new = basic_reminder("2026-05-20T18:00:00Z");
        new.policy = AlertPolicy::relentless();
        let reminder = store.add(&new).unwrap();

        assert!(reminder.policy.is_relentless());
        assert!(reminder.policy.confirm_token().is_none());
    }

    #[test]
    fn update_resets_cycle_state() {
        let (_dir, store, _clock) = test_store("2026-05-01T00:00:00Z");
        let reminder = store.add(&basic_reminder("2026-05-20T18:00:00Z")).unwrap();
        store.issue_nudge_token(reminder.id).unwrap();
        store
            .record_alert_sent(reminder.id, dt("2026-05-20T17:55:00Z"), 1)
            .unwrap();

        let mut edited = basic_reminder("2026-06-01T09:00:00Z");
        edited.text = "water the garden".to_owned();
        store.update(reminder.id, &edited).unwrap();

        let reloaded = store.get(reminder.id).unwrap().unwrap();
        assert_eq!(reloaded.text, "water the garden");
        assert_eq!(reloaded.alerts_sent, 0);
        assert!(reloaded.nudge_token.is_none());
        assert_eq!(reloaded.next_alert, Some(dt("2026-06-01T08:45:00Z")));
    }

    #[test]
    fn update_missing_id_is_not_found() {
        let (_dir, store, _clock) = test_store("2026-05-01T00:00:00Z");
        let err = store
            .update(999, &basic_reminder("2026-05-20T18:00:00Z"))
            .unwrap_err();
        assert!(matches!(err, ReminderError::NotFound(999)));
    }

    #[test]
    fn due_query_respects_boundary_and_archive() {
        let (_dir, store, _clock) = test_store("2026-05-01T00:00:00Z");
        let due_now = store.add(&basic_reminder("2026-05-20T18:00:00Z")).unwrap();
        let later = store.add(&basic_reminder("2026-05-21T18:00:00Z")).unwrap();
        let archived = store.add(&basic_reminder("2026-05-19T18:00:00Z")).unwrap();
        store.set_archived(archived.id, true).unwrap();

        // 17:45 is exactly due_now's next alert; later's is tomorrow.
        let due = store.due_reminders(dt("2026-05-20T17:45:00Z")).unwrap();
        let ids: Vec<i64> = due.iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![due_now.id]);
        assert!(!ids.contains(&later.id));
    }

    #[test]
    fn tokens_issue_lookup_and_consume() {
        let (_dir, store, _clock) = test_store("2026-05-01T00:00:00Z");
        let reminder = store.add(&basic_reminder("2026-05-20T18:00:00Z")).unwrap();

        let nudge = store.issue_nudge_token(reminder.id).unwrap();
        let confirm = store.issue_confirm_token(reminder.id).unwrap();
        assert_ne!(nudge, confirm);

        let found = store.find_by_nudge_token(&nudge).unwrap().unwrap();
        assert_eq!(found.id, reminder.id);
        let found = store.find_by_confirm_token(&confirm).unwrap().unwrap();
        assert_eq!(found.id, reminder.id);

        assert_eq!(store.clear_confirm_token(&confirm).unwrap(), 1);
        // Second consumption matches nothing.
        assert_eq!(store.clear_confirm_token(&confirm).unwrap(), 0);
        assert!(store.find_by_confirm_token(&confirm).unwrap().is_none());
    }

    #[test]
    fn issue_token_for_missing_reminder_is_not_found() {
        let (_dir, store, _clock) = test_store("2026-05-01T00:00:00Z");
        assert!(matches!(
            store.issue_nudge_token(42).unwrap_err(),
            ReminderError::NotFound(42)
        ));
    }

    #[test]
    fn snooze_shifts_and_burns_token() {
        let (_dir, store, _clock) = test_store("2026-05-01T00:00:00Z");
        let reminder = store.add(&basic_reminder("2026-05-20T18:00:00Z")).unwrap();
        store.issue_nudge_token(reminder.id).unwrap();

        let changed = store
            .snooze(
                reminder.id,
                reminder.due + Duration::minutes(15),
                reminder.next_alert.unwrap() + Duration::minutes(15),
            )
            .unwrap();
        assert_eq!(changed, 1);

        let reloaded = store.get(reminder.id).unwrap().unwrap();
        assert_eq!(reloaded.due, dt("2026-05-20T18:15:00Z"));
        assert_eq!(reloaded.next_alert, Some(dt("2026-05-20T18:00:00Z")));
        assert_eq!(reloaded.snooze_count, 1);
        assert_eq!(reloaded.priority, Priority::High);
        assert!(reloaded.nudge_token.is_none());
    }

    #[test]
    fn archive_clears_next_alert_and_confirm_token() {
        let (_dir, store, _clock) = test_store("2026-05-01T00:00:00Z");
        let mut new = basic_reminder("2026-05-20T18:00:00Z");
        new.policy = AlertPolicy::relentless();
        let reminder = store.add(&new).unwrap();
        store.issue_confirm_token(reminder.id).unwrap();

        store.set_archived(reminder.id, true).unwrap();
        let reloaded = store.get(reminder.id).unwrap().unwrap();
        assert!(reloaded.archived);
        assert!(reloaded.next_alert.is_none());
        assert!(reloaded.policy.confirm_token().is_none());
        assert_eq!(reloaded.snooze_count, 0);
    }

    #[test]
    fn reactivate_sets_explicit_next_alert() {
        let (_dir, store, _clock) = test_store("2026-05-01T00:00:00Z");
        let reminder = store.add(&basic_reminder("2026-05-20T18:00:00Z")).unwrap();
        store.set_archived(reminder.id, true).unwrap();

        store
            .reactivate(reminder.id, Some(dt("2026-05-20T17:45:00Z")))
            .unwrap();
        let reloaded = store.get(reminder.id).unwrap().unwrap();
        assert!(!reloaded.archived);
        assert_eq!(reloaded.next_alert, Some(dt("2026-05-20T17:45:00Z")));
    }

    #[test]
    fn reschedule_recurrence_resets_everything() {
        let (_dir, store, _clock) = test_store("2026-05-01T00:00:00Z");
        let mut new = basic_reminder("2026-05-20T18:00:00Z");
        new.recurrence_rule = Some("FREQ=WEEKLY".to_owned());
        let reminder = store.add(&new).unwrap();
        store.issue_nudge_token(reminder.id).unwrap();
        store
            .record_alert_sent(reminder.id, dt("2026-05-20T17:55:00Z"), 3)
            .unwrap();

        store
            .reschedule_recurrence(
                reminder.id,
                dt("2026-05-27T18:00:00Z"),
                dt("2026-05-27T17:45:00Z"),
            )
            .unwrap();

        let reloaded = store.get(reminder.id).unwrap().unwrap();
        assert_eq!(reloaded.due, dt("2026-05-27T18:00:00Z"));
        assert_eq!(reloaded.next_alert, Some(dt("2026-05-27T17:45:00Z")));
        assert_eq!(reloaded.alerts_sent, 0);
        assert_eq!(reloaded.snooze_count, 0);
        assert!(reloaded.nudge_token.is_none());
        assert!(!reloaded.archived);
    }

    #[test]
    fn escalate_only_raises_below_high() {
        let (_dir, store, _clock) = test_store("2026-05-01T00:00:00Z");
        let reminder = store.add(&basic_reminder("2026-05-20T18:00:00Z")).unwrap();
        store.escalate_priority(reminder.id).unwrap();
        let reloaded = store.get(reminder.id).unwrap().unwrap();
        assert_eq!(reloaded.priority, Priority::High);

        // Idempotent on already-High reminders.
        store.escalate_priority(reminder.id).unwrap();
        let reloaded = store.get(reminder.id).unwrap().unwrap();
        assert_eq!(reloaded.priority, Priority::High);
    }

    #[test]
    fn auto_archive_candidates_use_strict_grouping() {
        let (_dir, store, _clock) = test_store("2026-05-01T00:00:00Z");
        let now = dt("2026-06-01T00:00:00Z");

        // Budget exhausted and past due: eligible.
        let spent = store.add(&basic_reminder("2026-05-20T18:00:00Z")).unwrap();
        store
            .record_alert_sent(spent.id, dt("2026-05-20T18:05:00Z"), 3)
            .unwrap();

        // Past due but budget not exhausted: not eligible.
        let in_budget = store.add(&basic_reminder("2026-05-21T18:00:00Z")).unwrap();
        store
            .record_alert_sent(in_budget.id, dt("2026-05-21T18:05:00Z"), 1)
            .unwrap();

        // Future due: not eligible even with exhausted budget.
        let future = store.add(&basic_reminder("2026-07-01T18:00:00Z")).unwrap();
        store
            .record_alert_sent(future.id, dt("2026-06-30T18:05:00Z"), 3)
            .unwrap();

        // Recurring: never swept.
        let mut recurring_new = basic_reminder("2026-05-20T18:00:00Z");
        recurring_new.recurrence_rule = Some("FREQ=DAILY".to_owned());
        let recurring = store.add(&recurring_new).unwrap();
        store
            .record_alert_sent(recurring.id, dt("2026-05-20T18:05:00Z"), 3)
            .unwrap();

        // Relentless: never swept.
        let mut relentless_new = basic_reminder("2026-05-20T18:00:00Z");
        relentless_new.policy = AlertPolicy::relentless();
        let relentless = store.add(&relentless_new).unwrap();
        store
            .record_alert_sent(relentless.id, dt("2026-05-20T18:05:00Z"), 4)
            .unwrap();

        let ids: Vec<i64> = store
            .auto_archive_candidates(now)
            .unwrap()
            .iter()
            .map(|r| r.id)
            .collect();
        assert_eq!(ids, vec![spent.id]);
    }

    #[test]
    fn purge_deletes_only_old_archived_rows() {
        let (_dir, store, clock) = test_store("2026-01-01T00:00:00Z");

        let old = store.add(&basic_reminder("2026-01-02T10:00:00Z")).unwrap();
        store.set_archived(old.id, true).unwrap();

        // Seven months later, archive a second reminder.
        clock.set(dt("2026-08-01T00:00:00Z"));
        let fresh = store.add(&basic_reminder("2026-08-02T10:00:00Z")).unwrap();
        store.set_archived(fresh.id, true).unwrap();

        let deleted = store
            .delete_archived_older_than(dt("2026-02-01T00:00:00Z"))
            .unwrap();
        assert_eq!(deleted, 1);
        assert!(store.get(old.id).unwrap().is_none());
        assert!(store.get(fresh.id).unwrap().is_some());
    }

    #[test]
    fn settings_round_trip_and_overwrite() {
        let (_dir, store, _clock) = test_store("2026-01-01T00:00:00Z");
        assert!(store.get_setting("history_cleanup_interval").unwrap().is_none());

        store.set_setting("history_cleanup_interval", "1y").unwrap();
        assert_eq!(
            store.get_setting("history_cleanup_interval").unwrap().as_deref(),
            Some("1y")
        );

        store.set_setting("history_cleanup_interval", "off").unwrap();
        assert_eq!(
            store.get_setting("history_cleanup_interval").unwrap().as_deref(),
            Some("off")
        );
    }

    #[test]
    fn bulk_delete_and_clear_archived() {
        let (_dir, store, _clock) = test_store("2026-01-01T00:00:00Z");
        let a = store.add(&basic_reminder("2026-01-02T10:00:00Z")).unwrap();
        let b = store.add(&basic_reminder("2026-01-03T10:00:00Z")).unwrap();
        let c = store.add(&basic_reminder("2026-01-04T10:00:00Z")).unwrap();
        store.set_archived(c.id, true).unwrap();

        assert_eq!(store.bulk_delete(&[a.id, b.id]).unwrap(), 2);
        assert_eq!(store.bulk_delete(&[]).unwrap(), 0);
        assert_eq!(store.clear_archived().unwrap(), 1);
        assert!(store.list(false).unwrap().is_empty());
        assert!(store.list(true).unwrap().is_empty());
    }
}
