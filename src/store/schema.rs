//! SQLite DDL for the reminder store.
//!
//! All `CREATE TABLE` statements live here so they are reviewable and
//! testable in isolation.

use rusqlite::Connection;

/// Current schema version stamped into `schema_meta`.
pub(crate) const CURRENT_SCHEMA_VERSION: u32 = 1;

/// Complete DDL for the reminder database.
///
/// Uses `IF NOT EXISTS` throughout so `apply_schema` is idempotent.
pub(crate) const SCHEMA_SQL: &str = r#"
-- Enable WAL mode for concurrent reads during writes.
PRAGMA journal_mode = WAL;

-- Schema version tracking.
CREATE TABLE IF NOT EXISTS schema_meta (
    key   TEXT PRIMARY KEY,
    value TEXT NOT NULL
);

-- Reminders. Datetimes are RFC 3339 TEXT in UTC.
CREATE TABLE IF NOT EXISTS reminders (
    id                            INTEGER PRIMARY KEY AUTOINCREMENT,
    text                          TEXT NOT NULL,
    priority                      INTEGER NOT NULL DEFAULT 2,   -- 1 high, 2 medium, 3 low
    due_datetime                  TEXT NOT NULL,
    recipient                     TEXT,
    alert_lead_time_value         INTEGER NOT NULL DEFAULT 0,
    alert_lead_time_unit          TEXT NOT NULL DEFAULT 'minutes',
    alert_repeat_additional_count INTEGER NOT NULL DEFAULT 0,
    alert_repeat_interval_minutes INTEGER NOT NULL DEFAULT 5,
    recurrence_rule               TEXT,                         -- NULL/'none' = one-shot
    recurrence_dtstart            TEXT,                         -- set iff a rule is present
    recurrence_end_date           TEXT,                         -- ISO date, inclusive bound
    is_relentless                 INTEGER NOT NULL DEFAULT 0,
    relentless_confirm_token      TEXT,
    snooze_count                  INTEGER NOT NULL DEFAULT 0,
    nudge_token                   TEXT,
    notify_home_assistant_url     TEXT,
    notify_ntfy_url               TEXT,
    notify_gotify_url             TEXT,
    next_alert_datetime           TEXT,                         -- NULL once archived
    alerts_sent_count             INTEGER NOT NULL DEFAULT 0,
    is_archived                   INTEGER NOT NULL DEFAULT 0,
    created_at                    TEXT NOT NULL,
    updated_at                    TEXT NOT NULL
);

-- The alert tick scans by next alert; the purge scans archived rows.
CREATE INDEX IF NOT EXISTS idx_reminders_next_alert ON reminders(is_archived, next_alert_datetime);
CREATE INDEX IF NOT EXISTS idx_reminders_archived_updated ON reminders(is_archived, updated_at);
CREATE INDEX IF NOT EXISTS idx_reminders_nudge_token ON reminders(nudge_token);
CREATE INDEX IF NOT EXISTS idx_reminders_confirm_token ON reminders(relentless_confirm_token);

-- Free-form settings (retention window override lives here).
CREATE TABLE IF NOT EXISTS settings (
    key   TEXT PRIMARY KEY,
    value TEXT NOT NULL
);
"#;

/// Apply the full schema to an open connection.
///
/// Safe to call multiple times. Seeds the schema version on a fresh
/// database.
pub(crate) fn apply_schema(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(SCHEMA_SQL)?;

    conn.execute(
        "INSERT OR IGNORE INTO schema_meta (key, value) VALUES ('schema_version', ?1)",
        rusqlite::params![CURRENT_SCHEMA_VERSION.to_string()],
    )?;

    Ok(())
}

/// Read the current schema version from the database.
pub(crate) fn read_schema_version(conn: &Connection) -> rusqlite::Result<Option<u32>> {
    let mut stmt = conn.prepare("SELECT value FROM schema_meta WHERE key = 'schema_version'")?;
    let mut rows = stmt.query([])?;
    match rows.next()? {
        Some(row) => {
            let value: String = row.get(0)?;
            Ok(value.parse().ok())
        }
        None => Ok(None),
    }
}
