//! Token-driven reminder actions.
//!
//! These back the links embedded in alert payloads: a single-use snooze
//! ("nudge") and the relentless confirm. Both are keyed by opaque tokens the
//! alert cycle mints, never by reminder id.

use chrono::Duration;
use tracing::info;

use crate::error::{ReminderError, Result};
use crate::model::Reminder;
use crate::store::ReminderStore;

/// How far a nudge pushes the reminder out.
pub const NUDGE_SNOOZE_MINUTES: i64 = 15;

/// Snooze a reminder via its nudge token.
///
/// Valid only while the reminder has never been snoozed; the token is
/// burned by the snooze itself. Shifts both the due instant and the next
/// alert by [`NUDGE_SNOOZE_MINUTES`], forces High priority, and un-archives
/// the reminder if a sweep got to it first. Returns the updated reminder.
pub fn nudge_by_token(store: &ReminderStore, token: &str) -> Result<Reminder> {
    let reminder = store
        .find_by_nudge_token(token)?
        .ok_or(ReminderError::InvalidToken)?;

    if reminder.snooze_count > 0 {
        // A stale token that somehow survived a snooze is not honored twice.
        return Err(ReminderError::InvalidToken);
    }

    let shift = Duration::minutes(NUDGE_SNOOZE_MINUTES);
    let new_due = reminder.due + shift;
    let new_next_alert = reminder.next_alert.unwrap_or(reminder.due) + shift;

    let changed = store.snooze(reminder.id, new_due, new_next_alert)?;
    if changed == 0 {
        return Err(ReminderError::InvalidToken);
    }

    info!(
        id = reminder.id,
        next_alert = %new_next_alert,
        "reminder snoozed via nudge token"
    );
    store
        .get(reminder.id)?
        .ok_or(ReminderError::NotFound(reminder.id))
}

/// Confirm (silence) a relentless reminder via its confirm token.
///
/// A single UPDATE clears the token wherever it matches, so concurrent
/// confirms cannot both succeed. The reminder itself completes on the next
/// alert tick once the token is gone.
pub fn confirm_by_token(store: &ReminderStore, token: &str) -> Result<()> {
    let changed = store.clear_confirm_token(token)?;
    if changed == 0 {
        return Err(ReminderError::InvalidToken);
    }
    info!("relentless reminder confirmed");
    Ok(())
}
