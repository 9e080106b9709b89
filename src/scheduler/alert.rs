//! The per-tick alert cycle.
//!
//! Each tick pulls every reminder whose next alert is due, sends its
//! webhooks, and advances its state: standard reminders walk down a fixed
//! repeat budget and then complete, relentless reminders re-alert on a
//! short fixed interval until their confirm token is consumed. Completion
//! either archives the reminder or, for recurring ones, reschedules it
//! onto the next occurrence.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use tracing::{error, info, warn};

use crate::clock::Clock;
use crate::config::WebhookConfig;
use crate::error::Result;
use crate::model::{AlertPolicy, Priority, Reminder, compute_next_alert};
use crate::notify::{AlertActions, AlertPayload, Dispatcher, resolve_endpoints};
use crate::recurrence::next_occurrence;
use crate::store::ReminderStore;

/// Minutes between re-alerts for an unconfirmed relentless reminder.
pub const RELENTLESS_INTERVAL_MINUTES: i64 = 10;

/// Alerts a relentless reminder gets at its stored priority before being
/// escalated to High.
const ESCALATE_AFTER_ALERTS: u32 = 2;

/// Drives due reminders through one alert each per tick.
pub struct AlertCycle {
    store: Arc<ReminderStore>,
    dispatcher: Arc<Dispatcher>,
    webhooks: WebhookConfig,
    base_url: String,
    clock: Arc<dyn Clock>,
}

impl AlertCycle {
    pub fn new(
        store: Arc<ReminderStore>,
        dispatcher: Arc<Dispatcher>,
        webhooks: WebhookConfig,
        base_url: String,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            store,
            dispatcher,
            webhooks,
            base_url,
            clock,
        }
    }

    /// Process every reminder due at the current instant. Returns how many
    /// were processed; per-reminder failures are logged and skipped so one
    /// bad row cannot stall the rest.
    pub async fn run_tick(&self) -> Result<usize> {
        let now = self.clock.now();
        let due = self.store.due_reminders(now)?;
        for reminder in &due {
            if let Err(e) = self.process_due(reminder, now).await {
                error!(id = reminder.id, "alert processing failed: {e}");
            }
        }
        Ok(due.len())
    }

    async fn process_due(&self, reminder: &Reminder, now: DateTime<Utc>) -> Result<()> {
        // A relentless reminder whose confirm token is gone after at least
        // one alert has been confirmed; it completes instead of re-alerting.
        if reminder.policy.is_relentless()
            && reminder.policy.confirm_token().is_none()
            && reminder.alerts_sent > 0
        {
            info!(id = reminder.id, "relentless reminder confirmed, completing");
            return self.complete(reminder);
        }

        // An ignored relentless reminder escalates to High after its first
        // two alerts.
        let mut priority = reminder.priority;
        if reminder.policy.is_relentless()
            && priority != Priority::High
            && reminder.alerts_sent >= ESCALATE_AFTER_ALERTS
        {
            self.store.escalate_priority(reminder.id)?;
            priority = Priority::High;
            info!(
                id = reminder.id,
                "relentless reminder escalated to high priority"
            );
        }

        // The nudge link only exists until the first snooze; the token is
        // reused across repeats of the same cycle.
        let nudge_token = if reminder.snooze_count == 0 {
            match &reminder.nudge_token {
                Some(token) => Some(token.clone()),
                None => Some(self.store.issue_nudge_token(reminder.id)?),
            }
        } else {
            None
        };

        let confirm_token = if reminder.policy.is_relentless() {
            match reminder.policy.confirm_token() {
                Some(token) => Some(token.to_owned()),
                None => Some(self.store.issue_confirm_token(reminder.id)?),
            }
        } else {
            None
        };

        let actions = AlertActions {
            nudge: nudge_token.map(|t| self.action_url(&t, "nudge")),
            confirm: confirm_token.map(|t| self.action_url(&t, "confirm")),
        };
        let mut payload = AlertPayload::for_reminder(reminder, actions);
        payload.priority = priority.as_u8();

        let endpoints = resolve_endpoints(&reminder.notify, &self.webhooks);
        self.dispatcher.dispatch(&endpoints, &payload).await;

        // Advance the cycle regardless of delivery outcome.
        let new_count = reminder.alerts_sent + 1;
        match &reminder.policy {
            AlertPolicy::Relentless { .. } => {
                let next = now + Duration::minutes(RELENTLESS_INTERVAL_MINUTES);
                self.store.record_alert_sent(reminder.id, next, new_count)?;
            }
            AlertPolicy::Standard {
                extra_alerts,
                repeat_interval_minutes,
            } => {
                // Repeats step from the stored alert instant, not from the
                // tick that happened to deliver it, so a late tick does not
                // drift the whole schedule.
                let base = reminder.next_alert.unwrap_or(now);
                let next = base + Duration::minutes(*repeat_interval_minutes);
                self.store.record_alert_sent(reminder.id, next, new_count)?;
                if new_count >= extra_alerts + 1 {
                    self.complete(reminder)?;
                }
            }
        }
        Ok(())
    }

    /// Finish a reminder's alert cycle: recurring reminders move to their
    /// next occurrence with a fresh cycle, everything else is archived. A
    /// rule that cannot be evaluated archives the reminder rather than
    /// re-alerting it forever.
    fn complete(&self, reminder: &Reminder) -> Result<()> {
        if let Some(series) = &reminder.recurrence {
            // Searching strictly after the current due date walks the
            // series one occurrence at a time, so a daemon catching up
            // after downtime still visits every missed occurrence.
            match next_occurrence(series, reminder.due) {
                Ok(Some(next_due)) => {
                    let next_alert =
                        compute_next_alert(next_due, reminder.lead_value, &reminder.lead_unit);
                    info!(
                        id = reminder.id,
                        next_due = %next_due,
                        "rescheduling recurring reminder"
                    );
                    return self
                        .store
                        .reschedule_recurrence(reminder.id, next_due, next_alert);
                }
                Ok(None) => {
                    info!(id = reminder.id, "recurrence series finished, archiving");
                }
                Err(e) => {
                    warn!(id = reminder.id, "unusable recurrence rule, archiving: {e}");
                }
            }
        }
        self.store.set_archived(reminder.id, true)
    }

    fn action_url(&self, token: &str, verb: &str) -> String {
        format!(
            "{}/api/reminders/{token}/{verb}",
            self.base_url.trim_end_matches('/')
        )
    }
}
