//! Reminder entity and the lead-time calculator.
//!
//! The persistent record is deliberately typed: repeat-count settings only
//! exist on standard reminders, the confirm token only on relentless ones,
//! and recurrence fields only inside [`Recurrence`]. The storage layer maps
//! this onto the flat SQLite row.

use chrono::{DateTime, Duration, NaiveDate, Utc};

/// Reminder priority. Stored as 1/2/3 in the database and in the webhook
/// payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Priority {
    High,
    Medium,
    Low,
}

impl Priority {
    /// Numeric form used by storage and the webhook payload.
    pub fn as_u8(self) -> u8 {
        match self {
            Self::High => 1,
            Self::Medium => 2,
            Self::Low => 3,
        }
    }

    /// Parse the numeric form; anything unrecognized is Medium.
    pub fn from_i64(value: i64) -> Self {
        match value {
            1 => Self::High,
            3 => Self::Low,
            _ => Self::Medium,
        }
    }
}

/// How a reminder re-alerts after its first notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AlertPolicy {
    /// Fixed repeat budget: `extra_alerts` more notifications after the
    /// first, spaced `repeat_interval_minutes` apart, then completion.
    Standard {
        extra_alerts: u32,
        repeat_interval_minutes: i64,
    },
    /// Re-alerts every few minutes indefinitely until the confirm token is
    /// consumed. The token is present once the first alert has gone out and
    /// the reminder is still unconfirmed.
    Relentless { confirm_token: Option<String> },
}

impl AlertPolicy {
    /// Standard policy with the given repeat budget.
    pub fn standard(extra_alerts: u32, repeat_interval_minutes: i64) -> Self {
        Self::Standard {
            extra_alerts,
            repeat_interval_minutes,
        }
    }

    /// Relentless policy with no confirm token issued yet.
    pub fn relentless() -> Self {
        Self::Relentless {
            confirm_token: None,
        }
    }

    /// True for the relentless variant.
    pub fn is_relentless(&self) -> bool {
        matches!(self, Self::Relentless { .. })
    }

    /// Outstanding confirm token, if any.
    pub fn confirm_token(&self) -> Option<&str> {
        match self {
            Self::Relentless { confirm_token } => confirm_token.as_deref(),
            Self::Standard { .. } => None,
        }
    }
}

/// Recurrence series attached to a reminder.
///
/// `dtstart` anchors the interval grid and is set when the reminder is
/// created or edited with a rule; `end_date` inclusively bounds the series.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Recurrence {
    /// RRULE-style rule text, e.g. `FREQ=WEEKLY;INTERVAL=2;BYDAY=MO,TH`.
    pub rule: String,
    /// Anchor instant for recurrence math.
    pub dtstart: DateTime<Utc>,
    /// Optional inclusive end date for the series.
    pub end_date: Option<NaiveDate>,
}

/// Per-reminder webhook override URLs. Empty/absent falls back to the
/// global defaults in [`crate::config::WebhookConfig`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NotifyTargets {
    pub home_assistant: Option<String>,
    pub ntfy: Option<String>,
    pub gotify: Option<String>,
}

/// A persisted reminder.
#[derive(Debug, Clone)]
pub struct Reminder {
    pub id: i64,
    pub text: String,
    pub priority: Priority,
    /// Instant the event is due.
    pub due: DateTime<Utc>,
    pub recipient: Option<String>,
    /// Lead time before `due` at which the first alert fires.
    pub lead_value: u32,
    /// Lead unit: `minutes`, `hours` or `days`; anything else means no lead.
    pub lead_unit: String,
    pub policy: AlertPolicy,
    pub recurrence: Option<Recurrence>,
    /// 0 = never snoozed. The nudge link is only valid while this is 0.
    pub snooze_count: u32,
    /// Outstanding single-use snooze token.
    pub nudge_token: Option<String>,
    pub notify: NotifyTargets,
    /// When the next alert should fire; None once archived.
    pub next_alert: Option<DateTime<Utc>>,
    pub alerts_sent: u32,
    pub archived: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Reminder {
    /// First alert instant for the reminder's own lead settings.
    pub fn first_alert(&self) -> DateTime<Utc> {
        compute_next_alert(self.due, self.lead_value, &self.lead_unit)
    }
}

/// Input for creating or editing a reminder. The store derives the
/// recurrence anchor and the initial `next_alert` from these fields; any
/// confirm token on the policy is ignored (tokens are only minted during
/// alert processing).
#[derive(Debug, Clone)]
pub struct NewReminder {
    pub text: String,
    pub priority: Priority,
    pub due: DateTime<Utc>,
    pub recipient: Option<String>,
    pub lead_value: u32,
    pub lead_unit: String,
    pub policy: AlertPolicy,
    /// Rule text; `None` or `"none"` means no recurrence.
    pub recurrence_rule: Option<String>,
    pub recurrence_end_date: Option<NaiveDate>,
    pub notify: NotifyTargets,
}

impl NewReminder {
    /// Effective rule text, with `"none"` and empty normalized away.
    pub fn effective_rule(&self) -> Option<&str> {
        match self.recurrence_rule.as_deref() {
            None | Some("") | Some("none") => None,
            Some(rule) => Some(rule),
        }
    }
}

/// Compute the first alert instant: `due` minus the lead offset.
///
/// An unrecognized unit means no alert lead — the due instant is returned
/// unchanged. Pure; reused by the CRUD layer when reactivating an archived
/// reminder.
pub fn compute_next_alert(due: DateTime<Utc>, lead_value: u32, lead_unit: &str) -> DateTime<Utc> {
    let value = i64::from(lead_value);
    match lead_unit {
        "minutes" => due - Duration::minutes(value),
        "hours" => due - Duration::hours(value),
        "days" => due - Duration::days(value),
        _ => due,
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::*;

    fn due() -> DateTime<Utc> {
        "2026-05-20T18:00:00Z".parse().unwrap()
    }

    #[test]
    fn lead_minutes_hours_days() {
        assert_eq!(
            compute_next_alert(due(), 15, "minutes"),
            due() - Duration::minutes(15)
        );
        assert_eq!(
            compute_next_alert(due(), 2, "hours"),
            due() - Duration::hours(2)
        );
        assert_eq!(
            compute_next_alert(due(), 3, "days"),
            due() - Duration::days(3)
        );
    }

    #[test]
    fn unknown_unit_returns_due_unchanged() {
        assert_eq!(compute_next_alert(due(), 15, "fortnights"), due());
        assert_eq!(compute_next_alert(due(), 15, ""), due());
    }

    #[test]
    fn zero_lead_is_due() {
        assert_eq!(compute_next_alert(due(), 0, "minutes"), due());
    }

    #[test]
    fn priority_round_trips_with_medium_fallback() {
        assert_eq!(Priority::from_i64(1), Priority::High);
        assert_eq!(Priority::from_i64(2), Priority::Medium);
        assert_eq!(Priority::from_i64(3), Priority::Low);
        assert_eq!(Priority::from_i64(99), Priority::Medium);
        assert_eq!(Priority::High.as_u8(), 1);
    }

    #[test]
    fn policy_accessors() {
        let standard = AlertPolicy::standard(2, 10);
        assert!(!standard.is_relentless());
        assert!(standard.confirm_token().is_none());

        let relentless = AlertPolicy::Relentless {
            confirm_token: Some("tok".to_owned()),
        };
        assert!(relentless.is_relentless());
        assert_eq!(relentless.confirm_token(), Some("tok"));
    }

    #[test]
    fn effective_rule_normalizes_none() {
        let mut new = NewReminder {
            text: "water plants".to_owned(),
            priority: Priority::Medium,
            due: due(),
            recipient: None,
            lead_value: 0,
            lead_unit: "minutes".to_owned(),
            policy: AlertPolicy::standard(0, 5),
            recurrence_rule: Some("none".to_owned()),
            recurrence_end_date: None,
            notify: NotifyTargets::default(),
        };
        assert!(new.effective_rule().is_none());

        new.recurrence_rule = Some("FREQ=DAILY".to_owned());
        assert_eq!(new.effective_rule(), Some("FREQ=DAILY"));
    }
}
