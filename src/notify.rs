//! Outbound webhook delivery.
//!
//! Best-effort by design: each endpoint gets one POST with a bounded
//! timeout, the outcome is logged, and nothing about a failure (or a
//! success) feeds back into reminder state. Reliable delivery is an
//! explicit non-goal; the alert cycle advances either way.

use serde::Serialize;
use std::time::Duration;
use tracing::{debug, warn};

use crate::config::WebhookConfig;
use crate::error::{ReminderError, Result};
use crate::model::{NotifyTargets, Reminder};

/// Action links included in an alert payload.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct AlertActions {
    /// Snooze link; present only until the reminder's first snooze.
    pub nudge: Option<String>,
    /// Relentless stop link; present only for unconfirmed relentless
    /// reminders.
    pub confirm: Option<String>,
}

/// JSON body POSTed to each webhook endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct AlertPayload {
    pub id: i64,
    pub text: String,
    pub priority: u8,
    /// RFC 3339 due instant.
    pub due_datetime: String,
    pub recipient: Option<String>,
    pub is_relentless: bool,
    pub actions: AlertActions,
}

impl AlertPayload {
    /// Build the payload for a reminder with the given action links.
    pub fn for_reminder(reminder: &Reminder, actions: AlertActions) -> Self {
        Self {
            id: reminder.id,
            text: reminder.text.clone(),
            priority: reminder.priority.as_u8(),
            due_datetime: reminder.due.to_rfc3339(),
            recipient: reminder.recipient.clone(),
            is_relentless: reminder.policy.is_relentless(),
            actions,
        }
    }
}

/// A resolved delivery target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    /// Service name, used only in logs.
    pub service: &'static str,
    pub url: String,
}

/// Resolve a reminder's override URLs against the global defaults.
///
/// Each service contributes at most one endpoint: the reminder's override
/// when set, else the configured default, else nothing.
pub fn resolve_endpoints(targets: &NotifyTargets, defaults: &WebhookConfig) -> Vec<Endpoint> {
    let mut endpoints = Vec::new();
    let services: [(&'static str, Option<&str>, &str); 3] = [
        (
            "home_assistant",
            targets.home_assistant.as_deref(),
            &defaults.home_assistant,
        ),
        ("ntfy", targets.ntfy.as_deref(), &defaults.ntfy),
        ("gotify", targets.gotify.as_deref(), &defaults.gotify),
    ];

    for (service, override_url, default_url) in services {
        let url = override_url
            .filter(|u| !u.trim().is_empty())
            .unwrap_or(default_url);
        if !url.trim().is_empty() {
            endpoints.push(Endpoint {
                service,
                url: url.to_owned(),
            });
        }
    }

    endpoints
}

/// Fire-and-forget webhook dispatcher.
pub struct Dispatcher {
    client: reqwest::Client,
}

impl Dispatcher {
    /// Build a dispatcher whose requests time out after
    /// `config.timeout_secs`.
    pub fn new(config: &WebhookConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| ReminderError::Notify(format!("cannot build HTTP client: {e}")))?;
        Ok(Self { client })
    }

    /// Deliver `payload` to every endpoint, logging each outcome.
    ///
    /// Never returns an error: delivery failures are operational noise,
    /// not reminder-state events.
    pub async fn dispatch(&self, endpoints: &[Endpoint], payload: &AlertPayload) {
        for endpoint in endpoints {
            match self.send_one(endpoint, payload).await {
                Ok(()) => {
                    debug!(
                        service = endpoint.service,
                        reminder_id = payload.id,
                        "webhook delivered"
                    );
                }
                Err(e) => {
                    warn!(
                        service = endpoint.service,
                        reminder_id = payload.id,
                        "webhook delivery failed: {e}"
                    );
                }
            }
        }
    }

    async fn send_one(&self, endpoint: &Endpoint, payload: &AlertPayload) -> Result<()> {
        let response = self
            .client
            .post(&endpoint.url)
            .json(payload)
            .send()
            .await
            .map_err(|e| ReminderError::Notify(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            return Err(ReminderError::Notify(format!("{status}")));
        }

        Ok(())
    }
}
