//! remindd: a reminder alerting daemon.
//!
//! Reminders live in SQLite and move through a small state machine:
//! Due scan → webhook alert → repeat budget / relentless loop → completion
//!
//! # Architecture
//!
//! The daemon is built from a handful of independent pieces wired together
//! at startup:
//! - **Store**: SQLite persistence for reminders and settings (`rusqlite`)
//! - **Recurrence**: RRULE-style rule parsing and next-occurrence math
//! - **Alert cycle**: the per-tick state machine over due reminders
//! - **Dispatcher**: fire-and-forget webhook delivery via `reqwest`
//! - **Retention**: auto-archive sweep and daily history purge
//! - **Scheduler**: tokio loops driving the three periodic jobs

pub mod actions;
pub mod clock;
pub mod config;
pub mod error;
pub mod model;
pub mod notify;
pub mod recurrence;
pub mod scheduler;
pub mod store;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::AppConfig;
pub use error::{ReminderError, Result};
pub use model::{
    AlertPolicy, NewReminder, NotifyTargets, Priority, Recurrence, Reminder, compute_next_alert,
};
pub use notify::Dispatcher;
pub use scheduler::{AlertCycle, RetentionJob, Scheduler};
pub use store::ReminderStore;
