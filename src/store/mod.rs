//! Reminder persistence.

mod schema;
mod sqlite;

pub use sqlite::ReminderStore;
