//! Periodic background jobs: the alert tick, the auto-archive sweep, and
//! the daily history purge.

mod alert;
mod retention;
mod runner;

pub use alert::{AlertCycle, RELENTLESS_INTERVAL_MINUTES};
pub use retention::{CLEANUP_INTERVAL_SETTING, RetentionJob, RetentionWindow};
pub use runner::Scheduler;
