//! Error types for the reminder daemon.

/// Top-level error type for the reminder scheduling core.
#[derive(Debug, thiserror::Error)]
pub enum ReminderError {
    /// SQLite storage error.
    #[error("storage error: {0}")]
    Storage(#[from] rusqlite::Error),

    /// Connection mutex poisoned.
    #[error("lock poisoned: {0}")]
    Lock(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration error.
    #[error("config error: {0}")]
    Config(String),

    /// Action token does not match a live reminder, or was already used.
    #[error("invalid or already used action token")]
    InvalidToken,

    /// Reminder not found by id.
    #[error("reminder not found: {0}")]
    NotFound(i64),

    /// Webhook dispatcher construction error.
    #[error("notify error: {0}")]
    Notify(String),
}

/// Convenience result type.
pub type Result<T> = std::result::Result<T, ReminderError>;
