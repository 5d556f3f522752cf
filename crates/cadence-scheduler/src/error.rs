use thiserror::Error;

/// Errors that can occur within the scheduler subsystem.
#[derive(Debug, Error)]
pub enum SchedulerError {
    /// Underlying SQLite / rusqlite error.
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// APPEND-policy registration collided with an existing entry.
    #[error("Work already registered: {name}")]
    Conflict { name: String },

    /// The requested repeat interval is below the enforced minimum.
    #[error("Interval too short: {got_secs}s (minimum {min_secs}s)")]
    InvalidInterval { got_secs: i64, min_secs: u64 },

    /// A persisted constraint set could not be decoded.
    #[error("Invalid constraint set: {0}")]
    InvalidConstraints(String),

    /// The scheduler has been stopped and no longer accepts this call.
    #[error("Scheduler is shut down")]
    Shutdown,
}

pub type Result<T> = std::result::Result<T, SchedulerError>;
