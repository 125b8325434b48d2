use thiserror::Error;

use taskdock_store::StoreError;

/// Errors surfaced by administrative operations. Internal best-effort paths
/// (completion bookkeeping, reconciliation of a single entry) log and
/// swallow instead.
#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("Job not found: {id}")]
    JobNotFound { id: i64 },

    #[error("Job already running: {id}")]
    AlreadyRunning { id: i64 },

    #[error("Invalid cron expression '{expr}': {reason}")]
    InvalidCron { expr: String, reason: String },

    #[error("Trigger engine error: {0}")]
    Engine(String),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

pub type Result<T> = std::result::Result<T, SchedulerError>;
