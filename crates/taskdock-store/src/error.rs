use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    /// Underlying SQLite / rusqlite error.
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// No job with the given id exists.
    #[error("Job not found: {id}")]
    JobNotFound { id: i64 },
}

pub type Result<T> = std::result::Result<T, StoreError>;
