use thiserror::Error;

/// Failures at the persistence boundary. Each one is local to a single message.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("failed to serialize structured data: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("store thread is not running")]
    Closed,
}
