use thiserror::Error;

pub type Result<T> = std::result::Result<T, StashError>;

#[derive(Error, Debug)]
pub enum StashError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Collection {0} does not exist")]
    CollectionNotFound(String),
    #[error("Collection {0} already exists")]
    CollectionExists(String),
    #[error("Invalid collection name '{name}': {reason}")]
    InvalidCollectionName { name: String, reason: String },
    #[error("Embedding dimension {got} does not match collection dimensionality {expected}")]
    DimensionMismatch { expected: usize, got: usize },
    #[error("Duplicate id in request: {0}")]
    DuplicateId(String),
    #[error("Invalid input: {0}")]
    InvalidInput(String),
    #[error("Resetting the store is disabled, set allow_reset to enable it")]
    ResetDisabled,
    #[error("Stored data is corrupt: {0}")]
    Corrupt(String),
}
