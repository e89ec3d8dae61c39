use thiserror::Error;

pub type Result<T> = std::result::Result<T, TrackerError>;

#[derive(Debug, Error)]
pub enum TrackerError {
    #[error("validation error: {0}")]
    Validation(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("migration error: {0}")]
    Migrate(#[from] sqlx::migrate::MigrateError),

    #[error("blob store error: {0}")]
    BlobStore(#[from] moku_blobstore::BlobStoreError),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("commit failed: {0}")]
    Commit(String),
}
