//! Storage-specific error type wrapping sqlx errors.

use mindhub_domain::error::HubError;

/// Errors originating from the `SQLite` storage layer.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// A query or connection failed.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Failed to serialize or deserialize a stored JSON value.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Failed to run migrations.
    #[error("migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),
}

impl From<StorageError> for HubError {
    fn from(err: StorageError) -> Self {
        Self::Storage(err.to_string())
    }
}
