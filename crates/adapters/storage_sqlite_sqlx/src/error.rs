//! Storage-specific error type wrapping sqlx errors.

use thingrules_domain::error::ThingRulesError;

/// Errors originating from the `SQLite` storage layer.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// A query or connection failed.
    #[error("database error")]
    Database(#[from] sqlx::Error),

    /// Failed to serialize a rule document.
    #[error("JSON serialization error")]
    Json(#[from] serde_json::Error),

    /// A stored row has an id that is not a rule id.
    #[error("invalid rule id {0:?}")]
    InvalidId(String),

    /// Failed to run migrations.
    #[error("migration error")]
    Migration(#[from] sqlx::migrate::MigrateError),
}

impl From<StorageError> for ThingRulesError {
    fn from(err: StorageError) -> Self {
        Self::Storage(Box::new(err))
    }
}
