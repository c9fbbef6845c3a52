use thiserror::Error;

/// Errors raised by the settings store.
#[derive(Debug, Error)]
pub enum StorageError {
    /// Query or connection failure reported by SQLite.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// The embedded schema could not be applied.
    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// A settings record was rejected before it reached the database.
    #[error("Invalid network settings: {field} = '{value}'")]
    InvalidSettings { field: &'static str, value: String },

    /// The database location cannot be used.
    #[error("Configuration error: {0}")]
    Configuration(String),
}

impl StorageError {
    /// Create an invalid-settings error for `field`.
    pub fn invalid_settings(field: &'static str, value: impl Into<String>) -> Self {
        Self::InvalidSettings {
            field,
            value: value.into(),
        }
    }
}

pub type StorageResult<T> = Result<T, StorageError>;
