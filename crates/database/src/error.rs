use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Failed to load environment variables for database connection: {0}")]
    ConnectionConfig(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Database migration failed: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("Stored row could not be decoded: {0}")]
    Decode(#[from] core_types::CoreError),

    #[error("The requested record was not found.")]
    NotFound,
}
