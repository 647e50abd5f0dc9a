use thiserror::Error;

/// Errors raised while opening or talking to the fernline store.
///
/// Everything here is a run-level failure. Per-table migration failures
/// are carried inside `migrate::MigrationStatus::Failed` instead, so one
/// broken table never aborts the rest of the run.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] duckdb::Error),

    #[error("Password required: set the {0} environment variable")]
    PasswordMissing(&'static str),

    #[error("Encryption metadata error: {0}")]
    Metadata(String),

    #[error("Key derivation error: {0}")]
    KeyDerivation(String),

    #[error("Cannot determine home directory")]
    HomeDirUnavailable,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialisation error: {0}")]
    Serialisation(#[from] serde_json::Error),
}
