use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Database Error: {0}")]
    Database(#[from] duckdb::Error),
    #[error("Serialization Error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("Database lock poisoned")]
    Poisoned,
}
