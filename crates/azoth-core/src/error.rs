use thiserror::Error;

#[derive(Error, Debug)]
pub enum AzothError {
    #[error("Store error: {0}")]
    Store(String),

    #[error("Bus error: {0}")]
    Bus(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Other error: {0}")]
    Other(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, AzothError>;

// Custom error types:
//
// Anything implementing `std::error::Error + Send + Sync + 'static` converts
// into `AzothError::Other` through anyhow. Store and bus backends that want
// their failures matched on should map them to `Store` / `Bus` instead.
