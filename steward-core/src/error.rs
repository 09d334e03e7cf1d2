use thiserror::Error;

pub type Result<T> = std::result::Result<T, StewardError>;

#[derive(Error, Debug)]
pub enum StewardError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
