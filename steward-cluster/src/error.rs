use thiserror::Error;

pub type Result<T> = std::result::Result<T, ClusterError>;

#[derive(Error, Debug)]
pub enum ClusterError {
    #[error("Cluster configuration error: {0}")]
    Config(String),

    #[error("Cluster request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Cluster agent returned {status}: {message}")]
    Api { status: u16, message: String },

    #[error("Instance not found: {0}")]
    NotFound(String),
}
