use thiserror::Error;

#[derive(Error, Debug)]
pub enum StreamError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Query is empty")]
    EmptyQuery,

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    #[error("Transport error: {0}")]
    TransportError(String),

    #[error("Upstream error: {0}")]
    UpstreamError(String),

    #[error("Internal error: {0}")]
    InternalError(String),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, StreamError>;
