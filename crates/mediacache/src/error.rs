use reqwest::StatusCode;

// Custom error type for cache operations
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Server returned status code {0}")]
    Status(StatusCode),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Index serialization error: {0}")]
    Index(#[from] serde_json::Error),

    #[error("Invalid configuration: {0}")]
    Config(String),
}
