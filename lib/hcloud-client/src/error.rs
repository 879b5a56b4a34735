use thiserror::Error;

pub type Result<T> = std::result::Result<T, ClientError>;

/// Errors raised while setting up or driving the adapters
#[derive(Error, Debug)]
pub enum ClientError {
    #[error("Kubernetes API error: {0}")]
    Kube(#[from] kube::Error),

    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid endpoint: {0}")]
    InvalidEndpoint(String),
}
