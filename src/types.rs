use thiserror::Error;

/// Errors produced while talking to the centralino backend.
#[derive(Debug, Error)]
pub enum UpdateError {
    #[error("http request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("websocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("invalid json payload: {0}")]
    Json(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0} timed out")]
    Timeout(&'static str),

    #[error("backend error: {0}")]
    Backend(String),

    #[error("configuration error: {0}")]
    Config(String),
}

impl UpdateError {
    /// Whether the failure means the backend is unreachable rather than
    /// answering with something we did not expect.
    pub fn is_transport(&self) -> bool {
        match self {
            UpdateError::Http(err) => err.is_connect() || err.is_timeout() || err.is_request(),
            UpdateError::WebSocket(_) | UpdateError::Io(_) | UpdateError::Timeout(_) => true,
            UpdateError::Json(_) | UpdateError::Backend(_) | UpdateError::Config(_) => false,
        }
    }
}
