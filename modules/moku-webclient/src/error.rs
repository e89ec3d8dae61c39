use thiserror::Error;

pub type Result<T> = std::result::Result<T, WebClientError>;

#[derive(Debug, Error)]
pub enum WebClientError {
    #[error("validation error: {0}")]
    Validation(String),

    #[error("network error: {0}")]
    Network(String),

    #[error("upstream error (status {status}): {message}")]
    Upstream { status: u16, message: String },

    #[error("request timed out")]
    Timeout,

    #[error("request cancelled")]
    Cancelled,

    #[error("unknown webclient backend: {0}")]
    UnknownBackend(String),

    #[error("method {0} not supported by this backend")]
    UnsupportedMethod(String),
}

impl From<reqwest::Error> for WebClientError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            WebClientError::Timeout
        } else {
            WebClientError::Network(err.to_string())
        }
    }
}
