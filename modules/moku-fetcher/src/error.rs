use thiserror::Error;

pub type Result<T> = std::result::Result<T, FetcherError>;

#[derive(Debug, Error)]
pub enum FetcherError {
    #[error("webclient error: {0}")]
    WebClient(#[from] moku_webclient::WebClientError),

    #[error("index error: {0}")]
    Index(#[from] moku_index::IndexError),

    #[error("tracker error: {0}")]
    Tracker(#[from] moku_tracker::TrackerError),

    #[error("batch commit failed: {0}")]
    Commit(String),
}
