use thiserror::Error;

pub type Result<T> = std::result::Result<T, OrchestratorError>;

#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error("validation error: {0}")]
    Validation(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("orchestrator is closed")]
    Closed,

    #[error("registry error: {0}")]
    Registry(#[from] moku_registry::RegistryError),

    #[error("webclient error: {0}")]
    WebClient(#[from] moku_webclient::WebClientError),

    #[error("index error: {0}")]
    Index(#[from] moku_index::IndexError),

    #[error("tracker error: {0}")]
    Tracker(#[from] moku_tracker::TrackerError),

    #[error("fetcher error: {0}")]
    Fetcher(#[from] moku_fetcher::FetcherError),

    #[error("enumerate failed: {0}")]
    Enumerate(String),
}
