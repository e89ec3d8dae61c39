use thiserror::Error;

pub type Result<T> = std::result::Result<T, AssessorError>;

#[derive(Debug, Error)]
pub enum AssessorError {
    #[error("scoring timed out after {0}s")]
    Timeout(u64),

    #[error("invalid rule: {0}")]
    InvalidRule(String),
}
