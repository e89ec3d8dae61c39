use thiserror::Error;

/// Error kinds shared across every Moku component.
///
/// Component crates wrap this in their own error enum via `#[from]` rather
/// than returning it directly, so callers still match on a component-specific
/// type; `CoreError` only exists so the kind taxonomy is defined once.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("validation error: {0}")]
    Validation(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("transient i/o error: {0}")]
    Transient(String),

    #[error("cancelled")]
    Cancelled,

    #[error("fatal error: {0}")]
    Fatal(String),
}
