//! Shared primitives used across Tally crates.

/// Result alias used across the workspace.
pub type TallyResult<T> = Result<T, TallyError>;

/// Error carrying a stable dotted code (`net.http.status_invalid`) and a
/// human-readable message.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{code}: {message}")]
pub struct TallyError {
    pub code: &'static str,
    pub message: String,
}

impl TallyError {
    pub fn new(code: &'static str, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}
