use bridge_traits::error::BridgeError;
use thiserror::Error;

/// Errors surfaced by the catalog.
///
/// Row-level problems never appear here: malformed rows are filtered out by
/// the normalizer. Every variant is `Clone` so one failed request can be
/// reported to every caller waiting on it.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CatalogError {
    #[error("Bridge error: {0}")]
    Bridge(#[from] BridgeError),

    #[error("Invalid input: {field} - {message}")]
    InvalidInput { field: String, message: String },

    #[error("Fetch task failed: {0}")]
    TaskFailed(String),
}

impl From<core_runtime::Error> for CatalogError {
    fn from(err: core_runtime::Error) -> Self {
        CatalogError::InvalidInput {
            field: "config".to_string(),
            message: err.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, CatalogError>;
