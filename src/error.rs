// Error types
// Every failure the pipeline can surface to its caller lives here

use crate::export::Format;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    /// The query name is not in the catalog
    #[error("unknown query '{name}'")]
    InvalidQuery { name: String },

    /// A parameter is missing, unexpected, mistyped or out of range
    #[error("invalid parameter '{parameter}' for query '{query}': {reason}")]
    InvalidParameter {
        query: &'static str,
        parameter: String,
        reason: String,
    },

    /// The parent entity a query hangs off does not exist
    #[error("{entity} {id} not found (query '{query}')")]
    NotFound {
        query: &'static str,
        entity: &'static str,
        id: i64,
    },

    #[error("unsupported format '{format}' (expected json or xml)")]
    UnsupportedFormat { format: String },

    /// The store could not be opened, or holds data that breaks its invariants
    #[error("storage unavailable: {reason}")]
    StorageUnavailable { reason: String },

    /// A previously exported document could not be read back
    #[error("cannot decode {format} document: {reason}")]
    Decode { format: Format, reason: String },

    #[error("cannot export {format} document: {reason}")]
    Export { format: Format, reason: String },
}

impl Error {
    pub(crate) fn storage(reason: impl Into<String>) -> Self {
        Error::StorageUnavailable {
            reason: reason.into(),
        }
    }

    pub(crate) fn parameter(
        query: &'static str,
        parameter: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Error::InvalidParameter {
            query,
            parameter: parameter.into(),
            reason: reason.into(),
        }
    }

    pub(crate) fn decode(format: Format, reason: impl Into<String>) -> Self {
        Error::Decode {
            format,
            reason: reason.into(),
        }
    }
}
