//! Errors raised while building measure sources and catalogs.

use thiserror::Error;

use crate::cache::CacheError;
use crate::remote::RemoteClientError;

/// Result type for measure operations.
pub type MeasureResult<T> = Result<T, MeasureError>;

#[derive(Error, Debug)]
pub enum MeasureError {
    /// An offline source tried to reach the delivery network.
    #[error("source {source_id} is offline and may not use the delivery network")]
    Capability { source_id: String },

    /// The underlying fetch of a source failed. The previous snapshot is kept.
    #[error("fetch failed for source {source_id}: {message}")]
    Fetch { source_id: String, message: String },

    /// Sources or their context are misconfigured.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// A local id does not fit in a source's id range.
    #[error("local id {local_id} is outside the allocatable range")]
    IdOutOfRange { local_id: i64 },

    #[error("cache error: {0}")]
    Cache(#[from] CacheError),

    #[error("remote error: {0}")]
    Remote(#[from] RemoteClientError),
}

impl MeasureError {
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration(message.into())
    }

    pub fn fetch(source_id: impl Into<String>, message: impl ToString) -> Self {
        Self::Fetch {
            source_id: source_id.into(),
            message: message.to_string(),
        }
    }

    /// Programming/configuration errors that retrying will not fix.
    pub fn is_permanent(&self) -> bool {
        matches!(
            self,
            Self::Capability { .. } | Self::Configuration(_) | Self::IdOutOfRange { .. }
        )
    }
}
