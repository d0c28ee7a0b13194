//! Export errors.
//!
//! [`ExportError`] aborts a whole run and is reserved for configuration and
//! capability problems. [`NodeFailure`] belongs to a single allocation node
//! and ends up in the report instead.

use thiserror::Error;

use crate::measure::{MeasureError, MeasureId};
use crate::remote::RemoteClientError;

/// Result type for export operations.
pub type ExportResult<T> = Result<T, ExportError>;

#[derive(Error, Debug)]
pub enum ExportError {
    #[error("export configuration error: {0}")]
    Configuration(String),

    #[error(transparent)]
    Measure(#[from] MeasureError),

    /// Only raised by line-item export, which has no per-node isolation.
    #[error("remote error: {0}")]
    Remote(#[from] RemoteClientError),
}

impl ExportError {
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration(message.into())
    }
}

/// Why one allocation node could not be exported.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum NodeFailure {
    #[error(transparent)]
    Remote(#[from] RemoteClientError),

    #[error("measure {0} is not in the catalog")]
    UnknownMeasure(MeasureId),

    #[error("targeting error: {0}")]
    Targeting(String),
}

pub type NodeResult<T> = Result<T, NodeFailure>;
