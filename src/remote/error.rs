//! Errors raised by delivery network calls.

use thiserror::Error;

/// Result type for remote network operations.
pub type RemoteResult<T> = Result<T, RemoteClientError>;

/// The delivery network rejected or failed a call.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RemoteClientError {
    /// The network answered with an error.
    #[error("network rejected request: {message} (code: {code})")]
    Rejected {
        /// Error code reported by the network.
        code: String,
        /// Error message reported by the network.
        message: String,
    },

    /// No answer within the client's deadline.
    #[error("request timed out after {0} seconds")]
    Timeout(u64),

    /// Connection or protocol failure below the API layer.
    #[error("transport failure: {0}")]
    Transport(String),

    /// The request was malformed according to the network.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// Credentials were refused.
    #[error("not authorized: {0}")]
    Unauthorized(String),

    /// The network is throttling or down for maintenance.
    #[error("network unavailable: {0}")]
    Unavailable(String),
}

impl RemoteClientError {
    /// Create a rejection from an error code and message.
    pub fn rejected(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Rejected {
            code: code.into(),
            message: message.into(),
        }
    }

    /// Map a network error code onto the most specific variant.
    pub fn classify(code: &str, message: &str) -> Self {
        match code {
            "INVALID_REQUEST" | "VALIDATION" | "BAD_REQUEST" => {
                Self::InvalidRequest(message.to_string())
            }
            "UNAUTH" | "UNAUTHORIZED" | "NOAUTH" => Self::Unauthorized(message.to_string()),
            "RATE_EXCEEDED" | "SYSTEM_ERROR" | "SERVICE_UNAVAILABLE" => {
                Self::Unavailable(message.to_string())
            }
            _ => Self::rejected(code, message),
        }
    }

    /// Check if retrying the same call later could succeed.
    pub fn is_retriable(&self) -> bool {
        matches!(
            self,
            Self::Timeout(_) | Self::Transport(_) | Self::Unavailable(_)
        )
    }
}

impl From<std::io::Error> for RemoteClientError {
    fn from(err: std::io::Error) -> Self {
        Self::Transport(err.to_string())
    }
}
