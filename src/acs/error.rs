//! Error types for ACS operations

use std::fmt;

/// Result type alias for ACS operations
pub type AcsResult<T> = Result<T, AcsError>;

/// Errors that can occur talking to the ACS
#[derive(Debug)]
pub enum AcsError {
    /// Transport-level failure (connect, timeout, TLS)
    Request(String),

    /// The ACS answered with a non-success status
    Status { status: u16, message: String },

    /// The response body could not be decoded
    Decode(String),

    /// The client was constructed from an invalid configuration
    InvalidConfig(String),
}

impl AcsError {
    /// Timeouts, connection failures and server-side errors; expected to
    /// clear on a later tick.
    pub fn is_transient(&self) -> bool {
        match self {
            AcsError::Request(_) => true,
            AcsError::Status { status, .. } => *status >= 500,
            AcsError::Decode(_) | AcsError::InvalidConfig(_) => false,
        }
    }
}

impl fmt::Display for AcsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AcsError::Request(msg) => write!(f, "ACS request failed: {}", msg),
            AcsError::Status { status, message } => {
                write!(f, "ACS returned status {}: {}", status, message)
            }
            AcsError::Decode(msg) => write!(f, "failed to decode ACS response: {}", msg),
            AcsError::InvalidConfig(msg) => write!(f, "invalid ACS configuration: {}", msg),
        }
    }
}

impl std::error::Error for AcsError {}

impl From<reqwest::Error> for AcsError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            AcsError::Decode(err.to_string())
        } else {
            AcsError::Request(err.to_string())
        }
    }
}
