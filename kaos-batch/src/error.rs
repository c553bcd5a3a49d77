//! Error types for kaos-batch.

use std::io;

/// Result type for batch writer operations.
pub type Result<T> = std::result::Result<T, BatchError>;

/// Batch writer errors.
///
/// Misuse of the scratch buffer (double checkout, dropped handle) is not an
/// error value: it panics.
#[derive(Debug, thiserror::Error)]
pub enum BatchError {
    /// Socket error, passed through untouched.
    #[error("io error: {0}")]
    Io(#[from] io::Error),

    /// Bytes written past the last appended packet are larger than any packet could be.
    #[error("scratch residue of {residue} bytes exceeds packet limit {limit}")]
    ResidueOverflow { residue: usize, limit: usize },

    /// Invalid configuration value.
    #[error("invalid config: {0}")]
    InvalidConfig(String),
}

impl BatchError {
    pub fn invalid_config(msg: impl Into<String>) -> Self {
        Self::InvalidConfig(msg.into())
    }

    /// The underlying OS error code, if this came from the socket.
    pub fn raw_os_error(&self) -> Option<i32> {
        match self {
            Self::Io(e) => e.raw_os_error(),
            _ => None,
        }
    }
}
