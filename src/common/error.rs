//! Error handling for the mosaic compression layer

use thiserror::Error;

/// Main error type for mosaic operations
#[derive(Error, Debug)]
pub enum MosaicError {
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Invalid type: {0}")]
    InvalidType(String),

    /// Building the destination buffer failed; the column keeps its raw form
    #[error("Encode error: {0}")]
    Encode(String),

    /// The block stream does not match its own description
    #[error("Corrupted block stream: {0}")]
    Corrupted(String),

    #[error("Unknown block tag {tag} at offset {offset}")]
    UnknownTag { tag: u8, offset: usize },

    #[error("Persistence error: {0}")]
    Persistence(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl MosaicError {
    /// Whether this error means the stored bytes cannot be trusted
    pub fn is_corruption(&self) -> bool {
        matches!(
            self,
            MosaicError::Corrupted(_) | MosaicError::UnknownTag { .. }
        )
    }
}

impl From<serde_json::Error> for MosaicError {
    fn from(err: serde_json::Error) -> Self {
        MosaicError::Serialization(err.to_string())
    }
}

impl From<std::collections::TryReserveError> for MosaicError {
    fn from(err: std::collections::TryReserveError) -> Self {
        MosaicError::Encode(format!("allocation failed: {}", err))
    }
}

/// Result type alias for mosaic operations
pub type MosaicResult<T> = std::result::Result<T, MosaicError>;

/// Macro for creating internal errors
#[macro_export]
macro_rules! internal_err {
    ($msg:expr) => {
        $crate::common::error::MosaicError::Internal($msg.to_string())
    };
    ($fmt:expr, $($arg:tt)*) => {
        $crate::common::error::MosaicError::Internal(format!($fmt, $($arg)*))
    };
}

/// Macro for creating corruption errors
#[macro_export]
macro_rules! corrupted_err {
    ($msg:expr) => {
        $crate::common::error::MosaicError::Corrupted($msg.to_string())
    };
    ($fmt:expr, $($arg:tt)*) => {
        $crate::common::error::MosaicError::Corrupted(format!($fmt, $($arg)*))
    };
}
