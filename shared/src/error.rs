/*!
Common error types for the DDC264 acquisition and reconstruction components.
*/

use thiserror::Error;

/// Common result type used throughout the shared library
pub type Result<T> = std::result::Result<T, SharedError>;

/// Error type for all shared operations
#[derive(Error, Debug)]
pub enum SharedError {
    /// Out-of-range or non-numeric instrument parameter
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// The hardware rejected a register map
    #[error("Register write failed with status {code}")]
    RegisterWriteFailure { code: i32 },

    /// The hardware capture call failed
    #[error("Data capture failed with status {code}")]
    DataCaptureFailure { code: i32 },

    /// Edge bounds violate 0 <= left < right <= max
    #[error("Invalid edge window: left {left}, right {right}")]
    InvalidEdgeWindow { left: usize, right: usize },

    /// Decoder matrix references a channel the trace does not contain
    #[error("Channel {0} missing from trace")]
    MissingChannel(String),

    /// Malformed trace or decoder matrix file
    #[error("Invalid file format: {0}")]
    FileFormat(String),

    /// I/O errors (file operations, etc.)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl SharedError {
    /// Create a new configuration error
    pub fn invalid_config(msg: impl Into<String>) -> Self {
        Self::InvalidConfig(msg.into())
    }

    /// Create a new file format error
    pub fn file_format(msg: impl Into<String>) -> Self {
        Self::FileFormat(msg.into())
    }

    /// True for the errors raised by the hardware collaborator
    pub fn is_hardware(&self) -> bool {
        matches!(
            self,
            Self::RegisterWriteFailure { .. } | Self::DataCaptureFailure { .. }
        )
    }
}
