//! Error types and handling.

use std::time::Duration;

use thiserror::Error;

use crate::proto::DecodeError;

/// Application-wide error type
#[derive(Error, Debug)]
pub enum Error {
    /// TCP connection could not be established or was lost
    #[error("Connect error: {0}")]
    Connect(String),

    /// No reply from the transport worker within the caller's bound
    #[error("Command timed out after {0:?}")]
    CommandTimedOut(Duration),

    /// A received packet failed to decode
    #[error("Packet error: {0}")]
    Packet(#[from] DecodeError),

    /// The peer answered with a response that does not match the command
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Pixel buffer does not fit the printer's canvas
    #[error("Invalid image dimensions: {width}x{height} (canvas is {canvas_width}x{canvas_height})")]
    InvalidImageDimensions {
        width: u32,
        height: u32,
        canvas_width: u32,
        canvas_height: u32,
    },

    /// A print phase returned a hard error
    #[error("Print failed: {0}")]
    PrintFailed(String),

    /// Status polling exhausted its attempts without the printer going idle
    #[error("Print timed out: printer never reported idle after {attempts} status polls")]
    PrintTimedOut { attempts: u32 },

    /// Configuration error
    #[error("Config error: {0}")]
    Config(String),

    /// File I/O error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for Error
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Create a connect error with message
    pub fn connect(msg: impl Into<String>) -> Self {
        Self::Connect(msg.into())
    }

    /// Create a protocol error with message
    pub fn protocol(msg: impl Into<String>) -> Self {
        Self::Protocol(msg.into())
    }

    /// Create a config error with message
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }
}
