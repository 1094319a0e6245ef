//! Error types for the thermolink hardware library.

use thiserror::Error;

/// Result type alias using our Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur when talking to the display device.
#[derive(Error, Debug)]
pub enum Error {
    /// Serial device path does not exist.
    #[error("Display device not found at {0}")]
    LinkNotFound(String),

    /// Serial port could not be opened or configured.
    #[error("Serial port error: {0}")]
    Serial(#[from] tokio_serial::Error),

    /// Serial I/O error.
    #[error("Serial I/O error: {0}")]
    SerialIo(#[from] std::io::Error),

    /// The greeting could not be written after opening the port.
    #[error("Handshake failed: {0}")]
    Handshake(std::io::Error),

    /// A write did not complete within the configured timeout.
    #[error("Write timed out")]
    WriteTimeout,

    /// The link has not been opened, or has already been closed.
    #[error("Link is not connected")]
    NotConnected,
}

impl Error {
    /// Returns true for failures raised while establishing the link.
    pub fn is_connect_error(&self) -> bool {
        matches!(
            self,
            Error::LinkNotFound(_) | Error::Serial(_) | Error::Handshake(_)
        )
    }
}
