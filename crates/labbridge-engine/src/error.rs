/*!
 * Error types for the labbridge engine crate.
 */
use thiserror::Error;

/// Error type for labbridge engine operations
#[derive(Error, Debug)]
pub enum Error {
    /// Device error
    #[error("Device error: {0}")]
    Device(#[from] labbridge_devices::DeviceError),

    /// Outbound stream error
    #[error("Outlet error: {0}")]
    Outlet(String),

    /// Criteria matched no device, or not the requested number
    #[error("Resolution error: {0}")]
    Resolution(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// A streaming task failed to complete
    #[error("Task error: {0}")]
    Task(String),
}

/// Result type for labbridge engine operations
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Create a new outlet error
    pub fn outlet<S: AsRef<str>>(msg: S) -> Self {
        Error::Outlet(msg.as_ref().to_string())
    }

    /// Create a new resolution error
    pub fn resolution<S: AsRef<str>>(msg: S) -> Self {
        Error::Resolution(msg.as_ref().to_string())
    }

    /// Whether the error means a device is unreachable or gone
    pub fn is_connectivity_fault(&self) -> bool {
        matches!(self, Error::Device(e) if e.is_connectivity_fault())
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Serialization(err.to_string())
    }
}

impl From<quick_xml::Error> for Error {
    fn from(err: quick_xml::Error) -> Self {
        Error::Serialization(err.to_string())
    }
}

impl From<tokio::task::JoinError> for Error {
    fn from(err: tokio::task::JoinError) -> Self {
        Error::Task(err.to_string())
    }
}
