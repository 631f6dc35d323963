use crate::types::ConnectionState;
use thiserror::Error;

/// Result type for RIO operations
pub type Result<T> = std::result::Result<T, RioError>;

/// Errors that can occur when talking to a Russound controller
#[derive(Error, Debug)]
pub enum RioError {
    /// The device answered the command with an `E` line
    #[error("Command error: {0}")]
    Command(String),

    /// No terminating response arrived for the active command
    #[error("Protocol desync: {0}")]
    ProtocolDesync(String),

    /// Connection was closed, either by the device or by `close()`
    #[error("Connection closed")]
    ConnectionClosed,

    /// TCP connect did not complete in time
    #[error("Connect timeout")]
    ConnectTimeout,

    /// A command was issued while the client is not running
    #[error("Not connected")]
    NotConnected,

    /// `connect()` was called from a state that does not allow it
    #[error("Invalid connection state: {0:?}")]
    InvalidState(ConnectionState),

    /// A name or value cannot be encoded on the wire
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Invalid client configuration
    #[error("Configuration error: {0}")]
    Config(String),

    /// A state receiver fell behind and missed updates
    #[error("State receiver lagged by {0} updates")]
    Lagged(u64),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl RioError {
    /// Whether this error came from the device rejecting a single command,
    /// as opposed to a failure of the connection itself.
    pub fn is_command_error(&self) -> bool {
        matches!(self, RioError::Command(_))
    }
}
