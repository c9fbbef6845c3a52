//! Error taxonomy for transport operations.
//!
//! Open-time failures ([`OpenError`]) and write-time failures
//! ([`WriteError`]) are returned synchronously to the caller. Run-time
//! failures on an established link never surface here: they travel through
//! the event path carrying a [`LinkFault`].

use thiserror::Error;

/// Errors returned when opening a transport fails.
///
/// Each variant is terminal for that attempt. The connection stays
/// `Disconnected` after any of them.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum OpenError {
    /// No device matches the requested target.
    #[error("device not found: {0}")]
    DeviceNotFound(String),

    /// A device was found but no serial driver claims it.
    #[error("no driver for device: {0}")]
    NoDriver(String),

    /// The operating system refused access to the device.
    #[error("permission denied: {0}")]
    PermissionDenied(String),

    /// A connection is already established.
    #[error("already open: {0}")]
    AlreadyOpen(String),

    /// Another connection attempt is still in flight.
    #[error("connection attempt already in progress")]
    AttemptInProgress,

    /// The attempt was cancelled by a disconnect before it completed.
    #[error("connection attempt cancelled")]
    Cancelled,

    /// Any other I/O failure while opening.
    #[error("open failed: {0}")]
    Io(String),
}

impl OpenError {
    /// Create a device-not-found error.
    pub fn device_not_found(target: impl Into<String>) -> Self {
        Self::DeviceNotFound(target.into())
    }

    /// Create a no-driver error.
    pub fn no_driver(target: impl Into<String>) -> Self {
        Self::NoDriver(target.into())
    }

    /// Create a permission-denied error.
    pub fn permission_denied(target: impl Into<String>) -> Self {
        Self::PermissionDenied(target.into())
    }

    /// Create an already-open error.
    pub fn already_open(target: impl Into<String>) -> Self {
        Self::AlreadyOpen(target.into())
    }

    /// Create a generic I/O open error.
    pub fn io(message: impl Into<String>) -> Self {
        Self::Io(message.into())
    }

    /// Human-readable status line for this failure.
    ///
    /// ```
    /// use serialink_core::OpenError;
    ///
    /// let err = OpenError::device_not_found("/dev/ttyUSB0");
    /// assert_eq!(err.status_line(), "connection failed: device not found: /dev/ttyUSB0");
    /// ```
    pub fn status_line(&self) -> String {
        format!("connection failed: {}", self)
    }
}

/// Non-fatal conditions reported by a successful open.
///
/// A warning never fails the connection. It is published as a status
/// string so the user knows the link may not behave as configured.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum OpenWarning {
    /// The device rejected one or more serial parameters but stays usable.
    #[error("Setting serial parameters failed: {0}")]
    ParameterUnsupported(String),
}

/// Errors returned by a single write call.
///
/// A `Timeout` leaves the connection state untouched because the link may
/// still be alive. Writes are never retried automatically.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum WriteError {
    /// The manager is not in the `Connected` state.
    #[error("not connected")]
    NotConnected,

    /// The write did not complete within its bound.
    #[error("write timeout after {0}ms")]
    Timeout(u64),

    /// The underlying link reported a failure.
    #[error("{0}")]
    Underlying(String),
}

impl WriteError {
    /// Create an underlying write error.
    pub fn underlying(message: impl Into<String>) -> Self {
        Self::Underlying(message.into())
    }

    /// Check if this is a timeout.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout(_))
    }
}

/// Cause attached to asynchronous `ConnectError` and `IoError` events.
///
/// Events are buffered and replayed, so the cause is a cheap clonable
/// snapshot of the original error rather than the error itself.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct LinkFault {
    message: String,
}

impl LinkFault {
    /// Create a fault with the given message.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    /// The fault message.
    pub fn message(&self) -> &str {
        &self.message
    }
}

impl From<std::io::Error> for LinkFault {
    fn from(err: std::io::Error) -> Self {
        Self::new(err.to_string())
    }
}

impl From<OpenError> for LinkFault {
    fn from(err: OpenError) -> Self {
        Self::new(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(OpenError::device_not_found("COM3"), "device not found: COM3")]
    #[case(OpenError::no_driver("10c4:ea60"), "no driver for device: 10c4:ea60")]
    #[case(OpenError::permission_denied("/dev/ttyACM0"), "permission denied: /dev/ttyACM0")]
    #[case(OpenError::AttemptInProgress, "connection attempt already in progress")]
    #[case(OpenError::Cancelled, "connection attempt cancelled")]
    fn test_open_error_display(#[case] error: OpenError, #[case] expected: &str) {
        assert_eq!(error.to_string(), expected);
    }

    #[test]
    fn test_open_warning_display() {
        let warning = OpenWarning::ParameterUnsupported("parity".to_string());
        assert_eq!(warning.to_string(), "Setting serial parameters failed: parity");
    }

    #[test]
    fn test_write_error_timeout() {
        let error = WriteError::Timeout(2000);
        assert!(error.is_timeout());
        assert_eq!(error.to_string(), "write timeout after 2000ms");
        assert!(!WriteError::NotConnected.is_timeout());
    }

    #[test]
    fn test_link_fault_from_io() {
        let io = std::io::Error::new(std::io::ErrorKind::BrokenPipe, "cable pulled");
        let fault = LinkFault::from(io);
        assert_eq!(fault.message(), "cable pulled");
    }
}
