use crate::state::ReconnectState;
use thiserror::Error;

/// Errors raised by network controllers and the reconnect state machine.
///
/// Running out of attempts is not an error: it is reported as
/// [`ReconnectOutcome::Exhausted`](crate::ReconnectOutcome::Exhausted).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NetworkError {
    /// The state graph forbids this move.
    #[error("invalid reconnect transition: {from} -> {to}")]
    InvalidTransition {
        from: ReconnectState,
        to: ReconnectState,
    },

    /// The platform refused to join a network.
    #[error("network request for {ssid} failed: {reason}")]
    Request { ssid: String, reason: String },

    /// A helper command could not be run or exited with an error.
    #[error("`{command}` failed: {reason}")]
    Command { command: String, reason: String },

    /// A helper command did not finish in time.
    #[error("`{command}` timed out after {timeout_ms}ms")]
    CommandTimeout { command: String, timeout_ms: u64 },
}

impl NetworkError {
    /// Create a request error.
    pub fn request(ssid: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Request {
            ssid: ssid.into(),
            reason: reason.into(),
        }
    }

    /// Create a command error.
    pub fn command(command: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Command {
            command: command.into(),
            reason: reason.into(),
        }
    }
}
