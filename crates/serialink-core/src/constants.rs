//! Default values for the connection engine.
//!
//! Every blocking operation in serialink has an explicit bound. The bounds
//! and limits used when a caller does not override them are collected here
//! so the transport, the connection manager and the reconnect coordinator
//! agree on them.
//!
//! # Usage
//!
//! ```
//! use serialink_core::constants::*;
//! use std::time::Duration;
//!
//! let write_timeout = Duration::from_millis(WRITE_TIMEOUT_MS);
//! assert_eq!(write_timeout.as_secs(), 2);
//! assert_eq!(MAX_PRIMARY_ATTEMPTS, 5);
//! ```

// ============================================================================
// Transport
// ============================================================================

/// Upper bound for a single write call, in milliseconds.
///
/// A zero timeout blocks forever on an unprogrammed microcontroller, so the
/// bound is always finite.
pub const WRITE_TIMEOUT_MS: u64 = 2000;

/// Poll interval of the blocking serial read loop, in milliseconds.
///
/// The read loop checks its stop flag at this rate, so closing a transport
/// takes at most this long to release the port.
pub const READ_POLL_INTERVAL_MS: u64 = 100;

/// Read buffer size for USB serial ports.
pub const USB_READ_BUFFER_SIZE: usize = 4096;

/// Read buffer size for Bluetooth RFCOMM links.
pub const BLUETOOTH_READ_BUFFER_SIZE: usize = 1024;

/// Default baud rate for serial links.
pub const DEFAULT_BAUD_RATE: u32 = 115_200;

/// Bound for joining the read loop when a transport is closed, in milliseconds.
pub const CLOSE_TIMEOUT_MS: u64 = 500;

// ============================================================================
// Connection manager
// ============================================================================

/// Capacity of the connection manager command channel.
///
/// Transport read loops block on a full channel, which applies backpressure
/// to the device instead of dropping data.
pub const COMMAND_CHANNEL_CAPACITY: usize = 256;

/// Status line published after a successful open.
pub const STATUS_CONNECTED: &str = "Successfully connected";

/// Cause reported when the persistent indicator requests a disconnect.
pub const BACKGROUND_DISCONNECT: &str = "background disconnect";

// ============================================================================
// Reconnection
// ============================================================================

/// Number of sequential attempts made against the primary network.
pub const MAX_PRIMARY_ATTEMPTS: u32 = 5;

/// Per-attempt timeout for the primary network, in milliseconds.
pub const PRIMARY_ATTEMPT_TIMEOUT_MS: u64 = 10_000;

/// Timeout of the single fallback attempt, in milliseconds.
pub const FALLBACK_ATTEMPT_TIMEOUT_MS: u64 = 30_000;

/// Interval between connectivity checks inside one attempt, in milliseconds.
pub const CONNECTIVITY_POLL_INTERVAL_MS: u64 = 1000;

/// Bound on a single wired/cellular link check, in milliseconds.
///
/// The check runs inside the attempt it precedes, so it never extends the
/// primary or fallback bounds.
pub const PRIORITY_CHECK_TIMEOUT_MS: u64 = 2000;

/// Bound on a network scan or link-details query, in milliseconds.
pub const SCAN_TIMEOUT_MS: u64 = 5000;

/// Name used when neither the persisted record nor a scan names a network.
pub const UNKNOWN_SSID: &str = "Unknown";

/// Maximum number of reconnect state transitions kept in history.
pub const MAX_RECONNECT_HISTORY: usize = 100;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fallback_outlasts_primary_attempt() {
        assert!(FALLBACK_ATTEMPT_TIMEOUT_MS > PRIMARY_ATTEMPT_TIMEOUT_MS);
    }

    #[test]
    fn test_poll_interval_fits_attempt() {
        assert!(CONNECTIVITY_POLL_INTERVAL_MS < PRIMARY_ATTEMPT_TIMEOUT_MS);
        assert!(READ_POLL_INTERVAL_MS < WRITE_TIMEOUT_MS);
    }

    #[test]
    fn test_priority_check_fits_attempt() {
        assert!(PRIORITY_CHECK_TIMEOUT_MS < PRIMARY_ATTEMPT_TIMEOUT_MS);
    }
}
