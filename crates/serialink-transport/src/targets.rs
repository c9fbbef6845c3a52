//! Enum wrappers for transport dispatch.
//!
//! Native `async fn` in traits is not object-safe, so the connection manager
//! cannot hold a `Box<dyn Transport>`. [`AnyTransport`] provides concrete
//! type dispatch instead, and [`TransportTarget`] is the single place where
//! the kinds of link are told apart.
//!
//! # Examples
//!
//! ```
//! use serialink_transport::{TransportTarget, Transport};
//! use serialink_transport::mock::MockTarget;
//!
//! #[tokio::main]
//! async fn main() {
//!     let (mock, _handle) = MockTarget::with_name("bench");
//!     let target = TransportTarget::Mock(mock);
//!
//!     let opened = target.open().await.unwrap();
//!     assert_eq!(opened.transport.name(), "bench");
//! }
//! ```

use crate::bluetooth::{BluetoothTarget, BluetoothTransport};
use crate::mock::{MockTarget, MockTransport};
use crate::traits::{EventSink, Transport};
use crate::usb::{UsbTarget, UsbTransport};
use serialink_core::{OpenError, OpenWarning, WriteError};
use std::fmt;
use std::time::Duration;
use tracing::debug;

/// Where to connect.
#[derive(Debug, Clone)]
#[non_exhaustive]
pub enum TransportTarget {
    /// USB serial port.
    Usb(UsbTarget),

    /// Bluetooth serial-port-profile link.
    Bluetooth(BluetoothTarget),

    /// Simulated link for development and testing.
    Mock(MockTarget),
}

/// Result of a successful open.
#[derive(Debug)]
pub struct Opened {
    /// The open link.
    pub transport: AnyTransport,

    /// Non-fatal conditions raised while opening.
    pub warnings: Vec<OpenWarning>,
}

impl TransportTarget {
    /// Open the link.
    ///
    /// Blocking opens run on the blocking thread pool so the caller's
    /// executor is never stalled.
    pub async fn open(&self) -> Result<Opened, OpenError> {
        debug!(link = %self, "Opening transport");

        let (transport, warnings) = match self {
            Self::Usb(target) => {
                let target = target.clone();
                let (transport, warnings) = spawn_open(move || target.open_blocking()).await?;
                (AnyTransport::Usb(transport), warnings)
            }
            Self::Bluetooth(target) => {
                let target = target.clone();
                let (transport, warnings) = spawn_open(move || target.open_blocking()).await?;
                (AnyTransport::Bluetooth(transport), warnings)
            }
            Self::Mock(target) => {
                let (transport, warnings) = target.open().await?;
                (AnyTransport::Mock(transport), warnings)
            }
        };

        Ok(Opened {
            transport,
            warnings,
        })
    }
}

impl fmt::Display for TransportTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Usb(target) => write!(f, "usb {}", target.selector),
            Self::Bluetooth(target) => {
                write!(f, "bluetooth {} ch{}", target.address, target.channel)
            }
            Self::Mock(target) => write!(f, "mock {}", target.name()),
        }
    }
}

async fn spawn_open<T, F>(open: F) -> Result<T, OpenError>
where
    F: FnOnce() -> Result<T, OpenError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(open)
        .await
        .map_err(|e| OpenError::io(format!("open task failed: {}", e)))?
}

/// Enum wrapper for transport dispatch.
#[derive(Debug)]
#[non_exhaustive]
pub enum AnyTransport {
    /// USB serial port.
    Usb(UsbTransport),

    /// Bluetooth serial link.
    Bluetooth(BluetoothTransport),

    /// Simulated link.
    Mock(MockTransport),
}

impl Transport for AnyTransport {
    fn name(&self) -> &str {
        match self {
            Self::Usb(transport) => transport.name(),
            Self::Bluetooth(transport) => transport.name(),
            Self::Mock(transport) => transport.name(),
        }
    }

    async fn write(&self, data: &[u8], timeout: Duration) -> Result<(), WriteError> {
        match self {
            Self::Usb(transport) => transport.write(data, timeout).await,
            Self::Bluetooth(transport) => transport.write(data, timeout).await,
            Self::Mock(transport) => transport.write(data, timeout).await,
        }
    }

    fn start(&self, sink: EventSink) {
        match self {
            Self::Usb(transport) => transport.start(sink),
            Self::Bluetooth(transport) => transport.start(sink),
            Self::Mock(transport) => transport.start(sink),
        }
    }

    async fn close(&self) {
        match self {
            Self::Usb(transport) => transport.close().await,
            Self::Bluetooth(transport) => transport.close().await,
            Self::Mock(transport) => transport.close().await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_open_mock_reports_warnings() {
        let (mock, handle) = MockTarget::new();
        handle.set_open_warnings(vec![OpenWarning::ParameterUnsupported(
            "baud 250000".to_string(),
        )]);

        let opened = TransportTarget::Mock(mock).open().await.unwrap();
        assert_eq!(opened.warnings.len(), 1);
        assert!(matches!(opened.transport, AnyTransport::Mock(_)));
    }

    #[tokio::test]
    async fn test_open_missing_usb_port() {
        let target = TransportTarget::Usb(UsbTarget::path("/dev/serialink-missing"));
        let err = target.open().await.unwrap_err();
        assert!(matches!(err, OpenError::DeviceNotFound(_)));
    }

    #[test]
    fn test_target_display() {
        let target = TransportTarget::Usb(UsbTarget::usb_id(0x0403, 0x6001, 0));
        assert_eq!(target.to_string(), "usb 0403:6001#0");
    }
}
