//! Byte-stream transports for serialink.
//!
//! This crate provides the [`Transport`] capability and its implementations:
//! USB serial ports, Bluetooth serial-port-profile links over RFCOMM, and a
//! mock link for development and testing. The connection manager only ever
//! sees [`AnyTransport`]; link kinds are told apart once, when a
//! [`TransportTarget`] is opened.
//!
//! # Read path
//!
//! Reads run on a dedicated background thread per link and are pushed into
//! an [`EventSink`] as [`TransportEvent`]s. The sink is bounded, so a slow
//! consumer slows the reader down rather than losing bytes.
//!
//! ```no_run
//! use serialink_transport::{EventSink, Transport, TransportTarget};
//! use serialink_transport::usb::UsbTarget;
//! use std::time::Duration;
//! use tokio::sync::mpsc;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let target = TransportTarget::Usb(UsbTarget::path("/dev/ttyUSB0"));
//! let opened = target.open().await?;
//!
//! let (tx, mut rx) = mpsc::channel(256);
//! opened.transport.start(EventSink::new(1, tx));
//! opened.transport.write(b"AT\r\n", Duration::from_secs(2)).await?;
//!
//! if let Some(event) = rx.recv().await {
//!     println!("{:?}", event.event);
//! }
//!
//! opened.transport.close().await;
//! # Ok(())
//! # }
//! ```

pub mod bluetooth;
mod link;
pub mod mock;
pub mod ports;
pub mod targets;
pub mod traits;
pub mod usb;

pub use ports::{PortInfo, PortKind, available_ports};
pub use targets::{AnyTransport, Opened, TransportTarget};
pub use traits::{EventSink, SinkEvent, Transport, TransportEvent};
