//! Mock transport implementation for testing and development.
//!
//! The mock plays both sides of a link: the [`MockTarget`] opens a
//! [`MockTransport`] owned by the connection manager, while the
//! [`MockTransportHandle`] acts as the device, pushing reads and failures.

mod transport;

pub use transport::{MockTarget, MockTransport, MockTransportHandle};
