//! Transport capability trait and the event path it pushes into.
//!
//! A transport is an open byte-stream link. The connection manager owns it
//! exclusively: it writes through [`Transport::write`], starts the read path
//! with [`Transport::start`] once the connection is accepted, and tears it
//! down with [`Transport::close`].
//!
//! All traits use native `async fn` methods (Rust 1.90 + Edition 2024 RPITIT).

#![allow(async_fn_in_trait)]

use bytes::Bytes;
use serialink_core::{LinkFault, WriteError};
use std::time::Duration;
use tokio::sync::mpsc;

/// Event produced by a transport's read path.
///
/// Events are immutable once constructed. They are consumed by the
/// connection manager, which classifies them and decides whether they are
/// delivered to an observer or buffered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// The link is established.
    Connect,

    /// The link could not be established.
    ConnectError {
        /// Failure cause.
        cause: LinkFault,
    },

    /// Bytes read from the link.
    DataChunk {
        /// Raw bytes, in the order they were read.
        bytes: Bytes,
    },

    /// The established link failed.
    IoError {
        /// Failure cause.
        cause: LinkFault,
    },
}

impl TransportEvent {
    /// Create a data event from a byte slice.
    pub fn data(bytes: impl Into<Bytes>) -> Self {
        Self::DataChunk {
            bytes: bytes.into(),
        }
    }

    /// Create an I/O error event.
    pub fn io_error(cause: impl Into<String>) -> Self {
        Self::IoError {
            cause: LinkFault::new(cause),
        }
    }

    /// Create a connect error event.
    pub fn connect_error(cause: impl Into<String>) -> Self {
        Self::ConnectError {
            cause: LinkFault::new(cause),
        }
    }

    /// Check if this event is an error that ends the connection.
    pub fn is_error(&self) -> bool {
        matches!(self, Self::ConnectError { .. } | Self::IoError { .. })
    }
}

/// Event tagged with the connection generation that produced it.
///
/// The manager bumps the generation on every disconnect, so events pushed by
/// a transport after it was replaced can be recognized and discarded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SinkEvent {
    /// Connection generation of the producing transport.
    pub generation: u64,

    /// The event itself.
    pub event: TransportEvent,
}

/// Push interface handed to a transport when its read path starts.
///
/// Backed by a bounded channel: a full channel blocks the producer, which
/// applies backpressure to the link instead of dropping bytes.
#[derive(Debug, Clone)]
pub struct EventSink {
    generation: u64,
    tx: mpsc::Sender<SinkEvent>,
}

impl EventSink {
    /// Create a sink for the given connection generation.
    pub fn new(generation: u64, tx: mpsc::Sender<SinkEvent>) -> Self {
        Self { generation, tx }
    }

    /// Connection generation this sink tags events with.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Push an event from async code.
    ///
    /// Returns `false` once the receiving side is gone.
    pub async fn push(&self, event: TransportEvent) -> bool {
        self.tx
            .send(SinkEvent {
                generation: self.generation,
                event,
            })
            .await
            .is_ok()
    }

    /// Push an event from a blocking reader thread.
    ///
    /// Must not be called from within an async runtime context.
    pub fn blocking_push(&self, event: TransportEvent) -> bool {
        self.tx
            .blocking_send(SinkEvent {
                generation: self.generation,
                event,
            })
            .is_ok()
    }

    /// Check if the receiving side has gone away.
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// An open byte-stream link.
///
/// # Contract
///
/// - `write` either completes within `timeout` or fails with
///   [`WriteError::Timeout`]; it never blocks indefinitely.
/// - `start` is called at most once, after the manager accepted the link.
///   From then on the read path pushes [`TransportEvent`]s into the sink until
///   the link fails or is closed.
/// - `close` is idempotent. After it returns the read path pushes no further
///   events, and control lines raised at open are lowered again.
pub trait Transport: Send + Sync {
    /// Human-readable name of the link, used in status text.
    fn name(&self) -> &str;

    /// Write all bytes to the link, bounded by `timeout`.
    async fn write(&self, data: &[u8], timeout: Duration) -> Result<(), WriteError>;

    /// Start the read path, pushing events into `sink`.
    fn start(&self, sink: EventSink);

    /// Close the link and stop the read path.
    async fn close(&self);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_is_error() {
        assert!(TransportEvent::io_error("gone").is_error());
        assert!(TransportEvent::connect_error("refused").is_error());
        assert!(!TransportEvent::data(&b"abc"[..]).is_error());
        assert!(!TransportEvent::Connect.is_error());
    }

    #[tokio::test]
    async fn test_sink_tags_generation() {
        let (tx, mut rx) = mpsc::channel(4);
        let sink = EventSink::new(7, tx);

        assert!(sink.push(TransportEvent::Connect).await);

        let received = rx.recv().await.unwrap();
        assert_eq!(received.generation, 7);
        assert_eq!(received.event, TransportEvent::Connect);
    }

    #[tokio::test]
    async fn test_sink_reports_closed_receiver() {
        let (tx, rx) = mpsc::channel(4);
        let sink = EventSink::new(1, tx);
        drop(rx);

        assert!(sink.is_closed());
        assert!(!sink.push(TransportEvent::Connect).await);
    }
}
