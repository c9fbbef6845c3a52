//! Mock transport for testing and development.
//!
//! This module provides a simulated link that can be controlled
//! programmatically, so the connection manager can be exercised without
//! physical hardware.

use crate::traits::{EventSink, Transport, TransportEvent};
use bytes::Bytes;
use serialink_core::{OpenError, OpenWarning, WriteError};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tracing::{debug, trace};

#[derive(Debug, Default)]
struct MockState {
    open: bool,
    opens: usize,
    sink: Option<EventSink>,
    fail_next_open: Option<OpenError>,
    open_delay: Option<Duration>,
    open_warnings: Vec<OpenWarning>,
    write_error: Option<WriteError>,
    write_delay: Option<Duration>,
    writes: usize,
    written: Vec<u8>,
    dtr: bool,
    rts: bool,
}

#[derive(Debug)]
struct Shared {
    name: String,
    state: Mutex<MockState>,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Target that opens a [`MockTransport`].
///
/// # Examples
///
/// ```
/// use serialink_transport::mock::MockTarget;
///
/// #[tokio::main]
/// async fn main() {
///     let (target, handle) = MockTarget::new();
///
///     let (transport, warnings) = target.open().await.unwrap();
///     assert!(warnings.is_empty());
///     assert!(handle.is_open());
///     # drop(transport);
/// }
/// ```
#[derive(Debug, Clone)]
pub struct MockTarget {
    shared: Arc<Shared>,
}

impl MockTarget {
    /// Create a new mock target with the default name.
    ///
    /// Returns the target and a handle that simulates the device side.
    pub fn new() -> (Self, MockTransportHandle) {
        Self::with_name("mock")
    }

    /// Create a new mock target with a custom name.
    pub fn with_name(name: impl Into<String>) -> (Self, MockTransportHandle) {
        let shared = Arc::new(Shared {
            name: name.into(),
            state: Mutex::new(MockState::default()),
        });

        (
            Self {
                shared: Arc::clone(&shared),
            },
            MockTransportHandle { shared },
        )
    }

    /// Name of the simulated link.
    pub fn name(&self) -> &str {
        &self.shared.name
    }

    /// Open the simulated link.
    pub async fn open(&self) -> Result<(MockTransport, Vec<OpenWarning>), OpenError> {
        let delay = self.shared.lock().open_delay;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let mut state = self.shared.lock();
        if let Some(err) = state.fail_next_open.take() {
            debug!(link = %self.shared.name, error = %err, "Mock open failing");
            return Err(err);
        }
        if state.open {
            return Err(OpenError::already_open(self.shared.name.clone()));
        }

        state.open = true;
        state.opens += 1;
        state.dtr = true;
        state.rts = true;
        let warnings = state.open_warnings.clone();

        debug!(link = %self.shared.name, "Mock link open");

        Ok((
            MockTransport {
                shared: Arc::clone(&self.shared),
            },
            warnings,
        ))
    }
}

/// An open simulated link.
#[derive(Debug)]
pub struct MockTransport {
    shared: Arc<Shared>,
}

impl Transport for MockTransport {
    fn name(&self) -> &str {
        &self.shared.name
    }

    async fn write(&self, data: &[u8], timeout: Duration) -> Result<(), WriteError> {
        let delay = {
            let state = self.shared.lock();
            if !state.open {
                return Err(WriteError::NotConnected);
            }
            state.write_delay
        };

        if let Some(delay) = delay {
            if delay >= timeout {
                tokio::time::sleep(timeout).await;
                return Err(WriteError::Timeout(timeout.as_millis() as u64));
            }
            tokio::time::sleep(delay).await;
        }

        let mut state = self.shared.lock();
        state.writes += 1;
        if let Some(err) = state.write_error.clone() {
            return Err(err);
        }
        state.written.extend_from_slice(data);
        trace!(link = %self.shared.name, len = data.len(), "Mock write");
        Ok(())
    }

    fn start(&self, sink: EventSink) {
        let mut state = self.shared.lock();
        if state.open {
            state.sink = Some(sink);
        }
    }

    async fn close(&self) {
        let mut state = self.shared.lock();
        if state.open {
            debug!(link = %self.shared.name, "Mock link closed");
        }
        state.open = false;
        state.sink = None;
        state.dtr = false;
        state.rts = false;
    }
}

/// Handle for controlling a mock transport.
///
/// Plays the device side of the link: pushes reads and failures, injects
/// open and write failures, and records what was written. It can be cloned
/// and shared across tasks.
///
/// # Examples
///
/// ```
/// use serialink_transport::mock::MockTarget;
/// use serialink_core::OpenError;
///
/// #[tokio::main]
/// async fn main() {
///     let (target, handle) = MockTarget::new();
///     handle.fail_next_open(OpenError::permission_denied("mock"));
///
///     assert!(target.open().await.is_err());
///     assert!(target.open().await.is_ok());
/// }
/// ```
#[derive(Debug, Clone)]
pub struct MockTransportHandle {
    shared: Arc<Shared>,
}

impl MockTransportHandle {
    /// Simulate bytes arriving on the link.
    ///
    /// Returns `false` if the read path is not running.
    pub async fn push_data(&self, data: impl Into<Bytes>) -> bool {
        self.push(TransportEvent::data(data)).await
    }

    /// Simulate a failure of the established link.
    pub async fn push_io_error(&self, cause: impl Into<String>) -> bool {
        self.push(TransportEvent::io_error(cause)).await
    }

    /// Simulate a late connect failure reported by the link.
    pub async fn push_connect_error(&self, cause: impl Into<String>) -> bool {
        self.push(TransportEvent::connect_error(cause)).await
    }

    /// Push an arbitrary event into the running read path.
    pub async fn push(&self, event: TransportEvent) -> bool {
        let sink = self.shared.lock().sink.clone();
        match sink {
            Some(sink) => sink.push(event).await,
            None => {
                trace!(link = %self.shared.name, "Mock push with no read path");
                false
            }
        }
    }

    /// Make the next `open` fail with `err`.
    pub fn fail_next_open(&self, err: OpenError) {
        self.shared.lock().fail_next_open = Some(err);
    }

    /// Delay every `open` by `delay`.
    pub fn set_open_delay(&self, delay: Option<Duration>) {
        self.shared.lock().open_delay = delay;
    }

    /// Report `warnings` from every successful `open`.
    pub fn set_open_warnings(&self, warnings: Vec<OpenWarning>) {
        self.shared.lock().open_warnings = warnings;
    }

    /// Make every write fail with `err`.
    pub fn set_write_error(&self, err: Option<WriteError>) {
        self.shared.lock().write_error = err;
    }

    /// Delay every write by `delay`. Delays at or past the write bound time out.
    pub fn set_write_delay(&self, delay: Option<Duration>) {
        self.shared.lock().write_delay = delay;
    }

    /// Bytes written so far.
    pub fn written(&self) -> Vec<u8> {
        self.shared.lock().written.clone()
    }

    /// Number of write calls that reached the link.
    pub fn write_count(&self) -> usize {
        self.shared.lock().writes
    }

    /// Number of successful opens.
    pub fn open_count(&self) -> usize {
        self.shared.lock().opens
    }

    /// Check if the link is open.
    pub fn is_open(&self) -> bool {
        self.shared.lock().open
    }

    /// Check if the read path is running.
    pub fn is_started(&self) -> bool {
        self.shared.lock().sink.is_some()
    }

    /// Current DTR and RTS levels.
    pub fn control_lines(&self) -> (bool, bool) {
        let state = self.shared.lock();
        (state.dtr, state.rts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::traits::SinkEvent;
    use tokio::sync::mpsc;

    #[tokio::test]
    async fn test_open_raises_control_lines() {
        let (target, handle) = MockTarget::new();
        let (transport, _) = target.open().await.unwrap();
        assert_eq!(handle.control_lines(), (true, true));

        transport.close().await;
        assert_eq!(handle.control_lines(), (false, false));
        assert!(!handle.is_open());
    }

    #[tokio::test]
    async fn test_second_open_is_rejected() {
        let (target, _handle) = MockTarget::new();
        let _first = target.open().await.unwrap();

        let err = target.open().await.unwrap_err();
        assert!(matches!(err, OpenError::AlreadyOpen(_)));
    }

    #[tokio::test]
    async fn test_push_requires_started_read_path() {
        let (target, handle) = MockTarget::new();
        let (transport, _) = target.open().await.unwrap();
        assert!(!handle.push_data(&b"early"[..]).await);

        let (tx, mut rx) = mpsc::channel::<SinkEvent>(8);
        transport.start(EventSink::new(3, tx));
        assert!(handle.push_data(&b"late"[..]).await);

        let received = rx.recv().await.unwrap();
        assert_eq!(received.generation, 3);
        assert_eq!(received.event, TransportEvent::data(&b"late"[..]));
    }

    #[tokio::test]
    async fn test_write_records_bytes() {
        let (target, handle) = MockTarget::new();
        let (transport, _) = target.open().await.unwrap();

        transport.write(b"AT\r\n", Duration::from_secs(2)).await.unwrap();
        transport.write(b"ATI\r\n", Duration::from_secs(2)).await.unwrap();

        assert_eq!(handle.written(), b"AT\r\nATI\r\n");
        assert_eq!(handle.write_count(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_write_times_out() {
        let (target, handle) = MockTarget::new();
        let (transport, _) = target.open().await.unwrap();
        handle.set_write_delay(Some(Duration::from_secs(5)));

        let err = transport
            .write(b"x", Duration::from_millis(2000))
            .await
            .unwrap_err();
        assert_eq!(err, WriteError::Timeout(2000));
        assert!(handle.written().is_empty());
    }

    #[tokio::test]
    async fn test_write_after_close_fails() {
        let (target, _handle) = MockTarget::new();
        let (transport, _) = target.open().await.unwrap();
        transport.close().await;

        let err = transport.write(b"x", Duration::from_secs(2)).await.unwrap_err();
        assert_eq!(err, WriteError::NotConnected);
    }
}
