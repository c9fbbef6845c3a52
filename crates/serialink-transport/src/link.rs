//! Blocking serial link shared by the USB and Bluetooth transports.
//!
//! The port is opened once and split in two handles: a reader moved into a
//! dedicated thread, and a writer kept behind a mutex. The reader polls with a
//! short timeout so that `close` can stop it promptly.
//!
//! ```text
//!   open ──► apply parameters ──► raise DTR/RTS
//!                                        │
//!            ┌───────────────────────────┴─────────┐
//!            ▼                                     ▼
//!   reader thread (try_clone)             writer (Mutex<Option<..>>)
//!     read ─► EventSink::blocking_push      spawn_blocking + timeout
//! ```

use crate::traits::{EventSink, TransportEvent};
use bytes::Bytes;
use serialink_core::constants::{CLOSE_TIMEOUT_MS, READ_POLL_INTERVAL_MS};
use serialink_core::{
    DataBits, FlowControl, LinkFault, OpenError, OpenWarning, Parity, SerialParameters, StopBits,
    WriteError,
};
use serialport::SerialPort;
use std::io::{ErrorKind, Read, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::JoinHandle;
use std::time::Duration;
use tracing::{debug, error, info, trace, warn};

type Port = Box<dyn SerialPort>;

/// Options that differ between link kinds.
#[derive(Debug, Clone)]
pub(crate) struct LinkOptions {
    /// Line parameters to apply after open. `None` leaves the port as opened.
    pub parameters: Option<SerialParameters>,

    /// Raise DTR/RTS on open and lower them on close.
    pub control_lines: bool,

    /// Size of the read buffer.
    pub buffer_size: usize,
}

/// An open serial port with a background read thread.
pub(crate) struct SerialLink {
    name: String,
    writer: Arc<Mutex<Option<Port>>>,
    reader: Mutex<Option<Port>>,
    thread: Arc<Mutex<Option<JoinHandle<()>>>>,
    stop: Arc<AtomicBool>,
    options: LinkOptions,
}

impl std::fmt::Debug for SerialLink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SerialLink")
            .field("name", &self.name)
            .field("closed", &self.stop.load(Ordering::Acquire))
            .finish()
    }
}

impl SerialLink {
    /// Open `path` and prepare it for use.
    ///
    /// Blocking; call from `spawn_blocking`. Parameter failures come back as
    /// warnings, failures toggling control lines are only logged.
    pub(crate) fn open(
        name: String,
        path: &str,
        options: LinkOptions,
    ) -> Result<(Self, Vec<OpenWarning>), OpenError> {
        let baud = options
            .parameters
            .map(|p| p.baud_rate)
            .unwrap_or(serialink_core::constants::DEFAULT_BAUD_RATE);

        debug!(port = %path, baud, "Opening serial port");

        let mut port = serialport::new(path, baud)
            .timeout(Duration::from_millis(READ_POLL_INTERVAL_MS))
            .open()
            .map_err(|e| map_open_error(path, e))?;

        let mut warnings = Vec::new();
        if let Some(parameters) = options.parameters
            && let Err(e) = apply_parameters(port.as_mut(), &parameters)
        {
            warn!(port = %path, error = %e, "Serial parameters rejected");
            warnings.push(OpenWarning::ParameterUnsupported(e.to_string()));
        }

        if options.control_lines {
            set_control_lines(port.as_mut(), true);
        }

        let reader = port.try_clone().map_err(|e| map_open_error(path, e))?;

        info!(port = %path, "Serial port open");

        Ok((
            Self {
                name,
                writer: Arc::new(Mutex::new(Some(port))),
                reader: Mutex::new(Some(reader)),
                thread: Arc::new(Mutex::new(None)),
                stop: Arc::new(AtomicBool::new(false)),
                options,
            },
            warnings,
        ))
    }

    pub(crate) fn name(&self) -> &str {
        &self.name
    }

    /// Spawn the read thread. Later calls are ignored.
    pub(crate) fn start(&self, sink: EventSink) {
        let Some(reader) = self
            .reader
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        else {
            warn!(link = %self.name, "Read path already started");
            return;
        };

        let stop = Arc::clone(&self.stop);
        let name = self.name.clone();
        let buffer_size = self.options.buffer_size;

        let spawned = std::thread::Builder::new()
            .name(format!("serialink-read-{}", self.name))
            .spawn(move || read_loop(name, reader, stop, sink, buffer_size));

        match spawned {
            Ok(handle) => {
                *self.thread.lock().unwrap_or_else(PoisonError::into_inner) = Some(handle);
            }
            Err(e) => error!(link = %self.name, error = %e, "Failed to spawn read thread"),
        }
    }

    /// Write all bytes, bounded by `timeout`.
    pub(crate) async fn write(&self, data: &[u8], timeout: Duration) -> Result<(), WriteError> {
        let timeout_ms = timeout.as_millis() as u64;
        let writer = Arc::clone(&self.writer);
        let data = data.to_vec();

        trace!(link = %self.name, len = data.len(), "Writing to serial port");

        let task = tokio::task::spawn_blocking(move || {
            let mut guard = writer.lock().unwrap_or_else(PoisonError::into_inner);
            let port = guard.as_mut().ok_or(WriteError::NotConnected)?;

            port.set_timeout(timeout)
                .map_err(|e| WriteError::underlying(e.to_string()))?;

            port.write_all(&data)
                .and_then(|()| port.flush())
                .map_err(|e| match e.kind() {
                    ErrorKind::TimedOut => WriteError::Timeout(timeout_ms),
                    _ => WriteError::underlying(e.to_string()),
                })
        });

        match tokio::time::timeout(timeout, task).await {
            Ok(Ok(result)) => result,
            Ok(Err(e)) => {
                error!(link = %self.name, error = %e, "Write task failed");
                Err(WriteError::underlying(e.to_string()))
            }
            Err(_) => {
                warn!(link = %self.name, "Write timeout after {}ms", timeout_ms);
                Err(WriteError::Timeout(timeout_ms))
            }
        }
    }

    /// Stop the read thread, lower control lines and release the port.
    pub(crate) async fn close(&self) {
        if self.stop.swap(true, Ordering::AcqRel) {
            trace!(link = %self.name, "Link already closed");
            return;
        }

        debug!(link = %self.name, "Closing serial link");

        // Dropping an unstarted reader releases its handle.
        drop(
            self.reader
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .take(),
        );

        let writer = Arc::clone(&self.writer);
        let thread = Arc::clone(&self.thread);
        let control_lines = self.options.control_lines;

        let teardown = tokio::task::spawn_blocking(move || {
            let port = writer.lock().unwrap_or_else(PoisonError::into_inner).take();
            if let Some(mut port) = port
                && control_lines
            {
                set_control_lines(port.as_mut(), false);
            }

            let handle = thread.lock().unwrap_or_else(PoisonError::into_inner).take();
            if let Some(handle) = handle
                && handle.join().is_err()
            {
                error!("Serial read thread panicked");
            }
        });

        match tokio::time::timeout(Duration::from_millis(CLOSE_TIMEOUT_MS), teardown).await {
            Ok(Ok(())) => info!(link = %self.name, "Serial link closed"),
            Ok(Err(e)) => error!(link = %self.name, error = %e, "Close task failed"),
            Err(_) => warn!(
                link = %self.name,
                "Close did not finish within {}ms, releasing in background", CLOSE_TIMEOUT_MS
            ),
        }
    }
}

fn read_loop(name: String, mut port: Port, stop: Arc<AtomicBool>, sink: EventSink, size: usize) {
    let mut buffer = vec![0u8; size];

    debug!(link = %name, generation = sink.generation(), "Read loop started");

    while !stop.load(Ordering::Acquire) {
        match port.read(&mut buffer) {
            Ok(0) => continue,
            Ok(n) => {
                trace!(link = %name, len = n, "Read chunk");
                let event = TransportEvent::DataChunk {
                    bytes: Bytes::copy_from_slice(&buffer[..n]),
                };
                if !sink.blocking_push(event) {
                    debug!(link = %name, "Event sink closed, stopping read loop");
                    break;
                }
            }
            Err(e) if matches!(e.kind(), ErrorKind::TimedOut | ErrorKind::Interrupted) => continue,
            Err(e) => {
                if !stop.load(Ordering::Acquire) {
                    warn!(link = %name, error = %e, "Read failed");
                    sink.blocking_push(TransportEvent::IoError {
                        cause: LinkFault::from(e),
                    });
                }
                break;
            }
        }
    }

    debug!(link = %name, "Read loop stopped");
}

fn apply_parameters(port: &mut dyn SerialPort, parameters: &SerialParameters) -> serialport::Result<()> {
    port.set_baud_rate(parameters.baud_rate)?;
    port.set_data_bits(match parameters.data_bits {
        DataBits::Five => serialport::DataBits::Five,
        DataBits::Six => serialport::DataBits::Six,
        DataBits::Seven => serialport::DataBits::Seven,
        DataBits::Eight => serialport::DataBits::Eight,
    })?;
    port.set_stop_bits(match parameters.stop_bits {
        StopBits::One => serialport::StopBits::One,
        StopBits::Two => serialport::StopBits::Two,
    })?;
    port.set_parity(match parameters.parity {
        Parity::None => serialport::Parity::None,
        Parity::Odd => serialport::Parity::Odd,
        Parity::Even => serialport::Parity::Even,
    })?;
    port.set_flow_control(match parameters.flow_control {
        FlowControl::None => serialport::FlowControl::None,
        FlowControl::Software => serialport::FlowControl::Software,
        FlowControl::Hardware => serialport::FlowControl::Hardware,
    })?;
    Ok(())
}

fn set_control_lines(port: &mut dyn SerialPort, level: bool) {
    if let Err(e) = port.write_data_terminal_ready(level) {
        debug!(level, error = %e, "Failed to set DTR");
    }
    if let Err(e) = port.write_request_to_send(level) {
        debug!(level, error = %e, "Failed to set RTS");
    }
}

/// Map a `serialport` open failure onto the open error taxonomy.
pub(crate) fn map_open_error(target: &str, err: serialport::Error) -> OpenError {
    match err.kind() {
        serialport::ErrorKind::NoDevice => OpenError::device_not_found(target),
        serialport::ErrorKind::Io(ErrorKind::NotFound) => OpenError::device_not_found(target),
        serialport::ErrorKind::Io(ErrorKind::PermissionDenied) => {
            OpenError::permission_denied(target)
        }
        serialport::ErrorKind::Io(ErrorKind::ResourceBusy) => OpenError::already_open(target),
        serialport::ErrorKind::Unknown => OpenError::no_driver(target),
        _ => OpenError::io(format!("{}: {}", target, err)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(serialport::ErrorKind::NoDevice, OpenError::device_not_found("/dev/ttyUSB9"))]
    #[case(
        serialport::ErrorKind::Io(ErrorKind::NotFound),
        OpenError::device_not_found("/dev/ttyUSB9")
    )]
    #[case(
        serialport::ErrorKind::Io(ErrorKind::PermissionDenied),
        OpenError::permission_denied("/dev/ttyUSB9")
    )]
    #[case(
        serialport::ErrorKind::Io(ErrorKind::ResourceBusy),
        OpenError::already_open("/dev/ttyUSB9")
    )]
    #[case(serialport::ErrorKind::Unknown, OpenError::no_driver("/dev/ttyUSB9"))]
    fn test_map_open_error(#[case] kind: serialport::ErrorKind, #[case] expected: OpenError) {
        let err = serialport::Error::new(kind, "failed");
        assert_eq!(map_open_error("/dev/ttyUSB9", err), expected);
    }

    #[test]
    fn test_map_open_error_falls_back_to_io() {
        let err = serialport::Error::new(serialport::ErrorKind::InvalidInput, "bad baud");
        let mapped = map_open_error("COM4", err);
        assert_eq!(mapped, OpenError::io("COM4: bad baud"));
    }
}
