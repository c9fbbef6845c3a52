//! Terminal observer: turns serial events into printable lines.
//!
//! Serial reads arrive in arbitrary fragments, so incoming text is buffered
//! until a line terminator is seen. In hex mode every batch is printed as it
//! arrives instead.

use clap::ValueEnum;
use serialink_core::{LinkFault, WriteError};
use serialink_service::{DataBatch, SerialListener};
use std::fmt;
use std::io::Write;
use tracing::warn;

/// Line terminator used for outgoing lines and for splitting incoming text.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum NewlineMode {
    /// Carriage return (`\r`).
    #[default]
    Cr,

    /// Line feed (`\n`).
    Lf,

    /// Carriage return followed by line feed.
    CrLf,
}

impl NewlineMode {
    /// Terminator bytes.
    pub fn as_bytes(&self) -> &'static [u8] {
        match self {
            Self::Cr => b"\r",
            Self::Lf => b"\n",
            Self::CrLf => b"\r\n",
        }
    }

    /// Byte that ends an incoming line.
    fn end_byte(&self) -> u8 {
        match self {
            Self::Cr => b'\r',
            Self::Lf | Self::CrLf => b'\n',
        }
    }
}

impl fmt::Display for NewlineMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Cr => write!(f, "CR"),
            Self::Lf => write!(f, "LF"),
            Self::CrLf => write!(f, "CR+LF"),
        }
    }
}

/// Build the bytes sent for one line typed by the user.
pub fn outgoing_line(text: &str, mode: NewlineMode) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(text.len() + 2);
    bytes.extend_from_slice(text.as_bytes());
    bytes.extend_from_slice(mode.as_bytes());
    bytes
}

/// Render bytes as space-separated upper-case hex pairs.
pub fn hex_line(bytes: &[u8]) -> String {
    bytes
        .iter()
        .map(|b| format!("{:02X}", b))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Reassembles complete lines from fragmented reads.
///
/// A stray `\r` or `\n` left over from a device that ends lines differently
/// than configured is stripped from the line edges.
#[derive(Debug, Default)]
pub struct LineAssembler {
    mode: NewlineMode,
    buffer: Vec<u8>,
}

impl LineAssembler {
    /// Create an assembler for `mode`.
    pub fn new(mode: NewlineMode) -> Self {
        Self {
            mode,
            buffer: Vec::new(),
        }
    }

    /// Feed bytes and return every line they complete.
    pub fn push(&mut self, bytes: &[u8]) -> Vec<String> {
        let end = self.mode.end_byte();
        let mut lines = Vec::new();

        for &byte in bytes {
            if byte == end {
                let raw = std::mem::take(&mut self.buffer);
                lines.push(Self::clean(&raw));
            } else {
                self.buffer.push(byte);
            }
        }

        lines
    }

    /// Bytes waiting for a terminator.
    pub fn partial(&self) -> &[u8] {
        &self.buffer
    }

    /// Return whatever is buffered as a final line, if anything.
    pub fn flush(&mut self) -> Option<String> {
        let raw = std::mem::take(&mut self.buffer);
        let line = Self::clean(&raw);
        (!line.is_empty()).then_some(line)
    }

    fn clean(raw: &[u8]) -> String {
        let start = raw.iter().position(|&b| b != b'\n').unwrap_or(raw.len());
        let end = raw
            .iter()
            .rposition(|&b| b != b'\r')
            .map_or(start, |i| i + 1)
            .max(start);
        String::from_utf8_lossy(&raw[start..end]).into_owned()
    }
}

/// What to print for a failed write, and whether the link must be dropped.
///
/// A timeout leaves the connection as it is; anything else means the link
/// is gone.
pub fn write_failure(err: &WriteError) -> (String, bool) {
    if err.is_timeout() {
        (format!("write timeout: {}", err), false)
    } else {
        (format!("connection lost: {}", err), true)
    }
}

/// [`SerialListener`] that prints to a writer.
///
/// Status lines are prefixed with `-- ` to tell them apart from device text.
pub struct TerminalListener<W> {
    out: W,
    hex: bool,
    lines: LineAssembler,
}

impl<W: Write> TerminalListener<W> {
    /// Create a listener writing to `out`.
    pub fn new(out: W, mode: NewlineMode, hex: bool) -> Self {
        Self {
            out,
            hex,
            lines: LineAssembler::new(mode),
        }
    }

    /// The underlying writer.
    pub fn get_ref(&self) -> &W {
        &self.out
    }

    /// Print a status line.
    pub fn status(&mut self, text: &str) {
        self.emit(&format!("-- {}", text));
    }

    fn emit(&mut self, line: &str) {
        if let Err(e) = writeln!(self.out, "{}", line).and_then(|_| self.out.flush()) {
            warn!(error = %e, "Terminal output failed");
        }
    }

    fn flush_partial(&mut self) {
        if let Some(line) = self.lines.flush() {
            self.emit(&line);
        }
    }
}

impl<W: Write> SerialListener for TerminalListener<W> {
    fn on_connect(&mut self) {
        self.status("connected");
    }

    fn on_connect_error(&mut self, cause: &LinkFault) {
        self.status(&format!("connection failed: {}", cause));
    }

    fn on_data_received(&mut self, data: &DataBatch) {
        if self.hex {
            let bytes = data.to_vec();
            self.emit(&hex_line(&bytes));
            return;
        }

        for chunk in data.chunks() {
            for line in self.lines.push(chunk) {
                self.emit(&line);
            }
        }
    }

    fn on_io_error(&mut self, cause: &LinkFault) {
        self.flush_partial();
        self.status(&format!("connection lost: {}", cause));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use rstest::rstest;

    fn output(listener: &TerminalListener<Vec<u8>>) -> String {
        String::from_utf8_lossy(listener.get_ref()).into_owned()
    }

    #[rstest]
    #[case(NewlineMode::Cr, b"ping\r".as_slice())]
    #[case(NewlineMode::Lf, b"ping\n".as_slice())]
    #[case(NewlineMode::CrLf, b"ping\r\n".as_slice())]
    fn test_outgoing_line(#[case] mode: NewlineMode, #[case] expected: &[u8]) {
        assert_eq!(outgoing_line("ping", mode), expected);
    }

    #[test]
    fn test_hex_line() {
        assert_eq!(hex_line(b"AB\r\n"), "41 42 0D 0A");
        assert_eq!(hex_line(&[]), "");
    }

    #[test]
    fn test_assembler_joins_fragments() {
        let mut lines = LineAssembler::new(NewlineMode::Cr);

        assert!(lines.push(b"hel").is_empty());
        assert!(lines.push(b"lo wo").is_empty());
        assert_eq!(lines.push(b"rld\rnext"), vec!["hello world"]);
        assert_eq!(lines.partial(), b"next");
    }

    #[test]
    fn test_assembler_splits_several_lines_in_one_read() {
        let mut lines = LineAssembler::new(NewlineMode::Lf);
        assert_eq!(lines.push(b"a\nb\n\nc"), vec!["a", "b", ""]);
        assert_eq!(lines.flush().as_deref(), Some("c"));
        assert_eq!(lines.flush(), None);
    }

    #[rstest]
    #[case(NewlineMode::Cr)]
    #[case(NewlineMode::Lf)]
    #[case(NewlineMode::CrLf)]
    fn test_assembler_tolerates_crlf_device(#[case] mode: NewlineMode) {
        let mut lines = LineAssembler::new(mode);
        let mut all = lines.push(b"OK\r\nREADY\r\n");
        all.extend(lines.flush());
        assert_eq!(all, vec!["OK", "READY"]);
    }

    #[test]
    fn test_write_failure_classification() {
        let (line, drop_link) = write_failure(&WriteError::Timeout(2000));
        assert_eq!(line, "write timeout: write timeout after 2000ms");
        assert!(!drop_link);

        let (line, drop_link) = write_failure(&WriteError::underlying("broken pipe"));
        assert_eq!(line, "connection lost: broken pipe");
        assert!(drop_link);
    }

    #[test]
    fn test_listener_prints_lines_and_status() {
        let mut listener = TerminalListener::new(Vec::new(), NewlineMode::Cr, false);

        listener.on_connect();
        listener.on_data_received(&DataBatch::new(Bytes::from_static(b"temp=2")));
        let mut batch = DataBatch::new(Bytes::from_static(b"1\rhum"));
        batch.push(Bytes::from_static(b"=40\r"));
        listener.on_data_received(&batch);

        assert_eq!(output(&listener), "-- connected\ntemp=21\nhum=40\n");
    }

    #[test]
    fn test_listener_flushes_partial_line_on_io_error() {
        let mut listener = TerminalListener::new(Vec::new(), NewlineMode::Lf, false);

        listener.on_data_received(&DataBatch::new(Bytes::from_static(b"half")));
        listener.on_io_error(&LinkFault::new("device unplugged"));

        assert_eq!(output(&listener), "half\n-- connection lost: device unplugged\n");
    }

    #[test]
    fn test_listener_hex_mode() {
        let mut listener = TerminalListener::new(Vec::new(), NewlineMode::Cr, true);

        listener.on_data_received(&DataBatch::new(Bytes::from_static(b"\x01\xff")));
        listener.on_connect_error(&LinkFault::new("device not found: /dev/ttyUSB9"));

        assert_eq!(
            output(&listener),
            "01 FF\n-- connection failed: device not found: /dev/ttyUSB9\n"
        );
    }
}
