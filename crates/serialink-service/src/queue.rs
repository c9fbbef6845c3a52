//! Ordered event buffer with data coalescing.
//!
//! [`EventQueue`] is the one buffer type used everywhere events wait: the
//! pre-attach and detach buffers of the manager, and an observer's inbox.
//! Consecutive data events are merged into the trailing entry so a burst of
//! reads is presented as one batch.

use bytes::Bytes;
use serialink_core::LinkFault;
use std::collections::VecDeque;
use std::fmt;

/// Bytes collected from one or more consecutive reads.
///
/// Chunks keep the granularity they were read with. Message framing is the
/// caller's concern.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DataBatch {
    chunks: VecDeque<Bytes>,
    len: usize,
}

impl DataBatch {
    /// Create a batch holding a single chunk.
    pub fn new(chunk: Bytes) -> Self {
        let mut batch = Self::default();
        batch.push(chunk);
        batch
    }

    /// Append a chunk. Empty chunks are ignored.
    pub fn push(&mut self, chunk: Bytes) {
        if chunk.is_empty() {
            return;
        }
        self.len += chunk.len();
        self.chunks.push_back(chunk);
    }

    /// Move all chunks of `other` behind this batch.
    pub fn append(&mut self, other: DataBatch) {
        self.len += other.len;
        self.chunks.extend(other.chunks);
    }

    /// Total number of bytes.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Check if the batch holds no bytes.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Number of chunks.
    pub fn chunk_count(&self) -> usize {
        self.chunks.len()
    }

    /// Iterate over the chunks in read order.
    pub fn chunks(&self) -> impl Iterator<Item = &Bytes> {
        self.chunks.iter()
    }

    /// Consume the batch, returning its chunks in read order.
    pub fn into_chunks(self) -> Vec<Bytes> {
        self.chunks.into()
    }

    /// Concatenate every chunk into one buffer.
    pub fn to_vec(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.len);
        for chunk in &self.chunks {
            out.extend_from_slice(chunk);
        }
        out
    }
}

impl From<Bytes> for DataBatch {
    fn from(chunk: Bytes) -> Self {
        Self::new(chunk)
    }
}

/// Event delivered to an observer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SerialEvent {
    /// The connection is established.
    Connected,

    /// The connection attempt failed.
    ConnectError(LinkFault),

    /// Bytes received.
    Data(DataBatch),

    /// The established connection failed.
    IoError(LinkFault),
}

impl SerialEvent {
    /// Short name of the event kind, for logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Connected => "connected",
            Self::ConnectError(_) => "connect_error",
            Self::Data(_) => "data",
            Self::IoError(_) => "io_error",
        }
    }
}

impl fmt::Display for SerialEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Connected => write!(f, "connected"),
            Self::ConnectError(cause) => write!(f, "connection failed: {}", cause),
            Self::Data(batch) => write!(f, "{} bytes", batch.len()),
            Self::IoError(cause) => write!(f, "connection lost: {}", cause),
        }
    }
}

/// FIFO of pending events that coalesces adjacent data.
///
/// # Examples
///
/// ```
/// use bytes::Bytes;
/// use serialink_service::{EventQueue, SerialEvent};
///
/// let mut queue = EventQueue::new();
/// queue.push(SerialEvent::Data(Bytes::from_static(b"abc").into()));
/// queue.push(SerialEvent::Data(Bytes::from_static(b"de").into()));
///
/// assert_eq!(queue.len(), 1);
/// match queue.pop() {
///     Some(SerialEvent::Data(batch)) => assert_eq!(batch.to_vec(), b"abcde"),
///     other => panic!("unexpected {:?}", other),
/// }
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EventQueue {
    events: VecDeque<SerialEvent>,
}

impl EventQueue {
    /// Create an empty queue.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an event.
    ///
    /// A data event directly behind another data event is merged into it.
    /// Empty data is dropped.
    pub fn push(&mut self, event: SerialEvent) {
        match event {
            SerialEvent::Data(batch) if batch.is_empty() => {}
            SerialEvent::Data(batch) => match self.events.back_mut() {
                Some(SerialEvent::Data(last)) => last.append(batch),
                _ => self.events.push_back(SerialEvent::Data(batch)),
            },
            other => self.events.push_back(other),
        }
    }

    /// Move every event of `other` behind the events of this queue.
    pub fn append(&mut self, other: EventQueue) {
        for event in other.events {
            self.push(event);
        }
    }

    /// Remove the oldest event.
    pub fn pop(&mut self) -> Option<SerialEvent> {
        self.events.pop_front()
    }

    /// Take every event, leaving the queue empty.
    pub fn take(&mut self) -> EventQueue {
        std::mem::take(self)
    }

    /// Number of entries, after coalescing.
    pub fn len(&self) -> usize {
        self.events.len()
    }

    /// Check if the queue is empty.
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Iterate over the entries, oldest first.
    pub fn iter(&self) -> impl Iterator<Item = &SerialEvent> {
        self.events.iter()
    }
}

impl IntoIterator for EventQueue {
    type Item = SerialEvent;
    type IntoIter = std::collections::vec_deque::IntoIter<SerialEvent>;

    fn into_iter(self) -> Self::IntoIter {
        self.events.into_iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn data(bytes: &'static [u8]) -> SerialEvent {
        SerialEvent::Data(Bytes::from_static(bytes).into())
    }

    #[test]
    fn test_consecutive_data_coalesces() {
        let mut queue = EventQueue::new();
        queue.push(data(b"abc"));
        queue.push(data(b"defgh"));
        queue.push(data(b"ij"));

        assert_eq!(queue.len(), 1);
        let Some(SerialEvent::Data(batch)) = queue.pop() else {
            panic!("expected data");
        };
        assert_eq!(batch.len(), 10);
        assert_eq!(batch.chunk_count(), 3);
        assert_eq!(batch.to_vec(), b"abcdefghij");
    }

    #[test]
    fn test_other_events_break_coalescing() {
        let mut queue = EventQueue::new();
        queue.push(SerialEvent::Connected);
        queue.push(data(b"a"));
        queue.push(SerialEvent::IoError(LinkFault::new("gone")));
        queue.push(data(b"b"));

        let kinds: Vec<_> = queue.iter().map(SerialEvent::kind).collect();
        assert_eq!(kinds, ["connected", "data", "io_error", "data"]);
    }

    #[test]
    fn test_errors_are_never_merged() {
        let mut queue = EventQueue::new();
        queue.push(SerialEvent::IoError(LinkFault::new("one")));
        queue.push(SerialEvent::IoError(LinkFault::new("two")));
        assert_eq!(queue.len(), 2);
    }

    #[test]
    fn test_empty_data_is_dropped() {
        let mut queue = EventQueue::new();
        queue.push(data(b""));
        assert!(queue.is_empty());
    }

    #[test]
    fn test_append_coalesces_at_boundary() {
        let mut front = EventQueue::new();
        front.push(SerialEvent::Connected);
        front.push(data(b"12"));

        let mut back = EventQueue::new();
        back.push(data(b"34"));
        back.push(SerialEvent::IoError(LinkFault::new("eof")));

        front.append(back);
        assert_eq!(front.len(), 3);

        let events: Vec<_> = front.into_iter().collect();
        assert_eq!(events[1], SerialEvent::Data(DataBatch {
            chunks: VecDeque::from([Bytes::from_static(b"12"), Bytes::from_static(b"34")]),
            len: 4,
        }));
    }

    #[test]
    fn test_take_leaves_queue_empty() {
        let mut queue = EventQueue::new();
        queue.push(SerialEvent::Connected);

        let taken = queue.take();
        assert!(queue.is_empty());
        assert_eq!(taken.len(), 1);
    }
}
