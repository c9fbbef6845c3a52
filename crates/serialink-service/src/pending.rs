//! Buffers for events that arrive while no observer is attached.

use crate::queue::{EventQueue, SerialEvent};

/// Which buffer collects events while no observer is attached.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BufferKind {
    /// No observer has attached yet.
    PreAttach,

    /// An observer attached once and has since detached.
    Detached,
}

/// The two pending-event buffers owned by the connection manager.
///
/// Only one buffer grows at a time: the pre-attach buffer until the first
/// attach, the detach buffer afterwards.
#[derive(Debug, Default)]
pub struct PendingEvents {
    pre_attach: EventQueue,
    detached: EventQueue,
    ever_attached: bool,
}

impl PendingEvents {
    /// Create empty buffers.
    pub fn new() -> Self {
        Self::default()
    }

    /// The buffer currently collecting events.
    pub fn active(&self) -> BufferKind {
        if self.ever_attached {
            BufferKind::Detached
        } else {
            BufferKind::PreAttach
        }
    }

    /// Buffer an event in the active buffer.
    pub fn push(&mut self, event: SerialEvent) {
        match self.active() {
            BufferKind::PreAttach => self.pre_attach.push(event),
            BufferKind::Detached => self.detached.push(event),
        }
    }

    /// Put events reclaimed from a detached observer ahead of anything
    /// buffered since.
    pub fn reclaim(&mut self, mut undelivered: EventQueue) {
        if undelivered.is_empty() {
            return;
        }
        let buffer = match self.active() {
            BufferKind::PreAttach => &mut self.pre_attach,
            BufferKind::Detached => &mut self.detached,
        };
        undelivered.append(buffer.take());
        *buffer = undelivered;
    }

    /// Drain both buffers in arrival order for an attaching observer.
    ///
    /// Marks the manager as having had an observer, so later events go to
    /// the detach buffer.
    pub fn drain_for_attach(&mut self) -> EventQueue {
        self.ever_attached = true;
        let mut drained = self.pre_attach.take();
        drained.append(self.detached.take());
        drained
    }

    /// Total number of buffered entries.
    pub fn len(&self) -> usize {
        self.pre_attach.len() + self.detached.len()
    }

    /// Check if both buffers are empty.
    pub fn is_empty(&self) -> bool {
        self.pre_attach.is_empty() && self.detached.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use serialink_core::LinkFault;

    fn data(bytes: &'static [u8]) -> SerialEvent {
        SerialEvent::Data(Bytes::from_static(bytes).into())
    }

    #[test]
    fn test_pre_attach_buffer_until_first_attach() {
        let mut pending = PendingEvents::new();
        assert_eq!(pending.active(), BufferKind::PreAttach);

        pending.push(SerialEvent::ConnectError(LinkFault::new("no device")));
        let drained = pending.drain_for_attach();

        assert_eq!(drained.len(), 1);
        assert_eq!(pending.active(), BufferKind::Detached);
        assert!(pending.is_empty());
    }

    #[test]
    fn test_detach_buffer_coalesces() {
        let mut pending = PendingEvents::new();
        pending.drain_for_attach();

        pending.push(data(b"123"));
        pending.push(data(b"45678"));
        pending.push(data(b"90"));

        assert_eq!(pending.len(), 1);
        let Some(SerialEvent::Data(batch)) = pending.drain_for_attach().pop() else {
            panic!("expected data");
        };
        assert_eq!(batch.len(), 10);
    }

    #[test]
    fn test_reclaimed_events_go_first() {
        let mut pending = PendingEvents::new();
        pending.drain_for_attach();
        pending.push(data(b"late"));

        let mut undelivered = EventQueue::new();
        undelivered.push(SerialEvent::Connected);
        undelivered.push(data(b"early-"));
        pending.reclaim(undelivered);

        let events: Vec<_> = pending.drain_for_attach().into_iter().collect();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0], SerialEvent::Connected);
        let SerialEvent::Data(batch) = &events[1] else {
            panic!("expected data");
        };
        assert_eq!(batch.to_vec(), b"early-late");
    }
}
