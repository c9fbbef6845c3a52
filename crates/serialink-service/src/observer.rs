//! Observer binding and the inbox it delivers into.
//!
//! The manager never calls into the observer. It pushes events into a shared
//! inbox, and the observer drains that inbox on its own task, so a slow
//! observer never blocks the transport's read path.
//!
//! ```text
//!   ConnectionManager ──deliver──► [ inbox: EventQueue ] ──recv──► UI task
//!          ▲                                                    │
//!          └────────────── detach: reclaim unconsumed ◄──────────┘
//! ```

use crate::queue::{DataBatch, EventQueue, SerialEvent};
use serialink_core::LinkFault;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::Notify;

#[derive(Debug, Default)]
struct InboxState {
    events: EventQueue,
    closed: bool,
    receiver_dropped: bool,
}

#[derive(Debug, Default)]
struct Inbox {
    state: Mutex<InboxState>,
    notify: Notify,
}

impl Inbox {
    fn lock(&self) -> MutexGuard<'_, InboxState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Callbacks of an observer.
///
/// Drive one with [`ObserverInbox::dispatch`] or [`ObserverInbox::run`].
pub trait SerialListener {
    /// The connection is established.
    fn on_connect(&mut self);

    /// The connection attempt failed.
    fn on_connect_error(&mut self, cause: &LinkFault);

    /// Bytes received, as one or more chunks in read order.
    fn on_data_received(&mut self, data: &DataBatch);

    /// The established connection failed.
    fn on_io_error(&mut self, cause: &LinkFault);
}

impl SerialEvent {
    /// Invoke the matching callback of `listener`.
    pub fn dispatch_to<L: SerialListener + ?Sized>(&self, listener: &mut L) {
        match self {
            Self::Connected => listener.on_connect(),
            Self::ConnectError(cause) => listener.on_connect_error(cause),
            Self::Data(batch) => listener.on_data_received(batch),
            Self::IoError(cause) => listener.on_io_error(cause),
        }
    }
}

/// Binding handed to [`ConnectionHandle::attach`](crate::ConnectionHandle::attach).
#[derive(Debug)]
pub struct Observer {
    inbox: Arc<Inbox>,
}

impl Observer {
    /// Create a binding and the inbox it delivers into.
    ///
    /// # Examples
    ///
    /// ```
    /// use serialink_service::Observer;
    ///
    /// let (observer, inbox) = Observer::channel();
    /// assert!(!inbox.is_closed());
    /// # drop(observer);
    /// ```
    pub fn channel() -> (Observer, ObserverInbox) {
        let inbox = Arc::new(Inbox::default());
        (
            Observer {
                inbox: Arc::clone(&inbox),
            },
            ObserverInbox { inbox },
        )
    }

    /// Deliver an event into the inbox.
    ///
    /// Gives the event back if the inbox is gone, so the caller can buffer it.
    pub(crate) fn deliver(&self, event: SerialEvent) -> Result<(), SerialEvent> {
        {
            let mut state = self.inbox.lock();
            if state.receiver_dropped || state.closed {
                return Err(event);
            }
            state.events.push(event);
        }
        self.inbox.notify.notify_one();
        Ok(())
    }

    /// Close the inbox and take back everything the observer has not consumed.
    pub(crate) fn close(self) -> EventQueue {
        let undelivered = {
            let mut state = self.inbox.lock();
            state.closed = true;
            state.events.take()
        };
        self.inbox.notify.notify_one();
        undelivered
    }

    /// Close the inbox but leave undelivered events readable.
    pub(crate) fn finish(self) {
        self.inbox.lock().closed = true;
        self.inbox.notify.notify_one();
    }

    /// Check if the receiving side is gone.
    pub(crate) fn is_dropped(&self) -> bool {
        self.inbox.lock().receiver_dropped
    }
}

/// Receiving side of an [`Observer`], drained on the observer's own task.
#[derive(Debug)]
pub struct ObserverInbox {
    inbox: Arc<Inbox>,
}

impl ObserverInbox {
    /// Wait for the next event.
    ///
    /// Returns `None` once the observer is detached and nothing is left.
    pub async fn recv(&self) -> Option<SerialEvent> {
        loop {
            {
                let mut state = self.inbox.lock();
                if let Some(event) = state.events.pop() {
                    return Some(event);
                }
                if state.closed {
                    return None;
                }
            }
            self.inbox.notify.notified().await;
        }
    }

    /// Take the next event without waiting.
    pub fn try_recv(&self) -> Option<SerialEvent> {
        self.inbox.lock().events.pop()
    }

    /// Wait for the next event and pass it to `listener`.
    ///
    /// Returns `false` once the observer is detached and nothing is left.
    pub async fn dispatch<L: SerialListener + ?Sized>(&self, listener: &mut L) -> bool {
        match self.recv().await {
            Some(event) => {
                event.dispatch_to(listener);
                true
            }
            None => false,
        }
    }

    /// Dispatch events to `listener` until the observer is detached.
    pub async fn run<L: SerialListener + ?Sized>(&self, listener: &mut L) {
        while self.dispatch(listener).await {}
    }

    /// Number of events waiting, after coalescing.
    pub fn pending(&self) -> usize {
        self.inbox.lock().events.len()
    }

    /// Check if the observer has been detached.
    pub fn is_closed(&self) -> bool {
        self.inbox.lock().closed
    }
}

impl Drop for ObserverInbox {
    fn drop(&mut self) {
        self.inbox.lock().receiver_dropped = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;

    #[derive(Default)]
    struct Recorder {
        calls: Vec<String>,
    }

    impl SerialListener for Recorder {
        fn on_connect(&mut self) {
            self.calls.push("connect".to_string());
        }

        fn on_connect_error(&mut self, cause: &LinkFault) {
            self.calls.push(format!("connect_error {}", cause));
        }

        fn on_data_received(&mut self, data: &DataBatch) {
            self.calls.push(format!("data {}", data.len()));
        }

        fn on_io_error(&mut self, cause: &LinkFault) {
            self.calls.push(format!("io_error {}", cause));
        }
    }

    fn data(bytes: &'static [u8]) -> SerialEvent {
        SerialEvent::Data(Bytes::from_static(bytes).into())
    }

    #[tokio::test]
    async fn test_delivery_coalesces_unconsumed_data() {
        let (observer, inbox) = Observer::channel();
        observer.deliver(data(b"ab")).unwrap();
        observer.deliver(data(b"cde")).unwrap();

        assert_eq!(inbox.pending(), 1);
        let Some(SerialEvent::Data(batch)) = inbox.recv().await else {
            panic!("expected data");
        };
        assert_eq!(batch.to_vec(), b"abcde");
    }

    #[tokio::test]
    async fn test_close_reclaims_and_ends_stream() {
        let (observer, inbox) = Observer::channel();
        observer.deliver(SerialEvent::Connected).unwrap();

        let undelivered = observer.close();
        assert_eq!(undelivered.len(), 1);
        assert!(inbox.is_closed());
        assert_eq!(inbox.recv().await, None);
    }

    #[tokio::test]
    async fn test_recv_wakes_on_delivery() {
        let (observer, inbox) = Observer::channel();

        let waiter = tokio::spawn(async move { inbox.recv().await });
        tokio::task::yield_now().await;
        observer.deliver(SerialEvent::Connected).unwrap();

        assert_eq!(waiter.await.unwrap(), Some(SerialEvent::Connected));
    }

    #[tokio::test]
    async fn test_dispatch_invokes_callbacks_in_order() {
        let (observer, inbox) = Observer::channel();
        observer.deliver(SerialEvent::Connected).unwrap();
        observer.deliver(data(b"xyz")).unwrap();
        observer
            .deliver(SerialEvent::IoError(LinkFault::new("eof")))
            .unwrap();

        let mut recorder = Recorder::default();
        for _ in 0..3 {
            assert!(inbox.dispatch(&mut recorder).await);
        }
        assert_eq!(recorder.calls, ["connect", "data 3", "io_error eof"]);

        assert!(observer.close().is_empty());
        assert!(!inbox.dispatch(&mut recorder).await);
    }

    #[tokio::test]
    async fn test_run_returns_when_detached() {
        let (observer, inbox) = Observer::channel();

        let runner = tokio::spawn(async move {
            let mut recorder = Recorder::default();
            inbox.run(&mut recorder).await;
            recorder.calls
        });

        observer.deliver(SerialEvent::Connected).unwrap();
        while !observer.inbox.lock().events.is_empty() {
            tokio::task::yield_now().await;
        }
        let _ = observer.close();

        assert_eq!(runner.await.unwrap(), ["connect"]);
    }

    #[test]
    fn test_delivery_after_inbox_dropped_is_refused() {
        let (observer, inbox) = Observer::channel();
        drop(inbox);

        assert!(observer.is_dropped());
        assert_eq!(
            observer.deliver(SerialEvent::Connected),
            Err(SerialEvent::Connected)
        );
    }
}
