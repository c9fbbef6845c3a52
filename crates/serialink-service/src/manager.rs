//! Connection manager.
//!
//! This module provides the [`ConnectionManager`], a long-lived owner of one
//! transport connection that outlives any observer. All state lives in a
//! single actor task; commands from handles and events from the transport
//! are processed one at a time, so the connection state, the observer slot
//! and the pending buffers can never be observed half-updated.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────┐  Command   ┌───────────────────┐  deliver  ┌──────────┐
//! │ Connection   │───────────►│                   │──────────►│ Observer │
//! │ Handle(s)    │◄───────────│   manager actor   │           │ inbox    │
//! └──────────────┘   reply    │                   │           └──────────┘
//!                             │  state            │  buffer   ┌──────────┐
//! ┌──────────────┐ SinkEvent  │  observer slot    │──────────►│ Pending  │
//! │ Transport    │───────────►│  generation       │           │ events   │
//! │ read path    │            └───────────────────┘           └──────────┘
//! └──────────────┘
//! ```
//!
//! Every transport is tagged with a connection generation. A disconnect bumps
//! the generation, so anything a closed transport still pushes, and the
//! result of an open cancelled while pending, is recognized and discarded.
//!
//! # Examples
//!
//! ```no_run
//! use serialink_service::{ConnectionManager, ManagerConfig, Observer, SerialEvent};
//! use serialink_transport::TransportTarget;
//! use serialink_transport::usb::UsbTarget;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let handle = ConnectionManager::new(ManagerConfig::default()).start();
//!
//!     let (observer, inbox) = Observer::channel();
//!     handle.attach(observer).await;
//!
//!     handle
//!         .connect(TransportTarget::Usb(UsbTarget::path("/dev/ttyUSB0")))
//!         .await?;
//!     handle.write(b"AT\r\n").await?;
//!
//!     while let Some(event) = inbox.recv().await {
//!         if let SerialEvent::Data(batch) = event {
//!             println!("{}", String::from_utf8_lossy(&batch.to_vec()));
//!         }
//!     }
//!
//!     handle.shutdown().await;
//!     Ok(())
//! }
//! ```

use crate::notifier::{LogNotifier, StatusNotifier, connected_text};
use crate::observer::Observer;
use crate::pending::PendingEvents;
use crate::queue::{DataBatch, SerialEvent};
use serialink_core::constants::{
    BACKGROUND_DISCONNECT, COMMAND_CHANNEL_CAPACITY, STATUS_CONNECTED, WRITE_TIMEOUT_MS,
};
use serialink_core::{ConnectionState, LinkFault, OpenError, OpenWarning, WriteError};
use serialink_transport::{
    AnyTransport, EventSink, Opened, SinkEvent, Transport, TransportEvent, TransportTarget,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, mpsc, oneshot, watch};
use tokio::task::{JoinError, JoinHandle, JoinSet};
use tracing::{debug, error, info, trace, warn};

/// Status line published after an explicit disconnect.
const STATUS_DISCONNECTED: &str = "Disconnected";

/// Configuration for the connection manager.
///
/// # Examples
///
/// ```
/// use serialink_service::ManagerConfig;
/// use std::time::Duration;
///
/// let config = ManagerConfig::default().with_write_timeout(Duration::from_millis(500));
/// assert_eq!(config.write_timeout, Duration::from_millis(500));
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManagerConfig {
    /// Bound for a single write call.
    pub write_timeout: Duration,

    /// Capacity of the command channel shared by all handles.
    pub command_capacity: usize,

    /// Capacity of the transport event channel.
    pub event_capacity: usize,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            write_timeout: Duration::from_millis(WRITE_TIMEOUT_MS),
            command_capacity: COMMAND_CHANNEL_CAPACITY,
            event_capacity: COMMAND_CHANNEL_CAPACITY,
        }
    }
}

impl ManagerConfig {
    /// Set the write bound.
    pub fn with_write_timeout(mut self, timeout: Duration) -> Self {
        self.write_timeout = timeout;
        self
    }

    /// Set the command channel capacity.
    pub fn with_command_capacity(mut self, capacity: usize) -> Self {
        self.command_capacity = capacity.max(1);
        self
    }

    /// Set the transport event channel capacity.
    pub fn with_event_capacity(mut self, capacity: usize) -> Self {
        self.event_capacity = capacity.max(1);
        self
    }
}

/// Connection state plus the latest human-readable status line.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConnectionStatus {
    /// Current connection state.
    pub state: ConnectionState,

    /// Latest status line, if any.
    pub message: Option<String>,
}

/// Outcome of a successful `connect`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectReport {
    /// Name of the connected link.
    pub name: String,

    /// Non-fatal conditions raised while opening.
    pub warnings: Vec<OpenWarning>,
}

type ConnectReply = oneshot::Sender<Result<ConnectReport, OpenError>>;

enum Command {
    Connect {
        target: TransportTarget,
        reply: ConnectReply,
    },
    OpenCompleted {
        generation: u64,
        result: Result<Opened, OpenError>,
        reply: ConnectReply,
    },
    Disconnect {
        reply: oneshot::Sender<()>,
    },
    Write {
        reply: oneshot::Sender<Result<Arc<AnyTransport>, WriteError>>,
    },
    Attach {
        observer: Observer,
        reply: oneshot::Sender<()>,
    },
    Detach {
        reply: oneshot::Sender<()>,
    },
    BackgroundDisconnect,
    Shutdown {
        reply: oneshot::Sender<()>,
    },
}

/// Owns the connection and mediates all event delivery.
///
/// # Lifecycle
///
/// 1. Create the manager with configuration
/// 2. Optionally install a [`StatusNotifier`]
/// 3. Call `start()` to spawn the actor and get a [`ConnectionHandle`]
/// 4. Attach an observer, connect, write
/// 5. Call `shutdown()` on any handle when done
pub struct ConnectionManager {
    config: ManagerConfig,
    notifier: Arc<dyn StatusNotifier>,
}

impl ConnectionManager {
    /// Create a manager that logs its status indicator.
    pub fn new(config: ManagerConfig) -> Self {
        Self {
            config,
            notifier: Arc::new(LogNotifier),
        }
    }

    /// Use `notifier` for the persistent status indicator.
    pub fn with_notifier(mut self, notifier: impl StatusNotifier + 'static) -> Self {
        self.notifier = Arc::new(notifier);
        self
    }

    /// Spawn the manager task and return a handle to it.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn start(self) -> ConnectionHandle {
        let (command_tx, command_rx) = mpsc::channel(self.config.command_capacity);
        let (event_tx, event_rx) = mpsc::channel(self.config.event_capacity);
        let (status_tx, status_rx) = watch::channel(ConnectionStatus::default());

        let actor = Actor {
            state: ConnectionState::Disconnected,
            generation: 0,
            transport: None,
            observer: None,
            pending: PendingEvents::new(),
            notifier: self.notifier,
            status: status_tx,
            commands: command_tx.downgrade(),
            events: event_tx,
            opens: JoinSet::new(),
        };

        let task = tokio::spawn(actor.run(command_rx, event_rx));

        ConnectionHandle {
            commands: command_tx,
            status: status_rx,
            write_timeout: self.config.write_timeout,
            task: Arc::new(Mutex::new(Some(task))),
        }
    }
}

/// Handle to a running connection manager.
///
/// Cheap to clone. Every clone talks to the same manager, and the manager
/// stops once `shutdown` is called or every handle is dropped.
#[derive(Debug, Clone)]
pub struct ConnectionHandle {
    commands: mpsc::Sender<Command>,
    status: watch::Receiver<ConnectionStatus>,
    write_timeout: Duration,
    task: Arc<Mutex<Option<JoinHandle<()>>>>,
}

impl ConnectionHandle {
    /// Open `target` and make it the active connection.
    ///
    /// Resolves once the attempt finishes. The outcome is also emitted as a
    /// `Connected` or `ConnectError` event.
    ///
    /// # Errors
    ///
    /// - [`OpenError::AttemptInProgress`] if another attempt is pending
    /// - [`OpenError::AlreadyOpen`] if a connection is established
    /// - [`OpenError::Cancelled`] if `disconnect` was called meanwhile
    /// - any open failure of the transport
    pub async fn connect(&self, target: TransportTarget) -> Result<ConnectReport, OpenError> {
        self.request(|reply| Command::Connect { target, reply })
            .await
            .ok_or_else(|| OpenError::io("connection manager stopped"))?
    }

    /// Close the connection. Safe to call in any state.
    pub async fn disconnect(&self) {
        self.request(|reply| Command::Disconnect { reply }).await;
    }

    /// Write `data` to the connected link.
    ///
    /// # Errors
    ///
    /// - [`WriteError::NotConnected`] unless the state is `Connected`; the
    ///   link is not touched
    /// - [`WriteError::Timeout`] if the write exceeds the configured bound;
    ///   the connection stays up
    /// - [`WriteError::Underlying`] for link failures
    pub async fn write(&self, data: &[u8]) -> Result<(), WriteError> {
        let transport = self
            .request(|reply| Command::Write { reply })
            .await
            .ok_or(WriteError::NotConnected)??;

        transport.write(data, self.write_timeout).await
    }

    /// Install `observer`, replaying buffered events into it first.
    ///
    /// A previously attached observer is detached, and whatever it had not
    /// consumed is replayed into the new one ahead of newer events.
    pub async fn attach(&self, observer: Observer) {
        self.request(|reply| Command::Attach { observer, reply })
            .await;
    }

    /// Remove the observer. Later events are buffered until the next attach.
    pub async fn detach(&self) {
        self.request(|reply| Command::Detach { reply }).await;
    }

    /// Report a background disconnect and close the connection.
    ///
    /// Backs the "Disconnect" action of the persistent status indicator.
    pub async fn request_background_disconnect(&self) {
        if self.commands.send(Command::BackgroundDisconnect).await.is_err() {
            warn!("Connection manager stopped");
        }
    }

    /// Current connection state.
    pub fn state(&self) -> ConnectionState {
        self.status.borrow().state
    }

    /// Check if the connection is established.
    pub fn is_connected(&self) -> bool {
        self.state().is_connected()
    }

    /// Current state and status line.
    pub fn status(&self) -> ConnectionStatus {
        self.status.borrow().clone()
    }

    /// Subscribe to state and status line changes.
    pub fn subscribe_status(&self) -> watch::Receiver<ConnectionStatus> {
        self.status.clone()
    }

    /// Disconnect, close the observer inbox and stop the manager.
    ///
    /// Events already delivered stay readable from the inbox.
    pub async fn shutdown(&self) {
        self.request(|reply| Command::Shutdown { reply }).await;

        let task = self.task.lock().await.take();
        if let Some(task) = task {
            match classify_task_result(task.await) {
                TaskTermination::Panic => error!("Connection manager task panicked"),
                TaskTermination::Cancelled => debug!("Connection manager task cancelled"),
                TaskTermination::Success => {}
            }
        }
    }

    async fn request<T>(&self, command: impl FnOnce(oneshot::Sender<T>) -> Command) -> Option<T> {
        let (reply, response) = oneshot::channel();
        if self.commands.send(command(reply)).await.is_err() {
            warn!("Connection manager stopped");
            return None;
        }
        response.await.ok()
    }
}

/// Task termination classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TaskTermination {
    Success,
    Cancelled,
    Panic,
}

fn classify_task_result(result: Result<(), JoinError>) -> TaskTermination {
    match result {
        Ok(()) => TaskTermination::Success,
        Err(e) if e.is_cancelled() => TaskTermination::Cancelled,
        Err(_) => TaskTermination::Panic,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Flow {
    Continue,
    Stop,
}

struct Actor {
    state: ConnectionState,
    generation: u64,
    transport: Option<Arc<AnyTransport>>,
    observer: Option<Observer>,
    pending: PendingEvents,
    notifier: Arc<dyn StatusNotifier>,
    status: watch::Sender<ConnectionStatus>,
    commands: mpsc::WeakSender<Command>,
    events: mpsc::Sender<SinkEvent>,
    opens: JoinSet<()>,
}

impl Actor {
    async fn run(
        mut self,
        mut commands: mpsc::Receiver<Command>,
        mut events: mpsc::Receiver<SinkEvent>,
    ) {
        info!("Connection manager started");

        loop {
            tokio::select! {
                biased;

                command = commands.recv() => {
                    let Some(command) = command else {
                        debug!("All connection handles dropped");
                        self.teardown().await;
                        break;
                    };
                    if self.handle_command(command).await == Flow::Stop {
                        break;
                    }
                }
                Some(event) = events.recv() => self.handle_event(event).await,
                Some(result) = self.opens.join_next(), if !self.opens.is_empty() => {
                    if classify_task_result(result) == TaskTermination::Panic {
                        error!("Open task panicked");
                    }
                }
            }
        }

        self.opens.abort_all();
        info!("Connection manager stopped");
    }

    async fn handle_command(&mut self, command: Command) -> Flow {
        match command {
            Command::Connect { target, reply } => self.connect(target, reply),
            Command::OpenCompleted {
                generation,
                result,
                reply,
            } => self.open_completed(generation, result, reply).await,
            Command::Disconnect { reply } => {
                if self.close_link(STATUS_DISCONNECTED.to_string()).await {
                    info!("Disconnected");
                } else {
                    trace!("Disconnect while already disconnected");
                }
                let _ = reply.send(());
            }
            Command::Write { reply } => {
                let _ = reply.send(self.writer());
            }
            Command::Attach { observer, reply } => {
                self.attach(observer);
                let _ = reply.send(());
            }
            Command::Detach { reply } => {
                self.detach();
                let _ = reply.send(());
            }
            Command::BackgroundDisconnect => self.background_disconnect().await,
            Command::Shutdown { reply } => {
                self.teardown().await;
                let _ = reply.send(());
                return Flow::Stop;
            }
        }
        Flow::Continue
    }

    fn connect(&mut self, target: TransportTarget, reply: ConnectReply) {
        match self.state {
            ConnectionState::Pending => {
                warn!(link = %target, "Connection attempt already in progress");
                let _ = reply.send(Err(OpenError::AttemptInProgress));
                return;
            }
            ConnectionState::Connected => {
                let name = self
                    .transport
                    .as_ref()
                    .map(|t| t.name().to_string())
                    .unwrap_or_default();
                warn!(link = %name, "Already connected");
                let _ = reply.send(Err(OpenError::already_open(name)));
                return;
            }
            ConnectionState::Disconnected => {}
        }

        let Some(commands) = self.commands.upgrade() else {
            let _ = reply.send(Err(OpenError::io("connection manager stopped")));
            return;
        };

        let generation = self.generation;
        info!(link = %target, generation, "Connecting");
        self.set_state(ConnectionState::Pending, None);

        self.opens.spawn(async move {
            let result = target.open().await;
            let completed = Command::OpenCompleted {
                generation,
                result,
                reply,
            };
            if let Err(mpsc::error::SendError(Command::OpenCompleted {
                result: Ok(opened),
                ..
            })) = commands.send(completed).await
            {
                opened.transport.close().await;
            }
        });
    }

    async fn open_completed(
        &mut self,
        generation: u64,
        result: Result<Opened, OpenError>,
        reply: ConnectReply,
    ) {
        if generation != self.generation || self.state != ConnectionState::Pending {
            debug!(
                generation,
                current = self.generation,
                "Discarding cancelled connection attempt"
            );
            if let Ok(opened) = result {
                opened.transport.close().await;
            }
            let _ = reply.send(Err(OpenError::Cancelled));
            return;
        }

        match result {
            Ok(Opened {
                transport,
                warnings,
            }) => {
                let transport = Arc::new(transport);
                let name = transport.name().to_string();

                info!(link = %name, generation, "Connected");
                self.set_state(
                    ConnectionState::Connected,
                    Some(STATUS_CONNECTED.to_string()),
                );
                self.emit(SerialEvent::Connected);

                for warning in &warnings {
                    warn!(link = %name, %warning, "Connected with degraded parameters");
                    self.set_message(warning.to_string());
                }

                transport.start(EventSink::new(generation, self.events.clone()));
                self.transport = Some(transport);

                let _ = reply.send(Ok(ConnectReport { name, warnings }));
            }
            Err(err) => {
                warn!(error = %err, "Connection failed");
                self.generation += 1;
                self.set_state(ConnectionState::Disconnected, Some(err.status_line()));
                self.emit(SerialEvent::ConnectError(LinkFault::from(err.clone())));
                let _ = reply.send(Err(err));
            }
        }
    }

    async fn handle_event(&mut self, SinkEvent { generation, event }: SinkEvent) {
        if generation != self.generation || !self.state.is_connected() {
            debug!(
                generation,
                current = self.generation,
                state = %self.state,
                "Discarding stale transport event"
            );
            return;
        }

        match event {
            TransportEvent::Connect => trace!("Transport reported connect"),
            TransportEvent::DataChunk { bytes } => {
                trace!(len = bytes.len(), "Data received");
                self.emit(SerialEvent::Data(DataBatch::new(bytes)));
            }
            TransportEvent::ConnectError { cause } => {
                warn!(%cause, "Transport connect error");
                let message = format!("connection failed: {}", cause);
                self.emit(SerialEvent::ConnectError(cause));
                self.close_link(message).await;
            }
            TransportEvent::IoError { cause } => {
                warn!(%cause, "Transport I/O error");
                let message = format!("connection lost: {}", cause);
                self.emit(SerialEvent::IoError(cause));
                self.close_link(message).await;
            }
        }
    }

    async fn background_disconnect(&mut self) {
        match self.state {
            ConnectionState::Connected => {
                info!("Background disconnect requested");
                let cause = LinkFault::new(BACKGROUND_DISCONNECT);
                let message = format!("connection lost: {}", cause);
                self.emit(SerialEvent::IoError(cause));
                self.close_link(message).await;
            }
            ConnectionState::Pending => {
                self.close_link(STATUS_DISCONNECTED.to_string()).await;
            }
            ConnectionState::Disconnected => self.notifier.clear(),
        }
    }

    fn writer(&self) -> Result<Arc<AnyTransport>, WriteError> {
        match &self.transport {
            Some(transport) if self.state.is_connected() => Ok(Arc::clone(transport)),
            _ => Err(WriteError::NotConnected),
        }
    }

    fn attach(&mut self, observer: Observer) {
        if let Some(previous) = self.observer.take() {
            debug!("Replacing attached observer");
            self.pending.reclaim(previous.close());
        }

        if observer.is_dropped() {
            warn!("Observer inbox already dropped, keeping events buffered");
            return;
        }

        let replay = self.pending.drain_for_attach();
        debug!(replayed = replay.len(), "Observer attached");

        for event in replay {
            if let Err(event) = observer.deliver(event) {
                self.pending.push(event);
            }
        }

        self.observer = Some(observer);
        self.notifier.clear();
    }

    fn detach(&mut self) {
        let Some(observer) = self.observer.take() else {
            trace!("Detach with no observer attached");
            return;
        };

        let undelivered = observer.close();
        debug!(reclaimed = undelivered.len(), "Observer detached");
        self.pending.reclaim(undelivered);

        if self.state.is_connected()
            && let Some(transport) = &self.transport
        {
            self.notifier.show(&connected_text(transport.name()));
        }
    }

    /// Deliver to the observer, or buffer while none is attached.
    fn emit(&mut self, event: SerialEvent) {
        trace!(kind = event.kind(), "Emitting event");

        let event = match &self.observer {
            Some(observer) => match observer.deliver(event) {
                Ok(()) => return,
                Err(event) => event,
            },
            None => event,
        };

        if self.observer.is_some() {
            debug!("Observer inbox dropped");
            self.detach();
        }
        self.pending.push(event);
    }

    /// Tear the connection down without emitting events.
    ///
    /// Returns `false` if already disconnected.
    async fn close_link(&mut self, message: String) -> bool {
        if self.state == ConnectionState::Disconnected {
            return false;
        }

        self.generation += 1;
        self.set_state(ConnectionState::Disconnected, Some(message));
        self.notifier.clear();

        if let Some(transport) = self.transport.take() {
            transport.close().await;
        }
        true
    }

    async fn teardown(&mut self) {
        self.close_link(STATUS_DISCONNECTED.to_string()).await;
        if let Some(observer) = self.observer.take() {
            observer.finish();
        }
        self.notifier.clear();
    }

    fn set_state(&mut self, next: ConnectionState, message: Option<String>) {
        if !self.state.can_transition_to(&next) {
            warn!(from = %self.state, to = %next, "Unexpected state transition");
        }
        debug!(from = %self.state, to = %next, "State transition");

        self.state = next;
        self.status.send_replace(ConnectionStatus {
            state: next,
            message,
        });
    }

    fn set_message(&self, message: String) {
        self.status.send_modify(|status| status.message = Some(message));
    }
}
