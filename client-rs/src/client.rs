//! Realtime channel implementation

use crate::config::ChannelConfig;
use crate::error::{ChannelError, Result};
use crate::messages::{
    DroneStatus, Envelope, LeafDetection, SecurityAlert, SensorReading, SystemAlert, Topic, Update,
};

use futures::stream::SplitSink;
use futures::{SinkExt, StreamExt};
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type WsSink = SplitSink<WsStream, Message>;

/// Connection state of the channel
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Not connected, and not trying to be
    Disconnected,
    /// Opening the WebSocket
    Connecting,
    /// Connected and delivering updates
    Connected,
    /// Waiting out the backoff before the next attempt
    Reconnecting,
    /// Gave up after exhausting the reconnection budget
    Failed,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
            ConnectionState::Reconnecting => "reconnecting",
            ConnectionState::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// Supplies the credential presented in the `auth` envelope after each connect
pub trait CredentialSource: Send + Sync {
    fn credential(&self) -> Option<String>;
}

/// A fixed credential (or none)
#[derive(Debug, Clone, Default)]
pub struct StaticCredential(pub Option<String>);

impl CredentialSource for StaticCredential {
    fn credential(&self) -> Option<String> {
        self.0.clone()
    }
}

/// Handler for incoming updates
pub type UpdateHandler = Arc<dyn Fn(Update) + Send + Sync>;

/// Cancellation handle for one registration
///
/// Dropping the handle does not cancel the registration.
#[derive(Clone)]
pub struct Subscription {
    topic: Topic,
    handler_id: Uuid,
    channel: Arc<ChannelInner>,
}

impl Subscription {
    /// Get the subscribed topic
    pub fn topic(&self) -> Topic {
        self.topic
    }

    /// Remove this registration. Calling it again is a no-op.
    pub fn cancel(&self) {
        self.channel.remove_handler(self.topic, self.handler_id);
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("topic", &self.topic)
            .field("handler_id", &self.handler_id)
            .finish()
    }
}

struct Driver {
    shutdown: oneshot::Sender<()>,
    handle: JoinHandle<()>,
}

/// Internal channel state
struct ChannelInner {
    config: ChannelConfig,
    credentials: Arc<dyn CredentialSource>,
    state: watch::Sender<ConnectionState>,
    state_rx: watch::Receiver<ConnectionState>,

    // Sender into the live connection, present only while connected
    tx: Mutex<Option<mpsc::UnboundedSender<Envelope>>>,

    // Subscriptions: topic -> handlers in registration order
    subscriptions: Mutex<HashMap<Topic, Vec<(Uuid, UpdateHandler)>>>,

    // Why the most recent connection attempt failed; reset once connected
    last_error: Mutex<Option<String>>,

    driver: Mutex<Option<Driver>>,
}

/// Realtime WebSocket channel
///
/// Maintains one connection to the push endpoint, routes typed updates to
/// subscribers and reconnects with linear backoff. Cheaply cloneable.
#[derive(Clone)]
pub struct RealtimeChannel {
    inner: Arc<ChannelInner>,
}

impl RealtimeChannel {
    /// Create a channel that presents no credential on connect
    pub fn new(config: ChannelConfig) -> Self {
        Self::with_credentials(config, Arc::new(StaticCredential::default()))
    }

    /// Create a channel that presents `credentials` after every connect
    pub fn with_credentials(config: ChannelConfig, credentials: Arc<dyn CredentialSource>) -> Self {
        let (state_tx, state_rx) = watch::channel(ConnectionState::Disconnected);

        let inner = Arc::new(ChannelInner {
            config,
            credentials,
            state: state_tx,
            state_rx,
            tx: Mutex::new(None),
            subscriptions: Mutex::new(HashMap::new()),
            last_error: Mutex::new(None),
            driver: Mutex::new(None),
        });

        Self { inner }
    }

    pub fn config(&self) -> &ChannelConfig {
        &self.inner.config
    }

    /// Get the current connection state
    pub fn connection_state(&self) -> ConnectionState {
        *self.inner.state_rx.borrow()
    }

    /// Get a receiver for connection state changes
    pub fn state_receiver(&self) -> watch::Receiver<ConnectionState> {
        self.inner.state_rx.clone()
    }

    pub fn is_connected(&self) -> bool {
        self.connection_state() == ConnectionState::Connected
    }

    /// Why the latest connection attempt failed
    ///
    /// Set by every refused or failed handshake and kept after the channel
    /// gives up, so a `Failed` state can be explained. Cleared once a
    /// connection is established or a new `connect()` starts.
    pub fn last_error(&self) -> Option<ChannelError> {
        self.inner
            .last_error
            .lock()
            .clone()
            .map(ChannelError::Connection)
    }

    /// Start the connection driver in the background
    ///
    /// Returns immediately; progress is visible through [`Self::state_receiver`].
    /// Does nothing if the driver is already running. Must be called from
    /// within a tokio runtime.
    pub fn connect(&self) {
        let mut driver = self.inner.driver.lock();
        if let Some(running) = driver.as_ref() {
            if !running.handle.is_finished() {
                debug!("Realtime channel already running");
                return;
            }
        }

        self.inner.set_state(ConnectionState::Connecting);
        *self.inner.last_error.lock() = None;

        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let handle = tokio::spawn(run_driver(self.inner.clone(), shutdown_rx));
        *driver = Some(Driver {
            shutdown: shutdown_tx,
            handle,
        });
    }

    /// Close the connection, stop reconnecting and drop every subscription
    pub async fn disconnect(&self) {
        let driver = self.inner.driver.lock().take();
        if let Some(driver) = driver {
            let _ = driver.shutdown.send(());
            if let Err(e) = driver.handle.await {
                if e.is_panic() {
                    error!("Realtime driver panicked: {}", e);
                }
            }
        }

        *self.inner.tx.lock() = None;
        self.inner.subscriptions.lock().clear();
        self.inner.set_state(ConnectionState::Disconnected);
    }

    /// Register a handler for every update on `topic`
    ///
    /// Handlers for a topic run in registration order and receive only the
    /// payload. The returned handle is the only way to remove the registration.
    pub fn subscribe<F>(&self, topic: Topic, handler: F) -> Subscription
    where
        F: Fn(Update) + Send + Sync + 'static,
    {
        let handler_id = Uuid::new_v4();
        let handler: UpdateHandler = Arc::new(handler);

        self.inner
            .subscriptions
            .lock()
            .entry(topic)
            .or_default()
            .push((handler_id, handler));

        debug!(topic = %topic, handler_id = %handler_id, "Subscribed");

        Subscription {
            topic,
            handler_id,
            channel: self.inner.clone(),
        }
    }

    pub fn on_sensor_update<F>(&self, handler: F) -> Subscription
    where
        F: Fn(SensorReading) + Send + Sync + 'static,
    {
        self.subscribe(Topic::SensorUpdate, move |update| {
            if let Update::SensorUpdate(reading) = update {
                handler(reading);
            }
        })
    }

    pub fn on_drone_update<F>(&self, handler: F) -> Subscription
    where
        F: Fn(DroneStatus) + Send + Sync + 'static,
    {
        self.subscribe(Topic::DroneUpdate, move |update| {
            if let Update::DroneUpdate(status) = update {
                handler(status);
            }
        })
    }

    pub fn on_security_alert<F>(&self, handler: F) -> Subscription
    where
        F: Fn(SecurityAlert) + Send + Sync + 'static,
    {
        self.subscribe(Topic::SecurityAlert, move |update| {
            if let Update::SecurityAlert(alert) = update {
                handler(alert);
            }
        })
    }

    pub fn on_leaf_detection<F>(&self, handler: F) -> Subscription
    where
        F: Fn(LeafDetection) + Send + Sync + 'static,
    {
        self.subscribe(Topic::LeafDetection, move |update| {
            if let Update::LeafDetection(detection) = update {
                handler(detection);
            }
        })
    }

    pub fn on_system_alert<F>(&self, handler: F) -> Subscription
    where
        F: Fn(SystemAlert) + Send + Sync + 'static,
    {
        self.subscribe(Topic::SystemAlert, move |update| {
            if let Update::SystemAlert(alert) = update {
                handler(alert);
            }
        })
    }

    /// Number of live registrations on a topic
    pub fn subscriber_count(&self, topic: Topic) -> usize {
        self.inner
            .subscriptions
            .lock()
            .get(&topic)
            .map_or(0, Vec::len)
    }

    /// Send a payload under `topic`
    ///
    /// When not connected the message is dropped with a warning; nothing is
    /// queued for later. Fails only if the payload cannot be serialized.
    pub fn send<T: Serialize>(&self, topic: &str, data: &T) -> Result<()> {
        let data = serde_json::to_value(data)?;

        let tx = self.inner.tx.lock().clone();
        match tx {
            Some(tx) if self.is_connected() => {
                if tx.send(Envelope::new(topic, data)).is_err() {
                    warn!(topic, "Connection closed, message not sent");
                }
            }
            _ => warn!(topic, "Realtime channel not connected, message not sent"),
        }

        Ok(())
    }
}

impl ChannelInner {
    fn set_state(&self, state: ConnectionState) {
        let _ = self.state.send(state);
    }

    fn remove_handler(&self, topic: Topic, handler_id: Uuid) {
        let mut subs = self.subscriptions.lock();
        if let Some(handlers) = subs.get_mut(&topic) {
            handlers.retain(|(id, _)| *id != handler_id);
            if handlers.is_empty() {
                subs.remove(&topic);
            }
        }
    }

    /// Parse one inbound frame and deliver it; bad frames are dropped
    fn handle_frame(&self, frame: &[u8]) {
        let envelope: Envelope = match serde_json::from_slice(frame) {
            Ok(envelope) => envelope,
            Err(e) => {
                warn!("Failed to parse realtime message: {}", e);
                return;
            }
        };

        match Update::from_envelope(envelope) {
            Ok(update) => self.dispatch(update),
            Err(ChannelError::UnknownTopic(kind)) => {
                debug!(kind = %kind, "Ignoring envelope with unrecognized type");
            }
            Err(e) => warn!("Dropping realtime message: {}", e),
        }
    }

    fn dispatch(&self, update: Update) {
        // Snapshot so handlers can subscribe or cancel without deadlocking
        let handlers: Vec<UpdateHandler> = {
            let subs = self.subscriptions.lock();
            match subs.get(&update.topic()) {
                Some(handlers) => handlers.iter().map(|(_, h)| h.clone()).collect(),
                None => return,
            }
        };

        for handler in handlers {
            handler(update.clone());
        }
    }
}

enum ConnectionExit {
    Closed,
    Shutdown,
}

/// Connection driver: connect, serve, back off, repeat
async fn run_driver(inner: Arc<ChannelInner>, mut shutdown: oneshot::Receiver<()>) {
    let mut attempt = 0u32;

    loop {
        inner.set_state(ConnectionState::Connecting);
        debug!(url = %inner.config.url, "Connecting");

        let connected = tokio::select! {
            result = connect_async(inner.config.url.as_str()) => result,
            _ = &mut shutdown => break,
        };

        match connected {
            Ok((socket, _response)) => {
                attempt = 0;
                *inner.last_error.lock() = None;
                match run_connection(&inner, socket, &mut shutdown).await {
                    ConnectionExit::Shutdown => break,
                    ConnectionExit::Closed => {
                        info!("Realtime channel disconnected");
                        inner.set_state(ConnectionState::Disconnected);
                    }
                }
            }
            Err(e) => {
                warn!(url = %inner.config.url, "Error connecting to realtime endpoint: {}", e);
                *inner.last_error.lock() = Some(e.to_string());
            }
        }

        if !inner.config.auto_reconnect {
            inner.set_state(ConnectionState::Disconnected);
            return;
        }

        attempt += 1;
        let max_attempts = inner.config.reconnect.max_attempts;
        let Some(delay) = inner.config.reconnect.delay_for(attempt) else {
            let last_error = inner.last_error.lock().clone();
            error!(max_attempts, ?last_error, "Max reconnection attempts reached");
            inner.set_state(ConnectionState::Failed);
            return;
        };

        inner.set_state(ConnectionState::Reconnecting);
        info!(attempt, max_attempts, ?delay, "Attempting to reconnect");

        tokio::select! {
            _ = tokio::time::sleep(delay) => {}
            _ = &mut shutdown => break,
        }
    }

    inner.set_state(ConnectionState::Disconnected);
}

/// Serve one established connection until it closes or shutdown is requested
async fn run_connection(
    inner: &ChannelInner,
    socket: WsStream,
    shutdown: &mut oneshot::Receiver<()>,
) -> ConnectionExit {
    let (mut sink, mut stream) = socket.split();

    let (tx, mut rx) = mpsc::unbounded_channel::<Envelope>();
    *inner.tx.lock() = Some(tx);
    inner.set_state(ConnectionState::Connected);
    info!(url = %inner.config.url, "Realtime channel connected");

    if let Some(token) = inner.credentials.credential() {
        if let Err(e) = write_envelope(&mut sink, &Envelope::auth(&token)).await {
            warn!("Failed to send auth envelope: {}", e);
            *inner.tx.lock() = None;
            return ConnectionExit::Closed;
        }
    }

    let exit = loop {
        tokio::select! {
            outbound = rx.recv() => {
                match outbound {
                    Some(envelope) => {
                        if let Err(e) = write_envelope(&mut sink, &envelope).await {
                            warn!("Failed to send realtime message: {}", e);
                            break ConnectionExit::Closed;
                        }
                    }
                    None => break ConnectionExit::Shutdown,
                }
            }

            inbound = stream.next() => {
                match inbound {
                    Some(Ok(Message::Text(text))) => inner.handle_frame(text.as_bytes()),
                    Some(Ok(Message::Binary(data))) => inner.handle_frame(&data),
                    Some(Ok(Message::Close(_))) | None => break ConnectionExit::Closed,
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        warn!("Realtime transport error: {}", e);
                        break ConnectionExit::Closed;
                    }
                }
            }

            _ = &mut *shutdown => {
                // Flush sends accepted before the disconnect request
                while let Ok(envelope) = rx.try_recv() {
                    if write_envelope(&mut sink, &envelope).await.is_err() {
                        break;
                    }
                }
                let _ = sink.send(Message::Close(None)).await;
                break ConnectionExit::Shutdown;
            }
        }
    };

    *inner.tx.lock() = None;
    exit
}

async fn write_envelope(sink: &mut WsSink, envelope: &Envelope) -> Result<()> {
    let json = serde_json::to_string(envelope)?;
    sink.send(Message::text(json))
        .await
        .map_err(|e| ChannelError::Transport(e.to_string()))
}
