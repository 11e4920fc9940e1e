// Copyright 2026 Daniel Pelikan
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Connection session: lifecycle state machine and receive loop.
//!
//! Every transition and every emitted event happens under the session lock
//! and is tagged with the generation of the connect request that caused it.
//! A task whose generation is no longer current cannot emit anything, which
//! is what keeps late lines and duplicate "connection lost" events out after
//! a disconnect.

use parking_lot::Mutex;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::channel::{Channel, ChannelReader};
use super::framing::{Framing, LineDecoder};
use super::transport::{EnableOutcome, PeerAddress, PermissionOutcome, Transport, SPP_UUID};
use crate::config::{Config, MAX_READ_BUFFER};

/// Read buffer size used by the receive loop unless configured otherwise.
pub const DEFAULT_READ_BUFFER: usize = 256;

/// How long a disconnect waits for the connection task to finish.
const WORKER_JOIN_TIMEOUT: Duration = Duration::from_secs(2);

/// State of the connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    /// Connect attempt failed. Always followed by `Disconnected`.
    Failed(String),
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionState::Disconnected => f.write_str("Disconnected"),
            ConnectionState::Connecting => f.write_str("Connecting..."),
            ConnectionState::Connected => f.write_str("Connected"),
            ConnectionState::Failed(reason) => write!(f, "Connection failed: {}", reason),
        }
    }
}

/// Events emitted by a session.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    /// The connection state changed.
    StateChanged(ConnectionState),
    /// Text received from the peer.
    Line(String),
    /// The peer closed the stream or a read failed. Followed by
    /// `StateChanged(Disconnected)`.
    ConnectionLost(Option<String>),
    /// Enabling the adapter or granting permission was refused.
    Declined(String),
    /// No local adapter. Connecting is permanently unavailable.
    Unsupported,
}

/// Errors returned by session commands.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("not connected")]
    NotConnected,
    #[error("write failed: {0}")]
    Io(#[from] std::io::Error),
}

/// Per-session connection parameters.
#[derive(Debug, Clone)]
pub struct SessionSettings {
    pub peer: PeerAddress,
    pub service_uuid: Uuid,
    pub connect_timeout: Option<Duration>,
    pub read_buffer_size: usize,
    pub framing: Framing,
}

impl SessionSettings {
    pub fn new(peer: PeerAddress) -> Self {
        Self {
            peer,
            service_uuid: SPP_UUID,
            connect_timeout: None,
            read_buffer_size: DEFAULT_READ_BUFFER,
            framing: Framing::default(),
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self {
            peer: config.bluetooth.peer_address.clone(),
            service_uuid: config.bluetooth.service_uuid,
            connect_timeout: config.bluetooth.connect_timeout(),
            read_buffer_size: config.receive.buffer_size,
            framing: config.receive.framing,
        }
    }
}

struct Inner {
    state: ConnectionState,
    /// A connect request is between `request_connect` and its outcome.
    pending: bool,
    unsupported: bool,
    generation: u64,
    channel: Option<Arc<Channel>>,
    worker: Option<JoinHandle<()>>,
}

struct Shared {
    transport: Arc<dyn Transport>,
    settings: SessionSettings,
    inner: Mutex<Inner>,
    event_tx: mpsc::UnboundedSender<SessionEvent>,
}

/// Connection session for a single peer.
pub struct Session {
    shared: Arc<Shared>,
    runtime: tokio::runtime::Handle,
}

impl Session {
    /// Create a new session. Must be called within a Tokio runtime.
    pub fn new(
        transport: Arc<dyn Transport>,
        settings: SessionSettings,
        event_tx: mpsc::UnboundedSender<SessionEvent>,
    ) -> Self {
        info!(
            "Session for {} using {} transport",
            settings.peer,
            transport.name()
        );

        Self {
            shared: Arc::new(Shared {
                transport,
                settings,
                inner: Mutex::new(Inner {
                    state: ConnectionState::Disconnected,
                    pending: false,
                    unsupported: false,
                    generation: 0,
                    channel: None,
                    worker: None,
                }),
                event_tx,
            }),
            runtime: tokio::runtime::Handle::current(),
        }
    }

    /// Current connection state.
    pub fn state(&self) -> ConnectionState {
        self.shared.inner.lock().state.clone()
    }

    /// Whether a connect request would be acted upon right now.
    pub fn is_connect_available(&self) -> bool {
        let inner = self.shared.inner.lock();
        !inner.unsupported && !inner.pending && inner.state == ConnectionState::Disconnected
    }

    pub fn settings(&self) -> &SessionSettings {
        &self.shared.settings
    }

    /// Probe the transport for a local adapter.
    ///
    /// Without one the session latches as unsupported, emits `Unsupported`
    /// once and ignores every later connect request.
    pub async fn check_support(&self) -> bool {
        if self.shared.transport.is_supported().await {
            return true;
        }
        let mut inner = self.shared.inner.lock();
        if !inner.unsupported {
            warn!("No Bluetooth adapter available");
            inner.unsupported = true;
            self.shared.emit(SessionEvent::Unsupported);
        }
        false
    }

    /// Start connecting on a background task.
    ///
    /// Runs the enable and permission flows first when needed. Ignored while
    /// a request is already in flight or a connection is up.
    pub fn request_connect(&self) {
        let mut inner = self.shared.inner.lock();

        if inner.unsupported {
            warn!("Bluetooth is not supported, ignoring connect request");
            return;
        }
        if inner.pending || inner.state != ConnectionState::Disconnected {
            debug!("Connect request ignored in state {:?}", inner.state);
            return;
        }

        inner.pending = true;
        inner.generation += 1;
        let generation = inner.generation;

        let shared = self.shared.clone();
        inner.worker = Some(self.runtime.spawn(async move {
            shared.run(generation).await;
        }));
    }

    /// Disconnect, or cancel an attempt in progress.
    ///
    /// Returns once the stream is closed and the connection task finished.
    pub async fn request_disconnect(&self) {
        let (channel, worker) = {
            let mut inner = self.shared.inner.lock();
            let state = inner.state.clone();

            match state {
                ConnectionState::Connected => {
                    info!("Disconnecting from {}", self.shared.settings.peer);
                    inner.generation += 1;
                    let channel = inner.channel.take();
                    self.shared
                        .set_state(&mut inner, ConnectionState::Disconnected);
                    (channel, inner.worker.take())
                }
                _ if inner.pending => {
                    info!("Cancelling connect request");
                    inner.generation += 1;
                    inner.pending = false;
                    if let Some(worker) = inner.worker.take() {
                        worker.abort();
                    }
                    if inner.state == ConnectionState::Connecting {
                        self.shared.set_state(
                            &mut inner,
                            ConnectionState::Failed("connection attempt cancelled".to_string()),
                        );
                        self.shared
                            .set_state(&mut inner, ConnectionState::Disconnected);
                    }
                    (None, None)
                }
                _ => {
                    debug!("Disconnect request ignored in state {:?}", state);
                    (None, None)
                }
            }
        };

        if let Some(channel) = channel {
            self.shared.transport.close(&channel).await;
        }

        if let Some(mut worker) = worker {
            if tokio::time::timeout(WORKER_JOIN_TIMEOUT, &mut worker)
                .await
                .is_err()
            {
                warn!("Connection task did not stop in time, aborting it");
                worker.abort();
            }
        }
    }

    /// Connect when disconnected, disconnect otherwise.
    pub async fn toggle(&self) {
        let connected = {
            let inner = self.shared.inner.lock();
            inner.pending || inner.state != ConnectionState::Disconnected
        };

        if connected {
            self.request_disconnect().await;
        } else {
            self.request_connect();
        }
    }

    /// Send bytes to the peer.
    pub async fn send(&self, data: &[u8]) -> Result<(), SessionError> {
        let channel = self
            .shared
            .inner
            .lock()
            .channel
            .clone()
            .ok_or(SessionError::NotConnected)?;

        if channel.is_closed() {
            return Err(SessionError::NotConnected);
        }
        channel.write_all(data).await?;
        Ok(())
    }

    /// Tear the session down at process exit.
    pub async fn shutdown(&self) {
        self.request_disconnect().await;
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        let mut inner = self.shared.inner.lock();
        inner.generation += 1;
        inner.pending = false;

        if let Some(channel) = inner.channel.take() {
            channel.close_now();
        }
        if let Some(worker) = inner.worker.take() {
            worker.abort();
        }
        if inner.state != ConnectionState::Disconnected {
            self.shared
                .set_state(&mut inner, ConnectionState::Disconnected);
        }
    }
}

impl Shared {
    /// Emit an event.
    fn emit(&self, event: SessionEvent) {
        let _ = self.event_tx.send(event);
    }

    fn set_state(&self, inner: &mut Inner, state: ConnectionState) {
        debug!("State {:?} -> {:?}", inner.state, state);
        inner.state = state.clone();
        self.emit(SessionEvent::StateChanged(state));
    }

    /// Body of the connection task.
    async fn run(self: Arc<Self>, generation: u64) {
        if !self.transport.is_supported().await {
            self.mark_unsupported(generation);
            return;
        }

        if !self.transport.is_enabled().await {
            info!("Bluetooth adapter is disabled, requesting enable");
            match self.transport.request_enable().await {
                EnableOutcome::Enabled => info!("Bluetooth adapter enabled"),
                EnableOutcome::Declined => {
                    self.decline(generation, "Bluetooth was not enabled");
                    return;
                }
            }
        }

        if !self.transport.has_connect_permission().await {
            info!("Requesting Bluetooth connect permission");
            match self.transport.request_connect_permission().await {
                PermissionOutcome::Granted => info!("Bluetooth permission granted"),
                PermissionOutcome::Denied => {
                    self.decline(generation, "Bluetooth permission denied");
                    return;
                }
            }
        }

        if !self.begin_connecting(generation) {
            return;
        }

        let settings = &self.settings;
        info!("Connecting to {} ({})", settings.peer, settings.service_uuid);
        let result = self
            .transport
            .connect_with_timeout(&settings.peer, settings.service_uuid, settings.connect_timeout)
            .await;

        let stream = match result {
            Ok(stream) => stream,
            Err(e) => {
                error!("Connection to {} failed: {}", settings.peer, e);
                self.fail(generation, e.to_string());
                return;
            }
        };

        let (channel, reader) = Channel::open(stream);
        if !self.establish(generation, channel.clone()) {
            channel.close().await;
            return;
        }

        self.receive_loop(generation, reader).await;
    }

    fn mark_unsupported(&self, generation: u64) {
        let mut inner = self.inner.lock();
        if inner.generation != generation {
            return;
        }
        inner.pending = false;
        inner.worker = None;
        if !inner.unsupported {
            warn!("No Bluetooth adapter available");
            inner.unsupported = true;
            self.emit(SessionEvent::Unsupported);
        }
    }

    fn decline(&self, generation: u64, reason: &str) {
        let mut inner = self.inner.lock();
        if inner.generation != generation {
            return;
        }
        warn!("{}", reason);
        inner.pending = false;
        inner.worker = None;
        self.emit(SessionEvent::Declined(reason.to_string()));
    }

    fn begin_connecting(&self, generation: u64) -> bool {
        let mut inner = self.inner.lock();
        if inner.generation != generation {
            return false;
        }
        self.set_state(&mut inner, ConnectionState::Connecting);
        true
    }

    fn fail(&self, generation: u64, reason: String) {
        let mut inner = self.inner.lock();
        if inner.generation != generation {
            return;
        }
        inner.pending = false;
        inner.worker = None;
        self.set_state(&mut inner, ConnectionState::Failed(reason));
        self.set_state(&mut inner, ConnectionState::Disconnected);
    }

    fn establish(&self, generation: u64, channel: Arc<Channel>) -> bool {
        let mut inner = self.inner.lock();
        if inner.generation != generation {
            debug!("Connect request was cancelled, dropping new connection");
            return false;
        }
        info!("Connected to {}", self.settings.peer);
        inner.pending = false;
        inner.channel = Some(channel);
        self.set_state(&mut inner, ConnectionState::Connected);
        true
    }

    /// Forward decoded lines unless the connection was torn down meanwhile.
    fn deliver(&self, generation: u64, lines: Vec<String>) -> bool {
        let inner = self.inner.lock();
        if inner.generation != generation || inner.channel.is_none() {
            return false;
        }
        for line in lines {
            debug!("Received: {}", line);
            self.emit(SessionEvent::Line(line));
        }
        true
    }

    fn connection_lost(&self, generation: u64, detail: Option<String>) -> Option<Arc<Channel>> {
        let mut inner = self.inner.lock();
        if inner.generation != generation {
            return None;
        }
        let channel = inner.channel.take()?;
        inner.generation += 1;
        inner.worker = None;
        self.emit(SessionEvent::ConnectionLost(detail));
        self.set_state(&mut inner, ConnectionState::Disconnected);
        Some(channel)
    }

    async fn receive_loop(&self, generation: u64, mut reader: ChannelReader) {
        info!("Receive loop started");

        let mut buffer = vec![0u8; self.settings.read_buffer_size.clamp(1, MAX_READ_BUFFER)];
        let mut decoder = LineDecoder::new(self.settings.framing);

        let detail = loop {
            match reader.read_chunk(&mut buffer).await {
                Ok(None) => {
                    debug!("Channel closed locally, receive loop exiting");
                    return;
                }
                Ok(Some(0)) => {
                    info!("Connection closed by remote");
                    break None;
                }
                Ok(Some(n)) => {
                    let lines = decoder.push(&buffer[..n]);
                    if !self.deliver(generation, lines) {
                        return;
                    }
                }
                Err(e) => {
                    error!("Read error: {}", e);
                    break Some(e.to_string());
                }
            }
        };

        if let Some(channel) = self.connection_lost(generation, detail) {
            self.transport.close(&channel).await;
        }
    }
}
