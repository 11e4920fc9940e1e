//! In-memory transport used by the integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use parking_lot::Mutex;
use std::io;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite, DuplexStream, ReadBuf};
use tokio::sync::mpsc;
use uuid::Uuid;

use spp_distance::bluetooth::{
    BoxedStream, ConnectError, EnableOutcome, PeerAddress, PermissionOutcome, Session,
    SessionEvent, SessionSettings, Transport,
};

/// What a connect attempt does.
#[derive(Debug, Clone)]
pub enum ConnectBehavior {
    Succeed,
    Fail(ConnectError),
    /// Never completes.
    Hang,
    /// Connects, but every read fails with this error.
    ReadError(io::ErrorKind),
}

/// Stream whose reads always fail. Writes are swallowed.
pub struct FailingStream {
    kind: io::ErrorKind,
}

impl AsyncRead for FailingStream {
    fn poll_read(
        self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        _buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        Poll::Ready(Err(io::Error::new(self.kind, "link dropped")))
    }
}

impl AsyncWrite for FailingStream {
    fn poll_write(
        self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        Poll::Ready(Ok(buf.len()))
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }
}

pub struct MockTransport {
    pub supported: bool,
    pub enabled: AtomicBool,
    pub enable_outcome: EnableOutcome,
    pub permitted: AtomicBool,
    pub permission_outcome: PermissionOutcome,
    pub behavior: Mutex<ConnectBehavior>,
    pub enable_requests: AtomicUsize,
    pub permission_requests: AtomicUsize,
    pub connects: AtomicUsize,
    remotes: mpsc::UnboundedSender<DuplexStream>,
}

impl MockTransport {
    /// A ready transport plus the receiver of the peer ends of each connection.
    pub fn new() -> (Self, mpsc::UnboundedReceiver<DuplexStream>) {
        let (remotes, remote_rx) = mpsc::unbounded_channel();
        let transport = Self {
            supported: true,
            enabled: AtomicBool::new(true),
            enable_outcome: EnableOutcome::Enabled,
            permitted: AtomicBool::new(true),
            permission_outcome: PermissionOutcome::Granted,
            behavior: Mutex::new(ConnectBehavior::Succeed),
            enable_requests: AtomicUsize::new(0),
            permission_requests: AtomicUsize::new(0),
            connects: AtomicUsize::new(0),
            remotes,
        };
        (transport, remote_rx)
    }
}

#[async_trait]
impl Transport for MockTransport {
    fn name(&self) -> &'static str {
        "mock"
    }

    async fn is_supported(&self) -> bool {
        self.supported
    }

    async fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }

    async fn request_enable(&self) -> EnableOutcome {
        self.enable_requests.fetch_add(1, Ordering::SeqCst);
        if self.enable_outcome == EnableOutcome::Enabled {
            self.enabled.store(true, Ordering::SeqCst);
        }
        self.enable_outcome
    }

    async fn has_connect_permission(&self) -> bool {
        self.permitted.load(Ordering::SeqCst)
    }

    async fn request_connect_permission(&self) -> PermissionOutcome {
        self.permission_requests.fetch_add(1, Ordering::SeqCst);
        if self.permission_outcome == PermissionOutcome::Granted {
            self.permitted.store(true, Ordering::SeqCst);
        }
        self.permission_outcome
    }

    async fn connect(&self, _peer: &PeerAddress, _service: Uuid) -> Result<BoxedStream, ConnectError> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        let behavior = self.behavior.lock().clone();

        match behavior {
            ConnectBehavior::Succeed => {
                let (local, remote) = tokio::io::duplex(1024);
                let _ = self.remotes.send(remote);
                Ok(Box::pin(local))
            }
            ConnectBehavior::Fail(e) => Err(e),
            ConnectBehavior::Hang => std::future::pending().await,
            ConnectBehavior::ReadError(kind) => Ok(Box::pin(FailingStream { kind })),
        }
    }
}

pub struct Harness {
    pub session: Session,
    pub transport: Arc<MockTransport>,
    pub events: mpsc::UnboundedReceiver<SessionEvent>,
    pub remotes: mpsc::UnboundedReceiver<DuplexStream>,
}

impl Harness {
    pub fn new(transport: MockTransport, remotes: mpsc::UnboundedReceiver<DuplexStream>) -> Self {
        Self::with_settings(transport, remotes, SessionSettings::new(PeerAddress::default()))
    }

    pub fn with_settings(
        transport: MockTransport,
        remotes: mpsc::UnboundedReceiver<DuplexStream>,
        settings: SessionSettings,
    ) -> Self {
        let transport = Arc::new(transport);
        let (event_tx, events) = mpsc::unbounded_channel();
        let session = Session::new(transport.clone(), settings, event_tx);
        Self {
            session,
            transport,
            events,
            remotes,
        }
    }

    /// Next event, failing the test if none arrives within a second.
    pub async fn next_event(&mut self) -> SessionEvent {
        tokio::time::timeout(Duration::from_secs(1), self.events.recv())
            .await
            .expect("timed out waiting for a session event")
            .expect("event channel closed")
    }

    /// Collect events until `done` matches one, inclusive.
    pub async fn events_until(&mut self, done: impl Fn(&SessionEvent) -> bool) -> Vec<SessionEvent> {
        let mut seen = Vec::new();
        loop {
            let event = self.next_event().await;
            let finished = done(&event);
            seen.push(event);
            if finished {
                return seen;
            }
        }
    }

    /// Drain whatever arrives within `window`.
    pub async fn drain(&mut self, window: Duration) -> Vec<SessionEvent> {
        let mut seen = Vec::new();
        while let Ok(Some(event)) = tokio::time::timeout(window, self.events.recv()).await {
            seen.push(event);
        }
        seen
    }

    /// Peer end of the most recent connection.
    pub async fn remote(&mut self) -> DuplexStream {
        tokio::time::timeout(Duration::from_secs(1), self.remotes.recv())
            .await
            .expect("timed out waiting for a connection")
            .expect("transport dropped")
    }
}
