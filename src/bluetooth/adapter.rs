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

//! BlueZ RFCOMM client transport.

use async_trait::async_trait;
use bluer::rfcomm::{Profile, ProfileHandle, ReqError, Role, SocketAddr, Stream};
use bluer::{Adapter, Address, ErrorKind};
use futures::StreamExt;
use pin_project_lite::pin_project;
use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::transport::{BoxedStream, ConnectError, EnableOutcome, PeerAddress, Transport};
use crate::config::BluetoothConfig;

/// How long to wait for the RFCOMM connection once the peer acknowledged the
/// profile connect.
const PROFILE_ACCEPT_TIMEOUT: Duration = Duration::from_secs(10);

pin_project! {
    /// RFCOMM stream obtained through a registered profile.
    ///
    /// The profile stays registered for as long as the stream lives.
    struct ProfileStream {
        #[pin]
        stream: Stream,
        _profile: ProfileHandle,
    }
}

impl AsyncRead for ProfileStream {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        self.project().stream.poll_read(cx, buf)
    }
}

impl AsyncWrite for ProfileStream {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        self.project().stream.poll_write(cx, buf)
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        self.project().stream.poll_flush(cx)
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        self.project().stream.poll_shutdown(cx)
    }
}

/// Transport backed by the BlueZ daemon.
pub struct BluerTransport {
    session: Option<bluer::Session>,
    adapter: Option<Adapter>,
    rfcomm_channel: Option<u8>,
    allow_power_on: bool,
}

impl BluerTransport {
    /// Open a BlueZ session on the default adapter.
    ///
    /// A missing daemon or adapter is not an error here; the transport then
    /// reports itself as unsupported.
    pub async fn new(config: &BluetoothConfig) -> Self {
        info!("Initializing Bluetooth transport...");

        let (session, adapter) = match bluer::Session::new().await {
            Ok(session) => {
                info!("BlueZ session created");
                match session.default_adapter().await {
                    Ok(adapter) => {
                        info!("Using Bluetooth adapter: {}", adapter.name());
                        (Some(session), Some(adapter))
                    }
                    Err(e) => {
                        warn!("No Bluetooth adapter: {}", e);
                        (Some(session), None)
                    }
                }
            }
            Err(e) => {
                warn!("Cannot reach BlueZ: {}", e);
                (None, None)
            }
        };

        Self {
            session,
            adapter,
            rfcomm_channel: config.rfcomm_channel,
            allow_power_on: config.allow_power_on,
        }
    }

    fn adapter(&self) -> Result<&Adapter, ConnectError> {
        self.adapter.as_ref().ok_or(ConnectError::AdapterUnavailable)
    }

    /// Connect straight to a known RFCOMM channel.
    async fn connect_channel(&self, address: Address, channel: u8) -> Result<BoxedStream, ConnectError> {
        info!("Connecting to {} on RFCOMM channel {}", address, channel);
        let stream = Stream::connect(SocketAddr::new(address, channel)).await?;
        Ok(Box::pin(stream))
    }

    /// Connect through an SDP lookup of `service` on the peer.
    async fn connect_profile(&self, address: Address, service: Uuid) -> Result<BoxedStream, ConnectError> {
        let session = self.session.as_ref().ok_or(ConnectError::AdapterUnavailable)?;
        let device = self.adapter()?.device(address).map_err(map_bluer_error)?;

        let profile = Profile {
            uuid: service,
            role: Some(Role::Client),
            require_authentication: Some(false),
            require_authorization: Some(false),
            auto_connect: Some(false),
            ..Default::default()
        };
        let mut handle = session
            .register_profile(profile)
            .await
            .map_err(map_bluer_error)?;
        debug!("Registered client profile for {}", service);

        info!("Looking up service {} on {}", service, address);
        let connect = device.connect_profile(&service);
        tokio::pin!(connect);
        let mut connect_done = false;
        let mut accept_deadline = tokio::time::Instant::now();

        let request = loop {
            tokio::select! {
                res = &mut connect, if !connect_done => {
                    connect_done = true;
                    res.map_err(map_bluer_error)?;
                    debug!("Profile connect acknowledged by {}", address);
                    accept_deadline = tokio::time::Instant::now() + PROFILE_ACCEPT_TIMEOUT;
                }
                _ = tokio::time::sleep_until(accept_deadline), if connect_done => {
                    return Err(ConnectError::PeerUnreachable(format!(
                        "no RFCOMM connection from {} within {} s",
                        address,
                        PROFILE_ACCEPT_TIMEOUT.as_secs()
                    )));
                }
                req = handle.next() => {
                    let req = req.ok_or_else(|| {
                        ConnectError::IoFailure("profile unregistered".to_string())
                    })?;
                    if req.device() == address {
                        break req;
                    }
                    debug!("Rejecting connection from {}", req.device());
                    req.reject(ReqError::Rejected);
                }
            }
        };

        let stream = request.accept().map_err(map_bluer_error)?;
        Ok(Box::pin(ProfileStream {
            stream,
            _profile: handle,
        }))
    }
}

#[async_trait]
impl Transport for BluerTransport {
    fn name(&self) -> &'static str {
        "BlueZ"
    }

    async fn is_supported(&self) -> bool {
        self.adapter.is_some()
    }

    async fn is_enabled(&self) -> bool {
        match &self.adapter {
            Some(adapter) => adapter.is_powered().await.unwrap_or(false),
            None => false,
        }
    }

    async fn request_enable(&self) -> EnableOutcome {
        let Some(adapter) = &self.adapter else {
            return EnableOutcome::Declined;
        };
        if !self.allow_power_on {
            warn!("Adapter is powered off and powering it on is not allowed");
            return EnableOutcome::Declined;
        }

        info!("Powering on Bluetooth adapter...");
        match adapter.set_powered(true).await {
            Ok(()) => EnableOutcome::Enabled,
            Err(e) => {
                warn!("Failed to power on adapter: {}", e);
                EnableOutcome::Declined
            }
        }
    }

    async fn connect(&self, peer: &PeerAddress, service: Uuid) -> Result<BoxedStream, ConnectError> {
        let adapter = self.adapter()?;
        let address: Address = peer
            .as_str()
            .parse()
            .map_err(|_| ConnectError::PeerUnreachable(format!("invalid address '{}'", peer)))?;

        // Inquiry starves connection attempts on the classic stack. BlueZ only
        // lets the client that started a discovery stop it, and we never start
        // one, so all we can do here is report it.
        if adapter.is_discovering().await.unwrap_or(false) {
            warn!("Adapter is discovering; another client holds a discovery session");
        }

        match self.rfcomm_channel {
            Some(channel) => self.connect_channel(address, channel).await,
            None => self.connect_profile(address, service).await,
        }
    }
}

fn map_bluer_error(e: bluer::Error) -> ConnectError {
    match e.kind {
        ErrorKind::NotReady => ConnectError::AdapterUnavailable,
        ErrorKind::NotAuthorized | ErrorKind::NotPermitted => ConnectError::PermissionDenied,
        ErrorKind::DoesNotExist
        | ErrorKind::NotAvailable
        | ErrorKind::ConnectionAttemptFailed
        | ErrorKind::AuthenticationFailed
        | ErrorKind::AuthenticationRejected
        | ErrorKind::AuthenticationTimeout => ConnectError::PeerUnreachable(e.message),
        _ => ConnectError::IoFailure(e.message),
    }
}
