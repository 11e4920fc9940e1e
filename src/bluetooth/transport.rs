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

//! Transport abstraction over the platform Bluetooth stack.
//!
//! A [`Transport`] answers "can we connect, and if so, give me a stream".
//! The session only talks to this trait, so tests substitute an in-memory
//! implementation for the BlueZ one.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::pin::Pin;
use std::time::Duration;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncWrite};
use uuid::Uuid;

use super::channel::Channel;

/// Standard SPP UUID.
pub const SPP_UUID: Uuid = Uuid::from_u128(0x00001101_0000_1000_8000_00805F9B34FB);

/// Hardware address of the peripheral, e.g. `"00:11:22:33:44:55"`.
///
/// Kept as an opaque string. A malformed value is only detected when a
/// connect is attempted.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PeerAddress(String);

impl PeerAddress {
    pub fn new(address: impl Into<String>) -> Self {
        Self(address.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for PeerAddress {
    fn default() -> Self {
        Self::new("00:11:22:33:44:55")
    }
}

impl fmt::Display for PeerAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Byte channel returned by a successful connect.
pub trait DuplexStream: AsyncRead + AsyncWrite + Send {}

impl<T: AsyncRead + AsyncWrite + Send> DuplexStream for T {}

/// Owned, pinned duplex stream.
pub type BoxedStream = Pin<Box<dyn DuplexStream>>;

/// Result of asking the user/platform to enable the adapter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnableOutcome {
    Enabled,
    Declined,
}

/// Result of a runtime permission request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PermissionOutcome {
    Granted,
    Denied,
}

/// Reasons a connect attempt can fail.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConnectError {
    #[error("Bluetooth adapter unavailable")]
    AdapterUnavailable,
    #[error("Bluetooth permission denied")]
    PermissionDenied,
    #[error("peer unreachable: {0}")]
    PeerUnreachable(String),
    #[error("I/O failure: {0}")]
    IoFailure(String),
}

impl From<std::io::Error> for ConnectError {
    fn from(e: std::io::Error) -> Self {
        use std::io::ErrorKind;

        match e.kind() {
            ErrorKind::PermissionDenied => ConnectError::PermissionDenied,
            ErrorKind::ConnectionRefused
            | ErrorKind::TimedOut
            | ErrorKind::NotFound
            | ErrorKind::AddrNotAvailable => ConnectError::PeerUnreachable(e.to_string()),
            _ => ConnectError::IoFailure(e.to_string()),
        }
    }
}

/// Platform Bluetooth capabilities needed by a session.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Get the backend name (e.g., "BlueZ").
    fn name(&self) -> &'static str;

    /// Whether a local adapter exists at all.
    async fn is_supported(&self) -> bool;

    /// Whether the adapter is powered on.
    async fn is_enabled(&self) -> bool;

    /// Ask for the adapter to be enabled. Resolves once the user/platform answered.
    async fn request_enable(&self) -> EnableOutcome;

    /// Whether connect capability is granted. Platforms without a runtime
    /// permission model always grant it.
    async fn has_connect_permission(&self) -> bool {
        true
    }

    /// Ask for connect capability.
    async fn request_connect_permission(&self) -> PermissionOutcome {
        PermissionOutcome::Granted
    }

    /// Open an RFCOMM channel to `peer` for the given service record.
    async fn connect(&self, peer: &PeerAddress, service: Uuid) -> Result<BoxedStream, ConnectError>;

    /// [`Transport::connect`] bounded by an optional timeout.
    async fn connect_with_timeout(
        &self,
        peer: &PeerAddress,
        service: Uuid,
        timeout: Option<Duration>,
    ) -> Result<BoxedStream, ConnectError> {
        match timeout {
            Some(limit) => tokio::time::timeout(limit, self.connect(peer, service))
                .await
                .unwrap_or_else(|_| {
                    Err(ConnectError::PeerUnreachable(format!(
                        "timed out after {} ms",
                        limit.as_millis()
                    )))
                }),
            None => self.connect(peer, service).await,
        }
    }

    /// Close a connected channel. Idempotent, never fails.
    async fn close(&self, channel: &Channel) {
        channel.close().await;
    }
}
