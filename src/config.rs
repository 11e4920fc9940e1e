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

//! Configuration module.
//!
//! Handles loading application settings.

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use uuid::Uuid;

use crate::bluetooth::{Framing, PeerAddress, DEFAULT_READ_BUFFER, SPP_UUID};

/// Smallest accepted receive buffer.
pub const MIN_READ_BUFFER: usize = 16;

/// Largest accepted receive buffer.
pub const MAX_READ_BUFFER: usize = 64 * 1024;

/// Application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Bluetooth settings.
    pub bluetooth: BluetoothConfig,

    /// Receive loop settings.
    pub receive: ReceiveConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BluetoothConfig {
    /// Hardware address of the serial module.
    pub peer_address: PeerAddress,

    /// Service record to look up on the peer.
    pub service_uuid: Uuid,

    /// Connect to this RFCOMM channel directly instead of looking up the
    /// service record.
    pub rfcomm_channel: Option<u8>,

    /// Give up on a connect attempt after this many seconds.
    pub connect_timeout_secs: Option<u64>,

    /// Power on the adapter when it is off.
    pub allow_power_on: bool,

    /// Connect right after startup.
    pub auto_connect: bool,
}

impl Default for BluetoothConfig {
    fn default() -> Self {
        Self {
            peer_address: PeerAddress::default(),
            service_uuid: SPP_UUID,
            rfcomm_channel: None,
            connect_timeout_secs: None,
            allow_power_on: true,
            auto_connect: false,
        }
    }
}

impl BluetoothConfig {
    pub fn connect_timeout(&self) -> Option<Duration> {
        self.connect_timeout_secs
            .filter(|secs| *secs > 0)
            .map(Duration::from_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReceiveConfig {
    /// Bytes requested per read.
    pub buffer_size: usize,

    /// How received bytes become lines.
    pub framing: Framing,
}

impl Default for ReceiveConfig {
    fn default() -> Self {
        Self {
            buffer_size: DEFAULT_READ_BUFFER,
            framing: Framing::Chunk,
        }
    }
}

impl Config {
    /// Default location of the configuration file.
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("spp-distance")
            .join("config.toml")
    }

    /// Load configuration from the default file, or defaults if there is none.
    pub fn load() -> Result<Self> {
        let config_path = Self::default_path();

        if config_path.exists() {
            Self::load_from(&config_path)
        } else {
            let config = Self::default();
            config.validate()?;
            Ok(config)
        }
    }

    /// Load configuration from a specific file.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        let config: Self =
            toml::from_str(&content).with_context(|| format!("parsing {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if !(MIN_READ_BUFFER..=MAX_READ_BUFFER).contains(&self.receive.buffer_size) {
            bail!(
                "receive.buffer_size must be between {} and {} bytes, got {}",
                MIN_READ_BUFFER,
                MAX_READ_BUFFER,
                self.receive.buffer_size
            );
        }
        if self.bluetooth.peer_address.as_str().trim().is_empty() {
            bail!("bluetooth.peer_address must not be empty");
        }
        Ok(())
    }
}
