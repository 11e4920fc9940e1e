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

//! Application state management.

use chrono::{DateTime, Local};
use parking_lot::RwLock;
use std::sync::Arc;

use crate::bluetooth::ConnectionState;

/// Last reading shown to the user.
#[derive(Debug, Clone, PartialEq)]
pub struct Reading {
    pub text: String,
    pub received_at: DateTime<Local>,
}

/// State as observed by the UI.
#[derive(Debug)]
pub struct AppState {
    /// Current connection state.
    pub connection_state: RwLock<ConnectionState>,

    /// Whether the connect action is actionable.
    pub connect_enabled: RwLock<bool>,

    /// Bluetooth is missing on this machine.
    pub unsupported: RwLock<bool>,

    /// Human-readable status line.
    pub status_message: RwLock<String>,

    /// Last received reading.
    pub last_reading: RwLock<Option<Reading>>,
}

impl Default for AppState {
    fn default() -> Self {
        Self {
            connection_state: RwLock::new(ConnectionState::Disconnected),
            connect_enabled: RwLock::new(true),
            unsupported: RwLock::new(false),
            status_message: RwLock::new(ConnectionState::Disconnected.to_string()),
            last_reading: RwLock::new(None),
        }
    }
}

impl AppState {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn set_state(&self, state: ConnectionState) {
        let connect_enabled = match state {
            ConnectionState::Disconnected | ConnectionState::Failed(_) => !self.is_unsupported(),
            ConnectionState::Connecting => false,
            ConnectionState::Connected => true,
        };
        *self.connect_enabled.write() = connect_enabled;
        *self.connection_state.write() = state;
    }

    pub fn get_state(&self) -> ConnectionState {
        self.connection_state.read().clone()
    }

    pub fn is_connected(&self) -> bool {
        *self.connection_state.read() == ConnectionState::Connected
    }

    pub fn set_unsupported(&self) {
        *self.unsupported.write() = true;
        *self.connect_enabled.write() = false;
    }

    pub fn is_unsupported(&self) -> bool {
        *self.unsupported.read()
    }

    pub fn is_connect_enabled(&self) -> bool {
        *self.connect_enabled.read()
    }

    pub fn set_status(&self, message: impl Into<String>) {
        *self.status_message.write() = message.into();
    }

    pub fn get_status(&self) -> String {
        self.status_message.read().clone()
    }

    pub fn set_last_reading(&self, text: String) {
        *self.last_reading.write() = Some(Reading {
            text,
            received_at: Local::now(),
        });
    }

    pub fn get_last_reading(&self) -> Option<Reading> {
        self.last_reading.read().clone()
    }
}
