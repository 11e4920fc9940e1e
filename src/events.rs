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

//! Event processing for the UI side of a session.

use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::bluetooth::{parse_distance_cm, ConnectionState, SessionEvent};
use crate::state::AppState;

/// Applies session events to [`AppState`] and renders display text.
pub struct EventProcessor {
    state: Arc<AppState>,
}

impl EventProcessor {
    /// Create a new event processor.
    pub fn new(state: Arc<AppState>) -> Self {
        Self { state }
    }

    /// Process a single event.
    ///
    /// Returns the text to show for it, if any.
    pub fn process_event(&mut self, event: SessionEvent) -> Option<String> {
        match event {
            SessionEvent::StateChanged(state) => {
                info!("Connection state: {}", state);
                let message = match &state {
                    // The failure reason stays on screen after the
                    // follow-up Disconnected.
                    ConnectionState::Disconnected
                        if matches!(self.state.get_state(), ConnectionState::Failed(_)) =>
                    {
                        None
                    }
                    other => Some(other.to_string()),
                };
                self.state.set_state(state);
                if let Some(message) = &message {
                    self.state.set_status(message.clone());
                }
                message
            }
            SessionEvent::Line(text) => {
                if parse_distance_cm(&text).is_none() {
                    debug!("Reading is not a plain number: {:?}", text);
                }
                let display = format!("{} cm", text);
                self.state.set_last_reading(text);
                Some(display)
            }
            SessionEvent::ConnectionLost(detail) => {
                let message = match detail {
                    Some(detail) => format!("Connection lost: {}", detail),
                    None => "Connection lost".to_string(),
                };
                warn!("{}", message);
                self.state.set_status(message.clone());
                Some(message)
            }
            SessionEvent::Declined(reason) => {
                warn!("Connect request declined: {}", reason);
                self.state.set_status(reason.clone());
                Some(reason)
            }
            SessionEvent::Unsupported => {
                let message = "Bluetooth is not supported on this device".to_string();
                self.state.set_unsupported();
                self.state.set_status(message.clone());
                Some(message)
            }
        }
    }
}
