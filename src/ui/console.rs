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

//! Line-oriented console front end.

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::state::AppState;

/// Actions that can be triggered from the console.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UiAction {
    /// The connect/disconnect button.
    Toggle,
    Connect,
    Disconnect,
    Status,
    Quit,
}

/// Map one input line to an action. An empty line presses the button.
pub fn parse_action(line: &str) -> Option<UiAction> {
    match line.trim().to_lowercase().as_str() {
        "" | "t" | "toggle" => Some(UiAction::Toggle),
        "c" | "connect" => Some(UiAction::Connect),
        "d" | "disconnect" => Some(UiAction::Disconnect),
        "s" | "status" => Some(UiAction::Status),
        "q" | "quit" | "exit" => Some(UiAction::Quit),
        _ => None,
    }
}

/// Label of the connect/disconnect button for the current state.
pub fn button_label(state: &AppState) -> &'static str {
    if state.is_connected() {
        "Disconnect"
    } else {
        "Connect"
    }
}

/// One-line summary of the application state.
pub fn render_status(state: &AppState) -> String {
    let action = if state.is_connect_enabled() {
        format!("[Enter: {}]", button_label(state))
    } else {
        "[unavailable]".to_string()
    };

    match state.get_last_reading() {
        Some(reading) => format!(
            "{} | last reading {} cm at {} {}",
            state.get_status(),
            reading.text,
            reading.received_at.format("%H:%M:%S"),
            action
        ),
        None => format!("{} {}", state.get_status(), action),
    }
}

/// Read actions from stdin on a background task.
pub fn run_console() -> mpsc::UnboundedReceiver<UiAction> {
    let (action_tx, action_rx) = mpsc::unbounded_channel();

    tokio::spawn(async move {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();

        loop {
            match lines.next_line().await {
                Ok(Some(line)) => match parse_action(&line) {
                    Some(action) => {
                        debug!("Console action: {:?}", action);
                        if action_tx.send(action).is_err() {
                            break;
                        }
                    }
                    None => warn!("Unknown command: {}", line.trim()),
                },
                Ok(None) => {
                    debug!("Console input closed");
                    break;
                }
                Err(e) => {
                    warn!("Console read error: {}", e);
                    break;
                }
            }
        }
    });

    info!("Console started");
    action_rx
}
