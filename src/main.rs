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

//! SPP Distance terminal application

use anyhow::Result;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use spp_distance::bluetooth::{BluerTransport, Session, SessionEvent, SessionSettings};
use spp_distance::config::Config;
use spp_distance::events::EventProcessor;
use spp_distance::state::AppState;
use spp_distance::ui::{self, UiAction};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("spp_distance=info".parse()?),
        )
        .init();

    info!("Starting SPP Distance v{}...", env!("CARGO_PKG_VERSION"));

    // Load configuration
    let config = match std::env::args_os().nth(1) {
        Some(path) => Config::load_from(&PathBuf::from(path))?,
        None => Config::load()?,
    };
    info!("Configuration loaded, peer {}", config.bluetooth.peer_address);

    let transport = Arc::new(BluerTransport::new(&config.bluetooth).await);

    let (event_tx, mut event_rx) = mpsc::unbounded_channel::<SessionEvent>();
    let session = Session::new(transport, SessionSettings::from_config(&config), event_tx);

    let state = AppState::new();
    let mut processor = EventProcessor::new(state.clone());

    // The connect action starts out disabled without an adapter.
    if !session.check_support().await {
        if let Ok(event) = event_rx.try_recv() {
            if let Some(text) = processor.process_event(event) {
                println!("{}", text);
            }
        }
    }

    let mut action_rx = ui::run_console();
    println!("{}", ui::render_status(&state));

    if config.bluetooth.auto_connect {
        session.request_connect();
    }

    loop {
        tokio::select! {
            Some(event) = event_rx.recv() => {
                if let Some(text) = processor.process_event(event) {
                    println!("{}", text);
                }
            }
            Some(action) = action_rx.recv() => {
                match action {
                    UiAction::Toggle => session.toggle().await,
                    UiAction::Connect => session.request_connect(),
                    UiAction::Disconnect => session.request_disconnect().await,
                    UiAction::Status => println!("{}", ui::render_status(&state)),
                    UiAction::Quit => {
                        info!("Quit requested");
                        break;
                    }
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Shutdown signal received");
                break;
            }
        }
    }

    session.shutdown().await;
    info!("SPP Distance stopped");
    Ok(())
}
