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

//! Bluetooth communication module.
//!
//! Handles the RFCOMM client connection to the serial module and the
//! receive loop that turns its output into lines.

mod adapter;
mod channel;
mod connection;
mod framing;
mod transport;

pub use adapter::BluerTransport;
pub use channel::{Channel, ChannelReader};
pub use connection::{
    ConnectionState, Session, SessionError, SessionEvent, SessionSettings, DEFAULT_READ_BUFFER,
};
pub use framing::{decode_chunk, parse_distance_cm, Framing, LineDecoder, MAX_PENDING_RECORD};
pub use transport::{
    BoxedStream, ConnectError, DuplexStream, EnableOutcome, PeerAddress, PermissionOutcome,
    Transport, SPP_UUID,
};
