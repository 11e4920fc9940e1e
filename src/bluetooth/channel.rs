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

//! Close coordination for a connected stream.
//!
//! The stream is split once: the read half goes to the receive loop, the
//! write half stays behind the channel's lock. Closing flips a watch flag
//! that wakes a blocked reader, then shuts the write half down.

use std::io;
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt, ReadHalf, WriteHalf};
use tokio::sync::{watch, Mutex};
use tracing::debug;

use super::transport::BoxedStream;

/// Shared handle on an open stream.
pub struct Channel {
    writer: Mutex<Option<WriteHalf<BoxedStream>>>,
    closed: watch::Sender<bool>,
}

/// Exclusive read side of a [`Channel`].
pub struct ChannelReader {
    reader: ReadHalf<BoxedStream>,
    closed: watch::Receiver<bool>,
}

impl Channel {
    /// Take ownership of a connected stream.
    pub fn open(stream: BoxedStream) -> (Arc<Channel>, ChannelReader) {
        let (reader, writer) = tokio::io::split(stream);
        let (closed_tx, closed_rx) = watch::channel(false);

        let channel = Arc::new(Channel {
            writer: Mutex::new(Some(writer)),
            closed: closed_tx,
        });
        let reader = ChannelReader {
            reader,
            closed: closed_rx,
        };

        (channel, reader)
    }

    pub fn is_closed(&self) -> bool {
        *self.closed.borrow()
    }

    /// Write all bytes to the peer.
    ///
    /// Gives up with `NotConnected` as soon as the channel is closed, so a
    /// write stuck on a peer that stopped reading never blocks [`close`].
    ///
    /// [`close`]: Channel::close
    pub async fn write_all(&self, data: &[u8]) -> io::Result<()> {
        let mut closed = self.closed.subscribe();
        if *closed.borrow() {
            return Err(not_connected());
        }

        let mut guard = tokio::select! {
            biased;
            _ = closed.wait_for(|closed| *closed) => return Err(not_connected()),
            guard = self.writer.lock() => guard,
        };
        let writer = guard.as_mut().ok_or_else(not_connected)?;

        tokio::select! {
            biased;
            _ = closed.wait_for(|closed| *closed) => Err(not_connected()),
            res = async {
                writer.write_all(data).await?;
                writer.flush().await
            } => res,
        }
    }

    /// Mark the channel closed without waiting for the write half.
    ///
    /// A blocked reader returns immediately. The socket itself is released
    /// once both halves are dropped.
    pub fn close_now(&self) {
        self.closed.send_replace(true);
    }

    /// Close the channel. Safe to call any number of times.
    pub async fn close(&self) {
        let already_closed = self.closed.send_replace(true);

        let writer = self.writer.lock().await.take();
        if let Some(mut writer) = writer {
            if let Err(e) = writer.shutdown().await {
                debug!("Ignoring error while closing channel: {}", e);
            }
        } else if already_closed {
            debug!("Channel already closed");
        }
    }
}

fn not_connected() -> io::Error {
    io::Error::new(io::ErrorKind::NotConnected, "channel closed")
}

impl ChannelReader {
    /// Read the next chunk into `buf`.
    ///
    /// Returns `Ok(None)` once the channel was closed locally and
    /// `Ok(Some(0))` when the peer ended the stream.
    pub async fn read_chunk(&mut self, buf: &mut [u8]) -> io::Result<Option<usize>> {
        if *self.closed.borrow() {
            return Ok(None);
        }

        tokio::select! {
            biased;
            _ = self.closed.wait_for(|closed| *closed) => Ok(None),
            res = self.reader.read(buf) => res.map(Some),
        }
    }
}
