//
// Copyright 2025-2026 Hans W. Uhlig. All Rights Reserved.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//      http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
//

//! Debug protocol listener
//!
//! Accepts debugger connections over TCP. Every connection gets a session id
//! and an outbox; a reader task forwards decoded requests to the tick thread
//! and a writer task drains the outbox onto the socket.

use crate::error::AiError;
use crate::session::SessionOutbox;
use crate::tick::{ServerCommand, ServerHandle};
use futures::{SinkExt, StreamExt};
use metrics::counter;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use thicket_common::codec::DEFAULT_MAX_FRAME_LENGTH;
use thicket_common::DebugCodec;
use tokio::net::{TcpListener, TcpStream};
use tokio_util::codec::{FramedRead, FramedWrite};
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct ListenerSettings {
    pub max_frame_length: usize,
    /// Connections silent for this long are closed
    pub idle_timeout: Duration,
    /// Outbound messages buffered per session before the oldest are dropped
    pub outbound_capacity: usize,
}

impl Default for ListenerSettings {
    fn default() -> Self {
        Self {
            max_frame_length: DEFAULT_MAX_FRAME_LENGTH,
            idle_timeout: Duration::from_secs(300),
            outbound_capacity: 1024,
        }
    }
}

#[derive(Debug, Clone)]
pub struct DebugListener {
    handle: ServerHandle,
    settings: ListenerSettings,
}

impl DebugListener {
    pub fn new(handle: ServerHandle, settings: ListenerSettings) -> Self {
        Self { handle, settings }
    }

    /// Accept connections until the listener fails
    pub async fn serve(self, listener: TcpListener) -> std::io::Result<()> {
        tracing::info!("Debug listener accepting connections on {}", listener.local_addr()?);

        loop {
            match listener.accept().await {
                Ok((stream, peer)) => {
                    tracing::info!("New debug connection from {}", peer);
                    counter!("thicket.connections").increment(1);

                    let listener = self.clone();
                    tokio::spawn(async move {
                        if let Err(e) = listener.handle_connection(stream, peer).await {
                            tracing::warn!("Debug connection from {} failed: {}", peer, e);
                        }
                    });
                }
                Err(e) => {
                    tracing::error!("Error accepting debug connection: {}", e);
                }
            }
        }
    }

    #[tracing::instrument(level = "debug", skip(self, stream))]
    async fn handle_connection(&self, stream: TcpStream, peer: SocketAddr) -> std::io::Result<()> {
        let session_id = Uuid::new_v4();
        let outbox = Arc::new(SessionOutbox::new(self.settings.outbound_capacity));

        let snapshot = self.handle.snapshot();
        tracing::info!(
            "Created session {} for {} ({} zones, {} entities at tick {})",
            session_id,
            peer,
            snapshot.zones.len(),
            snapshot.entity_count(),
            snapshot.tick
        );

        if !self.handle.send(ServerCommand::Connect {
            session_id,
            peer: peer.to_string(),
            outbox: outbox.clone(),
        }) {
            tracing::warn!("Tick loop stopped; refusing {}", peer);
            return Ok(());
        }

        let (read_half, write_half) = stream.into_split();
        let mut frames = FramedRead::new(
            read_half,
            DebugCodec::new(self.settings.max_frame_length),
        );
        let mut sink = FramedWrite::new(
            write_half,
            DebugCodec::new(self.settings.max_frame_length),
        );

        let writer = {
            let outbox = outbox.clone();
            async move {
                loop {
                    for message in outbox.take_all() {
                        sink.feed(message).await?;
                    }
                    sink.flush().await?;
                    if outbox.is_closed() {
                        return Ok::<(), std::io::Error>(());
                    }
                    outbox.notified().await;
                }
            }
        };

        let reader = async {
            loop {
                let frame = match tokio::time::timeout(self.settings.idle_timeout, frames.next()).await {
                    Ok(Some(frame)) => frame?,
                    Ok(None) => {
                        tracing::debug!("Session {} closed by peer", session_id);
                        return Ok::<(), std::io::Error>(());
                    }
                    Err(_) => {
                        tracing::info!("Session {} idle; closing", session_id);
                        return Ok(());
                    }
                };

                match frame {
                    Ok(message) => {
                        if !self.handle.send(ServerCommand::Client {
                            session_id,
                            message,
                        }) {
                            return Ok(());
                        }
                    }
                    Err(error) => {
                        tracing::warn!("Session {} sent a malformed frame: {}", session_id, error);
                        counter!("thicket.decode_errors").increment(1);
                        outbox.push(AiError::from(error).to_nack());
                    }
                }
            }
        };

        let result = tokio::select! {
            result = reader => result,
            result = writer => result,
        };

        self.handle.send(ServerCommand::Disconnect { session_id });
        outbox.close();
        tracing::info!("Debug connection closed: {}", peer);
        result
    }
}
