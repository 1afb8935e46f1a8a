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

//! Tick thread
//!
//! The [`Server`] is owned by a single dedicated thread. Network tasks talk to
//! it through a [`ServerHandle`]: commands go in over an unbounded channel and
//! are applied at the start of the next tick, and world snapshots come back
//! over a watch channel.

use crate::server::{Server, TickReport};
use crate::session::SessionOutbox;
use crate::snapshot::WorldSnapshot;
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};
use thicket_common::DebugMessage;
use tokio::sync::{mpsc, watch};
use uuid::Uuid;

#[derive(Debug)]
pub enum ServerCommand {
    Connect {
        session_id: Uuid,
        peer: String,
        outbox: Arc<SessionOutbox>,
    },
    Client {
        session_id: Uuid,
        message: DebugMessage,
    },
    Disconnect {
        session_id: Uuid,
    },
    Shutdown,
}

/// Cloneable handle for talking to the tick thread
#[derive(Debug, Clone)]
pub struct ServerHandle {
    commands: mpsc::UnboundedSender<ServerCommand>,
    snapshots: watch::Receiver<Arc<WorldSnapshot>>,
}

impl ServerHandle {
    /// Queue a command. Returns false once the tick loop has stopped.
    pub fn send(&self, command: ServerCommand) -> bool {
        self.commands.send(command).is_ok()
    }

    pub fn snapshot(&self) -> Arc<WorldSnapshot> {
        self.snapshots.borrow().clone()
    }

    pub fn shutdown(&self) {
        self.send(ServerCommand::Shutdown);
    }

    /// Wait for the next published snapshot
    pub async fn wait_for_tick(&mut self) -> Option<Arc<WorldSnapshot>> {
        self.snapshots.changed().await.ok()?;
        Some(self.snapshots.borrow_and_update().clone())
    }
}

pub struct TickLoop {
    server: Server,
    commands: mpsc::UnboundedReceiver<ServerCommand>,
    tick: Duration,
    idle_timeout_seconds: i64,
    stopped: bool,
}

impl TickLoop {
    pub fn new(server: Server, tick: Duration) -> (TickLoop, ServerHandle) {
        let (sender, commands) = mpsc::unbounded_channel();
        let handle = ServerHandle {
            commands: sender,
            snapshots: server.subscribe_snapshots(),
        };
        let tick_loop = TickLoop {
            server,
            commands,
            tick,
            idle_timeout_seconds: 300,
            stopped: false,
        };
        (tick_loop, handle)
    }

    pub fn with_idle_timeout(mut self, seconds: i64) -> Self {
        self.idle_timeout_seconds = seconds;
        self
    }

    pub fn server(&self) -> &Server {
        &self.server
    }

    pub fn server_mut(&mut self) -> &mut Server {
        &mut self.server
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped
    }

    /// Apply every queued command, then advance the simulation one tick.
    ///
    /// Returns `None` once a shutdown command has been received.
    pub fn run_once(&mut self) -> Option<TickReport> {
        while let Ok(command) = self.commands.try_recv() {
            self.apply(command);
            if self.stopped {
                return None;
            }
        }

        let report = self.server.tick(self.tick);
        self.server.expire_sessions(self.idle_timeout_seconds);
        Some(report)
    }

    fn apply(&mut self, command: ServerCommand) {
        match command {
            ServerCommand::Connect {
                session_id,
                peer,
                outbox,
            } => self.server.connect_session(session_id, peer, outbox),
            ServerCommand::Client {
                session_id,
                message,
            } => {
                // Rejections are already answered with a nack
                let _ = self.server.handle_message(session_id, message);
            }
            ServerCommand::Disconnect { session_id } => {
                if let Err(error) = self.server.disconnect_session(session_id) {
                    tracing::debug!("Ignoring disconnect: {}", error);
                }
            }
            ServerCommand::Shutdown => {
                tracing::info!("Tick loop received shutdown");
                self.stopped = true;
            }
        }
    }

    /// Run ticks at a fixed rate on a dedicated thread until shutdown.
    ///
    /// The thread hands the server back when it exits.
    pub fn spawn(mut self) -> std::io::Result<JoinHandle<Server>> {
        std::thread::Builder::new()
            .name("thicket-tick".to_string())
            .spawn(move || {
                tracing::info!("Tick loop started at {:?} per tick", self.tick);
                let mut next = Instant::now() + self.tick;
                while self.run_once().is_some() {
                    let now = Instant::now();
                    if next > now {
                        std::thread::sleep(next - now);
                        next += self.tick;
                    } else {
                        tracing::trace!("Tick overran by {:?}", now - next);
                        next = now + self.tick;
                    }
                }
                tracing::info!("Tick loop stopped after {} ticks", self.server.tick_count());
                self.server
            })
    }
}
