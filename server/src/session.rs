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

//! Debug session management
//!
//! Each connected debugger is tracked by a [`DebugSession`] owned by the
//! server. Outbound messages are handed to the connection's writer task
//! through a shared [`SessionOutbox`]; the tick thread never waits on the
//! network.

use chrono::{DateTime, Utc};
use metrics::counter;
use std::collections::{BTreeSet, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use thicket_common::{DebugMessage, EntityId, MessageKind, MessageKinds, ZoneId};
use tokio::sync::Notify;
use uuid::Uuid;

/// Bounded FIFO of messages waiting to be written.
///
/// When full, the oldest state delta is discarded to make room; if the queue
/// holds no state delta the oldest message goes instead.
#[derive(Debug)]
pub struct OutboundQueue {
    messages: VecDeque<DebugMessage>,
    capacity: usize,
    dropped: u64,
}

impl OutboundQueue {
    pub fn new(capacity: usize) -> Self {
        Self {
            messages: VecDeque::new(),
            capacity: capacity.max(1),
            dropped: 0,
        }
    }

    /// Queue a message. Returns true if an older message was discarded.
    pub fn push(&mut self, message: DebugMessage) -> bool {
        let mut discarded = false;
        if self.messages.len() >= self.capacity {
            let victim = self
                .messages
                .iter()
                .position(DebugMessage::is_state_delta)
                .unwrap_or(0);
            self.messages.remove(victim);
            self.dropped += 1;
            discarded = true;
        }
        self.messages.push_back(message);
        discarded
    }

    pub fn drain(&mut self) -> Vec<DebugMessage> {
        self.messages.drain(..).collect()
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Total messages discarded over the queue's lifetime
    pub fn dropped(&self) -> u64 {
        self.dropped
    }
}

/// Handoff point between the tick thread and a connection's writer task
#[derive(Debug)]
pub struct SessionOutbox {
    queue: Mutex<OutboundQueue>,
    notify: Notify,
    closed: AtomicBool,
}

impl SessionOutbox {
    pub fn new(capacity: usize) -> Self {
        Self {
            queue: Mutex::new(OutboundQueue::new(capacity)),
            notify: Notify::new(),
            closed: AtomicBool::new(false),
        }
    }

    fn lock(&self) -> MutexGuard<'_, OutboundQueue> {
        self.queue.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Queue a message for the writer. Messages pushed after close are discarded.
    pub fn push(&self, message: DebugMessage) {
        if self.is_closed() {
            return;
        }
        let (discarded, dropped) = {
            let mut queue = self.lock();
            let discarded = queue.push(message);
            (discarded, queue.dropped())
        };
        if discarded {
            counter!("thicket.session.dropped_messages").increment(1);
            tracing::debug!("Outbound queue full, discarded oldest message ({} total)", dropped);
        }
        self.notify.notify_one();
    }

    pub fn take_all(&self) -> Vec<DebugMessage> {
        self.lock().drain()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn dropped(&self) -> u64 {
        self.lock().dropped()
    }

    /// Wait until a message is pushed or the outbox is closed
    pub async fn notified(&self) {
        self.notify.notified().await
    }

    /// Discard pending messages and wake the writer so it can shut down
    pub fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
        self.lock().drain();
        self.notify.notify_one();
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

/// Server-side state of one connected debugger
#[derive(Debug)]
pub struct DebugSession {
    id: Uuid,
    peer: String,
    /// Zone whose updates this session receives
    pub zone: Option<ZoneId>,
    /// Entity whose details this session inspects
    pub selected: Option<EntityId>,
    /// Zones this session paused; they resume when it disconnects
    pub paused_zones: BTreeSet<ZoneId>,
    pub kinds: MessageKinds,
    outbox: Arc<SessionOutbox>,
    created_at: DateTime<Utc>,
    last_activity: DateTime<Utc>,
}

impl DebugSession {
    pub fn new(id: Uuid, peer: impl Into<String>, outbox: Arc<SessionOutbox>) -> Self {
        let now = Utc::now();
        Self {
            id,
            peer: peer.into(),
            zone: None,
            selected: None,
            paused_zones: BTreeSet::new(),
            kinds: MessageKinds::full(),
            outbox,
            created_at: now,
            last_activity: now,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn peer(&self) -> &str {
        &self.peer
    }

    pub fn outbox(&self) -> &Arc<SessionOutbox> {
        &self.outbox
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn last_activity(&self) -> DateTime<Utc> {
        self.last_activity
    }

    pub fn touch(&mut self) {
        self.last_activity = Utc::now();
    }

    pub fn is_expired(&self, timeout_seconds: i64) -> bool {
        let elapsed = Utc::now().signed_duration_since(self.last_activity);
        elapsed.num_seconds() > timeout_seconds
    }

    /// True while this session holds at least one zone paused
    pub fn is_paused(&self) -> bool {
        !self.paused_zones.is_empty()
    }

    pub fn is_subscribed(&self, zone: ZoneId) -> bool {
        self.zone == Some(zone)
    }

    /// Deliver a message if the session subscribed to its kind. Nacks are always delivered.
    pub fn send(&self, message: DebugMessage) {
        let kind = message.kind();
        if kind == MessageKind::Nack || self.kinds.contains(kind) {
            self.outbox.push(message);
        }
    }
}
