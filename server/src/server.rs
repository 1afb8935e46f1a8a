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

//! AI Server
//!
//! The [`Server`] owns every zone, AI context and debug session. It is driven
//! by a single thread: trees are ticked, client requests are applied and
//! outbound protocol messages are built here, then handed to each session's
//! outbox for the network layer to write.
//!
//! ## Zone Lifecycle
//!
//! ```text
//!  add_zone ──▶ Idle ──start_zone / Pause(false)──▶ Running
//!                 │                                  ▲  │
//!            Pause(true)                  Pause(false)│  │Pause(true)
//!                 ▼                                  │  ▼
//!               Paused ◀──────────────────────────── Paused
//!                 │ Step: exactly one tick on the next boundary
//! ```

use crate::ai::aggro::AggroConfig;
use crate::ai::context::{AIContext, CharacterDynamic, CharacterStatic};
use crate::ai::action::CustomAction;
use crate::ai::group::{GroupEvent, GroupManager};
use crate::ai::loader::TreeLoader;
use crate::ai::registry::{NodeParams, NodeRegistry};
use crate::ai::tree::BehaviorTree;
use crate::error::{AiError, AiResult};
use crate::session::{DebugSession, SessionOutbox};
use crate::snapshot::{EntitySnapshot, WorldSnapshot, ZoneSnapshot};
use crate::zone::Zone;
use metrics::{counter, gauge, histogram};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::{Duration, Instant};
use thicket_common::message::{
    AddNode, AggroState, Attribute, Change, CharacterDetails, CharacterStatic as StaticMessage,
    DeleteNode, NameEntry, Names, NodeDelta, NodeState, Pause, Reset, Select, State, Step,
    Subscribe, UpdateNode,
};
use thicket_common::{
    DebugMessage, EntityId, GroupId, NodeId, TreeStatus, Vector3, ZoneId, ZoneState,
};
use tokio::sync::watch;
use uuid::Uuid;

/// Simulation settings shared by every context the server creates
#[derive(Debug, Clone, Default)]
pub struct ServerSettings {
    pub aggro: AggroConfig,
    /// Base seed for per-entity random number generators
    pub seed: u64,
}

/// Outcome of one [`Server::tick`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickReport {
    pub tick: u64,
    pub zones: usize,
    pub contexts: usize,
}

/// Entity state last reported to debuggers, used to compute deltas
#[derive(Debug, Clone, PartialEq)]
struct Published {
    position: Vector3,
    orientation: f32,
    status: Option<TreeStatus>,
    running_node: Option<NodeId>,
    group: Option<GroupId>,
    target: Option<EntityId>,
}

impl Published {
    fn observe(context: &AIContext, groups: &GroupManager) -> Self {
        Self {
            position: context.character.position,
            orientation: context.character.orientation,
            status: context.character.last_status,
            running_node: context.tree_state().running(),
            group: groups.group_of(context.entity_id()),
            target: context.aggro.highest_aggro(),
        }
    }

    fn delta(&self, next: &Published) -> NodeDelta {
        NodeDelta {
            position: (self.position != next.position).then_some(next.position),
            orientation: (self.orientation != next.orientation).then_some(next.orientation),
            status: if self.status != next.status { next.status } else { None },
            running_node: (self.running_node != next.running_node).then_some(next.running_node),
            group: (self.group != next.group).then_some(next.group),
            target: (self.target != next.target).then_some(next.target),
        }
    }

    fn full_delta(&self) -> NodeDelta {
        NodeDelta {
            position: Some(self.position),
            orientation: Some(self.orientation),
            status: self.status,
            running_node: Some(self.running_node),
            group: Some(self.group),
            target: Some(self.target),
        }
    }
}

pub struct Server {
    settings: ServerSettings,
    registry: NodeRegistry,
    loader: Box<dyn TreeLoader>,
    trees: HashMap<String, Arc<BehaviorTree>>,
    zones: BTreeMap<ZoneId, Zone>,
    entities: HashMap<EntityId, ZoneId>,
    published: HashMap<EntityId, Published>,
    sessions: BTreeMap<Uuid, DebugSession>,
    next_entity: u64,
    next_zone: u32,
    tick_count: u64,
    snapshots: watch::Sender<Arc<WorldSnapshot>>,
}

impl Server {
    pub fn new(loader: Box<dyn TreeLoader>, settings: ServerSettings) -> Self {
        let (snapshots, _) = watch::channel(Arc::new(WorldSnapshot::default()));
        Self {
            settings,
            registry: NodeRegistry::new(),
            loader,
            trees: HashMap::new(),
            zones: BTreeMap::new(),
            entities: HashMap::new(),
            published: HashMap::new(),
            sessions: BTreeMap::new(),
            next_entity: 1,
            next_zone: 1,
            tick_count: 0,
            snapshots,
        }
    }

    pub fn settings(&self) -> &ServerSettings {
        &self.settings
    }

    pub fn registry(&self) -> &NodeRegistry {
        &self.registry
    }

    /// Register a host action type. Only possible before the first tree is loaded.
    pub fn register_action<F>(&mut self, name: impl Into<String>, factory: F) -> AiResult<()>
    where
        F: Fn(&NodeParams<'_>) -> AiResult<Arc<dyn CustomAction>> + Send + Sync + 'static,
    {
        self.registry.register_action(name, factory)
    }

    pub fn tick_count(&self) -> u64 {
        self.tick_count
    }

    //
    // Trees
    //

    /// Load (or fetch the cached) tree called `name`.
    ///
    /// The first load seals the node registry. A failed load caches nothing.
    pub fn add_tree(&mut self, name: &str) -> AiResult<Arc<BehaviorTree>> {
        if let Some(tree) = self.trees.get(name) {
            return Ok(tree.clone());
        }

        self.registry.seal();
        let tree = match self.loader.add_tree(name, &self.registry) {
            Ok(tree) => Arc::new(tree),
            Err(error) => {
                tracing::warn!("Failed to load tree '{}': {}", name, error);
                return Err(error);
            }
        };

        tracing::info!("Loaded tree '{}' with {} nodes", name, tree.len());
        self.trees.insert(name.to_string(), tree.clone());
        Ok(tree)
    }

    pub fn tree(&self, name: &str) -> Option<&Arc<BehaviorTree>> {
        self.trees.get(name)
    }

    //
    // Zones
    //

    pub fn add_zone(&mut self, name: &str) -> AiResult<ZoneId> {
        if self.zone_id(name).is_some() {
            return Err(AiError::Conflict(format!("zone '{}' already exists", name)));
        }

        let id = ZoneId(self.next_zone);
        self.next_zone += 1;
        self.zones.insert(id, Zone::new(id, name));
        tracing::info!("Added {} '{}'", id, name);

        self.broadcast_all(DebugMessage::Names(self.zone_names()));
        Ok(id)
    }

    /// Tear down a zone and every context in it
    pub fn remove_zone(&mut self, zone_id: ZoneId) -> AiResult<()> {
        let zone = self
            .zones
            .remove(&zone_id)
            .ok_or_else(|| AiError::NotFound(zone_id.to_string()))?;

        for context in zone.contexts() {
            let entity = context.entity_id();
            self.entities.remove(&entity);
            self.published.remove(&entity);
            self.broadcast_zone(zone_id, DebugMessage::DeleteNode(DeleteNode { entity_id: entity }));
        }

        for session in self.sessions.values_mut() {
            if session.zone == Some(zone_id) {
                session.zone = None;
            }
            if session.selected.is_some_and(|entity| zone.contains(entity)) {
                session.selected = None;
            }
            session.paused_zones.remove(&zone_id);
        }

        tracing::info!("Removed {} '{}' with {} contexts", zone_id, zone.name(), zone.len());
        self.broadcast_all(DebugMessage::Names(self.zone_names()));
        Ok(())
    }

    pub fn zone(&self, zone_id: ZoneId) -> Option<&Zone> {
        self.zones.get(&zone_id)
    }

    pub fn zone_id(&self, name: &str) -> Option<ZoneId> {
        self.zones
            .values()
            .find(|zone| zone.name() == name)
            .map(Zone::id)
    }

    pub fn zones(&self) -> impl Iterator<Item = &Zone> {
        self.zones.values()
    }

    /// Zone directory in creation order
    pub fn zone_names(&self) -> Names {
        Names {
            names: self
                .zones
                .values()
                .map(|zone| NameEntry {
                    id: zone.id().0,
                    name: zone.name().to_string(),
                })
                .collect(),
        }
    }

    fn zone_mut(&mut self, zone_id: ZoneId) -> AiResult<&mut Zone> {
        self.zones
            .get_mut(&zone_id)
            .ok_or_else(|| AiError::NotFound(zone_id.to_string()))
    }

    pub fn start_zone(&mut self, zone_id: ZoneId) -> AiResult<ZoneState> {
        let state = self.zone_mut(zone_id)?.start();
        tracing::info!("{} is {}", zone_id, state);
        self.broadcast_zone(zone_id, DebugMessage::State(State { zone_id, state }));
        Ok(state)
    }

    /// Pause or resume a zone. Resuming releases every session's hold on it.
    pub fn pause_zone(&mut self, zone_id: ZoneId, paused: bool) -> AiResult<ZoneState> {
        let state = self.zone_mut(zone_id)?.set_paused(paused);
        if !paused {
            for session in self.sessions.values_mut() {
                session.paused_zones.remove(&zone_id);
            }
        }

        tracing::info!("{} is {}", zone_id, state);
        self.broadcast_zone(zone_id, DebugMessage::State(State { zone_id, state }));
        Ok(state)
    }

    /// Run exactly one tick of a paused zone on the next tick boundary
    pub fn step_zone(&mut self, zone_id: ZoneId) -> AiResult<()> {
        self.zone_mut(zone_id)?.request_step()?;
        tracing::debug!("{} will step once", zone_id);
        Ok(())
    }

    //
    // Entities
    //

    /// Create an AI context running `tree_name` in `zone_id`
    pub fn add_node(&mut self, zone_id: ZoneId, tree_name: &str) -> AiResult<EntityId> {
        let name = format!("{}-{}", tree_name, self.next_entity);
        self.spawn(zone_id, tree_name, CharacterStatic::new(name), Vector3::ZERO)
    }

    /// Create an AI context with explicit character data
    pub fn spawn(
        &mut self,
        zone_id: ZoneId,
        tree_name: &str,
        character: CharacterStatic,
        position: Vector3,
    ) -> AiResult<EntityId> {
        if !self.zones.contains_key(&zone_id) {
            return Err(AiError::NotFound(zone_id.to_string()));
        }
        let tree = self.add_tree(tree_name)?;

        let entity = EntityId(self.next_entity);
        self.next_entity += 1;

        let context = AIContext::new(entity, zone_id, tree)
            .with_aggro_config(self.settings.aggro.clone())
            .with_seed(self.settings.seed ^ entity.value())
            .with_character(character)
            .with_position(position);
        let announcements = [add_node_message(&context), character_static_message(&context)];

        let zone = self.zone_mut(zone_id)?;
        let published = Published::observe(&context, &zone.groups);
        zone.add_context(context)?;
        self.entities.insert(entity, zone_id);
        self.published.insert(entity, published);

        tracing::debug!("Added {} running '{}' to {}", entity, tree_name, zone_id);
        for message in announcements {
            self.broadcast_zone(zone_id, message);
        }
        Ok(entity)
    }

    pub fn remove_node(&mut self, entity: EntityId) -> AiResult<()> {
        let zone_id = self
            .entities
            .remove(&entity)
            .ok_or_else(|| AiError::NotFound(entity.to_string()))?;
        if let Some(zone) = self.zones.get_mut(&zone_id) {
            zone.remove_context(entity);
        }
        self.published.remove(&entity);

        for session in self.sessions.values_mut() {
            if session.selected == Some(entity) {
                session.selected = None;
            }
        }

        tracing::debug!("Removed {} from {}", entity, zone_id);
        self.broadcast_zone(zone_id, DebugMessage::DeleteNode(DeleteNode { entity_id: entity }));
        Ok(())
    }

    pub fn context(&self, entity: EntityId) -> Option<&AIContext> {
        let zone_id = self.entities.get(&entity)?;
        self.zones.get(zone_id)?.context(entity)
    }

    fn context_mut(&mut self, entity: EntityId) -> AiResult<&mut AIContext> {
        let zone_id = self
            .entities
            .get(&entity)
            .ok_or_else(|| AiError::NotFound(entity.to_string()))?;
        self.zones
            .get_mut(zone_id)
            .and_then(|zone| zone.context_mut(entity))
            .ok_or_else(|| AiError::NotFound(entity.to_string()))
    }

    pub fn entity_count(&self) -> usize {
        self.entities.len()
    }

    /// Add threat from `target` to `owner`'s aggro table
    pub fn add_aggro(&mut self, owner: EntityId, target: EntityId, delta: f32) -> AiResult<f32> {
        let context = match self.context_mut(owner) {
            Ok(context) => context,
            Err(error) => {
                tracing::warn!("Cannot add aggro from {} to {}: {}", target, owner, error);
                return Err(error);
            }
        };
        let now = context.time_millis();
        Ok(context.aggro.add_aggro(target, delta, now))
    }

    pub fn join_group(&mut self, entity: EntityId, group: GroupId) -> AiResult<()> {
        let zone_id = *self
            .entities
            .get(&entity)
            .ok_or_else(|| AiError::NotFound(entity.to_string()))?;
        self.zone_mut(zone_id)?.groups.add(entity, group);
        Ok(())
    }

    pub fn leave_group(&mut self, entity: EntityId) -> AiResult<Option<GroupId>> {
        let zone_id = *self
            .entities
            .get(&entity)
            .ok_or_else(|| AiError::NotFound(entity.to_string()))?;
        Ok(self.zone_mut(zone_id)?.groups.remove(entity))
    }

    /// Host hook for changing position, speed and dynamic attributes
    pub fn update_character<F>(&mut self, entity: EntityId, update: F) -> AiResult<()>
    where
        F: FnOnce(&mut CharacterDynamic),
    {
        update(&mut self.context_mut(entity)?.character);
        Ok(())
    }

    /// Replace the behavior tree of `entity`, discarding its progress in the old one.
    ///
    /// Subscribers of the entity's zone get a fresh AddNode naming the new tree.
    pub fn set_tree(&mut self, entity: EntityId, tree_name: &str) -> AiResult<()> {
        if !self.entities.contains_key(&entity) {
            return Err(AiError::NotFound(entity.to_string()));
        }
        let tree = self.add_tree(tree_name)?;

        let context = self.context_mut(entity)?;
        context.set_tree(tree);
        let zone_id = context.zone_id();
        let announcement = add_node_message(context);

        tracing::debug!("{} now runs '{}'", entity, tree_name);
        self.broadcast_zone(zone_id, announcement);
        Ok(())
    }

    /// Stop or resume ticking a single entity
    pub fn pause_node(&mut self, entity: EntityId, paused: bool) -> AiResult<()> {
        self.context_mut(entity)?.set_paused(paused);
        tracing::debug!("{} {}", entity, if paused { "paused" } else { "resumed" });
        Ok(())
    }

    /// Reset an entity's tree state on its next tick
    pub fn reset_node(&mut self, entity: EntityId) -> AiResult<()> {
        self.context_mut(entity)?.request_reset();
        Ok(())
    }

    //
    // Sessions
    //

    pub fn connect_session(&mut self, id: Uuid, peer: impl Into<String>, outbox: Arc<SessionOutbox>) {
        let session = DebugSession::new(id, peer, outbox);
        tracing::info!("Debug session {} connected from {}", id, session.peer());
        session.send(DebugMessage::Names(self.zone_names()));
        self.sessions.insert(id, session);
        gauge!("thicket.sessions").set(self.sessions.len() as f64);
    }

    /// Drop a session, releasing its selection and the zones only it kept paused
    pub fn disconnect_session(&mut self, id: Uuid) -> AiResult<()> {
        let session = self
            .sessions
            .remove(&id)
            .ok_or_else(|| AiError::NotFound(format!("session {}", id)))?;
        session.outbox().close();

        if let Some(entity) = session.selected {
            self.update_debugging(entity);
        }

        for zone_id in &session.paused_zones {
            let held_elsewhere = self
                .sessions
                .values()
                .any(|other| other.paused_zones.contains(zone_id));
            let paused = self
                .zones
                .get(zone_id)
                .is_some_and(|zone| zone.state() == ZoneState::Paused);
            if paused && !held_elsewhere {
                tracing::info!("Resuming {} paused by departed session {}", zone_id, id);
                self.pause_zone(*zone_id, false)?;
            }
        }

        tracing::info!("Debug session {} disconnected", id);
        gauge!("thicket.sessions").set(self.sessions.len() as f64);
        Ok(())
    }

    pub fn session(&self, id: Uuid) -> Option<&DebugSession> {
        self.sessions.get(&id)
    }

    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    /// Disconnect sessions idle for longer than `timeout_seconds`
    pub fn expire_sessions(&mut self, timeout_seconds: i64) -> Vec<Uuid> {
        let expired: Vec<Uuid> = self
            .sessions
            .values()
            .filter(|session| session.is_expired(timeout_seconds))
            .map(DebugSession::id)
            .collect();
        for id in &expired {
            tracing::info!("Debug session {} timed out", id);
            if let Err(error) = self.disconnect_session(*id) {
                tracing::warn!("Failed to disconnect expired session {}: {}", id, error);
            }
        }
        expired
    }

    /// Apply a message received from a debug session.
    ///
    /// Rejected requests are answered with a Nack on that session only.
    pub fn handle_message(&mut self, session_id: Uuid, message: DebugMessage) -> AiResult<()> {
        let session = self
            .sessions
            .get_mut(&session_id)
            .ok_or_else(|| AiError::NotFound(format!("session {}", session_id)))?;
        session.touch();

        let result = self.dispatch(session_id, message);
        if let Err(error) = &result {
            tracing::warn!("Rejected request from session {}: {}", session_id, error);
            counter!("thicket.session.rejected").increment(1);
            self.send_to(session_id, error.to_nack());
        }
        result
    }

    fn dispatch(&mut self, session_id: Uuid, message: DebugMessage) -> AiResult<()> {
        match message {
            DebugMessage::Select(Select { entity_id }) => self.select(session_id, entity_id),
            DebugMessage::Pause(Pause { zone_id, paused }) => {
                let state = self.pause_zone(zone_id, paused)?;
                if let Some(session) = self.sessions.get_mut(&session_id) {
                    if paused {
                        session.paused_zones.insert(zone_id);
                    }
                    if !session.is_subscribed(zone_id) {
                        session.send(DebugMessage::State(State { zone_id, state }));
                    }
                }
                Ok(())
            }
            DebugMessage::Step(Step { zone_id }) => self.step_zone(zone_id),
            DebugMessage::Change(Change { zone_id }) => self.change_zone(session_id, zone_id),
            DebugMessage::Reset(Reset { entity_id }) => self.reset_node(entity_id),
            DebugMessage::Subscribe(Subscribe { kinds }) => {
                if let Some(session) = self.sessions.get_mut(&session_id) {
                    session.kinds = kinds;
                }
                Ok(())
            }
            DebugMessage::Ping(ping) => {
                self.send_to(session_id, DebugMessage::Ping(ping));
                Ok(())
            }
            other => Err(AiError::State(format!(
                "{:?} is a server message",
                other.kind()
            ))),
        }
    }

    fn select(&mut self, session_id: Uuid, entity: Option<EntityId>) -> AiResult<()> {
        let requested = entity;
        let entity = entity.filter(|entity| self.entities.contains_key(entity));
        if requested.is_some() && entity.is_none() {
            tracing::debug!(
                "Session {} selected unknown entity {:?}; clearing selection",
                session_id,
                requested
            );
        }

        let previous = match self.sessions.get_mut(&session_id) {
            Some(session) => std::mem::replace(&mut session.selected, entity),
            None => return Err(AiError::NotFound(format!("session {}", session_id))),
        };
        if let Some(previous) = previous {
            self.update_debugging(previous);
        }
        if let Some(entity) = entity {
            self.update_debugging(entity);
            let details = self.entities.get(&entity).and_then(|zone_id| {
                let zone = self.zones.get(zone_id)?;
                zone.context(entity)
                    .map(|context| character_details_message(context, &zone.groups))
            });
            if let Some(details) = details {
                self.send_to(session_id, details);
            }
        }
        Ok(())
    }

    /// Subscribe a session to a zone and replay the zone's current state
    fn change_zone(&mut self, session_id: Uuid, zone_id: Option<ZoneId>) -> AiResult<()> {
        let mut replay = Vec::new();
        if let Some(zone_id) = zone_id {
            let zone = self
                .zones
                .get(&zone_id)
                .ok_or_else(|| AiError::NotFound(zone_id.to_string()))?;
            replay.push(DebugMessage::State(State {
                zone_id,
                state: zone.state(),
            }));
            replay.push(DebugMessage::Names(self.zone_names()));
            for context in zone.contexts() {
                replay.push(add_node_message(context));
                replay.push(character_static_message(context));
                replay.push(DebugMessage::UpdateNode(UpdateNode {
                    entity_id: context.entity_id(),
                    delta: Published::observe(context, &zone.groups).full_delta(),
                }));
            }
        }

        let session = self
            .sessions
            .get_mut(&session_id)
            .ok_or_else(|| AiError::NotFound(format!("session {}", session_id)))?;
        session.zone = zone_id;
        for message in replay {
            session.send(message);
        }
        Ok(())
    }

    /// Record debug state for `entity` exactly while some session selects it
    fn update_debugging(&mut self, entity: EntityId) {
        let selected = self
            .sessions
            .values()
            .any(|session| session.selected == Some(entity));
        if let Ok(context) = self.context_mut(entity) {
            if context.is_debugging() != selected {
                context.set_debugging(selected);
            }
        }
    }

    fn send_to(&self, session_id: Uuid, message: DebugMessage) {
        if let Some(session) = self.sessions.get(&session_id) {
            session.send(message);
        }
    }

    fn broadcast_zone(&self, zone_id: ZoneId, message: DebugMessage) {
        for session in self.sessions.values() {
            if session.is_subscribed(zone_id) {
                session.send(message.clone());
            }
        }
    }

    fn broadcast_all(&self, message: DebugMessage) {
        for session in self.sessions.values() {
            session.send(message.clone());
        }
    }

    //
    // Simulation
    //

    /// Advance every runnable zone by `dt` and publish the results.
    #[tracing::instrument(level = "trace", skip(self))]
    pub fn tick(&mut self, dt: Duration) -> TickReport {
        let started = Instant::now();
        self.tick_count += 1;
        let mut report = TickReport {
            tick: self.tick_count,
            ..Default::default()
        };

        let zone_ids: Vec<ZoneId> = self.zones.keys().copied().collect();
        for zone_id in zone_ids {
            let results = match self.zones.get_mut(&zone_id) {
                Some(zone) if zone.should_tick() => {
                    let results = zone.tick(dt);
                    for event in zone.groups.drain_events() {
                        match event {
                            GroupEvent::Joined { entity, group } => {
                                tracing::debug!("{} joined group {} in {}", entity, group, zone_id)
                            }
                            GroupEvent::Left { entity, group } => {
                                tracing::debug!("{} left group {} in {}", entity, group, zone_id)
                            }
                        }
                    }
                    results
                }
                _ => continue,
            };

            report.zones += 1;
            report.contexts += results.len();
            self.publish_zone(zone_id, &results);
        }

        self.publish_snapshot();
        histogram!("thicket.tick.duration").record(started.elapsed().as_secs_f64());
        counter!("thicket.ticks").increment(1);
        report
    }

    /// Send one UpdateNode per ticked entity to the zone's subscribers, and
    /// fresh details to every session whose selection lives in this zone
    fn publish_zone(&mut self, zone_id: ZoneId, results: &[(EntityId, TreeStatus)]) {
        let Some(zone) = self.zones.get(&zone_id) else {
            return;
        };

        let mut updates = Vec::with_capacity(results.len());
        for (entity, _) in results {
            let Some(context) = zone.context(*entity) else {
                continue;
            };
            let next = Published::observe(context, &zone.groups);
            let delta = match self.published.get(entity) {
                Some(previous) => previous.delta(&next),
                None => next.full_delta(),
            };
            self.published.insert(*entity, next);
            updates.push(DebugMessage::UpdateNode(UpdateNode {
                entity_id: *entity,
                delta,
            }));
        }

        for session in self.sessions.values() {
            if session.is_subscribed(zone_id) {
                for update in &updates {
                    session.send(update.clone());
                }
            }
            if let Some(context) = session.selected.and_then(|entity| zone.context(entity)) {
                session.send(character_details_message(context, &zone.groups));
            }
        }
    }

    /// Replace the published world snapshot
    fn publish_snapshot(&self) {
        let snapshot = WorldSnapshot {
            tick: self.tick_count,
            zones: self
                .zones
                .values()
                .map(|zone| ZoneSnapshot {
                    id: zone.id(),
                    name: zone.name().to_string(),
                    state: zone.state(),
                    entities: zone
                        .contexts()
                        .iter()
                        .map(|context| EntitySnapshot {
                            entity_id: context.entity_id(),
                            tree: context.tree().name().to_string(),
                            position: context.character.position,
                            status: context.character.last_status,
                            group: zone.groups.group_of(context.entity_id()),
                            target: context.aggro.highest_aggro(),
                            paused: context.is_paused(),
                        })
                        .collect(),
                })
                .collect(),
            sessions: self.sessions.len(),
        };
        self.snapshots.send_replace(Arc::new(snapshot));
    }

    pub fn subscribe_snapshots(&self) -> watch::Receiver<Arc<WorldSnapshot>> {
        self.snapshots.subscribe()
    }

    /// Most recently published snapshot
    pub fn snapshot(&self) -> Arc<WorldSnapshot> {
        self.snapshots.borrow().clone()
    }
}

impl std::fmt::Debug for Server {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Server")
            .field("zones", &self.zones.len())
            .field("entities", &self.entities.len())
            .field("trees", &self.trees.len())
            .field("sessions", &self.sessions.len())
            .field("tick", &self.tick_count)
            .finish()
    }
}

fn add_node_message(context: &AIContext) -> DebugMessage {
    DebugMessage::AddNode(AddNode {
        entity_id: context.entity_id(),
        tree_name: context.tree().name().to_string(),
        position: context.character.position,
    })
}

fn character_static_message(context: &AIContext) -> DebugMessage {
    let character = context.character_static();
    let mut attributes = vec![Attribute::new("name", character.name.clone())];
    attributes.extend(
        character
            .attributes
            .iter()
            .map(|(key, value)| Attribute::new(key.clone(), value.clone())),
    );
    DebugMessage::CharacterStatic(StaticMessage {
        entity_id: context.entity_id(),
        attributes,
    })
}

fn character_details_message(context: &AIContext, groups: &GroupManager) -> DebugMessage {
    let character = &context.character;
    let mut attributes = vec![
        Attribute::new("position", character.position.to_string()),
        Attribute::new("orientation", format!("{:.2}", character.orientation)),
        Attribute::new("speed", format!("{:.2}", character.speed)),
        Attribute::new("time", context.time_millis().to_string()),
    ];
    if let Some(group) = groups.group_of(context.entity_id()) {
        attributes.push(Attribute::new("group", group.0.to_string()));
    }
    if context.is_paused() {
        attributes.push(Attribute::new("paused", "true"));
    }
    if !context.filtered_entities().is_empty() {
        let filtered: Vec<String> = context
            .filtered_entities()
            .iter()
            .map(|entity| entity.value().to_string())
            .collect();
        attributes.push(Attribute::new("filtered", filtered.join(",")));
    }
    attributes.extend(
        character
            .attributes
            .iter()
            .map(|(key, value)| Attribute::new(key.clone(), value.clone())),
    );

    let aggro = context
        .aggro
        .entries()
        .into_iter()
        .map(|entry| AggroState {
            target: entry.target,
            value: entry.value,
        })
        .collect();

    let tree = context.tree();
    let nodes = tree
        .nodes()
        .iter()
        .enumerate()
        .map(|(index, node)| {
            let id = NodeId::from(index);
            let record = context.tree_state().record(id);
            NodeState {
                node_id: id,
                name: node.name.clone(),
                kind: node.kind.type_name(),
                status: record.map(|record| record.status),
                last_run_millis: record.map(|record| record.last_run_millis).unwrap_or(0),
            }
        })
        .collect();

    DebugMessage::CharacterDetails(CharacterDetails {
        entity_id: context.entity_id(),
        attributes,
        aggro,
        nodes,
    })
}
