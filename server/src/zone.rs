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

//! Zones
//!
//! A zone is an independently schedulable set of AI contexts sharing one
//! group manager. Its state machine is `Idle -> Running <-> Paused`. Every
//! step request on a paused zone buys one tick; requests that arrive between
//! two ticks queue up and run on consecutive ticks.

use crate::ai::context::AIContext;
use crate::ai::group::GroupManager;
use crate::ai::tree::TickEnv;
use crate::error::{AiError, AiResult};
use std::collections::HashMap;
use std::time::Duration;
use thicket_common::{EntityId, TreeStatus, Vector3, ZoneId, ZoneState};

#[derive(Debug)]
pub struct Zone {
    id: ZoneId,
    name: String,
    state: ZoneState,
    contexts: Vec<AIContext>,
    index: HashMap<EntityId, usize>,
    pub groups: GroupManager,
    pending_steps: u32,
}

impl Zone {
    pub fn new(id: ZoneId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            state: ZoneState::Idle,
            contexts: Vec::new(),
            index: HashMap::new(),
            groups: GroupManager::new(),
            pending_steps: 0,
        }
    }

    pub fn id(&self) -> ZoneId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn state(&self) -> ZoneState {
        self.state
    }

    pub fn add_context(&mut self, context: AIContext) -> AiResult<()> {
        let entity = context.entity_id();
        if self.index.contains_key(&entity) {
            return Err(AiError::Conflict(format!("{} already in {}", entity, self.id)));
        }
        self.index.insert(entity, self.contexts.len());
        self.contexts.push(context);
        Ok(())
    }

    /// Remove a context, keeping the insertion order of the others
    pub fn remove_context(&mut self, entity: EntityId) -> Option<AIContext> {
        let position = self.index.remove(&entity)?;
        let context = self.contexts.remove(position);
        for slot in self.index.values_mut() {
            if *slot > position {
                *slot -= 1;
            }
        }
        self.groups.remove(entity);
        Some(context)
    }

    pub fn contains(&self, entity: EntityId) -> bool {
        self.index.contains_key(&entity)
    }

    pub fn context(&self, entity: EntityId) -> Option<&AIContext> {
        self.index.get(&entity).map(|slot| &self.contexts[*slot])
    }

    pub fn context_mut(&mut self, entity: EntityId) -> Option<&mut AIContext> {
        let slot = *self.index.get(&entity)?;
        self.contexts.get_mut(slot)
    }

    /// Contexts in insertion order
    pub fn contexts(&self) -> &[AIContext] {
        &self.contexts
    }

    pub fn len(&self) -> usize {
        self.contexts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.contexts.is_empty()
    }

    /// Idle zones start running; other states are left alone
    pub fn start(&mut self) -> ZoneState {
        if self.state == ZoneState::Idle {
            self.state = ZoneState::Running;
        }
        self.state
    }

    pub fn set_paused(&mut self, paused: bool) -> ZoneState {
        if paused {
            self.state = ZoneState::Paused;
        } else {
            self.state = ZoneState::Running;
            self.pending_steps = 0;
        }
        self.state
    }

    /// Schedule one more tick of a paused zone
    pub fn request_step(&mut self) -> AiResult<()> {
        if self.state != ZoneState::Paused {
            return Err(AiError::State(format!(
                "{} is {}; step requires a paused zone",
                self.id, self.state
            )));
        }
        self.pending_steps = self.pending_steps.saturating_add(1);
        Ok(())
    }

    pub fn should_tick(&self) -> bool {
        match self.state {
            ZoneState::Running => true,
            ZoneState::Paused => self.pending_steps > 0,
            ZoneState::Idle => false,
        }
    }

    /// Tick every unpaused context once in insertion order.
    ///
    /// Contexts observe each other's positions as of the start of the tick,
    /// paused ones included.
    pub fn tick(&mut self, dt: Duration) -> Vec<(EntityId, TreeStatus)> {
        let positions: HashMap<EntityId, Vector3> = self
            .contexts
            .iter()
            .map(|context| (context.entity_id(), context.character.position))
            .collect();

        let Zone {
            contexts, groups, ..
        } = self;
        let mut env = TickEnv::new(dt, groups, &positions);
        let results = contexts
            .iter_mut()
            .filter(|context| !context.is_paused())
            .map(|context| (context.entity_id(), context.tick(&mut env)))
            .collect();

        if self.state == ZoneState::Paused {
            self.pending_steps = self.pending_steps.saturating_sub(1);
        }
        results
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ai::action::Action;
    use crate::ai::node::{BehaviorNode, NodeKind};
    use crate::ai::tree::BehaviorTree;
    use std::sync::Arc;
    use thicket_common::{GroupId, NodeId};

    fn joiner() -> Arc<BehaviorTree> {
        let nodes = vec![BehaviorNode::new(
            "join",
            NodeKind::Action(Action::JoinGroup(GroupId(7))),
        )];
        Arc::new(BehaviorTree::new("join", nodes, Some(NodeId(0))).unwrap())
    }

    fn zone_with(entities: &[u64]) -> Zone {
        let mut zone = Zone::new(ZoneId(1), "z1");
        let tree = joiner();
        for entity in entities {
            zone.add_context(AIContext::new(EntityId(*entity), ZoneId(1), tree.clone()))
                .unwrap();
        }
        zone
    }

    #[test]
    fn test_state_machine() {
        let mut zone = zone_with(&[]);
        assert_eq!(zone.state(), ZoneState::Idle);
        assert!(!zone.should_tick());
        assert!(matches!(zone.request_step(), Err(AiError::State(_))));

        assert_eq!(zone.start(), ZoneState::Running);
        assert!(zone.should_tick());
        assert!(matches!(zone.request_step(), Err(AiError::State(_))));
        assert_eq!(zone.state(), ZoneState::Running);

        assert_eq!(zone.set_paused(true), ZoneState::Paused);
        assert!(!zone.should_tick());
        zone.request_step().unwrap();
        assert!(zone.should_tick());
        zone.tick(Duration::from_millis(10));
        assert!(!zone.should_tick());
        assert_eq!(zone.state(), ZoneState::Paused);

        assert_eq!(zone.set_paused(false), ZoneState::Running);
    }

    #[test]
    fn test_step_requests_queue() {
        let mut zone = zone_with(&[1]);
        zone.start();
        zone.set_paused(true);
        zone.request_step().unwrap();
        zone.request_step().unwrap();

        let mut ticked = 0;
        for _ in 0..4 {
            if zone.should_tick() {
                zone.tick(Duration::from_millis(10));
                ticked += 1;
            }
        }
        assert_eq!(ticked, 2);

        // Resuming drops steps that were never consumed
        zone.request_step().unwrap();
        zone.set_paused(false);
        zone.set_paused(true);
        assert!(!zone.should_tick());
    }

    #[test]
    fn test_pause_from_idle() {
        let mut zone = zone_with(&[]);
        assert_eq!(zone.set_paused(true), ZoneState::Paused);
        assert_eq!(zone.start(), ZoneState::Paused);
    }

    #[test]
    fn test_tick_in_insertion_order() {
        let mut zone = zone_with(&[5, 3, 9]);
        let results = zone.tick(Duration::from_millis(10));
        let order: Vec<EntityId> = results.iter().map(|(entity, _)| *entity).collect();
        assert_eq!(order, vec![EntityId(5), EntityId(3), EntityId(9)]);
        assert!(results.iter().all(|(_, status)| *status == TreeStatus::Success));

        // Join order follows tick order, so the first ticked entity leads
        assert_eq!(zone.groups.leader(GroupId(7)), Some(EntityId(5)));
    }

    #[test]
    fn test_paused_context_is_skipped() {
        let mut zone = zone_with(&[1, 2]);
        zone.context_mut(EntityId(1)).unwrap().set_paused(true);

        let results = zone.tick(Duration::from_millis(10));
        assert_eq!(results, vec![(EntityId(2), TreeStatus::Success)]);
        assert_eq!(zone.context(EntityId(1)).unwrap().time_millis(), 0);
        assert_eq!(zone.groups.group_of(EntityId(1)), None);

        zone.context_mut(EntityId(1)).unwrap().set_paused(false);
        assert_eq!(zone.tick(Duration::from_millis(10)).len(), 2);
    }

    #[test]
    fn test_remove_context_keeps_order() {
        let mut zone = zone_with(&[1, 2, 3]);
        zone.tick(Duration::from_millis(10));

        let removed = zone.remove_context(EntityId(2)).unwrap();
        assert_eq!(removed.entity_id(), EntityId(2));
        assert_eq!(zone.groups.group_of(EntityId(2)), None);
        assert!(zone.remove_context(EntityId(2)).is_none());

        let order: Vec<EntityId> = zone.contexts().iter().map(|c| c.entity_id()).collect();
        assert_eq!(order, vec![EntityId(1), EntityId(3)]);
        assert_eq!(zone.context(EntityId(3)).map(|c| c.entity_id()), Some(EntityId(3)));
    }

    #[test]
    fn test_duplicate_context_conflicts() {
        let mut zone = zone_with(&[1]);
        let duplicate = AIContext::new(EntityId(1), ZoneId(1), joiner());
        assert!(matches!(zone.add_context(duplicate), Err(AiError::Conflict(_))));
    }
}
