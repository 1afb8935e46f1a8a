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

//! AI Context
//!
//! The per-entity unit the engine ticks. A context binds an entity to its
//! (shared) behavior tree and owns everything that changes while the tree
//! runs: the aggro table, character state, and the [`TreeState`] holding
//! sequence cursors, action timers and debug records.

use crate::ai::aggro::{AggroConfig, AggroManager};
use crate::ai::tree::{BehaviorTree, TickEnv};
use metrics::counter;
use rand::SeedableRng;
use rand::rngs::StdRng;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use thicket_common::{EntityId, NodeId, TreeStatus, Vector3, ZoneId};

/// Attributes that never change after the entity is added
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CharacterStatic {
    pub name: String,
    pub attributes: BTreeMap<String, String>,
}

impl CharacterStatic {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            attributes: BTreeMap::new(),
        }
    }

    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CharacterDynamic {
    pub position: Vector3,
    /// Heading in radians around the vertical axis
    pub orientation: f32,
    /// Units per second
    pub speed: f32,
    pub attributes: BTreeMap<String, String>,
    pub last_node: Option<NodeId>,
    pub last_status: Option<TreeStatus>,
}

impl Default for CharacterDynamic {
    fn default() -> Self {
        Self {
            position: Vector3::ZERO,
            orientation: 0.0,
            speed: 1.0,
            attributes: BTreeMap::new(),
            last_node: None,
            last_status: None,
        }
    }
}

/// Multi-tick progress of a single node
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeData {
    /// Simulation time an Idle action started
    Timer(u64),
    /// Completed runs under a Limit decorator
    Counter(u32),
    /// Simulation time a Throttle decorator last completed its child
    LastRun(u64),
}

/// Debug record of a node, kept only while the entity is selected
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NodeRecord {
    pub status: TreeStatus,
    pub last_run_millis: u64,
}

#[derive(Debug, Clone, Default)]
pub struct TreeState {
    pub(crate) cursors: HashMap<NodeId, usize>,
    pub(crate) data: HashMap<NodeId, NodeData>,
    pub(crate) running: Option<NodeId>,
    pub(crate) records: BTreeMap<NodeId, NodeRecord>,
}

impl TreeState {
    /// Stored child index of a Sequence, Selector or RandomSelector
    pub fn cursor(&self, node: NodeId) -> Option<usize> {
        self.cursors.get(&node).copied()
    }

    pub fn data(&self, node: NodeId) -> Option<NodeData> {
        self.data.get(&node).copied()
    }

    pub fn has_data(&self, node: NodeId) -> bool {
        self.data.contains_key(&node)
    }

    /// Deepest leaf that returned Running on the last tick
    pub fn running(&self) -> Option<NodeId> {
        self.running
    }

    pub fn record(&self, node: NodeId) -> Option<&NodeRecord> {
        self.records.get(&node)
    }

    pub fn records(&self) -> impl Iterator<Item = (NodeId, &NodeRecord)> {
        self.records.iter().map(|(id, record)| (*id, record))
    }

    pub fn reset(&mut self) {
        self.cursors.clear();
        self.data.clear();
        self.running = None;
        self.records.clear();
    }
}

#[derive(Debug, Clone)]
pub struct AIContext {
    entity_id: EntityId,
    zone_id: ZoneId,
    tree: Arc<BehaviorTree>,
    pub aggro: AggroManager,
    character_static: CharacterStatic,
    pub character: CharacterDynamic,
    pub(crate) state: TreeState,
    /// Entities selected by the last Filter node that ran
    pub(crate) filtered: Vec<EntityId>,
    time_millis: u64,
    debugging: bool,
    paused: bool,
    reset_pending: bool,
    pub(crate) rng: StdRng,
}

impl AIContext {
    pub fn new(entity_id: EntityId, zone_id: ZoneId, tree: Arc<BehaviorTree>) -> Self {
        Self {
            entity_id,
            zone_id,
            tree,
            aggro: AggroManager::new(AggroConfig::default()),
            character_static: CharacterStatic::default(),
            character: CharacterDynamic::default(),
            state: TreeState::default(),
            filtered: Vec::new(),
            time_millis: 0,
            debugging: false,
            paused: false,
            reset_pending: false,
            rng: StdRng::seed_from_u64(entity_id.value()),
        }
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.rng = StdRng::seed_from_u64(seed);
        self
    }

    pub fn with_aggro_config(mut self, config: AggroConfig) -> Self {
        self.aggro = AggroManager::new(config);
        self
    }

    pub fn with_character(mut self, character: CharacterStatic) -> Self {
        self.character_static = character;
        self
    }

    pub fn with_position(mut self, position: Vector3) -> Self {
        self.character.position = position;
        self
    }

    pub fn entity_id(&self) -> EntityId {
        self.entity_id
    }

    pub fn zone_id(&self) -> ZoneId {
        self.zone_id
    }

    pub fn tree(&self) -> &Arc<BehaviorTree> {
        &self.tree
    }

    pub fn character_static(&self) -> &CharacterStatic {
        &self.character_static
    }

    pub fn tree_state(&self) -> &TreeState {
        &self.state
    }

    pub fn filtered_entities(&self) -> &[EntityId] {
        &self.filtered
    }

    /// Simulation time of this context in milliseconds
    pub fn time_millis(&self) -> u64 {
        self.time_millis
    }

    pub fn is_debugging(&self) -> bool {
        self.debugging
    }

    /// Turn per-node debug recording on or off. Turning it off drops existing records.
    pub fn set_debugging(&mut self, debugging: bool) {
        self.debugging = debugging;
        if !debugging {
            self.state.records.clear();
        }
    }

    /// Swap the behavior tree, discarding all progress in the old one
    pub fn set_tree(&mut self, tree: Arc<BehaviorTree>) {
        self.tree = tree;
        self.reset_pending = false;
        self.reset();
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    /// A paused context is skipped by its zone: no time, no decay, no evaluation
    pub fn set_paused(&mut self, paused: bool) {
        self.paused = paused;
    }

    /// Reset the tree state at the start of the next tick
    pub fn request_reset(&mut self) {
        self.reset_pending = true;
    }

    pub fn reset(&mut self) {
        self.state.reset();
        self.filtered.clear();
        self.character.last_node = None;
        self.character.last_status = None;
    }

    pub(crate) fn record(&mut self, node: NodeId, status: TreeStatus) {
        if self.debugging {
            self.state.records.insert(
                node,
                NodeRecord {
                    status,
                    last_run_millis: self.time_millis,
                },
            );
        }
    }

    /// Advance simulation time, decay aggro and evaluate the tree once.
    ///
    /// Evaluation errors never escape: they are logged, the result becomes
    /// Failure and the tree state is reset.
    #[tracing::instrument(level = "trace", skip_all, fields(entity = %self.entity_id))]
    pub fn tick(&mut self, env: &mut TickEnv<'_>) -> TreeStatus {
        if self.reset_pending {
            self.reset_pending = false;
            self.reset();
        }

        self.time_millis = self
            .time_millis
            .saturating_add(u64::try_from(env.dt.as_millis()).unwrap_or(u64::MAX));
        self.aggro.decay(env.dt);

        let tree = Arc::clone(&self.tree);
        let status = match tree.tick(self, env) {
            Ok(status) => status,
            Err(error) => {
                tracing::warn!(
                    "AI context {} failed in tree '{}': {}",
                    self.entity_id,
                    tree.name(),
                    error
                );
                counter!("thicket.context.failures").increment(1);
                self.state.reset();
                TreeStatus::Failure
            }
        };

        self.character.last_status = Some(status);
        self.character.last_node = self.state.running;
        status
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ai::action::{Action, CustomAction};
    use crate::ai::group::GroupManager;
    use crate::ai::node::{BehaviorNode, Composite, NodeKind};
    use crate::error::{AiError, AiResult};
    use std::time::Duration;
    use tracing_test::traced_test;

    #[derive(Debug)]
    struct Explode;

    impl CustomAction for Explode {
        fn name(&self) -> &str {
            "Explode"
        }

        fn execute(&self, _: NodeId, _: &mut AIContext, _: &mut TickEnv<'_>) -> AiResult<TreeStatus> {
            Err(AiError::Node("the barrel exploded".to_string()))
        }
    }

    fn tick(ctx: &mut AIContext) -> TreeStatus {
        let mut groups = GroupManager::new();
        let positions = HashMap::new();
        let mut env = TickEnv::new(Duration::from_millis(50), &mut groups, &positions);
        ctx.tick(&mut env)
    }

    fn idle_then(action: Action) -> Arc<BehaviorTree> {
        let nodes = vec![
            BehaviorNode::new("wait", NodeKind::Action(Action::Idle { millis: 50 })),
            BehaviorNode::new("act", NodeKind::Action(action)),
            BehaviorNode::new("root", NodeKind::Composite(Composite::Sequence))
                .with_children(vec![NodeId(0), NodeId(1)]),
        ];
        Arc::new(BehaviorTree::new("test", nodes, Some(NodeId(2))).unwrap())
    }

    #[test]
    #[traced_test]
    fn test_node_error_downgrades_to_failure() {
        let mut ctx = AIContext::new(EntityId(3), ZoneId(1), idle_then(Action::Custom(Arc::new(Explode))));

        assert_eq!(tick(&mut ctx), TreeStatus::Running);
        assert_eq!(ctx.tree_state().cursor(NodeId(2)), Some(0));

        assert_eq!(tick(&mut ctx), TreeStatus::Failure);
        assert_eq!(ctx.tree_state().cursor(NodeId(2)), None);
        assert!(!ctx.tree_state().has_data(NodeId(0)));
        assert_eq!(ctx.character.last_status, Some(TreeStatus::Failure));
        assert!(logs_contain("the barrel exploded"));
    }

    #[test]
    fn test_time_and_decay_advance_per_tick() {
        let mut ctx = AIContext::new(EntityId(1), ZoneId(1), idle_then(Action::ForgetTarget));
        ctx.aggro.add_aggro(EntityId(2), 1.0, 0);

        tick(&mut ctx);
        assert_eq!(ctx.time_millis(), 50);
        let value = ctx.aggro.value(EntityId(2)).unwrap();
        assert!((value - 0.95).abs() < 1e-6);
        assert_eq!(ctx.character.last_node, Some(NodeId(0)));
    }

    #[test]
    fn test_debug_records_only_while_debugging() {
        let mut ctx = AIContext::new(EntityId(1), ZoneId(1), idle_then(Action::LeaveGroup));
        tick(&mut ctx);
        assert_eq!(ctx.tree_state().records().count(), 0);

        ctx.set_debugging(true);
        tick(&mut ctx);
        let record = ctx.tree_state().record(NodeId(0)).unwrap();
        assert_eq!(record.status, TreeStatus::Success);
        assert_eq!(record.last_run_millis, 100);
        assert_eq!(
            ctx.tree_state().record(NodeId(1)).map(|r| r.status),
            Some(TreeStatus::Failure)
        );

        ctx.set_debugging(false);
        assert_eq!(ctx.tree_state().records().count(), 0);
    }

    #[test]
    fn test_set_tree_discards_progress() {
        let mut ctx = AIContext::new(EntityId(1), ZoneId(1), idle_then(Action::ForgetTarget));
        tick(&mut ctx);
        assert!(ctx.tree_state().has_data(NodeId(0)));
        assert_eq!(ctx.tree_state().cursor(NodeId(2)), Some(0));

        ctx.set_tree(idle_then(Action::LeaveGroup));
        assert!(!ctx.tree_state().has_data(NodeId(0)));
        assert_eq!(ctx.tree_state().cursor(NodeId(2)), None);
        assert_eq!(ctx.character.last_status, None);
        assert_eq!(ctx.time_millis(), 50);
    }

    #[test]
    fn test_requested_reset_applies_on_next_tick() {
        let mut ctx = AIContext::new(EntityId(1), ZoneId(1), idle_then(Action::ForgetTarget));
        tick(&mut ctx);
        assert!(ctx.tree_state().has_data(NodeId(0)));

        ctx.request_reset();
        assert!(ctx.tree_state().has_data(NodeId(0)));

        // The timer restarts from the reset tick
        assert_eq!(tick(&mut ctx), TreeStatus::Running);
        assert_eq!(ctx.tree_state().data(NodeId(0)), Some(NodeData::Timer(100)));
    }
}
