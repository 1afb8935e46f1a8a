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

//! Behavior Tree
//!
//! A [`BehaviorTree`] is an immutable arena of [`BehaviorNode`]s shared by
//! every entity running it. Children are referenced by [`NodeId`] index.
//! All per-entity progress (sequence cursors, timers, counters and the
//! running node) lives in the entity's [`AIContext`], so one tree can drive
//! any number of entities without cross-talk.
//!
//! ## Evaluation
//!
//! - **Sequence** (and **And**) resumes at the child that was Running on the
//!   previous tick.
//! - **Selector** (and **Or**) always restarts from its first child. When a higher
//!   priority child preempts a previously Running one, the preempted
//!   subtree's activation state is reset.
//! - **Parallel** ticks every child each tick.
//! - **RandomSelector** sticks with its chosen child while it is Running.
//! - **Filter** replaces the context's filtered entities with its selection.
//! - A node whose guard is false fails without being evaluated.

use crate::ai::context::{AIContext, NodeData};
use crate::ai::group::GroupManager;
use crate::ai::node::{BehaviorNode, Composite, Decorator, NodeKind};
use crate::error::{AiError, AiResult};
use rand::Rng;
use std::collections::HashMap;
use std::time::Duration;
use thicket_common::{EntityId, NodeId, TreeStatus, Vector3};

/// Zone state visible to a context while it is ticked
pub struct TickEnv<'a> {
    /// Simulation time advanced by this tick
    pub dt: Duration,
    pub groups: &'a mut GroupManager,
    /// Entity positions at the start of the tick
    pub positions: &'a HashMap<EntityId, Vector3>,
}

impl<'a> TickEnv<'a> {
    pub fn new(
        dt: Duration,
        groups: &'a mut GroupManager,
        positions: &'a HashMap<EntityId, Vector3>,
    ) -> Self {
        Self {
            dt,
            groups,
            positions,
        }
    }

    pub fn position_of(&self, entity: EntityId) -> Option<Vector3> {
        self.positions.get(&entity).copied()
    }
}

#[derive(Debug, Clone)]
pub struct BehaviorTree {
    name: String,
    nodes: Vec<BehaviorNode>,
    root: Option<NodeId>,
}

impl BehaviorTree {
    /// Validate and assemble a tree from its arena.
    ///
    /// Every node must be reachable from `root` through exactly one parent
    /// and carry the number of children its kind allows.
    pub fn new(
        name: impl Into<String>,
        nodes: Vec<BehaviorNode>,
        root: Option<NodeId>,
    ) -> AiResult<Self> {
        let name = name.into();
        let len = nodes.len();
        let mut parents = vec![0u32; len];

        for (index, node) in nodes.iter().enumerate() {
            let (min, max) = node.kind.arity();
            let count = node.children.len();
            if count < min || count > max {
                return Err(AiError::Load(format!(
                    "node '{}' in tree '{}' has {} children",
                    node, name, count
                )));
            }
            for child in &node.children {
                let child_index = child.index();
                if child_index >= len {
                    return Err(AiError::Load(format!(
                        "node '{}' in tree '{}' references missing child {}",
                        node, name, child
                    )));
                }
                if child_index == index {
                    return Err(AiError::Load(format!(
                        "node '{}' in tree '{}' is its own child",
                        node, name
                    )));
                }
                parents[child_index] += 1;
                if parents[child_index] > 1 {
                    return Err(AiError::Load(format!(
                        "node {} in tree '{}' has more than one parent",
                        child, name
                    )));
                }
            }
        }

        match root {
            None if len > 0 => {
                return Err(AiError::Load(format!("tree '{}' has nodes but no root", name)));
            }
            None => {}
            Some(root) => {
                if root.index() >= len || parents[root.index()] > 0 {
                    return Err(AiError::Load(format!(
                        "tree '{}' has an invalid root {}",
                        name, root
                    )));
                }

                let mut reached = 0usize;
                let mut stack = vec![root];
                while let Some(id) = stack.pop() {
                    reached += 1;
                    stack.extend(nodes[id.index()].children.iter().copied());
                }
                if reached != len {
                    return Err(AiError::Load(format!(
                        "tree '{}' has {} unreachable nodes",
                        name,
                        len - reached
                    )));
                }
            }
        }

        Ok(Self { name, nodes, root })
    }

    /// A tree without nodes. Always evaluates to Failure.
    pub fn empty(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            nodes: Vec::new(),
            root: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn root(&self) -> Option<NodeId> {
        self.root
    }

    pub fn node(&self, id: NodeId) -> Option<&BehaviorNode> {
        self.nodes.get(id.index())
    }

    pub fn nodes(&self) -> &[BehaviorNode] {
        &self.nodes
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Evaluate the tree once for `ctx`.
    pub fn tick(&self, ctx: &mut AIContext, env: &mut TickEnv<'_>) -> AiResult<TreeStatus> {
        ctx.state.running = None;
        match self.root {
            Some(root) => self.tick_node(root, ctx, env),
            None => Ok(TreeStatus::Failure),
        }
    }

    fn tick_node(&self, id: NodeId, ctx: &mut AIContext, env: &mut TickEnv<'_>) -> AiResult<TreeStatus> {
        let node = self.node(id).ok_or_else(|| {
            AiError::Node(format!("node {} missing from tree '{}'", id, self.name))
        })?;

        if let Some(guard) = &node.guard {
            if !guard.evaluate(ctx, env) {
                self.reset_subtree(id, ctx);
                ctx.record(id, TreeStatus::Failure);
                return Ok(TreeStatus::Failure);
            }
        }

        let status = match &node.kind {
            NodeKind::Composite(composite) => match composite {
                Composite::Sequence | Composite::And => {
                    self.tick_sequence(id, &node.children, ctx, env)?
                }
                Composite::Selector | Composite::Or => {
                    self.tick_selector(id, &node.children, ctx, env)?
                }
                Composite::Parallel => self.tick_parallel(&node.children, ctx, env)?,
                Composite::RandomSelector => self.tick_random(id, &node.children, ctx, env)?,
            },
            NodeKind::Decorator(decorator) => {
                let child = node.children.first().copied().ok_or_else(|| {
                    AiError::Node(format!("decorator '{}' has no child", node))
                })?;
                self.tick_decorator(id, *decorator, child, ctx, env)?
            }
            NodeKind::Condition(condition) => {
                if condition.evaluate(ctx, env) {
                    TreeStatus::Success
                } else {
                    TreeStatus::Failure
                }
            }
            NodeKind::Filter(filters) => {
                let mut selected = Vec::new();
                for filter in filters {
                    filter.apply(ctx, env, &mut selected);
                }
                let status = if selected.is_empty() {
                    TreeStatus::Failure
                } else {
                    TreeStatus::Success
                };
                ctx.filtered = selected;
                status
            }
            NodeKind::Action(action) => action.execute(id, ctx, env)?,
        };

        if status == TreeStatus::Running && node.kind.is_leaf() && ctx.state.running.is_none() {
            ctx.state.running = Some(id);
        }
        ctx.record(id, status);
        Ok(status)
    }

    fn tick_sequence(
        &self,
        id: NodeId,
        children: &[NodeId],
        ctx: &mut AIContext,
        env: &mut TickEnv<'_>,
    ) -> AiResult<TreeStatus> {
        let start = match ctx.state.cursors.get(&id) {
            Some(cursor) if *cursor < children.len() => *cursor,
            _ => 0,
        };

        for (index, child) in children.iter().enumerate().skip(start) {
            match self.tick_node(*child, ctx, env)? {
                TreeStatus::Success => continue,
                TreeStatus::Running => {
                    ctx.state.cursors.insert(id, index);
                    return Ok(TreeStatus::Running);
                }
                TreeStatus::Failure => {
                    ctx.state.cursors.remove(&id);
                    return Ok(TreeStatus::Failure);
                }
            }
        }

        ctx.state.cursors.remove(&id);
        Ok(TreeStatus::Success)
    }

    fn tick_selector(
        &self,
        id: NodeId,
        children: &[NodeId],
        ctx: &mut AIContext,
        env: &mut TickEnv<'_>,
    ) -> AiResult<TreeStatus> {
        let previous = ctx.state.cursors.get(&id).copied();

        for (index, child) in children.iter().enumerate() {
            let status = self.tick_node(*child, ctx, env)?;
            if status == TreeStatus::Failure {
                continue;
            }

            // A higher priority child took over from the one that was running
            if let Some(previous) = previous.filter(|previous| *previous != index) {
                if let Some(preempted) = children.get(previous) {
                    self.reset_subtree(*preempted, ctx);
                }
            }

            if status == TreeStatus::Running {
                ctx.state.cursors.insert(id, index);
            } else {
                ctx.state.cursors.remove(&id);
            }
            return Ok(status);
        }

        ctx.state.cursors.remove(&id);
        Ok(TreeStatus::Failure)
    }

    fn tick_parallel(
        &self,
        children: &[NodeId],
        ctx: &mut AIContext,
        env: &mut TickEnv<'_>,
    ) -> AiResult<TreeStatus> {
        let mut all_succeeded = true;
        for child in children {
            match self.tick_node(*child, ctx, env)? {
                TreeStatus::Success => {}
                TreeStatus::Running => all_succeeded = false,
                TreeStatus::Failure => {
                    for child in children {
                        self.reset_subtree(*child, ctx);
                    }
                    return Ok(TreeStatus::Failure);
                }
            }
        }

        Ok(if all_succeeded {
            TreeStatus::Success
        } else {
            TreeStatus::Running
        })
    }

    fn tick_random(
        &self,
        id: NodeId,
        children: &[NodeId],
        ctx: &mut AIContext,
        env: &mut TickEnv<'_>,
    ) -> AiResult<TreeStatus> {
        if children.is_empty() {
            return Ok(TreeStatus::Failure);
        }

        let index = match ctx.state.cursors.get(&id) {
            Some(cursor) if *cursor < children.len() => *cursor,
            _ => ctx.rng.random_range(0..children.len()),
        };

        let status = self.tick_node(children[index], ctx, env)?;
        if status == TreeStatus::Running {
            ctx.state.cursors.insert(id, index);
        } else {
            ctx.state.cursors.remove(&id);
        }
        Ok(status)
    }

    fn tick_decorator(
        &self,
        id: NodeId,
        decorator: Decorator,
        child: NodeId,
        ctx: &mut AIContext,
        env: &mut TickEnv<'_>,
    ) -> AiResult<TreeStatus> {
        let status = match decorator {
            Decorator::Invert => match self.tick_node(child, ctx, env)? {
                TreeStatus::Success => TreeStatus::Failure,
                TreeStatus::Failure => TreeStatus::Success,
                TreeStatus::Running => TreeStatus::Running,
            },
            Decorator::Succeed => match self.tick_node(child, ctx, env)? {
                TreeStatus::Running => TreeStatus::Running,
                _ => TreeStatus::Success,
            },
            Decorator::Fail => match self.tick_node(child, ctx, env)? {
                TreeStatus::Running => TreeStatus::Running,
                _ => TreeStatus::Failure,
            },
            Decorator::Limit { max } => {
                let count = match ctx.state.data.get(&id) {
                    Some(NodeData::Counter(count)) => *count,
                    _ => 0,
                };
                if count >= max {
                    return Ok(TreeStatus::Failure);
                }
                let status = self.tick_node(child, ctx, env)?;
                if status.is_complete() {
                    ctx.state.data.insert(id, NodeData::Counter(count + 1));
                }
                status
            }
            Decorator::Throttle { millis } => {
                let now = ctx.time_millis();
                if let Some(NodeData::LastRun(last)) = ctx.state.data.get(&id) {
                    if now.saturating_sub(*last) < millis {
                        return Ok(TreeStatus::Failure);
                    }
                }
                let status = self.tick_node(child, ctx, env)?;
                if status.is_complete() {
                    ctx.state.data.insert(id, NodeData::LastRun(now));
                }
                status
            }
        };
        Ok(status)
    }

    /// Drop the activation state (cursors and timers) of `id` and its descendants.
    ///
    /// Limit counters and throttle timestamps survive; only a full context
    /// reset clears them.
    pub(crate) fn reset_subtree(&self, id: NodeId, ctx: &mut AIContext) {
        let mut stack = vec![id];
        while let Some(current) = stack.pop() {
            ctx.state.cursors.remove(&current);
            if matches!(ctx.state.data.get(&current), Some(NodeData::Timer(_))) {
                ctx.state.data.remove(&current);
            }
            if let Some(node) = self.node(current) {
                stack.extend(node.children.iter().copied());
            }
        }
    }
}
