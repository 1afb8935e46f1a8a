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

//! Leaf actions
//!
//! Actions are the only nodes allowed to change an entity: its position,
//! its aggro table and its group membership. Multi-tick work keeps its
//! progress in the context's [`TreeState`](crate::ai::context::TreeState),
//! never in the shared tree.

use crate::ai::context::{AIContext, NodeData};
use crate::ai::tree::TickEnv;
use crate::error::AiResult;
use std::fmt;
use std::sync::Arc;
use thicket_common::{GroupId, NodeId, TreeStatus, Vector3};

/// Host-provided action behavior.
///
/// Errors returned from [`CustomAction::execute`] are contained by the
/// owning context: the tick result becomes Failure and the context's tree
/// state is reset.
pub trait CustomAction: Send + Sync + fmt::Debug {
    fn name(&self) -> &str;

    fn execute(&self, node: NodeId, ctx: &mut AIContext, env: &mut TickEnv<'_>) -> AiResult<TreeStatus>;
}

#[derive(Debug, Clone)]
pub enum Action {
    /// Running until `millis` of simulation time passed, then Success
    Idle { millis: u64 },
    Print { message: String },
    JoinGroup(GroupId),
    LeaveGroup,
    MoveToGroup { group: GroupId, distance: f32 },
    MoveToTarget { distance: f32 },
    /// Move toward the first filtered entity
    MoveToFiltered { distance: f32 },
    /// Add `amount` of aggro against every filtered entity
    AggroFiltered { amount: f32 },
    ForgetTarget,
    Custom(Arc<dyn CustomAction>),
}

impl Action {
    pub fn execute(&self, node: NodeId, ctx: &mut AIContext, env: &mut TickEnv<'_>) -> AiResult<TreeStatus> {
        let status = match self {
            Action::Idle { millis } => {
                let now = ctx.time_millis();
                let started = match ctx.state.data.get(&node) {
                    Some(NodeData::Timer(started)) => *started,
                    _ => {
                        ctx.state.data.insert(node, NodeData::Timer(now));
                        now
                    }
                };
                if now.saturating_sub(started) >= *millis {
                    ctx.state.data.remove(&node);
                    TreeStatus::Success
                } else {
                    TreeStatus::Running
                }
            }
            Action::Print { message } => {
                tracing::info!("[{}] {}", ctx.entity_id(), message);
                TreeStatus::Success
            }
            Action::JoinGroup(group) => {
                env.groups.add(ctx.entity_id(), *group);
                TreeStatus::Success
            }
            Action::LeaveGroup => match env.groups.remove(ctx.entity_id()) {
                Some(_) => TreeStatus::Success,
                None => TreeStatus::Failure,
            },
            Action::MoveToGroup { group, distance } => {
                let entity = ctx.entity_id();
                let centroid = env.groups.centroid(*group, Some(entity), |member| env.position_of(member));
                match centroid {
                    Some(target) => move_toward(ctx, env, target, *distance),
                    None => TreeStatus::Failure,
                }
            }
            Action::MoveToTarget { distance } => {
                let target = ctx
                    .aggro
                    .highest_aggro()
                    .and_then(|target| env.position_of(target));
                match target {
                    Some(target) => move_toward(ctx, env, target, *distance),
                    None => TreeStatus::Failure,
                }
            }
            Action::MoveToFiltered { distance } => {
                let target = ctx
                    .filtered_entities()
                    .first()
                    .and_then(|entity| env.position_of(*entity));
                match target {
                    Some(target) => move_toward(ctx, env, target, *distance),
                    None => TreeStatus::Failure,
                }
            }
            Action::AggroFiltered { amount } => {
                if ctx.filtered.is_empty() {
                    TreeStatus::Failure
                } else {
                    let now = ctx.time_millis();
                    for target in &ctx.filtered {
                        ctx.aggro.add_aggro(*target, *amount, now);
                    }
                    TreeStatus::Success
                }
            }
            Action::ForgetTarget => match ctx.aggro.highest_aggro() {
                Some(target) => {
                    ctx.aggro.remove(target);
                    TreeStatus::Success
                }
                None => TreeStatus::Failure,
            },
            Action::Custom(action) => return action.execute(node, ctx, env),
        };
        Ok(status)
    }

    pub fn type_name(&self) -> &str {
        match self {
            Action::Idle { .. } => "Idle",
            Action::Print { .. } => "Print",
            Action::JoinGroup(_) => "JoinGroup",
            Action::LeaveGroup => "LeaveGroup",
            Action::MoveToGroup { .. } => "MoveToGroup",
            Action::MoveToTarget { .. } => "MoveToTarget",
            Action::MoveToFiltered { .. } => "MoveToFiltered",
            Action::AggroFiltered { .. } => "AggroFiltered",
            Action::ForgetTarget => "ForgetTarget",
            Action::Custom(action) => action.name(),
        }
    }
}

/// Step toward `target` at the character's speed. Success once within `distance`.
fn move_toward(ctx: &mut AIContext, env: &TickEnv<'_>, target: Vector3, distance: f32) -> TreeStatus {
    let position = ctx.character.position;
    if position.distance(&target) <= distance {
        return TreeStatus::Success;
    }

    let max_step = ctx.character.speed.max(0.0) * env.dt.as_secs_f32();
    let next = position.step_toward(&target, max_step);
    let heading = target - position;
    if heading.x != 0.0 || heading.z != 0.0 {
        ctx.character.orientation = heading.z.atan2(heading.x);
    }
    ctx.character.position = next;

    if next.distance(&target) <= distance {
        TreeStatus::Success
    } else {
        TreeStatus::Running
    }
}
