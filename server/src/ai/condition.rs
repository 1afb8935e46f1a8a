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

//! Condition expressions
//!
//! Conditions are pure predicates over an [`AIContext`] and the zone state
//! visible to it. They never mutate anything and never report Running.

use crate::ai::context::AIContext;
use crate::ai::tree::TickEnv;
use std::fmt;
use thicket_common::GroupId;

#[derive(Debug, Clone, PartialEq)]
pub enum ConditionExpr {
    True,
    False,
    Not(Box<ConditionExpr>),
    /// True when every operand is true. Short-circuits on the first false one.
    And(Vec<ConditionExpr>),
    /// True when any operand is true. Short-circuits on the first true one.
    Or(Vec<ConditionExpr>),
    /// The aggro table is not empty
    HasEnemies,
    /// Member of the given group, or of any group when absent
    IsInGroup(Option<GroupId>),
    /// Leader of the given group, or of its own group when absent
    IsGroupLeader(Option<GroupId>),
    /// Within `distance` of the centroid of the other members of `group`
    IsCloseToGroup { group: GroupId, distance: f32 },
    /// Highest-aggro target is within `distance`
    IsTargetInRange { distance: f32 },
    /// The last Filter node selected at least one entity
    HasFilteredEntities,
}

impl ConditionExpr {
    pub fn evaluate(&self, ctx: &AIContext, env: &TickEnv<'_>) -> bool {
        let entity = ctx.entity_id();
        match self {
            ConditionExpr::True => true,
            ConditionExpr::False => false,
            ConditionExpr::Not(inner) => !inner.evaluate(ctx, env),
            ConditionExpr::And(operands) => operands.iter().all(|c| c.evaluate(ctx, env)),
            ConditionExpr::Or(operands) => operands.iter().any(|c| c.evaluate(ctx, env)),
            ConditionExpr::HasEnemies => !ctx.aggro.is_empty(),
            ConditionExpr::IsInGroup(None) => env.groups.group_of(entity).is_some(),
            ConditionExpr::IsInGroup(Some(group)) => env.groups.is_member(entity, *group),
            ConditionExpr::IsGroupLeader(group) => group
                .or_else(|| env.groups.group_of(entity))
                .is_some_and(|group| env.groups.is_leader(entity, group)),
            ConditionExpr::IsCloseToGroup { group, distance } => env
                .groups
                .centroid(*group, Some(entity), |member| env.position_of(member))
                .is_some_and(|centroid| {
                    ctx.character.position.distance(&centroid) <= *distance
                }),
            ConditionExpr::IsTargetInRange { distance } => ctx
                .aggro
                .highest_aggro()
                .and_then(|target| env.position_of(target))
                .is_some_and(|target| ctx.character.position.distance(&target) <= *distance),
            ConditionExpr::HasFilteredEntities => !ctx.filtered_entities().is_empty(),
        }
    }
}

impl fmt::Display for ConditionExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fn list(f: &mut fmt::Formatter<'_>, name: &str, operands: &[ConditionExpr]) -> fmt::Result {
            write!(f, "{}(", name)?;
            for (i, operand) in operands.iter().enumerate() {
                if i > 0 {
                    write!(f, ",")?;
                }
                write!(f, "{}", operand)?;
            }
            write!(f, ")")
        }

        match self {
            ConditionExpr::True => write!(f, "True"),
            ConditionExpr::False => write!(f, "False"),
            ConditionExpr::Not(inner) => write!(f, "Not({})", inner),
            ConditionExpr::And(operands) => list(f, "And", operands),
            ConditionExpr::Or(operands) => list(f, "Or", operands),
            ConditionExpr::HasEnemies => write!(f, "HasEnemies"),
            ConditionExpr::IsInGroup(None) => write!(f, "IsInGroup"),
            ConditionExpr::IsInGroup(Some(group)) => write!(f, "IsInGroup({})", group.0),
            ConditionExpr::IsGroupLeader(None) => write!(f, "IsGroupLeader"),
            ConditionExpr::IsGroupLeader(Some(group)) => write!(f, "IsGroupLeader({})", group.0),
            ConditionExpr::IsCloseToGroup { group, distance } => {
                write!(f, "IsCloseToGroup({},{})", group.0, distance)
            }
            ConditionExpr::IsTargetInRange { distance } => write!(f, "IsTargetInRange({})", distance),
            ConditionExpr::HasFilteredEntities => write!(f, "HasFilteredEntities"),
        }
    }
}
