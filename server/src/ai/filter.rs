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

//! Entity filters
//!
//! A `Filter` node runs its filters in order and stores everything they
//! selected in the context's filtered entity list. Conditions and actions
//! further along the tree read that list. The node succeeds when the
//! selection is not empty.

use crate::ai::context::AIContext;
use crate::ai::tree::TickEnv;
use std::fmt;
use thicket_common::{EntityId, GroupId};

#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    /// Every aggro target, highest threat first
    SelectAggro,
    SelectHighestAggro,
    /// Other members of the given group, or of the entity's own group, in join order
    SelectGroupMembers(Option<GroupId>),
    /// Leader of the given group, or of the entity's own group
    SelectGroupLeader(Option<GroupId>),
    /// Other entities of the zone within `distance`, nearest first
    SelectInRange { distance: f32 },
    /// Keep only the first entity the inner filter selects
    First(Box<Filter>),
    /// Keep only the last entity the inner filter selects
    Last(Box<Filter>),
}

impl Filter {
    /// Append this filter's selection to `selected`
    pub fn apply(&self, ctx: &AIContext, env: &TickEnv<'_>, selected: &mut Vec<EntityId>) {
        let entity = ctx.entity_id();
        match self {
            Filter::SelectAggro => {
                selected.extend(ctx.aggro.entries().iter().map(|entry| entry.target));
            }
            Filter::SelectHighestAggro => selected.extend(ctx.aggro.highest_aggro()),
            Filter::SelectGroupMembers(group) => {
                if let Some(group) = group.or_else(|| env.groups.group_of(entity)) {
                    selected.extend(
                        env.groups
                            .members(group)
                            .iter()
                            .copied()
                            .filter(|member| *member != entity),
                    );
                }
            }
            Filter::SelectGroupLeader(group) => selected.extend(
                group
                    .or_else(|| env.groups.group_of(entity))
                    .and_then(|group| env.groups.leader(group)),
            ),
            Filter::SelectInRange { distance } => {
                let origin = ctx.character.position;
                let mut nearby: Vec<(f32, EntityId)> = env
                    .positions
                    .iter()
                    .filter(|(other, _)| **other != entity)
                    .map(|(other, position)| (origin.distance(position), *other))
                    .filter(|(gap, _)| *gap <= *distance)
                    .collect();
                nearby.sort_by(|a, b| a.0.total_cmp(&b.0).then_with(|| a.1.cmp(&b.1)));
                selected.extend(nearby.into_iter().map(|(_, other)| other));
            }
            Filter::First(inner) => {
                let mut inner_selected = Vec::new();
                inner.apply(ctx, env, &mut inner_selected);
                selected.extend(inner_selected.first().copied());
            }
            Filter::Last(inner) => {
                let mut inner_selected = Vec::new();
                inner.apply(ctx, env, &mut inner_selected);
                selected.extend(inner_selected.last().copied());
            }
        }
    }
}

impl fmt::Display for Filter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Filter::SelectAggro => write!(f, "SelectAggro"),
            Filter::SelectHighestAggro => write!(f, "SelectHighestAggro"),
            Filter::SelectGroupMembers(None) => write!(f, "SelectGroupMembers"),
            Filter::SelectGroupMembers(Some(group)) => write!(f, "SelectGroupMembers({})", group.0),
            Filter::SelectGroupLeader(None) => write!(f, "SelectGroupLeader"),
            Filter::SelectGroupLeader(Some(group)) => write!(f, "SelectGroupLeader({})", group.0),
            Filter::SelectInRange { distance } => write!(f, "SelectInRange({})", distance),
            Filter::First(inner) => write!(f, "First({})", inner),
            Filter::Last(inner) => write!(f, "Last({})", inner),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ai::group::GroupManager;
    use crate::ai::tree::BehaviorTree;
    use std::collections::HashMap;
    use std::sync::Arc;
    use std::time::Duration;
    use thicket_common::{Vector3, ZoneId};

    fn context() -> AIContext {
        AIContext::new(EntityId(1), ZoneId(1), Arc::new(BehaviorTree::empty("none")))
    }

    fn select(
        filter: &Filter,
        ctx: &AIContext,
        groups: &mut GroupManager,
        positions: &HashMap<EntityId, Vector3>,
    ) -> Vec<EntityId> {
        let env = TickEnv::new(Duration::ZERO, groups, positions);
        let mut selected = Vec::new();
        filter.apply(ctx, &env, &mut selected);
        selected
    }

    #[test]
    fn test_aggro_filters() {
        let mut ctx = context();
        ctx.aggro.add_aggro(EntityId(4), 2.0, 0);
        ctx.aggro.add_aggro(EntityId(5), 9.0, 0);
        ctx.aggro.add_aggro(EntityId(6), 5.0, 0);
        let mut groups = GroupManager::new();
        let positions = HashMap::new();

        assert_eq!(
            select(&Filter::SelectAggro, &ctx, &mut groups, &positions),
            vec![EntityId(5), EntityId(6), EntityId(4)]
        );
        assert_eq!(
            select(&Filter::SelectHighestAggro, &ctx, &mut groups, &positions),
            vec![EntityId(5)]
        );
        assert_eq!(
            select(&Filter::Last(Box::new(Filter::SelectAggro)), &ctx, &mut groups, &positions),
            vec![EntityId(4)]
        );
        assert_eq!(
            select(&Filter::First(Box::new(Filter::SelectAggro)), &ctx, &mut groups, &positions),
            vec![EntityId(5)]
        );
    }

    #[test]
    fn test_group_filters_skip_self() {
        let ctx = context();
        let mut groups = GroupManager::new();
        groups.add(EntityId(7), GroupId(2));
        groups.add(EntityId(1), GroupId(2));
        groups.add(EntityId(8), GroupId(2));
        let positions = HashMap::new();

        assert_eq!(
            select(&Filter::SelectGroupMembers(None), &ctx, &mut groups, &positions),
            vec![EntityId(7), EntityId(8)]
        );
        assert_eq!(
            select(&Filter::SelectGroupLeader(None), &ctx, &mut groups, &positions),
            vec![EntityId(7)]
        );
        let strangers = Filter::SelectGroupMembers(Some(GroupId(3)));
        assert!(select(&strangers, &ctx, &mut groups, &positions).is_empty());
    }

    #[test]
    fn test_range_filter_nearest_first() {
        let ctx = context();
        let mut groups = GroupManager::new();
        let positions = HashMap::from([
            (EntityId(1), Vector3::ZERO),
            (EntityId(2), Vector3::new(4.0, 0.0, 0.0)),
            (EntityId(3), Vector3::new(0.0, 0.0, 1.0)),
            (EntityId(4), Vector3::new(30.0, 0.0, 0.0)),
        ]);

        assert_eq!(
            select(&Filter::SelectInRange { distance: 5.0 }, &ctx, &mut groups, &positions),
            vec![EntityId(3), EntityId(2)]
        );
    }
}
