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

//! Zone-wide group membership
//!
//! An entity belongs to at most one group. Members are kept in join order and
//! the first member is the group leader; when the leader leaves, the next
//! member in join order takes over.

use std::collections::{BTreeMap, HashMap};
use thicket_common::{EntityId, GroupId, Vector3};

/// Membership change, drained by the server after each tick
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GroupEvent {
    Joined { entity: EntityId, group: GroupId },
    Left { entity: EntityId, group: GroupId },
}

#[derive(Debug, Clone, Default)]
pub struct GroupManager {
    memberships: HashMap<EntityId, GroupId>,
    groups: BTreeMap<GroupId, Vec<EntityId>>,
    events: Vec<GroupEvent>,
}

impl GroupManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `entity` to `group`, leaving its previous group first.
    ///
    /// Returns false if the entity was already a member of `group`.
    pub fn add(&mut self, entity: EntityId, group: GroupId) -> bool {
        if self.memberships.get(&entity) == Some(&group) {
            return false;
        }
        self.remove(entity);

        self.memberships.insert(entity, group);
        self.groups.entry(group).or_default().push(entity);
        self.events.push(GroupEvent::Joined { entity, group });
        true
    }

    /// Remove `entity` from its group. Removing a non-member is a no-op.
    pub fn remove(&mut self, entity: EntityId) -> Option<GroupId> {
        let group = self.memberships.remove(&entity)?;
        if let Some(members) = self.groups.get_mut(&group) {
            members.retain(|member| *member != entity);
            if members.is_empty() {
                self.groups.remove(&group);
            }
        }
        self.events.push(GroupEvent::Left { entity, group });
        Some(group)
    }

    pub fn group_of(&self, entity: EntityId) -> Option<GroupId> {
        self.memberships.get(&entity).copied()
    }

    pub fn is_member(&self, entity: EntityId, group: GroupId) -> bool {
        self.group_of(entity) == Some(group)
    }

    /// Members in join order
    pub fn members(&self, group: GroupId) -> &[EntityId] {
        self.groups.get(&group).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn leader(&self, group: GroupId) -> Option<EntityId> {
        self.members(group).first().copied()
    }

    pub fn is_leader(&self, entity: EntityId, group: GroupId) -> bool {
        self.leader(group) == Some(entity)
    }

    pub fn size(&self, group: GroupId) -> usize {
        self.members(group).len()
    }

    /// Non-empty groups in ascending id order
    pub fn group_ids(&self) -> impl Iterator<Item = GroupId> + '_ {
        self.groups.keys().copied()
    }

    /// Average position of the members of `group`, skipping `exclude` and any
    /// member whose position is unknown.
    pub fn centroid<F>(&self, group: GroupId, exclude: Option<EntityId>, position: F) -> Option<Vector3>
    where
        F: Fn(EntityId) -> Option<Vector3>,
    {
        let mut sum = Vector3::ZERO;
        let mut count = 0usize;
        for member in self.members(group) {
            if Some(*member) == exclude {
                continue;
            }
            if let Some(pos) = position(*member) {
                sum = sum + pos;
                count += 1;
            }
        }
        (count > 0).then(|| sum.scale(1.0 / count as f32))
    }

    pub fn drain_events(&mut self) -> Vec<GroupEvent> {
        std::mem::take(&mut self.events)
    }
}
