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

//! Read-only world state published at the end of every tick

use thicket_common::message::{NameEntry, Names};
use thicket_common::{EntityId, GroupId, TreeStatus, Vector3, ZoneId, ZoneState};

#[derive(Debug, Clone, PartialEq)]
pub struct EntitySnapshot {
    pub entity_id: EntityId,
    pub tree: String,
    pub position: Vector3,
    pub status: Option<TreeStatus>,
    pub group: Option<GroupId>,
    pub target: Option<EntityId>,
    pub paused: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ZoneSnapshot {
    pub id: ZoneId,
    pub name: String,
    pub state: ZoneState,
    pub entities: Vec<EntitySnapshot>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct WorldSnapshot {
    /// Number of ticks completed when the snapshot was taken
    pub tick: u64,
    pub zones: Vec<ZoneSnapshot>,
    /// Connected debug sessions
    pub sessions: usize,
}

impl WorldSnapshot {
    pub fn zone(&self, id: ZoneId) -> Option<&ZoneSnapshot> {
        self.zones.iter().find(|zone| zone.id == id)
    }

    pub fn zone_by_name(&self, name: &str) -> Option<&ZoneSnapshot> {
        self.zones.iter().find(|zone| zone.name == name)
    }

    pub fn entity(&self, id: EntityId) -> Option<&EntitySnapshot> {
        self.zones
            .iter()
            .flat_map(|zone| zone.entities.iter())
            .find(|entity| entity.entity_id == id)
    }

    pub fn entity_count(&self) -> usize {
        self.zones.iter().map(|zone| zone.entities.len()).sum()
    }

    /// Zone directory as sent to debuggers
    pub fn names(&self) -> Names {
        Names {
            names: self
                .zones
                .iter()
                .map(|zone| NameEntry {
                    id: zone.id.0,
                    name: zone.name.clone(),
                })
                .collect(),
        }
    }
}
