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

//! Identifier and value types shared by the server and debug clients

use serde::{Deserialize, Serialize};
use std::fmt;

/// Stable identifier of an AI-controlled entity.
///
/// Allocated by the server and never reused during its lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EntityId(pub u64);

impl EntityId {
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    pub fn value(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "entity#{}", self.0)
    }
}

/// Identifier of a zone, a partition of entities ticked together
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ZoneId(pub u32);

impl fmt::Display for ZoneId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "zone#{}", self.0)
    }
}

/// Identifier of an entity group within a zone
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct GroupId(pub u32);

impl fmt::Display for GroupId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "group#{}", self.0)
    }
}

/// Index of a node inside a behavior tree's node arena
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeId(pub u32);

impl NodeId {
    pub fn index(&self) -> usize {
        self.0 as usize
    }
}

impl From<usize> for NodeId {
    fn from(index: usize) -> Self {
        Self(index as u32)
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "node#{}", self.0)
    }
}

/// Result of evaluating a behavior tree node for one tick
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TreeStatus {
    Success,
    Failure,
    Running,
}

impl TreeStatus {
    pub fn to_u8(self) -> u8 {
        match self {
            TreeStatus::Success => 0,
            TreeStatus::Failure => 1,
            TreeStatus::Running => 2,
        }
    }

    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(TreeStatus::Success),
            1 => Some(TreeStatus::Failure),
            2 => Some(TreeStatus::Running),
            _ => None,
        }
    }

    /// Whether the node finished this tick (either way)
    pub fn is_complete(self) -> bool {
        !matches!(self, TreeStatus::Running)
    }
}

impl fmt::Display for TreeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TreeStatus::Success => write!(f, "SUCCESS"),
            TreeStatus::Failure => write!(f, "FAILURE"),
            TreeStatus::Running => write!(f, "RUNNING"),
        }
    }
}

/// Scheduling state of a zone
///
/// Zones start `Idle`, move to `Running` once started and toggle between
/// `Running` and `Paused` through pause requests. A step request executes a
/// single tick of a `Paused` zone without leaving that state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ZoneState {
    Idle,
    Running,
    Paused,
}

impl ZoneState {
    pub fn to_u8(self) -> u8 {
        match self {
            ZoneState::Idle => 0,
            ZoneState::Running => 1,
            ZoneState::Paused => 2,
        }
    }

    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(ZoneState::Idle),
            1 => Some(ZoneState::Running),
            2 => Some(ZoneState::Paused),
            _ => None,
        }
    }
}

impl fmt::Display for ZoneState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ZoneState::Idle => write!(f, "idle"),
            ZoneState::Running => write!(f, "running"),
            ZoneState::Paused => write!(f, "paused"),
        }
    }
}

/// World-space position or direction
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Vector3 {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Vector3 {
    pub const ZERO: Vector3 = Vector3 {
        x: 0.0,
        y: 0.0,
        z: 0.0,
    };

    pub fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }

    pub fn length(&self) -> f32 {
        (self.x * self.x + self.y * self.y + self.z * self.z).sqrt()
    }

    pub fn distance(&self, other: &Vector3) -> f32 {
        (*other - *self).length()
    }

    pub fn scale(&self, factor: f32) -> Vector3 {
        Vector3::new(self.x * factor, self.y * factor, self.z * factor)
    }

    /// Move from `self` toward `target` by at most `max_step`, never overshooting
    pub fn step_toward(&self, target: &Vector3, max_step: f32) -> Vector3 {
        let delta = *target - *self;
        let distance = delta.length();
        if distance <= max_step || distance <= f32::EPSILON {
            return *target;
        }
        *self + delta.scale(max_step / distance)
    }
}

impl std::ops::Add for Vector3 {
    type Output = Vector3;

    fn add(self, rhs: Vector3) -> Vector3 {
        Vector3::new(self.x + rhs.x, self.y + rhs.y, self.z + rhs.z)
    }
}

impl std::ops::Sub for Vector3 {
    type Output = Vector3;

    fn sub(self, rhs: Vector3) -> Vector3 {
        Vector3::new(self.x - rhs.x, self.y - rhs.y, self.z - rhs.z)
    }
}

impl fmt::Display for Vector3 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.2}:{:.2}:{:.2}", self.x, self.y, self.z)
    }
}
