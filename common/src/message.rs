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

//! Debug Protocol Messages
//!
//! Every message exchanged between the AI server and a remote debugger is a
//! variant of [`DebugMessage`]. Each variant carries its own payload struct
//! with a fixed field layout; the wire discriminator of each variant is
//! stable (see [`DebugMessage::discriminator`]).
//!
//! | Message          | Direction | Purpose                                  |
//! |------------------|-----------|------------------------------------------|
//! | AddNode          | S→C       | new AI entity announced                  |
//! | UpdateNode       | S→C       | per-tick state delta                     |
//! | DeleteNode       | S→C       | AI entity removed                        |
//! | CharacterStatic  | S→C       | immutable attributes, sent once          |
//! | CharacterDetails | S→C       | dynamic state of the selected entity     |
//! | Names            | S→C       | zone directory                           |
//! | Select           | C→S       | select (or clear) the inspected entity   |
//! | Pause            | C→S       | pause or resume a zone                   |
//! | Step             | C→S       | run one tick of a paused zone            |
//! | State            | S→C       | zone state confirmation                  |
//! | Change           | C→S       | subscribe to a zone                      |
//! | Reset            | C→S       | reset an entity's tree state             |
//! | Subscribe        | C→S       | choose which message kinds to receive    |
//! | Ping             | C↔S       | keep-alive                               |
//! | Nack             | S→C       | request rejected                         |

use crate::types::{EntityId, GroupId, NodeId, TreeStatus, Vector3, ZoneId, ZoneState};
use flagset::{FlagSet, flags};

flags! {
    /// Message kinds a debug session may subscribe to
    pub enum MessageKind: u16 {
        AddNode,
        UpdateNode,
        DeleteNode,
        CharacterStatic,
        CharacterDetails,
        Names,
        Select,
        Pause,
        Step,
        State,
        Change,
        Reset,
        Subscribe,
        Ping,
        Nack,
    }
}

/// Set of message kinds
pub type MessageKinds = FlagSet<MessageKind>;

/// A single `key=value` attribute of a character
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attribute {
    pub key: String,
    pub value: String,
}

impl Attribute {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

/// New AI entity announcement
#[derive(Debug, Clone, PartialEq)]
pub struct AddNode {
    pub entity_id: EntityId,
    pub tree_name: String,
    pub position: Vector3,
}

/// Changes of one entity's observable state since the last update.
///
/// Every field is optional; `None` means unchanged. For fields whose value
/// may itself be absent (running node, group, target) the inner option
/// carries the new value.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct NodeDelta {
    pub position: Option<Vector3>,
    pub orientation: Option<f32>,
    pub status: Option<TreeStatus>,
    pub running_node: Option<Option<NodeId>>,
    pub group: Option<Option<GroupId>>,
    pub target: Option<Option<EntityId>>,
}

impl NodeDelta {
    /// A delta without any changed field
    pub fn is_empty(&self) -> bool {
        self.position.is_none()
            && self.orientation.is_none()
            && self.status.is_none()
            && self.running_node.is_none()
            && self.group.is_none()
            && self.target.is_none()
    }
}

/// Periodic state refresh of one entity
#[derive(Debug, Clone, PartialEq)]
pub struct UpdateNode {
    pub entity_id: EntityId,
    pub delta: NodeDelta,
}

/// Entity removal announcement
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeleteNode {
    pub entity_id: EntityId,
}

/// Immutable character attributes
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CharacterStatic {
    pub entity_id: EntityId,
    pub attributes: Vec<Attribute>,
}

/// Aggro entry as reported to debuggers
#[derive(Debug, Clone, PartialEq)]
pub struct AggroState {
    pub target: EntityId,
    pub value: f32,
}

/// Debug record of one tree node for the selected entity
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeState {
    pub node_id: NodeId,
    pub name: String,
    pub kind: String,
    pub status: Option<TreeStatus>,
    pub last_run_millis: u64,
}

/// Dynamic state of the selected entity
#[derive(Debug, Clone, PartialEq)]
pub struct CharacterDetails {
    pub entity_id: EntityId,
    pub attributes: Vec<Attribute>,
    pub aggro: Vec<AggroState>,
    pub nodes: Vec<NodeState>,
}

/// One directory entry of a [`Names`] message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NameEntry {
    pub id: u32,
    pub name: String,
}

/// Directory of known zones
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Names {
    pub names: Vec<NameEntry>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Select {
    pub entity_id: Option<EntityId>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pause {
    pub zone_id: ZoneId,
    pub paused: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Step {
    pub zone_id: ZoneId,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct State {
    pub zone_id: ZoneId,
    pub state: ZoneState,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Change {
    pub zone_id: Option<ZoneId>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reset {
    pub entity_id: EntityId,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Subscribe {
    pub kinds: MessageKinds,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ping {
    pub nonce: u32,
}

/// Reason a request was rejected
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NackCode {
    Decode,
    State,
    NotFound,
    Conflict,
    Load,
    Internal,
}

impl NackCode {
    pub fn to_u8(self) -> u8 {
        match self {
            NackCode::Decode => 1,
            NackCode::State => 2,
            NackCode::NotFound => 3,
            NackCode::Conflict => 4,
            NackCode::Load => 5,
            NackCode::Internal => 6,
        }
    }

    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            1 => Some(NackCode::Decode),
            2 => Some(NackCode::State),
            3 => Some(NackCode::NotFound),
            4 => Some(NackCode::Conflict),
            5 => Some(NackCode::Load),
            6 => Some(NackCode::Internal),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Nack {
    pub code: NackCode,
    pub reason: String,
}

/// A debug protocol message
#[derive(Debug, Clone, PartialEq)]
pub enum DebugMessage {
    AddNode(AddNode),
    UpdateNode(UpdateNode),
    DeleteNode(DeleteNode),
    CharacterStatic(CharacterStatic),
    CharacterDetails(CharacterDetails),
    Names(Names),
    Select(Select),
    Pause(Pause),
    Step(Step),
    State(State),
    Change(Change),
    Reset(Reset),
    Subscribe(Subscribe),
    Ping(Ping),
    Nack(Nack),
}

impl DebugMessage {
    pub const ADD_NODE: u8 = 1;
    pub const UPDATE_NODE: u8 = 2;
    pub const DELETE_NODE: u8 = 3;
    pub const CHARACTER_STATIC: u8 = 4;
    pub const CHARACTER_DETAILS: u8 = 5;
    pub const NAMES: u8 = 6;
    pub const SELECT: u8 = 7;
    pub const PAUSE: u8 = 8;
    pub const STEP: u8 = 9;
    pub const STATE: u8 = 10;
    pub const CHANGE: u8 = 11;
    pub const RESET: u8 = 12;
    pub const SUBSCRIBE: u8 = 13;
    pub const PING: u8 = 14;
    pub const NACK: u8 = 15;

    /// Stable wire discriminator of this message
    pub fn discriminator(&self) -> u8 {
        match self {
            DebugMessage::AddNode(_) => Self::ADD_NODE,
            DebugMessage::UpdateNode(_) => Self::UPDATE_NODE,
            DebugMessage::DeleteNode(_) => Self::DELETE_NODE,
            DebugMessage::CharacterStatic(_) => Self::CHARACTER_STATIC,
            DebugMessage::CharacterDetails(_) => Self::CHARACTER_DETAILS,
            DebugMessage::Names(_) => Self::NAMES,
            DebugMessage::Select(_) => Self::SELECT,
            DebugMessage::Pause(_) => Self::PAUSE,
            DebugMessage::Step(_) => Self::STEP,
            DebugMessage::State(_) => Self::STATE,
            DebugMessage::Change(_) => Self::CHANGE,
            DebugMessage::Reset(_) => Self::RESET,
            DebugMessage::Subscribe(_) => Self::SUBSCRIBE,
            DebugMessage::Ping(_) => Self::PING,
            DebugMessage::Nack(_) => Self::NACK,
        }
    }

    pub fn kind(&self) -> MessageKind {
        match self {
            DebugMessage::AddNode(_) => MessageKind::AddNode,
            DebugMessage::UpdateNode(_) => MessageKind::UpdateNode,
            DebugMessage::DeleteNode(_) => MessageKind::DeleteNode,
            DebugMessage::CharacterStatic(_) => MessageKind::CharacterStatic,
            DebugMessage::CharacterDetails(_) => MessageKind::CharacterDetails,
            DebugMessage::Names(_) => MessageKind::Names,
            DebugMessage::Select(_) => MessageKind::Select,
            DebugMessage::Pause(_) => MessageKind::Pause,
            DebugMessage::Step(_) => MessageKind::Step,
            DebugMessage::State(_) => MessageKind::State,
            DebugMessage::Change(_) => MessageKind::Change,
            DebugMessage::Reset(_) => MessageKind::Reset,
            DebugMessage::Subscribe(_) => MessageKind::Subscribe,
            DebugMessage::Ping(_) => MessageKind::Ping,
            DebugMessage::Nack(_) => MessageKind::Nack,
        }
    }

    /// Periodic state deltas may be superseded by newer ones under backpressure
    pub fn is_state_delta(&self) -> bool {
        matches!(self, DebugMessage::UpdateNode(_))
    }

    pub fn nack(code: NackCode, reason: impl Into<String>) -> Self {
        DebugMessage::Nack(Nack {
            code,
            reason: reason.into(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_kind_flags() {
        let kinds: MessageKinds = MessageKind::UpdateNode | MessageKind::State;
        assert!(kinds.contains(MessageKind::UpdateNode));
        assert!(!kinds.contains(MessageKind::Names));
        assert!(MessageKinds::full().contains(MessageKind::Nack));
    }

    #[test]
    fn test_empty_delta() {
        assert!(NodeDelta::default().is_empty());
        let delta = NodeDelta {
            running_node: Some(None),
            ..Default::default()
        };
        assert!(!delta.is_empty());
    }

    #[test]
    fn test_state_delta_classification() {
        let update = DebugMessage::UpdateNode(UpdateNode {
            entity_id: EntityId(1),
            delta: NodeDelta::default(),
        });
        assert!(update.is_state_delta());
        assert!(!DebugMessage::Ping(Ping { nonce: 1 }).is_state_delta());
        assert_eq!(update.kind(), MessageKind::UpdateNode);
        assert_eq!(update.discriminator(), DebugMessage::UPDATE_NODE);
    }
}
