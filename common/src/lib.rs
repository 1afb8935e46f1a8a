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

//! Thicket Common Types and Protocols
//!
//! This crate defines the types shared between the Thicket AI server and
//! any remote debugger that talks to it:
//! - Identifiers and value types (entities, zones, groups, tree nodes)
//! - The debug protocol message set
//! - The binary wire codec and its `tokio_util` framing

pub mod codec;
pub mod message;
pub mod types;

pub use codec::{DebugCodec, DecodeError, decode, encode};
pub use message::{DebugMessage, MessageKind, MessageKinds, NackCode};
pub use types::{EntityId, GroupId, NodeId, TreeStatus, Vector3, ZoneId, ZoneState};
