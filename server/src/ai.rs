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

//! Behavior tree AI engine
//!
//! This module provides the tree evaluation engine together with the
//! per-entity state it reads and writes: aggro tables, group membership
//! and the AI context tying an entity to its tree.

pub mod action;
pub mod aggro;
pub mod condition;
pub mod context;
pub mod filter;
pub mod group;
pub mod loader;
pub mod node;
pub mod registry;
pub mod tree;

pub use action::{Action, CustomAction};
pub use aggro::{AggroConfig, AggroEntry, AggroManager, DecayKind};
pub use condition::ConditionExpr;
pub use context::{AIContext, CharacterDynamic, CharacterStatic, TreeState};
pub use filter::Filter;
pub use group::{GroupEvent, GroupManager};
pub use loader::{DefinitionLoader, NodeDefinition, TreeDefinition, TreeLoader};
pub use node::{BehaviorNode, Composite, Decorator, NodeKind};
pub use registry::{NodeParams, NodeRegistry};
pub use tree::{BehaviorTree, TickEnv};
