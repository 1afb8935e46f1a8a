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

//! Thicket AI Server
//!
//! Tick-driven behavior tree runtime for game NPCs:
//! - Behavior tree engine with composites, decorators, conditions and actions
//! - Per-entity AI contexts with aggro tables and group membership
//! - Zones that can be paused and stepped independently
//! - A remote debug protocol served over TCP

pub mod ai;
pub mod config;
pub mod error;
pub mod listener;
pub mod server;
pub mod session;
pub mod snapshot;
pub mod tick;
pub mod zone;

pub use error::{AiError, AiResult};
pub use server::{Server, ServerSettings, TickReport};
pub use tick::{ServerCommand, ServerHandle, TickLoop};
