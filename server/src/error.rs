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

//! Error types for the AI server

use thicket_common::{DebugMessage, DecodeError, NackCode};
use thiserror::Error;

/// Errors that can occur while managing or ticking AI entities.
#[derive(Debug, Error)]
pub enum AiError {
    /// An entity, zone, tree or session is unknown.
    #[error("Not found: {0}")]
    NotFound(String),

    /// A uniqueness invariant would be violated (duplicate zone or registration).
    #[error("Conflict: {0}")]
    Conflict(String),

    /// A tree definition is malformed. Nothing is published when this occurs.
    #[error("Failed to load tree: {0}")]
    Load(String),

    /// A debug message could not be decoded.
    #[error("Decode error: {0}")]
    Decode(#[from] DecodeError),

    /// The request is not valid in the current state (e.g. stepping a running zone).
    #[error("Invalid state: {0}")]
    State(String),

    /// A node failed while being evaluated. Never escapes the owning context's tick.
    #[error("Node evaluation failed: {0}")]
    Node(String),

    /// Network or thread I/O failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for AI operations.
pub type AiResult<T> = Result<T, AiError>;

impl AiError {
    /// Protocol error code reported to debug sessions
    pub fn nack_code(&self) -> NackCode {
        match self {
            AiError::NotFound(_) => NackCode::NotFound,
            AiError::Conflict(_) => NackCode::Conflict,
            AiError::Load(_) => NackCode::Load,
            AiError::Decode(_) => NackCode::Decode,
            AiError::State(_) => NackCode::State,
            AiError::Node(_) | AiError::Io(_) => NackCode::Internal,
        }
    }

    /// Protocol rejection carrying this error
    pub fn to_nack(&self) -> DebugMessage {
        DebugMessage::nack(self.nack_code(), self.to_string())
    }
}
