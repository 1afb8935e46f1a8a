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

//! Behavior tree node types

use crate::ai::action::Action;
use crate::ai::condition::ConditionExpr;
use crate::ai::filter::Filter;
use std::fmt;
use thicket_common::NodeId;

/// Nodes that order the evaluation of their children
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Composite {
    /// Children in order until one does not succeed; resumes at a Running child
    Sequence,
    /// Children in priority order until one does not fail
    Selector,
    /// Sequence semantics under its boolean name
    And,
    /// Selector semantics under its boolean name
    Or,
    /// All children every tick
    Parallel,
    /// One randomly chosen child per activation
    RandomSelector,
}

/// Single-child result transformers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decorator {
    Invert,
    Succeed,
    Fail,
    /// Allow at most `max` completed child runs, then fail
    Limit { max: u32 },
    /// Fail until `millis` of simulation time passed since the last completed child run
    Throttle { millis: u64 },
}

#[derive(Debug, Clone)]
pub enum NodeKind {
    Composite(Composite),
    Decorator(Decorator),
    Condition(ConditionExpr),
    /// Replaces the context's filtered entities; fails when nothing was selected
    Filter(Vec<Filter>),
    Action(Action),
}

impl NodeKind {
    /// Short type name used in debug output
    pub fn type_name(&self) -> String {
        match self {
            NodeKind::Composite(composite) => format!("{:?}", composite),
            NodeKind::Decorator(Decorator::Limit { .. }) => "Limit".to_string(),
            NodeKind::Decorator(Decorator::Throttle { .. }) => "Throttle".to_string(),
            NodeKind::Decorator(decorator) => format!("{:?}", decorator),
            NodeKind::Condition(condition) => condition.to_string(),
            NodeKind::Filter(filters) => {
                let filters: Vec<String> = filters.iter().map(Filter::to_string).collect();
                format!("Filter({})", filters.join(","))
            }
            NodeKind::Action(action) => action.type_name().to_string(),
        }
    }

    pub fn is_leaf(&self) -> bool {
        matches!(
            self,
            NodeKind::Condition(_) | NodeKind::Filter(_) | NodeKind::Action(_)
        )
    }

    /// Allowed number of children as an inclusive range
    pub fn arity(&self) -> (usize, usize) {
        match self {
            NodeKind::Composite(_) => (1, usize::MAX),
            NodeKind::Decorator(_) => (1, 1),
            NodeKind::Condition(_) | NodeKind::Filter(_) | NodeKind::Action(_) => (0, 0),
        }
    }
}

/// Arena entry of a [`BehaviorTree`](crate::ai::tree::BehaviorTree)
#[derive(Debug, Clone)]
pub struct BehaviorNode {
    pub name: String,
    pub kind: NodeKind,
    pub children: Vec<NodeId>,
    /// Evaluated before the node; when false the node fails without running
    pub guard: Option<ConditionExpr>,
}

impl BehaviorNode {
    pub fn new(name: impl Into<String>, kind: NodeKind) -> Self {
        Self {
            name: name.into(),
            kind,
            children: Vec::new(),
            guard: None,
        }
    }

    pub fn with_children(mut self, children: Vec<NodeId>) -> Self {
        self.children = children;
        self
    }

    pub fn with_guard(mut self, guard: ConditionExpr) -> Self {
        self.guard = Some(guard);
        self
    }
}

impl fmt::Display for BehaviorNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name, self.kind.type_name())
    }
}
