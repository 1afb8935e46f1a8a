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

//! Node Registry
//!
//! Maps node type names to factories. The built-in composites, decorators,
//! actions and conditions live in process-wide tables that are fully
//! populated before the first tree is built. A [`NodeRegistry`] starts from
//! those tables and accepts host-provided node types until it is sealed,
//! which happens when its owner loads the first tree.

use crate::ai::action::{Action, CustomAction};
use crate::ai::condition::ConditionExpr;
use crate::ai::filter::Filter;
use crate::ai::loader::{ConditionDefinition, FilterDefinition};
use crate::ai::node::{Composite, Decorator, NodeKind};
use crate::error::{AiError, AiResult};
use once_cell::sync::Lazy;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;
use thicket_common::GroupId;

/// Type name of condition leaf nodes; their predicate comes from the definition's `condition`
pub const CONDITION_NODE: &str = "Condition";

/// Type name of filter leaf nodes; their filters come from the definition's `filters`
pub const FILTER_NODE: &str = "Filter";

/// Raw node parameters as written in a tree definition
pub type Params = BTreeMap<String, serde_yaml::Value>;

/// Typed view of a node's parameters handed to factories
#[derive(Debug, Clone, Copy)]
pub struct NodeParams<'a> {
    type_name: &'a str,
    node_name: &'a str,
    params: &'a Params,
}

impl<'a> NodeParams<'a> {
    pub fn new(type_name: &'a str, node_name: &'a str, params: &'a Params) -> Self {
        Self {
            type_name,
            node_name,
            params,
        }
    }

    pub fn type_name(&self) -> &str {
        self.type_name
    }

    pub fn node_name(&self) -> &str {
        self.node_name
    }

    fn error(&self, key: &str, problem: &str) -> AiError {
        AiError::Load(format!(
            "{} node '{}': parameter '{}' {}",
            self.type_name, self.node_name, key, problem
        ))
    }

    pub fn contains(&self, key: &str) -> bool {
        self.params.contains_key(key)
    }

    pub fn u64(&self, key: &str) -> AiResult<u64> {
        let value = self.params.get(key).ok_or_else(|| self.error(key, "is missing"))?;
        value
            .as_u64()
            .ok_or_else(|| self.error(key, "must be a non-negative integer"))
    }

    pub fn u32(&self, key: &str) -> AiResult<u32> {
        u32::try_from(self.u64(key)?).map_err(|_| self.error(key, "is out of range"))
    }

    pub fn f32(&self, key: &str) -> AiResult<f32> {
        let value = self.params.get(key).ok_or_else(|| self.error(key, "is missing"))?;
        match value.as_f64() {
            Some(number) if number.is_finite() => Ok(number as f32),
            _ => Err(self.error(key, "must be a finite number")),
        }
    }

    pub fn f32_or(&self, key: &str, default: f32) -> AiResult<f32> {
        if self.contains(key) {
            self.f32(key)
        } else {
            Ok(default)
        }
    }

    pub fn string(&self, key: &str) -> AiResult<String> {
        let value = self.params.get(key).ok_or_else(|| self.error(key, "is missing"))?;
        value
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| self.error(key, "must be a string"))
    }

    pub fn group(&self, key: &str) -> AiResult<GroupId> {
        self.u32(key).map(GroupId)
    }

    pub fn optional_group(&self, key: &str) -> AiResult<Option<GroupId>> {
        if self.contains(key) {
            self.group(key).map(Some)
        } else {
            Ok(None)
        }
    }
}

/// Builds a node from its parameters
pub type NodeFactory = Arc<dyn Fn(&NodeParams<'_>) -> AiResult<NodeKind> + Send + Sync>;

type BuiltinNode = fn(&NodeParams<'_>) -> AiResult<NodeKind>;
type BuiltinCondition = fn(&NodeParams<'_>, Vec<ConditionExpr>) -> AiResult<ConditionExpr>;
type BuiltinFilter = fn(&NodeParams<'_>, Vec<Filter>) -> AiResult<Filter>;

static BUILTIN_NODES: Lazy<HashMap<&'static str, BuiltinNode>> = Lazy::new(|| {
    let mut nodes: HashMap<&'static str, BuiltinNode> = HashMap::new();

    // Composites
    nodes.insert("Sequence", |_| Ok(NodeKind::Composite(Composite::Sequence)));
    nodes.insert("Selector", |_| Ok(NodeKind::Composite(Composite::Selector)));
    nodes.insert("And", |_| Ok(NodeKind::Composite(Composite::And)));
    nodes.insert("Or", |_| Ok(NodeKind::Composite(Composite::Or)));
    nodes.insert("Parallel", |_| Ok(NodeKind::Composite(Composite::Parallel)));
    nodes.insert("RandomSelector", |_| {
        Ok(NodeKind::Composite(Composite::RandomSelector))
    });

    // Decorators
    nodes.insert("Invert", |_| Ok(NodeKind::Decorator(Decorator::Invert)));
    nodes.insert("Succeed", |_| Ok(NodeKind::Decorator(Decorator::Succeed)));
    nodes.insert("Fail", |_| Ok(NodeKind::Decorator(Decorator::Fail)));
    nodes.insert("Limit", |p| {
        Ok(NodeKind::Decorator(Decorator::Limit { max: p.u32("max")? }))
    });
    nodes.insert("Throttle", |p| {
        Ok(NodeKind::Decorator(Decorator::Throttle {
            millis: p.u64("millis")?,
        }))
    });

    // Actions
    nodes.insert("Idle", |p| {
        Ok(NodeKind::Action(Action::Idle {
            millis: p.u64("millis")?,
        }))
    });
    nodes.insert("Print", |p| {
        Ok(NodeKind::Action(Action::Print {
            message: p.string("message")?,
        }))
    });
    nodes.insert("JoinGroup", |p| {
        Ok(NodeKind::Action(Action::JoinGroup(p.group("group")?)))
    });
    nodes.insert("LeaveGroup", |_| Ok(NodeKind::Action(Action::LeaveGroup)));
    nodes.insert("MoveToGroup", |p| {
        Ok(NodeKind::Action(Action::MoveToGroup {
            group: p.group("group")?,
            distance: p.f32_or("distance", 1.0)?,
        }))
    });
    nodes.insert("MoveToTarget", |p| {
        Ok(NodeKind::Action(Action::MoveToTarget {
            distance: p.f32_or("distance", 1.0)?,
        }))
    });
    nodes.insert("MoveToFiltered", |p| {
        Ok(NodeKind::Action(Action::MoveToFiltered {
            distance: p.f32_or("distance", 1.0)?,
        }))
    });
    nodes.insert("AggroFiltered", |p| {
        Ok(NodeKind::Action(Action::AggroFiltered {
            amount: p.f32("amount")?,
        }))
    });
    nodes.insert("ForgetTarget", |_| Ok(NodeKind::Action(Action::ForgetTarget)));

    nodes
});

static BUILTIN_CONDITIONS: Lazy<HashMap<&'static str, BuiltinCondition>> = Lazy::new(|| {
    let mut conditions: HashMap<&'static str, BuiltinCondition> = HashMap::new();

    conditions.insert("True", |p, operands| {
        no_operands(p, &operands).map(|_| ConditionExpr::True)
    });
    conditions.insert("False", |p, operands| {
        no_operands(p, &operands).map(|_| ConditionExpr::False)
    });
    conditions.insert("Not", |p, mut operands| match operands.len() {
        1 => Ok(ConditionExpr::Not(Box::new(operands.remove(0)))),
        n => Err(AiError::Load(format!(
            "condition '{}' needs exactly one operand, got {}",
            p.node_name(),
            n
        ))),
    });
    conditions.insert("And", |_, operands| Ok(ConditionExpr::And(operands)));
    conditions.insert("Or", |_, operands| Ok(ConditionExpr::Or(operands)));
    conditions.insert("HasEnemies", |p, operands| {
        no_operands(p, &operands).map(|_| ConditionExpr::HasEnemies)
    });
    conditions.insert("IsInGroup", |p, operands| {
        no_operands(p, &operands)?;
        Ok(ConditionExpr::IsInGroup(p.optional_group("group")?))
    });
    conditions.insert("IsGroupLeader", |p, operands| {
        no_operands(p, &operands)?;
        Ok(ConditionExpr::IsGroupLeader(p.optional_group("group")?))
    });
    conditions.insert("IsCloseToGroup", |p, operands| {
        no_operands(p, &operands)?;
        Ok(ConditionExpr::IsCloseToGroup {
            group: p.group("group")?,
            distance: p.f32("distance")?,
        })
    });
    conditions.insert("IsTargetInRange", |p, operands| {
        no_operands(p, &operands)?;
        Ok(ConditionExpr::IsTargetInRange {
            distance: p.f32("distance")?,
        })
    });
    conditions.insert("HasFilteredEntities", |p, operands| {
        no_operands(p, &operands).map(|_| ConditionExpr::HasFilteredEntities)
    });

    conditions
});

static BUILTIN_FILTERS: Lazy<HashMap<&'static str, BuiltinFilter>> = Lazy::new(|| {
    let mut filters: HashMap<&'static str, BuiltinFilter> = HashMap::new();

    filters.insert("SelectAggro", |p, inner| {
        no_inner_filters(p, &inner).map(|_| Filter::SelectAggro)
    });
    filters.insert("SelectHighestAggro", |p, inner| {
        no_inner_filters(p, &inner).map(|_| Filter::SelectHighestAggro)
    });
    filters.insert("SelectGroupMembers", |p, inner| {
        no_inner_filters(p, &inner)?;
        Ok(Filter::SelectGroupMembers(p.optional_group("group")?))
    });
    filters.insert("SelectGroupLeader", |p, inner| {
        no_inner_filters(p, &inner)?;
        Ok(Filter::SelectGroupLeader(p.optional_group("group")?))
    });
    filters.insert("SelectInRange", |p, inner| {
        no_inner_filters(p, &inner)?;
        Ok(Filter::SelectInRange {
            distance: p.f32("distance")?,
        })
    });
    filters.insert("First", |p, inner| {
        single_inner_filter(p, inner).map(|inner| Filter::First(Box::new(inner)))
    });
    filters.insert("Last", |p, inner| {
        single_inner_filter(p, inner).map(|inner| Filter::Last(Box::new(inner)))
    });

    filters
});

fn no_operands(params: &NodeParams<'_>, operands: &[ConditionExpr]) -> AiResult<()> {
    if operands.is_empty() {
        Ok(())
    } else {
        Err(AiError::Load(format!(
            "condition '{}' takes no operands",
            params.node_name()
        )))
    }
}

fn no_inner_filters(params: &NodeParams<'_>, inner: &[Filter]) -> AiResult<()> {
    if inner.is_empty() {
        Ok(())
    } else {
        Err(AiError::Load(format!(
            "filter '{}' takes no inner filters",
            params.node_name()
        )))
    }
}

fn single_inner_filter(params: &NodeParams<'_>, mut inner: Vec<Filter>) -> AiResult<Filter> {
    match inner.len() {
        1 => Ok(inner.remove(0)),
        n => Err(AiError::Load(format!(
            "filter '{}' needs exactly one inner filter, got {}",
            params.node_name(),
            n
        ))),
    }
}

/// Node type table of one server
pub struct NodeRegistry {
    nodes: HashMap<String, NodeFactory>,
    conditions: HashMap<String, BuiltinCondition>,
    filters: HashMap<String, BuiltinFilter>,
    sealed: bool,
}

impl NodeRegistry {
    /// A registry holding every built-in node type
    pub fn new() -> Self {
        let nodes = BUILTIN_NODES
            .iter()
            .map(|(name, factory)| {
                let factory = *factory;
                let boxed: NodeFactory = Arc::new(move |params: &NodeParams<'_>| factory(params));
                (name.to_string(), boxed)
            })
            .collect();
        let conditions = BUILTIN_CONDITIONS
            .iter()
            .map(|(name, factory)| (name.to_string(), *factory))
            .collect();
        let filters = BUILTIN_FILTERS
            .iter()
            .map(|(name, factory)| (name.to_string(), *factory))
            .collect();

        Self {
            nodes,
            conditions,
            filters,
            sealed: false,
        }
    }

    /// Register a node type. Fails once the registry is sealed or if the name is taken.
    pub fn register_node<F>(&mut self, name: impl Into<String>, factory: F) -> AiResult<()>
    where
        F: Fn(&NodeParams<'_>) -> AiResult<NodeKind> + Send + Sync + 'static,
    {
        let name = name.into();
        if self.sealed {
            return Err(AiError::State(format!(
                "cannot register node type '{}' after trees were loaded",
                name
            )));
        }
        if self.contains(&name) {
            return Err(AiError::Conflict(format!(
                "node type '{}' is already registered",
                name
            )));
        }

        tracing::debug!("Registered node type '{}'", name);
        self.nodes.insert(name, Arc::new(factory));
        Ok(())
    }

    /// Register a host action type
    pub fn register_action<F>(&mut self, name: impl Into<String>, factory: F) -> AiResult<()>
    where
        F: Fn(&NodeParams<'_>) -> AiResult<Arc<dyn CustomAction>> + Send + Sync + 'static,
    {
        self.register_node(name, move |params: &NodeParams<'_>| {
            factory(params).map(|action| NodeKind::Action(Action::Custom(action)))
        })
    }

    /// Reject further registrations
    pub fn seal(&mut self) {
        if !self.sealed {
            tracing::debug!("Node registry sealed with {} node types", self.nodes.len());
            self.sealed = true;
        }
    }

    pub fn is_sealed(&self) -> bool {
        self.sealed
    }

    pub fn contains(&self, name: &str) -> bool {
        name == CONDITION_NODE
            || name == FILTER_NODE
            || self.nodes.contains_key(name)
            || self.conditions.contains_key(name)
            || self.filters.contains_key(name)
    }

    /// Registered node type names in alphabetical order
    pub fn node_types(&self) -> Vec<String> {
        let mut names: Vec<String> = self.nodes.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn create_node(&self, params: &NodeParams<'_>) -> AiResult<NodeKind> {
        let factory = self.nodes.get(params.type_name()).ok_or_else(|| {
            AiError::Load(format!(
                "unknown node type '{}' for node '{}'",
                params.type_name(),
                params.node_name()
            ))
        })?;
        factory(params)
    }

    pub fn create_condition(&self, definition: &ConditionDefinition) -> AiResult<ConditionExpr> {
        let factory = self.conditions.get(&definition.kind).ok_or_else(|| {
            AiError::Load(format!("unknown condition type '{}'", definition.kind))
        })?;
        let operands = definition
            .operands
            .iter()
            .map(|operand| self.create_condition(operand))
            .collect::<AiResult<Vec<_>>>()?;
        factory(
            &NodeParams::new(&definition.kind, &definition.kind, &definition.params),
            operands,
        )
    }

    pub fn create_filter(&self, definition: &FilterDefinition) -> AiResult<Filter> {
        let factory = self
            .filters
            .get(&definition.kind)
            .ok_or_else(|| AiError::Load(format!("unknown filter type '{}'", definition.kind)))?;
        let inner = definition
            .operands
            .iter()
            .map(|operand| self.create_filter(operand))
            .collect::<AiResult<Vec<_>>>()?;
        factory(
            &NodeParams::new(&definition.kind, &definition.kind, &definition.params),
            inner,
        )
    }
}

impl Default for NodeRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for NodeRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NodeRegistry")
            .field("nodes", &self.node_types())
            .field("conditions", &self.conditions.len())
            .field("filters", &self.filters.len())
            .field("sealed", &self.sealed)
            .finish()
    }
}
