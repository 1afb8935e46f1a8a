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

//! Tree loading
//!
//! The server obtains trees by name through the [`TreeLoader`] trait. The
//! bundled [`DefinitionLoader`] assembles trees from serde definitions such
//! as the `trees` section of the server configuration:
//!
//! ```yaml
//! patrol:
//!   root:
//!     type: Selector
//!     children:
//!       - type: MoveToTarget
//!         guard: { type: HasEnemies }
//!         params: { distance: 2.0 }
//!       - type: Idle
//!         params: { millis: 1000 }
//! ```

use crate::ai::node::{BehaviorNode, NodeKind};
use crate::ai::registry::{CONDITION_NODE, FILTER_NODE, NodeParams, NodeRegistry, Params};
use crate::ai::tree::BehaviorTree;
use crate::error::{AiError, AiResult};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thicket_common::NodeId;

/// Deepest nesting accepted from a definition
pub const MAX_TREE_DEPTH: usize = 64;

/// Source of behavior trees
#[cfg_attr(test, mockall::automock)]
pub trait TreeLoader: Send {
    /// Build the tree called `name`.
    ///
    /// Returns `NotFound` for unknown names and `Load` for malformed
    /// definitions. A failed build returns no tree at all.
    fn add_tree(&self, name: &str, registry: &NodeRegistry) -> AiResult<BehaviorTree>;

    /// Names of every tree this loader can build
    fn tree_names(&self) -> Vec<String>;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConditionDefinition {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub params: Params,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub operands: Vec<ConditionDefinition>,
}

/// Filters share the shape of conditions; `operands` holds the inner filters
pub type FilterDefinition = ConditionDefinition;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeDefinition {
    #[serde(rename = "type")]
    pub kind: String,
    /// Display name; defaults to the type name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub params: Params,
    /// Predicate of a `Condition` node
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition: Option<ConditionDefinition>,
    /// Filters of a `Filter` node
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub filters: Vec<FilterDefinition>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub guard: Option<ConditionDefinition>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<NodeDefinition>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TreeDefinition {
    #[serde(default)]
    pub root: Option<NodeDefinition>,
}

/// Build a tree from its definition. Nothing escapes on failure.
pub fn build_tree(
    name: &str,
    definition: &TreeDefinition,
    registry: &NodeRegistry,
) -> AiResult<BehaviorTree> {
    let mut nodes = Vec::new();
    let root = match &definition.root {
        Some(root) => Some(build_node(name, root, registry, &mut nodes, 1)?),
        None => None,
    };
    BehaviorTree::new(name, nodes, root)
}

fn build_node(
    tree: &str,
    definition: &NodeDefinition,
    registry: &NodeRegistry,
    nodes: &mut Vec<BehaviorNode>,
    depth: usize,
) -> AiResult<NodeId> {
    if depth > MAX_TREE_DEPTH {
        return Err(AiError::Load(format!(
            "tree '{}' is nested deeper than {} levels",
            tree, MAX_TREE_DEPTH
        )));
    }

    let children = definition
        .children
        .iter()
        .map(|child| build_node(tree, child, registry, nodes, depth + 1))
        .collect::<AiResult<Vec<_>>>()?;

    let name = definition
        .name
        .clone()
        .unwrap_or_else(|| definition.kind.clone());

    let kind = if definition.kind == CONDITION_NODE {
        let condition = definition.condition.as_ref().ok_or_else(|| {
            AiError::Load(format!(
                "condition node '{}' in tree '{}' has no condition",
                name, tree
            ))
        })?;
        NodeKind::Condition(registry.create_condition(condition)?)
    } else if definition.kind == FILTER_NODE {
        if definition.filters.is_empty() {
            return Err(AiError::Load(format!(
                "filter node '{}' in tree '{}' has no filters",
                name, tree
            )));
        }
        NodeKind::Filter(
            definition
                .filters
                .iter()
                .map(|filter| registry.create_filter(filter))
                .collect::<AiResult<Vec<_>>>()?,
        )
    } else {
        registry.create_node(&NodeParams::new(&definition.kind, &name, &definition.params))?
    };

    let mut node = BehaviorNode::new(name, kind).with_children(children);
    if let Some(guard) = &definition.guard {
        node = node.with_guard(registry.create_condition(guard)?);
    }

    let id = NodeId::from(nodes.len());
    nodes.push(node);
    Ok(id)
}

/// Loads trees from in-memory definitions
#[derive(Debug, Clone, Default)]
pub struct DefinitionLoader {
    definitions: BTreeMap<String, TreeDefinition>,
}

impl DefinitionLoader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_definitions(definitions: BTreeMap<String, TreeDefinition>) -> Self {
        Self { definitions }
    }

    /// Parse a YAML map of tree name to definition
    pub fn from_yaml(source: &str) -> AiResult<Self> {
        let definitions = serde_yaml::from_str(source)
            .map_err(|e| AiError::Load(format!("invalid tree definitions: {}", e)))?;
        Ok(Self { definitions })
    }
}

impl TreeLoader for DefinitionLoader {
    fn add_tree(&self, name: &str, registry: &NodeRegistry) -> AiResult<BehaviorTree> {
        let definition = self
            .definitions
            .get(name)
            .ok_or_else(|| AiError::NotFound(format!("tree '{}'", name)))?;
        build_tree(name, definition, registry)
    }

    fn tree_names(&self) -> Vec<String> {
        self.definitions.keys().cloned().collect()
    }
}
