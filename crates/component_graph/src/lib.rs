//! # Component Graph
//!
//! Static execution graph built once from the component descriptors.
//!
//! Nodes live in an arena and refer to each other by index. Building the
//! graph validates that the dependency relation is acyclic and computes a
//! staged topological order:
//!
//! - Kahn's algorithm, always taking the ready node declared first
//! - when that node carries a parallel-group tag, every other ready node
//!   with the same tag joins its stage
//! - stages run one after another; members of a stage may run concurrently

use std::collections::BTreeSet;

use contracts::{ComponentDescriptor, ComponentId, SimError};
use indexmap::IndexMap;
use tracing::debug;

/// Position of a node in declaration order
pub type NodeIndex = usize;

/// A component node with resolved dependency indices
#[derive(Debug, Clone)]
pub struct ComponentNode {
    pub index: NodeIndex,
    pub descriptor: ComponentDescriptor,
    /// Nodes that must complete first in the same tick
    pub dependencies: Vec<NodeIndex>,
    /// Nodes that consume this node's output
    pub dependents: Vec<NodeIndex>,
}

impl ComponentNode {
    pub fn id(&self) -> &ComponentId {
        &self.descriptor.id
    }

    pub fn parallel_group(&self) -> Option<&str> {
        self.descriptor.parallel_group.as_deref()
    }
}

/// A set of nodes executed behind one join barrier
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Stage {
    pub nodes: Vec<NodeIndex>,
    pub group: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ComponentGraph {
    nodes: Vec<ComponentNode>,
    index: IndexMap<ComponentId, NodeIndex>,
    order: Vec<NodeIndex>,
    stages: Vec<Stage>,
}

impl ComponentGraph {
    /// Build and validate the graph.
    ///
    /// # Errors
    /// - `ConfigValidation` for duplicate ids or unknown dependencies
    /// - `CyclicDependency` naming one cycle
    pub fn build(descriptors: &[ComponentDescriptor]) -> Result<Self, SimError> {
        let mut index: IndexMap<ComponentId, NodeIndex> = IndexMap::with_capacity(descriptors.len());
        for (i, d) in descriptors.iter().enumerate() {
            if index.insert(d.id.clone(), i).is_some() {
                return Err(SimError::config_validation(
                    format!("components[id={}]", d.id),
                    "duplicate component id",
                ));
            }
        }

        let mut nodes: Vec<ComponentNode> = descriptors
            .iter()
            .enumerate()
            .map(|(i, d)| ComponentNode {
                index: i,
                descriptor: d.clone(),
                dependencies: Vec::new(),
                dependents: Vec::new(),
            })
            .collect();

        for i in 0..nodes.len() {
            let mut deps = Vec::with_capacity(nodes[i].descriptor.depends_on.len());
            for dep in &nodes[i].descriptor.depends_on {
                let Some(&j) = index.get(dep) else {
                    return Err(SimError::config_validation(
                        format!("components[{}].depends_on", nodes[i].descriptor.id),
                        format!("unknown component '{dep}'"),
                    ));
                };
                if !deps.contains(&j) {
                    deps.push(j);
                }
            }
            for &j in &deps {
                nodes[j].dependents.push(i);
            }
            nodes[i].dependencies = deps;
        }

        let stages = staged_order(&nodes)?;
        let order = stages.iter().flat_map(|s| s.nodes.iter().copied()).collect();

        debug!(nodes = nodes.len(), stages = stages.len(), "component graph built");
        Ok(Self {
            nodes,
            index,
            order,
            stages,
        })
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn node(&self, index: NodeIndex) -> &ComponentNode {
        &self.nodes[index]
    }

    pub fn nodes(&self) -> &[ComponentNode] {
        &self.nodes
    }

    pub fn index_of(&self, id: &str) -> Option<NodeIndex> {
        self.index.get(id).copied()
    }

    /// Flattened topological order
    pub fn order(&self) -> &[NodeIndex] {
        &self.order
    }

    pub fn stages(&self) -> &[Stage] {
        &self.stages
    }

    pub fn dependencies(&self, index: NodeIndex) -> &[NodeIndex] {
        &self.nodes[index].dependencies
    }

    pub fn dependents(&self, index: NodeIndex) -> &[NodeIndex] {
        &self.nodes[index].dependents
    }

    /// Stage ids as strings, for logs and `validate` output.
    pub fn describe_stages(&self) -> Vec<Vec<String>> {
        self.stages
            .iter()
            .map(|s| s.nodes.iter().map(|&i| self.nodes[i].id().to_string()).collect())
            .collect()
    }
}

fn staged_order(nodes: &[ComponentNode]) -> Result<Vec<Stage>, SimError> {
    let mut in_degree: Vec<usize> = nodes.iter().map(|n| n.dependencies.len()).collect();
    let mut ready: BTreeSet<NodeIndex> = (0..nodes.len()).filter(|&i| in_degree[i] == 0).collect();
    let mut stages = Vec::new();
    let mut processed = 0;

    while let Some(first) = ready.pop_first() {
        let group = nodes[first].descriptor.parallel_group.clone();
        let mut members = vec![first];
        if let Some(tag) = &group {
            let peers: Vec<NodeIndex> = ready
                .iter()
                .copied()
                .filter(|&i| nodes[i].parallel_group() == Some(tag.as_str()))
                .collect();
            for peer in peers {
                ready.remove(&peer);
                members.push(peer);
            }
        }

        for &member in &members {
            for &dependent in &nodes[member].dependents {
                in_degree[dependent] -= 1;
                if in_degree[dependent] == 0 {
                    ready.insert(dependent);
                }
            }
        }

        processed += members.len();
        stages.push(Stage {
            nodes: members,
            group,
        });
    }

    if processed != nodes.len() {
        let remaining: Vec<NodeIndex> = (0..nodes.len()).filter(|&i| in_degree[i] > 0).collect();
        return Err(SimError::CyclicDependency {
            cycle: find_cycle(nodes, &remaining),
        });
    }

    Ok(stages)
}

/// Walk dependency edges among unprocessed nodes until one repeats.
///
/// Every unprocessed node has at least one unprocessed dependency, so the
/// walk always closes a cycle.
fn find_cycle(nodes: &[ComponentNode], remaining: &[NodeIndex]) -> Vec<String> {
    let Some(&start) = remaining.first() else {
        return Vec::new();
    };
    let mut path: Vec<NodeIndex> = vec![start];
    let mut current = start;
    loop {
        let next = nodes[current]
            .dependencies
            .iter()
            .copied()
            .find(|d| remaining.contains(d));
        let Some(next) = next else {
            break;
        };
        if let Some(pos) = path.iter().position(|&p| p == next) {
            // Report in execution direction: dependency before dependent.
            let mut cycle: Vec<String> = path[pos..]
                .iter()
                .rev()
                .map(|&i| nodes[i].id().to_string())
                .collect();
            cycle.insert(0, nodes[next].id().to_string());
            return cycle;
        }
        path.push(next);
        current = next;
    }
    path.iter().map(|&i| nodes[i].id().to_string()).collect()
}
